//! In-memory ledger guarded by the store's mutex.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::domain::{EquityState, IdempotencyKey, Symbol, SymbolState};

/// Bounded set of applied idempotency keys, oldest evicted first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyRing {
    order: VecDeque<IdempotencyKey>,
    members: HashSet<IdempotencyKey>,
    capacity: usize,
}

impl KeyRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn from_keys(keys: impl IntoIterator<Item = IdempotencyKey>, capacity: usize) -> Self {
        let mut ring = Self::new(capacity);
        for key in keys {
            ring.insert(key);
        }
        ring
    }

    pub(crate) fn contains(&self, key: &IdempotencyKey) -> bool {
        self.members.contains(key)
    }

    pub(crate) fn insert(&mut self, key: IdempotencyKey) {
        if !self.members.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &IdempotencyKey> {
        self.order.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ledger {
    pub(crate) sequence: u64,
    pub(crate) equity: EquityState,
    /// Non-flat symbols only.
    pub(crate) symbols: BTreeMap<Symbol, SymbolState>,
    pub(crate) applied: KeyRing,
    pub(crate) divergences: Vec<String>,
}

impl Ledger {
    pub(crate) fn new(equity: EquityState, key_capacity: usize) -> Self {
        Self {
            sequence: 0,
            equity,
            symbols: BTreeMap::new(),
            applied: KeyRing::new(key_capacity),
            divergences: Vec::new(),
        }
    }

    pub(crate) fn state(&self, symbol: &Symbol) -> &SymbolState {
        self.symbols.get(symbol).unwrap_or(&SymbolState::Flat)
    }

    /// Whether `key` was applied or is held by an in-flight transition.
    pub(crate) fn knows_key(&self, key: &IdempotencyKey) -> bool {
        self.applied.contains(key)
            || self.symbols.values().any(|state| match state {
                SymbolState::PendingEntry(pending) => &pending.idempotency_key == key,
                SymbolState::PendingExit { exit_key, .. } => exit_key == key,
                SymbolState::Flat | SymbolState::Open(_) => false,
            })
    }

    pub(crate) fn set_state(&mut self, symbol: Symbol, state: SymbolState) {
        if matches!(state, SymbolState::Flat) {
            self.symbols.remove(&symbol);
        } else {
            self.symbols.insert(symbol, state);
        }
    }
}
