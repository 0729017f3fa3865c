//! Position and equity store.
//!
//! Single source of truth for per-symbol state and account equity. All
//! mutations go through [`PositionStore`], which validates the state
//! transition, persists a full snapshot atomically, and only then makes the
//! change visible. A failed write leaves the in-memory state untouched.
//!
//! Pipelines working on the same symbol serialize through
//! [`PositionStore::lock_symbol`]. Commits serialize on a writer lock while
//! the snapshot is written; readers only take the ledger lock to copy or
//! swap it, so they never wait on disk.

mod ledger;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use crate::domain::{
    EquityState, FillDetails, IdempotencyKey, PendingEntry, Position, Price, ProtectionLimits,
    Quantity, Side, StrategyId, Symbol, SymbolState, TradeRecord,
};
use crate::error::StoreError;

use ledger::Ledger;
use snapshot::{LoadError, SnapshotFile, StoreSnapshot};

/// Default bound on remembered idempotency keys.
pub const DEFAULT_MAX_REMEMBERED_KEYS: usize = 10_000;

/// Why a transition was refused without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "conflict", rename_all = "snake_case")]
pub enum Conflict {
    /// The key was already applied or is in flight.
    DuplicateKey { key: IdempotencyKey },
    /// The symbol is not in a state that admits the transition.
    SymbolBusy { symbol: Symbol, state: &'static str },
    /// Entries are suspended by equity protection.
    TradingSuspended { mode: String },
    /// Today's closed trades reached the configured cap.
    DailyTradeLimit { limit: u32 },
    /// The open position belongs to another strategy.
    NotOwner { owner: StrategyId },
    /// An exit named the wrong side of the open position.
    SideMismatch { open: Side },
}

impl Conflict {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::SymbolBusy { .. } => "symbol_busy",
            Self::TradingSuspended { .. } => "trading_suspended",
            Self::DailyTradeLimit { .. } => "daily_trade_limit",
            Self::NotOwner { .. } => "not_owner",
            Self::SideMismatch { .. } => "side_mismatch",
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateKey { key } => write!(f, "idempotency key {key} already seen"),
            Self::SymbolBusy { symbol, state } => write!(f, "{symbol} is {state}"),
            Self::TradingSuspended { mode } => write!(f, "trading suspended ({mode})"),
            Self::DailyTradeLimit { limit } => write!(f, "daily trade limit of {limit} reached"),
            Self::NotOwner { owner } => write!(f, "position is owned by {owner}"),
            Self::SideMismatch { open } => write!(f, "open position is {open}"),
        }
    }
}

/// Result of a reserving transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission<T = ()> {
    Accepted(T),
    Rejected(Conflict),
}

impl<T> Admission<T> {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Read-only view returned by [`PositionStore::export_state`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub taken_at: DateTime<Utc>,
    pub sequence: u64,
    pub equity: EquityState,
    /// Committed positions, including those with an exit in flight.
    pub positions: Vec<Position>,
    /// Symbols with an order in flight, by state name.
    pub pending: Vec<(Symbol, &'static str)>,
    pub divergences: Vec<String>,
    /// Set when the persisted snapshot could not be loaded.
    pub degraded: Option<String>,
}

/// Owner of all position and equity state.
pub struct PositionStore {
    ledger: Mutex<Ledger>,
    /// Held by a commit from copy to publish, including the snapshot write.
    writer: Mutex<()>,
    symbol_locks: DashMap<Symbol, Arc<tokio::sync::Mutex<()>>>,
    file: Option<SnapshotFile>,
    limits: ProtectionLimits,
    key_capacity: usize,
    starting_balance: Decimal,
    degraded: RwLock<Option<String>>,
}

impl PositionStore {
    /// Store without persistence.
    #[must_use]
    pub fn in_memory(starting_balance: Decimal, limits: ProtectionLimits) -> Self {
        Self::build(starting_balance, limits, DEFAULT_MAX_REMEMBERED_KEYS, None)
    }

    /// Open a store backed by the snapshot at `path`.
    ///
    /// A missing file starts a fresh ledger. An unreadable or inconsistent
    /// file puts the store in degraded mode: nothing is loaded, every
    /// mutation fails with [`StoreError::StateCorruption`], and the file is
    /// left untouched for inspection.
    pub fn open(
        path: impl Into<PathBuf>,
        starting_balance: Decimal,
        limits: ProtectionLimits,
        max_remembered_keys: usize,
    ) -> Self {
        let store = Self::build(
            starting_balance,
            limits,
            max_remembered_keys,
            Some(SnapshotFile::new(path)),
        );
        store.load_from_disk();
        store
    }

    fn build(
        starting_balance: Decimal,
        limits: ProtectionLimits,
        key_capacity: usize,
        file: Option<SnapshotFile>,
    ) -> Self {
        Self {
            ledger: Mutex::new(Ledger::new(
                EquityState::new(starting_balance, Utc::now()),
                key_capacity,
            )),
            writer: Mutex::new(()),
            symbol_locks: DashMap::new(),
            file,
            limits,
            key_capacity,
            starting_balance,
            degraded: RwLock::new(None),
        }
    }

    fn load_from_disk(&self) {
        let Some(file) = &self.file else {
            return;
        };
        let loaded = match file.load() {
            Ok(None) => {
                info!(path = %file.path().display(), "No state snapshot found, starting flat");
                Ok(Ledger::new(
                    EquityState::new(self.starting_balance, Utc::now()),
                    self.key_capacity,
                ))
            }
            Ok(Some(snapshot)) => snapshot.into_ledger(self.key_capacity),
            Err(LoadError::Corrupt(reason)) => Err(reason),
            Err(LoadError::Io(e)) => Err(e.to_string()),
        };
        let _writer = self.writer.lock();
        match loaded {
            Ok(ledger) => {
                info!(
                    path = %file.path().display(),
                    sequence = ledger.sequence,
                    symbols = ledger.symbols.len(),
                    balance = %ledger.equity.balance,
                    "State loaded"
                );
                *self.ledger.lock() = ledger;
                *self.degraded.write() = None;
            }
            Err(reason) => {
                error!(path = %file.path().display(), %reason, "State snapshot is corrupt, store is read-only");
                *self.degraded.write() = Some(reason);
            }
        }
    }

    /// Re-read the snapshot after an operator repaired it.
    pub fn reload(&self) -> Result<(), StoreError> {
        self.load_from_disk();
        self.ensure_writable()
    }

    /// Reason the store is read-only, if it is.
    #[must_use]
    pub fn degraded(&self) -> Option<String> {
        self.degraded.read().clone()
    }

    /// Fails with [`StoreError::StateCorruption`] while degraded.
    pub fn ensure_writable(&self) -> Result<(), StoreError> {
        match &*self.degraded.read() {
            Some(reason) => Err(StoreError::StateCorruption {
                path: self
                    .file
                    .as_ref()
                    .map(|f| f.path().to_path_buf())
                    .unwrap_or_default(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Apply `f` to a copy of the ledger and publish it once persisted.
    fn commit<T>(
        &self,
        f: impl FnOnce(&mut Ledger) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.ensure_writable()?;
        let _writer = self.writer.lock();
        let current = self.ledger.lock().clone();
        let mut next = current.clone();
        let result = f(&mut next)?;
        if next != current {
            next.sequence = current.sequence + 1;
            if let Some(file) = &self.file {
                file.write(&StoreSnapshot::capture(&next))?;
            }
            *self.ledger.lock() = next;
        }
        Ok(result)
    }

    /// Serialize work on one symbol. Hold the guard for the whole pipeline run.
    pub async fn lock_symbol(&self, symbol: &Symbol) -> OwnedMutexGuard<()> {
        let lock = self
            .symbol_locks
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Reserve `symbol` for an entry: `Flat -> PendingEntry`.
    pub fn try_open(
        &self,
        symbol: &Symbol,
        pending: PendingEntry,
        now: DateTime<Utc>,
    ) -> Result<Admission, StoreError> {
        self.commit(|ledger| {
            if ledger.knows_key(&pending.idempotency_key) {
                return Ok(Admission::Rejected(Conflict::DuplicateKey {
                    key: pending.idempotency_key.clone(),
                }));
            }
            let state = ledger.state(symbol);
            if !matches!(state, SymbolState::Flat) {
                return Ok(Admission::Rejected(Conflict::SymbolBusy {
                    symbol: symbol.clone(),
                    state: state.name(),
                }));
            }
            if !ledger.equity.admits_entries(now) {
                warn!(%symbol, mode = ledger.equity.mode.name(), "Entry refused by equity protection");
                return Ok(Admission::Rejected(Conflict::TradingSuspended {
                    mode: ledger.equity.mode.name().to_string(),
                }));
            }
            if ledger.equity.daily_trades_exhausted(now, &self.limits) {
                warn!(%symbol, trades = ledger.equity.session.daily_trades, "Entry refused by daily trade limit");
                return Ok(Admission::Rejected(Conflict::DailyTradeLimit {
                    limit: self.limits.max_daily_trades,
                }));
            }
            ledger.set_state(symbol.clone(), SymbolState::PendingEntry(pending));
            Ok(Admission::Accepted(()))
        })
    }

    /// Commit a filled entry: `PendingEntry -> Open`.
    pub fn confirm_open(&self, symbol: &Symbol, fill: &FillDetails) -> Result<Position, StoreError> {
        self.commit(|ledger| {
            let SymbolState::PendingEntry(pending) = ledger.state(symbol).clone() else {
                return Err(invalid(symbol, ledger.state(symbol), "open"));
            };
            let position = Position::from_fill(symbol.clone(), &pending, fill);
            ledger.applied.insert(pending.idempotency_key);
            ledger.set_state(symbol.clone(), SymbolState::Open(position.clone()));
            info!(
                %symbol,
                side = %position.side(),
                quantity = %position.quantity(),
                entry = %position.entry_price(),
                "Position opened"
            );
            Ok(position)
        })
    }

    /// Release an entry reservation: `PendingEntry -> Flat`.
    pub fn abort_open(&self, symbol: &Symbol) -> Result<(), StoreError> {
        self.commit(|ledger| {
            if !matches!(ledger.state(symbol), SymbolState::PendingEntry(_)) {
                return Err(invalid(symbol, ledger.state(symbol), "flat"));
            }
            ledger.set_state(symbol.clone(), SymbolState::Flat);
            info!(%symbol, "Entry reservation released");
            Ok(())
        })
    }

    /// Reserve the open position for an exit: `Open -> PendingExit`.
    pub fn begin_close(
        &self,
        symbol: &Symbol,
        strategy: &StrategyId,
        side: Side,
        exit_key: &IdempotencyKey,
    ) -> Result<Admission<Position>, StoreError> {
        self.commit(|ledger| {
            if ledger.knows_key(exit_key) {
                return Ok(Admission::Rejected(Conflict::DuplicateKey {
                    key: exit_key.clone(),
                }));
            }
            let position = match ledger.state(symbol) {
                SymbolState::Flat => return Err(StoreError::NoOpenPosition(symbol.to_string())),
                state @ (SymbolState::PendingEntry(_) | SymbolState::PendingExit { .. }) => {
                    return Ok(Admission::Rejected(Conflict::SymbolBusy {
                        symbol: symbol.clone(),
                        state: state.name(),
                    }));
                }
                SymbolState::Open(position) => position.clone(),
            };
            if position.strategy_id() != strategy {
                return Ok(Admission::Rejected(Conflict::NotOwner {
                    owner: position.strategy_id().clone(),
                }));
            }
            if position.side() != side {
                return Ok(Admission::Rejected(Conflict::SideMismatch {
                    open: position.side(),
                }));
            }
            ledger.set_state(
                symbol.clone(),
                SymbolState::PendingExit {
                    position: position.clone(),
                    exit_key: exit_key.clone(),
                },
            );
            Ok(Admission::Accepted(position))
        })
    }

    /// Keep the position after a failed exit: `PendingExit -> Open`.
    pub fn abort_close(&self, symbol: &Symbol) -> Result<(), StoreError> {
        self.commit(|ledger| {
            let SymbolState::PendingExit { position, .. } = ledger.state(symbol).clone() else {
                return Err(invalid(symbol, ledger.state(symbol), "open"));
            };
            ledger.set_state(symbol.clone(), SymbolState::Open(position));
            info!(%symbol, "Exit reservation released, position kept");
            Ok(())
        })
    }

    /// Close the whole position at `exit_price`: `Open | PendingExit -> Flat`.
    ///
    /// Realized PnL is applied to equity in the same commit.
    pub fn close(
        &self,
        symbol: &Symbol,
        exit_price: Price,
        closed_at: DateTime<Utc>,
    ) -> Result<TradeRecord, StoreError> {
        self.close_quantity(symbol, None, exit_price, closed_at)
    }

    /// Book an exit fill.
    ///
    /// A fill smaller than the position closes only the filled quantity;
    /// the remainder goes back to `Open` with its share of the entry risk.
    pub fn close_fill(&self, symbol: &Symbol, fill: &FillDetails) -> Result<TradeRecord, StoreError> {
        self.close_quantity(symbol, Some(fill.quantity), fill.price, fill.filled_at)
    }

    fn close_quantity(
        &self,
        symbol: &Symbol,
        quantity: Option<Quantity>,
        exit_price: Price,
        closed_at: DateTime<Utc>,
    ) -> Result<TradeRecord, StoreError> {
        let limits = self.limits.clone();
        self.commit(|ledger| {
            let (position, exit_key) = match ledger.state(symbol).clone() {
                SymbolState::Open(position) => (position, None),
                SymbolState::PendingExit { position, exit_key } => (position, Some(exit_key)),
                SymbolState::Flat => return Err(StoreError::NoOpenPosition(symbol.to_string())),
                state @ SymbolState::PendingEntry(_) => return Err(invalid(symbol, &state, "flat")),
            };
            let closed = match quantity {
                Some(q) if q > Decimal::ZERO && q < position.quantity() => position.portion(q),
                _ => position.clone(),
            };
            let remaining = position.quantity() - closed.quantity();

            let trade = TradeRecord::close(&closed, exit_price, closed_at);
            ledger.equity.apply_trade(trade.pnl, closed_at, &limits);
            if let Some(key) = exit_key {
                ledger.applied.insert(key);
            }
            if remaining > Decimal::ZERO {
                ledger.set_state(symbol.clone(), SymbolState::Open(position.portion(remaining)));
                info!(
                    %symbol,
                    closed = %closed.quantity(),
                    remaining = %remaining,
                    pnl = %trade.pnl,
                    balance = %ledger.equity.balance,
                    "Position reduced"
                );
            } else {
                ledger.set_state(symbol.clone(), SymbolState::Flat);
                info!(
                    %symbol,
                    pnl = %trade.pnl,
                    r = %trade.r_multiple,
                    balance = %ledger.equity.balance,
                    mode = ledger.equity.mode.name(),
                    "Position closed"
                );
            }
            Ok(trade)
        })
    }

    /// Clear a halt or cooldown. Operator action.
    pub fn resume_trading(&self) -> Result<(), StoreError> {
        self.commit(|ledger| {
            ledger.equity.resume();
            info!("Trading resumed");
            Ok(())
        })
    }

    /// Record divergences found by reconciliation for operator attention.
    pub fn flag_divergences(&self, divergences: Vec<String>) -> Result<(), StoreError> {
        self.commit(|ledger| {
            ledger.divergences = divergences;
            Ok(())
        })
    }

    #[must_use]
    pub fn state(&self, symbol: &Symbol) -> SymbolState {
        self.ledger.lock().state(symbol).clone()
    }

    #[must_use]
    pub fn position(&self, symbol: &Symbol) -> Option<Position> {
        self.ledger.lock().state(symbol).position().cloned()
    }

    #[must_use]
    pub fn equity(&self) -> EquityState {
        self.ledger.lock().equity.clone()
    }

    /// Every non-flat symbol and its state.
    #[must_use]
    pub fn symbols(&self) -> Vec<(Symbol, SymbolState)> {
        self.ledger
            .lock()
            .symbols
            .iter()
            .map(|(symbol, state)| (symbol.clone(), state.clone()))
            .collect()
    }

    #[must_use]
    pub fn export_state(&self) -> StateSnapshot {
        let ledger = self.ledger.lock();
        StateSnapshot {
            taken_at: Utc::now(),
            sequence: ledger.sequence,
            equity: ledger.equity.clone(),
            positions: ledger
                .symbols
                .values()
                .filter_map(SymbolState::position)
                .cloned()
                .collect(),
            pending: ledger
                .symbols
                .iter()
                .filter(|(_, state)| state.is_pending())
                .map(|(symbol, state)| (symbol.clone(), state.name()))
                .collect(),
            divergences: ledger.divergences.clone(),
            degraded: self.degraded(),
        }
    }
}

fn invalid(symbol: &Symbol, from: &SymbolState, to: &'static str) -> StoreError {
    StoreError::InvalidTransition {
        symbol: symbol.to_string(),
        from: from.name(),
        to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, RiskEvaluation};
    use rust_decimal_macros::dec;

    fn pending(key: &str, side: Side) -> PendingEntry {
        PendingEntry {
            side,
            strategy_id: StrategyId::new("trend"),
            idempotency_key: IdempotencyKey::new(key),
            evaluation: RiskEvaluation {
                risk_amount: dec!(100),
                quantity: dec!(10),
                entry_price: dec!(100),
                stop_loss_price: dec!(90),
                take_profit_price: None,
                stop_distance: dec!(10),
                leverage: 1,
            },
            requested_at: Utc::now(),
        }
    }

    fn fill(price: Decimal) -> FillDetails {
        fill_qty(price, dec!(10))
    }

    fn fill_qty(price: Decimal, quantity: Decimal) -> FillDetails {
        FillDetails {
            order_id: Some(OrderId::new("o-1")),
            price,
            quantity,
            filled_at: Utc::now(),
        }
    }

    fn store() -> PositionStore {
        PositionStore::in_memory(dec!(10000), ProtectionLimits::default())
    }

    #[test]
    fn entry_lifecycle() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        assert!(store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap().is_accepted());
        assert_eq!(store.state(&sym).name(), "pending_entry");
        let pos = store.confirm_open(&sym, &fill(dec!(100))).unwrap();
        assert_eq!(pos.entry_price(), dec!(100));
        assert_eq!(store.state(&sym).name(), "open");
    }

    #[test]
    fn second_open_on_busy_symbol_is_rejected() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        let second = store.try_open(&sym, pending("k2", Side::Long), Utc::now()).unwrap();
        assert!(matches!(second, Admission::Rejected(Conflict::SymbolBusy { state: "pending_entry", .. })));
    }

    #[test]
    fn applied_key_is_never_reapplied() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        store.confirm_open(&sym, &fill(dec!(100))).unwrap();
        store.close(&sym, dec!(101), Utc::now()).unwrap();
        let replay = store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        assert!(matches!(replay, Admission::Rejected(Conflict::DuplicateKey { .. })));
    }

    #[test]
    fn aborted_entry_releases_key() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        store.abort_open(&sym).unwrap();
        assert_eq!(store.state(&sym), SymbolState::Flat);
        assert!(store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap().is_accepted());
    }

    #[test]
    fn close_applies_pnl_to_equity() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Short), Utc::now()).unwrap();
        store.confirm_open(&sym, &fill(dec!(100))).unwrap();
        let trade = store.close(&sym, dec!(95), Utc::now()).unwrap();
        assert_eq!(trade.pnl, dec!(50));
        assert_eq!(trade.r_multiple, dec!(0.5));
        assert_eq!(store.equity().balance, dec!(10050));
    }

    #[test]
    fn partial_exit_fill_keeps_remainder_open() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        store.confirm_open(&sym, &fill(dec!(100))).unwrap();
        store
            .begin_close(&sym, &StrategyId::new("trend"), Side::Long, &"x1".into())
            .unwrap();

        let trade = store.close_fill(&sym, &fill_qty(dec!(104), dec!(4))).unwrap();

        assert_eq!(trade.quantity, dec!(4));
        assert_eq!(trade.pnl, dec!(16));
        assert_eq!(trade.r_multiple, dec!(0.4));
        assert_eq!(store.equity().balance, dec!(10016));
        let SymbolState::Open(rest) = store.state(&sym) else {
            panic!("expected remainder open, got {:?}", store.state(&sym));
        };
        assert_eq!(rest.quantity(), dec!(6));
        assert_eq!(rest.risk_amount(), dec!(60));

        // The exit key is spent; a fresh exit closes the rest.
        let replay = store
            .begin_close(&sym, &StrategyId::new("trend"), Side::Long, &"x1".into())
            .unwrap();
        assert!(matches!(replay, Admission::Rejected(Conflict::DuplicateKey { .. })));
        let last = store.close_fill(&sym, &fill_qty(dec!(104), dec!(6))).unwrap();
        assert_eq!(last.pnl, dec!(24));
        assert_eq!(store.state(&sym), SymbolState::Flat);
    }

    #[test]
    fn daily_trade_limit_refuses_entries() {
        let limits = ProtectionLimits {
            max_daily_trades: 1,
            ..ProtectionLimits::default()
        };
        let store = PositionStore::in_memory(dec!(10000), limits);
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        store.confirm_open(&sym, &fill(dec!(100))).unwrap();
        store.close(&sym, dec!(101), Utc::now()).unwrap();

        let refused = store.try_open(&sym, pending("k2", Side::Long), Utc::now()).unwrap();
        assert!(matches!(refused, Admission::Rejected(Conflict::DailyTradeLimit { limit: 1 })));
        assert_eq!(store.state(&sym), SymbolState::Flat);
    }

    #[test]
    fn reads_do_not_wait_for_a_commit_in_progress() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();

        let _writing = store.writer.lock();
        assert_eq!(store.state(&sym).name(), "pending_entry");
        assert_eq!(store.equity().balance, dec!(10000));
        assert_eq!(store.export_state().sequence, 1);
    }

    #[test]
    fn close_on_flat_is_no_open_position() {
        let err = store().close(&Symbol::new("X"), dec!(1), Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NoOpenPosition(_)));
    }

    #[test]
    fn exit_reservation_checks_owner_and_side() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        store.confirm_open(&sym, &fill(dec!(100))).unwrap();

        let other = store
            .begin_close(&sym, &StrategyId::new("other"), Side::Long, &"x1".into())
            .unwrap();
        assert!(matches!(other, Admission::Rejected(Conflict::NotOwner { .. })));

        let wrong_side = store
            .begin_close(&sym, &StrategyId::new("trend"), Side::Short, &"x1".into())
            .unwrap();
        assert!(matches!(wrong_side, Admission::Rejected(Conflict::SideMismatch { .. })));

        let ok = store
            .begin_close(&sym, &StrategyId::new("trend"), Side::Long, &"x1".into())
            .unwrap();
        assert!(ok.is_accepted());
        store.abort_close(&sym).unwrap();
        assert_eq!(store.state(&sym).name(), "open");
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        assert!(matches!(
            store.confirm_open(&sym, &fill(dec!(1))),
            Err(StoreError::InvalidTransition { from: "flat", .. })
        ));
        assert!(store.abort_close(&sym).is_err());
    }

    #[test]
    fn export_hides_pending_entries_from_positions() {
        let store = store();
        let sym = Symbol::new("SOLUSDT");
        store.try_open(&sym, pending("k1", Side::Long), Utc::now()).unwrap();
        let snap = store.export_state();
        assert!(snap.positions.is_empty());
        assert_eq!(snap.pending, vec![(sym, "pending_entry")]);
    }

    #[test]
    fn halted_store_refuses_entries_but_allows_exits() {
        let limits = ProtectionLimits {
            global_drawdown_pct: dec!(0.001),
            ..ProtectionLimits::default()
        };
        let store = PositionStore::in_memory(dec!(10000), limits);
        let a = Symbol::new("AAA");
        let b = Symbol::new("BBB");
        store.try_open(&a, pending("k1", Side::Long), Utc::now()).unwrap();
        store.confirm_open(&a, &fill(dec!(100))).unwrap();
        store.try_open(&b, pending("k2", Side::Long), Utc::now()).unwrap();
        store.confirm_open(&b, &fill(dec!(100))).unwrap();
        store.close(&a, dec!(99), Utc::now()).unwrap();
        assert_eq!(store.equity().mode.name(), "halted");

        let refused = store.try_open(&a, pending("k3", Side::Long), Utc::now()).unwrap();
        assert!(matches!(refused, Admission::Rejected(Conflict::TradingSuspended { .. })));
        assert!(store.close(&b, dec!(101), Utc::now()).is_ok());

        store.resume_trading().unwrap();
        assert!(store.try_open(&a, pending("k4", Side::Long), Utc::now()).unwrap().is_accepted());
    }
}
