//! Strategy registry and signal routing.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::{
    IntentAction, OppositeEntry, OrderIntent, Signal, SignalAction, StrategyId, StrategySpec,
};
use crate::error::RoutingError;

/// Registered strategies keyed by id.
///
/// Routing is a pure lookup: it never consults position state, so an
/// entry on a strategy configured to reverse always yields
/// [`IntentAction::Reverse`] and the pipeline decides whether a close is
/// actually needed.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<StrategyId, StrategySpec>,
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a strategy.
    pub fn register(&mut self, spec: StrategySpec) {
        self.strategies.insert(spec.id.clone(), spec);
    }

    #[must_use]
    pub fn get(&self, id: &StrategyId) -> Option<&StrategySpec> {
        self.strategies.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Map a validated signal onto an [`OrderIntent`].
    pub fn route(&self, signal: &Signal) -> Result<OrderIntent, RoutingError> {
        let spec = self
            .strategies
            .get(&signal.strategy_id)
            .filter(|spec| spec.enabled)
            .ok_or_else(|| {
                warn!(strategy = %signal.strategy_id, "Signal for unknown or disabled strategy");
                RoutingError::UnknownStrategy(signal.strategy_id.to_string())
            })?;

        if spec.instrument != signal.symbol {
            return Err(RoutingError::SymbolMismatch {
                strategy: spec.id.to_string(),
                expected: spec.instrument.to_string(),
                received: signal.symbol.to_string(),
            });
        }

        let action = match signal.action {
            SignalAction::Exit => IntentAction::Exit,
            SignalAction::Entry => {
                if !spec.sides.allows(signal.side) {
                    return Err(RoutingError::SideNotAllowed {
                        strategy: spec.id.to_string(),
                        side: signal.side.to_string(),
                    });
                }
                match spec.opposite_entry {
                    OppositeEntry::Ignore => IntentAction::Entry,
                    OppositeEntry::Reverse => IntentAction::Reverse,
                }
            }
        };

        Ok(OrderIntent {
            symbol: signal.symbol.clone(),
            side: signal.side,
            action,
            reference_price: signal.price,
            strategy_id: spec.id.clone(),
            stop_distance_hint: spec.stop.map(|stop| stop.distance(signal.price)),
            take_profit_ratio: spec.take_profit_ratio,
            risk_per_trade_pct: spec.risk_per_trade_pct,
            max_position_qty: spec.max_position_qty,
            idempotency_key: signal.idempotency_key(),
            signal_time: signal.timestamp,
        })
    }
}

impl FromIterator<StrategySpec> for StrategyRegistry {
    fn from_iter<I: IntoIterator<Item = StrategySpec>>(iter: I) -> Self {
        let mut registry = Self::new();
        for spec in iter {
            registry.register(spec);
        }
        registry
    }
}
