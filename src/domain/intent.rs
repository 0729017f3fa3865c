//! Order intents produced by strategy routing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{IdempotencyKey, Price, Quantity, Side, StrategyId, Symbol};

/// What the pipeline should do with the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentAction {
    /// Open a new position on `side`.
    Entry,
    /// Close the open position on `side`.
    Exit,
    /// Close an opposite position if one is open, then open on `side`.
    Reverse,
}

impl IntentAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Reverse => "reverse",
        }
    }
}

/// A routed signal with the owning strategy's parameters attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub action: IntentAction,
    pub reference_price: Price,
    pub strategy_id: StrategyId,
    /// Absolute stop distance suggested by the strategy, in price units.
    pub stop_distance_hint: Option<Price>,
    /// Take-profit distance as a multiple of the stop distance.
    pub take_profit_ratio: Option<Decimal>,
    /// Strategy-level risk fraction; never raises the global setting.
    pub risk_per_trade_pct: Option<Decimal>,
    /// Strategy-level cap on position size.
    pub max_position_qty: Option<Quantity>,
    pub idempotency_key: IdempotencyKey,
    pub signal_time: DateTime<Utc>,
}
