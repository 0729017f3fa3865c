//! Completed trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Position, Price, Quantity, Side, StrategyId, Symbol};

/// A closed round trip. `pnl` is what the equity ledger applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub entry_price: Price,
    pub exit_price: Price,
    pub pnl: Decimal,
    /// PnL in units of the risk taken at entry.
    pub r_multiple: Decimal,
    pub strategy_id: StrategyId,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl TradeRecord {
    #[must_use]
    pub fn close(position: &Position, exit_price: Price, closed_at: DateTime<Utc>) -> Self {
        let pnl = position.pnl_at(exit_price);
        let r_multiple = if position.risk_amount() > Decimal::ZERO {
            (pnl / position.risk_amount()).round_dp(4)
        } else {
            Decimal::ZERO
        };
        Self {
            symbol: position.symbol().clone(),
            side: position.side(),
            quantity: position.quantity(),
            entry_price: position.entry_price(),
            exit_price,
            pnl,
            r_multiple,
            strategy_id: position.strategy_id().clone(),
            opened_at: position.opened_at(),
            closed_at,
        }
    }
}
