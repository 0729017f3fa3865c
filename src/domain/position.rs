//! Per-symbol position lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{IdempotencyKey, OrderId, Price, Quantity, RiskEvaluation, Side, StrategyId, Symbol};

/// An open position as recorded locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    symbol: Symbol,
    side: Side,
    quantity: Quantity,
    entry_price: Price,
    stop_loss: Price,
    take_profit: Option<Price>,
    opened_at: DateTime<Utc>,
    idempotency_key: IdempotencyKey,
    strategy_id: StrategyId,
    /// Capital at risk when the position was sized; the denominator of R.
    risk_amount: Decimal,
    order_id: Option<OrderId>,
}

impl Position {
    /// Build the position that results from filling a pending entry.
    #[must_use]
    pub fn from_fill(symbol: Symbol, pending: &PendingEntry, fill: &FillDetails) -> Self {
        Self {
            symbol,
            side: pending.side,
            quantity: fill.quantity,
            entry_price: fill.price,
            stop_loss: pending.evaluation.stop_loss_price,
            take_profit: pending.evaluation.take_profit_price,
            opened_at: fill.filled_at,
            idempotency_key: pending.idempotency_key.clone(),
            strategy_id: pending.strategy_id.clone(),
            risk_amount: pending.evaluation.risk_amount,
            order_id: fill.order_id.clone(),
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }

    #[must_use]
    pub const fn entry_price(&self) -> Price {
        self.entry_price
    }

    #[must_use]
    pub const fn stop_loss(&self) -> Price {
        self.stop_loss
    }

    #[must_use]
    pub const fn take_profit(&self) -> Option<Price> {
        self.take_profit
    }

    #[must_use]
    pub const fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    #[must_use]
    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    #[must_use]
    pub fn strategy_id(&self) -> &StrategyId {
        &self.strategy_id
    }

    #[must_use]
    pub const fn risk_amount(&self) -> Decimal {
        self.risk_amount
    }

    #[must_use]
    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    /// The same position scaled to `quantity`, with the entry risk shared
    /// out pro rata.
    #[must_use]
    pub fn portion(&self, quantity: Quantity) -> Self {
        let risk_amount = if self.quantity > Decimal::ZERO {
            self.risk_amount * quantity / self.quantity
        } else {
            self.risk_amount
        };
        Self {
            quantity,
            risk_amount,
            ..self.clone()
        }
    }

    /// Realized PnL if the whole position is closed at `exit_price`.
    #[must_use]
    pub fn pnl_at(&self, exit_price: Price) -> Decimal {
        (exit_price - self.entry_price) * self.quantity * self.side.sign()
    }
}

/// Execution details reported for a filled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillDetails {
    pub order_id: Option<OrderId>,
    pub price: Price,
    pub quantity: Quantity,
    pub filled_at: DateTime<Utc>,
}

/// An entry reserved in the store while its order is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub side: Side,
    pub strategy_id: StrategyId,
    pub idempotency_key: IdempotencyKey,
    pub evaluation: RiskEvaluation,
    pub requested_at: DateTime<Utc>,
}

/// Lifecycle state of one symbol. A symbol absent from the store is `Flat`.
///
/// Legal transitions:
/// `Flat -> PendingEntry -> {Open, Flat}`,
/// `Open -> PendingExit -> {Flat, Open}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SymbolState {
    Flat,
    PendingEntry(PendingEntry),
    Open(Position),
    PendingExit {
        position: Position,
        exit_key: IdempotencyKey,
    },
}

impl SymbolState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::PendingEntry(_) => "pending_entry",
            Self::Open(_) => "open",
            Self::PendingExit { .. } => "pending_exit",
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::PendingEntry(_) | Self::PendingExit { .. })
    }

    /// The committed position, if any. Pending exits still hold one.
    #[must_use]
    pub const fn position(&self) -> Option<&Position> {
        match self {
            Self::Open(position) | Self::PendingExit { position, .. } => Some(position),
            Self::Flat | Self::PendingEntry(_) => None,
        }
    }
}

impl fmt::Display for SymbolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
