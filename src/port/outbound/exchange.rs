//! Exchange port for order execution and account queries.
//!
//! Every order carries the signal's idempotency key as its client order id,
//! so cancellations and status queries can address an order even when the
//! placement response was lost.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{IdempotencyKey, OrderId, Price, Quantity, Side, Symbol};
use crate::error::ExchangeError;

/// Exchange-side direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that opens a position in `side`.
    #[must_use]
    pub const fn opening(side: Side) -> Self {
        match side {
            Side::Long => Self::Buy,
            Side::Short => Self::Sell,
        }
    }

    /// Side that closes a position in `side`.
    #[must_use]
    pub const fn closing(side: Side) -> Self {
        match side {
            Side::Long => Self::Sell,
            Side::Short => Self::Buy,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        }
    }
}

/// An order to place on the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub quantity: Quantity,
    /// Price the order was sized against. Used as the fill price when the
    /// exchange does not report one.
    pub reference_price: Price,
    pub reduce_only: bool,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
    pub client_order_id: IdempotencyKey,
}

/// Exchange view of an order's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    /// The exchange has no order with this client order id.
    NotFound,
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected { reason: String },
}

impl OrderState {
    /// No further fills can happen.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected { .. })
    }

    /// The order may still fill.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Working | Self::PartiallyFilled)
    }
}

/// Order status as reported by placement or by a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReport {
    pub order_id: Option<OrderId>,
    pub state: OrderState,
    pub filled_quantity: Quantity,
    pub average_price: Option<Price>,
}

impl OrderReport {
    #[must_use]
    pub const fn not_found() -> Self {
        Self {
            order_id: None,
            state: OrderState::NotFound,
            filled_quantity: Decimal::ZERO,
            average_price: None,
        }
    }
}

/// A live position as the exchange sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangePosition {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Quantity,
    pub entry_price: Price,
}

/// Order execution and account queries against one venue.
///
/// Implementations classify failures into [`ExchangeError::Transient`] and
/// [`ExchangeError::Permanent`]; retrying is the caller's concern.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit an order. Sending a client order id the venue has already
    /// seen must not create a second order.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReport, ExchangeError>;

    /// Cancel any unfilled remainder of the order.
    async fn cancel_order(
        &self,
        symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<(), ExchangeError>;

    /// Current position for `symbol`, `None` when flat.
    async fn get_position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>, ExchangeError>;

    /// Status of a previously submitted order.
    async fn get_order_status(
        &self,
        symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<OrderReport, ExchangeError>;

    /// Venue name for logs.
    fn exchange_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_side_mapping() {
        assert_eq!(OrderSide::opening(Side::Long), OrderSide::Buy);
        assert_eq!(OrderSide::closing(Side::Long), OrderSide::Sell);
        assert_eq!(OrderSide::opening(Side::Short), OrderSide::Sell);
        assert_eq!(OrderSide::closing(Side::Short), OrderSide::Buy);
    }

    #[test]
    fn order_state_classification() {
        assert!(OrderState::Filled.is_terminal());
        assert!(OrderState::Rejected { reason: "x".into() }.is_terminal());
        assert!(OrderState::Working.is_live());
        assert!(!OrderState::NotFound.is_live());
        assert!(!OrderState::NotFound.is_terminal());
    }
}
