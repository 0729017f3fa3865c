//! In-memory paper exchange.
//!
//! Market orders fill immediately at their reference price. Orders are
//! remembered by client order id, so resending a key returns the original
//! report instead of trading twice.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{IdempotencyKey, OrderId, Side, Symbol};
use crate::error::{ExchangeError, PermanentError};
use crate::port::outbound::exchange::{
    ExchangeClient, ExchangePosition, OrderReport, OrderRequest, OrderSide, OrderState,
};

#[derive(Default)]
struct Book {
    orders: HashMap<IdempotencyKey, OrderReport>,
    positions: HashMap<Symbol, ExchangePosition>,
}

/// Exchange simulator used for dry runs and tests.
#[derive(Default)]
pub struct PaperExchange {
    book: Mutex<Book>,
}

impl PaperExchange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All open positions, in no particular order.
    #[must_use]
    pub fn positions(&self) -> Vec<ExchangePosition> {
        self.book.lock().positions.values().cloned().collect()
    }

    /// Number of distinct orders accepted so far.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.book.lock().orders.len()
    }

    fn apply_fill(positions: &mut HashMap<Symbol, ExchangePosition>, order: &OrderRequest) {
        let side = match order.side {
            OrderSide::Buy => Side::Long,
            OrderSide::Sell => Side::Short,
        };
        let Some(existing) = positions.get_mut(&order.symbol) else {
            if !order.reduce_only {
                positions.insert(
                    order.symbol.clone(),
                    ExchangePosition {
                        symbol: order.symbol.clone(),
                        side,
                        quantity: order.quantity,
                        entry_price: order.reference_price,
                    },
                );
            }
            return;
        };

        if existing.side == side {
            let total = existing.quantity + order.quantity;
            existing.entry_price = (existing.entry_price * existing.quantity
                + order.reference_price * order.quantity)
                / total;
            existing.quantity = total;
            return;
        }

        let remaining = existing.quantity - order.quantity;
        if remaining > Decimal::ZERO {
            existing.quantity = remaining;
        } else if remaining < Decimal::ZERO && !order.reduce_only {
            existing.side = side;
            existing.quantity = -remaining;
            existing.entry_price = order.reference_price;
        } else {
            positions.remove(&order.symbol);
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReport, ExchangeError> {
        if order.quantity <= Decimal::ZERO {
            return Err(PermanentError::InvalidQuantity(order.quantity.to_string()).into());
        }

        let mut book = self.book.lock();
        if let Some(report) = book.orders.get(&order.client_order_id) {
            debug!(key = %order.client_order_id, "Duplicate client order id, returning original report");
            return Ok(report.clone());
        }

        let Book { orders, positions } = &mut *book;
        Self::apply_fill(positions, order);
        let report = OrderReport {
            order_id: Some(OrderId::new(Uuid::new_v4().to_string())),
            state: OrderState::Filled,
            filled_quantity: order.quantity,
            average_price: Some(order.reference_price),
        };
        orders.insert(order.client_order_id.clone(), report.clone());
        debug!(
            symbol = %order.symbol,
            side = order.side.as_str(),
            qty = %order.quantity,
            price = %order.reference_price,
            "Paper order filled"
        );
        Ok(report)
    }

    async fn cancel_order(
        &self,
        _symbol: &Symbol,
        _client_order_id: &IdempotencyKey,
    ) -> Result<(), ExchangeError> {
        // Paper orders fill on placement; there is never a remainder.
        Ok(())
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>, ExchangeError> {
        Ok(self.book.lock().positions.get(symbol).cloned())
    }

    async fn get_order_status(
        &self,
        _symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<OrderReport, ExchangeError> {
        Ok(self
            .book
            .lock()
            .orders
            .get(client_order_id)
            .cloned()
            .unwrap_or_else(OrderReport::not_found))
    }

    fn exchange_name(&self) -> &'static str {
        "paper"
    }
}
