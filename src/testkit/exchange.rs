//! Scriptable [`ExchangeClient`] for tests.
//!
//! [`ScriptedExchange`] behaves like the paper exchange unless told
//! otherwise. Each `place_order` call pops the next [`PlaceStep`]; status
//! queries can be made to fail with queued errors first. Call counters let
//! tests assert that no order was sent twice.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::adapter::outbound::paper::PaperExchange;
use crate::domain::{IdempotencyKey, Symbol};
use crate::error::{ExchangeError, PermanentError, TransientError};
use crate::port::outbound::exchange::{
    ExchangeClient, ExchangePosition, OrderReport, OrderRequest, OrderState,
};

/// What the next `place_order` call does.
#[derive(Debug, Clone)]
pub enum PlaceStep {
    /// Fill in full at the reference price.
    Fill,
    /// Fail before the venue sees the order.
    Fail(ExchangeError),
    /// The venue reports the order as rejected.
    Reject(String),
    /// Fill on the venue, then lose the response.
    FillThenFail(ExchangeError),
    /// Fill on the venue, then hang for the given time.
    FillThenHang(Duration),
    /// Fill `filled` and leave the rest working until cancelled.
    Partial { filled: Decimal },
}

impl PlaceStep {
    #[must_use]
    pub fn timeout() -> Self {
        Self::Fail(TransientError::Timeout { after_ms: 10 }.into())
    }

    #[must_use]
    pub fn connection_reset() -> Self {
        Self::Fail(TransientError::Connection("connection reset".into()).into())
    }

    #[must_use]
    pub fn rate_limited() -> Self {
        Self::Fail(TransientError::RateLimited("too many requests".into()).into())
    }

    #[must_use]
    pub fn insufficient_margin() -> Self {
        Self::Fail(PermanentError::InsufficientMargin("not enough".into()).into())
    }

    /// Accepted and filled, but the caller sees a timeout.
    #[must_use]
    pub fn filled_but_timed_out() -> Self {
        Self::FillThenFail(TransientError::Timeout { after_ms: 10 }.into())
    }
}

#[derive(Default)]
struct Script {
    place: VecDeque<PlaceStep>,
    status_errors: VecDeque<ExchangeError>,
    /// Reports that differ from the inner paper book (partial fills, rejects).
    reports: HashMap<IdempotencyKey, OrderReport>,
    /// Positions injected or removed behind the engine's back.
    positions: HashMap<Symbol, Option<ExchangePosition>>,
}

pub struct ScriptedExchange {
    book: PaperExchange,
    script: Mutex<Script>,
    place_delay: Duration,
    place_count: AtomicU32,
    status_count: AtomicU32,
    cancel_count: AtomicU32,
}

impl ScriptedExchange {
    #[must_use]
    pub fn new() -> Self {
        Self {
            book: PaperExchange::new(),
            script: Mutex::new(Script::default()),
            place_delay: Duration::ZERO,
            place_count: AtomicU32::new(0),
            status_count: AtomicU32::new(0),
            cancel_count: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn with_place_steps(self, steps: Vec<PlaceStep>) -> Self {
        self.script.lock().place = steps.into();
        self
    }

    /// Fail the next `n` status queries with a connection error.
    #[must_use]
    pub fn with_status_failures(self, n: u32) -> Self {
        self.script.lock().status_errors.extend(
            (0..n).map(|_| TransientError::Connection("status unavailable".into()).into()),
        );
        self
    }

    /// Fail the next status query with `error`, after any already queued.
    #[must_use]
    pub fn with_status_error(self, error: ExchangeError) -> Self {
        self.script.lock().status_errors.push_back(error);
        self
    }

    /// Wait before answering each placement.
    #[must_use]
    pub fn with_place_delay(mut self, delay: Duration) -> Self {
        self.place_delay = delay;
        self
    }

    pub fn push_place_step(&self, step: PlaceStep) {
        self.script.lock().place.push_back(step);
    }

    /// Report `position` for its symbol regardless of the order history.
    pub fn set_position(&self, position: ExchangePosition) {
        self.script
            .lock()
            .positions
            .insert(position.symbol.clone(), Some(position));
    }

    /// Report `symbol` as flat.
    pub fn clear_position(&self, symbol: &Symbol) {
        self.script.lock().positions.insert(symbol.clone(), None);
    }

    pub fn place_count(&self) -> u32 {
        self.place_count.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> u32 {
        self.status_count.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> u32 {
        self.cancel_count.load(Ordering::SeqCst)
    }

    /// Distinct orders that reached the venue.
    pub fn accepted_orders(&self) -> usize {
        self.book.order_count()
    }

    async fn fill(&self, order: &OrderRequest, quantity: Decimal) -> Result<OrderReport, ExchangeError> {
        let partial = OrderRequest {
            quantity,
            ..order.clone()
        };
        self.book.place_order(&partial).await
    }
}

impl Default for ScriptedExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for ScriptedExchange {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReport, ExchangeError> {
        self.place_count.fetch_add(1, Ordering::SeqCst);
        if !self.place_delay.is_zero() {
            tokio::time::sleep(self.place_delay).await;
        }
        let step = self.script.lock().place.pop_front().unwrap_or(PlaceStep::Fill);
        match step {
            PlaceStep::Fill => self.fill(order, order.quantity).await,
            PlaceStep::Fail(e) => Err(e),
            PlaceStep::Reject(reason) => {
                let report = OrderReport {
                    state: OrderState::Rejected { reason },
                    ..OrderReport::not_found()
                };
                self.script
                    .lock()
                    .reports
                    .insert(order.client_order_id.clone(), report.clone());
                Ok(report)
            }
            PlaceStep::FillThenFail(e) => {
                self.fill(order, order.quantity).await?;
                Err(e)
            }
            PlaceStep::FillThenHang(duration) => {
                let report = self.fill(order, order.quantity).await?;
                tokio::time::sleep(duration).await;
                Ok(report)
            }
            PlaceStep::Partial { filled } => {
                let mut report = self.fill(order, filled).await?;
                report.state = OrderState::PartiallyFilled;
                self.script
                    .lock()
                    .reports
                    .insert(order.client_order_id.clone(), report.clone());
                Ok(report)
            }
        }
    }

    async fn cancel_order(
        &self,
        _symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<(), ExchangeError> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        if let Some(report) = self.script.lock().reports.get_mut(client_order_id) {
            if report.state.is_live() {
                report.state = OrderState::Cancelled;
            }
        }
        Ok(())
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>, ExchangeError> {
        let injected = self.script.lock().positions.get(symbol).cloned();
        match injected {
            Some(position) => Ok(position),
            None => self.book.get_position(symbol).await,
        }
    }

    async fn get_order_status(
        &self,
        symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<OrderReport, ExchangeError> {
        self.status_count.fetch_add(1, Ordering::SeqCst);
        let scripted = {
            let mut script = self.script.lock();
            if let Some(error) = script.status_errors.pop_front() {
                return Err(error);
            }
            script.reports.get(client_order_id).cloned()
        };
        match scripted {
            Some(report) => Ok(report),
            None => self.book.get_order_status(symbol, client_order_id).await,
        }
    }

    fn exchange_name(&self) -> &'static str {
        "scripted"
    }
}
