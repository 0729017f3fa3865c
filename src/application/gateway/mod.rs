//! Execution gateway.
//!
//! Submits orders with bounded retries and resolves ambiguous outcomes by
//! asking the exchange before doing anything else. An order whose
//! placement may have reached the venue is never re-sent until a status
//! query has shown it does not exist.

mod reconcile;
mod retry;

pub use reconcile::{Divergence, ReconciliationReport, Resolution};
pub use retry::RetryPolicy;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::domain::{FillDetails, IdempotencyKey, PendingEntry, Position, Symbol};
use crate::error::{ExchangeError, PermanentError, TransientError};
use crate::port::outbound::exchange::{
    ExchangeClient, ExchangePosition, OrderReport, OrderRequest, OrderSide, OrderState,
};

/// Timing knobs for a single order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Per-request deadline; expiry counts as an ambiguous transient failure.
    pub request_timeout: Duration,
    /// Status polls while an order is still working.
    pub fill_poll_attempts: u32,
    pub fill_poll_interval: Duration,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            fill_poll_attempts: 5,
            fill_poll_interval: Duration::from_millis(500),
        }
    }
}

/// Final answer for one submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Fully or partially filled; `quantity` is what actually executed.
    Filled(FillDetails),
    /// The venue refused the order or it was cancelled with nothing filled.
    Rejected { reason: String },
    /// The venue could not tell us; the order may still exist.
    Pending,
}

/// Order for the entry reserved in `pending`.
#[must_use]
pub fn entry_order(symbol: &Symbol, pending: &PendingEntry) -> OrderRequest {
    OrderRequest {
        symbol: symbol.clone(),
        side: OrderSide::opening(pending.side),
        quantity: pending.evaluation.quantity,
        reference_price: pending.evaluation.entry_price,
        reduce_only: false,
        stop_loss: Some(pending.evaluation.stop_loss_price),
        take_profit: pending.evaluation.take_profit_price,
        client_order_id: pending.idempotency_key.clone(),
    }
}

/// Reduce-only order that flattens `position`.
#[must_use]
pub fn exit_order(position: &Position, exit_key: &IdempotencyKey, reference_price: Decimal) -> OrderRequest {
    OrderRequest {
        symbol: position.symbol().clone(),
        side: OrderSide::closing(position.side()),
        quantity: position.quantity(),
        reference_price,
        reduce_only: true,
        stop_loss: None,
        take_profit: None,
        client_order_id: exit_key.clone(),
    }
}

/// Default bound on remembered order outcomes.
pub const DEFAULT_OUTCOME_CAPACITY: usize = 10_000;

pub struct ExecutionGateway {
    client: Arc<dyn ExchangeClient>,
    retry: RetryPolicy,
    settings: ExecutionSettings,
    /// Outcomes by client order id; a replayed key is answered from here.
    outcomes: DashMap<IdempotencyKey, SubmitOutcome>,
    /// Insertion order of `outcomes`, oldest first.
    outcome_order: Mutex<VecDeque<IdempotencyKey>>,
    outcome_capacity: usize,
}

impl ExecutionGateway {
    #[must_use]
    pub fn new(client: Arc<dyn ExchangeClient>, retry: RetryPolicy, settings: ExecutionSettings) -> Self {
        Self {
            client,
            retry,
            settings,
            outcomes: DashMap::new(),
            outcome_order: Mutex::new(VecDeque::new()),
            outcome_capacity: DEFAULT_OUTCOME_CAPACITY,
        }
    }

    /// Remember at most `capacity` outcomes, forgetting the oldest first.
    ///
    /// A forgotten key is still safe to resend: the exchange deduplicates on
    /// the client order id and the store on the idempotency key.
    #[must_use]
    pub fn with_outcome_capacity(mut self, capacity: usize) -> Self {
        self.outcome_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn exchange_name(&self) -> &'static str {
        self.client.exchange_name()
    }

    /// Submit `order`, retrying transient failures within the budget.
    ///
    /// Exhausting the budget on an order that provably never reached the
    /// venue escalates to [`PermanentError::RetriesExhausted`]. If the order
    /// may exist, the result is [`SubmitOutcome::Pending`] instead.
    pub async fn submit(&self, order: &OrderRequest) -> Result<SubmitOutcome, ExchangeError> {
        let known = self
            .outcomes
            .get(&order.client_order_id)
            .map(|entry| entry.value().clone());
        match known {
            // Still unknown if the venue cannot be asked.
            Some(SubmitOutcome::Pending) => {
                return Ok(self.resolve(order).await.unwrap_or(SubmitOutcome::Pending));
            }
            Some(outcome) => {
                info!(key = %order.client_order_id, "Order already submitted, returning recorded outcome");
                return Ok(outcome);
            }
            None => {}
        }

        let outcome = self.submit_fresh(order).await?;
        self.remember(order, &outcome);
        Ok(outcome)
    }

    /// Settle an order of unknown fate using status queries only.
    ///
    /// An order the venue has never seen is reported as rejected.
    pub async fn resolve(&self, order: &OrderRequest) -> Result<SubmitOutcome, ExchangeError> {
        let report = self.retrying("order status", || self.query(order)).await?;
        let outcome = if report.state == OrderState::NotFound {
            SubmitOutcome::Rejected {
                reason: "order not found on exchange".into(),
            }
        } else {
            self.settle(order, report).await?
        };
        self.remember(order, &outcome);
        Ok(outcome)
    }

    /// Exchange position for `symbol`, retried within the budget.
    pub async fn position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>, ExchangeError> {
        self.retrying("position query", || async {
            match timeout(self.settings.request_timeout, self.client.get_position(symbol)).await {
                Ok(result) => result,
                Err(_) => Err(self.timeout_error()),
            }
        })
        .await
    }

    fn remember(&self, order: &OrderRequest, outcome: &SubmitOutcome) {
        let key = &order.client_order_id;
        if self.outcomes.insert(key.clone(), outcome.clone()).is_some() {
            return;
        }
        let mut queue = self.outcome_order.lock();
        queue.push_back(key.clone());
        while queue.len() > self.outcome_capacity {
            if let Some(oldest) = queue.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
    }

    async fn submit_fresh(&self, order: &OrderRequest) -> Result<SubmitOutcome, ExchangeError> {
        let mut attempt = 0u32;
        let mut uncertain = false;
        let mut last_error = String::new();

        loop {
            attempt += 1;

            if uncertain {
                match self.query(order).await {
                    Ok(report) if report.state != OrderState::NotFound => {
                        info!(key = %order.client_order_id, state = ?report.state, "Order found after ambiguous failure");
                        return self.settle(order, report).await;
                    }
                    Ok(_) => {
                        debug!(key = %order.client_order_id, "Order not on exchange, safe to send");
                        uncertain = false;
                    }
                    Err(ExchangeError::Permanent(e)) => {
                        warn!(error = %e, key = %order.client_order_id, "Status query refused, order fate unknown");
                        return Ok(SubmitOutcome::Pending);
                    }
                    Err(ExchangeError::Transient(e)) => {
                        warn!(attempt, error = %e, key = %order.client_order_id, "Status query failed");
                        last_error = e.to_string();
                        if self.retry.exhausted(attempt) {
                            warn!(key = %order.client_order_id, "Order fate unknown, leaving pending");
                            return Ok(SubmitOutcome::Pending);
                        }
                        sleep(self.retry.delay_after(attempt)).await;
                        continue;
                    }
                }
            }

            match self.place(order).await {
                Ok(report) => return self.settle(order, report).await,
                Err(ExchangeError::Permanent(e)) => {
                    warn!(error = %e, key = %order.client_order_id, "Order rejected");
                    return Err(e.into());
                }
                Err(ExchangeError::Transient(e)) => {
                    warn!(attempt, error = %e, key = %order.client_order_id, "Order placement failed");
                    uncertain = e.is_ambiguous();
                    last_error = e.to_string();
                }
            }

            if self.retry.exhausted(attempt) {
                if uncertain {
                    return match self.query(order).await {
                        Ok(report) if report.state != OrderState::NotFound => {
                            self.settle(order, report).await
                        }
                        Ok(_) => Err(exhausted(attempt, last_error)),
                        Err(_) => Ok(SubmitOutcome::Pending),
                    };
                }
                return Err(exhausted(attempt, last_error));
            }
            sleep(self.retry.delay_after(attempt)).await;
        }
    }

    async fn place(&self, order: &OrderRequest) -> Result<OrderReport, ExchangeError> {
        debug!(
            exchange = self.client.exchange_name(),
            symbol = %order.symbol,
            side = order.side.as_str(),
            quantity = %order.quantity,
            key = %order.client_order_id,
            "Placing order"
        );
        match timeout(self.settings.request_timeout, self.client.place_order(order)).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn query(&self, order: &OrderRequest) -> Result<OrderReport, ExchangeError> {
        let request = self
            .client
            .get_order_status(&order.symbol, &order.client_order_id);
        match timeout(self.settings.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn cancel(&self, order: &OrderRequest) -> Result<(), ExchangeError> {
        let request = self
            .client
            .cancel_order(&order.symbol, &order.client_order_id);
        match timeout(self.settings.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn timeout_error(&self) -> ExchangeError {
        TransientError::Timeout {
            after_ms: u64::try_from(self.settings.request_timeout.as_millis()).unwrap_or(u64::MAX),
        }
        .into()
    }

    /// Turn a placement or status report into a final outcome.
    ///
    /// Working orders are polled; whatever is still unfilled afterwards is
    /// cancelled and the executed part is accepted. The order exists on the
    /// venue, so a failed poll leaves it pending rather than failed.
    async fn settle(&self, order: &OrderRequest, mut report: OrderReport) -> Result<SubmitOutcome, ExchangeError> {
        let mut polls = 0;
        while report.state.is_live() && polls < self.settings.fill_poll_attempts {
            polls += 1;
            sleep(self.settings.fill_poll_interval).await;
            match self.query(order).await {
                Ok(next) => report = next,
                Err(ExchangeError::Transient(e)) => {
                    debug!(error = %e, "Fill poll failed");
                }
                Err(e) => {
                    warn!(error = %e, key = %order.client_order_id, "Fill poll refused, order left pending");
                    return Ok(SubmitOutcome::Pending);
                }
            }
        }

        if report.state.is_live() {
            info!(key = %order.client_order_id, filled = %report.filled_quantity, "Cancelling unfilled remainder");
            if let Err(e) = self.retrying("cancel", || self.cancel(order)).await {
                warn!(error = %e, key = %order.client_order_id, "Cancel failed, order left pending");
                return Ok(SubmitOutcome::Pending);
            }
            report = match self.retrying("order status", || self.query(order)).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, key = %order.client_order_id, "Status after cancel unknown");
                    return Ok(SubmitOutcome::Pending);
                }
            };
            if report.state.is_live() {
                return Ok(SubmitOutcome::Pending);
            }
        }

        Ok(match report.state {
            OrderState::Filled => SubmitOutcome::Filled(fill_details(order, &report)),
            OrderState::Cancelled if report.filled_quantity > Decimal::ZERO => {
                warn!(
                    key = %order.client_order_id,
                    requested = %order.quantity,
                    filled = %report.filled_quantity,
                    "Partial fill accepted"
                );
                SubmitOutcome::Filled(fill_details(order, &report))
            }
            OrderState::Cancelled => SubmitOutcome::Rejected {
                reason: "order cancelled without fill".into(),
            },
            OrderState::Rejected { reason } => SubmitOutcome::Rejected { reason },
            OrderState::NotFound | OrderState::Working | OrderState::PartiallyFilled => {
                SubmitOutcome::Pending
            }
        })
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    async fn retrying<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, ExchangeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(ExchangeError::Transient(e)) => {
                    if self.retry.exhausted(attempt) {
                        return Err(exhausted(attempt, e.to_string()));
                    }
                    debug!(attempt, error = %e, what, "Retrying exchange request");
                    sleep(self.retry.delay_after(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn fill_details(order: &OrderRequest, report: &OrderReport) -> FillDetails {
    FillDetails {
        order_id: report.order_id.clone(),
        price: report
            .average_price
            .filter(|price| *price > Decimal::ZERO)
            .unwrap_or(order.reference_price),
        quantity: if report.filled_quantity > Decimal::ZERO {
            report.filled_quantity
        } else {
            order.quantity
        },
        filled_at: Utc::now(),
    }
}

fn exhausted(attempts: u32, last: String) -> ExchangeError {
    PermanentError::RetriesExhausted { attempts, last }.into()
}
