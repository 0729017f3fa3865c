//! Signal pipeline.
//!
//! `validate -> route -> size -> reserve -> submit -> commit -> journal`.
//! Each signal is handled to completion under its symbol's lock, so two
//! signals for one symbol never interleave while different symbols run in
//! parallel. A redelivered signal whose order is still pending is settled
//! by asking the exchange, never by sending the order again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::application::gateway::{
    entry_order, exit_order, ExecutionGateway, ReconciliationReport, SubmitOutcome,
};
use crate::application::journal::Journal;
use crate::application::risk::RiskEngine;
use crate::application::router::StrategyRegistry;
use crate::application::store::{Admission, PositionStore, StateSnapshot};
use crate::application::validator::SignalValidator;
use crate::domain::{
    IdempotencyKey, InstrumentSpec, IntentAction, OrderIntent, PendingEntry, Position, Price,
    Side, Signal, SignalOutcome, Stage, Symbol, SymbolState, TradeRecord,
};
use crate::error::{ExchangeError, RiskError, StoreError, ValidationError};
use crate::port::outbound::journal::SignalEntry;

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    Starting,
    Reconciling,
    /// Accepting signals.
    Ready,
    /// State could not be loaded; signals are refused, reporting still works.
    Degraded,
}

pub struct Engine {
    validator: SignalValidator,
    registry: StrategyRegistry,
    risk: RiskEngine,
    instruments: HashMap<Symbol, InstrumentSpec>,
    store: Arc<PositionStore>,
    gateway: Arc<ExecutionGateway>,
    journal: Journal,
    phase: RwLock<EnginePhase>,
}

impl Engine {
    pub fn new(
        validator: SignalValidator,
        registry: StrategyRegistry,
        risk: RiskEngine,
        instruments: impl IntoIterator<Item = InstrumentSpec>,
        store: Arc<PositionStore>,
        gateway: Arc<ExecutionGateway>,
        journal: Journal,
    ) -> Self {
        Self {
            validator,
            registry,
            risk,
            instruments: instruments
                .into_iter()
                .map(|spec| (spec.symbol.clone(), spec))
                .collect(),
            store,
            gateway,
            journal,
            phase: RwLock::new(EnginePhase::Starting),
        }
    }

    #[must_use]
    pub fn phase(&self) -> EnginePhase {
        *self.phase.read()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<PositionStore> {
        &self.store
    }

    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Reconcile with the exchange and open for signals.
    ///
    /// A store that failed to load moves the engine to
    /// [`EnginePhase::Degraded`] and returns the corruption error.
    pub async fn start(&self) -> Result<ReconciliationReport, StoreError> {
        if let Err(e) = self.store.ensure_writable() {
            *self.phase.write() = EnginePhase::Degraded;
            error!(error = %e, "Engine degraded, signals will be refused");
            return Err(e);
        }
        *self.phase.write() = EnginePhase::Reconciling;
        info!(exchange = self.gateway.exchange_name(), "Reconciling with exchange");
        let report = self.reconcile().await;
        *self.phase.write() = EnginePhase::Ready;
        info!(divergences = report.divergences.len(), "Engine ready");
        Ok(report)
    }

    /// Resolve pending orders and compare positions with the exchange.
    pub async fn reconcile(&self) -> ReconciliationReport {
        let symbols: Vec<Symbol> = self.instruments.keys().cloned().collect();
        let report = self.gateway.reconcile(&self.store, &symbols).await;
        for trade in &report.closed_trades {
            self.journal.record_trade(trade);
        }
        report
    }

    /// Handle one raw webhook payload end to end.
    pub async fn handle_payload(&self, payload: &[u8]) -> SignalOutcome {
        let received_at = Utc::now();
        let value = match SignalValidator::parse(payload) {
            Ok(value) => value,
            Err(e) => return self.refuse_payload(&Value::Null, received_at, &e),
        };
        match self.validator.validate(&value, received_at) {
            Ok(signal) => self.process(signal).await,
            Err(e) => self.refuse_payload(&value, received_at, &e),
        }
    }

    fn refuse_payload(
        &self,
        payload: &Value,
        received_at: DateTime<Utc>,
        e: &ValidationError,
    ) -> SignalOutcome {
        warn!(error = %e, "Signal rejected");
        let outcome = SignalOutcome::rejected(Stage::Validation, e.label(), e);
        self.journal
            .record_signal(SignalEntry::from_payload(payload, received_at, &outcome));
        outcome
    }

    /// Handle an already validated signal.
    pub async fn process(&self, signal: Signal) -> SignalOutcome {
        let outcome = self.dispatch(&signal).await;
        match &outcome {
            SignalOutcome::Rejected { .. } | SignalOutcome::Failed { .. } => {
                warn!(symbol = %signal.symbol, strategy = %signal.strategy_id, %outcome, "Signal not executed");
            }
            SignalOutcome::NoOp { .. } => {
                info!(symbol = %signal.symbol, strategy = %signal.strategy_id, %outcome, "Signal ignored");
            }
            _ => {
                info!(symbol = %signal.symbol, strategy = %signal.strategy_id, %outcome, "Signal executed");
            }
        }
        self.journal
            .record_signal(SignalEntry::from_signal(&signal, &outcome));
        outcome
    }

    async fn dispatch(&self, signal: &Signal) -> SignalOutcome {
        match self.phase() {
            EnginePhase::Ready => {}
            EnginePhase::Degraded => {
                let reason = self.store.degraded().unwrap_or_default();
                return SignalOutcome::rejected(Stage::State, "state_corruption", reason);
            }
            phase @ (EnginePhase::Starting | EnginePhase::Reconciling) => {
                return SignalOutcome::rejected(Stage::State, "not_ready", format!("engine is {phase:?}"));
            }
        }

        let intent = match self.registry.route(signal) {
            Ok(intent) => intent,
            Err(e) => return SignalOutcome::rejected(Stage::Routing, e.label(), e),
        };

        let _guard = self.store.lock_symbol(&intent.symbol).await;
        match intent.action {
            IntentAction::Entry => match self.open_leg(&intent).await {
                Ok(position) => SignalOutcome::Opened { position },
                Err(outcome) => outcome,
            },
            IntentAction::Exit => {
                match self
                    .close_leg(&intent, &intent.idempotency_key, intent.side)
                    .await
                {
                    Ok(trade) => SignalOutcome::Closed { trade },
                    Err(outcome) => outcome,
                }
            }
            IntentAction::Reverse => self.reverse(&intent).await,
        }
    }

    async fn reverse(&self, intent: &OrderIntent) -> SignalOutcome {
        let exit_key = intent.idempotency_key.exit_leg();
        let closing = match self.store.state(&intent.symbol) {
            SymbolState::Open(position) => position.side() == intent.side.opposite(),
            SymbolState::PendingExit { exit_key: key, .. } => key == exit_key,
            SymbolState::Flat | SymbolState::PendingEntry(_) => false,
        };
        if !closing {
            return match self.open_leg(intent).await {
                Ok(position) => SignalOutcome::Opened { position },
                Err(outcome) => outcome,
            };
        }

        let closed = match self
            .close_leg(intent, &exit_key, intent.side.opposite())
            .await
        {
            Ok(trade) => trade,
            Err(outcome) => return outcome,
        };
        match self.open_leg(intent).await {
            Ok(opened) => SignalOutcome::Reversed { closed, opened },
            Err(outcome) => {
                warn!(symbol = %intent.symbol, %outcome, "Reverse closed the position but did not re-enter");
                SignalOutcome::Closed { trade: closed }
            }
        }
    }

    async fn open_leg(&self, intent: &OrderIntent) -> Result<Position, SignalOutcome> {
        let symbol = &intent.symbol;
        if let SymbolState::PendingEntry(pending) = self.store.state(symbol) {
            if pending.idempotency_key == intent.idempotency_key {
                info!(%symbol, key = %pending.idempotency_key, "Redelivered entry, resolving pending order");
                let order = entry_order(symbol, &pending);
                return self.finish_entry(symbol, self.gateway.resolve(&order).await, true);
            }
        }

        let instrument = self.instruments.get(symbol).ok_or_else(|| {
            let e = RiskError::UnknownInstrument(symbol.to_string());
            SignalOutcome::rejected(Stage::Risk, e.label(), e)
        })?;

        let equity = self.store.equity();
        let evaluation = self
            .risk
            .evaluate(intent, &equity, instrument)
            .map_err(|e| SignalOutcome::rejected(Stage::Risk, e.label(), e))?;

        let pending = PendingEntry {
            side: intent.side,
            strategy_id: intent.strategy_id.clone(),
            idempotency_key: intent.idempotency_key.clone(),
            evaluation,
            requested_at: Utc::now(),
        };
        let order = entry_order(symbol, &pending);

        match self.store.try_open(symbol, pending, Utc::now()) {
            Ok(Admission::Accepted(())) => {}
            Ok(Admission::Rejected(conflict)) => {
                return Err(SignalOutcome::noop(conflict.code(), conflict));
            }
            Err(e) => return Err(store_failure(e)),
        }

        self.finish_entry(symbol, self.gateway.submit(&order).await, false)
    }

    /// Apply the gateway's answer for an entry reserved in the store.
    ///
    /// After a resolve, an error means the exchange could not be asked, so
    /// the reservation is kept.
    fn finish_entry(
        &self,
        symbol: &Symbol,
        result: Result<SubmitOutcome, ExchangeError>,
        resolving: bool,
    ) -> Result<Position, SignalOutcome> {
        match result {
            Ok(SubmitOutcome::Filled(fill)) => self
                .store
                .confirm_open(symbol, &fill)
                .map_err(|e| {
                    error!(%symbol, error = %e, "Filled entry could not be recorded");
                    store_failure(e)
                }),
            Ok(SubmitOutcome::Rejected { reason }) => {
                self.release_entry(symbol);
                Err(SignalOutcome::Failed { reason })
            }
            Ok(SubmitOutcome::Pending) => Err(SignalOutcome::Pending {
                symbol: symbol.clone(),
            }),
            Err(e) if resolving => {
                warn!(%symbol, error = %e, "Entry still unresolved");
                Err(SignalOutcome::Pending {
                    symbol: symbol.clone(),
                })
            }
            Err(e) => {
                self.release_entry(symbol);
                Err(SignalOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn close_leg(
        &self,
        intent: &OrderIntent,
        exit_key: &IdempotencyKey,
        side: Side,
    ) -> Result<TradeRecord, SignalOutcome> {
        let symbol = &intent.symbol;
        if let SymbolState::PendingExit { position, exit_key: key } = self.store.state(symbol) {
            if key == *exit_key {
                info!(%symbol, key = %key, "Redelivered exit, resolving pending order");
                let order = exit_order(&position, &key, intent.reference_price);
                return self.finish_exit(symbol, &position, self.gateway.resolve(&order).await, true);
            }
        }

        let position = match self
            .store
            .begin_close(symbol, &intent.strategy_id, side, exit_key)
        {
            Ok(Admission::Accepted(position)) => position,
            Ok(Admission::Rejected(conflict)) => {
                return Err(SignalOutcome::noop(conflict.code(), conflict));
            }
            Err(e) => return Err(store_failure(e)),
        };

        let order = exit_order(&position, exit_key, intent.reference_price);
        self.finish_exit(symbol, &position, self.gateway.submit(&order).await, false)
    }

    fn finish_exit(
        &self,
        symbol: &Symbol,
        position: &Position,
        result: Result<SubmitOutcome, ExchangeError>,
        resolving: bool,
    ) -> Result<TradeRecord, SignalOutcome> {
        match result {
            Ok(SubmitOutcome::Filled(fill)) => {
                if fill.quantity < position.quantity() {
                    warn!(
                        %symbol,
                        held = %position.quantity(),
                        filled = %fill.quantity,
                        "Exit filled partially, remainder stays open"
                    );
                }
                let trade = self.store.close_fill(symbol, &fill).map_err(|e| {
                    error!(%symbol, error = %e, "Filled exit could not be recorded");
                    store_failure(e)
                })?;
                self.journal.record_trade(&trade);
                Ok(trade)
            }
            Ok(SubmitOutcome::Rejected { reason }) => {
                self.release_exit(symbol);
                Err(SignalOutcome::Failed { reason })
            }
            Ok(SubmitOutcome::Pending) => Err(SignalOutcome::Pending {
                symbol: symbol.clone(),
            }),
            Err(e) if resolving => {
                warn!(%symbol, error = %e, "Exit still unresolved");
                Err(SignalOutcome::Pending {
                    symbol: symbol.clone(),
                })
            }
            Err(e) => {
                self.release_exit(symbol);
                Err(SignalOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn release_entry(&self, symbol: &Symbol) {
        if let Err(e) = self.store.abort_open(symbol) {
            error!(%symbol, error = %e, "Could not release entry reservation");
        }
    }

    fn release_exit(&self, symbol: &Symbol) {
        if let Err(e) = self.store.abort_close(symbol) {
            error!(%symbol, error = %e, "Could not release exit reservation");
        }
    }

    /// Record a close that happened on the exchange (stop or target hit).
    pub async fn record_external_close(
        &self,
        symbol: &Symbol,
        exit_price: Price,
    ) -> Result<TradeRecord, StoreError> {
        let _guard = self.store.lock_symbol(symbol).await;
        let trade = self.store.close(symbol, exit_price, Utc::now())?;
        self.journal.record_trade(&trade);
        Ok(trade)
    }

    /// Lift a halt or cooldown.
    pub fn resume_trading(&self) -> Result<(), StoreError> {
        self.store.resume_trading()
    }

    #[must_use]
    pub fn export_state(&self) -> StateSnapshot {
        self.store.export_state()
    }
}

fn store_failure(e: StoreError) -> SignalOutcome {
    let code = match &e {
        StoreError::NoOpenPosition(_) => "no_open_position",
        StoreError::StateCorruption { .. } => "state_corruption",
        StoreError::InvalidTransition { .. } => "invalid_transition",
        StoreError::Io(_) | StoreError::Encode(_) => "persist_failed",
    };
    SignalOutcome::rejected(Stage::State, code, e)
}
