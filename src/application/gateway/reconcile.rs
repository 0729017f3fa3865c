//! Startup reconciliation between the local ledger and the exchange.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{entry_order, exit_order, ExecutionGateway, SubmitOutcome};
use crate::application::store::PositionStore;
use crate::domain::{Position, Quantity, Side, Symbol, SymbolState, TradeRecord};
use crate::port::outbound::exchange::ExchangePosition;

/// A mismatch that needs an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// Open locally, flat on the exchange.
    MissingOnExchange { symbol: Symbol, side: Side, quantity: Quantity },
    /// Flat locally, open on the exchange.
    UnexpectedOnExchange { symbol: Symbol, side: Side, quantity: Quantity },
    SideMismatch { symbol: Symbol, local: Side, exchange: Side },
    QuantityMismatch { symbol: Symbol, local: Quantity, exchange: Quantity },
    /// A pending order whose fate the exchange could not confirm.
    Unresolved { symbol: Symbol, state: &'static str },
    /// The exchange could not be queried for this symbol.
    Unverified { symbol: Symbol, error: String },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOnExchange { symbol, side, quantity } => {
                write!(f, "{symbol}: local {side} {quantity} not found on exchange")
            }
            Self::UnexpectedOnExchange { symbol, side, quantity } => {
                write!(f, "{symbol}: exchange holds {side} {quantity}, local is flat")
            }
            Self::SideMismatch { symbol, local, exchange } => {
                write!(f, "{symbol}: local side {local}, exchange side {exchange}")
            }
            Self::QuantityMismatch { symbol, local, exchange } => {
                write!(f, "{symbol}: local quantity {local}, exchange quantity {exchange}")
            }
            Self::Unresolved { symbol, state } => write!(f, "{symbol}: {state} could not be resolved"),
            Self::Unverified { symbol, error } => write!(f, "{symbol}: not verified ({error})"),
        }
    }
}

/// How a pending state was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    EntryFilled,
    EntryReleased,
    ExitFilled,
    ExitReleased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub checked_at: DateTime<Utc>,
    pub symbols_checked: usize,
    pub resolved: Vec<(Symbol, Resolution)>,
    /// Trades realized while resolving pending exits.
    pub closed_trades: Vec<TradeRecord>,
    pub divergences: Vec<Divergence>,
}

impl ReconciliationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.divergences.is_empty()
    }
}

impl ExecutionGateway {
    /// Settle pending states, then compare every known symbol with the exchange.
    ///
    /// Divergences are reported and flagged in the store; local positions are
    /// never rewritten to match the exchange.
    pub async fn reconcile(&self, store: &PositionStore, symbols: &[Symbol]) -> ReconciliationReport {
        let mut report = ReconciliationReport {
            checked_at: Utc::now(),
            symbols_checked: 0,
            resolved: Vec::new(),
            closed_trades: Vec::new(),
            divergences: Vec::new(),
        };

        for (symbol, seen) in store.symbols() {
            if !seen.is_pending() {
                continue;
            }
            let _guard = store.lock_symbol(&symbol).await;
            // The pipeline may have moved on while we waited for the lock.
            let state = store.state(&symbol);
            if state != seen {
                info!(%symbol, from = seen.name(), to = state.name(), "State changed before reconciliation, skipping");
                continue;
            }
            self.resolve_pending(store, &symbol, &state, &mut report).await;
        }

        let mut all: BTreeSet<Symbol> = symbols.iter().cloned().collect();
        all.extend(store.symbols().into_iter().map(|(symbol, _)| symbol));
        for symbol in all {
            report.symbols_checked += 1;
            let local = store.state(&symbol);
            if local.is_pending() {
                continue;
            }
            match self.position(&symbol).await {
                Ok(remote) => compare(&symbol, local.position(), remote.as_ref(), &mut report),
                Err(e) => report.divergences.push(Divergence::Unverified {
                    symbol,
                    error: e.to_string(),
                }),
            }
        }

        if let Err(e) = store.flag_divergences(report.divergences.iter().map(ToString::to_string).collect()) {
            warn!(error = %e, "Could not record divergences");
        }
        if report.is_clean() {
            info!(
                symbols = report.symbols_checked,
                resolved = report.resolved.len(),
                "Reconciliation clean"
            );
        } else {
            for divergence in &report.divergences {
                warn!(%divergence, "Reconciliation divergence");
            }
        }
        report
    }

    async fn resolve_pending(
        &self,
        store: &PositionStore,
        symbol: &Symbol,
        state: &SymbolState,
        report: &mut ReconciliationReport,
    ) {
        let (order, is_entry) = match state {
            SymbolState::PendingEntry(pending) => (entry_order(symbol, pending), true),
            SymbolState::PendingExit { position, exit_key } => {
                (exit_order(position, exit_key, position.entry_price()), false)
            }
            SymbolState::Flat | SymbolState::Open(_) => return,
        };

        let outcome = match self.resolve(&order).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%symbol, error = %e, "Order status unavailable");
                SubmitOutcome::Pending
            }
        };

        let applied = match (outcome, is_entry) {
            (SubmitOutcome::Filled(fill), true) => store
                .confirm_open(symbol, &fill)
                .map(|_| Resolution::EntryFilled),
            (SubmitOutcome::Rejected { .. }, true) => {
                store.abort_open(symbol).map(|()| Resolution::EntryReleased)
            }
            (SubmitOutcome::Filled(fill), false) => store
                .close_fill(symbol, &fill)
                .map(|trade| {
                    report.closed_trades.push(trade);
                    Resolution::ExitFilled
                }),
            (SubmitOutcome::Rejected { .. }, false) => {
                store.abort_close(symbol).map(|()| Resolution::ExitReleased)
            }
            (SubmitOutcome::Pending, _) => {
                report.divergences.push(Divergence::Unresolved {
                    symbol: symbol.clone(),
                    state: state.name(),
                });
                return;
            }
        };

        match applied {
            Ok(resolution) => {
                info!(%symbol, ?resolution, "Pending state resolved");
                report.resolved.push((symbol.clone(), resolution));
            }
            Err(e) => report.divergences.push(Divergence::Unverified {
                symbol: symbol.clone(),
                error: e.to_string(),
            }),
        }
    }
}

fn compare(
    symbol: &Symbol,
    local: Option<&Position>,
    remote: Option<&ExchangePosition>,
    report: &mut ReconciliationReport,
) {
    let divergence = match (local, remote) {
        (None, None) => None,
        (Some(local), None) => Some(Divergence::MissingOnExchange {
            symbol: symbol.clone(),
            side: local.side(),
            quantity: local.quantity(),
        }),
        (None, Some(remote)) => Some(Divergence::UnexpectedOnExchange {
            symbol: symbol.clone(),
            side: remote.side,
            quantity: remote.quantity,
        }),
        (Some(local), Some(remote)) if local.side() != remote.side => Some(Divergence::SideMismatch {
            symbol: symbol.clone(),
            local: local.side(),
            exchange: remote.side,
        }),
        (Some(local), Some(remote)) if local.quantity() != remote.quantity => {
            Some(Divergence::QuantityMismatch {
                symbol: symbol.clone(),
                local: local.quantity(),
                exchange: remote.quantity,
            })
        }
        (Some(_), Some(_)) => None,
    };
    if let Some(divergence) = divergence {
        report.divergences.push(divergence);
    }
}
