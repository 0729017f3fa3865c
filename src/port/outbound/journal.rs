//! Journal port for append-only signal and trade records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Side, Signal, SignalOutcome, TradeRecord};
use crate::error::JournalError;

/// One row of the signal journal.
///
/// Fields are kept as text so signals that failed validation can still be
/// recorded with whatever the payload carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub strategy: String,
    pub side: String,
    pub action: String,
    pub price: String,
    pub outcome: String,
}

impl SignalEntry {
    #[must_use]
    pub fn from_signal(signal: &Signal, outcome: &SignalOutcome) -> Self {
        Self {
            timestamp: signal.timestamp,
            symbol: signal.symbol.to_string(),
            strategy: signal.strategy_id.to_string(),
            side: signal.side.to_string(),
            action: signal.action.to_string(),
            price: signal.price.to_string(),
            outcome: outcome.label(),
        }
    }

    /// Entry for a payload that never became a [`Signal`].
    ///
    /// The secret is never copied out of `payload`.
    #[must_use]
    pub fn from_payload(
        payload: &serde_json::Value,
        received_at: DateTime<Utc>,
        outcome: &SignalOutcome,
    ) -> Self {
        let text = |field: &str| match payload.get(field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Self {
            timestamp: received_at,
            symbol: text("symbol"),
            strategy: text("strategy"),
            side: text("side"),
            action: text("action"),
            price: text("price"),
            outcome: outcome.label(),
        }
    }
}

/// One row of the trade journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRow {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub r_multiple: Decimal,
}

impl From<&TradeRecord> for TradeRow {
    fn from(trade: &TradeRecord) -> Self {
        Self {
            timestamp: trade.closed_at,
            symbol: trade.symbol.to_string(),
            side: trade.side,
            qty: trade.quantity,
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            pnl: trade.pnl,
            r_multiple: trade.r_multiple,
        }
    }
}

/// Durable, append-only record of signals and trades.
///
/// Writes are best-effort from the pipeline's point of view: a failing sink
/// never changes position state.
pub trait JournalSink: Send + Sync {
    fn append_signal(&self, entry: &SignalEntry) -> Result<(), JournalError>;

    fn append_trade(&self, trade: &TradeRow) -> Result<(), JournalError>;
}
