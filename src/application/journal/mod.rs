//! Non-blocking journal writer.
//!
//! The pipeline hands records to [`Journal`] and moves on. A background
//! task appends them to the sink, retrying a bounded number of times; a
//! record that still cannot be written is logged and dropped.

pub mod stats;

pub use stats::{PromotionRules, PromotionStatus, TradeStats};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::domain::TradeRecord;
use crate::error::JournalError;
use crate::port::outbound::journal::{JournalSink, SignalEntry, TradeRow};

/// Write retry settings for the background writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRetry {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for JournalRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

enum Command {
    Signal(SignalEntry),
    Trade(TradeRow),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background journal writer. Cheap to clone.
#[derive(Clone)]
pub struct Journal {
    tx: mpsc::UnboundedSender<Command>,
}

impl Journal {
    /// Start the writer task on the current runtime.
    pub fn spawn(sink: Arc<dyn JournalSink>, retry: JournalRetry) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(sink, rx, retry));
        (Self { tx }, handle)
    }

    pub fn record_signal(&self, entry: SignalEntry) {
        if self.tx.send(Command::Signal(entry)).is_err() {
            warn!("Journal writer stopped, signal record dropped");
        }
    }

    pub fn record_trade(&self, trade: &TradeRecord) {
        if self.tx.send(Command::Trade(TradeRow::from(trade))).is_err() {
            warn!(symbol = %trade.symbol, "Journal writer stopped, trade record dropped");
        }
    }

    /// Wait until everything queued before this call has been handled.
    pub async fn flush(&self) -> Result<(), JournalError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| JournalError::Closed)?;
        ack_rx.await.map_err(|_| JournalError::Closed)
    }
}

async fn run(sink: Arc<dyn JournalSink>, mut rx: mpsc::UnboundedReceiver<Command>, retry: JournalRetry) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Signal(entry) => {
                write_with_retry(&sink, &retry, "signal", move |sink| sink.append_signal(&entry)).await;
            }
            Command::Trade(row) => {
                write_with_retry(&sink, &retry, "trade", move |sink| sink.append_trade(&row)).await;
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

async fn write_with_retry<F>(sink: &Arc<dyn JournalSink>, retry: &JournalRetry, kind: &'static str, write: F)
where
    F: Fn(&dyn JournalSink) -> Result<(), JournalError> + Clone + Send + 'static,
{
    let attempts = retry.attempts.max(1);
    for attempt in 1..=attempts {
        let sink = Arc::clone(sink);
        let write = write.clone();
        let result = tokio::task::spawn_blocking(move || write(sink.as_ref())).await;
        let error = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(join) => join.to_string(),
        };
        if attempt == attempts {
            error!(kind, attempts, %error, "Journal write failed, record dropped");
            return;
        }
        warn!(kind, attempt, %error, "Journal write failed, retrying");
        tokio::time::sleep(retry.backoff * attempt).await;
    }
}
