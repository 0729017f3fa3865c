//! State snapshot and journal locations.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::application::journal::JournalRetry;
use crate::application::store::DEFAULT_MAX_REMEMBERED_KEYS;

/// `[storage]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Directory holding `signals.csv` and `trades.csv`.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,
    /// Applied idempotency keys kept for replay detection.
    #[serde(default = "default_max_remembered_keys")]
    pub max_remembered_keys: usize,
    #[serde(default = "default_journal_write_attempts")]
    pub journal_write_attempts: u32,
    #[serde(default = "default_journal_retry_backoff_ms")]
    pub journal_retry_backoff_ms: u64,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("sigex-state.json")
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from("journal")
}

const fn default_max_remembered_keys() -> usize {
    DEFAULT_MAX_REMEMBERED_KEYS
}

const fn default_journal_write_attempts() -> u32 {
    3
}

const fn default_journal_retry_backoff_ms() -> u64 {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            journal_dir: default_journal_dir(),
            max_remembered_keys: default_max_remembered_keys(),
            journal_write_attempts: default_journal_write_attempts(),
            journal_retry_backoff_ms: default_journal_retry_backoff_ms(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn journal_retry(&self) -> JournalRetry {
        JournalRetry {
            attempts: self.journal_write_attempts,
            backoff: Duration::from_millis(self.journal_retry_backoff_ms),
        }
    }
}
