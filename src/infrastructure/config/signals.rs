//! Webhook signal intake configuration.

use serde::Deserialize;

/// `[signals]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalsConfig {
    /// Signals older (or further in the future) than this are stale.
    #[serde(default = "default_freshness_window")]
    pub signal_freshness_window_seconds: u64,
}

const fn default_freshness_window() -> u64 {
    60
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            signal_freshness_window_seconds: default_freshness_window(),
        }
    }
}
