//! Canonical test configurations.
//!
//! Single source of truth for config values used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use std::path::Path;
use std::time::Duration;

use crate::application::gateway::{ExecutionSettings, RetryPolicy};
use crate::application::journal::JournalRetry;
use crate::infrastructure::config::{Config, Secrets};

use super::domain::SECRET;

/// TOML for one SOLUSDT instrument and a `trend` strategy with a 5.25 stop.
pub const SAMPLE_TOML: &str = r#"
[logging]
level = "debug"

[risk]
risk_per_trade_pct = 0.01
reference_account_size_usdt = 10000
leverage = 5

[signals]
signal_freshness_window_seconds = 60

[execution]
max_retry_attempts = 3
retry_backoff_base_ms = 0
retry_backoff_max_ms = 0
request_timeout_ms = 200
fill_poll_attempts = 2
fill_poll_interval_ms = 0

[instruments.SOLUSDT]
tick_size = 0.01
lot_step = 0.1
min_notional = 5
max_notional = 100000

[strategies.trend]
instrument = "SOLUSDT"
stop = { fixed = 5.25 }
"#;

/// [`SAMPLE_TOML`] with storage under `dir` and the test secret set.
pub fn config_in(dir: &Path) -> Config {
    let mut config: Config = toml::from_str(SAMPLE_TOML).unwrap_or_default();
    config.storage.state_path = dir.join("state.json");
    config.storage.journal_dir = dir.join("journal");
    config.storage.journal_retry_backoff_ms = 1;
    config.secrets = Secrets {
        webhook_secret: Some(SECRET.to_string()),
        ..Secrets::default()
    };
    config
}

/// Retry budget with no waiting.
pub fn retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::immediate(max_attempts)
}

/// Short timeouts and no poll delay.
pub fn execution() -> ExecutionSettings {
    ExecutionSettings {
        request_timeout: Duration::from_millis(200),
        fill_poll_attempts: 2,
        fill_poll_interval: Duration::ZERO,
    }
}

pub fn journal_retry() -> JournalRetry {
    JournalRetry {
        attempts: 2,
        backoff: Duration::from_millis(1),
    }
}
