//! Order execution timing and retry configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::application::gateway::{ExecutionSettings, RetryPolicy};

/// `[execution]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Total attempts per exchange request, including the first.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_fill_poll_attempts")]
    pub fill_poll_attempts: u32,
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
}

const fn default_max_retry_attempts() -> u32 {
    4
}

const fn default_retry_backoff_base_ms() -> u64 {
    250
}

const fn default_retry_backoff_max_ms() -> u64 {
    5_000
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_fill_poll_attempts() -> u32 {
    5
}

const fn default_fill_poll_interval_ms() -> u64 {
    500
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            fill_poll_attempts: default_fill_poll_attempts(),
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
        }
    }
}

impl ExecutionConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_backoff_base_ms),
            max_delay: Duration::from_millis(self.retry_backoff_max_ms),
            jitter: true,
        }
    }

    #[must_use]
    pub fn settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            fill_poll_attempts: self.fill_poll_attempts,
            fill_poll_interval: Duration::from_millis(self.fill_poll_interval_ms),
        }
    }
}
