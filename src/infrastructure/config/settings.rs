//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all settings.
//! Configuration is loaded from a TOML file; secrets come only from the
//! environment (`.env` is honored).
//!
//! # Example
//!
//! ```no_run
//! use sigex::infrastructure::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::exchange::ExchangeConfig;
use super::execution::ExecutionConfig;
use super::instrument::InstrumentConfig;
use super::logging::LoggingConfig;
use super::promotion::PromotionConfig;
use super::risk::RiskConfig;
use super::signals::SignalsConfig;
use super::storage::StorageConfig;
use super::strategy::StrategyConfig;
use crate::application::router::StrategyRegistry;
use crate::domain::InstrumentSpec;
use crate::error::{ConfigError, Result};

/// Secrets read from the environment, never from the file.
#[derive(Default, Clone)]
pub struct Secrets {
    pub webhook_secret: Option<String>,
    pub bybit_api_key: Option<String>,
    pub bybit_api_secret: Option<String>,
}

impl Secrets {
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            webhook_secret: var("WEBHOOK_SECRET"),
            bybit_api_key: var("BYBIT_API_KEY"),
            bybit_api_secret: var("BYBIT_API_SECRET"),
        }
    }

    pub fn webhook_secret(&self) -> std::result::Result<&str, ConfigError> {
        self.webhook_secret
            .as_deref()
            .ok_or(ConfigError::MissingEnv {
                name: "WEBHOOK_SECRET",
            })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("webhook_secret", &shown(&self.webhook_secret))
            .field("bybit_api_key", &shown(&self.bybit_api_key))
            .field("bybit_api_secret", &shown(&self.bybit_api_secret))
            .finish()
    }
}

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Position sizing and account protection.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Thresholds for the performance review in `status`.
    #[serde(default)]
    pub promotion: PromotionConfig,

    #[serde(default)]
    pub signals: SignalsConfig,

    /// Exchange request timing and retry budget.
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub exchange: ExchangeConfig,

    /// Trading rules keyed by exchange symbol.
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentConfig>,

    /// Strategy registry keyed by strategy id.
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyConfig>,

    #[serde(skip)]
    pub secrets: Secrets,
}

impl Config {
    /// Parse configuration from TOML content and pick up secrets from the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.secrets = Secrets::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration values and cross references.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        let risk = &self.risk;
        if risk.risk_per_trade_pct <= Decimal::ZERO || risk.risk_per_trade_pct > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "risk_per_trade_pct",
                reason: "must be in (0, 1]".to_string(),
            }
            .into());
        }
        if risk.reference_account_size_usdt <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "reference_account_size_usdt",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if risk.leverage == 0 {
            return Err(ConfigError::InvalidValue {
                field: "leverage",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if risk.default_stop_distance_pct <= Decimal::ZERO
            || risk.default_stop_distance_pct >= Decimal::ONE
        {
            return Err(ConfigError::InvalidValue {
                field: "default_stop_distance_pct",
                reason: "must be between 0 and 1".to_string(),
            }
            .into());
        }
        if risk.max_daily_loss_pct <= Decimal::ZERO || risk.max_daily_loss_pct > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "max_daily_loss_pct",
                reason: "must be in (0, 1]".to_string(),
            }
            .into());
        }
        if risk.limited_mode_recovery_pct < Decimal::ZERO || risk.limited_mode_recovery_pct > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "limited_mode_recovery_pct",
                reason: "must be in [0, 1]".to_string(),
            }
            .into());
        }
        if risk.global_drawdown_pct <= Decimal::ZERO || risk.global_drawdown_pct > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "global_drawdown_pct",
                reason: "must be in (0, 1]".to_string(),
            }
            .into());
        }

        let promotion = &self.promotion;
        if promotion.max_drawdown_pct < Decimal::ZERO || promotion.max_drawdown_pct > Decimal::ONE {
            return Err(ConfigError::InvalidValue {
                field: "promotion.max_drawdown_pct",
                reason: "must be in [0, 1]".to_string(),
            }
            .into());
        }

        if self.signals.signal_freshness_window_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "signal_freshness_window_seconds",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        let execution = &self.execution;
        if execution.max_retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retry_attempts",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if execution.retry_backoff_max_ms < execution.retry_backoff_base_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry_backoff_max_ms",
                reason: "must be >= retry_backoff_base_ms".to_string(),
            }
            .into());
        }
        if execution.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.storage.max_remembered_keys == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_remembered_keys",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
        if self.exchange.base_url.is_empty() {
            return Err(ConfigError::MissingField { field: "base_url" }.into());
        }

        for instrument in self.instruments.values() {
            instrument.validate()?;
        }
        for (id, strategy) in &self.strategies {
            strategy.validate()?;
            let known = self
                .instruments
                .keys()
                .any(|symbol| symbol.eq_ignore_ascii_case(strategy.instrument.trim()));
            if !known {
                return Err(ConfigError::InvalidValue {
                    field: "strategies.instrument",
                    reason: format!(
                        "strategy '{id}' references unknown instrument '{}'",
                        strategy.instrument
                    ),
                }
                .into());
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn instrument_specs(&self) -> Vec<InstrumentSpec> {
        self.instruments
            .iter()
            .map(|(symbol, config)| config.to_spec(symbol))
            .collect()
    }

    #[must_use]
    pub fn strategy_registry(&self) -> StrategyRegistry {
        self.strategies
            .iter()
            .map(|(id, config)| config.to_spec(id))
            .collect()
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        [risk]
        risk_per_trade_pct = 0.01
        reference_account_size_usdt = 10000
        leverage = 3

        [instruments.SOLUSDT]
        tick_size = 0.01
        lot_step = 0.1
        min_notional = 5
        max_notional = 100000

        [strategies.trend]
        instrument = "SOLUSDT"
        sides = "long"
        stop = { fixed = 5.25 }
        take_profit_ratio = 2
        opposite_entry = "reverse"
    "#;

    #[test]
    fn parses_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.risk.leverage, 3);
        assert_eq!(config.signals.signal_freshness_window_seconds, 60);

        let specs = config.instrument_specs();
        assert_eq!(specs[0].lot_step, dec!(0.1));
        assert_eq!(specs[0].min_stop_ticks, 5);

        let registry = config.strategy_registry();
        let trend = registry
            .get(&crate::domain::StrategyId::new("trend"))
            .unwrap();
        assert_eq!(trend.stop, Some(crate::domain::StopPolicy::Fixed(dec!(5.25))));
        assert_eq!(trend.sides, crate::domain::SidePolicy::Long);
    }

    #[test]
    fn unknown_instrument_is_rejected() {
        let content = SAMPLE.replace("instrument = \"SOLUSDT\"", "instrument = \"BTCUSDT\"");
        let config: Config = toml::from_str(&content).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown instrument 'BTCUSDT'"));
    }

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn secrets_are_not_printed() {
        let secrets = Secrets {
            webhook_secret: Some("hunter2".into()),
            ..Secrets::default()
        };
        let printed = format!("{secrets:?}");
        assert!(!printed.contains("hunter2"));
        assert!(secrets.webhook_secret().is_ok());
        assert!(Secrets::default().webhook_secret().is_err());
    }
}
