//! Composition root: turns a [`Config`] into a running [`Engine`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::adapter::outbound::csv_journal::CsvJournal;
use crate::adapter::outbound::paper::PaperExchange;
use crate::application::engine::Engine;
use crate::application::gateway::ExecutionGateway;
use crate::application::journal::Journal;
use crate::application::risk::RiskEngine;
use crate::application::store::PositionStore;
use crate::application::validator::SignalValidator;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::exchange::ExchangeKind;
use crate::infrastructure::config::Config;
use crate::port::outbound::exchange::ExchangeClient;

/// A wired engine plus the handles needed to shut it down cleanly.
pub struct Runtime {
    pub engine: Arc<Engine>,
    pub journal_sink: Arc<CsvJournal>,
    pub journal_task: JoinHandle<()>,
}

/// Build the exchange adapter selected by `[exchange].kind`.
#[allow(clippy::result_large_err)]
pub fn build_exchange(config: &Config) -> Result<Arc<dyn ExchangeClient>> {
    match config.exchange.kind {
        ExchangeKind::Paper => {
            info!("Using paper exchange");
            Ok(Arc::new(PaperExchange::new()))
        }
        ExchangeKind::Bybit => build_bybit(config),
    }
}

#[cfg(feature = "bybit")]
#[allow(clippy::result_large_err)]
fn build_bybit(config: &Config) -> Result<Arc<dyn ExchangeClient>> {
    use crate::adapter::outbound::bybit::{BybitClient, BybitCredentials};

    let api_key = config
        .secrets
        .bybit_api_key
        .clone()
        .ok_or(ConfigError::MissingEnv {
            name: "BYBIT_API_KEY",
        })?;
    let api_secret = config
        .secrets
        .bybit_api_secret
        .clone()
        .ok_or(ConfigError::MissingEnv {
            name: "BYBIT_API_SECRET",
        })?;
    info!(base_url = %config.exchange.base_url, "Using Bybit exchange");
    Ok(Arc::new(BybitClient::new(
        config.exchange.base_url.clone(),
        BybitCredentials {
            api_key,
            api_secret,
        },
        config.execution.settings().request_timeout,
    )))
}

#[cfg(not(feature = "bybit"))]
#[allow(clippy::result_large_err)]
fn build_bybit(_config: &Config) -> Result<Arc<dyn ExchangeClient>> {
    Err(ConfigError::InvalidValue {
        field: "exchange.kind",
        reason: "bybit support requires the bybit feature".to_string(),
    }
    .into())
}

/// Open the position store at the configured path.
///
/// A corrupt snapshot does not fail here; the store comes up degraded and
/// [`Engine::start`] reports it.
#[must_use]
pub fn open_store(config: &Config) -> Arc<PositionStore> {
    Arc::new(PositionStore::open(
        &config.storage.state_path,
        config.risk.reference_account_size_usdt,
        config.risk.protection_limits(),
        config.storage.max_remembered_keys,
    ))
}

/// Wire every component around `exchange`. Must run inside a Tokio runtime.
#[allow(clippy::result_large_err)]
pub fn build_runtime(config: &Config, exchange: Arc<dyn ExchangeClient>) -> Result<Runtime> {
    let validator = SignalValidator::new(
        config.secrets.webhook_secret()?,
        config.signals.signal_freshness_window_seconds,
    )?;
    let registry = config.strategy_registry();
    let risk = RiskEngine::new(config.risk.risk_params());
    let store = open_store(config);
    let gateway = Arc::new(
        ExecutionGateway::new(
            exchange,
            config.execution.retry_policy(),
            config.execution.settings(),
        )
        .with_outcome_capacity(config.storage.max_remembered_keys),
    );

    let journal_sink = Arc::new(CsvJournal::open(&config.storage.journal_dir)?);
    let (journal, journal_task) = Journal::spawn(journal_sink.clone(), config.storage.journal_retry());

    info!(
        strategies = registry.len(),
        instruments = config.instruments.len(),
        exchange = gateway.exchange_name(),
        "Engine wired"
    );

    let engine = Engine::new(
        validator,
        registry,
        risk,
        config.instrument_specs(),
        store,
        gateway,
        journal,
    );
    Ok(Runtime {
        engine: Arc::new(engine),
        journal_sink,
        journal_task,
    })
}
