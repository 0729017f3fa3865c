#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use sigex::adapter::outbound::csv_journal::CsvJournal;
use sigex::application::engine::Engine;
use sigex::application::gateway::ExecutionGateway;
use sigex::application::journal::Journal;
use sigex::application::risk::{RiskEngine, RiskParams};
use sigex::application::router::StrategyRegistry;
use sigex::application::store::PositionStore;
use sigex::application::validator::SignalValidator;
use sigex::domain::{ProtectionLimits, SignalOutcome, StrategySpec};
use sigex::testkit::config::{execution, journal_retry, retry};
use sigex::testkit::domain::{btc_instrument, payload, payload_bytes, sol_instrument, strategy, SECRET};
use sigex::testkit::exchange::ScriptedExchange;

pub const BALANCE: Decimal = dec!(10000);

/// A fully wired engine over a scripted exchange, with state and journal
/// under a temporary directory.
pub struct Harness {
    pub engine: Arc<Engine>,
    pub exchange: Arc<ScriptedExchange>,
    pub store: Arc<PositionStore>,
    pub journal: Arc<CsvJournal>,
    pub dir: TempDir,
    base_time: DateTime<Utc>,
}

/// `trend` on SOLUSDT with a 5.25 stop, `breakout` on BTCUSDT with a 300 stop.
pub fn default_strategies() -> Vec<StrategySpec> {
    vec![
        strategy("trend", "SOLUSDT", dec!(5.25)),
        strategy("breakout", "BTCUSDT", dec!(300)),
    ]
}

pub fn risk_params() -> RiskParams {
    RiskParams {
        risk_per_trade_pct: dec!(0.01),
        leverage: 5,
        default_stop_distance_pct: dec!(0.003),
    }
}

impl Harness {
    pub async fn start(exchange: ScriptedExchange) -> Self {
        Self::start_with(exchange, default_strategies(), ProtectionLimits::default()).await
    }

    pub async fn start_with(
        exchange: ScriptedExchange,
        strategies: Vec<StrategySpec>,
        limits: ProtectionLimits,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let harness = Self::build(dir, Arc::new(exchange), strategies, limits);
        harness.engine.start().await.unwrap();
        harness
    }

    /// Wire an engine without starting it.
    pub fn build(
        dir: TempDir,
        exchange: Arc<ScriptedExchange>,
        strategies: Vec<StrategySpec>,
        limits: ProtectionLimits,
    ) -> Self {
        let store = Arc::new(PositionStore::open(
            dir.path().join("state.json"),
            BALANCE,
            limits,
            1_000,
        ));
        let journal = Arc::new(CsvJournal::open(dir.path().join("journal")).unwrap());
        let (journal_handle, _task) = Journal::spawn(journal.clone(), journal_retry());
        let gateway = Arc::new(ExecutionGateway::new(
            exchange.clone(),
            retry(3),
            execution(),
        ));
        let engine = Engine::new(
            SignalValidator::new(SECRET, 60).unwrap(),
            strategies.into_iter().collect::<StrategyRegistry>(),
            RiskEngine::new(risk_params()),
            [sol_instrument(), btc_instrument()],
            store.clone(),
            gateway,
            journal_handle,
        );
        Self {
            engine: Arc::new(engine),
            exchange,
            store,
            journal,
            dir,
            base_time: Utc::now(),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }

    /// Signal time `seq` milliseconds after the harness was built.
    pub fn at(&self, seq: i64) -> DateTime<Utc> {
        self.base_time + Duration::milliseconds(seq)
    }

    /// Raw webhook body for a signal at [`Harness::at`]`(seq)`.
    pub fn body(&self, strategy: &str, symbol: &str, side: &str, action: &str, price: f64, seq: i64) -> Vec<u8> {
        payload_bytes(&payload(strategy, symbol, side, action, price, self.at(seq)))
    }

    pub async fn send(&self, strategy: &str, symbol: &str, side: &str, action: &str, price: f64, seq: i64) -> SignalOutcome {
        let body = self.body(strategy, symbol, side, action, price, seq);
        self.engine.handle_payload(&body).await
    }

    /// Wait for queued journal writes.
    pub async fn flush(&self) {
        self.engine.journal().flush().await.unwrap();
    }
}
