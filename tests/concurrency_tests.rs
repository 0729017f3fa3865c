//! Signals racing on the same or different symbols.

mod support;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::task::JoinSet;

use sigex::domain::{SignalOutcome, SymbolState};
use sigex::testkit::domain::symbol;
use sigex::testkit::exchange::ScriptedExchange;
use support::Harness;

fn slow_exchange() -> ScriptedExchange {
    ScriptedExchange::new().with_place_delay(Duration::from_millis(50))
}

async fn race(h: &Arc<Harness>, bodies: Vec<Vec<u8>>) -> Vec<SignalOutcome> {
    let mut tasks = JoinSet::new();
    for body in bodies {
        let h = Arc::clone(h);
        tasks.spawn(async move { h.engine.handle_payload(&body).await });
    }
    let mut outcomes = Vec::new();
    while let Some(outcome) = tasks.join_next().await {
        outcomes.push(outcome.unwrap());
    }
    outcomes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_entries_on_one_symbol_open_once() {
    let h = Arc::new(Harness::start(slow_exchange()).await);
    let bodies = vec![
        h.body("trend", "SOLUSDT", "long", "entry", 145.25, 0),
        h.body("trend", "SOLUSDT", "long", "entry", 145.30, 1),
    ];

    let outcomes = race(&h, bodies).await;

    let opened = outcomes
        .iter()
        .filter(|o| matches!(o, SignalOutcome::Opened { .. }))
        .count();
    assert_eq!(opened, 1, "{outcomes:?}");
    assert!(outcomes.iter().any(SignalOutcome::is_noop));
    assert_eq!(h.exchange.place_count(), 1);
    assert!(matches!(h.store.state(&symbol("SOLUSDT")), SymbolState::Open(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_deliveries_in_flight_place_one_order() {
    let h = Arc::new(Harness::start(slow_exchange()).await);
    let body = h.body("trend", "SOLUSDT", "long", "entry", 145.25, 0);

    let outcomes = race(&h, vec![body.clone(), body.clone(), body]).await;

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, SignalOutcome::Opened { .. }))
            .count(),
        1
    );
    assert_eq!(outcomes.iter().filter(|o| o.is_noop()).count(), 2);
    assert_eq!(h.exchange.place_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_symbols_proceed_independently() {
    let h = Arc::new(Harness::start(slow_exchange()).await);
    let bodies = vec![
        h.body("trend", "SOLUSDT", "long", "entry", 145.25, 0),
        h.body("breakout", "BTCUSDT", "short", "entry", 60000.0, 0),
    ];

    let outcomes = race(&h, bodies).await;

    assert!(outcomes.iter().all(|o| matches!(o, SignalOutcome::Opened { .. })), "{outcomes:?}");
    assert_eq!(h.exchange.place_count(), 2);
    assert_eq!(h.store.symbols().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exit_racing_entry_never_leaves_a_half_state() {
    let h = Arc::new(Harness::start(slow_exchange()).await);
    let bodies = vec![
        h.body("trend", "SOLUSDT", "long", "entry", 145.25, 0),
        h.body("trend", "SOLUSDT", "long", "exit", 150.25, 1),
    ];

    let outcomes = race(&h, bodies).await;

    let state = h.store.state(&symbol("SOLUSDT"));
    assert!(!state.is_pending());
    let closed = outcomes
        .iter()
        .any(|o| matches!(o, SignalOutcome::Closed { .. }));
    if closed {
        assert_eq!(state, SymbolState::Flat);
        assert_eq!(h.store.equity().cumulative_pnl, dec!(95.00));
    } else {
        assert!(matches!(state, SymbolState::Open(_)));
        assert_eq!(h.store.equity().cumulative_pnl, dec!(0));
    }
}
