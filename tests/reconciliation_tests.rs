//! Startup and on-demand reconciliation against the exchange.

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;

use sigex::application::gateway::{entry_order, Divergence, Resolution};
use sigex::domain::{ProtectionLimits, Side, SignalAction, SignalOutcome, SymbolState};
use sigex::port::outbound::exchange::{ExchangeClient, ExchangePosition};
use sigex::testkit::domain::{fill, pending_entry, signal, symbol};
use sigex::testkit::exchange::{PlaceStep, ScriptedExchange};
use support::{default_strategies, Harness};

fn unstarted() -> Harness {
    Harness::build(
        tempfile::tempdir().unwrap(),
        Arc::new(ScriptedExchange::new()),
        default_strategies(),
        ProtectionLimits::default(),
    )
}

#[tokio::test]
async fn clean_start_reports_nothing() {
    let h = unstarted();

    let report = h.engine.start().await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.symbols_checked, 2);
}

#[tokio::test]
async fn position_unknown_locally_is_flagged_not_adopted() {
    let h = unstarted();
    let sol = symbol("SOLUSDT");
    h.exchange.set_position(ExchangePosition {
        symbol: sol.clone(),
        side: Side::Short,
        quantity: dec!(3),
        entry_price: dec!(150),
    });

    let report = h.engine.start().await.unwrap();

    assert_eq!(
        report.divergences,
        vec![Divergence::UnexpectedOnExchange {
            symbol: sol.clone(),
            side: Side::Short,
            quantity: dec!(3),
        }]
    );
    assert_eq!(h.store.state(&sol), SymbolState::Flat);
    assert_eq!(h.engine.export_state().divergences.len(), 1);
}

#[tokio::test]
async fn position_closed_on_exchange_is_flagged_and_kept() {
    let h = Harness::start(ScriptedExchange::new()).await;
    let sol = symbol("SOLUSDT");
    h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;
    h.exchange.clear_position(&sol);

    let report = h.engine.reconcile().await;

    assert!(matches!(
        report.divergences.as_slice(),
        [Divergence::MissingOnExchange { side: Side::Long, .. }]
    ));
    assert!(matches!(h.store.state(&sol), SymbolState::Open(_)));

    // The stop was hit on the venue; the operator records the close.
    let trade = h.engine.record_external_close(&sol, dec!(140.00)).await.unwrap();
    assert_eq!(trade.pnl, dec!(-99.75));
    assert_eq!(trade.r_multiple, dec!(-0.9975));
    assert_eq!(h.store.state(&sol), SymbolState::Flat);
}

#[tokio::test]
async fn size_and_side_drift_are_reported() {
    let h = Harness::start(ScriptedExchange::new()).await;
    h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;
    h.send("breakout", "BTCUSDT", "long", "entry", 60000.0, 1).await;
    h.exchange.set_position(ExchangePosition {
        symbol: symbol("SOLUSDT"),
        side: Side::Long,
        quantity: dec!(12.0),
        entry_price: dec!(145.25),
    });
    h.exchange.set_position(ExchangePosition {
        symbol: symbol("BTCUSDT"),
        side: Side::Short,
        quantity: dec!(0.333),
        entry_price: dec!(60000),
    });

    let report = h.engine.reconcile().await;

    assert_eq!(report.divergences.len(), 2);
    assert!(report.divergences.iter().any(|d| matches!(
        d,
        Divergence::QuantityMismatch { local, exchange, .. } if *local == dec!(19.0) && *exchange == dec!(12.0)
    )));
    assert!(report.divergences.iter().any(|d| matches!(
        d,
        Divergence::SideMismatch { local: Side::Long, exchange: Side::Short, .. }
    )));
}

#[tokio::test]
async fn pending_entry_left_by_crash_is_filled_from_exchange() {
    let h = unstarted();
    let sol = symbol("SOLUSDT");
    let sig = signal("trend", "SOLUSDT", Side::Long, SignalAction::Entry, dec!(145.25), Utc::now());
    let pending = pending_entry(&sig, dec!(19.0), dec!(5.25));
    let order = entry_order(&sol, &pending);
    h.store.try_open(&sol, pending, Utc::now()).unwrap();
    h.exchange.place_order(&order).await.unwrap();

    let report = h.engine.start().await.unwrap();

    assert_eq!(report.resolved, vec![(sol.clone(), Resolution::EntryFilled)]);
    assert!(report.is_clean(), "{:?}", report.divergences);
    let SymbolState::Open(position) = h.store.state(&sol) else {
        panic!("pending entry was not confirmed");
    };
    assert_eq!(position.quantity(), dec!(19.0));
}

#[tokio::test]
async fn pending_entry_never_sent_is_released() {
    let h = unstarted();
    let sol = symbol("SOLUSDT");
    let sig = signal("trend", "SOLUSDT", Side::Long, SignalAction::Entry, dec!(145.25), Utc::now());
    h.store
        .try_open(&sol, pending_entry(&sig, dec!(19.0), dec!(5.25)), Utc::now())
        .unwrap();

    let report = h.engine.start().await.unwrap();

    assert_eq!(report.resolved, vec![(sol.clone(), Resolution::EntryReleased)]);
    assert_eq!(h.store.state(&sol), SymbolState::Flat);
    assert_eq!(h.exchange.place_count(), 0);
}

#[tokio::test]
async fn unreachable_exchange_leaves_pending_entry_unresolved() {
    let exchange = ScriptedExchange::new().with_status_failures(10);
    let h = Harness::build(
        tempfile::tempdir().unwrap(),
        Arc::new(exchange),
        default_strategies(),
        ProtectionLimits::default(),
    );
    let sol = symbol("SOLUSDT");
    let sig = signal("trend", "SOLUSDT", Side::Long, SignalAction::Entry, dec!(145.25), Utc::now());
    h.store
        .try_open(&sol, pending_entry(&sig, dec!(19.0), dec!(5.25)), Utc::now())
        .unwrap();

    let report = h.engine.start().await.unwrap();

    assert!(report.resolved.is_empty());
    assert!(report
        .divergences
        .iter()
        .any(|d| matches!(d, Divergence::Unresolved { state: "pending_entry", .. })));
    assert!(matches!(h.store.state(&sol), SymbolState::PendingEntry(_)));
}

#[tokio::test]
async fn pending_state_replaced_while_waiting_is_left_alone() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::Fill, PlaceStep::filled_but_timed_out()])
        .with_status_failures(2);
    let h = Harness::start(exchange).await;
    let sol = symbol("SOLUSDT");
    h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;
    let exit = h.send("trend", "SOLUSDT", "long", "exit", 150.25, 1).await;
    assert_eq!(exit, SignalOutcome::Pending { symbol: sol.clone() });

    let guard = h.store.lock_symbol(&sol).await;
    let engine = h.engine.clone();
    let reconcile = tokio::spawn(async move { engine.reconcile().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // While reconciliation waits: the first position is closed and a new one opened.
    h.store.close(&sol, dec!(150.25), Utc::now()).unwrap();
    let sig = signal("trend", "SOLUSDT", Side::Long, SignalAction::Entry, dec!(146), Utc::now());
    h.store
        .try_open(&sol, pending_entry(&sig, dec!(5.0), dec!(5.25)), Utc::now())
        .unwrap();
    h.store.confirm_open(&sol, &fill(dec!(146), dec!(5.0))).unwrap();
    drop(guard);

    let report = reconcile.await.unwrap();

    assert!(report.resolved.is_empty());
    assert!(report.closed_trades.is_empty());
    let SymbolState::Open(position) = h.store.state(&sol) else {
        panic!("new position was touched");
    };
    assert_eq!(position.quantity(), dec!(5.0));
    assert_eq!(position.entry_price(), dec!(146));
}
