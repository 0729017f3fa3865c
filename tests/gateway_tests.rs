//! Exchange failure handling seen through the full pipeline.

mod support;

use std::time::Duration;

use rust_decimal_macros::dec;

use sigex::application::gateway::Resolution;
use sigex::domain::{SignalOutcome, SymbolState};
use sigex::error::PermanentError;
use sigex::testkit::domain::symbol;
use sigex::testkit::exchange::{PlaceStep, ScriptedExchange};
use support::Harness;

#[tokio::test]
async fn fill_hidden_by_timeout_is_found_without_resending() {
    let exchange = ScriptedExchange::new().with_place_steps(vec![PlaceStep::filled_but_timed_out()]);
    let h = Harness::start(exchange).await;

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    let SignalOutcome::Opened { position } = outcome else {
        panic!("expected Opened, got {outcome:?}");
    };
    assert_eq!(position.quantity(), dec!(19.0));
    assert_eq!(h.exchange.place_count(), 1);
    assert!(h.exchange.status_count() >= 1);
    assert_eq!(h.exchange.accepted_orders(), 1);
}

#[tokio::test]
async fn hung_placement_is_reconciled_after_client_timeout() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::FillThenHang(Duration::from_secs(2))]);
    let h = Harness::start(exchange).await;

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    assert!(matches!(outcome, SignalOutcome::Opened { .. }), "{outcome:?}");
    assert_eq!(h.exchange.place_count(), 1);
    assert_eq!(h.exchange.accepted_orders(), 1);
}

#[tokio::test]
async fn connection_reset_before_venue_is_resent_once() {
    let exchange = ScriptedExchange::new().with_place_steps(vec![PlaceStep::connection_reset()]);
    let h = Harness::start(exchange).await;

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    assert!(matches!(outcome, SignalOutcome::Opened { .. }), "{outcome:?}");
    assert_eq!(h.exchange.place_count(), 2);
    assert_eq!(h.exchange.status_count(), 1);
    assert_eq!(h.exchange.accepted_orders(), 1);
}

#[tokio::test]
async fn persistent_rate_limiting_fails_and_releases_symbol() {
    let exchange = ScriptedExchange::new().with_place_steps(vec![
        PlaceStep::rate_limited(),
        PlaceStep::rate_limited(),
        PlaceStep::rate_limited(),
    ]);
    let h = Harness::start(exchange).await;

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    assert!(matches!(outcome, SignalOutcome::Failed { .. }), "{outcome:?}");
    assert_eq!(h.exchange.place_count(), 3);
    assert_eq!(h.store.state(&symbol("SOLUSDT")), SymbolState::Flat);

    // The released key lets a later delivery try again.
    let retry = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;
    assert!(matches!(retry, SignalOutcome::Opened { .. }), "{retry:?}");
}

#[tokio::test]
async fn permanent_error_is_not_retried() {
    let exchange = ScriptedExchange::new().with_place_steps(vec![PlaceStep::insufficient_margin()]);
    let h = Harness::start(exchange).await;

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    let SignalOutcome::Failed { reason } = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert!(reason.contains("insufficient margin"), "{reason}");
    assert_eq!(h.exchange.place_count(), 1);
    assert_eq!(h.store.state(&symbol("SOLUSDT")), SymbolState::Flat);
}

#[tokio::test]
async fn venue_rejection_releases_reservation() {
    let exchange = ScriptedExchange::new().with_place_steps(vec![PlaceStep::Reject("price band".into())]);
    let h = Harness::start(exchange).await;

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    assert_eq!(
        outcome,
        SignalOutcome::Failed {
            reason: "price band".into()
        }
    );
    assert_eq!(h.store.state(&symbol("SOLUSDT")), SymbolState::Flat);
}

#[tokio::test]
async fn unknown_fate_stays_pending_until_reconciled() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::filled_but_timed_out()])
        .with_status_failures(2);
    let h = Harness::start(exchange).await;
    let sol = symbol("SOLUSDT");

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    assert_eq!(outcome, SignalOutcome::Pending { symbol: sol.clone() });
    assert!(matches!(h.store.state(&sol), SymbolState::PendingEntry(_)));
    assert_eq!(h.exchange.place_count(), 1);

    // Further signals on the symbol wait for the outcome.
    let blocked = h.send("trend", "SOLUSDT", "long", "entry", 146.0, 1).await;
    assert!(matches!(blocked, SignalOutcome::NoOp { code: "symbol_busy", .. }));

    let report = h.engine.reconcile().await;

    assert_eq!(report.resolved, vec![(sol.clone(), Resolution::EntryFilled)]);
    assert!(report.is_clean(), "{:?}", report.divergences);
    let SymbolState::Open(position) = h.store.state(&sol) else {
        panic!("expected open position");
    };
    assert_eq!(position.quantity(), dec!(19.0));
    assert_eq!(h.exchange.place_count(), 1);
}

#[tokio::test]
async fn partial_fill_is_accepted_after_cancelling_remainder() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::Partial { filled: dec!(7.5) }]);
    let h = Harness::start(exchange).await;

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    let SignalOutcome::Opened { position } = outcome else {
        panic!("expected Opened, got {outcome:?}");
    };
    assert_eq!(position.quantity(), dec!(7.5));
    assert_eq!(h.exchange.cancel_count(), 1);
    assert!(h.engine.reconcile().await.is_clean());
}

#[tokio::test]
async fn exit_failure_keeps_position_open() {
    let h = Harness::start(ScriptedExchange::new()).await;
    let entry = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;
    assert!(matches!(entry, SignalOutcome::Opened { .. }));
    h.exchange.push_place_step(PlaceStep::insufficient_margin());

    let exit = h.send("trend", "SOLUSDT", "long", "exit", 150.25, 1).await;

    assert!(matches!(exit, SignalOutcome::Failed { .. }), "{exit:?}");
    assert!(matches!(h.store.state(&symbol("SOLUSDT")), SymbolState::Open(_)));
    assert_eq!(h.store.equity().cumulative_pnl, dec!(0));

    let retry = h.send("trend", "SOLUSDT", "long", "exit", 150.25, 2).await;
    assert!(matches!(retry, SignalOutcome::Closed { .. }), "{retry:?}");
}

#[tokio::test]
async fn redelivered_pending_entry_is_resolved_without_resending() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::filled_but_timed_out()])
        .with_status_failures(2);
    let h = Harness::start(exchange).await;
    let sol = symbol("SOLUSDT");
    let body = h.body("trend", "SOLUSDT", "long", "entry", 145.25, 0);

    let first = h.engine.handle_payload(&body).await;
    assert_eq!(first, SignalOutcome::Pending { symbol: sol.clone() });

    let again = h.engine.handle_payload(&body).await;

    let SignalOutcome::Opened { position } = again else {
        panic!("expected Opened, got {again:?}");
    };
    assert_eq!(position.quantity(), dec!(19.0));
    assert_eq!(h.exchange.place_count(), 1);
    assert_eq!(h.exchange.accepted_orders(), 1);

    let exit = h.send("trend", "SOLUSDT", "long", "exit", 150.25, 1).await;
    assert!(matches!(exit, SignalOutcome::Closed { .. }), "{exit:?}");
}

#[tokio::test]
async fn redelivered_pending_exit_is_booked_once() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::Fill, PlaceStep::filled_but_timed_out()])
        .with_status_failures(2);
    let h = Harness::start(exchange).await;
    let sol = symbol("SOLUSDT");
    h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;
    let exit = h.body("trend", "SOLUSDT", "long", "exit", 150.25, 1);

    let first = h.engine.handle_payload(&exit).await;
    assert_eq!(first, SignalOutcome::Pending { symbol: sol.clone() });
    assert!(matches!(h.store.state(&sol), SymbolState::PendingExit { .. }));

    let again = h.engine.handle_payload(&exit).await;

    let SignalOutcome::Closed { trade } = again else {
        panic!("expected Closed, got {again:?}");
    };
    assert_eq!(trade.pnl, dec!(95.00));
    assert_eq!(h.store.state(&sol), SymbolState::Flat);
    assert_eq!(h.exchange.place_count(), 2);

    let third = h.engine.handle_payload(&exit).await;
    assert!(matches!(third, SignalOutcome::NoOp { code: "duplicate_key", .. }), "{third:?}");
    assert_eq!(h.store.equity().cumulative_pnl, dec!(95.00));
}

#[tokio::test]
async fn refused_status_query_after_ambiguous_placement_stays_pending() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::filled_but_timed_out()])
        .with_status_error(PermanentError::Rejected("undecodable response".into()).into());
    let h = Harness::start(exchange).await;
    let sol = symbol("SOLUSDT");

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    assert_eq!(outcome, SignalOutcome::Pending { symbol: sol.clone() });
    assert!(matches!(h.store.state(&sol), SymbolState::PendingEntry(_)));
    assert_eq!(h.exchange.place_count(), 1);

    let report = h.engine.reconcile().await;
    assert_eq!(report.resolved, vec![(sol.clone(), Resolution::EntryFilled)]);
    assert!(report.is_clean(), "{:?}", report.divergences);
}

#[tokio::test]
async fn refused_fill_poll_keeps_working_entry_pending() {
    let exchange = ScriptedExchange::new()
        .with_place_steps(vec![PlaceStep::Partial { filled: dec!(7.5) }])
        .with_status_error(PermanentError::Rejected("invalid api key".into()).into());
    let h = Harness::start(exchange).await;
    let sol = symbol("SOLUSDT");

    let outcome = h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;

    assert_eq!(outcome, SignalOutcome::Pending { symbol: sol.clone() });
    assert!(matches!(h.store.state(&sol), SymbolState::PendingEntry(_)));
    assert_eq!(h.exchange.place_count(), 1);
}

#[tokio::test]
async fn partial_exit_books_filled_quantity_and_keeps_remainder() {
    let h = Harness::start(ScriptedExchange::new()).await;
    let sol = symbol("SOLUSDT");
    h.send("trend", "SOLUSDT", "long", "entry", 145.25, 0).await;
    h.exchange.push_place_step(PlaceStep::Partial { filled: dec!(7.5) });

    let exit = h.send("trend", "SOLUSDT", "long", "exit", 150.25, 1).await;

    let SignalOutcome::Closed { trade } = exit else {
        panic!("expected Closed, got {exit:?}");
    };
    assert_eq!(trade.quantity, dec!(7.5));
    assert_eq!(trade.pnl, dec!(37.5));
    assert_eq!(trade.r_multiple, dec!(0.95));
    let SymbolState::Open(rest) = h.store.state(&sol) else {
        panic!("expected remainder open");
    };
    assert_eq!(rest.quantity(), dec!(11.5));
    assert_eq!(h.store.equity().cumulative_pnl, dec!(37.5));

    let report = h.engine.reconcile().await;
    assert!(report.is_clean(), "{:?}", report.divergences);

    let last = h.send("trend", "SOLUSDT", "long", "exit", 150.25, 2).await;
    let SignalOutcome::Closed { trade } = last else {
        panic!("expected Closed, got {last:?}");
    };
    assert_eq!(trade.quantity, dec!(11.5));
    assert_eq!(h.store.equity().cumulative_pnl, dec!(95.00));
    assert!(h.engine.reconcile().await.is_clean());
}
