//! Completion / timeout / cancel race.

use std::time::Duration;

use agent_rooms::room::request::{race_request, PendingRequest, RaceOutcome};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn completion_wins_before_timeout() {
    let token = CancellationToken::new();
    let outcome = race_request(async { 7 }, Duration::from_secs(5), &token).await;
    assert_eq!(outcome, RaceOutcome::Completed(7));
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_when_work_never_finishes() {
    let token = CancellationToken::new();
    let outcome = race_request(
        std::future::pending::<()>(),
        Duration::from_secs(30),
        &token,
    )
    .await;
    assert_eq!(outcome, RaceOutcome::TimedOut);
}

#[tokio::test]
async fn cancellation_beats_ready_work() {
    let token = CancellationToken::new();
    token.cancel();
    let outcome = race_request(async { "reply" }, Duration::from_secs(5), &token).await;
    assert_eq!(outcome, RaceOutcome::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_flight_settles_as_cancelled() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let work = async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        1
    };
    let outcome = race_request(work, Duration::from_secs(60), &token).await;
    assert_eq!(outcome, RaceOutcome::Cancelled);
}

#[test]
fn pending_request_cancel_is_observable_through_token() {
    let pending = PendingRequest::new();
    let token = pending.token();
    assert!(!pending.is_cancelled());
    pending.cancel();
    assert!(pending.is_cancelled());
    assert!(token.is_cancelled());
}

#[test]
fn pending_requests_have_distinct_ids() {
    assert_ne!(PendingRequest::new().id, PendingRequest::default().id);
}
