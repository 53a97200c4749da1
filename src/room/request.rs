//! In-flight request state and the completion / timeout / cancel race.
//!
//! A request settles exactly once. [`race_request`] polls its three sources
//! in a fixed order and returns as soon as one resolves; the losing sources
//! are dropped with the select, which clears the timer and detaches the
//! cancellation waiter, so nothing fires late.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Which source settled a raced request.
#[derive(Debug, PartialEq, Eq)]
pub enum RaceOutcome<T> {
    /// The work future finished first.
    Completed(T),
    /// The timeout elapsed first.
    TimedOut,
    /// The cancellation trigger fired first.
    Cancelled,
}

/// Race `work` against `timeout` and `cancel`.
///
/// Priority on simultaneous readiness: cancellation, then completion, then
/// timeout.
pub async fn race_request<F, T>(work: F, timeout: Duration, cancel: &CancellationToken) -> RaceOutcome<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;

        () = cancel.cancelled() => RaceOutcome::Cancelled,
        out = work => RaceOutcome::Completed(out),
        () = tokio::time::sleep(timeout) => RaceOutcome::TimedOut,
    }
}

/// State of the one outstanding `send` of a room.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Request identifier.
    pub id: String,
    /// When the request started.
    pub started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl PendingRequest {
    /// Fresh request with an untriggered cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Token the request's race listens on.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fire the cancellation trigger.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was triggered.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for PendingRequest {
    fn default() -> Self {
        Self::new()
    }
}
