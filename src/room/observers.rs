//! Observer registry and fan-out for one room.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use super::RoomEvent;

/// One connection observing a room.
#[derive(Debug, Clone)]
pub struct Observer {
    /// Connection identifier.
    pub id: String,
    /// Display name chosen by the client.
    pub name: String,
    /// When the observer joined.
    pub joined_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl Observer {
    /// Observer delivering into `tx`.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, tx: mpsc::UnboundedSender<RoomEvent>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            joined_at: Utc::now(),
            tx,
        }
    }

    /// Whether the underlying transport is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Set of observers keyed by connection id, in join order.
#[derive(Debug, Default)]
pub struct Observers {
    entries: Vec<Observer>,
}

impl Observers {
    /// Add or replace the observer with the same id.
    pub fn insert(&mut self, observer: Observer) {
        self.entries.retain(|o| o.id != observer.id);
        self.entries.push(observer);
    }

    /// Remove the observer `id`; returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|o| o.id != id);
        before != self.entries.len()
    }

    /// Whether `id` is observing.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|o| o.id == id)
    }

    /// Number of observers, open or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody observes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send `event` to `id` only.
    pub fn send_to(&self, id: &str, event: RoomEvent) {
        if let Some(observer) = self.entries.iter().find(|o| o.id == id) {
            let _ = observer.tx.send(event);
        }
    }

    /// Deliver `event` to every open observer.
    ///
    /// A closed observer is skipped and never affects delivery to others.
    pub fn broadcast(&self, event: &RoomEvent) {
        for observer in &self.entries {
            if !observer.is_open() {
                continue;
            }
            if observer.tx.send(event.clone()).is_err() {
                debug!(observer = observer.id.as_str(), "observer closed during broadcast");
            }
        }
    }

    /// Iterate observers in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Observer> {
        self.entries.iter()
    }
}
