//! In-process client for a co-located UI.
//!
//! Issues the same [`ClientMessage`] vocabulary as a remote client and
//! receives the same [`ServerMessage`]s, without any socket in between.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::connection::ClientConnection;
use super::protocol::{ClientMessage, ServerMessage};
use crate::orchestrator::RoomManager;

/// Call-through client bound to one [`ClientConnection`].
pub struct LocalClient {
    conn: Arc<ClientConnection>,
    inbox: mpsc::UnboundedReceiver<ServerMessage>,
}

impl LocalClient {
    /// Connect to `manager`; the `welcome` message is waiting in the inbox.
    #[must_use]
    pub fn connect(manager: Arc<RoomManager>) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let conn = ClientConnection::open(manager, tx);
        Self { conn, inbox }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.conn.id()
    }

    /// Dispatch one message.
    pub async fn send(&self, message: ClientMessage) {
        self.conn.handle(message).await;
    }

    /// Next outbound message, waiting for one.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.inbox.recv().await
    }

    /// Next outbound message, or `None` after `timeout`.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<ServerMessage> {
        tokio::time::timeout(timeout, self.inbox.recv()).await.ok().flatten()
    }

    /// Wait for the first message matching `pred`, skipping others.
    pub async fn recv_until<F>(&mut self, timeout: Duration, mut pred: F) -> Option<ServerMessage>
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let message = tokio::time::timeout_at(deadline, self.inbox.recv()).await.ok()??;
            if pred(&message) {
                return Some(message);
            }
        }
    }

    /// Already-queued messages, without waiting.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Detach from every room.
    pub fn close(&self) {
        self.conn.close();
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        self.conn.close();
    }
}
