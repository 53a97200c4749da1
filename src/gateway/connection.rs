//! Per-client dispatcher shared by every transport.
//!
//! A [`ClientConnection`] turns inbound [`ClientMessage`]s into room manager
//! and room calls and pushes [`ServerMessage`]s into an outbound channel the
//! transport drains. Room events reach the connection through one observer
//! channel regardless of how many rooms it has joined.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerMessage};
use crate::agent::AgentOptions;
use crate::orchestrator::{CreateRoomRequest, RoomManager};
use crate::room::observers::Observer;
use crate::room::{Room, RoomEvent};
use crate::sanitize::sanitize_error_message;
use crate::{AppError, Result};

/// Version reported in `welcome`.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One connected client.
pub struct ClientConnection {
    id: String,
    name: Mutex<String>,
    manager: Arc<RoomManager>,
    out: mpsc::UnboundedSender<ServerMessage>,
    events: mpsc::UnboundedSender<RoomEvent>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl ClientConnection {
    /// Register a connection writing into `out` and send `welcome`.
    #[must_use]
    pub fn open(manager: Arc<RoomManager>, out: mpsc::UnboundedSender<ServerMessage>) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        let (events, mut events_rx) = mpsc::unbounded_channel::<RoomEvent>();

        let forward_out = out.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if forward_out.send(ServerMessage::from(event)).is_err() {
                    break;
                }
            }
        });

        let short: String = id.chars().take(6).collect();
        let conn = Arc::new(Self {
            name: Mutex::new(format!("client-{short}")),
            id,
            manager,
            out,
            events,
            forwarder: Mutex::new(Some(forwarder)),
        });

        info!(client_id = conn.id.as_str(), "client connected");
        conn.send(ServerMessage::Welcome {
            client_id: conn.id.clone(),
            rooms: conn.manager.list(),
            server_version: SERVER_VERSION.to_owned(),
        });
        conn
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.name.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn send(&self, message: ServerMessage) {
        if self.out.send(message).is_err() {
            debug!(client_id = self.id.as_str(), "outbound channel closed");
        }
    }

    fn send_error(&self, err: &AppError, room_id: Option<String>) {
        self.send(ServerMessage::Error {
            error: sanitize_error_message(&err.to_string()),
            room_id,
        });
    }

    fn observe(&self, room: &Room) {
        room.join(Observer::new(self.id.clone(), self.name(), self.events.clone()));
    }

    /// Parse and handle one raw JSON message.
    pub async fn handle_text(self: &Arc<Self>, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(message).await,
            Err(err) => {
                debug!(client_id = self.id.as_str(), %err, "malformed client message");
                self.send_error(&AppError::from(err), None);
            }
        }
    }

    /// Handle one message; failures are reported to the client.
    pub async fn handle(self: &Arc<Self>, message: ClientMessage) {
        if let Err(err) = self.dispatch(message).await {
            self.send_error(&err, None);
        }
    }

    async fn dispatch(self: &Arc<Self>, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::SetName { name } => {
                let name = name.trim().to_owned();
                if name.is_empty() {
                    return Err(AppError::Protocol("name must not be empty".into()));
                }
                *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name.clone();
                self.send(ServerMessage::NameSet { name });
            }

            ClientMessage::CreateRoom {
                agent_type,
                directory,
                branch,
                agent_options,
            } => {
                let room = self
                    .manager
                    .create_room(CreateRoomRequest {
                        agent_type,
                        directory: PathBuf::from(directory),
                        branch: branch.filter(|b| !b.trim().is_empty()),
                        options: AgentOptions::from_value(agent_options.as_ref()),
                    })
                    .await?;
                self.observe(&room);
            }

            ClientMessage::JoinRoom { room_id, room_name } => {
                let key = room_id
                    .or(room_name)
                    .ok_or_else(|| AppError::Protocol("join_room needs roomId or roomName".into()))?;
                let room = self.manager.resolve(&key)?;
                self.observe(&room);
            }

            ClientMessage::LeaveRoom { room_id } => {
                let room = self.manager.resolve(&room_id)?;
                room.leave(&self.id);
                self.send(ServerMessage::RoomLeft {
                    room_id: room.id().to_owned(),
                });
            }

            ClientMessage::SendMessage { room_id, content } => {
                let room = self.manager.resolve(&room_id)?;
                if !room.has_observer(&self.id) {
                    self.observe(&room);
                }
                // Runs detached so this connection can still cancel it.
                let conn = Arc::clone(self);
                tokio::spawn(async move {
                    let result = room.send_to_agent(&content, Some(conn.id.clone())).await;
                    if let Err(err) = result {
                        if !err.is_recoverable() {
                            conn.send_error(&err, Some(room.id().to_owned()));
                        }
                    }
                });
            }

            ClientMessage::ListRooms => {
                self.send(ServerMessage::RoomList {
                    rooms: self.manager.list(),
                });
            }

            ClientMessage::CloseRoom { room_id } => {
                let room = self.manager.resolve(&room_id)?;
                let observing = room.has_observer(&self.id);
                self.manager.destroy_room(room.id()).await?;
                if !observing {
                    self.send(ServerMessage::RoomClosed {
                        room_id: room.id().to_owned(),
                    });
                }
            }

            ClientMessage::Cancel { room_id } => {
                let room = self.manager.resolve(&room_id)?;
                let cancelled = room.cancel();
                self.send(ServerMessage::CancelResult {
                    room_id: room.id().to_owned(),
                    cancelled,
                });
            }

            ClientMessage::Reset { room_id } => {
                let room = self.manager.resolve(&room_id)?;
                let status = room.reset_status().await;
                self.send(ServerMessage::ResetResult {
                    room_id: room.id().to_owned(),
                    status,
                });
            }

            ClientMessage::RenameRoom { room_id, name } => {
                let room = self.manager.resolve(&room_id)?;
                room.rename(&name)?;
                if !room.has_observer(&self.id) {
                    self.send(ServerMessage::RoomRenamed {
                        room_id: room.id().to_owned(),
                        name: room.name(),
                    });
                }
            }

            ClientMessage::Ping => self.send(ServerMessage::Pong),
        }
        Ok(())
    }

    /// Detach from every room and stop forwarding. Idempotent.
    pub fn close(&self) {
        let detached = self.manager.detach_observer_everywhere(&self.id);
        if let Some(forwarder) = self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            forwarder.abort();
        }
        if detached > 0 {
            info!(client_id = self.id.as_str(), rooms = detached, "client disconnected");
        } else {
            debug!(client_id = self.id.as_str(), "client disconnected");
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        if let Some(forwarder) = self
            .forwarder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            warn!(client_id = self.id.as_str(), "connection dropped without close");
            forwarder.abort();
        }
    }
}
