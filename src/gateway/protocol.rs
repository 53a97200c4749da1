//! Wire vocabulary shared by every transport.
//!
//! Each message is a JSON object tagged by `type` (snake_case); payload
//! fields are camelCase.
//!
//! ```json
//! {"type":"send_message","roomId":"…","content":"fix the login bug"}
//! {"type":"status","roomId":"…","status":"busy"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::room::message::Message;
use crate::room::{Activity, RoomEvent, RoomEventKind, RoomInfo, RoomStatus, RoomSummary};

/// Inbound client → gateway message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Set the display name used when joining rooms.
    SetName {
        /// New display name.
        name: String,
    },
    /// Create a room; the creator joins it.
    CreateRoom {
        /// Registered agent kind.
        agent_type: String,
        /// Target directory.
        directory: String,
        /// Requested branch.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        /// Agent options (`args`, `model`, `env`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_options: Option<Value>,
    },
    /// Join a room by id or name.
    JoinRoom {
        /// Room id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
        /// Room name, used when no id is given.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_name: Option<String>,
    },
    /// Stop observing a room.
    LeaveRoom {
        /// Room id or name.
        room_id: String,
    },
    /// Send a prompt to a room's agent.
    SendMessage {
        /// Room id or name.
        room_id: String,
        /// Prompt text.
        content: String,
    },
    /// List every room.
    ListRooms,
    /// Destroy a room.
    CloseRoom {
        /// Room id or name.
        room_id: String,
    },
    /// Cancel a room's in-flight request.
    Cancel {
        /// Room id or name.
        room_id: String,
    },
    /// Force a room back to `ready`.
    Reset {
        /// Room id or name.
        room_id: String,
    },
    /// Give a room an explicit name.
    RenameRoom {
        /// Room id or name.
        room_id: String,
        /// New name.
        name: String,
    },
    /// Liveness probe.
    Ping,
}

/// Outbound gateway → client message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// First message of every connection.
    Welcome {
        /// Identifier assigned to the connection.
        client_id: String,
        /// Rooms existing at connect time.
        rooms: Vec<RoomSummary>,
        /// Crate version of the server.
        server_version: String,
    },
    /// Join snapshot.
    RoomJoined(RoomInfo),
    /// The connection stopped observing a room.
    RoomLeft {
        /// Room id.
        room_id: String,
    },
    /// History append.
    Message {
        /// Room id.
        room_id: String,
        /// Appended message.
        message: Message,
    },
    /// Streamed agent output.
    Stream {
        /// Room id.
        room_id: String,
        /// Output chunk.
        chunk: String,
    },
    /// Room status change.
    Status {
        /// Room id.
        room_id: String,
        /// New status.
        status: RoomStatus,
    },
    /// Agent tool use.
    Activity {
        /// Room id.
        room_id: String,
        /// Tool use.
        activity: Activity,
    },
    /// Room listing.
    RoomList {
        /// Every room.
        rooms: Vec<RoomSummary>,
    },
    /// A room was closed.
    RoomClosed {
        /// Room id.
        room_id: String,
    },
    /// A room was renamed.
    RoomRenamed {
        /// Room id.
        room_id: String,
        /// New name.
        name: String,
    },
    /// Sanitized failure description.
    Error {
        /// Error text.
        error: String,
        /// Room the failure relates to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
    /// Reply to `ping`.
    Pong,
    /// Display name accepted.
    NameSet {
        /// Name now in effect.
        name: String,
    },
    /// Outcome of `cancel`.
    CancelResult {
        /// Room id.
        room_id: String,
        /// Whether a request was cancelled.
        cancelled: bool,
    },
    /// Outcome of `reset`.
    ResetResult {
        /// Room id.
        room_id: String,
        /// Status after the reset.
        status: RoomStatus,
    },
}

impl From<RoomEvent> for ServerMessage {
    fn from(event: RoomEvent) -> Self {
        let room_id = event.room_id;
        match event.kind {
            RoomEventKind::Joined(info) => Self::RoomJoined(info),
            RoomEventKind::Message(message) => Self::Message { room_id, message },
            RoomEventKind::Stream(chunk) => Self::Stream { room_id, chunk },
            RoomEventKind::Status(status) => Self::Status { room_id, status },
            RoomEventKind::Activity(activity) => Self::Activity { room_id, activity },
            RoomEventKind::Renamed(name) => Self::RoomRenamed { room_id, name },
            RoomEventKind::Closed => Self::RoomClosed { room_id },
        }
    }
}
