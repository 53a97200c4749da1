//! Room message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a room message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Prompt sent by a client.
    User,
    /// Reply produced by the agent.
    Agent,
    /// Diagnostic produced by the room itself.
    System,
}

/// One immutable entry of a room's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Append time.
    pub timestamp: DateTime<Utc>,
    /// Connection that originated the message, for user messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Message {
    /// Build a message stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            origin,
        }
    }

    /// User prompt.
    #[must_use]
    pub fn user(content: impl Into<String>, origin: Option<String>) -> Self {
        Self::new(Role::User, content, origin)
    }

    /// Agent reply.
    #[must_use]
    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Role::Agent, content, None)
    }

    /// Room diagnostic.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, None)
    }
}
