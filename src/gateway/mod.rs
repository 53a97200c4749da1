//! Client-facing boundary.
//!
//! - `protocol`: tagged JSON records exchanged with clients.
//! - `connection`: the dispatcher every transport shares.
//! - `ws`: axum WebSocket endpoint plus `/health` and `/stats`.
//! - `ipc`: local socket endpoint used by `agent-rooms-ctl`.
//! - `local`: in-process client with no transport at all.

pub mod connection;
pub mod ipc;
pub mod local;
pub mod protocol;
pub mod ws;

pub use connection::ClientConnection;
pub use local::LocalClient;
pub use protocol::{ClientMessage, ServerMessage};
