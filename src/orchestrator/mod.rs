//! Room orchestration.
//!
//! The [`RoomManager`] owns every live room, decides whether a room gets a
//! worktree, and tears rooms down on request or at shutdown.

pub mod room_manager;

pub use room_manager::{CreateRoomRequest, RoomManager, RoomSettings, RoomStats};
