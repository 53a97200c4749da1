#![forbid(unsafe_code)]

//! Rooms multiplexing coding-agent subprocesses behind observable sessions.

pub mod agent;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod orchestrator;
pub mod room;
pub mod sanitize;
pub mod worktree;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
