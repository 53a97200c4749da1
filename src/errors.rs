//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The agent's backing executable could not be found on this host.
    UnavailableExecutable {
        /// Agent kind whose executable is missing.
        agent: String,
        /// Human-readable install instructions.
        hint: String,
    },
    /// Subprocess spawn failure, non-zero exit without usable output, or crash.
    SubprocessFailure(String),
    /// The agent itself reported an error event for the current request.
    Agent(String),
    /// A request is already in flight for the room.
    Busy(String),
    /// The request did not settle within the configured timeout.
    Timeout(String),
    /// The request was cancelled before it settled.
    Cancelled(String),
    /// A worktree path failed one of the deletion safety checks.
    SafetyViolation(String),
    /// Requested room, workspace, or agent kind does not exist.
    NotFound(String),
    /// A `git` invocation failed.
    Git(String),
    /// Malformed or unexpected client protocol message.
    Protocol(String),
    /// IPC communication failure.
    Ipc(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the failure leaves the room usable without operator action.
    ///
    /// Timeouts and cancellations are recoverable; the room returns to
    /// `ready`. Everything else counts as a genuine failure.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled(_))
    }

    /// Short machine-readable category, used in protocol error payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::UnavailableExecutable { .. } => "unavailable_executable",
            Self::SubprocessFailure(_) => "subprocess_failure",
            Self::Agent(_) => "agent",
            Self::Busy(_) => "busy",
            Self::Timeout(_) => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::SafetyViolation(_) => "safety_violation",
            Self::NotFound(_) => "not_found",
            Self::Git(_) => "git",
            Self::Protocol(_) => "protocol",
            Self::Ipc(_) => "ipc",
            Self::Io(_) => "io",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::UnavailableExecutable { agent, hint } => {
                write!(f, "unavailable executable: {agent} is not installed ({hint})")
            }
            Self::SubprocessFailure(msg) => write!(f, "subprocess failure: {msg}"),
            Self::Agent(msg) => write!(f, "agent error: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::SafetyViolation(msg) => write!(f, "safety violation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Git(msg) => write!(f, "git: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("invalid json: {err}"))
    }
}
