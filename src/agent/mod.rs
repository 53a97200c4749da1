//! Agent sessions: subprocess supervision and output normalization.
//!
//! An [`AgentSession`] owns the subprocess (or one-shot invocations) of one
//! coding agent and translates its vendor-specific output into the canonical
//! [`AgentEvent`] vocabulary. Rooms only ever see canonical events, so adding
//! an agent kind means adding a [`Dialect`] translator and a profile.
//!
//! - `codec`: bounded NDJSON line framing for subprocess stdout.
//! - `dialect`: per-vendor translation into canonical events.
//! - `spawner`: executable resolution, command construction, teardown.
//! - `interactive`: long-lived subprocess with piped stdio.
//! - `oneshot`: spawn-per-call subprocess.
//! - `catalog`: the kind → factory registration map.

pub mod catalog;
pub mod codec;
pub mod dialect;
pub mod interactive;
pub mod oneshot;
pub mod spawner;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Result;

pub use catalog::{AgentCatalog, CliAgentFactory};

/// Boxed future returned by the object-safe agent traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Send strategy used by an agent kind.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// One long-lived subprocess; one stdin line per prompt.
    #[default]
    Interactive,
    /// A fresh subprocess per prompt, prompt passed as the last argument.
    OneShot,
}

/// Output vocabulary spoken by an agent executable.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Claude Code `stream-json`.
    Claude,
    /// Codex `exec --json`.
    Codex,
    /// Gemini CLI `--output-format json`.
    Gemini,
    /// Plain text lines with optional `result` / `error` JSON records.
    #[default]
    Plain,
}

/// Lifecycle status of an agent session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Constructed but not started.
    Idle,
    /// Started and able to accept a prompt.
    Ready,
    /// A prompt is in flight.
    Busy,
    /// The subprocess failed or crashed.
    Error,
    /// Stopped explicitly.
    Stopped,
}

/// Canonical events every agent dialect is translated into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A chunk of streamed output, including unparseable raw lines.
    Stream {
        /// Text of the chunk.
        text: String,
    },
    /// The agent started using a tool.
    ActivityStart {
        /// Vendor tool name.
        tool: String,
        /// Human description of the tool use.
        description: String,
    },
    /// The agent finished using a tool.
    ActivityEnd {
        /// Vendor tool name.
        tool: String,
        /// Human description of the tool use.
        description: String,
    },
    /// Final reply text; settles the pending send.
    Message {
        /// Full reply text.
        text: String,
    },
    /// Agent-reported failure; settles the pending send as an error.
    Error {
        /// Failure description.
        message: String,
    },
    /// Record the translator did not recognize.
    Debug {
        /// Raw record text.
        raw: String,
    },
}

/// Receiver of canonical events produced by a session.
///
/// Events are delivered at most once, in the order the subprocess produced
/// them. `Message` and `Error` events are delivered before the `send` they
/// settle completes, so observers never see a reply ahead of its stream.
pub trait AgentEventSink: Send + Sync {
    /// Deliver one event. Must not block.
    fn emit(&self, event: AgentEvent);
}

impl AgentEventSink for mpsc::UnboundedSender<AgentEvent> {
    fn emit(&self, event: AgentEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AgentEventSink for NullSink {
    fn emit(&self, _event: AgentEvent) {}
}

/// Per-room options supplied by the client in `create_room`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentOptions {
    /// Extra CLI arguments appended to the profile arguments.
    pub args: Vec<String>,
    /// Model name passed as `--model <model>`.
    pub model: Option<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl AgentOptions {
    /// Parse options from an optional JSON value; anything malformed yields defaults.
    #[must_use]
    pub fn from_value(value: Option<&serde_json::Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// Everything a factory needs to build a session for one room.
#[derive(Clone)]
pub struct AgentContext {
    /// Agent kind the session is created for.
    pub kind: String,
    /// Working directory the subprocess runs in.
    pub working_dir: PathBuf,
    /// Client-supplied options.
    pub options: AgentOptions,
    /// Where canonical events are delivered.
    pub sink: Arc<dyn AgentEventSink>,
}

/// Supervisor of one agent subprocess.
pub trait AgentSession: Send + Sync {
    /// Agent kind this session drives.
    fn kind(&self) -> &str;

    /// Current lifecycle status.
    fn status(&self) -> AgentStatus;

    /// Verify the executable is reachable and ready the session.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnavailableExecutable`](crate::AppError::UnavailableExecutable)
    /// when the executable is missing, or
    /// [`AppError::SubprocessFailure`](crate::AppError::SubprocessFailure) when
    /// it cannot be spawned.
    fn start(&self) -> BoxFuture<'_, Result<()>>;

    /// Deliver one prompt and resolve with the full reply.
    ///
    /// At most one send may be in flight; dropping the returned future
    /// abandons the reply but does not stop the subprocess.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Agent`](crate::AppError::Agent) when the agent
    /// reports an error and [`AppError::SubprocessFailure`](crate::AppError::SubprocessFailure)
    /// when the subprocess fails.
    fn send<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Terminate the subprocess. Idempotent and infallible.
    fn stop(&self) -> BoxFuture<'_, ()>;
}

/// Builds sessions for one agent kind.
pub trait AgentFactory: Send + Sync {
    /// Construct an unstarted session.
    ///
    /// # Errors
    ///
    /// Returns an error when the context cannot be honored (for example an
    /// unusable working directory).
    fn create(&self, ctx: AgentContext) -> Result<Arc<dyn AgentSession>>;
}
