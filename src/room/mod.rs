//! Rooms: one agent session, its history, its observers, and the request
//! lifecycle state machine.
//!
//! ```text
//! initializing ──▶ ready ◀──▶ busy
//!                    ▲          │ agent error event
//!                    └─ reset ─ error
//! any ──▶ stopped (room closed)
//! ```
//!
//! All mutable room state lives behind one `std::sync::Mutex` that is never
//! held across an `.await`. History appends and their broadcast happen under
//! that lock, so every observer sees messages in append order.
//!
//! Agent → room events arrive through [`AgentEventSink`], implemented by a
//! weak handle to the room; room → observer events leave through per-observer
//! unbounded channels.

pub mod history;
pub mod message;
pub mod naming;
pub mod observers;
pub mod request;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::agent::{AgentContext, AgentEvent, AgentEventSink, AgentFactory, AgentOptions, AgentSession};
use crate::sanitize::sanitize_error_message;
use crate::{AppError, Result};

use history::History;
use message::{Message, Role};
use observers::{Observer, Observers};
use request::{race_request, PendingRequest, RaceOutcome};

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Agent session is starting.
    Initializing,
    /// Idle and accepting prompts.
    Ready,
    /// A request is in flight.
    Busy,
    /// The agent failed; prompts are still accepted.
    Error,
    /// The room was closed.
    Stopped,
}

impl RoomStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Initializing,
        Self::Ready,
        Self::Busy,
        Self::Error,
        Self::Stopped,
    ];
}

/// Whether an activity started or finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPhase {
    /// Tool use began.
    Start,
    /// Tool use ended.
    End,
}

/// Tool use reported by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Vendor tool name.
    pub tool: String,
    /// Human description.
    pub description: String,
    /// Start or end.
    pub phase: ActivityPhase,
}

/// Snapshot delivered to an observer when it joins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Room identifier.
    pub room_id: String,
    /// Display name.
    pub room_name: String,
    /// Agent kind.
    pub agent_type: String,
    /// Working directory of the agent.
    pub directory: String,
    /// Branch checked out for the room, if any.
    pub branch: Option<String>,
    /// Current status.
    pub status: RoomStatus,
    /// Most recent history slice.
    pub history: Vec<Message>,
}

/// Row of a room listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    /// Room identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Agent kind.
    pub agent_type: String,
    /// Working directory of the agent.
    pub directory: String,
    /// Branch checked out for the room, if any.
    pub branch: Option<String>,
    /// Current status.
    pub status: RoomStatus,
    /// Observers currently joined.
    pub observer_count: usize,
    /// Messages currently retained.
    pub message_count: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Whether the room runs in a dedicated worktree.
    pub worktree: bool,
}

/// What an observer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEventKind {
    /// Join snapshot; sent to the joining observer only.
    Joined(RoomInfo),
    /// A history append.
    Message(Message),
    /// Streamed agent output; not stored.
    Stream(String),
    /// Status change.
    Status(RoomStatus),
    /// Tool use; not stored.
    Activity(Activity),
    /// Display name changed.
    Renamed(String),
    /// The room was closed.
    Closed,
}

/// Event published by a room to its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEvent {
    /// Room the event belongs to.
    pub room_id: String,
    /// Payload.
    pub kind: RoomEventKind,
}

/// Everything needed to construct a room.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    /// Room identifier.
    pub id: String,
    /// Initial (placeholder) display name.
    pub name: String,
    /// Agent kind.
    pub agent_type: String,
    /// Final working directory of the agent.
    pub directory: PathBuf,
    /// Branch checked out for the room.
    pub branch: Option<String>,
    /// Whether `directory` is a worktree owned by the room.
    pub worktree: bool,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// History capacity.
    pub history_capacity: usize,
    /// Messages replayed on join.
    pub join_history_limit: usize,
}

struct RoomState {
    name: String,
    custom_name: bool,
    status: RoomStatus,
    history: History,
    observers: Observers,
    pending: Option<PendingRequest>,
    agent_errored: bool,
}

/// A managed agent session with history and observers.
pub struct Room {
    id: String,
    agent_type: String,
    directory: PathBuf,
    branch: Option<String>,
    worktree: bool,
    created_at: DateTime<Utc>,
    request_timeout: Duration,
    join_history_limit: usize,
    agent: Option<Arc<dyn AgentSession>>,
    state: Mutex<RoomState>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

/// Agent → room event bridge.
struct RoomSink {
    room: Weak<Room>,
}

impl AgentEventSink for RoomSink {
    fn emit(&self, event: AgentEvent) {
        let Some(room) = self.room.upgrade() else {
            return;
        };
        match event {
            AgentEvent::Stream { text } => room.publish(RoomEventKind::Stream(text)),
            AgentEvent::ActivityStart { tool, description } => {
                room.publish(RoomEventKind::Activity(Activity {
                    tool,
                    description,
                    phase: ActivityPhase::Start,
                }));
            }
            AgentEvent::ActivityEnd { tool, description } => {
                room.publish(RoomEventKind::Activity(Activity {
                    tool,
                    description,
                    phase: ActivityPhase::End,
                }));
            }
            // The reply travels back through `send`.
            AgentEvent::Message { .. } => {}
            AgentEvent::Error { message } => room.on_agent_error(&message),
            AgentEvent::Debug { raw } => {
                debug!(room_id = room.id.as_str(), raw = raw.as_str(), "agent debug event");
            }
        }
    }
}

/// Clears the pending request if `send_to_agent` is abandoned mid-flight.
struct SettleGuard<'a> {
    room: &'a Room,
    request_id: String,
    armed: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(room_id = self.room.id.as_str(), "request abandoned before settling");
            self.room.finish_request(&self.request_id, None);
        }
    }
}

impl Room {
    /// Build a room and its agent session.
    ///
    /// A factory failure does not abort construction: the room is created in
    /// `error` status with a system message explaining the failure.
    #[must_use]
    pub fn new(spec: RoomSpec, factory: &dyn AgentFactory, options: AgentOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let ctx = AgentContext {
                kind: spec.agent_type.clone(),
                working_dir: spec.directory.clone(),
                options,
                sink: Arc::new(RoomSink { room: weak.clone() }),
            };

            let mut history = History::new(spec.history_capacity);
            let (agent, status) = match factory.create(ctx) {
                Ok(agent) => (Some(agent), RoomStatus::Initializing),
                Err(err) => {
                    warn!(room_id = spec.id.as_str(), %err, "agent session construction failed");
                    history.push(Message::system(format!(
                        "Failed to create agent: {}",
                        sanitize_error_message(&err.to_string())
                    )));
                    (None, RoomStatus::Error)
                }
            };

            Self {
                id: spec.id,
                agent_type: spec.agent_type,
                directory: spec.directory,
                branch: spec.branch,
                worktree: spec.worktree,
                created_at: Utc::now(),
                request_timeout: spec.request_timeout,
                join_history_limit: spec.join_history_limit,
                agent,
                state: Mutex::new(RoomState {
                    name: spec.name,
                    custom_name: false,
                    status,
                    history,
                    observers: Observers::default(),
                    pending: None,
                    agent_errored: false,
                }),
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn event(&self, kind: RoomEventKind) -> RoomEvent {
        RoomEvent {
            room_id: self.id.clone(),
            kind,
        }
    }

    fn publish(&self, kind: RoomEventKind) {
        let event = self.event(kind);
        self.state().observers.broadcast(&event);
    }

    /// Append and broadcast under the held lock.
    fn append_locked(&self, state: &mut RoomState, message: Message) {
        state.history.push(message.clone());
        state.observers.broadcast(&self.event(RoomEventKind::Message(message)));
    }

    fn set_status_locked(&self, state: &mut RoomState, status: RoomStatus) {
        state.status = status;
        state.observers.broadcast(&self.event(RoomEventKind::Status(status)));
    }

    fn auto_name_locked(&self, state: &mut RoomState, content: &str) {
        if state.custom_name {
            return;
        }
        if let Some(name) = naming::infer_name_from_message(content) {
            if name != state.name {
                debug!(room_id = self.id.as_str(), name = name.as_str(), "room auto-named");
                state.name.clone_from(&name);
                state.observers.broadcast(&self.event(RoomEventKind::Renamed(name)));
            }
        }
    }

    fn on_agent_error(&self, message: &str) {
        let mut state = self.state();
        if state.pending.is_some() {
            state.agent_errored = true;
            return;
        }
        if state.status == RoomStatus::Stopped {
            return;
        }
        warn!(room_id = self.id.as_str(), error = message, "agent error outside a request");
        self.append_locked(
            &mut state,
            Message::system(format!("Agent error: {}", sanitize_error_message(message))),
        );
        self.set_status_locked(&mut state, RoomStatus::Error);
    }

    /// Clear the pending request `request_id` and settle the status.
    ///
    /// No-op when the request was already cleared by `reset_status` or
    /// `close`.
    fn finish_request(&self, request_id: &str, note: Option<Message>) {
        let mut state = self.state();
        if state.pending.as_ref().map(|p| p.id.as_str()) != Some(request_id) {
            return;
        }
        state.pending = None;
        if let Some(note) = note {
            self.append_locked(&mut state, note);
        }
        let status = if state.agent_errored {
            RoomStatus::Error
        } else {
            RoomStatus::Ready
        };
        self.set_status_locked(&mut state, status);
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Start the agent session and move to `ready` (or `error`).
    pub async fn start(&self) {
        let Some(agent) = self.agent.clone() else {
            return;
        };
        let result = agent.start().await;
        let mut state = self.state();
        if state.status != RoomStatus::Initializing {
            return;
        }
        match result {
            Ok(()) => {
                info!(room_id = self.id.as_str(), agent = self.agent_type.as_str(), "room ready");
                self.set_status_locked(&mut state, RoomStatus::Ready);
            }
            Err(err) => {
                warn!(room_id = self.id.as_str(), %err, "agent failed to start");
                self.append_locked(
                    &mut state,
                    Message::system(format!(
                        "Agent failed to start: {}",
                        sanitize_error_message(&err.to_string())
                    )),
                );
                self.set_status_locked(&mut state, RoomStatus::Error);
            }
        }
    }

    /// Send `content` to the agent and wait for the reply.
    ///
    /// # Errors
    ///
    /// - [`AppError::Busy`] when a request is already in flight; nothing is
    ///   appended.
    /// - [`AppError::Timeout`] / [`AppError::Cancelled`] when the timer or the
    ///   cancellation trigger won the race; the room returns to `ready`.
    /// - Any agent failure; the room ends in `error` only when the agent
    ///   reported an error event.
    pub async fn send_to_agent(&self, content: &str, origin: Option<String>) -> Result<String> {
        let (agent, pending) = {
            let mut state = self.state();
            match state.status {
                RoomStatus::Busy => {
                    return Err(AppError::Busy(format!(
                        "room {} is already processing a request",
                        state.name
                    )))
                }
                RoomStatus::Stopped => {
                    return Err(AppError::NotFound(format!("room {} is closed", self.id)))
                }
                _ => {}
            }
            let Some(agent) = self.agent.clone() else {
                return Err(AppError::SubprocessFailure(format!(
                    "room {} has no agent session",
                    state.name
                )));
            };

            let pending = PendingRequest::new();
            state.pending = Some(pending.clone());
            state.agent_errored = false;
            self.set_status_locked(&mut state, RoomStatus::Busy);
            self.append_locked(&mut state, Message::user(content, origin));
            self.auto_name_locked(&mut state, content);
            (agent, pending)
        };

        let mut guard = SettleGuard {
            room: self,
            request_id: pending.id.clone(),
            armed: true,
        };
        let started = Instant::now();
        info!(room_id = self.id.as_str(), request_id = pending.id.as_str(), "request started");

        let outcome = race_request(agent.send(content), self.request_timeout, &pending.token()).await;

        let (result, note) = match outcome {
            RaceOutcome::Completed(Ok(reply)) => {
                info!(
                    room_id = self.id.as_str(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "request completed"
                );
                (Ok(reply.clone()), Some(Message::agent(reply)))
            }
            RaceOutcome::Completed(Err(err)) => {
                warn!(room_id = self.id.as_str(), %err, "request failed");
                agent.stop().await;
                let note = match &err {
                    // `cancel()` already explained it.
                    AppError::Cancelled(_) => None,
                    _ => Some(Message::system(format!(
                        "Request failed: {}",
                        sanitize_error_message(&err.to_string())
                    ))),
                };
                (Err(err), note)
            }
            RaceOutcome::TimedOut => {
                let secs = self.request_timeout.as_secs_f64();
                warn!(room_id = self.id.as_str(), timeout_secs = secs, "request timed out");
                agent.stop().await;
                (
                    Err(AppError::Timeout(format!("no reply within {secs}s"))),
                    Some(Message::system(format!("Request timed out after {secs}s"))),
                )
            }
            RaceOutcome::Cancelled => {
                info!(room_id = self.id.as_str(), "request cancelled");
                agent.stop().await;
                (Err(AppError::Cancelled("request cancelled".into())), None)
            }
        };

        guard.armed = false;
        self.finish_request(&guard.request_id, note);
        result
    }

    /// Cancel the in-flight request.
    ///
    /// Returns `false` without side effects when nothing is pending.
    pub fn cancel(&self) -> bool {
        let mut state = self.state();
        let Some(pending) = state.pending.clone() else {
            return false;
        };
        if pending.is_cancelled() {
            return true;
        }
        pending.cancel();
        self.append_locked(&mut state, Message::system("Request cancelled"));
        info!(room_id = self.id.as_str(), request_id = pending.id.as_str(), "cancel requested");
        true
    }

    /// Emergency recovery: kill the agent, drop the pending request, force
    /// `ready`.
    ///
    /// Safe to call at any time; a closed room stays `stopped`.
    pub async fn reset_status(&self) -> RoomStatus {
        {
            let state = self.state();
            if state.status == RoomStatus::Stopped {
                return RoomStatus::Stopped;
            }
            // Cleared only once the agent is stopped: `busy` implies a pending request.
            if let Some(pending) = &state.pending {
                pending.cancel();
            }
        }
        if let Some(agent) = &self.agent {
            agent.stop().await;
        }

        let mut state = self.state();
        if state.status == RoomStatus::Stopped {
            return RoomStatus::Stopped;
        }
        if let Some(pending) = state.pending.take() {
            pending.cancel();
        }
        state.agent_errored = false;
        self.set_status_locked(&mut state, RoomStatus::Ready);
        self.append_locked(&mut state, Message::system("Status reset"));
        info!(room_id = self.id.as_str(), "room status reset");
        RoomStatus::Ready
    }

    /// Close the room: cancel any request, stop the agent, notify observers.
    ///
    /// Idempotent.
    pub async fn close(&self) {
        let pending = {
            let mut state = self.state();
            if state.status == RoomStatus::Stopped {
                return;
            }
            state.status = RoomStatus::Stopped;
            state.pending.take()
        };
        if let Some(pending) = pending {
            pending.cancel();
        }
        if let Some(agent) = &self.agent {
            agent.stop().await;
        }

        let mut state = self.state();
        state
            .observers
            .broadcast(&self.event(RoomEventKind::Status(RoomStatus::Stopped)));
        state.observers.broadcast(&self.event(RoomEventKind::Closed));
        state.observers = Observers::default();
        info!(room_id = self.id.as_str(), "room closed");
    }

    // ── Observers ────────────────────────────────────────────────────────

    /// Add `observer` and send it the join snapshot.
    pub fn join(&self, observer: Observer) -> RoomInfo {
        let mut state = self.state();
        let info = self.info_locked(&state);
        let id = observer.id.clone();
        debug!(room_id = self.id.as_str(), observer = id.as_str(), "observer joined");
        state.observers.insert(observer);
        state.observers.send_to(&id, self.event(RoomEventKind::Joined(info.clone())));
        info
    }

    /// Remove observer `id`; history is untouched.
    pub fn leave(&self, id: &str) -> bool {
        self.state().observers.remove(id)
    }

    /// Whether `id` is observing.
    #[must_use]
    pub fn has_observer(&self, id: &str) -> bool {
        self.state().observers.contains(id)
    }

    // ── Naming ───────────────────────────────────────────────────────────

    /// Set an explicit name; auto-naming is disabled from now on.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when `name` is blank.
    pub fn rename(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Protocol("room name must not be empty".into()));
        }
        let mut state = self.state();
        state.custom_name = true;
        state.name = name.to_owned();
        state
            .observers
            .broadcast(&self.event(RoomEventKind::Renamed(name.to_owned())));
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────────

    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.state().name.clone()
    }

    /// Agent kind.
    #[must_use]
    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    /// Working directory of the agent.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Branch checked out for the room.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Whether the room owns a worktree.
    #[must_use]
    pub fn has_worktree(&self) -> bool {
        self.worktree
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RoomStatus {
        self.state().status
    }

    /// The in-flight request, if any.
    #[must_use]
    pub fn pending_request(&self) -> Option<PendingRequest> {
        self.state().pending.clone()
    }

    /// All retained messages, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Message> {
        self.state().history.iter().cloned().collect()
    }

    /// Number of retained messages with `role`.
    #[must_use]
    pub fn count_role(&self, role: Role) -> usize {
        self.state().history.iter().filter(|m| m.role == role).count()
    }

    /// Number of joined observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.state().observers.len()
    }

    /// Number of retained messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.state().history.len()
    }

    fn info_locked(&self, state: &RoomState) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            room_name: state.name.clone(),
            agent_type: self.agent_type.clone(),
            directory: self.directory.display().to_string(),
            branch: self.branch.clone(),
            status: state.status,
            history: state.history.recent(self.join_history_limit),
        }
    }

    /// Join snapshot without joining.
    #[must_use]
    pub fn info(&self) -> RoomInfo {
        self.info_locked(&self.state())
    }

    /// Listing row.
    #[must_use]
    pub fn summary(&self) -> RoomSummary {
        let state = self.state();
        RoomSummary {
            id: self.id.clone(),
            name: state.name.clone(),
            agent_type: self.agent_type.clone(),
            directory: self.directory.display().to_string(),
            branch: self.branch.clone(),
            status: state.status,
            observer_count: state.observers.len(),
            message_count: state.history.len(),
            created_at: self.created_at,
            worktree: self.worktree,
        }
    }
}
