#![allow(dead_code)]

//! Shared test helpers for room-level integration tests.
//!
//! Provides a scripted in-process agent so room and gateway tests can drive
//! the request lifecycle without spawning real agent CLIs, plus small
//! builders for rooms, managers, and throwaway git repositories.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_rooms::agent::{
    AgentCatalog, AgentContext, AgentEvent, AgentEventSink, AgentFactory, AgentOptions,
    AgentSession, AgentStatus, BoxFuture,
};
use agent_rooms::orchestrator::{RoomManager, RoomSettings};
use agent_rooms::room::observers::Observer;
use agent_rooms::room::{Room, RoomEvent, RoomSpec, RoomStatus};
use agent_rooms::worktree::WorktreeManager;
use agent_rooms::{AppError, Result};
use tokio::sync::mpsc;

/// Agent kind the scripted factory is registered under.
pub const FAKE_KIND: &str = "fake";

/// What a scripted session does on `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Stream `thinking`, wait, then reply `echo: <prompt>`.
    Echo { delay: Duration },
    /// Never reply.
    Hang,
    /// Emit an error event and fail the send.
    Fail,
    /// Fail `start`.
    FailStart,
    /// Fail session construction.
    FailCreate,
    /// Never reply; `stop` takes `stop_delay`.
    SlowStop { stop_delay: Duration },
}

/// Factory producing scripted sessions; counts `stop` calls.
pub struct FakeFactory {
    script: Script,
    pub stops: Arc<AtomicUsize>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeFactory {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            stops: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn echo() -> Arc<Self> {
        Self::new(Script::Echo {
            delay: Duration::from_millis(10),
        })
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl AgentFactory for FakeFactory {
    fn create(&self, ctx: AgentContext) -> Result<Arc<dyn AgentSession>> {
        if self.script == Script::FailCreate {
            return Err(AppError::SubprocessFailure("fake agent refused to build".into()));
        }
        Ok(Arc::new(FakeSession {
            kind: ctx.kind,
            script: self.script,
            sink: ctx.sink,
            status: Mutex::new(AgentStatus::Idle),
            stops: Arc::clone(&self.stops),
            prompts: Arc::clone(&self.prompts),
        }))
    }
}

struct FakeSession {
    kind: String,
    script: Script,
    sink: Arc<dyn AgentEventSink>,
    status: Mutex<AgentStatus>,
    stops: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl AgentSession for FakeSession {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn status(&self) -> AgentStatus {
        *self.status.lock().unwrap()
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.script == Script::FailStart {
                return Err(AppError::UnavailableExecutable {
                    agent: self.kind.clone(),
                    hint: "install the fake agent".into(),
                });
            }
            *self.status.lock().unwrap() = AgentStatus::Ready;
            Ok(())
        })
    }

    fn send<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            match self.script {
                Script::Echo { delay } => {
                    self.sink.emit(AgentEvent::Stream {
                        text: "thinking".into(),
                    });
                    tokio::time::sleep(delay).await;
                    Ok(format!("echo: {prompt}"))
                }
                Script::Hang | Script::SlowStop { .. } => std::future::pending().await,
                Script::Fail => {
                    self.sink.emit(AgentEvent::Error {
                        message: "model overloaded".into(),
                    });
                    Err(AppError::Agent("model overloaded".into()))
                }
                Script::FailStart | Script::FailCreate => {
                    Err(AppError::SubprocessFailure("not started".into()))
                }
            }
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Script::SlowStop { stop_delay } = self.script {
                tokio::time::sleep(stop_delay).await;
            }
            self.stops.fetch_add(1, Ordering::SeqCst);
            *self.status.lock().unwrap() = AgentStatus::Stopped;
        })
    }
}

// ── Builders ─────────────────────────────────────────────────

pub fn room_spec(directory: &Path, timeout: Duration) -> RoomSpec {
    RoomSpec {
        id: uuid::Uuid::new_v4().to_string(),
        name: "fake-000000".into(),
        agent_type: FAKE_KIND.into(),
        directory: directory.to_path_buf(),
        branch: None,
        worktree: false,
        request_timeout: timeout,
        history_capacity: 100,
        join_history_limit: 50,
    }
}

/// Build and start a room backed by `factory`.
pub async fn started_room(factory: &dyn AgentFactory, directory: &Path, timeout: Duration) -> Arc<Room> {
    let room = Room::new(room_spec(directory, timeout), factory, AgentOptions::default());
    room.start().await;
    room
}

/// Join `room` with a fresh observer; returns its event receiver.
pub fn observe(room: &Room, id: &str) -> mpsc::UnboundedReceiver<RoomEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    room.join(Observer::new(id, id, tx));
    rx
}

/// Drain every event currently queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll until `room` reaches `status` or two seconds pass.
pub async fn wait_for_status(room: &Room, status: RoomStatus) {
    for _ in 0..200 {
        if room.status() == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room never reached {status:?}, still {:?}", room.status());
}

pub fn settings(worktrees_enabled: bool, timeout: Duration) -> RoomSettings {
    RoomSettings {
        worktrees_enabled,
        request_timeout: timeout,
        history_capacity: 100,
        join_history_limit: 50,
    }
}

/// Manager with the scripted factory registered as [`FAKE_KIND`].
pub fn fake_manager(
    factory: Arc<FakeFactory>,
    worktree_base: &Path,
    settings: RoomSettings,
) -> Arc<RoomManager> {
    let mut catalog = AgentCatalog::new();
    catalog.register(FAKE_KIND, factory);
    Arc::new(RoomManager::new(
        catalog,
        Arc::new(WorktreeManager::new(worktree_base)),
        settings,
    ))
}

// ── Git ──────────────────────────────────────────────────────

pub fn git_available() -> bool {
    which::which("git").is_ok()
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args([
            "-c",
            "user.name=Rooms Test",
            "-c",
            "user.email=rooms@test.invalid",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git runs");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

/// Initialise a repository with one commit at `dir`.
pub fn init_repo(dir: &Path) {
    std::fs::create_dir_all(dir).expect("mkdir repo");
    git(dir, &["init", "-q"]);
    std::fs::write(dir.join("README.md"), "# test\n").expect("write readme");
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
}
