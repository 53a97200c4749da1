//! Long-lived interactive agent session.
//!
//! One subprocess with piped stdio serves every prompt of the session. Each
//! prompt is written to stdin as a single line; stdout is read by a reader
//! task that translates lines into canonical events and settles the pending
//! send on `Message` / `Error`.
//!
//! # Generations
//!
//! Every spawned process gets a generation number. `stop()` bumps the
//! session generation before terminating, so a reader task observing EOF of
//! a process that was stopped on purpose knows it is stale and stays quiet.
//! Only an EOF of the *current* generation counts as a crash.
//!
//! A stopped or crashed session respawns its process lazily on the next
//! `send`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, info_span, warn, Instrument};

use super::codec::AgentCodec;
use super::dialect::{encode_prompt, Translator};
use super::spawner::{self, StderrTail, TERMINATE_GRACE};
use super::{AgentEvent, AgentEventSink, AgentOptions, AgentSession, AgentStatus, BoxFuture};
use crate::config::AgentProfile;
use crate::{AppError, Result};

type Settle = oneshot::Sender<Result<String>>;

/// Mutable state shared with the reader task. Never held across an await.
struct Shared {
    status: AgentStatus,
    generation: u64,
    pending: Option<Settle>,
}

/// A live subprocess of the current generation.
struct Running {
    generation: u64,
    child: Child,
    stdin: ChildStdin,
    reader: JoinHandle<()>,
}

struct Inner {
    kind: String,
    profile: AgentProfile,
    options: AgentOptions,
    working_dir: PathBuf,
    sink: Arc<dyn AgentEventSink>,
    shared: Mutex<Shared>,
    process: tokio::sync::Mutex<Option<Running>>,
    stderr: StderrTail,
}

/// Interactive agent session backed by one long-lived subprocess.
pub struct InteractiveSession {
    inner: Arc<Inner>,
}

impl InteractiveSession {
    /// Create an unstarted session.
    #[must_use]
    pub fn new(
        kind: String,
        profile: AgentProfile,
        options: AgentOptions,
        working_dir: PathBuf,
        sink: Arc<dyn AgentEventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                profile,
                options,
                working_dir,
                sink,
                shared: Mutex::new(Shared {
                    status: AgentStatus::Idle,
                    generation: 0,
                    pending: None,
                }),
                process: tokio::sync::Mutex::new(None),
                stderr: StderrTail::new(),
            }),
        }
    }

    /// PID of the live subprocess, if one is running.
    pub async fn pid(&self) -> Option<u32> {
        self.inner
            .process
            .lock()
            .await
            .as_ref()
            .and_then(|running| running.child.id())
    }
}

impl Inner {
    fn shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: AgentStatus) {
        self.shared().status = status;
    }

    /// Spawn a process unless one of the current generation is alive.
    async fn ensure_running(self: &Arc<Self>) -> Result<()> {
        let mut process = self.process.lock().await;
        if let Some(running) = process.as_mut() {
            match running.child.try_wait() {
                Ok(None) => return Ok(()),
                _ => {
                    debug!(agent = self.kind.as_str(), "previous agent process gone, respawning");
                    running.reader.abort();
                    *process = None;
                }
            }
        }

        let executable = spawner::resolve_executable(&self.kind, &self.profile)?;
        let args = spawner::build_args(&self.profile, &self.options, None);
        let mut cmd = spawner::build_command(
            &executable,
            &args,
            &self.profile,
            &self.options,
            &self.working_dir,
            true,
        );
        let mut child = spawner::spawn(&mut cmd, &self.kind, &self.profile)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::SubprocessFailure("failed to capture agent stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::SubprocessFailure("failed to capture agent stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            self.stderr.clear();
            self.stderr.drain(self.kind.clone(), stderr);
        }

        let generation = {
            let mut shared = self.shared();
            shared.generation += 1;
            shared.status = AgentStatus::Ready;
            shared.generation
        };

        let span = info_span!("agent_reader", agent = self.kind.as_str(), pid = child.id(), generation);
        let reader = tokio::spawn(
            run_reader(Arc::downgrade(self), generation, stdout, Translator::new(self.profile.dialect))
                .instrument(span),
        );

        *process = Some(Running {
            generation,
            child,
            stdin,
            reader,
        });
        Ok(())
    }

    /// Deliver a translated event, then settle the pending send it closes.
    fn dispatch(&self, event: AgentEvent) {
        let settlement = match &event {
            AgentEvent::Message { text } => Some((AgentStatus::Ready, Ok(text.clone()))),
            AgentEvent::Error { message } => {
                Some((AgentStatus::Ready, Err(AppError::Agent(message.clone()))))
            }
            _ => None,
        };

        self.sink.emit(event);

        if let Some((status, outcome)) = settlement {
            let pending = {
                let mut shared = self.shared();
                let pending = shared.pending.take();
                if pending.is_some() {
                    shared.status = status;
                }
                pending
            };
            match pending {
                Some(tx) => {
                    let _ = tx.send(outcome);
                }
                None => debug!(agent = self.kind.as_str(), "settling event with no pending send"),
            }
        }
    }

    /// Handle EOF on stdout of the process of `generation`.
    async fn on_exit(&self, generation: u64) {
        let code = {
            let mut process = self.process.lock().await;
            match process.as_mut() {
                Some(running) if running.generation == generation => {
                    let code = match tokio::time::timeout(TERMINATE_GRACE, running.child.wait()).await {
                        Ok(Ok(status)) => status.code(),
                        _ => {
                            spawner::terminate(&mut running.child, &self.kind).await;
                            None
                        }
                    };
                    *process = None;
                    code
                }
                _ => return,
            }
        };

        let pending = {
            let mut shared = self.shared();
            if shared.generation != generation {
                return;
            }
            shared.status = AgentStatus::Error;
            shared.pending.take()
        };

        let mut message = code.map_or_else(
            || format!("{} terminated by signal", self.kind),
            |c| format!("{} exited with code {c}", self.kind),
        );
        let tail = self.stderr.contents();
        if !tail.is_empty() {
            message = format!("{message}: {tail}");
        }
        warn!(agent = self.kind.as_str(), exit_code = code, "agent process exited unexpectedly");

        self.sink.emit(AgentEvent::Error {
            message: message.clone(),
        });
        if let Some(tx) = pending {
            let _ = tx.send(Err(AppError::SubprocessFailure(message)));
        }
    }
}

/// Reader task: frame stdout into lines, translate, dispatch.
async fn run_reader(inner: Weak<Inner>, generation: u64, stdout: ChildStdout, mut translator: Translator) {
    let mut framed = FramedRead::new(stdout, AgentCodec::new());

    while let Some(item) = framed.next().await {
        let Some(session) = inner.upgrade() else {
            return;
        };
        match item {
            Ok(line) => {
                for event in translator.translate_line(&line) {
                    session.dispatch(event);
                }
            }
            Err(err) => {
                warn!(%err, "agent reader: stdout read failed");
                break;
            }
        }
    }

    debug!("agent reader: EOF");
    if let Some(session) = inner.upgrade() {
        session.on_exit(generation).await;
    }
}

impl AgentSession for InteractiveSession {
    fn kind(&self) -> &str {
        &self.inner.kind
    }

    fn status(&self) -> AgentStatus {
        self.inner.shared().status
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.inner.ensure_running().await?;
            info!(agent = self.inner.kind.as_str(), "interactive session started");
            Ok(())
        })
    }

    fn send<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let inner = &self.inner;
            {
                let shared = inner.shared();
                if shared.pending.as_ref().is_some_and(|tx| !tx.is_closed()) {
                    return Err(AppError::Busy(format!("{} is already handling a prompt", inner.kind)));
                }
            }

            inner.ensure_running().await?;

            let (tx, rx) = oneshot::channel();
            {
                let mut shared = inner.shared();
                shared.pending = Some(tx);
                shared.status = AgentStatus::Busy;
            }

            let mut line = encode_prompt(inner.profile.dialect, prompt);
            line.push('\n');
            let write = {
                let mut process = inner.process.lock().await;
                match process.as_mut() {
                    Some(running) => {
                        let result = running.stdin.write_all(line.as_bytes()).await;
                        match result {
                            Ok(()) => running.stdin.flush().await,
                            Err(err) => Err(err),
                        }
                    }
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "agent process not running",
                    )),
                }
            };
            if let Err(err) = write {
                warn!(agent = inner.kind.as_str(), %err, "write to agent stdin failed");
                let mut shared = inner.shared();
                shared.pending = None;
                shared.status = AgentStatus::Error;
                return Err(AppError::SubprocessFailure(format!("write to agent failed: {err}")));
            }

            rx.await
                .unwrap_or_else(|_| Err(AppError::SubprocessFailure("agent session closed".into())))
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let inner = &self.inner;
            let pending = {
                let mut shared = inner.shared();
                shared.generation += 1;
                shared.status = AgentStatus::Stopped;
                shared.pending.take()
            };
            if let Some(tx) = pending {
                let _ = tx.send(Err(AppError::Cancelled("agent stopped".into())));
            }

            let running = inner.process.lock().await.take();
            if let Some(mut running) = running {
                if let Err(err) = running.stdin.shutdown().await {
                    debug!(agent = inner.kind.as_str(), %err, "closing agent stdin failed");
                }
                drop(running.stdin);
                spawner::terminate(&mut running.child, &inner.kind).await;
                running.reader.abort();
                info!(agent = inner.kind.as_str(), "interactive session stopped");
            }
        })
    }
}
