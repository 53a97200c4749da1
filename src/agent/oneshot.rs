//! Spawn-per-call agent session.
//!
//! Each `send` runs the agent executable once with the prompt as the final
//! argument and no stdin. Stdout lines are translated and forwarded as they
//! arrive; when the process exits, the reply is the last result-like field
//! found in a JSON line, or the raw captured output when no line had one.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use super::codec::AgentCodec;
use super::dialect::{result_field, Translator};
use super::spawner::{self, StderrTail};
use super::{AgentEvent, AgentEventSink, AgentOptions, AgentSession, AgentStatus, BoxFuture};
use crate::config::AgentProfile;
use crate::{AppError, Result};

/// What one finished invocation produced.
#[derive(Debug, Default)]
struct Capture {
    raw: String,
    reply: Option<String>,
    agent_error: Option<String>,
}

/// One-shot agent session: no process exists between calls.
pub struct OneShotSession {
    kind: String,
    profile: AgentProfile,
    options: AgentOptions,
    working_dir: PathBuf,
    sink: Arc<dyn AgentEventSink>,
    status: Mutex<AgentStatus>,
    child: tokio::sync::Mutex<Option<tokio::process::Child>>,
}

impl OneShotSession {
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
            kind,
            profile,
            options,
            working_dir,
            sink,
            status: Mutex::new(AgentStatus::Idle),
            child: tokio::sync::Mutex::new(None),
        }
    }

    fn set_status(&self, status: AgentStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    async fn run(&self, prompt: &str) -> Result<String> {
        let executable = spawner::resolve_executable(&self.kind, &self.profile)?;
        let args = spawner::build_args(&self.profile, &self.options, Some(prompt));
        let mut cmd = spawner::build_command(
            &executable,
            &args,
            &self.profile,
            &self.options,
            &self.working_dir,
            false,
        );
        let mut child = spawner::spawn(&mut cmd, &self.kind, &self.profile)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::SubprocessFailure("failed to capture agent stdout".into()))?;
        let stderr = StderrTail::new();
        let drain = child
            .stderr
            .take()
            .map(|pipe| stderr.drain(self.kind.clone(), pipe));

        // Parked so `stop()` can reach the process while it runs.
        *self.child.lock().await = Some(child);

        let capture = self.read_output(stdout).await;

        let status = {
            let mut slot = self.child.lock().await;
            match slot.take() {
                Some(mut child) => child.wait().await.ok(),
                // Taken by `stop()`.
                None => return Err(AppError::Cancelled(format!("{} was stopped", self.kind))),
            }
        };
        if let Some(drain) = drain {
            let _ = drain.await;
        }

        let code = status.and_then(|s| s.code());
        debug!(agent = self.kind.as_str(), exit_code = code, "one-shot invocation finished");

        if let Some(message) = capture.agent_error {
            return Err(AppError::Agent(message));
        }

        let output = capture.raw.trim().to_owned();
        if code == Some(0) || !output.is_empty() {
            return Ok(capture.reply.unwrap_or(output));
        }

        let errors = stderr.contents();
        let message = if errors.trim().is_empty() {
            code.map_or_else(
                || format!("{} terminated by signal", self.kind),
                |c| format!("{} exited with code {c}", self.kind),
            )
        } else {
            errors.trim().to_owned()
        };
        self.sink.emit(AgentEvent::Error {
            message: message.clone(),
        });
        Err(AppError::SubprocessFailure(message))
    }

    async fn read_output(&self, stdout: tokio::process::ChildStdout) -> Capture {
        let mut capture = Capture::default();
        let mut translator = Translator::new(self.profile.dialect);
        let mut framed = FramedRead::new(stdout, AgentCodec::new());

        while let Some(item) = framed.next().await {
            let line = match item {
                Ok(line) => line,
                Err(err) => {
                    warn!(agent = self.kind.as_str(), %err, "stdout read failed");
                    break;
                }
            };

            capture.raw.push_str(&line);
            capture.raw.push('\n');

            if let Ok(value) = serde_json::from_str::<serde_json::Value>(line.trim()) {
                if let Some(reply) = result_field(&value) {
                    capture.reply = Some(reply);
                }
            }

            for event in translator.translate_line(&line) {
                match &event {
                    // The reply is settled on exit, not by the record.
                    AgentEvent::Message { text } => {
                        capture.reply = Some(text.clone());
                        continue;
                    }
                    AgentEvent::Error { message } => {
                        capture.agent_error = Some(message.clone());
                    }
                    _ => {}
                }
                self.sink.emit(event);
            }
        }
        capture
    }
}

impl AgentSession for OneShotSession {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn status(&self) -> AgentStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            spawner::resolve_executable(&self.kind, &self.profile)?;
            self.set_status(AgentStatus::Ready);
            info!(agent = self.kind.as_str(), "one-shot session ready");
            Ok(())
        })
    }

    fn send<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            {
                let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
                if *status == AgentStatus::Busy {
                    return Err(AppError::Busy(format!("{} is already handling a prompt", self.kind)));
                }
                *status = AgentStatus::Busy;
            }

            let result = self.run(prompt).await;
            self.set_status(match &result {
                Ok(_) | Err(AppError::Cancelled(_)) => AgentStatus::Ready,
                Err(_) => AgentStatus::Error,
            });
            result
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let child = self.child.lock().await.take();
            if let Some(mut child) = child {
                spawner::terminate(&mut child, &self.kind).await;
                info!(agent = self.kind.as_str(), "one-shot invocation stopped");
            }
            self.set_status(AgentStatus::Ready);
        })
    }
}
