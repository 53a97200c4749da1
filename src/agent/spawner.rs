//! Agent process spawning and teardown.
//!
//! Every agent subprocess is spawned with:
//! - `kill_on_drop(true)` so a dropped session never leaks a process.
//! - the working directory of its room.
//! - stderr piped into a bounded tail buffer drained by a background task,
//!   so a chatty agent can never block on a full stderr pipe.
//!
//! Teardown follows the same order everywhere: close stdin, send `SIGTERM`,
//! wait up to [`TERMINATE_GRACE`], then force-kill.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::AgentOptions;
use crate::config::AgentProfile;
use crate::{AppError, Result};

/// Grace period between the termination signal and the force-kill.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Number of stderr lines retained per session for diagnostics.
const STDERR_TAIL_LINES: usize = 50;

// ── Executable resolution ────────────────────────────────────────────────────

/// Resolve the profile's command to an absolute executable path.
///
/// # Errors
///
/// Returns [`AppError::UnavailableExecutable`] carrying the profile's install
/// hint when the command is not found.
pub fn resolve_executable(kind: &str, profile: &AgentProfile) -> Result<PathBuf> {
    which::which(&profile.command).map_err(|err| {
        debug!(agent = kind, command = %profile.command, %err, "agent executable not found");
        AppError::UnavailableExecutable {
            agent: kind.to_owned(),
            hint: profile.install_hint(),
        }
    })
}

// ── Command construction ─────────────────────────────────────────────────────

/// Full argument list for one invocation: profile args, then option args,
/// then `--model`, then the trailing prompt when present.
#[must_use]
pub fn build_args(profile: &AgentProfile, options: &AgentOptions, prompt: Option<&str>) -> Vec<String> {
    let mut args = profile.args.clone();
    args.extend(options.args.iter().cloned());
    if let Some(model) = &options.model {
        args.push("--model".to_owned());
        args.push(model.clone());
    }
    if let Some(prompt) = prompt {
        args.push(prompt.to_owned());
    }
    args
}

/// Build a ready-to-spawn command for an agent.
///
/// Stdout and stderr are always piped; stdin is piped only for interactive
/// sessions.
#[must_use]
pub fn build_command(
    executable: &Path,
    args: &[String],
    profile: &AgentProfile,
    options: &AgentOptions,
    working_dir: &Path,
    piped_stdin: bool,
) -> Command {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .envs(&profile.env)
        .envs(&options.env)
        .current_dir(working_dir)
        .stdin(if piped_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn `cmd`, mapping a missing binary to [`AppError::UnavailableExecutable`].
///
/// # Errors
///
/// Returns [`AppError::UnavailableExecutable`] when the OS reports the
/// executable as missing and [`AppError::SubprocessFailure`] for every other
/// spawn failure.
pub fn spawn(cmd: &mut Command, kind: &str, profile: &AgentProfile) -> Result<Child> {
    let child = cmd.spawn().map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::UnavailableExecutable {
                agent: kind.to_owned(),
                hint: profile.install_hint(),
            }
        } else {
            AppError::SubprocessFailure(format!("failed to spawn {kind}: {err}"))
        }
    })?;
    info!(agent = kind, pid = child.id(), "agent process spawned");
    Ok(child)
}

// ── Stderr tail ──────────────────────────────────────────────────────────────

/// Bounded buffer holding the most recent stderr lines of a subprocess.
#[derive(Debug, Clone, Default)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl StderrTail {
    /// Create an empty tail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line, evicting the oldest past the retention limit.
    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Retained lines joined with newlines.
    #[must_use]
    pub fn contents(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Drop every retained line.
    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Spawn a task draining `stderr` into this tail until EOF.
    pub fn drain<R>(&self, kind: String, stderr: R) -> tokio::task::JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        debug!(agent = kind.as_str(), stderr = line.as_str(), "agent stderr");
                        tail.push(line);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!(agent = kind.as_str(), %err, "agent stderr read failed");
                        break;
                    }
                }
            }
        })
    }
}

// ── Teardown ─────────────────────────────────────────────────────────────────

/// Terminate `child`: `SIGTERM`, then force-kill after [`TERMINATE_GRACE`].
///
/// Never fails; a process that already exited is a no-op.
pub async fn terminate(child: &mut Child, kind: &str) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!(agent = kind, %status, "agent process already exited");
        return;
    }

    send_sigterm(child);

    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            info!(agent = kind, %status, "agent process exited");
        }
        Ok(Err(err)) => {
            warn!(agent = kind, %err, "failed to wait for agent process");
        }
        Err(_) => {
            warn!(agent = kind, "agent did not exit within grace period, killing");
            if let Err(err) = child.kill().await {
                debug!(agent = kind, %err, "kill failed; process likely gone");
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, %err, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) {
    // No polite signal off Unix; the grace wait gives stdin EOF time to land.
}
