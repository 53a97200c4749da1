//! Thin async runner over the `git` command-line tool.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

/// Captured result of one `git` invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Whether git exited with status 0.
    pub success: bool,
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr.
    pub stderr: String,
}

/// Run `git <args>` in `cwd`.
///
/// # Errors
///
/// Returns [`AppError::Git`] only when git cannot be executed at all; a
/// non-zero exit is reported through [`GitOutput::success`].
pub async fn run(cwd: &Path, args: &[&str]) -> Result<GitOutput> {
    debug!(cwd = %cwd.display(), ?args, "running git");
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| AppError::Git(format!("failed to run git: {err}")))?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    })
}

/// Run `git <args>` and require success.
///
/// # Errors
///
/// Returns [`AppError::Git`] carrying git's stderr on a non-zero exit.
pub async fn run_ok(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = run(cwd, args).await?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(AppError::Git(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            output.stderr
        )))
    }
}

/// Whether `path` is inside a git work tree.
pub async fn is_repository(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    matches!(
        run(path, &["rev-parse", "--is-inside-work-tree"]).await,
        Ok(GitOutput { success: true, ref stdout, .. }) if stdout == "true"
    )
}

/// Top-level directory of the repository containing `path`.
///
/// # Errors
///
/// Returns [`AppError::Git`] when `path` is not inside a repository.
pub async fn toplevel(path: &Path) -> Result<String> {
    run_ok(path, &["rev-parse", "--show-toplevel"]).await
}

/// Whether `refs/heads/<branch>` exists.
pub async fn local_branch_exists(repo: &Path, branch: &str) -> bool {
    let reference = format!("refs/heads/{branch}");
    run(repo, &["show-ref", "--verify", "--quiet", reference.as_str()])
        .await
        .is_ok_and(|out| out.success)
}

/// Whether `refs/remotes/origin/<branch>` exists.
pub async fn remote_branch_exists(repo: &Path, branch: &str) -> bool {
    let reference = format!("refs/remotes/origin/{branch}");
    run(repo, &["show-ref", "--verify", "--quiet", reference.as_str()])
        .await
        .is_ok_and(|out| out.success)
}

/// Check out `branch` in place, creating it from HEAD when it does not exist.
///
/// # Errors
///
/// Returns [`AppError::Git`] when the checkout fails.
pub async fn checkout_in_place(repo: &Path, branch: &str) -> Result<()> {
    if local_branch_exists(repo, branch).await {
        run_ok(repo, &["checkout", branch]).await?;
    } else if remote_branch_exists(repo, branch).await {
        let upstream = format!("origin/{branch}");
        run_ok(repo, &["checkout", "--track", "-b", branch, upstream.as_str()]).await?;
    } else {
        run_ok(repo, &["checkout", "-b", branch]).await?;
    }
    Ok(())
}
