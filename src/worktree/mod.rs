//! Per-room git worktrees under one sandbox base directory.
//!
//! Worktree paths are deterministic: `<base>/<repo name>/<workspace id>`.
//! Removal goes through `git worktree remove` first; direct deletion is a
//! forced fallback gated by [`safety::verify_deletable`].

pub mod git;
pub mod safety;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::{AppError, Result};

/// A worktree owned by one workspace (room).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeRecord {
    /// Owning workspace; equal to the room id.
    pub workspace_id: String,
    /// Absolute worktree path.
    pub path: PathBuf,
    /// Repository the worktree was created from.
    pub repo_path: PathBuf,
    /// Branch checked out in the worktree.
    pub branch: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Creates, tracks, and removes worktrees.
#[derive(Debug)]
pub struct WorktreeManager {
    base_dir: PathBuf,
    records: Mutex<HashMap<String, WorktreeRecord>>,
}

impl WorktreeManager {
    /// Manager rooted at `base_dir`; the directory is created lazily.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, WorktreeRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sandbox base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Deterministic worktree path for `repo_name` / `workspace_id`.
    #[must_use]
    pub fn worktree_path(&self, repo_name: &str, workspace_id: &str) -> PathBuf {
        self.base_dir.join(repo_name).join(workspace_id)
    }

    /// Create (or re-enter) the worktree of `workspace_id` on `branch`.
    ///
    /// The branch is created from the repository's HEAD unless it already
    /// exists locally or on `origin`.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] when `repo_path` is not an existing directory.
    /// - [`AppError::Git`] when it is not a repository or git refuses.
    /// - [`AppError::Io`] when the base directory cannot be created.
    pub async fn create_worktree(&self, repo_path: &Path, branch: &str, workspace_id: &str) -> Result<WorktreeRecord> {
        if !repo_path.is_dir() {
            return Err(AppError::NotFound(format!(
                "repository {} is not a directory",
                repo_path.display()
            )));
        }
        if !git::is_repository(repo_path).await {
            return Err(AppError::Git(format!(
                "{} is not a git repository",
                repo_path.display()
            )));
        }

        let toplevel = PathBuf::from(git::toplevel(repo_path).await?);
        let repo_name = toplevel
            .file_name()
            .map_or_else(|| "repo".to_owned(), |n| n.to_string_lossy().into_owned());
        let path = self.worktree_path(&repo_name, workspace_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let target = path.to_string_lossy().into_owned();

        let output = if git::local_branch_exists(&toplevel, branch).await {
            git::run(&toplevel, &["worktree", "add", target.as_str(), branch]).await?
        } else if git::remote_branch_exists(&toplevel, branch).await {
            let upstream = format!("origin/{branch}");
            git::run(
                &toplevel,
                &["worktree", "add", "--track", "-b", branch, target.as_str(), upstream.as_str()],
            )
            .await?
        } else {
            git::run(&toplevel, &["worktree", "add", "-b", branch, target.as_str()]).await?
        };

        if !output.success {
            if output.stderr.contains("already exists") && path.is_dir() {
                info!(workspace_id, path = %path.display(), "worktree already exists, reusing");
            } else {
                return Err(AppError::Git(format!(
                    "worktree add failed: {}",
                    output.stderr
                )));
            }
        }

        let record = WorktreeRecord {
            workspace_id: workspace_id.to_owned(),
            path,
            repo_path: toplevel,
            branch: branch.to_owned(),
            created_at: Utc::now(),
        };
        info!(
            workspace_id,
            branch,
            path = %record.path.display(),
            "worktree created"
        );
        self.records().insert(workspace_id.to_owned(), record.clone());
        Ok(record)
    }

    /// Remove the worktree of `workspace_id`.
    ///
    /// With `force`, a failed `git worktree remove` falls back to deleting
    /// the directory, but only after every safety check passes.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] for an unknown workspace.
    /// - [`AppError::Git`] when git fails and `force` is not set.
    /// - [`AppError::SafetyViolation`] when a safety check refuses deletion.
    /// - [`AppError::Io`] when direct deletion fails.
    pub async fn remove_worktree(&self, workspace_id: &str, force: bool) -> Result<()> {
        let record = self
            .get(workspace_id)
            .ok_or_else(|| AppError::NotFound(format!("no worktree for workspace '{workspace_id}'")))?;
        let target = record.path.to_string_lossy().into_owned();

        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(target.as_str());

        let output = git::run(&record.repo_path, &args).await;
        let removed = matches!(output, Ok(ref out) if out.success);

        if !removed {
            let reason = match output {
                Ok(out) => out.stderr,
                Err(err) => err.to_string(),
            };
            if !force {
                return Err(AppError::Git(format!("worktree remove failed: {reason}")));
            }
            warn!(workspace_id, reason = reason.as_str(), "git worktree remove failed, deleting directly");
            if record.path.exists() {
                let resolved = safety::verify_deletable(&record.path, &self.base_dir, workspace_id)?;
                tokio::fs::remove_dir_all(&resolved).await?;
            }
        }

        if let Err(err) = git::run_ok(&record.repo_path, &["worktree", "prune"]).await {
            warn!(workspace_id, %err, "worktree prune failed");
        }
        self.records().remove(workspace_id);
        info!(workspace_id, path = %record.path.display(), "worktree removed");
        Ok(())
    }

    /// Force-remove every tracked worktree.
    ///
    /// Never fails; returns the workspaces that could not be cleaned up.
    pub async fn cleanup_all_worktrees(&self) -> Vec<(String, AppError)> {
        let ids: Vec<String> = self.records().keys().cloned().collect();
        let mut errors = Vec::new();
        for id in ids {
            if let Err(err) = self.remove_worktree(&id, true).await {
                warn!(workspace_id = id.as_str(), %err, "worktree cleanup failed");
                errors.push((id, err));
            }
        }
        errors
    }

    /// Record of `workspace_id`.
    #[must_use]
    pub fn get(&self, workspace_id: &str) -> Option<WorktreeRecord> {
        self.records().get(workspace_id).cloned()
    }

    /// All records.
    #[must_use]
    pub fn list(&self) -> Vec<WorktreeRecord> {
        self.records().values().cloned().collect()
    }

    /// Number of tracked worktrees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Whether no worktree is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}
