//! Deletion safety checks for worktree directories.
//!
//! A directory is only ever deleted directly after all three checks pass:
//!
//! 1. [`check_within_base`]: the resolved path is strictly inside the
//!    resolved sandbox base.
//! 2. [`check_not_system_dir`]: the resolved path is not a protected system
//!    location.
//! 3. [`check_contains_workspace_id`]: the path names the workspace.
//!
//! Each check stands alone; [`verify_deletable`] runs every one of them.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::{AppError, Result};

/// Locations that may never themselves be deleted.
const EXACT_DENYLIST: &[&str] = &[
    "/",
    "/home",
    "/Users",
    "/root",
    "/tmp",
    "/var",
    "/private",
    "/private/tmp",
    "/private/var",
    r"C:\",
    r"C:\Users",
];

/// Locations whose whole tree is protected.
const TREE_DENYLIST: &[&str] = &[
    "/usr",
    "/etc",
    "/bin",
    "/sbin",
    "/lib",
    "/lib32",
    "/lib64",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/opt",
    "/System",
    "/Library",
    "/Applications",
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\ProgramData",
];

/// Resolve symlinks, falling back to the path as given when it cannot be
/// resolved (for example a denylist entry absent on this OS).
fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Both the literal and the resolved form of a denylist entry.
fn forms(entry: &Path) -> [PathBuf; 2] {
    [entry.to_path_buf(), resolve(entry)]
}

fn violation(msg: String) -> AppError {
    warn!(reason = msg.as_str(), "worktree deletion refused");
    AppError::SafetyViolation(msg)
}

/// Require `path` to resolve strictly inside `base`.
///
/// Returns the resolved path.
///
/// # Errors
///
/// Returns [`AppError::SafetyViolation`] when either path cannot be resolved,
/// when the path equals the base, or when it lies outside it.
pub fn check_within_base(path: &Path, base: &Path) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(path)
        .map_err(|err| violation(format!("cannot resolve {}: {err}", path.display())))?;
    let resolved_base = std::fs::canonicalize(base)
        .map_err(|err| violation(format!("cannot resolve base {}: {err}", base.display())))?;

    if resolved == resolved_base || !resolved.starts_with(&resolved_base) {
        return Err(violation(format!(
            "{} is not inside the worktree base {}",
            resolved.display(),
            resolved_base.display()
        )));
    }
    Ok(resolved)
}

/// Require `path` to be neither a protected location nor inside a protected
/// tree.
///
/// # Errors
///
/// Returns [`AppError::SafetyViolation`] naming the matching entry.
pub fn check_not_system_dir(path: &Path) -> Result<()> {
    let resolved = resolve(path);

    let mut exact: Vec<PathBuf> = EXACT_DENYLIST.iter().map(PathBuf::from).collect();
    exact.extend(dirs::home_dir());
    exact.push(std::env::temp_dir());

    for entry in &exact {
        for form in forms(entry) {
            if resolved == form || path == form {
                return Err(violation(format!(
                    "{} is a protected system directory",
                    resolved.display()
                )));
            }
        }
    }

    for entry in TREE_DENYLIST {
        for form in forms(Path::new(entry)) {
            if resolved.starts_with(&form) || path.starts_with(&form) {
                return Err(violation(format!(
                    "{} is inside protected system directory {}",
                    resolved.display(),
                    form.display()
                )));
            }
        }
    }
    Ok(())
}

/// Require the path string to contain `workspace_id`.
///
/// # Errors
///
/// Returns [`AppError::SafetyViolation`] when the id is empty or absent.
pub fn check_contains_workspace_id(path: &Path, workspace_id: &str) -> Result<()> {
    if workspace_id.is_empty() || !path.to_string_lossy().contains(workspace_id) {
        return Err(violation(format!(
            "{} does not belong to workspace '{workspace_id}'",
            path.display()
        )));
    }
    Ok(())
}

/// Run every check; returns the resolved path that may be deleted.
///
/// # Errors
///
/// Returns the first [`AppError::SafetyViolation`] encountered.
pub fn verify_deletable(path: &Path, base: &Path, workspace_id: &str) -> Result<PathBuf> {
    let resolved = check_within_base(path, base)?;
    check_not_system_dir(&resolved)?;
    check_contains_workspace_id(&resolved, workspace_id)?;
    Ok(resolved)
}
