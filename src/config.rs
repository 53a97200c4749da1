//! Global configuration parsing and validation.
//!
//! Every field carries a serde default so an empty TOML file yields a usable
//! configuration. Agent profiles declared under `[agents.<kind>]` are merged
//! over the built-in `claude`, `codex`, and `gemini` profiles.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::agent::{AgentMode, Dialect};
use crate::{AppError, Result};

/// Worktree isolation settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorktreeConfig {
    /// Allocate a dedicated git worktree per room when the target is a repo.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sandbox directory under which every worktree is created.
    #[serde(default = "default_worktree_base")]
    pub base_dir: PathBuf,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: default_worktree_base(),
        }
    }
}

/// How one agent kind is launched and how its output is read.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentProfile {
    /// Executable name or path.
    pub command: String,
    /// Arguments passed before the prompt (one-shot) or at spawn (interactive).
    #[serde(default)]
    pub args: Vec<String>,
    /// Send strategy.
    #[serde(default)]
    pub mode: AgentMode,
    /// Output vocabulary spoken by the executable.
    #[serde(default)]
    pub dialect: Dialect,
    /// Shown to the user when the executable is missing.
    #[serde(default)]
    pub install_hint: Option<String>,
    /// Extra environment variables for the subprocess.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl AgentProfile {
    /// Install hint, falling back to a generic message.
    #[must_use]
    pub fn install_hint(&self) -> String {
        self.install_hint
            .clone()
            .unwrap_or_else(|| format!("make sure `{}` is installed and on PATH", self.command))
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    7400
}

fn default_ipc_name() -> String {
    "agent-rooms".into()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_history_capacity() -> usize {
    1000
}

fn default_join_history_limit() -> usize {
    100
}

fn default_worktree_base() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".agent-rooms")
        .join("worktrees")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Listen address for the WebSocket gateway.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port for the WebSocket gateway.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether the local IPC socket is served.
    #[serde(default = "default_true")]
    pub ipc_enabled: bool,
    /// Named pipe / Unix socket identifier.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Default per-request timeout applied to new rooms.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Messages retained per room before FIFO eviction.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Messages replayed to an observer on join.
    #[serde(default = "default_join_history_limit")]
    pub join_history_limit: usize,
    /// Worktree isolation settings.
    #[serde(default)]
    pub worktrees: WorktreeConfig,
    /// Agent profiles declared in the file, keyed by agent kind.
    #[serde(default)]
    pub agents: HashMap<String, AgentProfile>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ipc_enabled: true,
            ipc_name: default_ipc_name(),
            request_timeout_seconds: default_request_timeout(),
            history_capacity: default_history_capacity(),
            join_history_limit: default_join_history_limit(),
            worktrees: WorktreeConfig::default(),
            agents: HashMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Default request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Built-in agent profiles overlaid with the ones declared in the file.
    #[must_use]
    pub fn agent_profiles(&self) -> HashMap<String, AgentProfile> {
        let mut profiles = builtin_profiles();
        for (kind, profile) in &self.agents {
            profiles.insert(kind.clone(), profile.clone());
        }
        profiles
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.history_capacity == 0 {
            return Err(AppError::Config(
                "history_capacity must be greater than zero".into(),
            ));
        }

        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        for (kind, profile) in &self.agents {
            if profile.command.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "agents.{kind}.command must not be empty"
                )));
            }
        }

        Ok(())
    }
}

/// Profiles for the agent CLIs supported out of the box.
#[must_use]
pub fn builtin_profiles() -> HashMap<String, AgentProfile> {
    let mut profiles = HashMap::new();

    profiles.insert(
        "claude".to_owned(),
        AgentProfile {
            command: "claude".into(),
            args: vec![
                "-p".into(),
                "--output-format".into(),
                "stream-json".into(),
                "--input-format".into(),
                "stream-json".into(),
                "--verbose".into(),
            ],
            mode: AgentMode::Interactive,
            dialect: Dialect::Claude,
            install_hint: Some("npm install -g @anthropic-ai/claude-code".into()),
            env: HashMap::new(),
        },
    );

    profiles.insert(
        "codex".to_owned(),
        AgentProfile {
            command: "codex".into(),
            args: vec!["exec".into(), "--json".into(), "--skip-git-repo-check".into()],
            mode: AgentMode::OneShot,
            dialect: Dialect::Codex,
            install_hint: Some("npm install -g @openai/codex".into()),
            env: HashMap::new(),
        },
    );

    profiles.insert(
        "gemini".to_owned(),
        AgentProfile {
            command: "gemini".into(),
            args: vec!["--output-format".into(), "json".into(), "-p".into()],
            mode: AgentMode::OneShot,
            dialect: Dialect::Gemini,
            install_hint: Some("npm install -g @google/gemini-cli".into()),
            env: HashMap::new(),
        },
    );

    profiles
}
