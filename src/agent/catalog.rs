//! Agent kind → factory registration map.
//!
//! The catalog is built once at startup and handed to the room manager; there
//! is no global registry of agent constructors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::interactive::InteractiveSession;
use super::oneshot::OneShotSession;
use super::{AgentContext, AgentFactory, AgentMode, AgentSession};
use crate::config::AgentProfile;
use crate::{AppError, Result};

/// Factory producing CLI-backed sessions from an [`AgentProfile`].
#[derive(Debug, Clone)]
pub struct CliAgentFactory {
    profile: AgentProfile,
}

impl CliAgentFactory {
    /// Create a factory for `profile`.
    #[must_use]
    pub fn new(profile: AgentProfile) -> Self {
        Self { profile }
    }

    /// Profile this factory launches.
    #[must_use]
    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }
}

impl AgentFactory for CliAgentFactory {
    fn create(&self, ctx: AgentContext) -> Result<Arc<dyn AgentSession>> {
        if !ctx.working_dir.is_dir() {
            return Err(AppError::NotFound(format!(
                "working directory {} does not exist",
                ctx.working_dir.display()
            )));
        }

        debug!(agent = ctx.kind.as_str(), mode = ?self.profile.mode, "creating agent session");
        let session: Arc<dyn AgentSession> = match self.profile.mode {
            AgentMode::Interactive => Arc::new(InteractiveSession::new(
                ctx.kind,
                self.profile.clone(),
                ctx.options,
                ctx.working_dir,
                ctx.sink,
            )),
            AgentMode::OneShot => Arc::new(OneShotSession::new(
                ctx.kind,
                self.profile.clone(),
                ctx.options,
                ctx.working_dir,
                ctx.sink,
            )),
        };
        Ok(session)
    }
}

/// Registered agent kinds.
#[derive(Clone, Default)]
pub struct AgentCatalog {
    factories: HashMap<String, Arc<dyn AgentFactory>>,
}

impl AgentCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with one [`CliAgentFactory`] per profile.
    #[must_use]
    pub fn from_profiles(profiles: HashMap<String, AgentProfile>) -> Self {
        let mut catalog = Self::new();
        for (kind, profile) in profiles {
            catalog.register(kind, Arc::new(CliAgentFactory::new(profile)));
        }
        catalog
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn AgentFactory>) {
        self.factories.insert(kind.into(), factory);
    }

    /// Factory for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] listing the known kinds when `kind` is
    /// not registered.
    pub fn factory(&self, kind: &str) -> Result<Arc<dyn AgentFactory>> {
        self.factories.get(kind).cloned().ok_or_else(|| {
            AppError::NotFound(format!(
                "unknown agent type '{kind}' (known: {})",
                self.kinds().join(", ")
            ))
        })
    }

    /// Whether `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
