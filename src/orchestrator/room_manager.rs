//! Room registry: creation, lookup, destruction, statistics.
//!
//! Room creation order matters: the id is allocated first because the
//! worktree is named after it, the worktree (if any) decides the final
//! working directory, and only then is the agent session constructed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agent::{AgentCatalog, AgentOptions};
use crate::config::GlobalConfig;
use crate::room::{Room, RoomSpec, RoomStatus, RoomSummary};
use crate::worktree::{git, WorktreeManager};
use crate::{AppError, Result};

/// Prefix of branches created for rooms that did not request one.
pub const DEFAULT_BRANCH_PREFIX: &str = "agent-rooms";

/// Parameters of `create_room`.
#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    /// Registered agent kind.
    pub agent_type: String,
    /// Target directory.
    pub directory: PathBuf,
    /// Requested branch.
    pub branch: Option<String>,
    /// Client-supplied agent options.
    pub options: AgentOptions,
}

/// Settings applied to every room the manager creates.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Allocate worktrees for rooms over git repositories.
    pub worktrees_enabled: bool,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// History capacity per room.
    pub history_capacity: usize,
    /// Messages replayed on join.
    pub join_history_limit: usize,
}

impl RoomSettings {
    /// Settings taken from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            worktrees_enabled: config.worktrees.enabled,
            request_timeout: config.request_timeout(),
            history_capacity: config.history_capacity,
            join_history_limit: config.join_history_limit,
        }
    }
}

/// Aggregate counters across rooms.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    /// Rooms registered.
    pub total_rooms: usize,
    /// Rooms per status.
    pub initializing: usize,
    /// Rooms per status.
    pub ready: usize,
    /// Rooms per status.
    pub busy: usize,
    /// Rooms per status.
    pub error: usize,
    /// Rooms per status.
    pub stopped: usize,
    /// Observers across all rooms.
    pub observers: usize,
    /// Retained messages across all rooms.
    pub messages: usize,
    /// Worktrees currently tracked.
    pub active_worktrees: usize,
}

/// Default branch for a room that did not request one.
#[must_use]
pub fn default_branch(room_id: &str) -> String {
    let short: String = room_id.chars().take(8).collect();
    format!("{DEFAULT_BRANCH_PREFIX}/{short}")
}

/// Registry of live rooms.
pub struct RoomManager {
    catalog: AgentCatalog,
    worktrees: Arc<WorktreeManager>,
    settings: RoomSettings,
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl RoomManager {
    /// Manager creating sessions from `catalog` and worktrees via `worktrees`.
    #[must_use]
    pub fn new(catalog: AgentCatalog, worktrees: Arc<WorktreeManager>, settings: RoomSettings) -> Self {
        Self {
            catalog,
            worktrees,
            settings,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create, register, and start a room.
    ///
    /// Worktree and in-place checkout failures are logged and fall back to
    /// the requested directory. An agent construction failure yields a room
    /// in `error` status rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown agent kind or a missing
    /// directory.
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<Arc<Room>> {
        let CreateRoomRequest {
            agent_type,
            directory,
            branch,
            options,
        } = request;
        let factory = self.catalog.factory(&agent_type)?;
        if !directory.is_dir() {
            return Err(AppError::NotFound(format!(
                "directory {} does not exist",
                directory.display()
            )));
        }
        let requested_dir = std::fs::canonicalize(&directory)?;

        let id = Uuid::new_v4().to_string();
        let span = info_span!("create_room", room_id = id.as_str(), agent = agent_type.as_str());

        async move {
            let mut directory = requested_dir.clone();
            let mut branch = branch;
            let mut worktree = false;

            let is_repo = git::is_repository(&requested_dir).await;
            if self.settings.worktrees_enabled && is_repo {
                let wanted = branch.clone().unwrap_or_else(|| default_branch(&id));
                match self.worktrees.create_worktree(&requested_dir, &wanted, &id).await {
                    Ok(record) => {
                        directory = record.path;
                        branch = Some(record.branch);
                        worktree = true;
                    }
                    Err(err) => {
                        warn!(%err, "worktree creation failed, using the original directory");
                    }
                }
            } else if let Some(wanted) = &branch {
                if is_repo {
                    if let Err(err) = git::checkout_in_place(&requested_dir, wanted).await {
                        warn!(%err, branch = wanted.as_str(), "in-place checkout failed");
                    }
                } else {
                    warn!(branch = wanted.as_str(), "branch requested for a non-git directory, ignoring");
                    branch = None;
                }
            }

            let short: String = id.chars().take(6).collect();
            let spec = RoomSpec {
                id: id.clone(),
                name: format!("{agent_type}-{short}"),
                agent_type,
                directory,
                branch,
                worktree,
                request_timeout: self.settings.request_timeout,
                history_capacity: self.settings.history_capacity,
                join_history_limit: self.settings.join_history_limit,
            };
            let room = Room::new(spec, factory.as_ref(), options);
            self.rooms().insert(id.clone(), Arc::clone(&room));

            room.start().await;
            info!(
                directory = %room.directory().display(),
                worktree,
                status = ?room.status(),
                "room created"
            );
            Ok(room)
        }
        .instrument(span)
        .await
    }

    /// Close room `id`, release its worktree, and deregister it.
    ///
    /// Worktree cleanup failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown room.
    pub async fn destroy_room(&self, id: &str) -> Result<()> {
        let room = self
            .rooms()
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("room '{id}' not found")))?;

        // The agent is stopped before its working directory is deleted.
        room.close().await;
        if room.has_worktree() {
            if let Err(err) = self.worktrees.remove_worktree(id, true).await {
                warn!(room_id = id, %err, "worktree cleanup failed");
            }
        }
        info!(room_id = id, "room destroyed");
        Ok(())
    }

    /// Destroy every room concurrently, then sweep orphaned worktrees.
    pub async fn destroy_all(&self) {
        let ids: Vec<String> = self.rooms().keys().cloned().collect();
        info!(rooms = ids.len(), "destroying all rooms");
        join_all(ids.iter().map(|id| self.destroy_room(id))).await;

        for (workspace_id, err) in self.worktrees.cleanup_all_worktrees().await {
            warn!(workspace_id = workspace_id.as_str(), %err, "orphaned worktree not removed");
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────────

    /// Room by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms().get(id).cloned()
    }

    /// Room by display name; exact match wins over a case-insensitive one.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Room>> {
        let rooms = self.rooms();
        rooms
            .values()
            .find(|room| room.name() == name)
            .or_else(|| rooms.values().find(|room| room.name().eq_ignore_ascii_case(name)))
            .cloned()
    }

    /// Room by id, falling back to name.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when neither matches.
    pub fn resolve(&self, id_or_name: &str) -> Result<Arc<Room>> {
        self.get(id_or_name)
            .or_else(|| self.find_by_name(id_or_name))
            .ok_or_else(|| AppError::NotFound(format!("room '{id_or_name}' not found")))
    }

    /// Summaries of every room, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<RoomSummary> {
        let rooms: Vec<Arc<Room>> = self.rooms().values().cloned().collect();
        let mut summaries: Vec<RoomSummary> = rooms.iter().map(|room| room.summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Number of registered rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms().len()
    }

    /// Whether no room is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms().is_empty()
    }

    /// Aggregate counters.
    #[must_use]
    pub fn stats(&self) -> RoomStats {
        let rooms: Vec<Arc<Room>> = self.rooms().values().cloned().collect();
        let mut stats = RoomStats {
            total_rooms: rooms.len(),
            active_worktrees: self.worktrees.len(),
            ..RoomStats::default()
        };
        for room in &rooms {
            match room.status() {
                RoomStatus::Initializing => stats.initializing += 1,
                RoomStatus::Ready => stats.ready += 1,
                RoomStatus::Busy => stats.busy += 1,
                RoomStatus::Error => stats.error += 1,
                RoomStatus::Stopped => stats.stopped += 1,
            }
            stats.observers += room.observer_count();
            stats.messages += room.message_count();
        }
        stats
    }

    /// Remove connection `observer_id` from every room; returns how many.
    pub fn detach_observer_everywhere(&self, observer_id: &str) -> usize {
        let rooms: Vec<Arc<Room>> = self.rooms().values().cloned().collect();
        rooms.iter().filter(|room| room.leave(observer_id)).count()
    }

    /// Registered agent kinds.
    #[must_use]
    pub fn agent_kinds(&self) -> Vec<String> {
        self.catalog.kinds()
    }

    /// Worktree manager shared with the rooms.
    #[must_use]
    pub fn worktrees(&self) -> &Arc<WorktreeManager> {
        &self.worktrees
    }
}
