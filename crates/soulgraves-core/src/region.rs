//! Region protection hook.
//!
//! Before a soul's marker is spawned, the engine asks a [`RegionPolicy`]
//! whether spawning is cancelled at that spot. The stock policy reads the
//! `soulgraves-spawning` state flag from the host's region plugin; when the
//! flag cannot be registered the hook degrades to [`AllowAll`].

use std::sync::Arc;

use soulgraves_types::{Location, PlayerId};
use tracing::{info, warn};

/// Name of the region flag that controls soul spawning.
pub const SPAWN_FLAG: &str = "soulgraves-spawning";

/// Value of a state flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// Spawning allowed.
    Allow,
    /// Spawning denied.
    Deny,
}

/// A flag with the same name already exists in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("region flag already registered (state flag: {existing_is_state_flag})")]
pub struct FlagConflict {
    /// Whether the existing flag is a state flag and can be reused.
    pub existing_is_state_flag: bool,
}

/// The host's region flag registry.
pub trait FlagRegistry: Send + Sync {
    /// Register a state flag with a default value.
    ///
    /// # Errors
    ///
    /// Returns [`FlagConflict`] if a flag with this name already exists.
    fn register_state_flag(&self, name: &str, default: FlagState) -> Result<(), FlagConflict>;
}

/// Looks up flag values for a player at a location.
pub trait RegionQuery: Send + Sync {
    /// The effective value of `flag`, or `None` if no region sets it.
    fn query_flag(&self, flag: &str, player: PlayerId, location: &Location) -> Option<FlagState>;
}

/// Pre-spawn veto check.
pub trait RegionPolicy: Send + Sync {
    /// Whether spawning a soul for `player` at `location` is cancelled.
    fn is_spawn_cancelled(&self, player: PlayerId, location: &Location) -> bool;
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RegionPolicy for AllowAll {
    fn is_spawn_cancelled(&self, _player: PlayerId, _location: &Location) -> bool {
        false
    }
}

/// Cancels when the spawn flag resolves to [`FlagState::Deny`].
pub struct FlagPolicy {
    query: Arc<dyn RegionQuery>,
}

impl FlagPolicy {
    /// Wrap a region query.
    pub fn new(query: Arc<dyn RegionQuery>) -> Self {
        Self { query }
    }
}

impl RegionPolicy for FlagPolicy {
    fn is_spawn_cancelled(&self, player: PlayerId, location: &Location) -> bool {
        self.query.query_flag(SPAWN_FLAG, player, location) == Some(FlagState::Deny)
    }
}

/// Register the spawn flag and build the matching policy.
///
/// On a name conflict an existing state flag is reused. Any other conflict
/// disables the hook with a warning and returns [`AllowAll`].
pub fn hook_spawn_flag(
    registry: &dyn FlagRegistry,
    query: Arc<dyn RegionQuery>,
) -> Arc<dyn RegionPolicy> {
    match registry.register_state_flag(SPAWN_FLAG, FlagState::Allow) {
        Ok(()) => {
            info!(flag = SPAWN_FLAG, "region flag registered");
            Arc::new(FlagPolicy::new(query))
        }
        Err(FlagConflict {
            existing_is_state_flag: true,
        }) => {
            info!(flag = SPAWN_FLAG, "reusing existing region state flag");
            Arc::new(FlagPolicy::new(query))
        }
        Err(conflict) => {
            warn!(flag = SPAWN_FLAG, error = %conflict, "region flag unavailable, spawn hook disabled");
            Arc::new(AllowAll)
        }
    }
}
