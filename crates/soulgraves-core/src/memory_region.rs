//! In-process region host used alongside [`MemoryWorld`].
//!
//! Flags are registered by name and set per world, as if each world had a
//! single global region. A flag registered by someone else as a non-state
//! flag reproduces the conflict a real region plugin reports.
//!
//! [`MemoryWorld`]: crate::memory_world::MemoryWorld

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use soulgraves_types::{Location, PlayerId};

use crate::region::{FlagConflict, FlagRegistry, FlagState, RegionQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagKind {
    State,
    Other,
}

#[derive(Debug, Default)]
struct Inner {
    flags: BTreeMap<String, FlagKind>,
    values: BTreeMap<(String, String), FlagState>,
}

/// Headless flag registry and region lookup.
#[derive(Debug, Default)]
pub struct MemoryRegions {
    inner: Mutex<Inner>,
}

impl MemoryRegions {
    /// Create a host with no flags and no regions.
    pub fn new() -> Self {
        Self::default()
    }

    /// A host where `flag` resolves to `Deny` in each of `worlds`.
    pub fn denying<I, S>(flag: &str, worlds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regions = Self::new();
        for world in worlds {
            regions.set_flag(world, flag, FlagState::Deny);
        }
        regions
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `flag` for the whole of `world`.
    pub fn set_flag(&self, world: impl Into<String>, flag: &str, value: FlagState) {
        self.lock()
            .values
            .insert((world.into(), flag.to_owned()), value);
    }

    /// Register `name` as a flag of another kind, as a different plugin
    /// would.
    pub fn claim_foreign_flag(&self, name: &str) {
        self.lock().flags.insert(name.to_owned(), FlagKind::Other);
    }

    /// Whether `name` has been registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().flags.contains_key(name)
    }
}

impl FlagRegistry for MemoryRegions {
    fn register_state_flag(&self, name: &str, _default: FlagState) -> Result<(), FlagConflict> {
        let mut inner = self.lock();
        match inner.flags.get(name) {
            Some(kind) => Err(FlagConflict {
                existing_is_state_flag: *kind == FlagKind::State,
            }),
            None => {
                inner.flags.insert(name.to_owned(), FlagKind::State);
                Ok(())
            }
        }
    }
}

impl RegionQuery for MemoryRegions {
    fn query_flag(&self, flag: &str, _player: PlayerId, location: &Location) -> Option<FlagState> {
        self.lock()
            .values
            .get(&(location.world.clone(), flag.to_owned()))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::region::{SPAWN_FLAG, hook_spawn_flag};

    fn at(world: &str) -> Location {
        Location::new(world, 10.0, 64.0, 10.0)
    }

    #[test]
    fn hook_registers_flag_and_denies_configured_worlds() {
        let regions = Arc::new(MemoryRegions::denying(SPAWN_FLAG, ["arena"]));
        let policy = hook_spawn_flag(regions.as_ref(), regions.clone());

        assert!(regions.is_registered(SPAWN_FLAG));
        assert!(policy.is_spawn_cancelled(PlayerId::new(), &at("arena")));
        assert!(!policy.is_spawn_cancelled(PlayerId::new(), &at("world")));
    }

    #[test]
    fn second_registration_reports_existing_state_flag() {
        let regions = MemoryRegions::new();
        assert!(regions.register_state_flag(SPAWN_FLAG, FlagState::Allow).is_ok());
        assert_eq!(
            regions.register_state_flag(SPAWN_FLAG, FlagState::Allow),
            Err(FlagConflict {
                existing_is_state_flag: true,
            })
        );
    }

    #[test]
    fn foreign_flag_disables_the_hook() {
        let regions = Arc::new(MemoryRegions::denying(SPAWN_FLAG, ["arena"]));
        regions.claim_foreign_flag(SPAWN_FLAG);
        let policy = hook_spawn_flag(regions.as_ref(), regions.clone());
        assert!(!policy.is_spawn_cancelled(PlayerId::new(), &at("arena")));
    }
}
