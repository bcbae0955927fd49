//! In-process world used when no game host is attached, and by tests.
//!
//! Implements both [`WorldPort`] and [`ChunkData`] over a single mutex.
//! Everything the engine does to the world is recorded so callers can
//! inspect drops, transfers and marker spawns afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use soulgraves_types::{Inventory, Location, MarkerId, PlayerId, SoulRecord};

use crate::world::{ChunkData, NearbyActor, WorldPort};

/// Contents dropped on the ground by an explosion.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedContents {
    /// Where the contents landed.
    pub location: Location,
    /// Items dropped.
    pub inventory: Inventory,
    /// Experience dropped.
    pub experience: u32,
}

/// Contents handed to a player by a pickup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredContents {
    /// Receiving player.
    pub actor: PlayerId,
    /// Items transferred.
    pub inventory: Inventory,
    /// Experience transferred.
    pub experience: u32,
}

#[derive(Debug, Clone)]
struct PlacedActor {
    player_id: PlayerId,
    location: Location,
    can_interact: bool,
}

#[derive(Debug, Default)]
struct Inner {
    worlds: BTreeSet<String>,
    markers: BTreeMap<MarkerId, Location>,
    spawned: Vec<MarkerId>,
    records: BTreeMap<MarkerId, SoulRecord>,
    tracked: BTreeMap<String, Vec<i64>>,
    actors: Vec<PlacedActor>,
    drops: Vec<DroppedContents>,
    transfers: Vec<TransferredContents>,
}

/// A headless world kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    inner: Mutex<Inner>,
}

impl MemoryWorld {
    /// Create a world host with the given worlds loaded.
    pub fn with_worlds<I, S>(worlds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inner = Inner {
            worlds: worlds.into_iter().map(Into::into).collect(),
            ..Inner::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load a world.
    pub fn add_world(&self, world: impl Into<String>) {
        self.lock().worlds.insert(world.into());
    }

    /// Unload a world.
    pub fn remove_world(&self, world: &str) {
        self.lock().worlds.remove(world);
    }

    /// Put a player at `location`, replacing any earlier placement.
    pub fn place_actor(&self, player_id: PlayerId, location: Location, can_interact: bool) {
        let mut inner = self.lock();
        inner.actors.retain(|a| a.player_id != player_id);
        inner.actors.push(PlacedActor {
            player_id,
            location,
            can_interact,
        });
    }

    /// Remove every placed player.
    pub fn clear_actors(&self) {
        self.lock().actors.clear();
    }

    /// Remove a marker entity behind the engine's back.
    pub fn destroy_marker(&self, marker: MarkerId) {
        self.lock().markers.remove(&marker);
    }

    /// Whether the marker entity currently exists.
    pub fn has_marker(&self, marker: MarkerId) -> bool {
        self.lock().markers.contains_key(&marker)
    }

    /// Every marker ever spawned, in spawn order.
    pub fn spawned_markers(&self) -> Vec<MarkerId> {
        self.lock().spawned.clone()
    }

    /// Every explosion drop so far.
    pub fn drops(&self) -> Vec<DroppedContents> {
        self.lock().drops.clone()
    }

    /// Every pickup transfer so far.
    pub fn transfers(&self) -> Vec<TransferredContents> {
        self.lock().transfers.clone()
    }
}

impl WorldPort for MemoryWorld {
    fn world_exists(&self, world: &str) -> bool {
        self.lock().worlds.contains(world)
    }

    fn marker_exists(&self, marker: MarkerId, location: &Location) -> bool {
        let inner = self.lock();
        inner.worlds.contains(&location.world) && inner.markers.contains_key(&marker)
    }

    fn spawn_marker(&self, marker: MarkerId, location: &Location) {
        let mut inner = self.lock();
        inner.markers.insert(marker, location.clone());
        inner.spawned.push(marker);
    }

    fn remove_marker(&self, marker: MarkerId, _location: &Location) {
        let mut inner = self.lock();
        inner.markers.remove(&marker);
        inner.records.remove(&marker);
    }

    fn nearby_actors(&self, location: &Location, radius: f64) -> Vec<NearbyActor> {
        let limit = radius * radius;
        self.lock()
            .actors
            .iter()
            .filter(|a| {
                a.location
                    .distance_squared(location)
                    .is_some_and(|d| d <= limit)
            })
            .map(|a| NearbyActor {
                player_id: a.player_id,
                can_interact: a.can_interact,
            })
            .collect()
    }

    fn transfer_contents(&self, actor: PlayerId, inventory: &Inventory, experience: u32) {
        self.lock().transfers.push(TransferredContents {
            actor,
            inventory: inventory.clone(),
            experience,
        });
    }

    fn drop_contents(&self, location: &Location, inventory: &Inventory, experience: u32) {
        self.lock().drops.push(DroppedContents {
            location: location.clone(),
            inventory: inventory.clone(),
            experience,
        });
    }
}

impl ChunkData for MemoryWorld {
    fn world_names(&self) -> Vec<String> {
        self.lock().worlds.iter().cloned().collect()
    }

    fn tracked_chunks(&self, world: &str) -> Vec<i64> {
        self.lock().tracked.get(world).cloned().unwrap_or_default()
    }

    fn set_tracked_chunks(&self, world: &str, chunks: Vec<i64>) {
        self.lock().tracked.insert(world.to_owned(), chunks);
    }

    fn markers_in_chunk(&self, world: &str, chunk_key: i64) -> Vec<MarkerId> {
        self.lock()
            .records
            .values()
            .filter(|r| r.location.world == world && r.location.chunk_key() == chunk_key)
            .map(|r| r.marker_id)
            .collect()
    }

    fn read_marker_record(&self, marker: MarkerId) -> Option<SoulRecord> {
        self.lock().records.get(&marker).cloned()
    }

    fn write_marker_record(&self, record: &SoulRecord) {
        self.lock().records.insert(record.marker_id, record.clone());
    }

    fn clear_marker_record(&self, marker: MarkerId) {
        self.lock().records.remove(&marker);
    }
}

#[cfg(test)]
mod tests {
    use soulgraves_types::NodeId;

    use super::*;

    fn record_at(x: f64, z: f64) -> SoulRecord {
        SoulRecord {
            owner_id: PlayerId::new(),
            marker_id: MarkerId::new(),
            server_id: NodeId::new("a"),
            location: Location::new("world", x, 64.0, z),
            inventory: Inventory::default(),
            experience: 0,
            death_time: 0,
            expire_time: 0,
        }
    }

    #[test]
    fn marker_vanishes_with_its_world() {
        let world = MemoryWorld::with_worlds(["world"]);
        let loc = Location::new("world", 0.0, 64.0, 0.0);
        let marker = MarkerId::new();
        world.spawn_marker(marker, &loc);
        assert!(world.marker_exists(marker, &loc));
        world.remove_world("world");
        assert!(!world.marker_exists(marker, &loc));
    }

    #[test]
    fn nearby_actors_respects_radius_and_world() {
        let world = MemoryWorld::with_worlds(["world", "nether"]);
        let near = PlayerId::new();
        let far = PlayerId::new();
        let elsewhere = PlayerId::new();
        world.place_actor(near, Location::new("world", 1.0, 64.0, 0.0), true);
        world.place_actor(far, Location::new("world", 10.0, 64.0, 0.0), true);
        world.place_actor(elsewhere, Location::new("nether", 0.0, 64.0, 0.0), true);

        let found = world.nearby_actors(&Location::new("world", 0.0, 64.0, 0.0), 1.5);
        assert_eq!(found.len(), 1);
        assert_eq!(found.first().map(|a| a.player_id), Some(near));
    }

    #[test]
    fn markers_in_chunk_filters_by_chunk() {
        let world = MemoryWorld::with_worlds(["world"]);
        let a = record_at(1.0, 1.0);
        let b = record_at(2.0, 3.0);
        let c = record_at(40.0, 1.0);
        for r in [&a, &b, &c] {
            world.write_marker_record(r);
        }
        let in_chunk = world.markers_in_chunk("world", a.location.chunk_key());
        assert_eq!(in_chunk.len(), 2);
        assert!(!in_chunk.contains(&c.marker_id));
    }
}
