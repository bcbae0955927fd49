//! Ports to the game host.
//!
//! The engine never touches game entities directly. [`WorldPort`] covers
//! marker entities, nearby players and item hand-off; [`ChunkData`] covers
//! the per-world save data the embedded backend writes into.

use soulgraves_types::{Inventory, Location, MarkerId, PlayerId, SoulRecord, SoulState};

/// A player standing close to a soul.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearbyActor {
    /// The player.
    pub player_id: PlayerId,
    /// Whether the player may interact with the world right now
    /// (alive, not a spectator).
    pub can_interact: bool,
}

/// Entity and player operations against the live world.
pub trait WorldPort: Send + Sync {
    /// Whether a world with this name is loaded.
    fn world_exists(&self, world: &str) -> bool;

    /// Whether the marker entity is still present at `location`.
    fn marker_exists(&self, marker: MarkerId, location: &Location) -> bool;

    /// Spawn the marker entity at `location`.
    fn spawn_marker(&self, marker: MarkerId, location: &Location);

    /// Remove the marker entity. Removing a missing marker is a no-op.
    fn remove_marker(&self, marker: MarkerId, location: &Location);

    /// Players within `radius` of `location`.
    fn nearby_actors(&self, location: &Location, radius: f64) -> Vec<NearbyActor>;

    /// Give the soul's items and experience to `actor`.
    fn transfer_contents(&self, actor: PlayerId, inventory: &Inventory, experience: u32);

    /// Drop the soul's items and experience on the ground at `location`.
    fn drop_contents(&self, location: &Location, inventory: &Inventory, experience: u32);

    /// Refresh the soul's visual. Presentation only.
    fn render(&self, _marker: MarkerId, _location: &Location, _state: SoulState) {}

    /// Emit ambient particles. Presentation only.
    fn emit_particles(&self, _marker: MarkerId, _location: &Location, _state: SoulState) {}

    /// Play the ambient sound. Presentation only.
    fn play_sound(&self, _marker: MarkerId, _location: &Location, _state: SoulState) {}
}

/// Per-world save data used by the embedded backend.
///
/// Each world keeps a list of chunk keys known to contain a soul marker,
/// and each marker carries its own record.
pub trait ChunkData: Send + Sync {
    /// Names of all loaded worlds.
    fn world_names(&self) -> Vec<String>;

    /// Chunk keys tracked for `world`.
    fn tracked_chunks(&self, world: &str) -> Vec<i64>;

    /// Replace the tracked chunk list for `world`.
    fn set_tracked_chunks(&self, world: &str, chunks: Vec<i64>);

    /// Markers in the chunk that carry a soul record.
    fn markers_in_chunk(&self, world: &str, chunk_key: i64) -> Vec<MarkerId>;

    /// The record attached to `marker`, if any.
    fn read_marker_record(&self, marker: MarkerId) -> Option<SoulRecord>;

    /// Attach `record` to its marker, creating the entry if needed.
    fn write_marker_record(&self, record: &SoulRecord);

    /// Detach the record from `marker`.
    fn clear_marker_record(&self, marker: MarkerId);
}
