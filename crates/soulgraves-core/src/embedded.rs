//! Embedded backend: souls tracked in the world's own save data.
//!
//! Each world keeps a list of chunk keys that hold at least one soul
//! marker; each marker carries its record. Nothing is visible to other
//! nodes, so the remote query capabilities keep their empty defaults.

use std::sync::Arc;

use async_trait::async_trait;
use soulgraves_types::{NodeId, SoulRecord, StorageMode, StoredSoul};
use tracing::{debug, warn};

use crate::store::SoulBackend;
use crate::world::ChunkData;

/// Backend over per-world chunk data.
pub struct EmbeddedBackend {
    chunks: Arc<dyn ChunkData>,
}

impl EmbeddedBackend {
    /// Wrap the host's chunk data.
    pub fn new(chunks: Arc<dyn ChunkData>) -> Self {
        Self { chunks }
    }

    fn track_chunk(&self, record: &SoulRecord) {
        let world = &record.location.world;
        let key = record.location.chunk_key();
        let mut chunks = self.chunks.tracked_chunks(world);
        if !chunks.contains(&key) {
            chunks.push(key);
            self.chunks.set_tracked_chunks(world, chunks);
        }
    }
}

#[async_trait]
impl SoulBackend for EmbeddedBackend {
    fn mode(&self) -> StorageMode {
        StorageMode::Embedded
    }

    async fn prepare(&self) {}

    async fn load_for_node(&self, node: &NodeId) -> Vec<StoredSoul> {
        let mut loaded = Vec::new();
        for world in self.chunks.world_names() {
            for chunk in self.chunks.tracked_chunks(&world) {
                for marker in self.chunks.markers_in_chunk(&world, chunk) {
                    let Some(mut record) = self.chunks.read_marker_record(marker) else {
                        warn!(marker_id = %marker, world = %world, "marker in tracked chunk has no record, skipping");
                        continue;
                    };
                    // Everything in this world's save data belongs to this node.
                    record.server_id = node.clone();
                    loaded.push(StoredSoul {
                        record,
                        deleted: false,
                    });
                }
            }
        }
        debug!(count = loaded.len(), "loaded souls from chunk data");
        loaded
    }

    async fn save(&self, record: &SoulRecord) {
        self.chunks.write_marker_record(record);
        self.track_chunk(record);
    }

    async fn delete(&self, record: &SoulRecord) {
        self.chunks.clear_marker_record(record.marker_id);

        let world = &record.location.world;
        let key = record.location.chunk_key();
        let survivors = self
            .chunks
            .markers_in_chunk(world, key)
            .into_iter()
            .any(|m| m != record.marker_id);
        if survivors {
            return;
        }
        let mut chunks = self.chunks.tracked_chunks(world);
        let before = chunks.len();
        chunks.retain(|c| *c != key);
        if chunks.len() != before {
            self.chunks.set_tracked_chunks(world, chunks);
        }
    }

    async fn update_snapshot(&self, record: &SoulRecord) {
        if self.chunks.read_marker_record(record.marker_id).is_some() {
            self.chunks.write_marker_record(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use soulgraves_types::{Inventory, Location, MarkerId, PlayerId};

    use super::*;
    use crate::memory_world::MemoryWorld;

    fn record(x: f64, z: f64) -> SoulRecord {
        SoulRecord {
            owner_id: PlayerId::new(),
            marker_id: MarkerId::new(),
            server_id: NodeId::new("old-name"),
            location: Location::new("world", x, 64.0, z),
            inventory: Inventory::default(),
            experience: 3,
            death_time: 0,
            expire_time: 60_000,
        }
    }

    #[tokio::test]
    async fn chunk_stays_tracked_until_last_soul_leaves() {
        let world = Arc::new(MemoryWorld::with_worlds(["world"]));
        let backend = EmbeddedBackend::new(world.clone());
        let a = record(1.0, 1.0);
        let b = record(3.0, 4.0);
        backend.save(&a).await;
        backend.save(&b).await;
        assert_eq!(world.tracked_chunks("world"), vec![a.location.chunk_key()]);

        backend.delete(&a).await;
        assert_eq!(world.tracked_chunks("world").len(), 1);
        backend.delete(&b).await;
        assert!(world.tracked_chunks("world").is_empty());
    }

    #[tokio::test]
    async fn load_claims_every_soul_for_this_node() {
        let world = Arc::new(MemoryWorld::with_worlds(["world"]));
        let backend = EmbeddedBackend::new(world);
        backend.save(&record(1.0, 1.0)).await;
        backend.save(&record(100.0, -40.0)).await;

        let node = NodeId::new("renamed");
        let loaded = backend.load_for_node(&node).await;
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|s| s.record.server_id == node && !s.deleted));
    }

    #[tokio::test]
    async fn remote_queries_are_empty() {
        let backend = EmbeddedBackend::new(Arc::new(MemoryWorld::with_worlds(["world"])));
        let r = record(0.0, 0.0);
        backend.save(&r).await;
        assert!(!backend.shares_cluster());
        assert!(backend.list_all_except(&NodeId::new("x"), 0).await.is_empty());
        assert!(backend.find_by_marker(r.marker_id, 0).await.is_none());
    }

    #[tokio::test]
    async fn snapshot_update_rewrites_existing_record_only() {
        let world = Arc::new(MemoryWorld::with_worlds(["world"]));
        let backend = EmbeddedBackend::new(world.clone());
        let mut r = record(0.0, 0.0);
        backend.update_snapshot(&r).await;
        assert!(world.read_marker_record(r.marker_id).is_none());

        backend.save(&r).await;
        r.experience = 77;
        backend.update_snapshot(&r).await;
        assert_eq!(world.read_marker_record(r.marker_id).map(|x| x.experience), Some(77));
    }
}
