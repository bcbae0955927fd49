//! Query facade over local and remote souls.
//!
//! Answers "souls for player X" style questions by merging the engine's
//! published view with rows other nodes own. Local souls shadow any row
//! for the same marker. Mutating requests never touch a soul directly:
//! local ones go through the engine inbox, remote ones go out on the bus
//! together with a soft flag on the row.

use std::collections::BTreeSet;
use std::sync::Arc;

use soulgraves_types::{BusMessage, MarkerId, NodeId, PlayerId, SoulRecord};
use tracing::{debug, warn};

use crate::bus::SoulBus;
use crate::clock::Clock;
use crate::engine::EngineInbox;
use crate::registry::RegistryView;
use crate::soul::Soul;
use crate::store::SoulBackend;
use crate::world::WorldPort;

/// Read and request access to every soul in the cluster.
#[derive(Clone)]
pub struct SoulDirectory {
    node: NodeId,
    view: RegistryView,
    inbox: EngineInbox,
    backend: Arc<dyn SoulBackend>,
    bus: Arc<dyn SoulBus>,
    clock: Arc<dyn Clock>,
    world: Arc<dyn WorldPort>,
}

impl SoulDirectory {
    /// Build a directory. Usually obtained from
    /// [`SoulEngine::directory`](crate::engine::SoulEngine::directory).
    pub fn new(
        node: NodeId,
        view: RegistryView,
        inbox: EngineInbox,
        backend: Arc<dyn SoulBackend>,
        bus: Arc<dyn SoulBus>,
        clock: Arc<dyn Clock>,
        world: Arc<dyn WorldPort>,
    ) -> Self {
        Self {
            node,
            view,
            inbox,
            backend,
            bus,
            clock,
            world,
        }
    }

    /// Every live soul belonging to `owner`, local and remote.
    pub async fn souls_for_owner(&self, owner: PlayerId) -> Vec<Soul> {
        let now = self.clock.now_millis();
        let local = self.view.for_owner(owner).await;
        let remote = self
            .backend
            .list_for_owner_except(owner, &self.node, now)
            .await;
        self.merge(local, remote, now)
    }

    /// Every live soul in the cluster.
    pub async fn all_souls(&self) -> Vec<Soul> {
        let now = self.clock.now_millis();
        let local = self.view.all().await;
        let remote = self.backend.list_all_except(&self.node, now).await;
        self.merge(local, remote, now)
    }

    /// A live soul by marker: the local view first, then storage.
    pub async fn soul_by_marker(&self, marker: MarkerId) -> Option<Soul> {
        let now = self.clock.now_millis();
        if let Some(soul) = self.view.get(marker).await {
            return Self::is_live(&soul, now).then_some(soul);
        }
        let record = self.backend.find_by_marker(marker, now).await?;
        if record.server_id == self.node {
            // Ours, but no longer in the registry: already torn down.
            return None;
        }
        Some(Soul::from_record(record, &self.node, now))
    }

    /// The most recent soul for `owner`, by death time.
    pub async fn newest_for_owner(&self, owner: PlayerId) -> Option<Soul> {
        self.souls_for_owner(owner)
            .await
            .into_iter()
            .max_by_key(Soul::death_time)
    }

    /// Whether a soul handle obtained earlier is still live.
    ///
    /// Local souls are checked against the current view, remote ones
    /// against storage.
    pub async fn is_valid(&self, soul: &Soul, strict: bool) -> bool {
        let now = self.clock.now_millis();
        if soul.is_local() {
            return match self.view.get(soul.marker_id()).await {
                Some(current) => current.is_valid(strict, self.world.as_ref(), now),
                None => false,
            };
        }
        soul.is_valid(strict, self.world.as_ref(), now)
            && self
                .backend
                .find_by_marker(soul.marker_id(), now)
                .await
                .is_some()
    }

    /// Ask the owning node to explode `soul`.
    ///
    /// Returns `false` if the request could not be routed.
    pub async fn explode(&self, soul: &Soul) -> bool {
        let marker_id = soul.marker_id();
        if soul.is_local() {
            return self.inbox.bus(BusMessage::Explode { marker_id });
        }
        if !self.remote_allowed(marker_id) {
            return false;
        }
        self.bus.publish(BusMessage::Explode { marker_id });
        self.backend.mark_expired(marker_id).await;
        true
    }

    /// Ask the owning node to delete `soul`.
    ///
    /// Returns `false` if the request could not be routed.
    pub async fn delete(&self, soul: &Soul) -> bool {
        let marker_id = soul.marker_id();
        if soul.is_local() {
            return self.inbox.bus(BusMessage::Delete { marker_id });
        }
        if !self.remote_allowed(marker_id) {
            return false;
        }
        self.bus.publish(BusMessage::Delete { marker_id });
        self.backend.mark_deleted(marker_id).await;
        true
    }

    /// Push an edited copy of `soul` to its owner.
    ///
    /// Returns `false` if the request could not be routed.
    pub fn sync(&self, soul: &Soul) -> bool {
        let snapshot = soul.to_record();
        if soul.is_local() {
            return self.inbox.bus(BusMessage::Sync { snapshot });
        }
        if !self.remote_allowed(snapshot.marker_id) {
            return false;
        }
        self.bus.publish(BusMessage::Sync { snapshot });
        true
    }

    fn remote_allowed(&self, marker: MarkerId) -> bool {
        if self.backend.shares_cluster() {
            return true;
        }
        warn!(marker_id = %marker, "remote soul request without shared storage, dropped");
        false
    }

    const fn is_live(soul: &Soul, now: i64) -> bool {
        !soul.is_terminal() && !soul.is_expired_at(now)
    }

    fn merge(&self, local: Vec<Soul>, remote: Vec<SoulRecord>, now: i64) -> Vec<Soul> {
        let mut seen: BTreeSet<MarkerId> = local.iter().map(Soul::marker_id).collect();
        let mut merged: Vec<Soul> = local
            .into_iter()
            .filter(|s| Self::is_live(s, now))
            .collect();
        for record in remote {
            if !seen.insert(record.marker_id) {
                debug!(marker_id = %record.marker_id, "remote row shadowed");
                continue;
            }
            merged.push(Soul::from_record(record, &self.node, now));
        }
        merged
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use soulgraves_types::{DeathEvent, Inventory, Location, StoredSoul};

    use super::*;
    use crate::bus::LocalBus;
    use crate::clock::ManualClock;
    use crate::config::SoulsConfig;
    use crate::embedded::EmbeddedBackend;
    use crate::engine::{EngineContext, SoulEngine};
    use crate::memory_backend::MemoryBackend;
    use crate::memory_world::MemoryWorld;
    use crate::region::AllowAll;

    fn record(node: &str, owner: PlayerId, death_time: i64) -> SoulRecord {
        SoulRecord {
            owner_id: owner,
            marker_id: MarkerId::new(),
            server_id: NodeId::new(node),
            location: Location::new("world", 0.0, 64.0, 0.0),
            inventory: Inventory::default(),
            experience: 0,
            death_time,
            expire_time: 600_000,
        }
    }

    fn engine(backend: Arc<dyn SoulBackend>) -> (SoulEngine, Arc<MemoryWorld>) {
        let world = Arc::new(MemoryWorld::with_worlds(["world"]));
        let engine = SoulEngine::new(EngineContext {
            node: NodeId::new("a"),
            souls: SoulsConfig::default(),
            clock: Arc::new(ManualClock::new(1_000)),
            world: world.clone(),
            region: Arc::new(AllowAll),
            backend,
        });
        (engine, world)
    }

    fn death(owner: PlayerId, death_time: i64) -> DeathEvent {
        DeathEvent {
            owner_id: owner,
            marker_id: MarkerId::new(),
            location: Location::new("world", 0.0, 64.0, 0.0),
            inventory: Inventory::default(),
            experience: 0,
            death_time,
        }
    }

    #[tokio::test]
    async fn local_soul_shadows_its_own_stale_row() {
        let backend = MemoryBackend::new();
        let (mut engine, _world) = engine(Arc::new(backend.clone()));
        let owner = PlayerId::new();
        let event = death(owner, 500);
        let marker = event.marker_id;
        engine.on_death(event);
        engine.tick().await;
        engine.flush_persistence().await;

        // A row for the same marker that claims another origin.
        let mut ghost = backend.row(marker).unwrap();
        ghost.record.server_id = NodeId::new("b");
        backend.insert_row(ghost);
        backend.save(&record("b", owner, 100)).await;

        let directory = engine.directory(Arc::new(LocalBus::default()));
        let souls = directory.souls_for_owner(owner).await;
        assert_eq!(souls.len(), 2);
        let markers: BTreeSet<MarkerId> = souls.iter().map(Soul::marker_id).collect();
        assert_eq!(markers.len(), 2);
        assert!(souls.iter().any(|s| s.marker_id() == marker && s.is_local()));
        assert_eq!(directory.all_souls().await.len(), 2);
    }

    #[tokio::test]
    async fn newest_soul_wins() {
        let backend = MemoryBackend::new();
        let (mut engine, _world) = engine(Arc::new(backend.clone()));
        let owner = PlayerId::new();
        engine.on_death(death(owner, 200));
        engine.tick().await;
        let remote = record("b", owner, 900);
        backend.save(&remote).await;

        let directory = engine.directory(Arc::new(LocalBus::default()));
        let newest = directory.newest_for_owner(owner).await.unwrap();
        assert_eq!(newest.marker_id(), remote.marker_id);
        assert!(!newest.is_local());
        assert!(directory.newest_for_owner(PlayerId::new()).await.is_none());
    }

    #[tokio::test]
    async fn soul_by_marker_filters_flagged_and_torn_down_rows() {
        let backend = MemoryBackend::new();
        let (engine, _world) = engine(Arc::new(backend.clone()));
        let live = record("b", PlayerId::new(), 0);
        let flagged = record("b", PlayerId::new(), 0);
        let orphan = record("a", PlayerId::new(), 0);
        backend.save(&live).await;
        backend.insert_row(StoredSoul {
            record: flagged.clone(),
            deleted: true,
        });
        backend.save(&orphan).await;

        let directory = engine.directory(Arc::new(LocalBus::default()));
        assert!(directory.soul_by_marker(live.marker_id).await.is_some());
        assert!(directory.soul_by_marker(flagged.marker_id).await.is_none());
        assert!(directory.soul_by_marker(orphan.marker_id).await.is_none());
    }

    #[tokio::test]
    async fn remote_delete_publishes_and_flags_row() {
        let backend = MemoryBackend::new();
        let (engine, _world) = engine(Arc::new(backend.clone()));
        let bus = LocalBus::default();
        let mut rx = bus.subscribe();
        let row = record("b", PlayerId::new(), 0);
        backend.save(&row).await;

        let directory = engine.directory(Arc::new(bus));
        let soul = directory.soul_by_marker(row.marker_id).await.unwrap();
        assert!(directory.is_valid(&soul, true).await);
        assert!(directory.delete(&soul).await);

        let message = rx.recv().await.unwrap();
        assert_eq!(message, BusMessage::Delete { marker_id: row.marker_id });
        assert_eq!(backend.row(row.marker_id).map(|r| r.deleted), Some(true));
        assert!(!directory.is_valid(&soul, false).await);
    }

    #[tokio::test]
    async fn local_requests_go_through_the_inbox() {
        let backend = MemoryBackend::new();
        let (mut engine, world) = engine(Arc::new(backend.clone()));
        let event = death(PlayerId::new(), 0);
        let marker = event.marker_id;
        engine.on_death(event);
        engine.tick().await;

        let directory = engine.directory(Arc::new(LocalBus::default()));
        let soul = directory.soul_by_marker(marker).await.unwrap();
        assert!(directory.is_valid(&soul, true).await);
        assert!(directory.explode(&soul).await);
        // Nothing happens until the engine ticks.
        assert!(engine.registry().contains(marker));

        engine.tick().await;
        engine.flush_persistence().await;
        assert_eq!(world.drops().len(), 1);
        assert!(!directory.is_valid(&soul, false).await);
        assert!(directory.soul_by_marker(marker).await.is_none());
    }

    #[tokio::test]
    async fn embedded_mode_refuses_remote_requests() {
        let world = Arc::new(MemoryWorld::with_worlds(["world"]));
        let (engine, _world) = engine(Arc::new(EmbeddedBackend::new(world)));
        let directory = engine.directory(Arc::new(LocalBus::default()));
        let remote = Soul::from_record(record("b", PlayerId::new(), 0), &NodeId::new("a"), 0);
        assert!(!directory.delete(&remote).await);
        assert!(!directory.explode(&remote).await);
        assert!(!directory.sync(&remote));
    }
}
