//! The soul engine: the single writer of the registry.
//!
//! All mutation of soul state happens inside [`SoulEngine::tick`]. Other
//! tasks (bus subscribers, death intake, the directory) talk to the engine
//! through its [`EngineInbox`], which is drained at the start of each tick.
//! Storage operations go through a [`StorageWriter`] and are never awaited
//! by the tick; in-memory state is the source of truth and storage lags
//! behind, but a soul's writes always land in the order they were issued.
//!
//! # Tick order
//!
//! 1. Drain the inbox (deaths, bus messages, reconciliation results)
//! 2. Run every due behavior for every soul
//! 3. Detonate souls that entered EXPLODING
//! 4. Queue a reconciliation read if one is due
//! 5. Publish the registry view

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use soulgraves_types::{BusMessage, DeathEvent, MarkerId, NodeId, PlayerId, SoulRecord, StoredSoul};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::behavior::{Behavior, BehaviorContext, Outcome};
use crate::bus::SoulBus;
use crate::clock::Clock;
use crate::config::SoulsConfig;
use crate::directory::SoulDirectory;
use crate::region::RegionPolicy;
use crate::registry::{RegistryView, SoulRegistry};
use crate::soul::Soul;
use crate::store::SoulBackend;
use crate::world::WorldPort;
use crate::writer::StorageWriter;

/// Work handed to the tick loop from other tasks.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A player died on this node.
    Death(DeathEvent),
    /// A bus message, or a local request shaped like one.
    Bus(BusMessage),
    /// Fresh rows for this node from a reconciliation read.
    Reconciled(Vec<StoredSoul>),
}

/// Sending half of the engine's inbox.
#[derive(Debug, Clone)]
pub struct EngineInbox {
    sender: mpsc::UnboundedSender<Inbound>,
}

impl EngineInbox {
    /// Queue a death. Returns `false` if the engine is gone.
    pub fn death(&self, event: DeathEvent) -> bool {
        self.send(Inbound::Death(event))
    }

    /// Queue a bus message. Returns `false` if the engine is gone.
    pub fn bus(&self, message: BusMessage) -> bool {
        self.send(Inbound::Bus(message))
    }

    fn send(&self, inbound: Inbound) -> bool {
        self.sender.send(inbound).is_ok()
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick number.
    pub tick: u64,
    /// Inbox items handled.
    pub inbound: usize,
    /// Souls that dropped their contents.
    pub exploded: usize,
    /// Souls deleted without a drop, pickups excluded.
    pub deleted: usize,
    /// Souls collected by a player.
    pub picked_up: usize,
    /// Souls owned after the tick.
    pub souls: usize,
}

/// Everything the engine needs from the outside.
pub struct EngineContext {
    /// This node's id.
    pub node: NodeId,
    /// Soul settings.
    pub souls: SoulsConfig,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// The live world.
    pub world: Arc<dyn WorldPort>,
    /// Pre-spawn veto.
    pub region: Arc<dyn RegionPolicy>,
    /// Durable storage.
    pub backend: Arc<dyn SoulBackend>,
}

enum Action {
    Delete,
    Pickup(PlayerId),
}

/// Owns the registry and drives every local soul.
pub struct SoulEngine {
    node: NodeId,
    souls: SoulsConfig,
    clock: Arc<dyn Clock>,
    world: Arc<dyn WorldPort>,
    region: Arc<dyn RegionPolicy>,
    backend: Arc<dyn SoulBackend>,
    registry: SoulRegistry,
    view: RegistryView,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    writer: StorageWriter,
    tick: u64,
    reconcile_in_flight: bool,
}

impl SoulEngine {
    /// Create an engine with an empty registry.
    pub fn new(ctx: EngineContext) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            node: ctx.node,
            souls: ctx.souls,
            clock: ctx.clock,
            world: ctx.world,
            region: ctx.region,
            writer: StorageWriter::new(Arc::clone(&ctx.backend)),
            backend: ctx.backend,
            registry: SoulRegistry::new(),
            view: RegistryView::new(),
            inbox_tx,
            inbox_rx,
            tick: 0,
            reconcile_in_flight: false,
        }
    }

    /// This node's id.
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// Number of the next tick to run.
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// The live registry. Only the engine mutates it.
    pub const fn registry(&self) -> &SoulRegistry {
        &self.registry
    }

    /// A handle to the published registry snapshot.
    pub fn view(&self) -> RegistryView {
        self.view.clone()
    }

    /// A handle for queuing work onto the tick loop.
    pub fn inbox(&self) -> EngineInbox {
        EngineInbox {
            sender: self.inbox_tx.clone(),
        }
    }

    /// A query facade bound to this engine.
    pub fn directory(&self, bus: Arc<dyn SoulBus>) -> SoulDirectory {
        SoulDirectory::new(
            self.node.clone(),
            self.view(),
            self.inbox(),
            Arc::clone(&self.backend),
            bus,
            Arc::clone(&self.clock),
            Arc::clone(&self.world),
        )
    }

    /// Prepare the schema and repopulate the registry from storage.
    ///
    /// Soft-deleted rows are torn down without spawning anything. Expired
    /// rows explode right away. Everything else starts its behaviors.
    /// Returns the number of souls left running.
    pub async fn load_from_backend(&mut self) -> usize {
        self.backend.prepare().await;
        let rows = self.backend.load_for_node(&self.node).await;
        let now = self.clock.now_millis();
        let total = rows.len();

        for row in rows {
            self.admit_stored(row, now);
        }
        let exploded = self.detonate_pending();
        self.view.publish(&self.registry).await;

        let running = self.registry.len();
        info!(
            node = %self.node,
            rows = total,
            exploded,
            running,
            "souls loaded from storage"
        );
        running
    }

    fn admit_stored(&mut self, row: StoredSoul, now: i64) {
        let mut soul = Soul::from_record(row.record, &self.node, now);
        let marker = soul.marker_id();
        if !soul.is_local() {
            warn!(marker_id = %marker, origin = %soul.server_id(), "row from another node, skipping");
            return;
        }
        if self.registry.contains(marker) {
            debug!(marker_id = %marker, "soul already registered, skipping row");
            return;
        }
        if row.deleted {
            info!(marker_id = %marker, "soft-deleted soul loaded, removing");
            soul.begin_deletion();
            self.teardown(soul);
            return;
        }
        if soul.is_expired_at(now) {
            info!(marker_id = %marker, "expired soul loaded, exploding");
            soul.begin_explosion();
        } else {
            soul.behaviors_mut().start(self.tick);
        }
        self.registry.insert(soul);
    }

    /// Create a soul for a death on this node.
    ///
    /// The region policy may cancel the marker spawn; the soul is then
    /// still tracked and counts down, but has no marker and no row.
    /// Returns `false` if the marker is already registered.
    pub fn on_death(&mut self, event: DeathEvent) -> bool {
        if self.registry.contains(event.marker_id) {
            warn!(marker_id = %event.marker_id, "duplicate death event ignored");
            return false;
        }
        let mut soul = Soul::new_for_death(event, &self.node, &self.souls);
        let marker = soul.marker_id();

        let cancelled = self
            .region
            .is_spawn_cancelled(soul.owner_id(), soul.location());
        if cancelled {
            info!(marker_id = %marker, owner = %soul.owner_id(), "region denied soul spawn, tracking without marker");
        } else {
            self.world.spawn_marker(marker, soul.location());
            soul.set_representation(true);
        }
        soul.behaviors_mut().start(self.tick);

        let record = (!cancelled).then(|| soul.to_record());
        info!(
            marker_id = %marker,
            owner = %soul.owner_id(),
            items = soul.inventory().item_count(),
            experience = soul.experience(),
            time_left = soul.time_left(),
            "soul created"
        );
        self.registry.insert(soul);

        if let Some(record) = record {
            self.persist(move |backend| async move { backend.save(&record).await });
        }
        true
    }

    /// Run one tick.
    pub async fn tick(&mut self) -> TickSummary {
        let tick = self.tick;
        let now = self.clock.now_millis();
        let mut summary = TickSummary {
            tick,
            ..TickSummary::default()
        };

        // --- Inbox ---
        while let Ok(inbound) = self.inbox_rx.try_recv() {
            summary.inbound = summary.inbound.saturating_add(1);
            self.handle_inbound(inbound, now, &mut summary);
        }

        // --- Behaviors ---
        let actions = self.run_behaviors(tick, now);
        for (marker, action) in actions {
            match action {
                Action::Delete => {
                    if self.delete_local(marker) {
                        summary.deleted = summary.deleted.saturating_add(1);
                    }
                }
                Action::Pickup(actor) => {
                    if self.pickup_local(marker, actor) {
                        summary.picked_up = summary.picked_up.saturating_add(1);
                    }
                }
            }
        }

        // --- Detonation ---
        summary.exploded = summary.exploded.saturating_add(self.detonate_pending());

        // --- Storage ---
        self.maybe_reconcile(tick);

        self.view.publish(&self.registry).await;
        summary.souls = self.registry.len();
        self.tick = tick.saturating_add(1);
        summary
    }

    fn handle_inbound(&mut self, inbound: Inbound, now: i64, summary: &mut TickSummary) {
        match inbound {
            Inbound::Death(event) => {
                self.on_death(event);
            }
            Inbound::Bus(message) => {
                let marker = message.marker_id();
                if !self.registry.contains(marker) {
                    debug!(marker_id = %marker, subject = message.subject(), "soul not owned here, ignoring");
                    return;
                }
                match message {
                    BusMessage::Explode { .. } => {
                        self.explode_local(marker);
                    }
                    BusMessage::Delete { .. } => {
                        if self.delete_local(marker) {
                            summary.deleted = summary.deleted.saturating_add(1);
                        }
                    }
                    BusMessage::Sync { snapshot } => self.sync_local(&snapshot, now),
                }
            }
            Inbound::Reconciled(rows) => {
                self.reconcile_in_flight = false;
                for row in rows {
                    let marker = row.record.marker_id;
                    if !self.registry.contains(marker) {
                        continue;
                    }
                    if row.deleted {
                        info!(marker_id = %marker, "row flagged deleted, converging");
                        if self.delete_local(marker) {
                            summary.deleted = summary.deleted.saturating_add(1);
                        }
                    } else if row.record.is_expired_at(now) {
                        info!(marker_id = %marker, "row flagged expired, converging");
                        self.explode_local(marker);
                    }
                }
            }
        }
    }

    fn run_behaviors(&mut self, tick: u64, now: i64) -> Vec<(MarkerId, Action)> {
        let ctx = BehaviorContext {
            world: self.world.as_ref(),
            souls: &self.souls,
            now_ms: now,
        };
        let mut actions = Vec::new();

        for soul in self.registry.iter_shared_mut() {
            for behavior in Behavior::ALL {
                if !soul.behaviors().is_due(behavior, tick) {
                    continue;
                }
                // Souls are shared with the published view; copy only on write.
                let outcome = if behavior.mutates() {
                    behavior.run(Arc::make_mut(soul), &ctx)
                } else {
                    behavior.observe(soul.as_ref(), &ctx)
                };
                match outcome {
                    Outcome::Continue => {}
                    Outcome::Explode => {
                        if Arc::make_mut(soul).begin_explosion() {
                            info!(marker_id = %soul.marker_id(), %behavior, "soul exploding");
                        }
                    }
                    Outcome::Delete => {
                        debug!(marker_id = %soul.marker_id(), %behavior, "soul invalid, deleting");
                        actions.push((soul.marker_id(), Action::Delete));
                        break;
                    }
                    Outcome::Pickup(actor) => {
                        actions.push((soul.marker_id(), Action::Pickup(actor)));
                        break;
                    }
                }
            }
        }
        actions
    }

    fn explode_local(&mut self, marker: MarkerId) -> bool {
        let Some(soul) = self.registry.get_mut(marker) else {
            return false;
        };
        if !soul.begin_explosion() {
            debug!(marker_id = %marker, "explode ignored, soul already terminal");
            return false;
        }
        info!(marker_id = %marker, "soul exploding on request");
        true
    }

    fn delete_local(&mut self, marker: MarkerId) -> bool {
        let Some(soul) = self.registry.get_mut(marker) else {
            return false;
        };
        if !soul.begin_deletion() {
            debug!(marker_id = %marker, "delete ignored, soul already terminal");
            return false;
        }
        if let Some(soul) = self.registry.remove(marker) {
            info!(marker_id = %marker, "soul deleted");
            self.teardown(soul);
        }
        true
    }

    fn pickup_local(&mut self, marker: MarkerId, actor: PlayerId) -> bool {
        let Some(soul) = self.registry.get_mut(marker) else {
            return false;
        };
        if !soul.begin_deletion() {
            return false;
        }
        if let Some(soul) = self.registry.remove(marker) {
            self.world
                .transfer_contents(actor, soul.inventory(), soul.experience());
            info!(marker_id = %marker, actor = %actor, owner = %soul.owner_id(), "soul collected");
            self.teardown(soul);
        }
        true
    }

    fn sync_local(&mut self, snapshot: &SoulRecord, now: i64) {
        let Some(soul) = self.registry.get_mut(snapshot.marker_id) else {
            return;
        };
        if !soul.apply_sync(snapshot, now) {
            debug!(marker_id = %snapshot.marker_id, "sync ignored, soul already terminal");
            return;
        }
        let record = soul.to_record();
        debug!(marker_id = %record.marker_id, time_left = soul.time_left(), "soul synced");
        self.persist(move |backend| async move { backend.update_snapshot(&record).await });
    }

    /// Drop contents and tear down every exploding soul. Each soul leaves
    /// the registry here, so its contents drop exactly once.
    fn detonate_pending(&mut self) -> usize {
        let markers: Vec<MarkerId> = self
            .registry
            .iter()
            .filter(|s| s.is_imploding() && !s.is_deleted())
            .map(Soul::marker_id)
            .collect();

        let mut detonated = 0_usize;
        for marker in markers {
            let Some(soul) = self.registry.remove(marker) else {
                continue;
            };
            self.world
                .drop_contents(soul.location(), soul.inventory(), soul.experience());
            info!(
                marker_id = %marker,
                items = soul.inventory().item_count(),
                experience = soul.experience(),
                "soul exploded"
            );
            self.teardown(soul);
            detonated = detonated.saturating_add(1);
        }
        detonated
    }

    /// Stop behaviors, remove the marker, and queue the row delete behind
    /// any earlier write for it. The soul must already be out of the
    /// registry.
    fn teardown(&mut self, mut soul: Soul) {
        soul.finish_teardown();
        self.world.remove_marker(soul.marker_id(), soul.location());
        let record = soul.to_record();
        self.persist(move |backend| async move { backend.delete(&record).await });
    }

    fn persist<F, Fut>(&mut self, op: F)
    where
        F: FnOnce(Arc<dyn SoulBackend>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.writer.submit(op);
    }

    fn maybe_reconcile(&mut self, tick: u64) {
        let interval = self.souls.reconcile_interval_ticks;
        if interval == 0
            || tick == 0
            || self.reconcile_in_flight
            || !self.backend.shares_cluster()
            || tick.checked_rem(interval) != Some(0)
        {
            return;
        }
        self.reconcile_in_flight = true;
        let node = self.node.clone();
        let inbox = self.inbox();
        debug!(tick, "reconciling against storage");
        self.persist(move |backend| async move {
            let rows = backend.load_for_node(&node).await;
            if !inbox.send(Inbound::Reconciled(rows)) {
                debug!("engine gone before reconciliation finished");
            }
        });
    }

    /// Wait for every storage operation queued so far.
    pub async fn flush_persistence(&mut self) {
        self.writer.flush().await;
        debug!(submitted = self.writer.submitted(), "storage flushed");
    }

    /// Tick on the configured interval until `shutdown` resolves, then
    /// flush storage. Returns the number of ticks run.
    pub async fn run_until<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(Duration::from_millis(self.souls.tick_interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            node = %self.node,
            tick_interval_ms = self.souls.tick_interval_ms,
            souls = self.registry.len(),
            "tick loop starting"
        );

        let started = self.tick;
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested, stopping tick loop");
                    break;
                }
                _ = interval.tick() => {
                    let summary = self.tick().await;
                    if summary.exploded > 0 || summary.deleted > 0 || summary.picked_up > 0 {
                        debug!(
                            tick = summary.tick,
                            exploded = summary.exploded,
                            deleted = summary.deleted,
                            picked_up = summary.picked_up,
                            souls = summary.souls,
                            "tick"
                        );
                    }
                }
            }
        }

        self.flush_persistence().await;
        self.tick.saturating_sub(started)
    }
}
