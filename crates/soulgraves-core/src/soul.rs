//! The soul entity and its lifecycle state machine.
//!
//! A soul is NORMAL while counting down, PANIC once remaining time drops to
//! the unstable window, and EXPLODING once it starts its destructive end.
//! Deletion is a separate terminal path. Whichever terminal path fires
//! first wins; the other becomes a no-op.

use soulgraves_types::{
    DeathEvent, Inventory, Location, MarkerId, NodeId, PlayerId, SoulRecord, SoulState,
};

use crate::behavior::BehaviorSet;
use crate::config::SoulsConfig;
use crate::world::WorldPort;

/// Whole seconds from `now_ms` until `expire_ms`, rounded up, never negative.
fn seconds_until(expire_ms: i64, now_ms: i64) -> u32 {
    let remaining = u64::try_from(expire_ms.saturating_sub(now_ms)).unwrap_or(0);
    u32::try_from(remaining.div_ceil(1000)).unwrap_or(u32::MAX)
}

/// A player's soul.
#[derive(Debug, Clone, PartialEq)]
pub struct Soul {
    owner_id: PlayerId,
    marker_id: MarkerId,
    location: Location,
    inventory: Inventory,
    experience: u32,
    death_time: i64,
    expire_time: i64,
    time_left: u32,
    server_id: NodeId,
    is_local: bool,
    state: SoulState,
    implosion: bool,
    deleted: bool,
    has_representation: bool,
    behaviors: BehaviorSet,
}

impl Soul {
    /// Build a fresh soul for a death on `node`. Always local.
    pub fn new_for_death(event: DeathEvent, node: &NodeId, souls: &SoulsConfig) -> Self {
        Self {
            owner_id: event.owner_id,
            marker_id: event.marker_id,
            location: event.location,
            inventory: event.inventory,
            experience: event.experience,
            death_time: event.death_time,
            expire_time: event.death_time.saturating_add(souls.lifetime_millis()),
            time_left: souls.lifetime_secs(),
            server_id: node.clone(),
            is_local: true,
            state: SoulState::Normal,
            implosion: false,
            deleted: false,
            has_representation: false,
            behaviors: BehaviorSet::default(),
        }
    }

    /// Rebuild a soul from a stored record as seen from `node`.
    ///
    /// The soul is local iff the record's origin is `node`. Remaining time
    /// is recomputed from the absolute expiry.
    pub fn from_record(record: SoulRecord, node: &NodeId, now_ms: i64) -> Self {
        let is_local = record.server_id == *node;
        Self {
            owner_id: record.owner_id,
            marker_id: record.marker_id,
            location: record.location,
            inventory: record.inventory,
            experience: record.experience,
            death_time: record.death_time,
            expire_time: record.expire_time,
            time_left: seconds_until(record.expire_time, now_ms),
            server_id: record.server_id,
            is_local,
            state: SoulState::Normal,
            implosion: false,
            deleted: false,
            has_representation: is_local,
            behaviors: BehaviorSet::default(),
        }
    }

    /// Player who died.
    pub const fn owner_id(&self) -> PlayerId {
        self.owner_id
    }

    /// The soul's marker.
    pub const fn marker_id(&self) -> MarkerId {
        self.marker_id
    }

    /// Where the soul sits.
    pub const fn location(&self) -> &Location {
        &self.location
    }

    /// Captured items.
    pub const fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Captured experience.
    pub const fn experience(&self) -> u32 {
        self.experience
    }

    /// Death timestamp, epoch milliseconds.
    pub const fn death_time(&self) -> i64 {
        self.death_time
    }

    /// Absolute expiry, epoch milliseconds.
    pub const fn expire_time(&self) -> i64 {
        self.expire_time
    }

    /// Seconds remaining as of the last recompute.
    pub const fn time_left(&self) -> u32 {
        self.time_left
    }

    /// Node that created the soul.
    pub const fn server_id(&self) -> &NodeId {
        &self.server_id
    }

    /// Whether this node owns the soul.
    pub const fn is_local(&self) -> bool {
        self.is_local
    }

    /// Lifecycle state.
    pub const fn state(&self) -> SoulState {
        self.state
    }

    /// Whether the destructive end has begun.
    pub const fn is_imploding(&self) -> bool {
        self.implosion
    }

    /// Whether the soul has been deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Whether teardown of either kind has begun.
    pub const fn is_terminal(&self) -> bool {
        self.implosion || self.deleted
    }

    /// Whether a marker was spawned for this soul.
    pub const fn has_representation(&self) -> bool {
        self.has_representation
    }

    /// The soul's behavior flags.
    pub const fn behaviors(&self) -> &BehaviorSet {
        &self.behaviors
    }

    pub(crate) const fn behaviors_mut(&mut self) -> &mut BehaviorSet {
        &mut self.behaviors
    }

    pub(crate) const fn set_representation(&mut self, present: bool) {
        self.has_representation = present;
    }

    pub(crate) fn set_state(&mut self, state: SoulState) {
        if !self.is_terminal() {
            self.state = state;
        }
    }

    /// Set remaining seconds, clamped to zero, and move the expiry to match.
    pub fn set_time_left(&mut self, secs: i64, now_ms: i64) {
        self.time_left = u32::try_from(secs.max(0)).unwrap_or(u32::MAX);
        self.expire_time = now_ms.saturating_add(i64::from(self.time_left).saturating_mul(1000));
    }

    /// Set the absolute expiry and recompute remaining seconds.
    pub fn set_expire_time(&mut self, expire_ms: i64, now_ms: i64) {
        self.expire_time = expire_ms;
        self.time_left = seconds_until(expire_ms, now_ms);
    }

    /// Recompute remaining seconds from the expiry.
    pub fn refresh_time_left(&mut self, now_ms: i64) {
        self.time_left = seconds_until(self.expire_time, now_ms);
    }

    /// Replace the captured items.
    pub fn set_inventory(&mut self, inventory: Inventory) {
        self.inventory = inventory;
    }

    /// Replace the captured experience.
    pub const fn set_experience(&mut self, experience: u32) {
        self.experience = experience;
    }

    /// Whether the expiry is at or before `now_ms`.
    pub const fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expire_time <= now_ms
    }

    /// Enter EXPLODING. Returns `false` if teardown had already begun.
    pub fn begin_explosion(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = SoulState::Exploding;
        self.implosion = true;
        true
    }

    /// Start deletion and stop all behaviors. Returns `false` if teardown
    /// had already begun.
    pub fn begin_deletion(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.behaviors.stop_all();
        self.deleted = true;
        true
    }

    /// Final step of either terminal path.
    pub(crate) const fn finish_teardown(&mut self) {
        self.behaviors.stop_all();
        self.deleted = true;
    }

    /// Apply a snapshot sent by a non-owning node.
    ///
    /// Only payload and expiry are taken; location and identity stay.
    /// Returns `false` if the soul is already terminal.
    pub fn apply_sync(&mut self, snapshot: &SoulRecord, now_ms: i64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.inventory = snapshot.inventory.clone();
        self.experience = snapshot.experience;
        self.set_expire_time(snapshot.expire_time, now_ms);
        true
    }

    /// Whether the soul is still live.
    ///
    /// Lenient checks cover terminal state and expiry. Strict checks also
    /// confirm the world and, for a local soul with a marker, the marker
    /// entity. A remote copy cannot see the owner's world, so strict and
    /// lenient agree for it.
    pub fn is_valid(&self, strict: bool, world: &dyn WorldPort, now_ms: i64) -> bool {
        if self.is_terminal() || self.is_expired_at(now_ms) {
            return false;
        }
        if !strict || !self.is_local {
            return true;
        }
        world.world_exists(&self.location.world)
            && (!self.has_representation || world.marker_exists(self.marker_id, &self.location))
    }

    /// The persisted view of this soul.
    pub fn to_record(&self) -> SoulRecord {
        SoulRecord {
            owner_id: self.owner_id,
            marker_id: self.marker_id,
            server_id: self.server_id.clone(),
            location: self.location.clone(),
            inventory: self.inventory.clone(),
            experience: self.experience,
            death_time: self.death_time,
            expire_time: self.expire_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_world::MemoryWorld;

    fn death(at: i64) -> DeathEvent {
        DeathEvent {
            owner_id: PlayerId::new(),
            marker_id: MarkerId::new(),
            location: Location::new("world", 5.5, 64.0, -2.0),
            inventory: Inventory::new(vec![Some("bread".to_owned()), None]),
            experience: 30,
            death_time: at,
        }
    }

    fn config() -> SoulsConfig {
        SoulsConfig {
            time_stable: 240,
            time_unstable: 60,
            ..SoulsConfig::default()
        }
    }

    #[test]
    fn new_soul_is_local_with_full_lifetime() {
        let soul = Soul::new_for_death(death(10_000), &NodeId::new("a"), &config());
        assert!(soul.is_local());
        assert_eq!(soul.time_left(), 300);
        assert_eq!(soul.expire_time(), 310_000);
        assert_eq!(soul.state(), SoulState::Normal);
    }

    #[test]
    fn record_origin_decides_locality() {
        let soul = Soul::new_for_death(death(0), &NodeId::new("a"), &config());
        let record = soul.to_record();
        assert!(Soul::from_record(record.clone(), &NodeId::new("a"), 0).is_local());
        assert!(!Soul::from_record(record, &NodeId::new("b"), 0).is_local());
    }

    #[test]
    fn time_left_is_recomputed_on_load() {
        let soul = Soul::new_for_death(death(0), &NodeId::new("a"), &config());
        let loaded = Soul::from_record(soul.to_record(), &NodeId::new("a"), 100_500);
        assert_eq!(loaded.time_left(), 200);
    }

    #[test]
    fn time_left_never_goes_negative() {
        let mut soul = Soul::new_for_death(death(0), &NodeId::new("a"), &config());
        soul.set_time_left(-5, 1_000);
        assert_eq!(soul.time_left(), 0);
        assert_eq!(soul.expire_time(), 1_000);
        soul.set_expire_time(-50_000, 1_000);
        assert_eq!(soul.time_left(), 0);
        soul.set_time_left(7, 1_000);
        assert_eq!(soul.expire_time(), 8_000);
    }

    #[test]
    fn explosion_happens_once_and_blocks_deletion() {
        let mut soul = Soul::new_for_death(death(0), &NodeId::new("a"), &config());
        assert!(soul.begin_explosion());
        assert!(!soul.begin_explosion());
        assert!(!soul.begin_deletion());
        assert_eq!(soul.state(), SoulState::Exploding);
    }

    #[test]
    fn deletion_stops_behaviors_and_blocks_explosion() {
        let mut soul = Soul::new_for_death(death(0), &NodeId::new("a"), &config());
        assert!(soul.behaviors_mut().start(0));
        assert!(soul.begin_deletion());
        assert!(!soul.behaviors().any_running());
        assert!(!soul.begin_deletion());
        assert!(!soul.begin_explosion());
        assert_eq!(soul.state(), SoulState::Normal);
    }

    #[test]
    fn sync_updates_payload_but_not_terminal_souls() {
        let mut soul = Soul::new_for_death(death(0), &NodeId::new("a"), &config());
        let mut snapshot = soul.to_record();
        snapshot.experience = 99;
        snapshot.expire_time = 20_000;
        assert!(soul.apply_sync(&snapshot, 10_000));
        assert_eq!(soul.experience(), 99);
        assert_eq!(soul.time_left(), 10);

        assert!(soul.begin_explosion());
        snapshot.experience = 1;
        assert!(!soul.apply_sync(&snapshot, 10_000));
        assert_eq!(soul.experience(), 99);
    }

    #[test]
    fn validity_checks() {
        let world = MemoryWorld::with_worlds(["world"]);
        let mut soul = Soul::new_for_death(death(0), &NodeId::new("a"), &config());
        world.spawn_marker(soul.marker_id(), soul.location());
        soul.set_representation(true);

        assert!(soul.is_valid(true, &world, 1_000));
        assert!(!soul.is_valid(false, &world, 300_000));

        world.destroy_marker(soul.marker_id());
        assert!(soul.is_valid(false, &world, 1_000));
        assert!(!soul.is_valid(true, &world, 1_000));

        let remote = Soul::from_record(soul.to_record(), &NodeId::new("b"), 1_000);
        assert!(remote.is_valid(true, &world, 1_000));
    }
}
