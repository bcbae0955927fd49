//! Core data structs: locations, inventories, soul records, death events.

use serde::{Deserialize, Serialize};

use crate::ids::{MarkerId, NodeId, PlayerId};

/// Width of a world chunk in blocks.
const CHUNK_WIDTH: f64 = 16.0;

/// A position inside a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Name of the world.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Location {
    /// Create a location in `world` at the given coordinates.
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Coordinates truncated toward zero, as stored in the relational schema.
    #[allow(clippy::cast_possible_truncation)]
    pub fn block_coords(&self) -> (i32, i32, i32) {
        (self.x as i32, self.y as i32, self.z as i32)
    }

    /// Packed chunk key: low 32 bits chunk X, high 32 bits chunk Z.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn chunk_key(&self) -> i64 {
        let chunk_x = (self.x / CHUNK_WIDTH).floor() as i32;
        let chunk_z = (self.z / CHUNK_WIDTH).floor() as i32;
        let low = i64::from(chunk_x as u32);
        let high = i64::from(chunk_z as u32).wrapping_shl(32);
        low | high
    }

    /// Squared distance to `other`, or `None` if the worlds differ.
    pub fn distance_squared(&self, other: &Self) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some(dz.mul_add(dz, dx.mul_add(dx, dy * dy)))
    }
}

/// An ordered sequence of item slots captured at death.
///
/// Each slot holds an opaque serialized item description produced by the
/// game host, or `None` for an empty slot. Slot order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory(pub Vec<Option<String>>);

impl Inventory {
    /// Create an inventory from raw slots.
    pub const fn new(slots: Vec<Option<String>>) -> Self {
        Self(slots)
    }

    /// The slots in order.
    pub fn slots(&self) -> &[Option<String>] {
        &self.0
    }

    /// Number of non-empty slots.
    pub fn item_count(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    /// Serialize to the text form stored in the `inventory` column.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    /// Parse the text form stored in the `inventory` column.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `blob` is not a valid slot list.
    pub fn from_blob(blob: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(blob).map(Self)
    }
}

/// The persisted, node-independent view of a soul.
///
/// This is both the storage row payload and the `sync` bus snapshot.
/// Runtime state (`state`, `implosion`, behaviors, `isLocal`) is never
/// part of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoulRecord {
    /// Player who died.
    pub owner_id: PlayerId,
    /// The soul's marker entity.
    pub marker_id: MarkerId,
    /// Node that created the soul.
    pub server_id: NodeId,
    /// Where the soul sits.
    pub location: Location,
    /// Captured item slots.
    pub inventory: Inventory,
    /// Captured experience points.
    pub experience: u32,
    /// Death timestamp, epoch milliseconds.
    pub death_time: i64,
    /// Absolute expiry timestamp, epoch milliseconds.
    pub expire_time: i64,
}

impl SoulRecord {
    /// Whether the record's expiry is at or before `now_ms`.
    pub const fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expire_time <= now_ms
    }
}

/// A record as read back from a backend, with its soft-delete flag.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSoul {
    /// The soul data.
    pub record: SoulRecord,
    /// Whether the row carries the soft-delete flag.
    pub deleted: bool,
}

/// What the death event producer hands over when a player dies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathEvent {
    /// The player who died.
    pub owner_id: PlayerId,
    /// Marker id pre-assigned by the host for the soul's representation.
    pub marker_id: MarkerId,
    /// Death location.
    pub location: Location,
    /// Captured item slots.
    pub inventory: Inventory,
    /// Captured experience points.
    pub experience: u32,
    /// Death timestamp, epoch milliseconds.
    pub death_time: i64,
}
