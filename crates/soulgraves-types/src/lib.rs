//! Shared type definitions for `SoulGraves`.
//!
//! This crate is the single source of truth for the data that crosses
//! crate and process boundaries: identifiers, storage records, death
//! events, and the cross-node bus protocol.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers for players, markers, and nodes
//! - [`enums`] -- Soul lifecycle state and storage mode
//! - [`structs`] -- Locations, inventories, soul records, death events
//! - [`messages`] -- Bus messages and their subjects

pub mod enums;
pub mod ids;
pub mod messages;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{SoulState, StorageMode};
pub use ids::{MarkerId, NodeId, PlayerId};
pub use messages::{ALL_SUBJECTS, BusMessage, DELETE_SUBJECT, EXPLODE_SUBJECT, SYNC_SUBJECT};
pub use structs::{DeathEvent, Inventory, Location, SoulRecord, StoredSoul};
