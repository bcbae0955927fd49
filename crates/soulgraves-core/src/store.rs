//! Persistence backend interface.
//!
//! One trait, two production implementations: the embedded backend
//! (world save data, single node) and the relational backend in
//! `soulgraves-db`. Implementations contain their own errors: a failed
//! operation is logged and yields an empty or no-op result.

use async_trait::async_trait;
use soulgraves_types::{MarkerId, NodeId, PlayerId, SoulRecord, StorageMode, StoredSoul};

/// Durable storage for soul records.
#[async_trait]
pub trait SoulBackend: Send + Sync {
    /// Which storage mode this backend implements.
    fn mode(&self) -> StorageMode;

    /// Whether rows are visible to other nodes, which enables remote
    /// queries, the bus, and reconciliation.
    fn shares_cluster(&self) -> bool {
        self.mode() == StorageMode::Database
    }

    /// Create the schema if missing. Safe to call on every startup.
    async fn prepare(&self);

    /// Every row created by `node`, including soft-deleted and expired ones.
    async fn load_for_node(&self, node: &NodeId) -> Vec<StoredSoul>;

    /// Insert a new row for `record`.
    async fn save(&self, record: &SoulRecord);

    /// Remove the row for `record`.
    async fn delete(&self, record: &SoulRecord);

    /// Overwrite the payload and expiry of an existing row.
    async fn update_snapshot(&self, record: &SoulRecord);

    /// Set the soft-delete flag.
    async fn mark_deleted(&self, _marker: MarkerId) {}

    /// Force the row's expiry into the past.
    async fn mark_expired(&self, _marker: MarkerId) {}

    /// Live rows created by nodes other than `node`.
    async fn list_all_except(&self, _node: &NodeId, _now_ms: i64) -> Vec<SoulRecord> {
        Vec::new()
    }

    /// Live rows for `owner` created by nodes other than `node`.
    async fn list_for_owner_except(
        &self,
        _owner: PlayerId,
        _node: &NodeId,
        _now_ms: i64,
    ) -> Vec<SoulRecord> {
        Vec::new()
    }

    /// A live row by marker, from any node.
    async fn find_by_marker(&self, _marker: MarkerId, _now_ms: i64) -> Option<SoulRecord> {
        None
    }
}
