//! In-memory relational backend.
//!
//! Behaves like the shared database: rows from every node in one table,
//! soft-delete and soft-expire flags, filtered remote queries. Clones share
//! the same table, so several engines in one process can act as a cluster.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use soulgraves_types::{MarkerId, NodeId, PlayerId, SoulRecord, StorageMode, StoredSoul};
use tracing::{error, warn};

use crate::store::SoulBackend;

/// A shared table of soul rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    rows: Arc<Mutex<Vec<StoredSoul>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredSoul>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn available(&self, op: &str) -> bool {
        if self.unavailable.load(Ordering::Acquire) {
            error!(op, "storage unavailable");
            return false;
        }
        true
    }

    /// Simulate the store going down or coming back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// A copy of every row.
    pub fn rows(&self) -> Vec<StoredSoul> {
        self.lock().clone()
    }

    /// The row for `marker`, regardless of flags.
    pub fn row(&self, marker: MarkerId) -> Option<StoredSoul> {
        self.lock()
            .iter()
            .find(|r| r.record.marker_id == marker)
            .cloned()
    }

    /// Insert a raw row, flags included.
    pub fn insert_row(&self, row: StoredSoul) {
        self.lock().push(row);
    }

    fn live(row: &StoredSoul, now_ms: i64) -> bool {
        !row.deleted && !row.record.is_expired_at(now_ms)
    }
}

#[async_trait]
impl SoulBackend for MemoryBackend {
    fn mode(&self) -> StorageMode {
        StorageMode::Database
    }

    async fn prepare(&self) {}

    async fn load_for_node(&self, node: &NodeId) -> Vec<StoredSoul> {
        if !self.available("load_for_node") {
            return Vec::new();
        }
        self.lock()
            .iter()
            .filter(|r| r.record.server_id == *node)
            .cloned()
            .collect()
    }

    async fn save(&self, record: &SoulRecord) {
        if !self.available("save") {
            return;
        }
        let mut rows = self.lock();
        if rows.iter().any(|r| r.record.marker_id == record.marker_id) {
            warn!(marker_id = %record.marker_id, "duplicate marker id, row not inserted");
            return;
        }
        rows.push(StoredSoul {
            record: record.clone(),
            deleted: false,
        });
    }

    async fn delete(&self, record: &SoulRecord) {
        if !self.available("delete") {
            return;
        }
        self.lock().retain(|r| r.record.marker_id != record.marker_id);
    }

    async fn update_snapshot(&self, record: &SoulRecord) {
        if !self.available("update_snapshot") {
            return;
        }
        if let Some(row) = self
            .lock()
            .iter_mut()
            .find(|r| r.record.marker_id == record.marker_id)
        {
            row.record.inventory = record.inventory.clone();
            row.record.experience = record.experience;
            row.record.expire_time = record.expire_time;
        }
    }

    async fn mark_deleted(&self, marker: MarkerId) {
        if !self.available("mark_deleted") {
            return;
        }
        if let Some(row) = self.lock().iter_mut().find(|r| r.record.marker_id == marker) {
            row.deleted = true;
        }
    }

    async fn mark_expired(&self, marker: MarkerId) {
        if !self.available("mark_expired") {
            return;
        }
        if let Some(row) = self.lock().iter_mut().find(|r| r.record.marker_id == marker) {
            row.record.expire_time = 1;
        }
    }

    async fn list_all_except(&self, node: &NodeId, now_ms: i64) -> Vec<SoulRecord> {
        if !self.available("list_all_except") {
            return Vec::new();
        }
        self.lock()
            .iter()
            .filter(|r| r.record.server_id != *node && Self::live(r, now_ms))
            .map(|r| r.record.clone())
            .collect()
    }

    async fn list_for_owner_except(
        &self,
        owner: PlayerId,
        node: &NodeId,
        now_ms: i64,
    ) -> Vec<SoulRecord> {
        if !self.available("list_for_owner_except") {
            return Vec::new();
        }
        self.lock()
            .iter()
            .filter(|r| {
                r.record.owner_id == owner && r.record.server_id != *node && Self::live(r, now_ms)
            })
            .map(|r| r.record.clone())
            .collect()
    }

    async fn find_by_marker(&self, marker: MarkerId, now_ms: i64) -> Option<SoulRecord> {
        if !self.available("find_by_marker") {
            return None;
        }
        self.lock()
            .iter()
            .find(|r| r.record.marker_id == marker && Self::live(r, now_ms))
            .map(|r| r.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use soulgraves_types::{Inventory, Location};

    use super::*;

    fn record(node: &str, owner: PlayerId, expire_time: i64) -> SoulRecord {
        SoulRecord {
            owner_id: owner,
            marker_id: MarkerId::new(),
            server_id: NodeId::new(node),
            location: Location::new("world", 0.0, 64.0, 0.0),
            inventory: Inventory::default(),
            experience: 0,
            death_time: 0,
            expire_time,
        }
    }

    #[tokio::test]
    async fn remote_listing_excludes_own_deleted_and_expired_rows() {
        let backend = MemoryBackend::new();
        let owner = PlayerId::new();
        let mine = record("a", owner, 10_000);
        let theirs = record("b", owner, 10_000);
        let gone = record("b", owner, 10_000);
        let stale = record("b", owner, 10_000);
        for r in [&mine, &theirs, &gone, &stale] {
            backend.save(r).await;
        }
        backend.mark_deleted(gone.marker_id).await;
        backend.mark_expired(stale.marker_id).await;

        let listed = backend.list_for_owner_except(owner, &NodeId::new("a"), 5_000).await;
        assert_eq!(listed, vec![theirs.clone()]);
        assert_eq!(backend.list_all_except(&NodeId::new("a"), 5_000).await.len(), 1);
        assert!(backend.find_by_marker(gone.marker_id, 5_000).await.is_none());
        assert!(backend.find_by_marker(theirs.marker_id, 5_000).await.is_some());
    }

    #[tokio::test]
    async fn load_returns_flagged_rows_too() {
        let backend = MemoryBackend::new();
        let r = record("a", PlayerId::new(), 10_000);
        backend.save(&r).await;
        backend.mark_deleted(r.marker_id).await;
        let loaded = backend.load_for_node(&NodeId::new("a")).await;
        assert_eq!(loaded.len(), 1);
        assert!(loaded.iter().all(|s| s.deleted));
    }

    #[tokio::test]
    async fn duplicate_save_keeps_first_row() {
        let backend = MemoryBackend::new();
        let mut r = record("a", PlayerId::new(), 10_000);
        backend.save(&r).await;
        r.experience = 5;
        backend.save(&r).await;
        assert_eq!(backend.rows().len(), 1);
        assert_eq!(backend.row(r.marker_id).map(|s| s.record.experience), Some(0));
    }

    #[tokio::test]
    async fn outage_yields_empty_results() {
        let backend = MemoryBackend::new();
        let r = record("a", PlayerId::new(), 10_000);
        backend.save(&r).await;
        backend.set_unavailable(true);
        assert!(backend.load_for_node(&NodeId::new("a")).await.is_empty());
        backend.delete(&r).await;
        backend.set_unavailable(false);
        assert!(backend.row(r.marker_id).is_some());
    }
}
