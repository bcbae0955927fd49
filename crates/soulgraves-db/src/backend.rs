//! [`SoulBackend`] over `PostgreSQL`.
//!
//! Every failure stops here: it is logged at `error` and the caller gets an
//! empty result. Rows that cannot form a soul are skipped with a warning
//! instead of failing the whole read.

use async_trait::async_trait;
use soulgraves_core::store::SoulBackend;
use soulgraves_types::{MarkerId, NodeId, PlayerId, SoulRecord, StorageMode, StoredSoul};
use tracing::{error, warn};

use crate::error::DbError;
use crate::postgres::PostgresPool;
use crate::soul_store::{SoulRow, SoulStore};

/// Relational backend shared by every node in the cluster.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PostgresPool,
}

impl PostgresBackend {
    /// Wrap a connected pool.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    fn store(&self) -> SoulStore<'_> {
        SoulStore::new(self.pool.pool())
    }

    /// The pool this backend runs on.
    pub const fn pool(&self) -> &PostgresPool {
        &self.pool
    }
}

/// Convert rows, dropping the ones that cannot form a soul.
pub fn parse_rows(rows: Vec<SoulRow>) -> Vec<StoredSoul> {
    rows.into_iter()
        .filter_map(|row| match row.into_stored() {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(error = %e, "skipping unreadable soul row");
                None
            }
        })
        .collect()
}

fn live_records(rows: Vec<SoulRow>) -> Vec<SoulRecord> {
    parse_rows(rows).into_iter().map(|s| s.record).collect()
}

fn log_failure(op: &'static str, e: &DbError) {
    error!(op, error = %e, "soul storage operation failed");
}

#[async_trait]
impl SoulBackend for PostgresBackend {
    fn mode(&self) -> StorageMode {
        StorageMode::Database
    }

    async fn prepare(&self) {
        if let Err(e) = self.store().create_table().await {
            log_failure("create_table", &e);
        }
    }

    async fn load_for_node(&self, node: &NodeId) -> Vec<StoredSoul> {
        match self.store().rows_for_node(node).await {
            Ok(rows) => parse_rows(rows),
            Err(e) => {
                log_failure("load_for_node", &e);
                Vec::new()
            }
        }
    }

    async fn save(&self, record: &SoulRecord) {
        match self.store().insert(record).await {
            Ok(0) => warn!(marker_id = %record.marker_id, "duplicate marker id, row not inserted"),
            Ok(_) => {}
            Err(e) => log_failure("save", &e),
        }
    }

    async fn delete(&self, record: &SoulRecord) {
        if let Err(e) = self.store().delete(record.marker_id).await {
            log_failure("delete", &e);
        }
    }

    async fn update_snapshot(&self, record: &SoulRecord) {
        if let Err(e) = self.store().update_snapshot(record).await {
            log_failure("update_snapshot", &e);
        }
    }

    async fn mark_deleted(&self, marker: MarkerId) {
        if let Err(e) = self.store().mark_deleted(marker).await {
            log_failure("mark_deleted", &e);
        }
    }

    async fn mark_expired(&self, marker: MarkerId) {
        if let Err(e) = self.store().mark_expired(marker).await {
            log_failure("mark_expired", &e);
        }
    }

    async fn list_all_except(&self, node: &NodeId, now_ms: i64) -> Vec<SoulRecord> {
        match self.store().live_rows_except(node, now_ms).await {
            Ok(rows) => live_records(rows),
            Err(e) => {
                log_failure("list_all_except", &e);
                Vec::new()
            }
        }
    }

    async fn list_for_owner_except(
        &self,
        owner: PlayerId,
        node: &NodeId,
        now_ms: i64,
    ) -> Vec<SoulRecord> {
        match self
            .store()
            .live_rows_for_owner_except(owner, node, now_ms)
            .await
        {
            Ok(rows) => live_records(rows),
            Err(e) => {
                log_failure("list_for_owner_except", &e);
                Vec::new()
            }
        }
    }

    async fn find_by_marker(&self, marker: MarkerId, now_ms: i64) -> Option<SoulRecord> {
        match self.store().live_row_by_marker(marker, now_ms).await {
            Ok(row) => row.and_then(|r| live_records(vec![r]).pop()),
            Err(e) => {
                log_failure("find_by_marker", &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_rows_are_skipped() {
        let good = SoulRow {
            id: 1,
            owner_id: PlayerId::new().to_string(),
            marker_id: MarkerId::new().to_string(),
            server_name: "a".to_owned(),
            world: "world".to_owned(),
            x: 0,
            y: 64,
            z: 0,
            inventory: "[]".to_owned(),
            xp: 0,
            death_time: 0,
            expire_time: 1,
            is_deleted: false,
        };
        let bad = SoulRow {
            id: 2,
            owner_id: "garbage".to_owned(),
            ..good.clone()
        };
        let parsed = parse_rows(vec![bad, good]);
        assert_eq!(parsed.len(), 1);
    }
}
