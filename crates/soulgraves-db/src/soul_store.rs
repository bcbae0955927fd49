//! Statements on the `soul_grave` table.
//!
//! One row per soul. Coordinates are stored truncated to whole blocks and
//! the inventory as JSON text. Identifiers are plain text so a malformed
//! value surfaces as a skipped row instead of a failed query.
//!
//! | Column | Type | Notes |
//! |--------|------|-------|
//! | `id` | `BIGSERIAL` | primary key |
//! | `owner_id` | `TEXT` | player UUID |
//! | `marker_id` | `TEXT` | marker UUID, unique |
//! | `server_name` | `TEXT` | origin node |
//! | `world` | `TEXT` | world name |
//! | `x`, `y`, `z` | `INTEGER` | block coordinates |
//! | `inventory` | `TEXT` | JSON slot list |
//! | `xp` | `INTEGER` | experience |
//! | `death_time` | `BIGINT` | epoch ms |
//! | `expire_time` | `BIGINT` | epoch ms |
//! | `is_deleted` | `BOOLEAN` | soft-delete flag |

use soulgraves_types::{
    Inventory, Location, MarkerId, NodeId, PlayerId, SoulRecord, StoredSoul,
};
use sqlx::PgPool;

use crate::error::DbError;

const CREATE_TABLE: &str = r"CREATE TABLE IF NOT EXISTS soul_grave (
    id BIGSERIAL PRIMARY KEY,
    owner_id TEXT NOT NULL,
    marker_id TEXT NOT NULL UNIQUE,
    server_name TEXT NOT NULL,
    world TEXT NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    z INTEGER NOT NULL,
    inventory TEXT NOT NULL,
    xp INTEGER NOT NULL,
    death_time BIGINT NOT NULL,
    expire_time BIGINT NOT NULL,
    is_deleted BOOLEAN NOT NULL DEFAULT FALSE
)";

const CREATE_SERVER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS soul_grave_server_name_idx ON soul_grave (server_name)";

const CREATE_OWNER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS soul_grave_owner_id_idx ON soul_grave (owner_id)";

const SELECT_COLUMNS: &str = "SELECT id, owner_id, marker_id, server_name, world, x, y, z, \
     inventory, xp, death_time, expire_time, is_deleted FROM soul_grave";

/// A raw `soul_grave` row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SoulRow {
    /// Primary key.
    pub id: i64,
    /// Player UUID as text.
    pub owner_id: String,
    /// Marker UUID as text.
    pub marker_id: String,
    /// Origin node.
    pub server_name: String,
    /// World name.
    pub world: String,
    /// Block X.
    pub x: i32,
    /// Block Y.
    pub y: i32,
    /// Block Z.
    pub z: i32,
    /// JSON slot list.
    pub inventory: String,
    /// Experience.
    pub xp: i32,
    /// Epoch ms.
    pub death_time: i64,
    /// Epoch ms.
    pub expire_time: i64,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

impl SoulRow {
    /// Convert to a stored soul.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] if an identifier does not parse, the
    /// world name is blank, the experience is negative, or the inventory
    /// is not a valid slot list.
    pub fn into_stored(self) -> Result<StoredSoul, DbError> {
        let id = self.id;
        let invalid = move |reason: String| DbError::InvalidRow { id, reason };
        let owner_id = PlayerId::parse(&self.owner_id)
            .map_err(|e| invalid(format!("owner_id {:?}: {e}", self.owner_id)))?;
        let marker_id = MarkerId::parse(&self.marker_id)
            .map_err(|e| invalid(format!("marker_id {:?}: {e}", self.marker_id)))?;
        if self.world.trim().is_empty() {
            return Err(invalid("blank world name".to_owned()));
        }
        let experience = u32::try_from(self.xp)
            .map_err(|e| invalid(format!("xp {}: {e}", self.xp)))?;
        let inventory = Inventory::from_blob(&self.inventory)
            .map_err(|e| invalid(format!("inventory: {e}")))?;

        Ok(StoredSoul {
            record: SoulRecord {
                owner_id,
                marker_id,
                server_id: NodeId::new(self.server_name),
                location: Location::new(
                    self.world,
                    f64::from(self.x),
                    f64::from(self.y),
                    f64::from(self.z),
                ),
                inventory,
                experience,
                death_time: self.death_time,
                expire_time: self.expire_time,
            },
            deleted: self.is_deleted,
        })
    }
}

/// Operations on the `soul_grave` table.
pub struct SoulStore<'a> {
    pool: &'a PgPool,
}

impl<'a> SoulStore<'a> {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create the table and its indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a statement fails.
    pub async fn create_table(&self) -> Result<(), DbError> {
        sqlx::query(CREATE_TABLE).execute(self.pool).await?;
        sqlx::query(CREATE_SERVER_INDEX).execute(self.pool).await?;
        sqlx::query(CREATE_OWNER_INDEX).execute(self.pool).await?;
        tracing::debug!("soul_grave table ready");
        Ok(())
    }

    /// Insert a row for `record`. A second insert for the same marker is
    /// ignored. Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the inventory cannot be
    /// encoded, or [`DbError::Postgres`] if the insert fails.
    pub async fn insert(&self, record: &SoulRecord) -> Result<u64, DbError> {
        let (x, y, z) = record.location.block_coords();
        let inventory = record.inventory.to_blob()?;
        let result = sqlx::query(
            r"INSERT INTO soul_grave
                (owner_id, marker_id, server_name, world, x, y, z, inventory, xp, death_time, expire_time, is_deleted)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, FALSE)
              ON CONFLICT (marker_id) DO NOTHING",
        )
        .bind(record.owner_id.to_string())
        .bind(record.marker_id.to_string())
        .bind(record.server_id.as_str())
        .bind(&record.location.world)
        .bind(x)
        .bind(y)
        .bind(z)
        .bind(inventory)
        .bind(i32::try_from(record.experience).unwrap_or(i32::MAX))
        .bind(record.death_time)
        .bind(record.expire_time)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Hard-delete the row for `marker`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn delete(&self, marker: MarkerId) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM soul_grave WHERE marker_id = $1")
            .bind(marker.to_string())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Overwrite inventory, experience, and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the inventory cannot be
    /// encoded, or [`DbError::Postgres`] if the update fails.
    pub async fn update_snapshot(&self, record: &SoulRecord) -> Result<u64, DbError> {
        let inventory = record.inventory.to_blob()?;
        let result = sqlx::query(
            "UPDATE soul_grave SET inventory = $1, xp = $2, expire_time = $3 WHERE marker_id = $4",
        )
        .bind(inventory)
        .bind(i32::try_from(record.experience).unwrap_or(i32::MAX))
        .bind(record.expire_time)
        .bind(record.marker_id.to_string())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Set the soft-delete flag.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn mark_deleted(&self, marker: MarkerId) -> Result<u64, DbError> {
        let result = sqlx::query("UPDATE soul_grave SET is_deleted = TRUE WHERE marker_id = $1")
            .bind(marker.to_string())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Move the expiry to the epoch so every reader treats the row as expired.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn mark_expired(&self, marker: MarkerId) -> Result<u64, DbError> {
        let result = sqlx::query("UPDATE soul_grave SET expire_time = 1 WHERE marker_id = $1")
            .bind(marker.to_string())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Every row created by `node`, flags ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn rows_for_node(&self, node: &NodeId) -> Result<Vec<SoulRow>, DbError> {
        let rows = sqlx::query_as::<_, SoulRow>(&format!(
            "{SELECT_COLUMNS} WHERE server_name = $1 ORDER BY id"
        ))
        .bind(node.as_str())
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Live rows from every node except `node`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn live_rows_except(&self, node: &NodeId, now_ms: i64) -> Result<Vec<SoulRow>, DbError> {
        let rows = sqlx::query_as::<_, SoulRow>(&format!(
            "{SELECT_COLUMNS} WHERE server_name <> $1 AND is_deleted = FALSE AND expire_time > $2 ORDER BY id"
        ))
        .bind(node.as_str())
        .bind(now_ms)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Live rows for `owner` from every node except `node`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn live_rows_for_owner_except(
        &self,
        owner: PlayerId,
        node: &NodeId,
        now_ms: i64,
    ) -> Result<Vec<SoulRow>, DbError> {
        let rows = sqlx::query_as::<_, SoulRow>(&format!(
            "{SELECT_COLUMNS} WHERE owner_id = $1 AND server_name <> $2 \
             AND is_deleted = FALSE AND expire_time > $3 ORDER BY id"
        ))
        .bind(owner.to_string())
        .bind(node.as_str())
        .bind(now_ms)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// The live row for `marker`, from any node.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn live_row_by_marker(
        &self,
        marker: MarkerId,
        now_ms: i64,
    ) -> Result<Option<SoulRow>, DbError> {
        let row = sqlx::query_as::<_, SoulRow>(&format!(
            "{SELECT_COLUMNS} WHERE marker_id = $1 AND is_deleted = FALSE AND expire_time > $2"
        ))
        .bind(marker.to_string())
        .bind(now_ms)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row() -> SoulRow {
        SoulRow {
            id: 7,
            owner_id: PlayerId::new().to_string(),
            marker_id: MarkerId::new().to_string(),
            server_name: "lobby".to_owned(),
            world: "world".to_owned(),
            x: 10,
            y: 64,
            z: -3,
            inventory: r#"["diamond",null]"#.to_owned(),
            xp: 42,
            death_time: 1_000,
            expire_time: 301_000,
            is_deleted: true,
        }
    }

    #[test]
    fn valid_row_converts() {
        let stored = row().into_stored().unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.record.server_id, NodeId::new("lobby"));
        assert_eq!(stored.record.location.block_coords(), (10, 64, -3));
        assert_eq!(stored.record.inventory.slots().len(), 2);
        assert_eq!(stored.record.experience, 42);
    }

    #[test]
    fn bad_identifier_is_rejected() {
        let mut bad = row();
        bad.marker_id = "not-a-uuid".to_owned();
        assert!(matches!(bad.into_stored(), Err(DbError::InvalidRow { id: 7, .. })));
    }

    #[test]
    fn blank_world_is_rejected() {
        let mut bad = row();
        bad.world = "  ".to_owned();
        assert!(matches!(bad.into_stored(), Err(DbError::InvalidRow { .. })));
    }

    #[test]
    fn negative_xp_and_bad_inventory_are_rejected() {
        let mut bad = row();
        bad.xp = -1;
        assert!(bad.into_stored().is_err());
        let mut bad = row();
        bad.inventory = "{oops".to_owned();
        assert!(bad.into_stored().is_err());
    }
}
