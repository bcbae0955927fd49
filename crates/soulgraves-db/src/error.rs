//! Error types for the storage adapter.
//!
//! [`DbError`] never leaves this crate through the backend trait: the
//! backend logs it and returns an empty result. It is only surfaced by
//! [`PostgresPool::connect`](crate::PostgresPool::connect), where a failure
//! is fatal at startup.

/// Errors that can occur in the storage adapter.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// The inventory column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row holds values that cannot form a soul.
    #[error("Invalid row {id}: {reason}")]
    InvalidRow {
        /// Primary key of the offending row.
        id: i64,
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
