//! Error types for the node binary.
//!
//! Everything here is a startup failure. Once the tick loop runs, transport
//! and storage problems are logged where they happen.

use soulgraves_core::config::ConfigError;
use soulgraves_db::DbError;

/// Errors that can stop the node from starting.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The configuration file could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The database could not be reached.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// Failed to connect to or subscribe on the NATS server.
    #[error("NATS error: {0}")]
    Nats(String),

    /// Failed to connect to or subscribe on Redis.
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    /// An inbound payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
