//! `PostgreSQL` storage for `SoulGraves` souls.
//!
//! The relational backend is what lets several nodes share one pool of
//! souls: every node writes its own rows and reads everyone else's.
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`soul_store`] -- Statements on the `soul_grave` table
//! - [`backend`] -- [`PostgresBackend`], the `SoulBackend` implementation
//! - [`error`] -- Shared error types

pub mod backend;
pub mod error;
pub mod postgres;
pub mod soul_store;

// Re-export primary types for convenience.
pub use backend::PostgresBackend;
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use soul_store::{SoulRow, SoulStore};
