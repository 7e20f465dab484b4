//! PostgreSQL storage adapter.
//!
//! This module implements the [`ScopeExecutor`](roster_core::ports::ScopeExecutor)
//! port defined in `roster-core` using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool, migrations and extension checks
//! - [`PgScopeExecutor`] - Runs query plans against the pool
//! - `render` - Query plans to parameterized SQL
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_graphql(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let executor = Arc::new(db.executor());
//! ```

mod database;
mod executor;
mod helpers;
pub mod render;

pub use database::{Database, DatabaseConfig, TRIGRAM_EXTENSION};
pub use executor::PgScopeExecutor;
