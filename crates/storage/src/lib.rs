//! Storage layer for Roster.
//!
//! This crate renders the backend-neutral query plans of `roster-core`
//! to PostgreSQL and runs them. It handles connection pooling, migrations
//! and decoding rows into records.
//!
//! # Usage
//!
//! ```ignore
//! use roster_storage::{Database, DatabaseConfig};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_graphql(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Hand the executor to the API layer
//! let executor = Arc::new(db.executor());
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgScopeExecutor};
