//! Core domain layer for Roster.
//!
//! This crate contains the domain models, the backend-neutral query AST,
//! port traits and the pagination services of the Roster API. It follows
//! hexagonal architecture principles - this is the innermost layer with
//! no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      roster (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      roster-graphql                         │
//! │                          (API)                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      roster-storage                         │
//! │                       (PostgreSQL)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   roster-core  ← YOU ARE HERE               │
//! │          (models, query AST, ports, services)               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (User, Organization) and fetched records
//! - [`query`] - Scopes, predicates and query plans
//! - [`ports`] - Pagination types and the [`ports::ScopeExecutor`] trait
//! - [`services`] - Sorting, cursors, filters and keyset pagination
//! - [`entities`] - Paginated entity definitions
//! - [`config`] - Pagination settings
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Keyset pagination
//!
//! Pages are read by seeking past the sort key of the last row seen,
//! never by offset. The sort key always ends with the primary key so
//! every row has a unique position; the opaque [`ports::Cursor`] carries
//! that position.
//!
//! ## Executors
//!
//! Services build plans ([`query::SelectQuery`], [`query::CountQuery`],
//! [`query::PartitionedQuery`]) and hand them to a
//! [`ports::ScopeExecutor`]. `roster-storage` renders them to SQL; the
//! `testing` feature provides an in-memory executor.
//!
//! ## Request lifecycle
//!
//! 1. Start from the entity's base scope
//! 2. Join and compile the filter into predicates
//! 3. Plan the effective sort key and decode the cursor
//! 4. Fetch `count + 1` rows past the cursor (and the total if asked)
//! 5. Build edges, cursors and page info

pub mod config;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod query;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
