//! GraphQL API for Roster.
//!
//! Provides a GraphQL endpoint serving keyset-paginated, filterable
//! `usersConnection` and `organizationsConnection` queries.
//!
//! # Building the Schema
//!
//! ```ignore
//! use roster_graphql::{build_schema, serve_with_shutdown, ServerConfig};
//!
//! let executor: Arc<dyn ScopeExecutor> = Arc::new(db.executor());
//! let schema = build_schema(executor, PaginationConfig::default());
//! serve_with_shutdown(schema, ServerConfig::default(), shutdown_signal()).await?;
//! ```

mod connection;
mod inputs;
mod schema;
mod server;
mod types;

pub use connection::{
    ConnectionPageInfo, Organization, OrganizationsConnectionResponse, User,
    UsersConnectionResponse,
};
pub use inputs::{
    ConnectionsDirectionArgs, Direction, Order, OrganizationFilter, OrganizationSortInput,
    UserFilter, UserSortInput,
};
pub use schema::{MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, QueryRoot, build_schema};
pub use server::{ServerConfig, serve_with_shutdown};
pub use types::{ApiContext, RosterSchema};
