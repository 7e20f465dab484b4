//! GraphQL schema definition.
//!
//! Exposes `usersConnection` and `organizationsConnection`. Resolvers only
//! translate arguments into engine requests and engine output into the
//! connection response; all validation happens in `roster-core`.

use std::sync::Arc;

use async_graphql::dataloader::DataLoader;
use async_graphql::{
    Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Result, Schema,
};
use tracing::warn;

use roster_core::config::PaginationConfig;
use roster_core::error::PaginationError;
use roster_core::models;
use roster_core::ports::ScopeExecutor;
use roster_core::services::{ConnectionService, EntityConnection};

use crate::connection::{
    OrganizationUsersLoader, OrganizationsConnectionResponse, UsersConnectionResponse,
};
use crate::inputs::{
    ConnectionsDirectionArgs, Direction, OrganizationFilter, OrganizationSortInput, UserFilter,
    UserSortInput, pagination_args,
};
use crate::types::{ApiContext, RosterSchema};

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
/// Each field has a default complexity of 1, nested objects multiply.
pub const MAX_QUERY_COMPLEXITY: usize = 500;

/// Build the schema over `executor`.
///
/// Includes query depth and complexity limits for DoS protection.
pub fn build_schema(executor: Arc<dyn ScopeExecutor>, config: PaginationConfig) -> RosterSchema {
    let api = ApiContext::new(executor, config);
    let users_loader = DataLoader::new(OrganizationUsersLoader::new(api.clone()), tokio::spawn);

    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(api)
        .data(users_loader)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

// -----------------------------------------------------------------------------
// Query root
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Users, keyset-paginated.
    async fn users_connection<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        #[graphql(default)] direction: Direction,
        direction_args: Option<ConnectionsDirectionArgs>,
        sort: Option<UserSortInput>,
        filter: Option<UserFilter>,
    ) -> Result<UsersConnectionResponse> {
        let api = ctx.data::<ApiContext>()?;

        let args = pagination_args(
            direction,
            direction_args,
            sort.map(Into::into),
            wants_total_count(ctx),
        );
        let filter = filter
            .as_ref()
            .map(UserFilter::to_expr)
            .transpose()
            .map_err(into_graphql_error)?;

        let users = api.users.as_ref();
        let connection = ConnectionService::new(api.executor.as_ref(), &api.config)
            .connection::<_, models::User>(
                users,
                users.base_scope().map_err(into_graphql_error)?,
                filter.as_ref(),
                &args,
            )
            .await
            .map_err(into_graphql_error)?;

        Ok(connection.into())
    }

    /// Organizations, keyset-paginated.
    async fn organizations_connection<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        #[graphql(default)] direction: Direction,
        direction_args: Option<ConnectionsDirectionArgs>,
        sort: Option<OrganizationSortInput>,
        filter: Option<OrganizationFilter>,
    ) -> Result<OrganizationsConnectionResponse> {
        let api = ctx.data::<ApiContext>()?;

        let args = pagination_args(
            direction,
            direction_args,
            sort.map(Into::into),
            wants_total_count(ctx),
        );
        let filter = filter
            .as_ref()
            .map(OrganizationFilter::to_expr)
            .transpose()
            .map_err(into_graphql_error)?;

        let organizations = api.organizations.as_ref();
        let connection = ConnectionService::new(api.executor.as_ref(), &api.config)
            .connection::<_, models::Organization>(
                organizations,
                organizations.base_scope().map_err(into_graphql_error)?,
                filter.as_ref(),
                &args,
            )
            .await
            .map_err(into_graphql_error)?;

        Ok(connection.into())
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

/// Whether the client selected `totalCount` on the current connection.
pub(crate) fn wants_total_count(ctx: &Context<'_>) -> bool {
    ctx.look_ahead().field("totalCount").exists()
}

/// Engine error to GraphQL error with `extensions.code`.
///
/// Backend failures are logged and reported without their details.
pub(crate) fn into_graphql_error(err: PaginationError) -> async_graphql::Error {
    let code = err.code();
    let message = if err.is_input_error() {
        err.to_string()
    } else {
        warn!(error = %err, "Connection query failed");
        "Internal server error".to_string()
    };
    async_graphql::Error::new(message).extend_with(|_, e| e.set("code", code))
}
