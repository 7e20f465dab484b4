//! Connection response types and node objects.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_graphql::dataloader::{DataLoader, Loader};
use async_graphql::{ComplexObject, Context, Result, SimpleObject};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use roster_core::entities::UserConnection;
use roster_core::models;
use roster_core::ports::Connection;
use roster_core::services::{ChildConnectionKey, ConnectionService, EntityConnection};

use crate::inputs::{
    ConnectionsDirectionArgs, Direction, StatusValue, UserFilter, UserSortInput, pagination_args,
};
use crate::schema::{into_graphql_error, wants_total_count};
use crate::types::ApiContext;

// -----------------------------------------------------------------------------
// Nodes
// -----------------------------------------------------------------------------

#[derive(SimpleObject, Clone, Debug)]
#[graphql(name = "UserConnectionNode")]
pub struct User {
    pub id: Uuid,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: StatusValue,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<models::User> for User {
    fn from(u: models::User) -> Self {
        Self {
            id: u.id,
            given_name: u.given_name,
            family_name: u.family_name,
            email: u.email,
            phone: u.phone,
            status: u.status.into(),
            date_of_birth: u.date_of_birth,
            gender: u.gender,
            created_at: u.created_at,
        }
    }
}

#[derive(SimpleObject, Clone, Debug)]
#[graphql(name = "OrganizationConnectionNode", complex)]
pub struct Organization {
    pub id: Uuid,
    pub name: Option<String>,
    pub status: StatusValue,
    pub owner_user_id: Option<Uuid>,
    pub owner_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<models::Organization> for Organization {
    fn from(o: models::Organization) -> Self {
        Self {
            id: o.id,
            name: o.name,
            status: o.status.into(),
            owner_user_id: o.owner_user_id,
            owner_email: o.owner_email,
            created_at: o.created_at,
        }
    }
}

#[ComplexObject]
impl Organization {
    /// Members of this organization. Batched across the organizations of
    /// a page.
    async fn users_connection(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] direction: Direction,
        direction_args: Option<ConnectionsDirectionArgs>,
        sort: Option<UserSortInput>,
        filter: Option<UserFilter>,
    ) -> Result<UsersConnectionResponse> {
        let loader = ctx.data::<DataLoader<OrganizationUsersLoader>>()?;

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

        let key = OrganizationUsersKey(UserConnection::organization_users_key(
            self.id, args, filter,
        ));
        let page = loader
            .load_one(key)
            .await?
            .unwrap_or_else(|| Connection::empty(None));
        Ok(page.into())
    }
}

// -----------------------------------------------------------------------------
// Child connection batching
// -----------------------------------------------------------------------------

/// Loader key.
///
/// `ChildConnectionKey` holds `Scalar` values, whose float variant rules
/// out derived `Hash`/`Eq`, so the key is hashed through its debug form.
/// Keys built from the GraphQL inputs never hold floats, which keeps
/// equality total.
#[derive(Clone, Debug, PartialEq)]
pub struct OrganizationUsersKey(pub ChildConnectionKey);

impl Eq for OrganizationUsersKey {}

impl Hash for OrganizationUsersKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        format!("{:?}", self.0).hash(state);
    }
}

/// Resolves `usersConnection` for every organization requested in the
/// same tick with one child-connection load.
pub struct OrganizationUsersLoader {
    api: ApiContext,
}

impl OrganizationUsersLoader {
    pub fn new(api: ApiContext) -> Self {
        Self { api }
    }
}

impl Loader<OrganizationUsersKey> for OrganizationUsersLoader {
    type Value = Connection<models::User>;
    type Error = async_graphql::Error;

    async fn load(
        &self,
        keys: &[OrganizationUsersKey],
    ) -> Result<HashMap<OrganizationUsersKey, Self::Value>, Self::Error> {
        let child_keys: Vec<ChildConnectionKey> = keys.iter().map(|k| k.0.clone()).collect();
        let users = self.api.users.as_ref();
        let base = users.base_scope().map_err(into_graphql_error)?;

        let pages = ConnectionService::new(self.api.executor.as_ref(), &self.api.config)
            .child_connections::<_, models::User>(users, &base, &child_keys)
            .await
            .map_err(into_graphql_error)?;

        Ok(keys.iter().cloned().zip(pages).collect())
    }
}

// -----------------------------------------------------------------------------
// Connection Types (Relay-style pagination)
// -----------------------------------------------------------------------------

#[derive(SimpleObject, Clone, Debug)]
pub struct ConnectionPageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    /// Empty when the page has no edges.
    pub start_cursor: String,
    pub end_cursor: String,
}

/// Generate connection response types (Edge + Response) with From impl.
macro_rules! define_connection {
    ($node:ty, $core_model:ty, $edge:ident, $connection:ident) => {
        #[derive(SimpleObject, Clone, Debug)]
        pub struct $edge {
            pub node: $node,
            pub cursor: String,
        }

        #[derive(SimpleObject, Clone, Debug)]
        pub struct $connection {
            /// Only computed when selected.
            pub total_count: Option<u64>,
            pub edges: Vec<$edge>,
            pub page_info: ConnectionPageInfo,
        }

        impl From<Connection<$core_model>> for $connection {
            fn from(conn: Connection<$core_model>) -> Self {
                Self {
                    total_count: conn.total_count,
                    edges: conn
                        .edges
                        .into_iter()
                        .map(|e| $edge {
                            node: <$node>::from(e.node),
                            cursor: e.cursor.value,
                        })
                        .collect(),
                    page_info: ConnectionPageInfo {
                        has_next_page: conn.page_info.has_next_page,
                        has_previous_page: conn.page_info.has_previous_page,
                        start_cursor: conn.page_info.start_cursor.value,
                        end_cursor: conn.page_info.end_cursor.value,
                    },
                }
            }
        }
    };
}

define_connection!(User, models::User, UsersConnectionEdge, UsersConnectionResponse);
define_connection!(
    Organization,
    models::Organization,
    OrganizationsConnectionEdge,
    OrganizationsConnectionResponse
);
