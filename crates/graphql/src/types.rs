//! GraphQL type definitions.

use std::sync::Arc;

use async_graphql::{EmptyMutation, EmptySubscription, Schema};

use roster_core::config::PaginationConfig;
use roster_core::entities::{OrganizationConnection, UserConnection};
use roster_core::ports::ScopeExecutor;

use crate::schema::QueryRoot;

/// The roster GraphQL schema type.
pub type RosterSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Engine handles shared by every resolver.
#[derive(Clone)]
pub struct ApiContext {
    pub executor: Arc<dyn ScopeExecutor>,
    pub config: PaginationConfig,
    pub users: Arc<UserConnection>,
    pub organizations: Arc<OrganizationConnection>,
}

impl ApiContext {
    pub fn new(executor: Arc<dyn ScopeExecutor>, config: PaginationConfig) -> Self {
        Self {
            executor,
            config,
            users: Arc::new(UserConnection::new()),
            organizations: Arc::new(OrganizationConnection::new()),
        }
    }
}
