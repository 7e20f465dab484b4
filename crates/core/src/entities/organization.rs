use crate::entities::{MEMBERSHIP_ALIAS, MEMBERSHIP_TABLE, USER_TABLE};
use crate::error::{PaginationResult, StorageResult};
use crate::models::{FromRecord, Organization, Record, Status};
use crate::query::{ColumnRef, Scope};
use crate::services::connection::EntityConnection;
use crate::services::filter::{FieldRegistry, FilterExpr, ValueKind};
use crate::services::sort::SortConfig;

pub const ORGANIZATION_TABLE: &str = "organizations";
pub const ORGANIZATION_ALIAS: &str = "Organization";
/// Owner user row, joined to expose and sort by its email.
pub const OWNER_ALIAS: &str = "Owner";

const ORGANIZATION_COLUMNS: [&str; 5] = [
    "organization_id",
    "organization_name",
    "status",
    "owner_user_id",
    "created_at",
];

impl FromRecord for Organization {
    fn from_record(record: &Record) -> StorageResult<Self> {
        Ok(Self {
            id: record.uuid("Organization.organization_id")?,
            name: record.opt_text("Organization.organization_name")?,
            status: Status::parse(&record.text("Organization.status")?)?,
            owner_user_id: record.opt_uuid("Organization.owner_user_id")?,
            owner_email: record.opt_text("Owner.email")?,
            created_at: record.timestamp("Organization.created_at")?,
        })
    }
}

/// `organizationsConnection`.
pub struct OrganizationConnection {
    sort: SortConfig,
    registry: FieldRegistry,
}

impl Default for OrganizationConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl OrganizationConnection {
    pub fn new() -> Self {
        let sort = SortConfig::new("organization_id", ValueKind::Uuid)
            .field("id", "organization_id", ValueKind::Uuid)
            .field("name", "organization_name", ValueKind::Text)
            .field("ownerEmail", "Owner.email", ValueKind::Text)
            .field("createdAt", "created_at", ValueKind::Timestamp);

        let registry = FieldRegistry::new()
            .field("id", "organization_id", ValueKind::Uuid)
            .field("name", "organization_name", ValueKind::Text)
            .field("status", "status", ValueKind::Text)
            .field("ownerUserId", "owner_user_id", ValueKind::Uuid)
            .field("ownerEmail", "Owner.email", ValueKind::Text)
            .field("userId", "OrganizationMembership.user_id", ValueKind::Uuid);

        Self { sort, registry }
    }
}

impl EntityConnection for OrganizationConnection {
    fn base_scope(&self) -> PaginationResult<Scope> {
        let mut scope = Scope::new(ORGANIZATION_TABLE, ORGANIZATION_ALIAS);
        scope
            .left_join(
                USER_TABLE,
                OWNER_ALIAS,
                ColumnRef::new(ORGANIZATION_ALIAS, "owner_user_id"),
                ColumnRef::new(OWNER_ALIAS, "user_id"),
            )?
            .select_all(ORGANIZATION_COLUMNS.map(|c| ColumnRef::new(ORGANIZATION_ALIAS, c)))
            .select(ColumnRef::new(OWNER_ALIAS, "email"));
        Ok(scope)
    }

    fn sort_config(&self) -> &SortConfig {
        &self.sort
    }

    fn filter_registry(&self) -> &FieldRegistry {
        &self.registry
    }

    fn join_for_filter(&self, scope: &mut Scope, filter: &FilterExpr) -> PaginationResult<()> {
        if filter.references("userId") {
            scope.inner_join(
                MEMBERSHIP_TABLE,
                MEMBERSHIP_ALIAS,
                ColumnRef::new(ORGANIZATION_ALIAS, "organization_id"),
                ColumnRef::new(MEMBERSHIP_ALIAS, "organization_id"),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginationConfig;
    use crate::ports::{
        Connection, ConnectionDirection, DirectionArgs, PaginationArgs, SortOrder, SortRequest,
    };
    use crate::services::connection::ConnectionService;
    use crate::services::filter::FilterOperator;
    use crate::testing::{MemoryExecutor, seed_school};

    async fn organizations(
        exec: &MemoryExecutor,
        filter: Option<FilterExpr>,
        sort: Option<SortRequest>,
    ) -> Connection<Organization> {
        let config = PaginationConfig::default();
        let entity = OrganizationConnection::new();
        let args = PaginationArgs {
            direction: ConnectionDirection::Forward,
            direction_args: DirectionArgs::default(),
            sort,
            include_total_count: true,
        };
        ConnectionService::new(exec, &config)
            .connection(&entity, entity.base_scope().unwrap(), filter.as_ref(), &args)
            .await
            .unwrap()
    }

    fn names(conn: &Connection<Organization>) -> Vec<String> {
        conn.nodes().filter_map(|o| o.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_owner_email_resolved_through_left_join() {
        let exec = MemoryExecutor::new();
        seed_school(&exec);
        let conn = organizations(&exec, None, None).await;

        assert_eq!(conn.total_count, Some(3));
        let owners: Vec<Option<&str>> = conn.nodes().map(|o| o.owner_email.as_deref()).collect();
        assert_eq!(
            owners,
            vec![Some("ann@school.test"), Some("bob@school.test"), None]
        );
    }

    #[test]
    fn test_base_scope_joins_owner_once() {
        let entity = OrganizationConnection::new();
        let mut scope = entity.base_scope().unwrap();
        assert_eq!(scope.joins().len(), 1);
        assert_eq!(scope.table_for(OWNER_ALIAS), Some(USER_TABLE));

        // Réutiliser l'alias Owner pour une autre table est refusé, pas ignoré
        let err = scope
            .left_join(
                MEMBERSHIP_TABLE,
                OWNER_ALIAS,
                ColumnRef::new(ORGANIZATION_ALIAS, "organization_id"),
                ColumnRef::new(OWNER_ALIAS, "organization_id"),
            )
            .unwrap_err();
        assert_eq!(err.code(), "AMBIGUOUS_FIELD_REFERENCE");
    }

    // Test critique: "status" reste Organization.status malgré l'alias Owner (users.status)
    #[tokio::test]
    async fn test_status_filter_targets_organization() {
        let exec = MemoryExecutor::new();
        seed_school(&exec);
        let filter = FilterExpr::leaf("status", FilterOperator::Eq, "inactive");
        let conn = organizations(&exec, Some(filter), None).await;
        assert_eq!(names(&conn), vec!["Gamma College"]);
    }

    #[tokio::test]
    async fn test_organizations_of_a_user() {
        let exec = MemoryExecutor::new();
        let fixture = seed_school(&exec);
        let filter = FilterExpr::leaf("userId", FilterOperator::Eq, fixture.users[5]);
        let conn = organizations(&exec, Some(filter), None).await;
        assert_eq!(names(&conn), vec!["Alpha Academy", "Beta School"]);
        assert_eq!(conn.total_count, Some(2));
    }

    #[tokio::test]
    async fn test_sort_by_owner_email_puts_missing_owner_first_when_desc() {
        let exec = MemoryExecutor::new();
        seed_school(&exec);
        let sort = SortRequest::new(["ownerEmail"], SortOrder::Desc);
        let conn = organizations(&exec, None, Some(sort)).await;
        assert_eq!(names(&conn), vec!["Gamma College", "Beta School", "Alpha Academy"]);
    }
}
