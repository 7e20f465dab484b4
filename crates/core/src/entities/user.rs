use uuid::Uuid;

use crate::entities::{MEMBERSHIP_ALIAS, MEMBERSHIP_TABLE};
use crate::error::{PaginationResult, StorageResult};
use crate::models::{FromRecord, Record, Scalar, Status, User};
use crate::ports::PaginationArgs;
use crate::query::{ColumnRef, Scope};
use crate::services::child::ChildConnectionKey;
use crate::services::connection::EntityConnection;
use crate::services::filter::{FieldRegistry, FilterExpr, ValueKind};
use crate::services::sort::SortConfig;

pub const USER_TABLE: &str = "users";
pub const USER_ALIAS: &str = "User";

const USER_COLUMNS: [&str; 9] = [
    "user_id",
    "given_name",
    "family_name",
    "email",
    "phone",
    "status",
    "date_of_birth",
    "gender",
    "created_at",
];

const CLASS_JOINS: [(&str, &str); 2] = [
    ("user_classes_studying", "ClassStudying"),
    ("user_classes_teaching", "ClassTeaching"),
];

impl FromRecord for User {
    fn from_record(record: &Record) -> StorageResult<Self> {
        Ok(Self {
            id: record.uuid("User.user_id")?,
            given_name: record.opt_text("User.given_name")?,
            family_name: record.opt_text("User.family_name")?,
            email: record.opt_text("User.email")?,
            phone: record.opt_text("User.phone")?,
            status: Status::parse(&record.text("User.status")?)?,
            date_of_birth: record.opt_text("User.date_of_birth")?,
            gender: record.opt_text("User.gender")?,
            created_at: record.timestamp("User.created_at")?,
        })
    }
}

/// `usersConnection`.
pub struct UserConnection {
    sort: SortConfig,
    registry: FieldRegistry,
}

impl Default for UserConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl UserConnection {
    pub fn new() -> Self {
        let sort = SortConfig::new("user_id", ValueKind::Uuid)
            .field("id", "user_id", ValueKind::Uuid)
            .field("givenName", "given_name", ValueKind::Text)
            .field("familyName", "family_name", ValueKind::Text)
            .field("email", "email", ValueKind::Text)
            .field("createdAt", "created_at", ValueKind::Timestamp);

        let registry = FieldRegistry::new()
            .field("userId", "user_id", ValueKind::Uuid)
            .field("givenName", "given_name", ValueKind::Text)
            .field("familyName", "family_name", ValueKind::Text)
            .field("email", "email", ValueKind::Text)
            .field("phone", "phone", ValueKind::Text)
            .field("gender", "gender", ValueKind::Text)
            .field("status", "status", ValueKind::Text)
            .field("createdAt", "created_at", ValueKind::Timestamp)
            .field(
                "organizationId",
                "OrganizationMembership.organization_id",
                ValueKind::Uuid,
            )
            .field(
                "organizationUserStatus",
                "OrganizationMembership.status",
                ValueKind::Text,
            )
            .any_of(
                "classId",
                ["ClassStudying.class_id", "ClassTeaching.class_id"],
                ValueKind::Uuid,
            );

        Self { sort, registry }
    }

    /// Key for the users page of one organization.
    pub fn organization_users_key(
        organization_id: Uuid,
        args: PaginationArgs,
        filter: Option<FilterExpr>,
    ) -> ChildConnectionKey {
        ChildConnectionKey {
            parent_id: Scalar::Uuid(organization_id),
            parent_filter_key: "organizationId".to_string(),
            pivot: "OrganizationMembership.organization_id".to_string(),
            args,
            filter,
        }
    }
}

impl EntityConnection for UserConnection {
    fn base_scope(&self) -> PaginationResult<Scope> {
        let mut scope = Scope::new(USER_TABLE, USER_ALIAS);
        scope.select_all(USER_COLUMNS.map(|c| ColumnRef::new(USER_ALIAS, c)));
        Ok(scope)
    }

    fn sort_config(&self) -> &SortConfig {
        &self.sort
    }

    fn filter_registry(&self) -> &FieldRegistry {
        &self.registry
    }

    fn join_for_filter(&self, scope: &mut Scope, filter: &FilterExpr) -> PaginationResult<()> {
        if filter.references("organizationId") || filter.references("organizationUserStatus") {
            scope.inner_join(
                MEMBERSHIP_TABLE,
                MEMBERSHIP_ALIAS,
                ColumnRef::new(USER_ALIAS, "user_id"),
                ColumnRef::new(MEMBERSHIP_ALIAS, "user_id"),
            )?;
        }
        if filter.references("classId") {
            for (table, alias) in CLASS_JOINS {
                scope.left_join(
                    table,
                    alias,
                    ColumnRef::new(USER_ALIAS, "user_id"),
                    ColumnRef::new(alias, "user_id"),
                )?;
            }
        }
        Ok(())
    }
}
