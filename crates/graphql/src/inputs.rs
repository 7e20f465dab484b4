//! GraphQL input types and their conversion into engine requests.
//!
//! Typed filter inputs follow the `{ operator, value }` leaf shape with
//! `AND` / `OR` combinators; they lower to [`FilterExpr`] so the engine
//! validates them the same way as any other filter source.

use async_graphql::{Enum, InputObject};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use roster_core::error::{PaginationError, PaginationResult};
use roster_core::models::Status;
use roster_core::ports::{
    ConnectionDirection, Cursor, DirectionArgs, PaginationArgs, SortOrder, SortRequest,
};
use roster_core::services::{FilterExpr, FilterOperator, FilterValue};

// -----------------------------------------------------------------------------
// Pagination
// -----------------------------------------------------------------------------

/// Direction a page is read in, relative to the cursor.
#[derive(Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[graphql(name = "ConnectionDirection")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl From<Direction> for ConnectionDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => ConnectionDirection::Forward,
            Direction::Backward => ConnectionDirection::Backward,
        }
    }
}

/// Ordering direction.
#[derive(Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[graphql(name = "SortOrder")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct ConnectionsDirectionArgs {
    /// Page size, 1 to 50. Defaults to 50.
    pub count: Option<i32>,
    /// Cursor from a previous page; empty or absent starts at the edge.
    pub cursor: Option<String>,
}

/// Engine arguments from the connection field arguments.
pub fn pagination_args(
    direction: Direction,
    direction_args: Option<ConnectionsDirectionArgs>,
    sort: Option<SortRequest>,
    include_total_count: bool,
) -> PaginationArgs {
    let direction_args = direction_args.unwrap_or_default();
    PaginationArgs {
        direction: direction.into(),
        direction_args: DirectionArgs {
            count: direction_args.count.map(i64::from),
            cursor: direction_args.cursor.map(Cursor::new),
        },
        sort,
        include_total_count,
    }
}

// -----------------------------------------------------------------------------
// Sorting
// -----------------------------------------------------------------------------

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(rename_items = "camelCase")]
pub enum UserSortBy {
    Id,
    GivenName,
    FamilyName,
    Email,
    CreatedAt,
}

impl UserSortBy {
    fn as_field(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::GivenName => "givenName",
            Self::FamilyName => "familyName",
            Self::Email => "email",
            Self::CreatedAt => "createdAt",
        }
    }
}

#[derive(InputObject, Clone, Debug)]
pub struct UserSortInput {
    /// One field or several; later fields break ties of earlier ones.
    pub field: Vec<UserSortBy>,
    #[graphql(default)]
    pub order: Order,
}

impl From<UserSortInput> for SortRequest {
    fn from(input: UserSortInput) -> Self {
        SortRequest::new(input.field.iter().map(UserSortBy::as_field), input.order.into())
    }
}

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(rename_items = "camelCase")]
pub enum OrganizationSortBy {
    Id,
    Name,
    OwnerEmail,
    CreatedAt,
}

impl OrganizationSortBy {
    fn as_field(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::OwnerEmail => "ownerEmail",
            Self::CreatedAt => "createdAt",
        }
    }
}

#[derive(InputObject, Clone, Debug)]
pub struct OrganizationSortInput {
    pub field: Vec<OrganizationSortBy>,
    #[graphql(default)]
    pub order: Order,
}

impl From<OrganizationSortInput> for SortRequest {
    fn from(input: OrganizationSortInput) -> Self {
        SortRequest::new(
            input.field.iter().map(OrganizationSortBy::as_field),
            input.order.into(),
        )
    }
}

// -----------------------------------------------------------------------------
// Filter leaves
// -----------------------------------------------------------------------------

/// A typed `{ operator, value }` leaf.
trait FilterInput {
    fn to_leaf(&self, field: &str) -> PaginationResult<FilterExpr>;
}

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(rename_items = "camelCase")]
pub enum StringOperator {
    Eq,
    Neq,
    Contains,
}

#[derive(InputObject, Clone, Debug)]
pub struct StringFilter {
    pub operator: StringOperator,
    pub value: String,
}

impl FilterInput for StringFilter {
    fn to_leaf(&self, field: &str) -> PaginationResult<FilterExpr> {
        let operator = match self.operator {
            StringOperator::Eq => FilterOperator::Eq,
            StringOperator::Neq => FilterOperator::Neq,
            StringOperator::Contains => FilterOperator::Contains,
        };
        Ok(FilterExpr::leaf(field, operator, self.value.as_str()))
    }
}

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(rename_items = "camelCase")]
pub enum UuidOperator {
    Eq,
    Neq,
    In,
}

/// `value` for `eq`/`neq`, `values` for `in`.
#[derive(InputObject, Clone, Debug)]
pub struct UuidFilter {
    pub operator: UuidOperator,
    pub value: Option<Uuid>,
    pub values: Option<Vec<Uuid>>,
}

impl FilterInput for UuidFilter {
    fn to_leaf(&self, field: &str) -> PaginationResult<FilterExpr> {
        let operator = match self.operator {
            UuidOperator::Eq => FilterOperator::Eq,
            UuidOperator::Neq => FilterOperator::Neq,
            UuidOperator::In => FilterOperator::In,
        };
        let value = match (&self.values, self.value) {
            (Some(values), _) => FilterValue::list(values.iter().copied()),
            (None, Some(value)) => FilterValue::from(value),
            (None, None) => {
                return Err(PaginationError::InvalidFilterValue {
                    field: field.to_string(),
                    reason: "missing value".to_string(),
                });
            }
        };
        Ok(FilterExpr::leaf(field, operator, value))
    }
}

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(rename_items = "camelCase")]
pub enum DateOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(InputObject, Clone, Debug)]
pub struct DateFilter {
    pub operator: DateOperator,
    pub value: DateTime<Utc>,
}

impl FilterInput for DateFilter {
    fn to_leaf(&self, field: &str) -> PaginationResult<FilterExpr> {
        let operator = match self.operator {
            DateOperator::Eq => FilterOperator::Eq,
            DateOperator::Neq => FilterOperator::Neq,
            DateOperator::Gt => FilterOperator::Gt,
            DateOperator::Gte => FilterOperator::Gte,
            DateOperator::Lt => FilterOperator::Lt,
            DateOperator::Lte => FilterOperator::Lte,
        };
        Ok(FilterExpr::leaf(field, operator, self.value))
    }
}

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(name = "Status", rename_items = "camelCase")]
pub enum StatusValue {
    Active,
    Inactive,
}

impl From<Status> for StatusValue {
    fn from(status: Status) -> Self {
        match status {
            Status::Active => Self::Active,
            Status::Inactive => Self::Inactive,
        }
    }
}

impl From<StatusValue> for Status {
    fn from(status: StatusValue) -> Self {
        match status {
            StatusValue::Active => Self::Active,
            StatusValue::Inactive => Self::Inactive,
        }
    }
}

#[derive(Enum, Clone, Copy, Debug, PartialEq, Eq)]
#[graphql(rename_items = "camelCase")]
pub enum EqualityOperator {
    Eq,
    Neq,
}

#[derive(InputObject, Clone, Debug)]
pub struct StatusFilter {
    pub operator: EqualityOperator,
    pub value: StatusValue,
}

impl FilterInput for StatusFilter {
    fn to_leaf(&self, field: &str) -> PaginationResult<FilterExpr> {
        let operator = match self.operator {
            EqualityOperator::Eq => FilterOperator::Eq,
            EqualityOperator::Neq => FilterOperator::Neq,
        };
        Ok(FilterExpr::leaf(field, operator, Status::from(self.value).as_str()))
    }
}

// -----------------------------------------------------------------------------
// Entity filters
// -----------------------------------------------------------------------------

fn push_leaf<F: FilterInput>(
    parts: &mut Vec<FilterExpr>,
    field: &str,
    input: &Option<F>,
) -> PaginationResult<()> {
    if let Some(input) = input {
        parts.push(input.to_leaf(field)?);
    }
    Ok(())
}

/// Fields of one filter object are ANDed together with its `AND` and `OR`
/// lists.
fn combine<T>(
    mut parts: Vec<FilterExpr>,
    and: &Option<Vec<T>>,
    or: &Option<Vec<T>>,
    lower: impl Fn(&T) -> PaginationResult<FilterExpr>,
) -> PaginationResult<FilterExpr> {
    if let Some(and) = and {
        let members = and.iter().map(&lower).collect::<PaginationResult<Vec<_>>>()?;
        parts.push(FilterExpr::And(members));
    }
    if let Some(or) = or {
        let members = or.iter().map(&lower).collect::<PaginationResult<Vec<_>>>()?;
        parts.push(FilterExpr::Or(members));
    }
    Ok(match parts.len() {
        1 => parts.remove(0),
        _ => FilterExpr::And(parts),
    })
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct UserFilter {
    pub user_id: Option<UuidFilter>,
    pub given_name: Option<StringFilter>,
    pub family_name: Option<StringFilter>,
    pub email: Option<StringFilter>,
    pub phone: Option<StringFilter>,
    pub gender: Option<StringFilter>,
    pub status: Option<StatusFilter>,
    pub created_at: Option<DateFilter>,
    pub organization_id: Option<UuidFilter>,
    pub organization_user_status: Option<StatusFilter>,
    /// Matches users studying or teaching in the class.
    pub class_id: Option<UuidFilter>,
    #[graphql(name = "AND")]
    pub and: Option<Vec<UserFilter>>,
    #[graphql(name = "OR")]
    pub or: Option<Vec<UserFilter>>,
}

impl UserFilter {
    pub fn to_expr(&self) -> PaginationResult<FilterExpr> {
        let mut parts = Vec::new();
        push_leaf(&mut parts, "userId", &self.user_id)?;
        push_leaf(&mut parts, "givenName", &self.given_name)?;
        push_leaf(&mut parts, "familyName", &self.family_name)?;
        push_leaf(&mut parts, "email", &self.email)?;
        push_leaf(&mut parts, "phone", &self.phone)?;
        push_leaf(&mut parts, "gender", &self.gender)?;
        push_leaf(&mut parts, "status", &self.status)?;
        push_leaf(&mut parts, "createdAt", &self.created_at)?;
        push_leaf(&mut parts, "organizationId", &self.organization_id)?;
        push_leaf(
            &mut parts,
            "organizationUserStatus",
            &self.organization_user_status,
        )?;
        push_leaf(&mut parts, "classId", &self.class_id)?;
        combine(parts, &self.and, &self.or, UserFilter::to_expr)
    }
}

#[derive(InputObject, Clone, Debug, Default)]
pub struct OrganizationFilter {
    pub id: Option<UuidFilter>,
    pub name: Option<StringFilter>,
    pub status: Option<StatusFilter>,
    pub owner_user_id: Option<UuidFilter>,
    pub owner_email: Option<StringFilter>,
    /// Organizations the user is a member of.
    pub user_id: Option<UuidFilter>,
    #[graphql(name = "AND")]
    pub and: Option<Vec<OrganizationFilter>>,
    #[graphql(name = "OR")]
    pub or: Option<Vec<OrganizationFilter>>,
}

impl OrganizationFilter {
    pub fn to_expr(&self) -> PaginationResult<FilterExpr> {
        let mut parts = Vec::new();
        push_leaf(&mut parts, "id", &self.id)?;
        push_leaf(&mut parts, "name", &self.name)?;
        push_leaf(&mut parts, "status", &self.status)?;
        push_leaf(&mut parts, "ownerUserId", &self.owner_user_id)?;
        push_leaf(&mut parts, "ownerEmail", &self.owner_email)?;
        push_leaf(&mut parts, "userId", &self.user_id)?;
        combine(parts, &self.and, &self.or, OrganizationFilter::to_expr)
    }
}
