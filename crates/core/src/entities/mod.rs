//! Paginated entities exposed by the read API.
//!
//! Each entity describes its base scope, sortable fields, filterable
//! fields and the joins those filters need.

mod organization;
mod user;

pub use organization::*;
pub use user::*;

/// Join table between users and organizations.
pub const MEMBERSHIP_TABLE: &str = "organization_memberships";
pub const MEMBERSHIP_ALIAS: &str = "OrganizationMembership";
