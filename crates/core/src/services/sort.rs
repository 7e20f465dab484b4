//! Sort planning.
//!
//! Turns a caller's [`SortRequest`] into the effective sort key: the
//! requested columns in the shared order, followed by the entity's primary
//! key ascending. The primary key suffix makes the order total, which is
//! what keyset seeks rely on.

use std::collections::BTreeMap;

use crate::error::{PaginationError, PaginationResult};
use crate::ports::{ConnectionDirection, SortOrder, SortRequest};
use crate::query::{ColumnRef, OrderTerm, Scope};
use crate::services::filter::ValueKind;

/// Order applied to requested fields when the caller gives none.
pub const DEFAULT_SORT_ORDER: SortOrder = SortOrder::Asc;

/// A sortable column path and the kind of value it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct SortColumn {
    pub path: String,
    pub kind: ValueKind,
}

impl SortColumn {
    pub fn new(path: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Sortable fields of an entity.
///
/// Each public field name maps to one or more columns; a composite field
/// expands to all of its columns in declaration order.
#[derive(Debug, Clone)]
pub struct SortConfig {
    primary_key: SortColumn,
    fields: BTreeMap<String, Vec<SortColumn>>,
}

impl SortConfig {
    /// `primary_key` is a column path (`"user_id"` or `"User.user_id"`).
    pub fn new(primary_key: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            primary_key: SortColumn::new(primary_key, kind),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(self, name: impl Into<String>, path: impl Into<String>, kind: ValueKind) -> Self {
        self.composite(name, [(path.into(), kind)])
    }

    pub fn composite<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = (S, ValueKind)>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            columns
                .into_iter()
                .map(|(path, kind)| SortColumn::new(path, kind))
                .collect(),
        );
        self
    }

    pub fn primary_key(&self) -> &SortColumn {
        &self.primary_key
    }

    pub fn resolve(&self, field: &str) -> Option<&[SortColumn]> {
        self.fields.get(field).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKeyPart {
    pub column: ColumnRef,
    pub order: SortOrder,
    /// Kind of the values a cursor may carry for this part.
    pub kind: ValueKind,
}

impl SortKeyPart {
    /// Name of this part inside a cursor.
    pub fn key(&self) -> String {
        self.column.output_name()
    }
}

/// Requested columns plus the primary key: a total order over the scope.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSortKey {
    parts: Vec<SortKeyPart>,
}

impl EffectiveSortKey {
    pub fn parts(&self) -> &[SortKeyPart] {
        &self.parts
    }

    /// The primary key column, always the last part.
    pub fn primary(&self) -> &ColumnRef {
        // plan() always pushes the primary key
        &self.parts[self.parts.len() - 1].column
    }

    pub fn keys(&self) -> Vec<String> {
        self.parts.iter().map(SortKeyPart::key).collect()
    }

    /// `ORDER BY` terms for reading in `direction`.
    ///
    /// Backward reads walk the key in reverse; the paginator flips the
    /// fetched rows back afterwards.
    pub fn order_terms(&self, direction: ConnectionDirection) -> Vec<OrderTerm> {
        self.parts
            .iter()
            .map(|part| OrderTerm {
                column: part.column.clone(),
                order: match direction {
                    ConnectionDirection::Forward => part.order,
                    ConnectionDirection::Backward => part.order.reversed(),
                },
            })
            .collect()
    }
}

/// Build the effective sort key for a request against `scope`.
pub fn plan(
    request: Option<&SortRequest>,
    config: &SortConfig,
    scope: &Scope,
) -> PaginationResult<EffectiveSortKey> {
    let mut parts: Vec<SortKeyPart> = Vec::new();

    if let Some(request) = request {
        for field in &request.fields {
            let columns = config
                .resolve(field)
                .ok_or_else(|| PaginationError::UnknownSortField(field.clone()))?;
            for sort_column in columns {
                let column = scope.qualify(&sort_column.path)?;
                if !parts.iter().any(|p| p.column == column) {
                    parts.push(SortKeyPart {
                        column,
                        order: request.order,
                        kind: sort_column.kind,
                    });
                }
            }
        }
    }

    let primary_key = config.primary_key();
    let primary = scope.qualify(&primary_key.path)?;
    // Already unique when the caller sorted by the key itself
    if let Some(pos) = parts.iter().position(|p| p.column == primary) {
        let part = parts.remove(pos);
        parts.push(part);
    } else {
        parts.push(SortKeyPart {
            column: primary,
            order: SortOrder::Asc,
            kind: primary_key.kind,
        });
    }

    Ok(EffectiveSortKey { parts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SortConfig {
        SortConfig::new("user_id", ValueKind::Uuid)
            .field("id", "user_id", ValueKind::Uuid)
            .field("givenName", "given_name", ValueKind::Text)
            .field("familyName", "family_name", ValueKind::Text)
            .composite(
                "fullName",
                [("given_name", ValueKind::Text), ("family_name", ValueKind::Text)],
            )
            .field("organizationStatus", "OrganizationMembership.status", ValueKind::Text)
    }

    fn scope() -> Scope {
        Scope::new("users", "User")
    }

    fn names(key: &EffectiveSortKey) -> Vec<String> {
        key.keys()
    }

    // Test critique: sans tri demandé, la clé primaire seule (ASC)
    #[test]
    fn test_default_sort_is_primary_key() {
        let key = plan(None, &config(), &scope()).unwrap();
        assert_eq!(names(&key), vec!["User.user_id"]);
        assert_eq!(key.parts()[0].order, SortOrder::Asc);
    }

    // Test critique: la clé primaire est toujours ajoutée en dernier, en ASC
    #[test]
    fn test_primary_key_appended_ascending() {
        let request = SortRequest::new(["givenName", "familyName"], SortOrder::Desc);
        let key = plan(Some(&request), &config(), &scope()).unwrap();

        assert_eq!(
            names(&key),
            vec!["User.given_name", "User.family_name", "User.user_id"]
        );
        let orders: Vec<SortOrder> = key.parts().iter().map(|p| p.order).collect();
        assert_eq!(orders, vec![SortOrder::Desc, SortOrder::Desc, SortOrder::Asc]);
        assert_eq!(key.primary(), &ColumnRef::new("User", "user_id"));
    }

    #[test]
    fn test_sorting_by_primary_key_is_not_duplicated() {
        let request = SortRequest::new(["id"], SortOrder::Desc);
        let key = plan(Some(&request), &config(), &scope()).unwrap();
        assert_eq!(names(&key), vec!["User.user_id"]);
        assert_eq!(key.parts()[0].order, SortOrder::Desc);
    }

    #[test]
    fn test_composite_field_expands() {
        let request = SortRequest::new(["fullName", "givenName"], SortOrder::Asc);
        let key = plan(Some(&request), &config(), &scope()).unwrap();
        assert_eq!(
            names(&key),
            vec!["User.given_name", "User.family_name", "User.user_id"]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let request = SortRequest::new(["shoeSize"], SortOrder::Asc);
        let err = plan(Some(&request), &config(), &scope()).unwrap_err();
        assert!(matches!(err, PaginationError::UnknownSortField(f) if f == "shoeSize"));
    }

    #[test]
    fn test_sort_on_unjoined_alias_rejected() {
        let request = SortRequest::new(["organizationStatus"], SortOrder::Asc);
        let err = plan(Some(&request), &config(), &scope()).unwrap_err();
        assert!(matches!(err, PaginationError::AmbiguousFieldReference(_)));
    }

    #[test]
    fn test_backward_reverses_every_term() {
        let request = SortRequest::new(["givenName"], SortOrder::Desc);
        let key = plan(Some(&request), &config(), &scope()).unwrap();
        let terms = key.order_terms(ConnectionDirection::Backward);
        let orders: Vec<SortOrder> = terms.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![SortOrder::Asc, SortOrder::Desc]);
    }
}
