//! Query scope: the base selection a connection is paginated over.
//!
//! A [`Scope`] names a base table under an alias, the joins reachable
//! from it, the predicates every row must satisfy and the projected
//! columns. The paginator only ever appends to a scope.

use crate::error::{PaginationError, PaginationResult};
use crate::query::{ColumnRef, Predicate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// `kind JOIN table AS alias ON left = right`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    table: String,
    alias: String,
    joins: Vec<Join>,
    predicates: Vec<Predicate>,
    selection: Vec<ColumnRef>,
}

impl Scope {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            joins: Vec::new(),
            predicates: Vec::new(),
            selection: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn selection(&self) -> &[ColumnRef] {
        &self.selection
    }

    /// Whether `alias` is already joined (or is the base alias).
    pub fn has_join(&self, alias: &str) -> bool {
        self.alias == alias || self.joins.iter().any(|j| j.alias == alias)
    }

    /// Table bound to `alias`, if any.
    pub fn table_for(&self, alias: &str) -> Option<&str> {
        if self.alias == alias {
            return Some(&self.table);
        }
        self.joins
            .iter()
            .find(|j| j.alias == alias)
            .map(|j| j.table.as_str())
    }

    pub fn inner_join(
        &mut self,
        table: &str,
        alias: &str,
        left: ColumnRef,
        right: ColumnRef,
    ) -> PaginationResult<&mut Self> {
        self.join(JoinKind::Inner, table, alias, left, right)
    }

    pub fn left_join(
        &mut self,
        table: &str,
        alias: &str,
        left: ColumnRef,
        right: ColumnRef,
    ) -> PaginationResult<&mut Self> {
        self.join(JoinKind::Left, table, alias, left, right)
    }

    /// Add a join unless the same table is already bound to `alias`.
    ///
    /// Binding an alias to a second table is rejected, as the columns
    /// behind that alias would no longer be unambiguous.
    pub fn join(
        &mut self,
        kind: JoinKind,
        table: &str,
        alias: &str,
        left: ColumnRef,
        right: ColumnRef,
    ) -> PaginationResult<&mut Self> {
        match self.table_for(alias).map(str::to_string) {
            Some(existing) if existing == table => return Ok(self),
            Some(existing) => {
                return Err(PaginationError::AmbiguousFieldReference(format!(
                    "alias {alias} is bound to both {existing} and {table}"
                )));
            }
            None => {}
        }
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.to_string(),
            left,
            right,
        });
        Ok(self)
    }

    pub fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        if predicate != Predicate::True {
            self.predicates.push(predicate);
        }
        self
    }

    /// Project `column`, once.
    pub fn select(&mut self, column: ColumnRef) -> &mut Self {
        if !self.selection.contains(&column) {
            self.selection.push(column);
        }
        self
    }

    pub fn select_all(&mut self, columns: impl IntoIterator<Item = ColumnRef>) -> &mut Self {
        for column in columns {
            self.select(column);
        }
        self
    }

    /// Resolve a column path against the scope.
    ///
    /// Bare names are qualified with the base alias; qualified names must
    /// refer to an alias that is part of the scope.
    pub fn qualify(&self, path: &str) -> PaginationResult<ColumnRef> {
        let column = ColumnRef::parse(path, &self.alias).ok_or_else(|| {
            PaginationError::AmbiguousFieldReference(format!("malformed column path {path}"))
        })?;
        if !self.has_join(&column.table) {
            return Err(PaginationError::AmbiguousFieldReference(format!(
                "{path} refers to {}, which is not joined",
                column.table
            )));
        }
        Ok(column)
    }

    /// Conjunction of every predicate attached to the scope.
    pub fn filter(&self) -> Predicate {
        Predicate::and(self.predicates.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scalar;
    use crate::query::CompareOp;

    fn users() -> Scope {
        Scope::new("users", "User")
    }

    fn join_memberships(scope: &mut Scope) -> PaginationResult<&mut Scope> {
        scope.inner_join(
            "organization_memberships",
            "OrganizationMembership",
            ColumnRef::new("User", "user_id"),
            ColumnRef::new("OrganizationMembership", "user_id"),
        )
    }

    // Test critique: joindre deux fois le même alias ne duplique pas le JOIN
    #[test]
    fn test_join_is_idempotent() {
        let mut scope = users();
        join_memberships(&mut scope).unwrap();
        join_memberships(&mut scope).unwrap();

        assert_eq!(scope.joins().len(), 1);
        assert!(scope.has_join("OrganizationMembership"));
        assert!(scope.has_join("User"));
        assert!(!scope.has_join("Organization"));
    }

    #[test]
    fn test_alias_rebinding_is_ambiguous() {
        let mut scope = users();
        join_memberships(&mut scope).unwrap();
        let err = scope
            .left_join(
                "organizations",
                "OrganizationMembership",
                ColumnRef::new("User", "user_id"),
                ColumnRef::new("OrganizationMembership", "owner_user_id"),
            )
            .unwrap_err();
        assert!(matches!(err, PaginationError::AmbiguousFieldReference(_)));

        // L'alias de base ne peut pas être réutilisé non plus
        let err = scope
            .left_join(
                "organizations",
                "User",
                ColumnRef::new("User", "user_id"),
                ColumnRef::new("User", "owner_user_id"),
            )
            .unwrap_err();
        assert!(matches!(err, PaginationError::AmbiguousFieldReference(_)));
    }

    #[test]
    fn test_qualify_defaults_to_base_alias() {
        let mut scope = users();
        assert_eq!(scope.qualify("status").unwrap(), ColumnRef::new("User", "status"));
        assert!(scope.qualify("OrganizationMembership.status").is_err());

        join_memberships(&mut scope).unwrap();
        assert_eq!(
            scope.qualify("OrganizationMembership.status").unwrap(),
            ColumnRef::new("OrganizationMembership", "status")
        );
    }

    #[test]
    fn test_select_and_where_accumulate() {
        let mut scope = users();
        scope
            .select(ColumnRef::new("User", "user_id"))
            .select(ColumnRef::new("User", "user_id"))
            .and_where(Predicate::True)
            .and_where(Predicate::compare(
                ColumnRef::new("User", "status"),
                CompareOp::Eq,
                Scalar::from("active"),
            ));

        assert_eq!(scope.selection().len(), 1);
        assert_eq!(scope.predicates().len(), 1);
    }
}
