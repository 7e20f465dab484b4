//! Executable query plans handed to a [`crate::ports::ScopeExecutor`].
//!
//! Plans borrow the scope they were built from; the executor renders or
//! evaluates them but never rewrites them.

use crate::ports::SortOrder;
use crate::query::{ColumnRef, Predicate, Scope};

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub order: SortOrder,
}

/// `SELECT DISTINCT <selection> ... WHERE <scope> AND <seek> ORDER BY .. LIMIT ..`
#[derive(Debug, Clone)]
pub struct SelectQuery<'a> {
    pub scope: &'a Scope,
    pub seek: Option<Predicate>,
    pub order_by: Vec<OrderTerm>,
    pub limit: u32,
}

/// `COUNT(DISTINCT key)` over the scope, optionally grouped by a column.
///
/// Seek predicates and limits never apply to counts.
#[derive(Debug, Clone)]
pub struct CountQuery<'a> {
    pub scope: &'a Scope,
    pub distinct_on: ColumnRef,
    pub group_by: Option<ColumnRef>,
}

/// Per-partition page: rows numbered with
/// `ROW_NUMBER() OVER (PARTITION BY partition_by ORDER BY order_by)` and
/// kept while the row number is at most `per_partition_limit`.
#[derive(Debug, Clone)]
pub struct PartitionedQuery<'a> {
    pub scope: &'a Scope,
    pub seek: Option<Predicate>,
    pub partition_by: ColumnRef,
    pub order_by: Vec<OrderTerm>,
    pub per_partition_limit: u32,
}
