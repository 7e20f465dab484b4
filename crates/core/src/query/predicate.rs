//! Column references and boolean predicates over a scope.

use std::fmt;

use crate::models::Scalar;

/// A column qualified by the alias of the table it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parse `"Alias.column"` or `"column"`; bare columns belong to
    /// `default_table`.
    ///
    /// Returns `None` for empty segments or more than one dot.
    pub fn parse(path: &str, default_table: &str) -> Option<Self> {
        let mut parts = path.split('.');
        let (table, column) = match (parts.next(), parts.next(), parts.next()) {
            (Some(column), None, None) => (default_table, column),
            (Some(table), Some(column), None) => (table, column),
            _ => return None,
        };
        if table.is_empty() || column.is_empty() {
            return None;
        }
        Some(Self::new(table, column))
    }

    /// Key under which the column appears in a fetched record.
    pub fn output_name(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Comparison operators usable in predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// How the `contains` filter operator matches text.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ContainsStrategy {
    /// Case-sensitive substring match (`LIKE '%needle%'`).
    #[default]
    Substring,
    /// pg_trgm `similarity(column, needle) >= threshold`.
    Trigram { threshold: f64 },
}

/// Boolean condition over the columns of a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    False,
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Scalar,
    },
    In {
        column: ColumnRef,
        values: Vec<Scalar>,
    },
    Contains {
        column: ColumnRef,
        needle: String,
        strategy: ContainsStrategy,
    },
    IsNull(ColumnRef),
    IsNotNull(ColumnRef),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(column: ColumnRef, op: CompareOp, value: Scalar) -> Self {
        Self::Compare { column, op, value }
    }

    /// Conjunction; `True` members are dropped and an empty list is `True`.
    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut members = Vec::new();
        for predicate in predicates {
            match predicate {
                Self::True => {}
                Self::False => return Self::False,
                Self::And(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        match members.len() {
            0 => Self::True,
            1 => members.remove(0),
            _ => Self::And(members),
        }
    }

    /// Disjunction; `False` members are dropped and an empty list is `False`.
    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut members = Vec::new();
        for predicate in predicates {
            match predicate {
                Self::False => {}
                Self::True => return Self::True,
                Self::Or(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        match members.len() {
            0 => Self::False,
            1 => members.remove(0),
            _ => Self::Or(members),
        }
    }

    /// Every column the predicate reads.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Self::True | Self::False => {}
            Self::Compare { column, .. }
            | Self::In { column, .. }
            | Self::Contains { column, .. }
            | Self::IsNull(column)
            | Self::IsNotNull(column) => out.push(column),
            Self::And(members) | Self::Or(members) => {
                for member in members {
                    member.collect_columns(out);
                }
            }
        }
    }
}
