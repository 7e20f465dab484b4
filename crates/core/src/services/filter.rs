//! Filter compiler.
//!
//! Caller filters arrive as a [`FilterExpr`] tree over public field names.
//! The compiler resolves every field through the entity's
//! [`FieldRegistry`], checks operator and value types, and produces a
//! [`Predicate`] over qualified columns. Nothing from the caller is ever
//! spliced into SQL: column names come from the registry and values are
//! bound by the executor.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{PaginationError, PaginationResult};
use crate::models::Scalar;
use crate::query::{CompareOp, ContainsStrategy, Predicate, Scope};

// =============================================================================
// Filter Expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Neq,
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
        }
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self {
            Self::Eq => Some(CompareOp::Eq),
            Self::Neq => Some(CompareOp::Neq),
            Self::Gt => Some(CompareOp::Gt),
            Self::Gte => Some(CompareOp::Gte),
            Self::Lt => Some(CompareOp::Lt),
            Self::Lte => Some(CompareOp::Lte),
            Self::Contains | Self::In => None,
        }
    }
}

impl FromStr for FilterOperator {
    type Err = PaginationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "contains" => Ok(Self::Contains),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "in" => Ok(Self::In),
            other => Err(PaginationError::UnknownOperator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Single(Scalar),
    List(Vec<Scalar>),
}

/// Generates `From<T> for FilterValue` for single values.
macro_rules! filter_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(value: $ty) -> Self {
                    Self::Single(value.into())
                }
            }
        )*
    };
}

filter_value_from!(Scalar, bool, i64, f64, String, &str, Uuid, DateTime<Utc>);

impl From<Vec<Scalar>> for FilterValue {
    fn from(values: Vec<Scalar>) -> Self {
        Self::List(values)
    }
}

impl FilterValue {
    pub fn list<T: Into<Scalar>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterLeaf {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

/// Caller filter: leaves combined with AND/OR groups.
///
/// An empty AND matches every row; an empty OR matches none.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Leaf(FilterLeaf),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn leaf(field: impl Into<String>, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        Self::Leaf(FilterLeaf {
            field: field.into(),
            operator,
            value: value.into(),
        })
    }

    /// Whether any leaf, at any depth, filters on `field`.
    pub fn references(&self, field: &str) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.field == field,
            Self::And(members) | Self::Or(members) => members.iter().any(|m| m.references(field)),
        }
    }
}

/// Parses the JSON input form:
/// `{ "<field>": { "operator": "eq", "value": .. }, "AND": [..], "OR": [..] }`.
///
/// Several keys in one object are combined with AND.
impl TryFrom<&Value> for FilterExpr {
    type Error = PaginationError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid("filter", "expected an object"))?;

        let mut members = Vec::with_capacity(object.len());
        for (key, entry) in object {
            match key.as_str() {
                "AND" | "OR" => {
                    let children = entry
                        .as_array()
                        .ok_or_else(|| invalid(key, "expected a list of filters"))?
                        .iter()
                        .map(FilterExpr::try_from)
                        .collect::<PaginationResult<Vec<_>>>()?;
                    members.push(if key == "AND" {
                        Self::And(children)
                    } else {
                        Self::Or(children)
                    });
                }
                field => {
                    let condition = entry
                        .as_object()
                        .ok_or_else(|| invalid(field, "expected {operator, value}"))?;
                    let operator = condition
                        .get("operator")
                        .and_then(Value::as_str)
                        .ok_or_else(|| invalid(field, "missing operator"))?
                        .parse::<FilterOperator>()?;
                    let raw = condition
                        .get("value")
                        .ok_or_else(|| invalid(field, "missing value"))?;
                    members.push(Self::leaf(field, operator, json_value(field, raw)?));
                }
            }
        }

        if members.len() == 1 {
            Ok(members.remove(0))
        } else {
            Ok(Self::And(members))
        }
    }
}

fn json_scalar(field: &str, value: &Value) -> PaginationResult<Scalar> {
    match value {
        Value::Null => Ok(Scalar::Null),
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::String(s) => Ok(Scalar::Text(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(Scalar::Int)
            .or_else(|| n.as_f64().map(Scalar::Float))
            .ok_or_else(|| invalid(field, "number out of range")),
        Value::Array(_) | Value::Object(_) => Err(invalid(field, "expected a scalar value")),
    }
}

fn json_value(field: &str, value: &Value) -> PaginationResult<FilterValue> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| json_scalar(field, item))
            .collect::<PaginationResult<Vec<_>>>()
            .map(FilterValue::List),
        other => json_scalar(field, other).map(FilterValue::Single),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> PaginationError {
    PaginationError::InvalidFilterValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

// =============================================================================
// Field Registry
// =============================================================================

/// Type filter values are checked and coerced against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Uuid,
    Int,
    Float,
    Bool,
    Timestamp,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Uuid => "uuid",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
        }
    }

    /// Whether `value` is a non-null value of this kind.
    pub fn accepts(&self, value: &Scalar) -> bool {
        matches!(
            (self, value),
            (Self::Text, Scalar::Text(_))
                | (Self::Uuid, Scalar::Uuid(_))
                | (Self::Int, Scalar::Int(_))
                | (Self::Float, Scalar::Float(_) | Scalar::Int(_))
                | (Self::Bool, Scalar::Bool(_))
                | (Self::Timestamp, Scalar::Timestamp(_))
        )
    }
}

/// Column(s) a public field name resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTarget {
    Column(String),
    /// Matches when any of the columns matches.
    AnyOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub target: FieldTarget,
    pub kind: ValueKind,
}

/// Public filter field names of one entity.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: BTreeMap<String, FieldSpec>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, path: impl Into<String>, kind: ValueKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                target: FieldTarget::Column(path.into()),
                kind,
            },
        );
        self
    }

    pub fn any_of<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        paths: impl IntoIterator<Item = S>,
        kind: ValueKind,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                target: FieldTarget::AnyOf(paths.into_iter().map(Into::into).collect()),
                kind,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }
}

// =============================================================================
// Compiler
// =============================================================================

pub struct FilterCompiler<'a> {
    registry: &'a FieldRegistry,
    contains: ContainsStrategy,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(registry: &'a FieldRegistry, contains: ContainsStrategy) -> Self {
        Self { registry, contains }
    }

    /// Compile `expr` against the columns reachable from `scope`.
    ///
    /// Joins needed by the referenced fields must already be on the scope.
    pub fn compile(&self, expr: &FilterExpr, scope: &Scope) -> PaginationResult<Predicate> {
        match expr {
            FilterExpr::Leaf(leaf) => self.compile_leaf(leaf, scope),
            FilterExpr::And(members) => Ok(Predicate::and(
                members
                    .iter()
                    .map(|m| self.compile(m, scope))
                    .collect::<PaginationResult<Vec<_>>>()?,
            )),
            FilterExpr::Or(members) => Ok(Predicate::or(
                members
                    .iter()
                    .map(|m| self.compile(m, scope))
                    .collect::<PaginationResult<Vec<_>>>()?,
            )),
        }
    }

    /// Compile `expr` and attach it to `scope`.
    pub fn apply(&self, expr: &FilterExpr, scope: &mut Scope) -> PaginationResult<()> {
        let predicate = self.compile(expr, scope)?;
        scope.and_where(predicate);
        Ok(())
    }

    fn compile_leaf(&self, leaf: &FilterLeaf, scope: &Scope) -> PaginationResult<Predicate> {
        let field = leaf.field.as_str();
        let spec = self
            .registry
            .get(field)
            .ok_or_else(|| PaginationError::UnknownFilterField(field.to_string()))?;

        let paths: &[String] = match &spec.target {
            FieldTarget::Column(path) => std::slice::from_ref(path),
            FieldTarget::AnyOf(paths) => paths,
        };
        let columns = paths
            .iter()
            .map(|p| scope.qualify(p))
            .collect::<PaginationResult<Vec<_>>>()?;

        let op = match (leaf.operator, &leaf.value) {
            (FilterOperator::In, FilterValue::List(values)) => LeafOp::In(
                values
                    .iter()
                    .map(|v| coerce(field, spec.kind, v))
                    .collect::<PaginationResult<Vec<_>>>()?,
            ),
            (FilterOperator::In, FilterValue::Single(_)) => {
                return Err(invalid(field, "operator in expects a list"));
            }
            (operator, FilterValue::List(_)) => {
                return Err(invalid(
                    field,
                    format!("operator {} expects a single value", operator.as_str()),
                ));
            }
            (FilterOperator::Contains, FilterValue::Single(value)) => {
                if spec.kind != ValueKind::Text {
                    return Err(invalid(field, "contains only applies to text fields"));
                }
                match coerce(field, spec.kind, value)? {
                    Scalar::Text(needle) => LeafOp::Contains(needle),
                    other => {
                        return Err(invalid(field, format!("expected text, got {}", other.kind_name())));
                    }
                }
            }
            (operator, FilterValue::Single(value)) => {
                let op = operator
                    .compare_op()
                    .ok_or_else(|| PaginationError::UnknownOperator(operator.as_str().to_string()))?;
                if spec.kind == ValueKind::Bool && !matches!(op, CompareOp::Eq | CompareOp::Neq) {
                    return Err(invalid(field, "boolean fields only support eq and neq"));
                }
                LeafOp::Compare(op, coerce(field, spec.kind, value)?)
            }
        };

        let strategy = self.contains;
        Ok(Predicate::or(columns.into_iter().map(|column| match &op {
            LeafOp::Compare(op, value) => Predicate::compare(column, *op, value.clone()),
            LeafOp::In(values) if values.is_empty() => Predicate::False,
            LeafOp::In(values) => Predicate::In {
                column,
                values: values.clone(),
            },
            LeafOp::Contains(needle) => Predicate::Contains {
                column,
                needle: needle.clone(),
                strategy,
            },
        })))
    }
}

/// Validated leaf, applied to each column of its field.
enum LeafOp {
    Compare(CompareOp, Scalar),
    In(Vec<Scalar>),
    Contains(String),
}

/// Check `value` against `kind`, parsing text into richer types.
fn coerce(field: &str, kind: ValueKind, value: &Scalar) -> PaginationResult<Scalar> {
    match (kind, value) {
        (_, Scalar::Null) => Err(invalid(field, "null is not a valid filter value")),
        (ValueKind::Text, Scalar::Text(_))
        | (ValueKind::Uuid, Scalar::Uuid(_))
        | (ValueKind::Int, Scalar::Int(_))
        | (ValueKind::Float, Scalar::Float(_))
        | (ValueKind::Bool, Scalar::Bool(_))
        | (ValueKind::Timestamp, Scalar::Timestamp(_)) => Ok(value.clone()),
        (ValueKind::Uuid, Scalar::Text(s)) => Uuid::parse_str(s)
            .map(Scalar::Uuid)
            .map_err(|_| invalid(field, format!("{s} is not a valid UUID"))),
        (ValueKind::Float, Scalar::Int(i)) => Ok(Scalar::Float(*i as f64)),
        (ValueKind::Timestamp, Scalar::Text(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Scalar::Timestamp(dt.with_timezone(&Utc)))
            .map_err(|_| invalid(field, format!("{s} is not an RFC 3339 timestamp"))),
        _ => Err(invalid(
            field,
            format!("expected {}, got {}", kind.as_str(), value.kind_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ColumnRef;
    use serde_json::json;

    fn registry() -> FieldRegistry {
        FieldRegistry::new()
            .field("userId", "user_id", ValueKind::Uuid)
            .field("givenName", "given_name", ValueKind::Text)
            .field("status", "status", ValueKind::Text)
            .field("organizationUserStatus", "OrganizationMembership.status", ValueKind::Text)
            .field("createdAt", "created_at", ValueKind::Timestamp)
            .any_of(
                "classId",
                ["ClassStudying.class_id", "ClassTeaching.class_id"],
                ValueKind::Uuid,
            )
    }

    fn scope() -> Scope {
        Scope::new("users", "User")
    }

    fn compile(expr: &FilterExpr, scope: &Scope) -> PaginationResult<Predicate> {
        FilterCompiler::new(&registry(), ContainsStrategy::Substring).compile(expr, scope)
    }

    fn col(table: &str, column: &str) -> ColumnRef {
        ColumnRef::new(table, column)
    }

    #[test]
    fn test_parse_json_form() {
        let input = json!({
            "givenName": {"operator": "contains", "value": "an"},
            "OR": [
                {"status": {"operator": "eq", "value": "active"}},
                {"status": {"operator": "eq", "value": "inactive"}}
            ]
        });
        let expr = FilterExpr::try_from(&input).unwrap();

        // serde_json trie les clés: "OR" avant "givenName"
        assert_eq!(
            expr,
            FilterExpr::And(vec![
                FilterExpr::Or(vec![
                    FilterExpr::leaf("status", FilterOperator::Eq, "active"),
                    FilterExpr::leaf("status", FilterOperator::Eq, "inactive"),
                ]),
                FilterExpr::leaf("givenName", FilterOperator::Contains, "an"),
            ])
        );
        assert!(expr.references("status"));
        assert!(!expr.references("userId"));
    }

    #[test]
    fn test_parse_rejects_unknown_operator() {
        let input = json!({"givenName": {"operator": "like", "value": "x"}});
        let err = FilterExpr::try_from(&input).unwrap_err();
        assert!(matches!(err, PaginationError::UnknownOperator(op) if op == "like"));
    }

    #[test]
    fn test_parse_empty_object_matches_everything() {
        let expr = FilterExpr::try_from(&json!({})).unwrap();
        assert_eq!(compile(&expr, &scope()).unwrap(), Predicate::True);
        assert_eq!(compile(&FilterExpr::Or(vec![]), &scope()).unwrap(), Predicate::False);
    }

    // Test critique: un champ nu est qualifié avec l'alias de base
    // (sinon "status" est ambigu dès qu'une table jointe a aussi "status")
    #[test]
    fn test_bare_field_qualified_with_base_alias() {
        let expr = FilterExpr::leaf("status", FilterOperator::Eq, "inactive");
        assert_eq!(
            compile(&expr, &scope()).unwrap(),
            Predicate::compare(col("User", "status"), CompareOp::Eq, Scalar::from("inactive"))
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let expr = FilterExpr::leaf("password", FilterOperator::Eq, "x");
        let err = compile(&expr, &scope()).unwrap_err();
        assert!(matches!(err, PaginationError::UnknownFilterField(f) if f == "password"));
    }

    #[test]
    fn test_field_on_missing_join_rejected() {
        let expr = FilterExpr::leaf("organizationUserStatus", FilterOperator::Eq, "active");
        let err = compile(&expr, &scope()).unwrap_err();
        assert!(matches!(err, PaginationError::AmbiguousFieldReference(_)));
    }

    #[test]
    fn test_uuid_values_are_parsed() {
        let id = Uuid::new_v4();
        let expr = FilterExpr::leaf("userId", FilterOperator::Eq, id.to_string());
        assert_eq!(
            compile(&expr, &scope()).unwrap(),
            Predicate::compare(col("User", "user_id"), CompareOp::Eq, Scalar::Uuid(id))
        );

        let bad = FilterExpr::leaf("userId", FilterOperator::Eq, "not-a-uuid");
        assert!(matches!(
            compile(&bad, &scope()).unwrap_err(),
            PaginationError::InvalidFilterValue { .. }
        ));
    }

    #[test]
    fn test_value_shape_checked_against_operator() {
        let cases = [
            FilterExpr::leaf("userId", FilterOperator::In, Uuid::new_v4()),
            FilterExpr::leaf("givenName", FilterOperator::Eq, FilterValue::list(["a", "b"])),
            FilterExpr::leaf("createdAt", FilterOperator::Contains, "2024"),
            FilterExpr::leaf("givenName", FilterOperator::Eq, Scalar::Null),
            FilterExpr::leaf("givenName", FilterOperator::Gt, 3_i64),
        ];
        for expr in cases {
            let err = compile(&expr, &scope()).unwrap_err();
            assert!(
                matches!(err, PaginationError::InvalidFilterValue { .. }),
                "{expr:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let expr = FilterExpr::leaf("userId", FilterOperator::In, FilterValue::List(vec![]));
        assert_eq!(compile(&expr, &scope()).unwrap(), Predicate::False);
    }

    #[test]
    fn test_any_of_expands_to_or() {
        let mut scope = scope();
        for alias in ["ClassStudying", "ClassTeaching"] {
            scope
                .left_join(
                    "user_classes",
                    alias,
                    col("User", "user_id"),
                    col(alias, "user_id"),
                )
                .unwrap();
        }
        let id = Uuid::new_v4();
        let expr = FilterExpr::leaf("classId", FilterOperator::Eq, id.to_string());
        assert_eq!(
            compile(&expr, &scope).unwrap(),
            Predicate::Or(vec![
                Predicate::compare(col("ClassStudying", "class_id"), CompareOp::Eq, Scalar::Uuid(id)),
                Predicate::compare(col("ClassTeaching", "class_id"), CompareOp::Eq, Scalar::Uuid(id)),
            ])
        );
    }

    #[test]
    fn test_contains_uses_configured_strategy() {
        let registry = registry();
        let compiler = FilterCompiler::new(&registry, ContainsStrategy::Trigram { threshold: 0.3 });
        let expr = FilterExpr::leaf("givenName", FilterOperator::Contains, "ann");
        assert_eq!(
            compiler.compile(&expr, &scope()).unwrap(),
            Predicate::Contains {
                column: col("User", "given_name"),
                needle: "ann".into(),
                strategy: ContainsStrategy::Trigram { threshold: 0.3 },
            }
        );
    }

    #[test]
    fn test_apply_attaches_predicate() {
        let mut scope = scope();
        let registry = registry();
        FilterCompiler::new(&registry, ContainsStrategy::Substring)
            .apply(&FilterExpr::leaf("status", FilterOperator::Neq, "inactive"), &mut scope)
            .unwrap();
        assert_eq!(scope.predicates().len(), 1);
    }
}
