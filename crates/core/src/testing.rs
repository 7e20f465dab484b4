//! In-memory [`ScopeExecutor`] for tests.
//!
//! Evaluates query plans over rows held in memory with the same semantics
//! the PostgreSQL adapter renders: joins, `DISTINCT` projection, nulls
//! last in ascending order, per-partition limits and grouped counts.
//! Every executor call counts as one round trip.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::models::{Record, Scalar};
use crate::ports::{ScopeExecutor, SortOrder};
use crate::query::{
    ColumnRef, CompareOp, ContainsStrategy, CountQuery, JoinKind, OrderTerm, PartitionedQuery,
    Predicate, Scope, SelectQuery,
};

type Row = BTreeMap<String, Scalar>;

#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<BTreeMap<String, Vec<Row>>>,
    round_trips: AtomicUsize,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row to `table`; columns are unqualified names.
    pub fn insert<K: Into<String>>(&self, table: &str, row: impl IntoIterator<Item = (K, Scalar)>) {
        let row: Row = row.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Executor calls made so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(AtomicOrdering::SeqCst)
    }

    pub fn reset_round_trips(&self) {
        self.round_trips.store(0, AtomicOrdering::SeqCst);
    }

    fn round_trip(&self) {
        self.round_trips.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Rows of the scope's joins, before filtering, keyed `Alias.column`.
    fn materialize(&self, scope: &Scope) -> Vec<Record> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Record> = rows_of(&tables, scope.table())
            .iter()
            .map(|row| qualify(scope.alias(), row))
            .collect();

        for join in scope.joins() {
            let right = rows_of(&tables, &join.table);
            let mut joined = Vec::new();
            for row in rows {
                let mut matched = false;
                for candidate in right {
                    let mut merged = row.clone();
                    for (k, v) in qualify(&join.alias, candidate).iter() {
                        merged.insert(k, v.clone());
                    }
                    let on = merged
                        .value(&join.left.output_name())
                        .compare(merged.value(&join.right.output_name()));
                    if on == Some(Ordering::Equal) {
                        joined.push(merged);
                        matched = true;
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    joined.push(row);
                }
            }
            rows = joined;
        }
        rows
    }

    /// Filtered, projected, de-duplicated rows.
    fn select(&self, scope: &Scope, seek: Option<&Predicate>) -> Vec<Record> {
        let filter = scope.filter();
        let mut out: Vec<Record> = Vec::new();
        for row in self.materialize(scope) {
            if !evaluate(&filter, &row) || !seek.is_none_or(|s| evaluate(s, &row)) {
                continue;
            }
            let projected = project(&row, scope.selection());
            if !out.contains(&projected) {
                out.push(projected);
            }
        }
        out
    }

    fn matching(&self, scope: &Scope) -> Vec<Record> {
        let filter = scope.filter();
        self.materialize(scope)
            .into_iter()
            .filter(|row| evaluate(&filter, row))
            .collect()
    }
}

#[async_trait]
impl ScopeExecutor for MemoryExecutor {
    async fn fetch(&self, query: &SelectQuery<'_>) -> StorageResult<Vec<Record>> {
        self.round_trip();
        let mut rows = self.select(query.scope, query.seek.as_ref());
        sort_rows(&mut rows, &query.order_by);
        rows.truncate(query.limit as usize);
        Ok(rows)
    }

    async fn count(&self, query: &CountQuery<'_>) -> StorageResult<u64> {
        self.round_trip();
        let key = query.distinct_on.output_name();
        let rows = self.matching(query.scope);
        let distinct = distinct_values(rows.iter().map(|r| r.value(&key)));
        Ok(distinct.len() as u64)
    }

    async fn fetch_partitioned(&self, query: &PartitionedQuery<'_>) -> StorageResult<Vec<Record>> {
        self.round_trip();
        let pivot = query.partition_by.output_name();
        let mut groups: Vec<(Scalar, Vec<Record>)> = Vec::new();
        for row in self.select(query.scope, query.seek.as_ref()) {
            let value = row.value(&pivot).clone();
            match groups.iter_mut().find(|(k, _)| *k == value) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((value, vec![row])),
            }
        }

        let mut out = Vec::new();
        for (_, mut rows) in groups {
            sort_rows(&mut rows, &query.order_by);
            out.extend(rows.into_iter().take(query.per_partition_limit as usize));
        }
        Ok(out)
    }

    async fn count_grouped(&self, query: &CountQuery<'_>) -> StorageResult<Vec<(Scalar, u64)>> {
        self.round_trip();
        let key = query.distinct_on.output_name();
        let group_key = query
            .group_by
            .as_ref()
            .map(ColumnRef::output_name)
            .unwrap_or_default();

        let mut groups: Vec<(Scalar, Vec<Scalar>)> = Vec::new();
        for row in self.matching(query.scope) {
            let group = row.value(&group_key).clone();
            let value = row.value(&key).clone();
            match groups.iter_mut().find(|(g, _)| *g == group) {
                Some((_, values)) => values.push(value),
                None => groups.push((group, vec![value])),
            }
        }
        Ok(groups
            .into_iter()
            .map(|(group, values)| (group, distinct_values(values.iter()).len() as u64))
            .collect())
    }
}

fn rows_of<'t>(tables: &'t BTreeMap<String, Vec<Row>>, table: &str) -> &'t [Row] {
    tables.get(table).map(Vec::as_slice).unwrap_or(&[])
}

fn qualify(alias: &str, row: &Row) -> Record {
    row.iter()
        .map(|(column, value)| (format!("{alias}.{column}"), value.clone()))
        .collect()
}

fn project(row: &Record, selection: &[ColumnRef]) -> Record {
    selection
        .iter()
        .map(|column| {
            let name = column.output_name();
            let value = row.value(&name).clone();
            (name, value)
        })
        .collect()
}

fn distinct_values<'a>(values: impl Iterator<Item = &'a Scalar>) -> Vec<&'a Scalar> {
    let mut out: Vec<&Scalar> = Vec::new();
    for value in values {
        if !value.is_null() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn sort_rows(rows: &mut [Record], order_by: &[OrderTerm]) {
    rows.sort_by(|a, b| {
        for term in order_by {
            let name = term.column.output_name();
            let ord = a.value(&name).sort_cmp(b.value(&name));
            let ord = match term.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// SQL semantics without `NOT`: any comparison with null is false.
fn evaluate(predicate: &Predicate, row: &Record) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::False => false,
        Predicate::Compare { column, op, value } => {
            let Some(ord) = row.value(&column.output_name()).compare(value) else {
                return false;
            };
            match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Neq => ord != Ordering::Equal,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Gte => ord != Ordering::Less,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
            }
        }
        Predicate::In { column, values } => {
            let actual = row.value(&column.output_name());
            values.iter().any(|v| actual.compare(v) == Some(Ordering::Equal))
        }
        Predicate::Contains {
            column,
            needle,
            strategy,
        } => {
            let Some(text) = row.value(&column.output_name()).as_text() else {
                return false;
            };
            match strategy {
                ContainsStrategy::Substring => text.contains(needle.as_str()),
                ContainsStrategy::Trigram { threshold } => similarity(text, needle) >= *threshold,
            }
        }
        Predicate::IsNull(column) => row.value(&column.output_name()).is_null(),
        Predicate::IsNotNull(column) => !row.value(&column.output_name()).is_null(),
        Predicate::And(members) => members.iter().all(|m| evaluate(m, row)),
        Predicate::Or(members) => members.iter().any(|m| evaluate(m, row)),
    }
}

/// pg_trgm style trigram similarity: shared trigrams over all trigrams.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (left, right) = (trigrams(a), trigrams(b));
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

fn trigrams(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let lower = text.to_lowercase();
    for word in lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let padded: Vec<char> = format!("  {word} ").chars().collect();
        for window in padded.windows(3) {
            out.insert(window.iter().collect());
        }
    }
    out
}

// =============================================================================
// Fixtures
// =============================================================================

/// Ids of the rows seeded by [`seed_school`], in insertion order.
#[derive(Debug, Clone)]
pub struct SchoolFixture {
    pub users: Vec<Uuid>,
    pub organizations: Vec<Uuid>,
    pub classes: Vec<Uuid>,
}

pub const GIVEN_NAMES: [&str; 10] = [
    "Ann", "Bob", "Cid", "Dee", "Eve", "Fay", "Gus", "Hal", "Ivy", "Jon",
];

/// Seed a small school:
///
/// - 10 users; ids sort in insertion order, Dee (3) and Hal (7) inactive
/// - 3 organizations; Alpha has users 0..=5, Beta users 4..=9, Gamma none
/// - Alpha's membership of Ann (0) is inactive
/// - Ann and Bob study class 0, Cid teaches class 0, Dee teaches class 1
pub fn seed_school(exec: &MemoryExecutor) -> SchoolFixture {
    let users: Vec<Uuid> = (0..10).map(|i| Uuid::from_u128(0x1000 + i)).collect();
    let organizations: Vec<Uuid> = (0..3).map(|i| Uuid::from_u128(0x2000 + i)).collect();
    let classes: Vec<Uuid> = (0..2).map(|i| Uuid::from_u128(0x3000 + i)).collect();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).single().unwrap_or_default();

    for (i, id) in users.iter().enumerate() {
        let given = GIVEN_NAMES[i];
        let status = if i == 3 || i == 7 { "inactive" } else { "active" };
        exec.insert(
            "users",
            [
                ("user_id", Scalar::Uuid(*id)),
                ("given_name", Scalar::from(given)),
                ("family_name", Scalar::from(if i % 2 == 0 { "Smith" } else { "Jones" })),
                ("email", Scalar::from(format!("{}@school.test", given.to_lowercase()))),
                ("phone", Scalar::from((i % 2 == 0).then(|| format!("+4420000000{i}")))),
                ("status", Scalar::from(status)),
                ("date_of_birth", Scalar::Null),
                ("gender", Scalar::Null),
                ("created_at", Scalar::Timestamp(start + Duration::days(i as i64))),
            ],
        );
    }

    let org_rows = [
        ("Alpha Academy", "active", Some(users[0])),
        ("Beta School", "active", Some(users[1])),
        ("Gamma College", "inactive", None),
    ];
    for (i, (name, status, owner)) in org_rows.into_iter().enumerate() {
        exec.insert(
            "organizations",
            [
                ("organization_id", Scalar::Uuid(organizations[i])),
                ("organization_name", Scalar::from(name)),
                ("status", Scalar::from(status)),
                ("owner_user_id", Scalar::from(owner)),
                ("created_at", Scalar::Timestamp(start)),
            ],
        );
    }

    let memberships = (0..=5)
        .map(|u| (0, u))
        .chain((4..=9).map(|u| (1, u)));
    for (org, user) in memberships {
        let status = if (org, user) == (0, 0) { "inactive" } else { "active" };
        exec.insert(
            "organization_memberships",
            [
                ("organization_id", Scalar::Uuid(organizations[org])),
                ("user_id", Scalar::Uuid(users[user])),
                ("status", Scalar::from(status)),
            ],
        );
    }

    for (table, user, class) in [
        ("user_classes_studying", 0, 0),
        ("user_classes_studying", 1, 0),
        ("user_classes_teaching", 2, 0),
        ("user_classes_teaching", 3, 1),
    ] {
        exec.insert(
            table,
            [
                ("user_id", Scalar::Uuid(users[user])),
                ("class_id", Scalar::Uuid(classes[class])),
            ],
        );
    }

    SchoolFixture {
        users,
        organizations,
        classes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("word", "word"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        // "word" / "two words": 4 trigrammes communs sur 11 au total
        let s = similarity("word", "two words");
        assert!((s - 4.0 / 11.0).abs() < 1e-9, "{s}");
    }

    #[tokio::test]
    async fn test_left_join_keeps_unmatched_rows() {
        let exec = MemoryExecutor::new();
        exec.insert("a", [("id", Scalar::Int(1))]);
        exec.insert("a", [("id", Scalar::Int(2))]);
        exec.insert("b", [("a_id", Scalar::Int(1)), ("tag", Scalar::from("x"))]);
        exec.insert("b", [("a_id", Scalar::Int(1)), ("tag", Scalar::from("y"))]);

        let mut scope = Scope::new("a", "A");
        scope
            .left_join("b", "B", ColumnRef::new("A", "id"), ColumnRef::new("B", "a_id"))
            .unwrap();
        scope.select(ColumnRef::new("A", "id"));

        let query = SelectQuery {
            scope: &scope,
            seek: None,
            order_by: vec![OrderTerm {
                column: ColumnRef::new("A", "id"),
                order: SortOrder::Asc,
            }],
            limit: 10,
        };
        // DISTINCT: la ligne 1 jointe deux fois n'apparaît qu'une fois
        let rows = exec.fetch(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("A.id"), &Scalar::Int(1));
        assert_eq!(rows[1].value("A.id"), &Scalar::Int(2));

        let count = CountQuery {
            scope: &scope,
            distinct_on: ColumnRef::new("A", "id"),
            group_by: None,
        };
        assert_eq!(exec.count(&count).await.unwrap(), 2);
        assert_eq!(exec.round_trips(), 2);
    }
}
