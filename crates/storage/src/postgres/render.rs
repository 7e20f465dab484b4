//! Query plan rendering to PostgreSQL.
//!
//! Identifiers come from entity definitions and are always quoted; every
//! value is bound as a parameter. Projected columns are aliased with their
//! output name (`"User"."email" AS "User.email"`), which is also what
//! `ORDER BY` and the window clause refer to.

use sqlx::{Postgres, QueryBuilder};

use roster_core::models::Scalar;
use roster_core::query::{
    ColumnRef, ContainsStrategy, CountQuery, OrderTerm, PartitionedQuery, Predicate, Scope,
    SelectQuery,
};

pub type PgQuery = QueryBuilder<'static, Postgres>;

const ROW_NUMBER_ALIAS: &str = "__row";

/// `SELECT DISTINCT ... ORDER BY ... LIMIT n`.
pub fn select(query: &SelectQuery<'_>) -> PgQuery {
    let mut qb = QueryBuilder::new("");
    push_distinct_select(&mut qb, query.scope, query.seek.as_ref());
    push_order_by(&mut qb, &query.order_by);
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(query.limit));
    qb
}

/// `COUNT(DISTINCT pk)`, optionally grouped.
pub fn count(query: &CountQuery<'_>) -> PgQuery {
    let mut qb = QueryBuilder::new("SELECT ");
    if let Some(group) = &query.group_by {
        push_column(&mut qb, group);
        qb.push(", ");
    }
    qb.push("COUNT(DISTINCT ");
    push_column(&mut qb, &query.distinct_on);
    qb.push(")");
    push_from(&mut qb, query.scope);
    push_where(&mut qb, query.scope.filter());
    if let Some(group) = &query.group_by {
        qb.push(" GROUP BY ");
        push_column(&mut qb, group);
    }
    qb
}

/// First `per_partition_limit` rows of every partition.
///
/// ```text
/// SELECT <outputs> FROM (
///     SELECT page.*, ROW_NUMBER() OVER (PARTITION BY <pivot> ORDER BY <key>) AS "__row"
///     FROM (SELECT DISTINCT ...) AS page
/// ) AS ranked
/// WHERE "__row" <= $n
/// ```
pub fn partitioned(query: &PartitionedQuery<'_>) -> PgQuery {
    let mut qb = QueryBuilder::new("SELECT ");
    push_outputs(&mut qb, query.scope.selection());
    qb.push(" FROM (SELECT page.*, ROW_NUMBER() OVER (PARTITION BY ");
    push_ident(&mut qb, &query.partition_by.output_name());
    push_order_by(&mut qb, &query.order_by);
    qb.push(") AS ");
    push_ident(&mut qb, ROW_NUMBER_ALIAS);
    qb.push(" FROM (");
    push_distinct_select(&mut qb, query.scope, query.seek.as_ref());
    qb.push(") AS page) AS ranked WHERE ");
    push_ident(&mut qb, ROW_NUMBER_ALIAS);
    qb.push(" <= ");
    qb.push_bind(i64::from(query.per_partition_limit));
    qb.push(" ORDER BY ");
    push_ident(&mut qb, &query.partition_by.output_name());
    qb.push(", ");
    push_ident(&mut qb, ROW_NUMBER_ALIAS);
    qb
}

fn push_distinct_select(qb: &mut PgQuery, scope: &Scope, seek: Option<&Predicate>) {
    qb.push("SELECT DISTINCT ");
    let mut first = true;
    for column in scope.selection() {
        if !first {
            qb.push(", ");
        }
        first = false;
        push_column(qb, column);
        qb.push(" AS ");
        push_ident(qb, &column.output_name());
    }
    push_from(qb, scope);
    let filter = match seek {
        Some(seek) => Predicate::and([scope.filter(), seek.clone()]),
        None => scope.filter(),
    };
    push_where(qb, filter);
}

fn push_outputs(qb: &mut PgQuery, selection: &[ColumnRef]) {
    for (i, column) in selection.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_ident(qb, &column.output_name());
    }
}

fn push_from(qb: &mut PgQuery, scope: &Scope) {
    qb.push(" FROM ");
    push_ident(qb, scope.table());
    qb.push(" AS ");
    push_ident(qb, scope.alias());
    for join in scope.joins() {
        qb.push(" ");
        qb.push(join.kind.as_sql());
        qb.push(" ");
        push_ident(qb, &join.table);
        qb.push(" AS ");
        push_ident(qb, &join.alias);
        qb.push(" ON ");
        push_column(qb, &join.left);
        qb.push(" = ");
        push_column(qb, &join.right);
    }
}

fn push_where(qb: &mut PgQuery, filter: Predicate) {
    if filter != Predicate::True {
        qb.push(" WHERE ");
        push_predicate(qb, &filter);
    }
}

fn push_order_by(qb: &mut PgQuery, terms: &[OrderTerm]) {
    if terms.is_empty() {
        return;
    }
    qb.push(" ORDER BY ");
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_ident(qb, &term.column.output_name());
        qb.push(" ");
        qb.push(term.order.as_sql());
    }
}

fn push_predicate(qb: &mut PgQuery, predicate: &Predicate) {
    match predicate {
        Predicate::True => {
            qb.push("TRUE");
        }
        Predicate::False => {
            qb.push("FALSE");
        }
        Predicate::Compare { column, op, value } => {
            push_column(qb, column);
            qb.push(" ");
            qb.push(op.as_sql());
            qb.push(" ");
            push_scalar(qb, value);
        }
        Predicate::In { column, values } => {
            if values.is_empty() {
                qb.push("FALSE");
                return;
            }
            push_column(qb, column);
            qb.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_scalar(qb, value);
            }
            qb.push(")");
        }
        Predicate::Contains {
            column,
            needle,
            strategy,
        } => match strategy {
            ContainsStrategy::Substring => {
                push_column(qb, column);
                qb.push(" LIKE ");
                qb.push_bind(format!("%{}%", escape_like(needle)));
            }
            ContainsStrategy::Trigram { threshold } => {
                qb.push("similarity(");
                push_column(qb, column);
                qb.push(", ");
                qb.push_bind(needle.clone());
                qb.push(") >= ");
                qb.push_bind(*threshold);
            }
        },
        Predicate::IsNull(column) => {
            push_column(qb, column);
            qb.push(" IS NULL");
        }
        Predicate::IsNotNull(column) => {
            push_column(qb, column);
            qb.push(" IS NOT NULL");
        }
        Predicate::And(members) => push_group(qb, members, " AND "),
        Predicate::Or(members) => push_group(qb, members, " OR "),
    }
}

fn push_group(qb: &mut PgQuery, members: &[Predicate], separator: &str) {
    qb.push("(");
    for (i, member) in members.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        push_predicate(qb, member);
    }
    qb.push(")");
}

fn push_scalar(qb: &mut PgQuery, value: &Scalar) {
    match value {
        // Never reached from compiled filters or seeks, which use IS NULL
        Scalar::Null => {
            qb.push("NULL");
        }
        Scalar::Bool(v) => {
            qb.push_bind(*v);
        }
        Scalar::Int(v) => {
            qb.push_bind(*v);
        }
        Scalar::Float(v) => {
            qb.push_bind(*v);
        }
        Scalar::Text(v) => {
            qb.push_bind(v.clone());
        }
        Scalar::Uuid(v) => {
            qb.push_bind(*v);
        }
        Scalar::Timestamp(v) => {
            qb.push_bind(*v);
        }
    }
}

fn push_column(qb: &mut PgQuery, column: &ColumnRef) {
    push_ident(qb, &column.table);
    qb.push(".");
    push_ident(qb, &column.column);
}

fn push_ident(qb: &mut PgQuery, ident: &str) {
    qb.push(quote_ident(ident));
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape `LIKE` wildcards so the needle matches literally.
pub(crate) fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::ports::SortOrder;
    use roster_core::query::CompareOp;

    fn users() -> Scope {
        let mut scope = Scope::new("users", "User");
        scope
            .inner_join(
                "organization_memberships",
                "OrganizationMembership",
                ColumnRef::new("User", "user_id"),
                ColumnRef::new("OrganizationMembership", "user_id"),
            )
            .unwrap();
        scope
            .select(ColumnRef::new("User", "user_id"))
            .select(ColumnRef::new("User", "given_name"));
        scope
    }

    fn order() -> Vec<OrderTerm> {
        vec![
            OrderTerm {
                column: ColumnRef::new("User", "given_name"),
                order: SortOrder::Asc,
            },
            OrderTerm {
                column: ColumnRef::new("User", "user_id"),
                order: SortOrder::Asc,
            },
        ]
    }

    #[test]
    fn test_select_sql() {
        let mut scope = users();
        scope.and_where(Predicate::compare(
            ColumnRef::new("User", "status"),
            CompareOp::Eq,
            Scalar::from("active"),
        ));
        let query = SelectQuery {
            scope: &scope,
            seek: Some(Predicate::or([
                Predicate::compare(
                    ColumnRef::new("User", "given_name"),
                    CompareOp::Gt,
                    Scalar::from("Bob"),
                ),
                Predicate::IsNull(ColumnRef::new("User", "given_name")),
            ])),
            order_by: order(),
            limit: 4,
        };

        assert_eq!(
            select(&query).sql(),
            "SELECT DISTINCT \"User\".\"user_id\" AS \"User.user_id\", \
             \"User\".\"given_name\" AS \"User.given_name\" \
             FROM \"users\" AS \"User\" \
             INNER JOIN \"organization_memberships\" AS \"OrganizationMembership\" \
             ON \"User\".\"user_id\" = \"OrganizationMembership\".\"user_id\" \
             WHERE (\"User\".\"status\" = $1 AND \
             (\"User\".\"given_name\" > $2 OR \"User\".\"given_name\" IS NULL)) \
             ORDER BY \"User.given_name\" ASC, \"User.user_id\" ASC LIMIT $3"
        );
    }

    #[test]
    fn test_select_without_filter_has_no_where() {
        let scope = users();
        let query = SelectQuery {
            scope: &scope,
            seek: None,
            order_by: order(),
            limit: 51,
        };
        assert!(!select(&query).sql().contains("WHERE"));
    }

    #[test]
    fn test_grouped_count_sql() {
        let scope = users();
        let query = CountQuery {
            scope: &scope,
            distinct_on: ColumnRef::new("User", "user_id"),
            group_by: Some(ColumnRef::new("OrganizationMembership", "organization_id")),
        };
        assert_eq!(
            count(&query).sql(),
            "SELECT \"OrganizationMembership\".\"organization_id\", \
             COUNT(DISTINCT \"User\".\"user_id\") \
             FROM \"users\" AS \"User\" \
             INNER JOIN \"organization_memberships\" AS \"OrganizationMembership\" \
             ON \"User\".\"user_id\" = \"OrganizationMembership\".\"user_id\" \
             GROUP BY \"OrganizationMembership\".\"organization_id\""
        );
    }

    #[test]
    fn test_partitioned_sql() {
        let mut scope = users();
        scope.select(ColumnRef::new("OrganizationMembership", "organization_id"));
        let query = PartitionedQuery {
            scope: &scope,
            seek: None,
            partition_by: ColumnRef::new("OrganizationMembership", "organization_id"),
            order_by: order(),
            per_partition_limit: 3,
        };
        let sql = select_sql(&query);

        assert!(sql.starts_with(
            "SELECT \"User.user_id\", \"User.given_name\", \
             \"OrganizationMembership.organization_id\" FROM (SELECT page.*, \
             ROW_NUMBER() OVER (PARTITION BY \"OrganizationMembership.organization_id\" \
             ORDER BY \"User.given_name\" ASC, \"User.user_id\" ASC) AS \"__row\" \
             FROM (SELECT DISTINCT "
        ));
        assert!(sql.ends_with(
            ") AS page) AS ranked WHERE \"__row\" <= $1 \
             ORDER BY \"OrganizationMembership.organization_id\", \"__row\""
        ));
    }

    fn select_sql(query: &PartitionedQuery<'_>) -> String {
        partitioned(query).sql().to_string()
    }

    #[test]
    fn test_contains_rendering() {
        let mut scope = Scope::new("users", "User");
        scope.select(ColumnRef::new("User", "user_id"));
        scope.and_where(Predicate::Contains {
            column: ColumnRef::new("User", "email"),
            needle: "a_b".into(),
            strategy: ContainsStrategy::Trigram { threshold: 0.3 },
        });
        let query = CountQuery {
            scope: &scope,
            distinct_on: ColumnRef::new("User", "user_id"),
            group_by: None,
        };
        assert!(
            count(&query)
                .sql()
                .ends_with("WHERE similarity(\"User\".\"email\", $1) >= $2")
        );
    }

    #[test]
    fn test_empty_in_is_false() {
        let mut qb = QueryBuilder::new("");
        push_predicate(
            &mut qb,
            &Predicate::In {
                column: ColumnRef::new("User", "user_id"),
                values: vec![],
            },
        );
        assert_eq!(qb.sql(), "FALSE");
    }

    // Test critique: les jokers LIKE du filtre sont traités littéralement
    #[test]
    fn test_like_escaping() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_ident("User"), "\"User\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
