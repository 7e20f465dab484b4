//! Keyset paginator.
//!
//! Reads one page of a scope ordered by its effective sort key. Rows are
//! located with a seek predicate built from the cursor's key values rather
//! than an offset, so pages stay stable while rows are inserted elsewhere.
//!
//! # Query shape
//!
//! For a sort key `(a, b, pk)` read forward after `(x, y, z)`:
//!
//! ```text
//! WHERE <scope> AND (a > x OR (a = x AND (b > y OR (b = y AND pk > z))))
//! ORDER BY a, b, pk
//! LIMIT count + 1
//! ```
//!
//! Each level uses the comparison matching its own order, so mixed
//! directions work. Backward reads flip every order, fetch, then reverse
//! the rows. The extra row only signals that another page exists.

use tracing::{debug, instrument};

use crate::config::PaginationConfig;
use crate::error::{PaginationError, PaginationResult};
use crate::metrics::{self, QueryTimer};
use crate::models::{Record, Scalar};
use crate::ports::{
    Connection, ConnectionDirection, Edge, MAX_PAGE_SIZE, PageInfo, PaginationArgs,
    ScopeExecutor, SortOrder,
};
use crate::query::{ColumnRef, CompareOp, CountQuery, Predicate, Scope, SelectQuery};
use crate::services::cursor;
use crate::services::sort::{self, EffectiveSortKey, SortConfig};

pub struct KeysetPaginator<'a> {
    executor: &'a dyn ScopeExecutor,
    config: &'a PaginationConfig,
}

impl<'a> KeysetPaginator<'a> {
    pub fn new(executor: &'a dyn ScopeExecutor, config: &'a PaginationConfig) -> Self {
        Self { executor, config }
    }

    /// Read one page of `scope`.
    ///
    /// Issues one data query, plus one count query when
    /// `args.include_total_count` is set. Invalid input is rejected before
    /// anything is sent to the executor.
    #[instrument(
        skip_all,
        fields(entity = %scope.table(), direction = args.direction.as_str())
    )]
    pub async fn paginate(
        &self,
        scope: Scope,
        sort: &SortConfig,
        args: &PaginationArgs,
    ) -> PaginationResult<Connection<Record>> {
        metrics::record_query(scope.table(), args.direction.as_str());
        let _timer = QueryTimer::new(scope.table());

        let result = self.read_page(scope, sort, args).await;
        if let Err(e) = &result {
            if e.is_input_error() {
                metrics::record_rejected_input(e.code());
            }
            debug!(error = %e, "Pagination failed");
        }
        result
    }

    async fn read_page(
        &self,
        mut scope: Scope,
        sort: &SortConfig,
        args: &PaginationArgs,
    ) -> PaginationResult<Connection<Record>> {
        let page_size = page_size(args.direction_args.count, self.config.default_page_size)?;
        let key = sort::plan(args.sort.as_ref(), sort, &scope)?;
        let boundary = match args.direction_args.cursor() {
            Some(c) => Some(cursor::decode_for(c, &key)?),
            None => None,
        };

        scope.select_all(key.parts().iter().map(|p| p.column.clone()));

        let query = SelectQuery {
            scope: &scope,
            seek: boundary
                .as_deref()
                .map(|values| seek_predicate(&key, values, args.direction)),
            order_by: key.order_terms(args.direction),
            limit: page_size + 1,
        };
        let rows = self.executor.fetch(&query).await?;

        let total_count = if args.include_total_count {
            metrics::record_count_query(scope.table());
            let count = CountQuery {
                scope: &scope,
                distinct_on: key.primary().clone(),
                group_by: None,
            };
            Some(self.executor.count(&count).await?)
        } else {
            None
        };

        debug!(
            rows = rows.len(),
            page_size,
            has_cursor = boundary.is_some(),
            "Fetched page"
        );

        build_page(
            rows,
            &key,
            page_size,
            args.direction,
            boundary.is_some(),
            total_count,
        )
    }
}

/// Validate the requested count, falling back to `default`.
pub(crate) fn page_size(count: Option<i64>, default: u32) -> PaginationResult<u32> {
    match count {
        None => Ok(default),
        Some(c) if c < 1 || c > i64::from(MAX_PAGE_SIZE) => Err(PaginationError::InvalidPageSize {
            count: c,
            max: MAX_PAGE_SIZE,
        }),
        Some(c) => Ok(c as u32),
    }
}

/// Rows strictly beyond `boundary` when reading in `direction`.
///
/// Nulls sort after every value in ascending order and before every
/// value in descending order, as PostgreSQL does by default.
pub(crate) fn seek_predicate(
    key: &EffectiveSortKey,
    boundary: &[Scalar],
    direction: ConnectionDirection,
) -> Predicate {
    let mut seek: Option<Predicate> = None;
    for (part, value) in key.parts().iter().zip(boundary).rev() {
        let ascending = (part.order == SortOrder::Asc) == (direction == ConnectionDirection::Forward);
        let beyond = if ascending {
            after(&part.column, value)
        } else {
            before(&part.column, value)
        };
        seek = Some(match seek {
            None => beyond,
            Some(rest) => Predicate::or([beyond, Predicate::and([equal(&part.column, value), rest])]),
        });
    }
    seek.unwrap_or(Predicate::True)
}

fn after(column: &ColumnRef, value: &Scalar) -> Predicate {
    match value {
        Scalar::Null => Predicate::False,
        v => Predicate::or([
            Predicate::compare(column.clone(), CompareOp::Gt, v.clone()),
            Predicate::IsNull(column.clone()),
        ]),
    }
}

fn before(column: &ColumnRef, value: &Scalar) -> Predicate {
    match value {
        Scalar::Null => Predicate::IsNotNull(column.clone()),
        v => Predicate::compare(column.clone(), CompareOp::Lt, v.clone()),
    }
}

fn equal(column: &ColumnRef, value: &Scalar) -> Predicate {
    match value {
        Scalar::Null => Predicate::IsNull(column.clone()),
        v => Predicate::compare(column.clone(), CompareOp::Eq, v.clone()),
    }
}

/// Turn `page_size + 1` fetched rows into a connection.
///
/// `rows` are in read order; backward pages are flipped back into sort
/// order here.
pub(crate) fn build_page(
    mut rows: Vec<Record>,
    key: &EffectiveSortKey,
    page_size: u32,
    direction: ConnectionDirection,
    has_cursor: bool,
    total_count: Option<u64>,
) -> PaginationResult<Connection<Record>> {
    let has_more = rows.len() > page_size as usize;
    rows.truncate(page_size as usize);
    if direction == ConnectionDirection::Backward {
        rows.reverse();
    }

    let edges = rows
        .into_iter()
        .map(|node| {
            Ok(Edge {
                cursor: cursor::cursor_for(&node, key)?,
                node,
            })
        })
        .collect::<PaginationResult<Vec<_>>>()?;

    if edges.is_empty() && !has_cursor {
        return Ok(Connection::empty(total_count));
    }

    // A cursor means rows exist on its far side, even when this page is empty
    let (has_next_page, has_previous_page) = match direction {
        ConnectionDirection::Forward => (has_more, has_cursor),
        ConnectionDirection::Backward => (has_cursor, has_more),
    };
    let page_info = PageInfo {
        has_next_page,
        has_previous_page,
        start_cursor: edges.first().map(|e| e.cursor.clone()).unwrap_or_default(),
        end_cursor: edges.last().map(|e| e.cursor.clone()).unwrap_or_default(),
    };

    Ok(Connection {
        edges,
        page_info,
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Cursor, DirectionArgs, SortRequest};
    use crate::query::ContainsStrategy;
    use crate::services::filter::ValueKind;
    use crate::testing::MemoryExecutor;

    const TABLE: &str = "pupils";
    const ALIAS: &str = "Pupil";

    /// 10 rows: ids 1..=10, names cycling over 4 values, some ages null.
    fn executor() -> MemoryExecutor {
        let names = ["ann", "bob", "cid", "dee"];
        let executor = MemoryExecutor::new();
        for id in 1..=10_i64 {
            let age = if id % 3 == 0 { Scalar::Null } else { Scalar::Int(id % 4) };
            executor.insert(
                TABLE,
                [
                    ("id", Scalar::Int(id)),
                    ("name", Scalar::from(names[(id as usize * 7) % 4])),
                    ("age", age),
                ],
            );
        }
        executor
    }

    fn scope() -> Scope {
        let mut scope = Scope::new(TABLE, ALIAS);
        scope.select_all(["id", "name", "age"].map(|c| ColumnRef::new(ALIAS, c)));
        scope
    }

    fn sort_config() -> SortConfig {
        SortConfig::new("id", ValueKind::Int)
            .field("name", "name", ValueKind::Text)
            .field("age", "age", ValueKind::Int)
    }

    fn args(direction: ConnectionDirection, count: Option<i64>, cursor: Option<Cursor>) -> PaginationArgs {
        PaginationArgs {
            direction,
            direction_args: DirectionArgs { count, cursor },
            sort: None,
            include_total_count: false,
        }
    }

    fn ids(conn: &Connection<Record>) -> Vec<i64> {
        conn.nodes()
            .map(|r| match r.value("Pupil.id") {
                Scalar::Int(i) => *i,
                other => panic!("unexpected id {other:?}"),
            })
            .collect()
    }

    async fn page(exec: &MemoryExecutor, args: &PaginationArgs) -> Connection<Record> {
        let config = PaginationConfig::default();
        KeysetPaginator::new(exec, &config)
            .paginate(scope(), &sort_config(), args)
            .await
            .unwrap()
    }

    /// Read the whole scope page by page, following end cursors.
    async fn walk_forward(exec: &MemoryExecutor, sort: Option<SortRequest>, count: i64) -> Vec<i64> {
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let mut a = args(ConnectionDirection::Forward, Some(count), cursor.clone());
            a.sort = sort.clone();
            let conn = page(exec, &a).await;
            seen.extend(ids(&conn));
            if !conn.page_info.has_next_page {
                return seen;
            }
            cursor = Some(conn.page_info.end_cursor.clone());
        }
    }

    // Test critique: 10 lignes, pages de 3 => 3,3,3,1 avec les bons flags
    #[tokio::test]
    async fn test_forward_pages_of_three() {
        let exec = executor();

        let first = page(&exec, &args(ConnectionDirection::Forward, Some(3), None)).await;
        assert_eq!(ids(&first), vec![1, 2, 3]);
        assert!(first.page_info.has_next_page);
        assert!(!first.page_info.has_previous_page);
        assert_eq!(first.page_info.start_cursor, first.edges[0].cursor);
        assert_eq!(first.page_info.end_cursor, first.edges[2].cursor);

        let mut cursor = first.page_info.end_cursor.clone();
        let mut pages = vec![];
        loop {
            let conn = page(&exec, &args(ConnectionDirection::Forward, Some(3), Some(cursor.clone()))).await;
            assert!(conn.page_info.has_previous_page);
            pages.push(ids(&conn));
            if !conn.page_info.has_next_page {
                break;
            }
            cursor = conn.page_info.end_cursor.clone();
        }
        assert_eq!(pages, vec![vec![4, 5, 6], vec![7, 8, 9], vec![10]]);
    }

    // Test critique: BACKWARD sans curseur = dernière page, dans l'ordre
    #[tokio::test]
    async fn test_backward_without_cursor_is_last_page() {
        let exec = executor();
        let last = page(&exec, &args(ConnectionDirection::Backward, Some(3), None)).await;
        assert_eq!(ids(&last), vec![8, 9, 10]);
        assert!(last.page_info.has_previous_page);
        assert!(!last.page_info.has_next_page);

        let before = page(
            &exec,
            &args(ConnectionDirection::Backward, Some(3), Some(last.page_info.start_cursor.clone())),
        )
        .await;
        assert_eq!(ids(&before), vec![5, 6, 7]);
        assert!(before.page_info.has_next_page);
        assert!(before.page_info.has_previous_page);
    }

    // Test critique: avancer puis reculer depuis le curseur de début
    // redonne exactement la page précédente
    #[tokio::test]
    async fn test_direction_symmetry() {
        let exec = executor();
        let first = page(&exec, &args(ConnectionDirection::Forward, Some(4), None)).await;
        let second = page(
            &exec,
            &args(ConnectionDirection::Forward, Some(4), Some(first.page_info.end_cursor.clone())),
        )
        .await;
        let back = page(
            &exec,
            &args(ConnectionDirection::Backward, Some(4), Some(second.page_info.start_cursor.clone())),
        )
        .await;

        assert_eq!(ids(&back), ids(&first));
        assert_eq!(back.edges, first.edges);
        assert!(!back.page_info.has_previous_page);
        assert!(back.page_info.has_next_page);
    }

    // Test critique: tri non unique + NULLs, mélange ASC/DESC => pas de doublon ni de trou
    #[tokio::test]
    async fn test_full_walk_is_complete_for_any_sort() {
        let exec = executor();
        for fields in [vec!["name"], vec!["age"], vec!["age", "name"]] {
            for order in [SortOrder::Asc, SortOrder::Desc] {
                let sort = SortRequest::new(fields.clone(), order);
                let mut seen = walk_forward(&exec, Some(sort.clone()), 3).await;
                let single_page = walk_forward(&exec, Some(sort), 50).await;
                assert_eq!(seen, single_page, "{fields:?} {order:?}");

                seen.sort();
                assert_eq!(seen, (1..=10).collect::<Vec<_>>(), "{fields:?} {order:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_zero_rows_page_info() {
        let exec = MemoryExecutor::new();
        let mut a = args(ConnectionDirection::Forward, Some(5), None);
        a.include_total_count = true;
        let conn = page(&exec, &a).await;

        assert!(conn.edges.is_empty());
        assert_eq!(conn.page_info, PageInfo::default());
        assert_eq!(conn.total_count, Some(0));
    }

    // Test critique: une page vide après un curseur garde le flag du côté
    // du curseur, avec des curseurs de début et de fin vides
    #[tokio::test]
    async fn test_cursor_past_the_end() {
        let exec = executor();
        let last = page(&exec, &args(ConnectionDirection::Forward, Some(10), None)).await;
        let mut a = args(ConnectionDirection::Forward, Some(10), Some(last.page_info.end_cursor.clone()));
        a.include_total_count = true;
        let past = page(&exec, &a).await;

        assert!(past.edges.is_empty());
        assert_eq!(past.total_count, Some(10));
        assert!(past.page_info.has_previous_page);
        assert!(!past.page_info.has_next_page);
        assert!(past.page_info.start_cursor.is_empty());
        assert!(past.page_info.end_cursor.is_empty());

        let first = page(&exec, &args(ConnectionDirection::Forward, Some(10), None)).await;
        let before = page(
            &exec,
            &args(ConnectionDirection::Backward, Some(10), Some(first.page_info.start_cursor.clone())),
        )
        .await;
        assert!(before.edges.is_empty());
        assert!(before.page_info.has_next_page);
        assert!(!before.page_info.has_previous_page);
    }

    // Test critique: un curseur forgé (mauvais type de clé) est refusé
    // avant tout aller-retour, au lieu de donner une page vide
    #[tokio::test]
    async fn test_forged_cursor_rejected_before_execution() {
        let exec = executor();
        let forged = cursor::encode(&cursor::CursorValues::new(vec![(
            "Pupil.id".into(),
            Scalar::from("zzz"),
        )]))
        .unwrap();

        let mut a = args(ConnectionDirection::Forward, Some(3), Some(forged));
        a.include_total_count = true;
        let config = PaginationConfig::default();
        let err = KeysetPaginator::new(&exec, &config)
            .paginate(scope(), &sort_config(), &a)
            .await
            .unwrap_err();

        assert!(matches!(err, PaginationError::InvalidCursor(_)));
        assert_eq!(err.code(), "INVALID_CURSOR");
        assert_eq!(exec.round_trips(), 0);
    }

    // Test critique: taille invalide refusée sans aller-retour base
    #[tokio::test]
    async fn test_invalid_page_size_rejected_before_execution() {
        let exec = executor();
        let config = PaginationConfig::default();
        let paginator = KeysetPaginator::new(&exec, &config);
        for count in [0, -1, 51] {
            let err = paginator
                .paginate(scope(), &sort_config(), &args(ConnectionDirection::Forward, Some(count), None))
                .await
                .unwrap_err();
            assert!(matches!(err, PaginationError::InvalidPageSize { .. }), "{count}");
        }
        assert_eq!(exec.round_trips(), 0);
    }

    #[tokio::test]
    async fn test_invalid_cursor_rejected_before_execution() {
        let exec = executor();
        let config = PaginationConfig::default();
        let err = KeysetPaginator::new(&exec, &config)
            .paginate(
                scope(),
                &sort_config(),
                &args(ConnectionDirection::Forward, Some(3), Some(Cursor::new("garbage!"))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
        assert_eq!(exec.round_trips(), 0);
    }

    #[tokio::test]
    async fn test_default_page_size_applies() {
        let exec = executor();
        let config = PaginationConfig::new(4, ContainsStrategy::Substring).unwrap();
        let conn = KeysetPaginator::new(&exec, &config)
            .paginate(scope(), &sort_config(), &args(ConnectionDirection::Forward, None, None))
            .await
            .unwrap();
        assert_eq!(ids(&conn), vec![1, 2, 3, 4]);
    }

    // Test critique: le total ignore le curseur et coûte un seul aller-retour
    #[tokio::test]
    async fn test_total_count_is_one_extra_round_trip() {
        let exec = executor();
        let first = page(&exec, &args(ConnectionDirection::Forward, Some(3), None)).await;
        exec.reset_round_trips();

        let mut a = args(ConnectionDirection::Forward, Some(3), Some(first.page_info.end_cursor.clone()));
        let conn = page(&exec, &a).await;
        assert_eq!(conn.total_count, None);
        assert_eq!(exec.round_trips(), 1);

        exec.reset_round_trips();
        a.include_total_count = true;
        let conn = page(&exec, &a).await;
        assert_eq!(conn.total_count, Some(10));
        assert_eq!(exec.round_trips(), 2);
    }

    #[test]
    fn test_seek_predicate_shape() {
        let config = sort_config();
        let request = SortRequest::new(["name"], SortOrder::Desc);
        let key = sort::plan(Some(&request), &config, &scope()).unwrap();
        let name = ColumnRef::new(ALIAS, "name");
        let id = ColumnRef::new(ALIAS, "id");

        let seek = seek_predicate(
            &key,
            &[Scalar::from("bob"), Scalar::Int(4)],
            ConnectionDirection::Forward,
        );
        assert_eq!(
            seek,
            Predicate::Or(vec![
                Predicate::compare(name.clone(), CompareOp::Lt, Scalar::from("bob")),
                Predicate::And(vec![
                    Predicate::compare(name, CompareOp::Eq, Scalar::from("bob")),
                    Predicate::Or(vec![
                        Predicate::compare(id.clone(), CompareOp::Gt, Scalar::Int(4)),
                        Predicate::IsNull(id),
                    ]),
                ]),
            ])
        );
    }

    #[test]
    fn test_page_size_validation() {
        assert_eq!(page_size(None, 10).unwrap(), 10);
        assert_eq!(page_size(Some(50), 10).unwrap(), 50);
        assert!(page_size(Some(0), 10).is_err());
        assert!(page_size(Some(51), 10).is_err());
    }
}
