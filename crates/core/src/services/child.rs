//! Batched child connections.
//!
//! Resolves one page per parent for many parents at once (e.g. the users
//! of every organization on a page) with a single windowed query:
//!
//! ```text
//! ROW_NUMBER() OVER (PARTITION BY <pivot> ORDER BY <sort key>) <= count + 1
//! ```
//!
//! plus, when requested, one count query grouped by the pivot. Keys whose
//! arguments differ are split into separate batches.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::config::PaginationConfig;
use crate::error::{PaginationError, PaginationResult};
use crate::metrics;
use crate::models::{Record, Scalar};
use crate::ports::{Connection, PaginationArgs, ScopeExecutor};
use crate::query::{CountQuery, PartitionedQuery, Scope};
use crate::services::connection::{EntityConnection, filtered_scope};
use crate::services::cursor;
use crate::services::filter::{FilterExpr, FilterOperator, FilterValue};
use crate::services::paginator::{build_page, page_size, seek_predicate};
use crate::services::sort;

/// One parent's request for a child page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildConnectionKey {
    /// Key of the parent row, e.g. the organization id.
    pub parent_id: Scalar,
    /// Filter field naming the parent key on the child entity.
    pub parent_filter_key: String,
    /// Column path the child rows are partitioned by.
    pub pivot: String,
    pub args: PaginationArgs,
    pub filter: Option<FilterExpr>,
}

impl ChildConnectionKey {
    /// Whether `other` can share a batch with `self`.
    fn same_request(&self, other: &ChildConnectionKey) -> bool {
        self.parent_filter_key == other.parent_filter_key
            && self.pivot == other.pivot
            && self.args == other.args
            && self.filter == other.filter
    }
}

pub struct ChildConnectionLoader<'a> {
    executor: &'a dyn ScopeExecutor,
    config: &'a PaginationConfig,
}

impl<'a> ChildConnectionLoader<'a> {
    pub fn new(executor: &'a dyn ScopeExecutor, config: &'a PaginationConfig) -> Self {
        Self { executor, config }
    }

    /// One connection per key, in key order.
    ///
    /// An empty key list costs no round trip.
    #[instrument(skip_all, fields(entity = %base.table(), keys = keys.len()))]
    pub async fn load<E: EntityConnection + ?Sized>(
        &self,
        entity: &E,
        base: &Scope,
        keys: &[ChildConnectionKey],
    ) -> PaginationResult<Vec<Connection<Record>>> {
        let mut batches: Vec<Vec<usize>> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match batches.iter_mut().find(|b| keys[b[0]].same_request(key)) {
                Some(batch) => batch.push(i),
                None => batches.push(vec![i]),
            }
        }

        let mut results: Vec<Option<Connection<Record>>> = vec![None; keys.len()];
        for batch in batches {
            let parents: Vec<&Scalar> = batch.iter().map(|&i| &keys[i].parent_id).collect();
            let pages = self.load_batch(entity, base, &keys[batch[0]], &parents).await;
            if let Err(e) = &pages {
                if e.is_input_error() {
                    metrics::record_rejected_input(e.code());
                }
            }
            for (i, page) in batch.into_iter().zip(pages?) {
                results[i] = Some(page);
            }
        }
        Ok(results.into_iter().flatten().collect())
    }

    async fn load_batch<E: EntityConnection + ?Sized>(
        &self,
        entity: &E,
        base: &Scope,
        request: &ChildConnectionKey,
        parents: &[&Scalar],
    ) -> PaginationResult<Vec<Connection<Record>>> {
        if let Some(filter) = &request.filter {
            if filter.references(&request.parent_filter_key) {
                return Err(PaginationError::ChildFilterOnParent(
                    request.parent_filter_key.clone(),
                ));
            }
        }

        let args = &request.args;
        let page_size = page_size(args.direction_args.count, self.config.default_page_size)?;

        let mut ids: Vec<Scalar> = Vec::with_capacity(parents.len());
        for id in parents {
            if !ids.contains(id) {
                ids.push((*id).clone());
            }
        }
        let by_parent = FilterExpr::leaf(
            request.parent_filter_key.as_str(),
            FilterOperator::In,
            FilterValue::List(ids),
        );
        let filter = match &request.filter {
            Some(f) => FilterExpr::And(vec![by_parent, f.clone()]),
            None => by_parent,
        };

        let mut scope = filtered_scope(entity, base.clone(), Some(&filter), self.config)?;
        let pivot = scope.qualify(&request.pivot)?;
        let key = sort::plan(args.sort.as_ref(), entity.sort_config(), &scope)?;
        let boundary = match args.direction_args.cursor() {
            Some(c) => Some(cursor::decode_for(c, &key)?),
            None => None,
        };

        scope.select(pivot.clone());
        scope.select_all(key.parts().iter().map(|p| p.column.clone()));

        metrics::record_query(scope.table(), args.direction.as_str());
        let query = PartitionedQuery {
            scope: &scope,
            seek: boundary
                .as_deref()
                .map(|values| seek_predicate(&key, values, args.direction)),
            partition_by: pivot.clone(),
            order_by: key.order_terms(args.direction),
            per_partition_limit: page_size + 1,
        };
        let rows = self.executor.fetch_partitioned(&query).await?;

        let counts: BTreeMap<String, u64> = if args.include_total_count {
            metrics::record_count_query(scope.table());
            let count = CountQuery {
                scope: &scope,
                distinct_on: key.primary().clone(),
                group_by: Some(pivot.clone()),
            };
            self.executor
                .count_grouped(&count)
                .await?
                .into_iter()
                .map(|(parent, n)| (parent.to_string(), n))
                .collect()
        } else {
            BTreeMap::new()
        };

        let pivot_name = pivot.output_name();
        let mut grouped: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for row in rows {
            grouped
                .entry(row.value(&pivot_name).to_string())
                .or_default()
                .push(row);
        }
        debug!(parents = grouped.len(), page_size, "Fetched child pages");

        parents
            .iter()
            .map(|parent| {
                let parent = parent.to_string();
                let rows = grouped.get(&parent).cloned().unwrap_or_default();
                let total_count = args
                    .include_total_count
                    .then(|| counts.get(&parent).copied().unwrap_or(0));
                build_page(
                    rows,
                    &key,
                    page_size,
                    args.direction,
                    boundary.is_some(),
                    total_count,
                )
            })
            .collect()
    }
}
