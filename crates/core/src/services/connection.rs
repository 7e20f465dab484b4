//! Connection assembly.
//!
//! Glues the pieces together for one entity: base scope, filter joins and
//! predicates, keyset pagination, then mapping fetched records into domain
//! nodes.

use tracing::instrument;

use crate::config::PaginationConfig;
use crate::error::PaginationResult;
use crate::models::{FromRecord, Record};
use crate::ports::{Connection, PaginationArgs, ScopeExecutor};
use crate::query::Scope;
use crate::services::child::{ChildConnectionKey, ChildConnectionLoader};
use crate::services::filter::{FieldRegistry, FilterCompiler, FilterExpr};
use crate::services::paginator::KeysetPaginator;
use crate::services::sort::SortConfig;

/// Query definition of a paginated entity.
pub trait EntityConnection: Send + Sync {
    /// Base table, alias, always-present joins and projected columns.
    fn base_scope(&self) -> PaginationResult<Scope>;

    fn sort_config(&self) -> &SortConfig;

    fn filter_registry(&self) -> &FieldRegistry;

    /// Add the joins the fields referenced by `filter` live behind.
    fn join_for_filter(&self, scope: &mut Scope, filter: &FilterExpr) -> PaginationResult<()>;
}

/// `base` restricted by `filter`, with whatever joins the filter needs.
pub fn filtered_scope<E: EntityConnection + ?Sized>(
    entity: &E,
    mut base: Scope,
    filter: Option<&FilterExpr>,
    config: &PaginationConfig,
) -> PaginationResult<Scope> {
    if let Some(filter) = filter {
        entity.join_for_filter(&mut base, filter)?;
        FilterCompiler::new(entity.filter_registry(), config.contains).apply(filter, &mut base)?;
    }
    Ok(base)
}

/// Map every node of a fetched page through [`FromRecord`].
pub fn assemble<T: FromRecord>(page: Connection<Record>) -> PaginationResult<Connection<T>> {
    Ok(page.try_map(|record| T::from_record(&record))?)
}

pub struct ConnectionService<'a> {
    executor: &'a dyn ScopeExecutor,
    config: &'a PaginationConfig,
}

impl<'a> ConnectionService<'a> {
    pub fn new(executor: &'a dyn ScopeExecutor, config: &'a PaginationConfig) -> Self {
        Self { executor, config }
    }

    /// One page of `entity` within `base`.
    ///
    /// `base` is usually [`EntityConnection::base_scope`], possibly
    /// narrowed by the caller (e.g. to what the viewer may see).
    #[instrument(skip_all, fields(entity = %base.table()))]
    pub async fn connection<E, T>(
        &self,
        entity: &E,
        base: Scope,
        filter: Option<&FilterExpr>,
        args: &PaginationArgs,
    ) -> PaginationResult<Connection<T>>
    where
        E: EntityConnection + ?Sized,
        T: FromRecord,
    {
        let scope = filtered_scope(entity, base, filter, self.config)?;
        let page = KeysetPaginator::new(self.executor, self.config)
            .paginate(scope, entity.sort_config(), args)
            .await?;
        assemble(page)
    }

    /// Child pages of `entity` for a batch of parents, in key order.
    #[instrument(skip_all, fields(entity = %base.table(), keys = keys.len()))]
    pub async fn child_connections<E, T>(
        &self,
        entity: &E,
        base: &Scope,
        keys: &[ChildConnectionKey],
    ) -> PaginationResult<Vec<Connection<T>>>
    where
        E: EntityConnection + ?Sized,
        T: FromRecord,
    {
        ChildConnectionLoader::new(self.executor, self.config)
            .load(entity, base, keys)
            .await?
            .into_iter()
            .map(assemble)
            .collect()
    }
}
