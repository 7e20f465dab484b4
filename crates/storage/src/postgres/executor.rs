//! [`ScopeExecutor`] implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use roster_core::error::{StorageError, StorageResult};
use roster_core::models::{Record, Scalar};
use roster_core::ports::ScopeExecutor;
use roster_core::query::{CountQuery, PartitionedQuery, SelectQuery};

use super::database::Database;
use super::helpers::{decode_column, row_to_record};
use super::render;

/// Runs query plans against a PostgreSQL pool. One plan is one statement.
pub struct PgScopeExecutor {
    pool: PgPool,
}

impl PgScopeExecutor {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl ScopeExecutor for PgScopeExecutor {
    #[instrument(skip_all, fields(table = %query.scope.table(), limit = query.limit))]
    async fn fetch(&self, query: &SelectQuery<'_>) -> StorageResult<Vec<Record>> {
        let mut qb = render::select(query);
        debug!(sql = qb.sql(), "Fetching page");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }

    #[instrument(skip_all, fields(table = %query.scope.table()))]
    async fn count(&self, query: &CountQuery<'_>) -> StorageResult<u64> {
        let mut qb = render::count(query);
        debug!(sql = qb.sql(), "Counting rows");

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(count as u64)
    }

    #[instrument(skip_all, fields(table = %query.scope.table(), limit = query.per_partition_limit))]
    async fn fetch_partitioned(&self, query: &PartitionedQuery<'_>) -> StorageResult<Vec<Record>> {
        let mut qb = render::partitioned(query);
        debug!(sql = qb.sql(), "Fetching partitioned pages");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }

    #[instrument(skip_all, fields(table = %query.scope.table()))]
    async fn count_grouped(&self, query: &CountQuery<'_>) -> StorageResult<Vec<(Scalar, u64)>> {
        let mut qb = render::count(query);
        debug!(sql = qb.sql(), "Counting rows per group");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let group = decode_column(row, 0)?;
                let count: i64 = sqlx::Row::try_get(row, 1)
                    .map_err(|e| StorageError::SerializationError(e.to_string()))?;
                Ok((group, count as u64))
            })
            .collect()
    }
}
