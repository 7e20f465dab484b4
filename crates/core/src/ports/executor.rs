//! Port trait for running query plans.
//!
//! The domain layer builds backend-neutral plans; implementations live in
//! the infrastructure layer (e.g., `roster-storage`). Every method call is
//! exactly one round trip to the backend.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{Record, Scalar};
use crate::query::{CountQuery, PartitionedQuery, SelectQuery};

#[async_trait]
pub trait ScopeExecutor: Send + Sync {
    /// Fetch distinct projected rows in plan order, at most `limit`.
    async fn fetch(&self, query: &SelectQuery<'_>) -> StorageResult<Vec<Record>>;

    /// Count distinct `distinct_on` values matching the scope.
    async fn count(&self, query: &CountQuery<'_>) -> StorageResult<u64>;

    /// Fetch up to `per_partition_limit` rows for each partition value,
    /// grouped by partition and ordered within each group.
    async fn fetch_partitioned(&self, query: &PartitionedQuery<'_>) -> StorageResult<Vec<Record>>;

    /// Count distinct `distinct_on` values per `group_by` value.
    async fn count_grouped(&self, query: &CountQuery<'_>) -> StorageResult<Vec<(Scalar, u64)>>;
}
