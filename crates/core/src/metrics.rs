//! Metrics definitions for the query engine.
//!
//! This module defines all metrics recorded by the paginator and child
//! loader. Metrics are collected using the `metrics` crate and can be
//! exported to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "pagination_queries_total",
        "Total number of paginated reads, by entity and direction"
    );
    describe_counter!(
        "pagination_rejected_inputs_total",
        "Total number of paginated reads rejected before reaching the database"
    );
    describe_counter!(
        "pagination_count_queries_total",
        "Total number of totalCount queries issued"
    );
    describe_histogram!(
        "pagination_query_duration_seconds",
        "Time taken to produce a page, including the count query"
    );
}

/// Record a paginated read.
///
/// # Arguments
/// * `entity` - Base table of the scope (e.g. "users")
/// * `direction` - "forward" or "backward"
pub fn record_query(entity: &str, direction: &str) {
    counter!("pagination_queries_total", "entity" => entity.to_string(), "direction" => direction.to_string())
        .increment(1);
}

/// Record an input rejected by validation.
///
/// # Arguments
/// * `kind` - Error code, e.g. "INVALID_CURSOR"
pub fn record_rejected_input(kind: &str) {
    counter!("pagination_rejected_inputs_total", "kind" => kind.to_string()).increment(1);
}

/// Record a count query.
pub fn record_count_query(entity: &str) {
    counter!("pagination_count_queries_total", "entity" => entity.to_string()).increment(1);
}

/// Record page production duration.
pub fn record_query_duration(entity: &str, duration_secs: f64) {
    histogram!("pagination_query_duration_seconds", "entity" => entity.to_string())
        .record(duration_secs);
}

/// A timer that records the page duration for an entity when dropped.
pub struct QueryTimer {
    entity: String,
    start: Instant,
}

impl QueryTimer {
    /// Start a new timer for `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_query_duration(&self.entity, duration);
    }
}
