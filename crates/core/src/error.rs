//! Error types for the roster domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`StorageError`] - Database/executor errors
//! - [`PaginationError`] - Rejected pagination, sorting and filtering input
//! - [`ConfigError`] - Invalid engine configuration
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and executor errors.
///
/// These errors originate from executing a query plan against a backend,
/// or from mapping fetched rows back into domain models.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Pagination Errors
// =============================================================================

/// Errors raised while planning or running a paginated read.
///
/// Every variant except [`PaginationError::Backend`] is raised before any
/// query reaches the backend.
#[derive(Debug, Error)]
pub enum PaginationError {
    /// Requested page size is outside `1..=max`.
    #[error("Invalid page size {count}: must be between 1 and {max}")]
    InvalidPageSize {
        /// Size requested by the caller.
        count: i64,
        /// Largest accepted page size.
        max: u32,
    },

    /// Cursor could not be decoded or does not match the active sort key.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Filter names a field the entity registry does not know.
    #[error("Unknown filter field: {0}")]
    UnknownFilterField(String),

    /// Sort names a field the entity sort config does not know.
    #[error("Unknown sort field: {0}")]
    UnknownSortField(String),

    /// Filter uses an operator outside the supported set.
    #[error("Unknown filter operator: {0}")]
    UnknownOperator(String),

    /// Filter value has the wrong shape or type for its field/operator.
    #[error("Invalid value for filter field {field}: {reason}")]
    InvalidFilterValue {
        /// Public field name.
        field: String,
        /// Human readable reason.
        reason: String,
    },

    /// A column reference cannot be resolved to exactly one table.
    #[error("Ambiguous field reference: {0}")]
    AmbiguousFieldReference(String),

    /// A child connection filter targets the parent key.
    #[error("Cannot filter by parent ID {0} in a child connection.")]
    ChildFilterOnParent(String),

    /// Backend execution failed.
    #[error("Backend error: {0}")]
    Backend(#[from] StorageError),
}

impl PaginationError {
    /// Stable machine readable code, exposed to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPageSize { .. } => "INVALID_PAGE_SIZE",
            Self::InvalidCursor(_) => "INVALID_CURSOR",
            Self::UnknownFilterField(_) => "UNKNOWN_FILTER_FIELD",
            Self::UnknownSortField(_) => "UNKNOWN_SORT_FIELD",
            Self::UnknownOperator(_) => "UNKNOWN_OPERATOR",
            Self::InvalidFilterValue { .. } => "INVALID_FILTER_VALUE",
            Self::AmbiguousFieldReference(_) => "AMBIGUOUS_FIELD_REFERENCE",
            Self::ChildFilterOnParent(_) => "CHILD_FILTER_ON_PARENT",
            Self::Backend(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether the error was caused by caller input rather than the backend.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Invalid engine configuration, detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Similarity threshold outside `0.0..=1.0`.
    #[error("Similarity threshold must be within 0 and 1, got {0}")]
    InvalidSimilarityThreshold(f64),

    /// Unknown contains mode name.
    #[error("Unknown contains mode: {0} (expected `substring` or `trigram`)")]
    UnknownContainsMode(String),

    /// Default page size outside `1..=max`.
    #[error("Default page size {size} must be between 1 and {max}")]
    InvalidDefaultPageSize {
        /// Configured size.
        size: u32,
        /// Largest accepted page size.
        max: u32,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for pagination operations.
pub type PaginationResult<T> = Result<T, PaginationError>;
