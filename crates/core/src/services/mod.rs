//! Pagination and filtering services.

pub mod child;
pub mod connection;
pub mod cursor;
pub mod filter;
pub mod paginator;
pub mod sort;

pub use child::{ChildConnectionKey, ChildConnectionLoader};
pub use connection::{ConnectionService, EntityConnection};
pub use filter::{FieldRegistry, FilterCompiler, FilterExpr, FilterOperator, FilterValue};
pub use paginator::KeysetPaginator;
pub use sort::SortConfig;
