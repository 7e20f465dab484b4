//! Backend-neutral query AST.
//!
//! - [`Scope`] - base table, joins, predicates and projection
//! - [`Predicate`] - boolean conditions over qualified columns
//! - [`SelectQuery`], [`CountQuery`], [`PartitionedQuery`] - executable plans

mod plan;
mod predicate;
mod scope;

pub use plan::*;
pub use predicate::*;
pub use scope::*;
