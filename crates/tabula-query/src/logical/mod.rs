//! Logical query plan representation.
//!
//! A logical plan is an immutable tree of operators describing *what* to
//! compute. Both front ends produce one: the SQL binder and the
//! [`LogicalPlanBuilder`] used by [`crate::LazyFrame`]. Nothing is read or
//! computed until the plan is optimized, planned and executed.

pub mod binder;
pub mod builder;
pub mod catalog;
pub mod expr;
pub mod operator;
pub mod plan;
pub mod schema;

pub use binder::{bind_statement, SqlBinder};
pub use builder::*;
pub use catalog::{Catalog, MemoryCatalog};
pub use expr::*;
pub use operator::*;
pub use plan::*;
pub use schema::*;
