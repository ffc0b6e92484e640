//! Physical plan generation.
//!
//! This module converts logical plans into physical execution plans,
//! binding column references to positions and choosing the algorithm for
//! each operation.
//!
//! # Architecture
//!
//! - **PhysicalExpr**: expressions bound to input column positions
//! - **PhysicalOperator**: concrete execution operators
//! - **PhysicalPlan**: tree of physical operators ready for execution
//! - **ExecutionContext**: runtime configuration, cancellation and metrics
//! - **PhysicalPlanner**: converts logical plans to physical plans
//!
//! # Physical Operators
//!
//! | Logical Operator | Physical Operator |
//! |-----------------|-------------------|
//! | Scan | SeqScan |
//! | Select, Projection | Projection |
//! | Join | HashJoin |
//! | Aggregate | HashAggregate |
//! | Sort (+ Limit) | Sort, TopN |
//! | SubqueryAlias | (none) |
//!
//! # Example
//!
//! ```ignore
//! use tabula_query::physical::{ExecutionContext, PhysicalPlanner};
//!
//! let ctx = ExecutionContext::default();
//! let planner = PhysicalPlanner::new(&ctx);
//! let physical_plan = planner.create_physical_plan(&logical_plan)?;
//! ```

mod context;
mod expr;
mod operator;
mod plan;
mod planner;

pub use context::*;
pub use expr::*;
pub use operator::*;
pub use plan::*;
pub use planner::*;
