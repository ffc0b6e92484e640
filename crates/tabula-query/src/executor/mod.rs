//! Streaming executor for physical plans.
//!
//! Executes physical plans with a pull-based iterator model: every operator
//! produces [`RecordBatch`]es on demand and pulls from its inputs only when
//! asked for output.
//!
//! # Architecture
//!
//! - **Value**: runtime values, including nested lists and structs
//! - **Row** / **RecordBatch**: a single row and a bounded chunk of rows
//! - **Operator**: executable operators producing record batches
//! - **Evaluator**: evaluates physical expressions and aggregates per row
//! - **QueryExecutor**: builds the operator tree and drains it
//!
//! # Execution Model
//!
//! ```ignore
//! let mut operator = executor.execute_stream(&physical_plan)?;
//! while let Some(batch) = operator.next_batch()? {
//!     // Process batch
//! }
//! ```
//!
//! Scan, Filter, Projection, Melt, Limit, Union and the probe side of joins
//! stream. Aggregation keeps per-group state; Sort, Distinct, Window,
//! Rolling and Pivot materialize their input before producing output.

use thiserror::Error;

use crate::parser::DataType;
use crate::source::SourceError;

mod aggregate;
mod batch;
mod engine;
mod evaluator;
mod join;
mod operators;
mod row;
mod value;
mod window;

pub use aggregate::*;
pub use batch::*;
pub use engine::*;
pub use evaluator::*;
pub use join::*;
pub use operators::*;
pub use row::*;
pub use value::*;
pub use window::*;

/// Errors raised while executing a plan.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A value has no well-defined conversion to the target type.
    #[error("Cannot cast '{value}' to {target}")]
    Cast {
        /// Display form of the value.
        value: String,
        /// Target type.
        target: DataType,
    },

    /// A rolling index column is not monotonically non-decreasing.
    #[error("Index column '{column}' is not sorted in ascending order")]
    UnsortedIndex {
        /// Index column name.
        column: String,
    },

    /// Reading from a source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The execution was cancelled.
    #[error("Query cancelled")]
    Cancelled,

    /// Integer arithmetic overflowed.
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    /// An operation received values of a type it cannot handle.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for execution.
pub type ExecutionResult<T> = Result<T, ExecutionError>;
