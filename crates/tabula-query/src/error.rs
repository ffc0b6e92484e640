//! Error type of the query surface.
//!
//! Every layer has its own error enum. [`QueryError`] is what `LazyFrame`
//! and `SessionContext` return: the variants callers commonly match on are
//! lifted out of the layer errors, everything else is wrapped.

use thiserror::Error;

use crate::executor::ExecutionError;
use crate::logical::PlanError;
use crate::optimizer::OptimizerError;
use crate::parser::{DataType, ParseError};
use crate::physical::PlanningError;
use crate::source::{InferenceError, SourceError};

/// Errors returned by lazy frames and sessions.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The sampled rows of a source have no consistent schema: a quoted
    /// column mixes types, or a row is longer than the header.
    #[error(transparent)]
    SchemaInference(InferenceError),

    /// A column reference matches no input column.
    #[error("Unknown column '{name}'")]
    UnknownColumn {
        /// The reference as written.
        name: String,
    },

    /// An operation was applied to operands of the wrong type.
    #[error("Type mismatch: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A value has no well-defined conversion to the target type.
    #[error("Cannot cast '{value}' to {target}")]
    Cast {
        /// Display form of the value.
        value: String,
        /// Target type.
        target: DataType,
    },

    /// A rolling index column is not sorted ascending.
    #[error("Index column '{column}' is not sorted in ascending order")]
    UnsortedIndex {
        /// Index column name.
        column: String,
    },

    /// A join key is missing on one side of a join.
    #[error("Join key '{key}' not found on the {side} side")]
    JoinKey {
        /// Key expression.
        key: String,
        /// `left` or `right`.
        side: String,
    },

    /// Any other execution failure: source I/O, cancellation, overflow.
    #[error("Execution error: {0}")]
    Execution(ExecutionError),

    /// SQL text could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Any other plan construction error.
    #[error("Plan error: {0}")]
    Plan(PlanError),

    /// The optimizer failed.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// The physical planner failed.
    #[error("Planning error: {0}")]
    Planning(PlanningError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for the query surface.
pub type TabulaResult<T> = Result<T, QueryError>;

impl From<PlanError> for QueryError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::UnknownColumn { name, .. } => QueryError::UnknownColumn { name },
            PlanError::TypeMismatch(message) => QueryError::TypeMismatch { message },
            PlanError::JoinKey { key, side } => QueryError::JoinKey { key, side },
            other => QueryError::Plan(other),
        }
    }
}

impl From<PlanningError> for QueryError {
    fn from(err: PlanningError) -> Self {
        match err {
            PlanningError::Plan(plan) => plan.into(),
            other => QueryError::Planning(other),
        }
    }
}

impl From<ExecutionError> for QueryError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Cast { value, target } => QueryError::Cast { value, target },
            ExecutionError::UnsortedIndex { column } => QueryError::UnsortedIndex { column },
            ExecutionError::TypeMismatch(message) => QueryError::TypeMismatch { message },
            ExecutionError::Source(source) => source.into(),
            other => QueryError::Execution(other),
        }
    }
}

impl From<SourceError> for QueryError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::SchemaInference(err) => QueryError::SchemaInference(err),
            other => QueryError::Execution(ExecutionError::Source(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_errors_are_lifted() {
        let err: QueryError = PlanError::UnknownColumn {
            name: "missing".into(),
            available: vec!["a".into()],
        }
        .into();
        assert!(matches!(err, QueryError::UnknownColumn { ref name } if name == "missing"));

        let err: QueryError = PlanningError::Plan(PlanError::JoinKey {
            key: "Address".into(),
            side: "right".into(),
        })
        .into();
        assert!(matches!(err, QueryError::JoinKey { .. }));

        let err: QueryError = PlanError::UnknownTable("t".into()).into();
        assert!(matches!(err, QueryError::Plan(_)));
    }

    #[test]
    fn test_execution_errors_are_lifted() {
        let err: QueryError = ExecutionError::Cast {
            value: "abc".into(),
            target: DataType::Int64,
        }
        .into();
        assert_eq!(err.to_string(), "Cannot cast 'abc' to i64");

        let err: QueryError = ExecutionError::Source(SourceError::SchemaInference(
            InferenceError::ConflictingTypes {
                column: "x".into(),
                types: vec![DataType::Date, DataType::Int64],
            },
        ))
        .into();
        assert!(matches!(
            err,
            QueryError::SchemaInference(InferenceError::ConflictingTypes { ref column, .. })
                if column == "x"
        ));

        let err: QueryError = SourceError::from(InferenceError::RowLength {
            row: 4,
            expected: 2,
            found: 3,
        })
        .into();
        assert_eq!(err.to_string(), "Cannot infer schema: row 4 has 3 fields, expected 2");

        let err: QueryError = ExecutionError::Cancelled.into();
        assert!(matches!(err, QueryError::Execution(ExecutionError::Cancelled)));
    }
}
