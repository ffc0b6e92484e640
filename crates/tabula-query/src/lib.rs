//! # tabula-query
//!
//! Lazy, expression-based query engine over tabular row sources.
//!
//! This crate implements:
//! - Schema inference over CSV and in-memory sources
//! - SQL parsing and a builder API producing the same logical plans
//! - Rule-based optimization (constant folding, pushdowns, pruning)
//! - Streaming, pull-based execution in bounded chunks
//! - Grouping, joins, pivot/melt, window and rolling aggregates

#![warn(missing_docs)]
#![warn(clippy::all)]

/// SQL parsing and shared type definitions
pub mod parser;

/// Logical plan representation
pub mod logical;

/// Query optimizer
pub mod optimizer;

/// Physical plan generation
pub mod physical;

/// Query execution
pub mod executor;

/// Row sources and schema inference
pub mod source;

/// Engine configuration
pub mod config;

/// Query surface errors
pub mod error;

/// Lazy frames, data frames and sessions
pub mod frame;

pub use config::EngineConfig;
pub use error::{QueryError, TabulaResult};
pub use executor::{Row, Value};
pub use frame::{DataFrame, GroupBy, LazyFrame, SessionContext};
pub use logical::{
    coalesce, col, concat, count_star, lit, lit_null, row_number, AggregateFunc, JoinOptions,
    LogicalExpr, RankMethod, SortExpr, UnionMode,
};
pub use parser::{DataType, JoinType};
pub use source::{CsvReadOptions, CsvSource, MemorySource, RowSource};
