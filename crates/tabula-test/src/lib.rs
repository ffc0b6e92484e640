//! # tabula-test
//!
//! End-to-end tests for the Tabula query engine.
//!
//! This crate contains:
//! - Shared fixtures (sales and towns tables, CSV files on disk)
//! - SQL and builder API scenarios
//! - Optimizer and streaming properties

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test fixtures and helpers
pub mod utils;
