//! Tabula Performance Benchmarks
//!
//! This crate contains benchmarks for the Tabula query engine:
//! - CSV decoding and schema inference
//! - SQL parsing, optimization and end-to-end execution
//! - Streaming versus whole-source execution
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p tabula-bench
//! ```

pub mod utils;
