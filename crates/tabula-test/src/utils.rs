//! Fixtures shared by the integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use tabula_query::source::MemorySource;
use tabula_query::{DataFrame, EngineConfig, SessionContext, TabulaResult, Value};
use tempfile::TempDir;

/// Sales records: `(year, town, value)`.
pub const SALES: &[&[&str]] = &[
    &["2020", "A", "100"],
    &["2020", "B", "200"],
    &["2019", "A", "50"],
];

/// Town records: `(town, Address)`.
pub const TOWNS: &[&[&str]] = &[&["A", "1 High St"], &["B", "2 Low Rd"], &["C", "3 Mill Ln"]];

/// The sales table as an in-memory source.
pub fn sales_source() -> Arc<MemorySource> {
    Arc::new(MemorySource::from_strs("sales", &["year", "town", "value"], SALES))
}

/// The towns table as an in-memory source.
pub fn towns_source() -> Arc<MemorySource> {
    Arc::new(MemorySource::from_strs("towns", &["town", "Address"], TOWNS))
}

/// A session with `sales` and `towns` registered, using tiny chunks so that
/// chunk boundaries are crossed.
pub fn session() -> TabulaResult<SessionContext> {
    session_with_config(EngineConfig::for_testing())
}

/// Like [`session`], with a custom configuration.
pub fn session_with_config(config: EngineConfig) -> TabulaResult<SessionContext> {
    let ctx = SessionContext::with_config(config)?;
    ctx.register_source("sales", sales_source())?;
    ctx.register_source("towns", towns_source())?;
    Ok(ctx)
}

/// A temporary directory holding CSV files. Files are removed on drop.
pub struct CsvDir {
    dir: TempDir,
}

impl CsvDir {
    /// Creates an empty directory.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// Writes `contents` to `name` and returns its path.
    pub fn write(&self, name: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Values of one column, cloned.
pub fn column(df: &DataFrame, name: &str) -> Vec<Value> {
    df.column(name).map(|v| v.to_vec()).unwrap_or_default()
}

/// Rows rendered as strings, for compact assertions.
pub fn rendered_rows(df: &DataFrame) -> Vec<String> {
    df.rows().iter().map(|r| r.to_string()).collect()
}
