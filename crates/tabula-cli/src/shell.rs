//! Statement execution shared by one-shot mode and the REPL.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use tabula_query::parser::{Parser, Statement};
use tabula_query::SessionContext;

use crate::config::CliConfig;
use crate::formatter::{self, OutputFormat};

/// A query session plus the display settings the REPL can change.
pub struct Shell {
    session: SessionContext,
    format: OutputFormat,
    timing: bool,
    streaming: bool,
    limit: Option<usize>,
    explain_only: bool,
}

impl Shell {
    /// Creates a shell and registers the tables listed in `config`.
    pub fn new(config: &CliConfig, format: OutputFormat) -> Result<Self> {
        let session = SessionContext::with_config(config.engine.clone())?;
        let shell = Self {
            session,
            format,
            timing: config.timing,
            streaming: config.engine.execution.streaming,
            limit: config.limit,
            explain_only: false,
        };
        for (name, path) in &config.tables {
            shell.register_table(name, path)?;
        }
        Ok(shell)
    }

    /// Registers a CSV file as a table.
    pub fn register_table(&self, name: &str, path: &Path) -> Result<()> {
        let schema = self
            .session
            .register_csv(name, path)
            .with_context(|| format!("registering table '{}' from {}", name, path.display()))?;
        info!(table = name, columns = schema.len(), "table ready");
        Ok(())
    }

    /// Runs one statement and returns the rendered output.
    pub fn run_sql(&self, sql: &str) -> Result<String> {
        let start = Instant::now();
        let statement = Parser::parse_one(sql)?;
        let frame = self.session.sql(sql)?;

        let mut output = if matches!(statement, Statement::Explain(_)) || self.explain_only {
            frame.explain()?
        } else {
            let df = frame.collect_with(self.streaming, self.limit)?;
            debug!(rows = df.height(), "statement finished");
            let mut rendered = formatter::format_frame(&df, self.format);
            if self.format == OutputFormat::Table {
                rendered.push_str(&format!(
                    "\n({} row{})",
                    df.height(),
                    if df.height() == 1 { "" } else { "s" }
                ));
            }
            rendered
        };

        if self.timing {
            output.push_str(&format!(
                "\nTime: {:.3}ms",
                start.elapsed().as_secs_f64() * 1000.0
            ));
        }
        Ok(output)
    }

    /// Renders the plan of `sql` before and after optimization.
    pub fn explain(&self, sql: &str) -> Result<String> {
        Ok(self.session.sql(sql)?.explain()?)
    }

    /// Lists tables, or the schema of one table.
    pub fn describe(&self, name: Option<&str>) -> Result<String> {
        match name {
            None => {
                let names = self.session.table_names();
                if names.is_empty() {
                    return Ok("No tables registered.".to_string());
                }
                let rows: Vec<Vec<String>> = names
                    .iter()
                    .map(|n| {
                        let columns = self
                            .session
                            .table_schema(n)
                            .map(|s| s.len().to_string())
                            .unwrap_or_default();
                        vec![n.clone(), columns]
                    })
                    .collect();
                Ok(formatter::format_table(
                    &["table".to_string(), "columns".to_string()],
                    &rows,
                ))
            }
            Some(name) => {
                let schema = self
                    .session
                    .table_schema(name)
                    .with_context(|| format!("Did not find any table named '{}'", name))?;
                let rows: Vec<Vec<String>> = schema
                    .fields()
                    .iter()
                    .map(|f| {
                        vec![
                            f.name().to_string(),
                            f.data_type.to_string(),
                            f.nullable.to_string(),
                        ]
                    })
                    .collect();
                Ok(formatter::format_table(
                    &["column".to_string(), "type".to_string(), "nullable".to_string()],
                    &rows,
                ))
            }
        }
    }

    /// Flips timing output and returns the new state.
    pub fn toggle_timing(&mut self) -> bool {
        self.timing = !self.timing;
        self.timing
    }

    /// Current output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Sets the output format.
    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    /// Sets the row limit.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Sets the execution mode.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Print plans instead of results.
    pub fn set_explain_only(&mut self, explain_only: bool) {
        self.explain_only = explain_only;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell(dir: &TempDir, format: OutputFormat) -> Shell {
        let path = dir.path().join("sales.csv");
        std::fs::write(&path, "year,town,value\n2020,A,100\n2020,B,200\n2019,A,50\n").unwrap();
        let mut config = CliConfig::default();
        config.tables.insert("sales".into(), path);
        Shell::new(&config, format).unwrap()
    }

    #[test]
    fn test_run_sql_csv_output() {
        let dir = TempDir::new().unwrap();
        let shell = shell(&dir, OutputFormat::Csv);
        let output = shell
            .run_sql("SELECT year, avg(value) AS mean FROM sales GROUP BY year ORDER BY year")
            .unwrap();
        assert_eq!(output, "year,mean\n2019,50.0\n2020,150.0\n");
    }

    #[test]
    fn test_limit_and_row_count() {
        let dir = TempDir::new().unwrap();
        let mut shell = shell(&dir, OutputFormat::Table);
        shell.set_limit(Some(1));
        let output = shell.run_sql("SELECT town FROM sales").unwrap();
        assert!(output.ends_with("(1 row)"));
    }

    #[test]
    fn test_explain_statement_and_flag() {
        let dir = TempDir::new().unwrap();
        let mut shell = shell(&dir, OutputFormat::Raw);
        let output = shell.run_sql("EXPLAIN SELECT town FROM sales").unwrap();
        assert!(output.contains("== Optimized Plan =="));

        shell.set_explain_only(true);
        let output = shell.run_sql("SELECT town FROM sales").unwrap();
        assert!(output.contains("== Logical Plan =="));
    }

    #[test]
    fn test_describe() {
        let dir = TempDir::new().unwrap();
        let shell = shell(&dir, OutputFormat::Table);
        assert!(shell.describe(None).unwrap().contains("sales"));
        let schema = shell.describe(Some("sales")).unwrap();
        assert!(schema.contains("year"));
        assert!(schema.contains("i64"));
        assert!(shell.describe(Some("missing")).is_err());
    }

    #[test]
    fn test_errors_are_reported() {
        let dir = TempDir::new().unwrap();
        let shell = shell(&dir, OutputFormat::Table);
        let err = shell.run_sql("SELECT nope FROM sales").unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert!(shell.run_sql("SELECT * FROM missing").is_err());
    }

    #[test]
    fn test_missing_csv_fails_registration() {
        let mut config = CliConfig::default();
        config.tables.insert("gone".into(), "/no/such/file.csv".into());
        assert!(Shell::new(&config, OutputFormat::Table).is_err());
    }
}
