//! Tabula command-line interface
//!
//! Registers CSV files as tables and runs SQL over them.
//!
//! # Usage
//!
//! ```bash
//! # Start interactive REPL
//! tabula --table sales=sales.csv
//!
//! # Execute a single query
//! tabula --table sales=sales.csv -c "SELECT year, avg(value) FROM sales GROUP BY year"
//!
//! # Execute queries from a file
//! tabula --table sales=sales.csv -f queries.sql
//!
//! # Output as JSON
//! tabula --table sales=sales.csv -o json -c "SELECT * FROM sales"
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod formatter;
mod repl;
mod shell;

use config::CliConfig;
use formatter::OutputFormat;
use repl::Repl;
use shell::Shell;

/// Tabula command-line interface
#[derive(Parser, Debug)]
#[command(
    name = "tabula",
    version,
    about = "Run SQL over CSV files",
    long_about = "Register CSV files as tables and query them with SQL.\n\n\
                  Queries are planned lazily, optimized, and executed in a\n\
                  streaming fashion."
)]
struct Args {
    /// Register a CSV file as a table (repeatable)
    #[arg(
        short = 't',
        long = "table",
        value_name = "NAME=PATH",
        value_parser = parse_table_arg,
        env = "TABULA_TABLES",
        value_delimiter = ','
    )]
    tables: Vec<(String, PathBuf)>,

    /// Execute a single SQL query and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Execute SQL queries from file and exit
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, env = "TABULA_OUTPUT")]
    output: Option<OutputFormatArg>,

    /// Print the logical and optimized plans instead of results
    #[arg(long)]
    explain: bool,

    /// Keep at most this many rows of every result
    #[arg(long, env = "TABULA_LIMIT")]
    limit: Option<usize>,

    /// Read each source in a single chunk
    #[arg(long)]
    no_streaming: bool,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Suppress the banner (for scripting)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE", env = "TABULA_CONFIG")]
    config: Option<PathBuf>,
}

/// Output format argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    /// Display results in a formatted table
    Table,
    /// Display results as JSON
    Json,
    /// Display results as CSV
    Csv,
    /// Display raw values
    Raw,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Csv => OutputFormat::Csv,
            OutputFormatArg::Raw => OutputFormat::Raw,
        }
    }
}

fn parse_table_arg(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", arg)),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config = load_config(&args)?;
    let format = match args.output {
        Some(arg) => arg.into(),
        None => config
            .output_format
            .parse::<OutputFormat>()
            .map_err(anyhow::Error::msg)?,
    };

    let mut shell = Shell::new(&config, format)?;
    shell.set_explain_only(args.explain);

    if let Some(command) = &args.command {
        execute_command(&shell, command)
    } else if let Some(file) = &args.file {
        execute_file(&shell, file)
    } else {
        run_repl(shell, &config, args.quiet)
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tabula=debug,tabula_query=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<CliConfig> {
    let mut config = if let Some(path) = &args.config {
        CliConfig::from_file(path)?
    } else {
        CliConfig::load_default()?
    };

    for (name, path) in &args.tables {
        config.tables.insert(name.clone(), path.clone());
    }
    if args.limit.is_some() {
        config.limit = args.limit;
    }
    if args.no_streaming {
        config.engine.execution.streaming = false;
    }

    Ok(config)
}

fn execute_command(shell: &Shell, sql: &str) -> Result<()> {
    info!("Executing command: {}", sql);

    for statement in split_statements(sql) {
        println!("{}", shell.run_sql(statement)?);
    }
    Ok(())
}

fn execute_file(shell: &Shell, path: &Path) -> Result<()> {
    info!("Executing file: {}", path.display());

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    for statement in split_statements(&content) {
        println!("{}", shell.run_sql(statement)?);
    }
    Ok(())
}

fn run_repl(shell: Shell, config: &CliConfig, quiet: bool) -> Result<()> {
    let mut repl = Repl::new(shell, config.history_path(), config.history_size)?;

    if !quiet {
        repl.print_banner();
    }

    repl.run()
}

/// Splits SQL text into statements on semicolons outside quotes and
/// comments. Empty and comment-only statements are dropped.
pub(crate) fn split_statements(content: &str) -> Vec<&str> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Quoted(char),
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut state = State::Code;
    let mut start = 0;
    let mut has_code = false;
    let mut chars = content.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        state = match (state, c) {
            (State::Code, '-') if next == Some('-') => {
                chars.next();
                State::LineComment
            }
            (State::Code, '/') if next == Some('*') => {
                chars.next();
                State::BlockComment
            }
            (State::Code, '\'' | '"') => {
                has_code = true;
                State::Quoted(c)
            }
            (State::Code, ';') => {
                if has_code {
                    statements.push(content[start..i].trim());
                }
                start = i + 1;
                has_code = false;
                State::Code
            }
            (State::Code, c) => {
                has_code |= !c.is_whitespace();
                State::Code
            }
            // A doubled quote is an escaped quote and keeps the string open.
            (State::Quoted(q), c) if c == q => {
                if next == Some(q) {
                    chars.next();
                    State::Quoted(q)
                } else {
                    State::Code
                }
            }
            (State::LineComment, '\n') => State::Code,
            (State::BlockComment, '*') if next == Some('/') => {
                chars.next();
                State::Code
            }
            (s, _) => s,
        };
    }

    if has_code {
        statements.push(content[start..].trim());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements_simple() {
        let stmts = split_statements("SELECT 1; SELECT 2; SELECT 3");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    }

    #[test]
    fn test_split_statements_with_strings() {
        let stmts = split_statements("SELECT 'hello; it''s'; SELECT 2;");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0], "SELECT 'hello; it''s'");
    }

    #[test]
    fn test_split_statements_with_comments() {
        let stmts = split_statements("SELECT 1; -- comment with ; semicolon\nSELECT 2");
        assert_eq!(stmts.len(), 2);

        let stmts = split_statements("SELECT 1; /* block ; comment */ SELECT 2");
        assert_eq!(stmts.len(), 2);

        assert!(split_statements("-- only a comment;\n  ;").is_empty());
    }

    #[test]
    fn test_split_statements_multibyte() {
        let stmts = split_statements("SELECT 'é;ü' AS s; SELECT 2");
        assert_eq!(stmts, vec!["SELECT 'é;ü' AS s", "SELECT 2"]);
    }

    #[test]
    fn test_parse_table_arg() {
        assert_eq!(
            parse_table_arg("sales=data/sales.csv").unwrap(),
            ("sales".to_string(), PathBuf::from("data/sales.csv"))
        );
        assert!(parse_table_arg("sales").is_err());
        assert!(parse_table_arg("=x.csv").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "tabula",
            "--table",
            "a=a.csv",
            "--table",
            "b=b.csv",
            "-o",
            "json",
            "--limit",
            "5",
            "--no-streaming",
            "-c",
            "SELECT 1",
        ])
        .unwrap();
        assert_eq!(args.tables.len(), 2);
        assert!(matches!(args.output, Some(OutputFormatArg::Json)));
        assert_eq!(args.limit, Some(5));
        assert!(args.no_streaming);
        assert_eq!(args.command.as_deref(), Some("SELECT 1"));
    }
}
