//! SQL parser for Tabula.
//!
//! This module provides SQL parsing using the `sqlparser` crate and
//! transforms its AST into Tabula's internal representation. Name
//! resolution happens later, in [`crate::logical::binder`].
//!
//! # Supported SQL
//!
//! - SELECT [DISTINCT] with WHERE, GROUP BY, HAVING, ORDER BY, LIMIT/OFFSET
//! - Joins (INNER, LEFT, RIGHT, FULL, CROSS, LEFT SEMI, LEFT ANTI)
//! - Subqueries in FROM, common table expressions (WITH)
//! - UNION [ALL]
//! - Window functions with OVER (PARTITION BY ... ORDER BY ...)
//! - EXPLAIN
//!
//! # Usage
//!
//! ```
//! use tabula_query::parser::{Parser, Statement};
//!
//! let sql = "SELECT year, avg(value) FROM sales GROUP BY year";
//! let statements = Parser::parse(sql).unwrap();
//! assert!(matches!(statements[0], Statement::Query(_)));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;
use thiserror::Error;

mod expr;
mod statement;
mod types;

pub use expr::*;
pub use statement::*;
pub use types::*;

/// Errors that can occur during SQL parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Error from the underlying sqlparser crate.
    #[error("SQL syntax error: {0}")]
    Syntax(String),

    /// Unsupported SQL feature.
    #[error("Unsupported SQL feature: {0}")]
    Unsupported(String),

    /// Invalid literal value.
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),

    /// Empty query.
    #[error("Empty query")]
    EmptyQuery,
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        ParseError::Syntax(err.to_string())
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// SQL parser.
///
/// Uses the PostgreSQL dialect.
pub struct Parser;

impl Parser {
    /// Parses a SQL string into a list of statements.
    pub fn parse(sql: &str) -> ParseResult<Vec<Statement>> {
        if sql.trim().is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        let dialect = PostgreSqlDialect {};
        let ast = SqlParser::parse_sql(&dialect, sql)?;

        if ast.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        ast.into_iter().map(Statement::from_sql_ast).collect()
    }

    /// Parses a single SQL statement.
    pub fn parse_one(sql: &str) -> ParseResult<Statement> {
        let mut statements = Self::parse(sql)?;
        if statements.len() != 1 {
            return Err(ParseError::Syntax(format!(
                "Expected 1 statement, got {}",
                statements.len()
            )));
        }
        Ok(statements.remove(0))
    }

    /// Parses a SQL expression.
    pub fn parse_expr(sql: &str) -> ParseResult<Expr> {
        let dialect = PostgreSqlDialect {};
        let mut parser = SqlParser::new(&dialect).try_with_sql(sql)?;
        let expr = parser.parse_expr()?;
        Expr::from_sql_ast(expr)
    }
}

/// A column reference (table.column or just column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Optional table or alias name.
    pub table: Option<String>,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Creates a new column reference.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// Creates a column reference with a table qualifier.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    /// Returns true if this column has a table qualifier.
    pub fn is_qualified(&self) -> bool {
        self.table.is_some()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref table) = self.table {
            write!(f, "{}.{}", table, self.column)
        } else {
            write!(f, "{}", self.column)
        }
    }
}

/// A table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Table name.
    pub table: String,
    /// Optional alias.
    pub alias: Option<String>,
}

impl TableRef {
    /// Creates a new table reference.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
        }
    }

    /// Adds an alias to the table reference.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Returns the effective name (alias or table name).
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table)?;
        if let Some(ref alias) = self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_select() {
        let sql = "SELECT year, town FROM sales";
        let statements = Parser::parse(sql).unwrap();
        assert_eq!(statements.len(), 1);

        match &statements[0] {
            Statement::Query(query) => match &query.body {
                SetExpr::Select(select) => {
                    assert_eq!(select.columns.len(), 2);
                    assert_eq!(select.from.len(), 1);
                }
                other => panic!("Expected SELECT body, got {:?}", other),
            },
            _ => panic!("Expected query"),
        }
    }

    #[test]
    fn test_parse_empty_query() {
        let result = Parser::parse("   ");
        assert!(matches!(result, Err(ParseError::EmptyQuery)));
    }

    #[test]
    fn test_parse_syntax_error() {
        let result = Parser::parse("SELEC year FROM sales");
        assert!(matches!(result, Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_parse_unsupported_statement() {
        let result = Parser::parse("DELETE FROM sales");
        assert!(matches!(result, Err(ParseError::Unsupported(_))));
    }

    #[test]
    fn test_parse_expr() {
        let expr = Parser::parse_expr("value * 2 > 100").unwrap();
        assert_eq!(expr.to_string(), "((value * 2) > 100)");
    }

    #[test]
    fn test_column_ref() {
        let col = ColumnRef::new("town");
        assert_eq!(col.to_string(), "town");
        assert!(!col.is_qualified());

        let col = ColumnRef::qualified("s", "town");
        assert_eq!(col.to_string(), "s.town");
        assert!(col.is_qualified());
    }

    #[test]
    fn test_table_ref() {
        let table = TableRef::new("sales").with_alias("s");
        assert_eq!(table.to_string(), "sales AS s");
        assert_eq!(table.effective_name(), "s");
    }
}
