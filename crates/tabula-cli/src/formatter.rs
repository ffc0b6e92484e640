//! Output formatting for query results.
//!
//! Supports table, JSON, CSV, and raw output formats.

use std::fmt;
use std::str::FromStr;

use comfy_table::{Cell, ContentArrangement, Table};
use serde_json::{json, Value as JsonValue};

use tabula_query::{DataFrame, Value};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output.
    Table,
    /// JSON output.
    Json,
    /// CSV output.
    Csv,
    /// Raw output (values separated by tabs).
    Raw,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "raw" => Ok(OutputFormat::Raw),
            other => Err(format!(
                "Unknown format '{}'. Available: table, json, csv, raw",
                other
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Raw => "raw",
        };
        write!(f, "{}", name)
    }
}

/// Formats a data frame according to the specified format.
pub fn format_frame(df: &DataFrame, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_table(&df.column_names(), &cells(df)),
        OutputFormat::Json => format_json(df),
        OutputFormat::Csv => format_csv(df),
        OutputFormat::Raw => format_raw(df),
    }
}

fn cells(df: &DataFrame) -> Vec<Vec<String>> {
    df.rows()
        .iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
}

/// Formats a header and string cells as a table.
pub fn format_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut table = Table::new();

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

    if !header.is_empty() {
        table.set_header(header.iter().map(Cell::new));
    }

    for row in rows {
        table.add_row(row.iter().map(Cell::new));
    }

    table.to_string()
}

/// Formats the frame as a JSON array of objects.
fn format_json(df: &DataFrame) -> String {
    let names = df.column_names();
    let rows: Vec<JsonValue> = df
        .rows()
        .iter()
        .map(|row| {
            let obj: serde_json::Map<String, JsonValue> = names
                .iter()
                .cloned()
                .zip(row.iter().map(value_to_json))
                .collect();
            JsonValue::Object(obj)
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// Converts an engine value to a JSON value. Temporal values become
/// strings; non-finite floats become null.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => json!(*b),
        Value::Int64(i) => json!(*i),
        Value::Float64(f) => json!(*f),
        Value::Utf8(s) => json!(s),
        Value::Date(_) | Value::Time(_) | Value::Datetime(_) => json!(value.to_string()),
        Value::List(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Formats the frame as CSV. Nulls are empty fields.
fn format_csv(df: &DataFrame) -> String {
    let mut output = String::new();

    let header: Vec<String> = df.column_names().iter().map(|c| escape_csv(c)).collect();
    output.push_str(&header.join(","));
    output.push('\n');

    for row in df.rows() {
        let values: Vec<String> = row
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => escape_csv(&other.to_string()),
            })
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

/// Escapes a value for CSV output.
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Formats the frame as raw tab-separated values.
fn format_raw(df: &DataFrame) -> String {
    let mut output = String::new();

    output.push_str(&df.column_names().join("\t"));
    output.push('\n');

    for row in cells(df) {
        output.push_str(&row.join("\t"));
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_query::logical::{Field, Schema};
    use tabula_query::{DataType, Row};

    fn make_test_frame() -> DataFrame {
        let schema = Schema::new(vec![
            Field::nullable("id", DataType::Int64),
            Field::nullable("name", DataType::Utf8),
            Field::nullable("score", DataType::Float64),
        ]);
        DataFrame::from_rows(
            schema,
            vec![
                Row::new(vec![Value::int(1), Value::string("Alice"), Value::float(1.5)]),
                Row::new(vec![Value::int(2), Value::string("Bob, Jr."), Value::Null]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_format_table() {
        let output = format_frame(&make_test_frame(), OutputFormat::Table);
        assert!(output.contains("id"));
        assert!(output.contains("name"));
        assert!(output.contains("Alice"));
        assert!(output.contains("null"));
    }

    #[test]
    fn test_format_json() {
        let output = format_frame(&make_test_frame(), OutputFormat::Json);
        let parsed: Vec<JsonValue> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["name"], json!("Alice"));
        assert_eq!(parsed[0]["score"], json!(1.5));
        assert_eq!(parsed[1]["score"], JsonValue::Null);
    }

    #[test]
    fn test_format_csv() {
        let output = format_frame(&make_test_frame(), OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,name,score");
        assert_eq!(lines[1], "1,Alice,1.5");
        assert_eq!(lines[2], "2,\"Bob, Jr.\",");
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello,world"), "\"hello,world\"");
        assert_eq!(escape_csv("hello\"world"), "\"hello\"\"world\"");
    }

    #[test]
    fn test_format_raw() {
        let output = format_frame(&make_test_frame(), OutputFormat::Raw);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id\tname\tscore");
    }

    #[test]
    fn test_nested_values_to_json() {
        let value = Value::Struct(vec![
            ("tags".into(), Value::List(vec![Value::string("a"), Value::Null])),
            ("n".into(), Value::int(3)),
        ]);
        assert_eq!(value_to_json(&value), json!({"tags": ["a", null], "n": 3}));
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::Csv.to_string(), "csv");
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
