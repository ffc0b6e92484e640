//! Cell decoding from text to typed values.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::executor::{ExecutionError, Value};
use crate::parser::DataType;

/// chrono format strings tried, in order, for temporal cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalFormats {
    /// Date formats.
    pub date: Vec<String>,
    /// Datetime formats.
    pub datetime: Vec<String>,
    /// Time-of-day formats.
    pub time: Vec<String>,
}

impl Default for TemporalFormats {
    fn default() -> Self {
        Self {
            date: vec!["%Y-%m-%d".into()],
            datetime: vec![
                "%Y-%m-%d %H:%M:%S".into(),
                "%Y-%m-%dT%H:%M:%S".into(),
                "%Y-%m-%d %H:%M:%S%.f".into(),
                "%Y-%m-%dT%H:%M:%S%.f".into(),
            ],
            time: vec!["%H:%M:%S".into(), "%H:%M:%S%.f".into()],
        }
    }
}

impl TemporalFormats {
    /// Parses a date with the first matching format.
    pub fn parse_date(&self, s: &str) -> Option<NaiveDate> {
        self.date
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    }

    /// Parses a datetime with the first matching format.
    pub fn parse_datetime(&self, s: &str) -> Option<NaiveDateTime> {
        self.datetime
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    }

    /// Parses a time of day with the first matching format.
    pub fn parse_time(&self, s: &str) -> Option<NaiveTime> {
        self.time
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
    }
}

/// Options for turning raw cells into values at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Cell contents read as null.
    pub null_values: Vec<String>,
    /// Temporal formats.
    pub formats: TemporalFormats,
    /// Decode failures produce null instead of an error; overlong rows are
    /// truncated instead of rejected.
    pub ignore_errors: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            null_values: default_null_values(),
            formats: TemporalFormats::default(),
            ignore_errors: false,
        }
    }
}

impl DecodeOptions {
    /// Returns true if the cell is a null token.
    pub fn is_null(&self, cell: &str) -> bool {
        self.null_values.iter().any(|n| n == cell)
    }
}

pub(crate) fn default_null_values() -> Vec<String> {
    vec!["".into(), "NA".into(), "null".into(), "NULL".into()]
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Decodes one raw cell into a value of `target`.
///
/// Missing cells and null tokens decode to null. Text that does not parse as
/// the target type fails with [`ExecutionError::Cast`], or decodes to null
/// when `ignore_errors` is set.
pub fn decode_cell(
    cell: Option<&str>,
    target: &DataType,
    options: &DecodeOptions,
) -> Result<Value, ExecutionError> {
    let Some(cell) = cell else {
        return Ok(Value::Null);
    };
    if options.is_null(cell) {
        return Ok(Value::Null);
    }

    let trimmed = cell.trim();
    let decoded = match target {
        DataType::Null => Some(Value::Null),
        DataType::Utf8 => Some(Value::Utf8(cell.to_string())),
        DataType::Boolean => parse_bool(trimmed).map(Value::Boolean),
        // Booleans widen into numeric columns as 0 and 1.
        DataType::Int64 => trimmed
            .parse::<i64>()
            .ok()
            .or_else(|| parse_bool(trimmed).map(i64::from))
            .map(Value::Int64),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .ok()
            .or_else(|| parse_bool(trimmed).map(|b| f64::from(u8::from(b))))
            .map(Value::Float64),
        DataType::Date => options.formats.parse_date(trimmed).map(Value::Date),
        DataType::Datetime => options
            .formats
            .parse_datetime(trimmed)
            .or_else(|| {
                options
                    .formats
                    .parse_date(trimmed)
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
            .map(Value::Datetime),
        DataType::Time => options.formats.parse_time(trimmed).map(Value::Time),
        DataType::List(_) | DataType::Struct(_) => None,
    };

    match decoded {
        Some(v) => Ok(v),
        None if options.ignore_errors => Ok(Value::Null),
        None => Err(ExecutionError::Cast {
            value: cell.to_string(),
            target: target.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(cell: &str, target: DataType) -> Result<Value, ExecutionError> {
        decode_cell(Some(cell), &target, &DecodeOptions::default())
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode("42", DataType::Int64).unwrap(), Value::int(42));
        assert_eq!(decode(" 2.5 ", DataType::Float64).unwrap(), Value::float(2.5));
        assert_eq!(decode("TRUE", DataType::Boolean).unwrap(), Value::boolean(true));
        assert_eq!(decode("A", DataType::Utf8).unwrap(), Value::string("A"));
        assert_eq!(
            decode("2020-01-05", DataType::Date).unwrap(),
            Value::date(2020, 1, 5)
        );
        assert!(matches!(
            decode("2020-01-05 10:00:00", DataType::Datetime).unwrap(),
            Value::Datetime(_)
        ));
    }

    #[test]
    fn test_booleans_in_numeric_columns() {
        assert_eq!(decode("true", DataType::Int64).unwrap(), Value::int(1));
        assert_eq!(decode("False", DataType::Float64).unwrap(), Value::float(0.0));
    }

    #[test]
    fn test_null_tokens_and_missing_cells() {
        assert!(decode("", DataType::Int64).unwrap().is_null());
        assert!(decode("NA", DataType::Float64).unwrap().is_null());
        assert!(decode_cell(None, &DataType::Utf8, &DecodeOptions::default())
            .unwrap()
            .is_null());
    }

    #[test]
    fn test_decode_failure() {
        let err = decode("abc", DataType::Int64).unwrap_err();
        assert!(matches!(err, ExecutionError::Cast { ref value, .. } if value == "abc"));

        let lenient = DecodeOptions {
            ignore_errors: true,
            ..DecodeOptions::default()
        };
        assert!(decode_cell(Some("abc"), &DataType::Int64, &lenient)
            .unwrap()
            .is_null());
    }

    #[test]
    fn test_custom_date_format() {
        let options = DecodeOptions {
            formats: TemporalFormats {
                date: vec!["%d/%m/%Y".into()],
                ..TemporalFormats::default()
            },
            ..DecodeOptions::default()
        };
        let v = decode_cell(Some("05/01/2020"), &DataType::Date, &options).unwrap();
        assert_eq!(v, Value::date(2020, 1, 5));
    }
}
