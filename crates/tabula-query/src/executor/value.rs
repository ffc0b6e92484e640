//! Runtime values for query execution.
//!
//! This module defines the `Value` type which represents a single cell
//! during query execution, including nested list and struct values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::ExecutionError;
use crate::parser::{DataType, Literal};

/// A runtime value during query execution.
#[derive(Debug, Clone)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// String value.
    Utf8(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Date and time.
    Datetime(NaiveDateTime),
    /// List of values. A null list is `Value::Null`; elements may be null.
    List(Vec<Value>),
    /// Struct of named values. A null struct is `Value::Null`.
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// Creates a NULL value.
    pub fn null() -> Self {
        Value::Null
    }

    /// Creates a boolean value.
    pub fn boolean(v: bool) -> Self {
        Value::Boolean(v)
    }

    /// Creates an integer value.
    pub fn int(v: i64) -> Self {
        Value::Int64(v)
    }

    /// Creates a float value.
    pub fn float(v: f64) -> Self {
        Value::Float64(v)
    }

    /// Creates a string value.
    pub fn string(v: impl Into<String>) -> Self {
        Value::Utf8(v.into())
    }

    /// Creates a date value, or NULL if the date does not exist.
    pub fn date(year: i32, month: u32, day: u32) -> Self {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Value::Date)
            .unwrap_or(Value::Null)
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a numeric value to an i64.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Float64(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Converts a numeric value to an f64.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the data type of this value. NULL has the null type.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::Utf8(_) => DataType::Utf8,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::Datetime(_) => DataType::Datetime,
            Value::List(items) => {
                let inner = items
                    .iter()
                    .map(|v| v.data_type())
                    .fold(DataType::Null, |acc, t| acc.supertype(&t).unwrap_or(acc));
                DataType::List(Box::new(inner))
            }
            Value::Struct(fields) => DataType::Struct(
                fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.data_type()))
                    .collect(),
            ),
        }
    }

    /// Casts this value to the specified type.
    ///
    /// NULL casts to NULL. Float to integer truncates toward zero and fails
    /// when out of range; integer to boolean maps non-zero to true; every
    /// value casts to text through its display form. Conversions with no
    /// well-defined meaning fail with [`ExecutionError::Cast`].
    pub fn cast(&self, target: &DataType) -> Result<Value, ExecutionError> {
        let fail = || ExecutionError::Cast {
            value: self.to_string(),
            target: target.clone(),
        };

        if self.is_null() {
            return Ok(Value::Null);
        }

        match (self, target) {
            (_, DataType::Null) => Err(fail()),
            (v, t) if &v.data_type() == t => Ok(v.clone()),

            (Value::Int64(i), DataType::Boolean) => Ok(Value::Boolean(*i != 0)),
            (Value::Utf8(s), DataType::Boolean) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(fail()),
            },

            (Value::Boolean(b), DataType::Int64) => Ok(Value::Int64(i64::from(*b))),
            (Value::Float64(f), DataType::Int64) => {
                let t = f.trunc();
                if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
                    Ok(Value::Int64(t as i64))
                } else {
                    Err(fail())
                }
            }
            (Value::Utf8(s), DataType::Int64) => {
                s.trim().parse::<i64>().map(Value::Int64).map_err(|_| fail())
            }

            (Value::Boolean(b), DataType::Float64) => {
                Ok(Value::Float64(if *b { 1.0 } else { 0.0 }))
            }
            (Value::Int64(i), DataType::Float64) => Ok(Value::Float64(*i as f64)),
            (Value::Utf8(s), DataType::Float64) => {
                s.trim().parse::<f64>().map(Value::Float64).map_err(|_| fail())
            }

            (Value::Utf8(s), DataType::Date) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| fail()),
            (Value::Datetime(dt), DataType::Date) => Ok(Value::Date(dt.date())),

            (Value::Utf8(s), DataType::Time) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f"))
                .map(Value::Time)
                .map_err(|_| fail()),
            (Value::Datetime(dt), DataType::Time) => Ok(Value::Time(dt.time())),

            (Value::Utf8(s), DataType::Datetime) => {
                let s = s.trim();
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                    .or_else(|_| {
                        NaiveDate::parse_from_str(s, "%Y-%m-%d")
                            .map(|d| d.and_time(NaiveTime::MIN))
                    })
                    .map(Value::Datetime)
                    .map_err(|_| fail())
            }
            (Value::Date(d), DataType::Datetime) => Ok(Value::Datetime(d.and_time(NaiveTime::MIN))),

            (v, DataType::Utf8) if !matches!(v, Value::List(_) | Value::Struct(_)) => {
                Ok(Value::Utf8(v.to_string()))
            }

            (Value::List(items), DataType::List(inner)) => items
                .iter()
                .map(|v| v.cast(inner))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),

            (Value::Struct(fields), DataType::Struct(target_fields))
                if fields.len() == target_fields.len() =>
            {
                fields
                    .iter()
                    .zip(target_fields.iter())
                    .map(|((_, v), (name, ty))| Ok((name.clone(), v.cast(ty)?)))
                    .collect::<Result<Vec<_>, ExecutionError>>()
                    .map(Value::Struct)
            }

            _ => Err(fail()),
        }
    }

    /// Creates a Value from a Literal.
    pub fn from_literal(lit: &Literal) -> Self {
        match lit {
            Literal::Null => Value::Null,
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Integer(i) => Value::Int64(*i),
            Literal::Float(f) => Value::Float64(*f),
            Literal::String(s) => Value::Utf8(s.clone()),
            Literal::Date(d) => Value::Date(*d),
            Literal::Time(t) => Value::Time(*t),
            Literal::Datetime(dt) => Value::Datetime(*dt),
        }
    }

    /// Converts a scalar value back into a literal. Nested values have no
    /// literal form.
    pub fn to_literal(&self) -> Option<Literal> {
        match self {
            Value::Null => Some(Literal::Null),
            Value::Boolean(b) => Some(Literal::Boolean(*b)),
            Value::Int64(i) => Some(Literal::Integer(*i)),
            Value::Float64(f) => Some(Literal::Float(*f)),
            Value::Utf8(s) => Some(Literal::String(s.clone())),
            Value::Date(d) => Some(Literal::Date(*d)),
            Value::Time(t) => Some(Literal::Time(*t)),
            Value::Datetime(dt) => Some(Literal::Datetime(*dt)),
            Value::List(_) | Value::Struct(_) => None,
        }
    }

    /// Returns the year of a date or datetime.
    pub fn year(&self) -> Option<i64> {
        match self {
            Value::Date(d) => Some(i64::from(d.year())),
            Value::Datetime(dt) => Some(i64::from(dt.year())),
            _ => None,
        }
    }

    /// Returns the month of a date or datetime.
    pub fn month(&self) -> Option<i64> {
        match self {
            Value::Date(d) => Some(i64::from(d.month())),
            Value::Datetime(dt) => Some(i64::from(dt.month())),
            _ => None,
        }
    }

    /// Returns the day of month of a date or datetime.
    pub fn day(&self) -> Option<i64> {
        match self {
            Value::Date(d) => Some(i64::from(d.day())),
            Value::Datetime(dt) => Some(i64::from(dt.day())),
            _ => None,
        }
    }

    /// Returns the hour of a time or datetime.
    pub fn hour(&self) -> Option<i64> {
        match self {
            Value::Time(t) => Some(i64::from(t.hour())),
            Value::Datetime(dt) => Some(i64::from(dt.hour())),
            _ => None,
        }
    }

    /// Position on a linear axis used by rolling windows: days for dates,
    /// microseconds for datetimes and times, the value itself for integers.
    pub fn index_position(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Date(d) => Some(i64::from(d.num_days_from_ce())),
            Value::Datetime(dt) => Some(dt.and_utc().timestamp_micros()),
            Value::Time(t) => Some(
                i64::from(t.num_seconds_from_midnight()) * 1_000_000
                    + i64::from(t.nanosecond() / 1_000),
            ),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int64(_) | Value::Float64(_) => 2,
            Value::Utf8(_) => 3,
            Value::Date(_) => 4,
            Value::Time(_) => 5,
            Value::Datetime(_) => 6,
            Value::List(_) => 7,
            Value::Struct(_) => 8,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Total order used for sorting and grouping. NULL sorts before every
    /// other value; integers and floats compare numerically.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).total_cmp(b),
            (Value::Float64(a), Value::Int64(b)) => a.total_cmp(&(*b as f64)),
            (Value::Utf8(a), Value::Utf8(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::Datetime(a), Value::Datetime(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Struct(a), Value::Struct(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            // Integers and integral floats compare equal, so they must hash
            // identically.
            Value::Int64(i) => (*i as f64).to_bits().hash(state),
            Value::Float64(f) => {
                let normalized = if *f == 0.0 { 0.0 } else { *f };
                normalized.to_bits().hash(state)
            }
            Value::Utf8(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Datetime(dt) => dt.hash(state),
            Value::List(items) => items.hash(state),
            Value::Struct(fields) => fields.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Value::Utf8(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t),
            Value::Datetime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        let v = Value::null();
        assert!(v.is_null());
        assert_eq!(v.data_type(), DataType::Null);
        assert!(v.cast(&DataType::Int64).unwrap().is_null());
    }

    #[test]
    fn test_value_comparison() {
        assert!(Value::int(10) < Value::int(20));
        assert!(Value::Null < Value::int(0));
        assert!(Value::int(10) == Value::float(10.0));
        assert!(Value::int(10) < Value::float(10.5));
        assert!(Value::string("a") < Value::string("b"));
    }

    #[test]
    fn test_value_hash_matches_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(Value::int(2), "two");
        assert_eq!(map.get(&Value::float(2.0)), Some(&"two"));
        map.insert(Value::List(vec![Value::int(1), Value::Null]), "list");
        assert_eq!(
            map.get(&Value::List(vec![Value::int(1), Value::Null])),
            Some(&"list")
        );
    }

    #[test]
    fn test_cast_numeric() {
        assert_eq!(Value::int(3).cast(&DataType::Float64).unwrap(), Value::float(3.0));
        assert_eq!(Value::float(-2.9).cast(&DataType::Int64).unwrap(), Value::int(-2));
        assert!(Value::float(1e300).cast(&DataType::Int64).is_err());
        assert_eq!(Value::int(0).cast(&DataType::Boolean).unwrap(), Value::boolean(false));
    }

    #[test]
    fn test_cast_text() {
        assert_eq!(Value::string(" 42 ").cast(&DataType::Int64).unwrap(), Value::int(42));
        assert_eq!(Value::int(42).cast(&DataType::Utf8).unwrap(), Value::string("42"));
        assert_eq!(
            Value::string("2021-05-04").cast(&DataType::Date).unwrap(),
            Value::date(2021, 5, 4)
        );

        let err = Value::string("abc").cast(&DataType::Int64).unwrap_err();
        match err {
            ExecutionError::Cast { value, target } => {
                assert_eq!(value, "abc");
                assert_eq!(target, DataType::Int64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cast_nested() {
        let list = Value::List(vec![Value::int(1), Value::Null]);
        let cast = list.cast(&DataType::List(Box::new(DataType::Float64))).unwrap();
        assert_eq!(cast, Value::List(vec![Value::float(1.0), Value::Null]));
        assert!(list.cast(&DataType::Int64).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::float(150.0).to_string(), "150.0");
        assert_eq!(Value::float(0.25).to_string(), "0.25");
        assert_eq!(Value::date(2020, 1, 2).to_string(), "2020-01-02");
        assert_eq!(
            Value::List(vec![Value::int(1), Value::string("x")]).to_string(),
            "[1, x]"
        );
    }

    #[test]
    fn test_index_position() {
        let a = Value::date(2020, 1, 1).index_position().unwrap();
        let b = Value::date(2020, 1, 4).index_position().unwrap();
        assert_eq!(b - a, 3);
    }
}
