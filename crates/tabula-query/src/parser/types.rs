//! Data types and literals.
//!
//! This module defines the column types understood by Tabula and the literal
//! values that can appear in queries.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::{ParseError, ParseResult};

/// Column data types supported by Tabula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of a column that only ever holds nulls.
    Null,
    /// Boolean type.
    Boolean,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 text.
    Utf8,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time without time zone.
    Datetime,
    /// Variable-length list of another type.
    List(Box<DataType>),
    /// Struct of named fields.
    Struct(Vec<(String, DataType)>),
}

impl DataType {
    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Returns true if this type is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int64)
    }

    /// Returns true if this type is a string type.
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Utf8)
    }

    /// Returns true if this type is a temporal type.
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Time | DataType::Datetime)
    }

    /// Returns true if this type is a nested (list or struct) type.
    pub fn is_nested(&self) -> bool {
        matches!(self, DataType::List(_) | DataType::Struct(_))
    }

    /// Returns true for the null type.
    pub fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    /// Returns the narrowest type both `self` and `other` widen to without
    /// loss, or `None` if no such type exists.
    ///
    /// `Int64` widens to `Float64`, `Date` widens to `Datetime`, and `Null`
    /// widens to anything.
    pub fn supertype(&self, other: &DataType) -> Option<DataType> {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => Some(a.clone()),
            (Null, t) | (t, Null) => Some(t.clone()),
            (Int64, Float64) | (Float64, Int64) => Some(Float64),
            (Date, Datetime) | (Datetime, Date) => Some(Datetime),
            (List(a), List(b)) => a.supertype(b).map(|t| List(Box::new(t))),
            _ => None,
        }
    }

    /// Like [`DataType::supertype`], but any two scalar types that have no
    /// strict supertype meet at `Utf8`.
    pub fn relaxed_supertype(&self, other: &DataType) -> Option<DataType> {
        if let Some(t) = self.supertype(other) {
            return Some(t);
        }
        if self.is_nested() || other.is_nested() {
            return None;
        }
        Some(DataType::Utf8)
    }

    /// Returns true if a value of this type can be compared with a value of
    /// `other` using ordering operators.
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        self.is_null() || other.is_null() || self.supertype(other).is_some()
    }

    /// Converts from sqlparser's DataType.
    pub fn from_sql_ast(dt: &sql_ast::DataType) -> ParseResult<Self> {
        match dt {
            sql_ast::DataType::Boolean | sql_ast::DataType::Bool => Ok(DataType::Boolean),
            sql_ast::DataType::TinyInt(_)
            | sql_ast::DataType::SmallInt(_)
            | sql_ast::DataType::Int(_)
            | sql_ast::DataType::Integer(_)
            | sql_ast::DataType::BigInt(_)
            | sql_ast::DataType::Int64 => Ok(DataType::Int64),
            sql_ast::DataType::Float(_)
            | sql_ast::DataType::Real
            | sql_ast::DataType::Double
            | sql_ast::DataType::DoublePrecision
            | sql_ast::DataType::Float64
            | sql_ast::DataType::Decimal(_)
            | sql_ast::DataType::Numeric(_) => Ok(DataType::Float64),
            sql_ast::DataType::Char(_)
            | sql_ast::DataType::Varchar(_)
            | sql_ast::DataType::CharacterVarying(_)
            | sql_ast::DataType::Text => Ok(DataType::Utf8),
            sql_ast::DataType::Date => Ok(DataType::Date),
            sql_ast::DataType::Time(_, _) => Ok(DataType::Time),
            sql_ast::DataType::Timestamp(_, _) | sql_ast::DataType::Datetime(_) => {
                Ok(DataType::Datetime)
            }
            sql_ast::DataType::Array(inner) => {
                let inner = match inner {
                    sql_ast::ArrayElemTypeDef::AngleBracket(dt) => DataType::from_sql_ast(dt)?,
                    sql_ast::ArrayElemTypeDef::SquareBracket(dt) => DataType::from_sql_ast(dt)?,
                    sql_ast::ArrayElemTypeDef::None => {
                        return Err(ParseError::Unsupported(
                            "Array without element type".to_string(),
                        ))
                    }
                };
                Ok(DataType::List(Box::new(inner)))
            }
            _ => Err(ParseError::Unsupported(format!("Data type: {}", dt))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Boolean => write!(f, "bool"),
            DataType::Int64 => write!(f, "i64"),
            DataType::Float64 => write!(f, "f64"),
            DataType::Utf8 => write!(f, "str"),
            DataType::Date => write!(f, "date"),
            DataType::Time => write!(f, "time"),
            DataType::Datetime => write!(f, "datetime"),
            DataType::List(inner) => write!(f, "list[{}]", inner),
            DataType::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A literal value in a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Date value.
    Date(NaiveDate),
    /// Time value.
    Time(NaiveTime),
    /// Datetime value.
    Datetime(NaiveDateTime),
}

impl Literal {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Returns the data type of this literal.
    pub fn data_type(&self) -> DataType {
        match self {
            Literal::Null => DataType::Null,
            Literal::Boolean(_) => DataType::Boolean,
            Literal::Integer(_) => DataType::Int64,
            Literal::Float(_) => DataType::Float64,
            Literal::String(_) => DataType::Utf8,
            Literal::Date(_) => DataType::Date,
            Literal::Time(_) => DataType::Time,
            Literal::Datetime(_) => DataType::Datetime,
        }
    }

    /// Converts from sqlparser's Value.
    pub fn from_sql_ast(value: &sql_ast::Value) -> ParseResult<Self> {
        match value {
            sql_ast::Value::Null => Ok(Literal::Null),
            sql_ast::Value::Boolean(b) => Ok(Literal::Boolean(*b)),
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Literal::Integer(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Literal::Float(f))
                } else {
                    Err(ParseError::InvalidLiteral(format!("Invalid number: {}", n)))
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Ok(Literal::String(s.clone()))
            }
            _ => Err(ParseError::Unsupported(format!("Literal value: {}", value))),
        }
    }

    /// Parses a typed string literal such as `DATE '2020-01-31'`.
    pub fn from_typed_string(data_type: &DataType, value: &str) -> ParseResult<Self> {
        let invalid = || ParseError::InvalidLiteral(format!("{} '{}'", data_type, value));
        match data_type {
            DataType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(Literal::Date)
                .map_err(|_| invalid()),
            DataType::Time => NaiveTime::parse_from_str(value, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
                .map(Literal::Time)
                .map_err(|_| invalid()),
            DataType::Datetime => NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
                .map(Literal::Datetime)
                .map_err(|_| invalid()),
            DataType::Utf8 => Ok(Literal::String(value.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Date(d) => write!(f, "DATE '{}'", d),
            Literal::Time(t) => write!(f, "TIME '{}'", t),
            Literal::Datetime(dt) => write!(f, "TIMESTAMP '{}'", dt),
        }
    }
}

/// Order direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// NULL handling for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsOrder {
    /// NULLs come first.
    First,
    /// NULLs come last.
    Last,
}

impl fmt::Display for NullsOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NullsOrder::First => write!(f, "NULLS FIRST"),
            NullsOrder::Last => write!(f, "NULLS LAST"),
        }
    }
}

/// Join type for table joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    /// Inner join - only matching rows.
    Inner,
    /// Left outer join - all left rows, matching right rows.
    Left,
    /// Right outer join - all right rows, matching left rows.
    Right,
    /// Full outer join - all rows from both tables.
    Full,
    /// Left semi join - left rows with at least one match.
    Semi,
    /// Left anti join - left rows with no match.
    Anti,
    /// Cross join - cartesian product.
    Cross,
}

impl JoinType {
    /// Converts from sqlparser's JoinOperator.
    pub fn from_sql_ast(op: &sql_ast::JoinOperator) -> ParseResult<Self> {
        match op {
            sql_ast::JoinOperator::Inner(_) => Ok(JoinType::Inner),
            sql_ast::JoinOperator::LeftOuter(_) => Ok(JoinType::Left),
            sql_ast::JoinOperator::RightOuter(_) => Ok(JoinType::Right),
            sql_ast::JoinOperator::FullOuter(_) => Ok(JoinType::Full),
            sql_ast::JoinOperator::LeftSemi(_) => Ok(JoinType::Semi),
            sql_ast::JoinOperator::LeftAnti(_) => Ok(JoinType::Anti),
            sql_ast::JoinOperator::CrossJoin => Ok(JoinType::Cross),
            _ => Err(ParseError::Unsupported(format!("Join type: {:?}", op))),
        }
    }

    /// Returns true if the output only contains columns of the left input.
    pub fn is_filtering(&self) -> bool {
        matches!(self, JoinType::Semi | JoinType::Anti)
    }

    /// Returns true if every left row appears in the output at least once.
    pub fn preserves_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// Returns true if every right row appears in the output at least once.
    pub fn preserves_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    /// Returns true if a filter on left columns can move below the join.
    pub fn pushes_left(&self) -> bool {
        matches!(
            self,
            JoinType::Inner | JoinType::Left | JoinType::Semi | JoinType::Anti | JoinType::Cross
        )
    }

    /// Returns true if a filter on right columns can move below the join.
    pub fn pushes_right(&self) -> bool {
        matches!(self, JoinType::Inner | JoinType::Right | JoinType::Cross)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
            JoinType::Right => write!(f, "RIGHT JOIN"),
            JoinType::Full => write!(f, "FULL JOIN"),
            JoinType::Semi => write!(f, "SEMI JOIN"),
            JoinType::Anti => write!(f, "ANTI JOIN"),
            JoinType::Cross => write!(f, "CROSS JOIN"),
        }
    }
}

/// Set operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOpType {
    /// UNION - combine results, remove duplicates.
    Union,
    /// UNION ALL - combine results, keep duplicates.
    UnionAll,
}

impl fmt::Display for SetOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOpType::Union => write!(f, "UNION"),
            SetOpType::UnionAll => write!(f, "UNION ALL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_display() {
        assert_eq!(DataType::Int64.to_string(), "i64");
        assert_eq!(DataType::List(Box::new(DataType::Utf8)).to_string(), "list[str]");
        assert_eq!(
            DataType::Struct(vec![
                ("a".to_string(), DataType::Int64),
                ("b".to_string(), DataType::Date)
            ])
            .to_string(),
            "struct{a: i64, b: date}"
        );
    }

    #[test]
    fn test_data_type_predicates() {
        assert!(DataType::Int64.is_numeric());
        assert!(DataType::Float64.is_numeric());
        assert!(!DataType::Utf8.is_numeric());
        assert!(DataType::Datetime.is_temporal());
        assert!(DataType::List(Box::new(DataType::Int64)).is_nested());
    }

    #[test]
    fn test_supertype() {
        assert_eq!(DataType::Int64.supertype(&DataType::Float64), Some(DataType::Float64));
        assert_eq!(DataType::Null.supertype(&DataType::Utf8), Some(DataType::Utf8));
        assert_eq!(DataType::Date.supertype(&DataType::Datetime), Some(DataType::Datetime));
        assert_eq!(DataType::Int64.supertype(&DataType::Utf8), None);
        assert_eq!(DataType::Boolean.supertype(&DataType::Int64), None);
    }

    #[test]
    fn test_relaxed_supertype() {
        assert_eq!(
            DataType::Int64.relaxed_supertype(&DataType::Utf8),
            Some(DataType::Utf8)
        );
        assert_eq!(
            DataType::Int64.relaxed_supertype(&DataType::Float64),
            Some(DataType::Float64)
        );
        assert_eq!(
            DataType::List(Box::new(DataType::Int64)).relaxed_supertype(&DataType::Utf8),
            None
        );
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::Null.to_string(), "NULL");
        assert_eq!(Literal::Integer(42).to_string(), "42");
        assert_eq!(Literal::Float(1.0).to_string(), "1.0");
        assert_eq!(Literal::String("it's".to_string()).to_string(), "'it''s'");
        assert_eq!(Literal::Boolean(true).to_string(), "TRUE");
    }

    #[test]
    fn test_typed_string_literal() {
        let lit = Literal::from_typed_string(&DataType::Date, "2020-03-01").unwrap();
        assert_eq!(
            lit,
            Literal::Date(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap())
        );
        assert!(Literal::from_typed_string(&DataType::Date, "March").is_err());
    }
}
