//! Schema inference over a sampled prefix of a row source.
//!
//! Each cell is classified as the narrowest type that parses it. Column
//! candidates merge along the widening paths boolean to integer to float
//! and date to datetime. Any other mix widens the column to text. A column
//! that widens while holding quoted cells is a conflict: strict inference
//! reports it, permissive inference logs it and keeps the text column.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::decode::{default_null_values, parse_bool, TemporalFormats};
use super::{RowSource, SourceError};
use crate::logical::{Field, Schema};
use crate::parser::DataType;

/// Errors raised while inferring a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    /// A column with quoted cells holds values of inconsistent types.
    #[error("Cannot infer type of column '{column}': conflicting types {}", join_types(.types))]
    ConflictingTypes {
        /// Column name.
        column: String,
        /// The conflicting types, in the order they were seen.
        types: Vec<DataType>,
    },

    /// A sampled row has more cells than the header.
    #[error("Cannot infer schema: row {row} has {found} fields, expected {expected}")]
    RowLength {
        /// 1-based row number, excluding the header.
        row: usize,
        /// Number of header columns.
        expected: usize,
        /// Number of cells found.
        found: usize,
    },
}

fn join_types(types: &[DataType]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Options for [`SchemaInferencer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions {
    /// Maximum number of rows to sample.
    pub sample_size: usize,
    /// Fail on overlong rows and on mixed types in columns with quoted
    /// cells instead of truncating and widening to text.
    pub strict: bool,
    /// Cell contents read as null.
    pub null_values: Vec<String>,
    /// Temporal formats tried during detection.
    pub formats: TemporalFormats,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            strict: true,
            null_values: default_null_values(),
            formats: TemporalFormats::default(),
        }
    }
}

/// Candidate types, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Boolean,
    Int64,
    Float64,
    Date,
    Datetime,
    Time,
    Utf8,
}

impl Candidate {
    fn data_type(self) -> DataType {
        match self {
            Candidate::Boolean => DataType::Boolean,
            Candidate::Int64 => DataType::Int64,
            Candidate::Float64 => DataType::Float64,
            Candidate::Date => DataType::Date,
            Candidate::Datetime => DataType::Datetime,
            Candidate::Time => DataType::Time,
            Candidate::Utf8 => DataType::Utf8,
        }
    }

    fn classify(cell: &str, formats: &TemporalFormats) -> Self {
        let s = cell.trim();
        if parse_bool(s).is_some() {
            Candidate::Boolean
        } else if s.parse::<i64>().is_ok() {
            Candidate::Int64
        } else if s.parse::<f64>().is_ok() {
            Candidate::Float64
        } else if formats.parse_date(s).is_some() {
            Candidate::Date
        } else if formats.parse_datetime(s).is_some() {
            Candidate::Datetime
        } else if formats.parse_time(s).is_some() {
            Candidate::Time
        } else {
            Candidate::Utf8
        }
    }

    /// The narrowest type holding both, or `None` when only text does.
    fn merge(self, other: Candidate) -> Option<Candidate> {
        use Candidate::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Boolean, Int64) | (Int64, Boolean) => Some(Int64),
            (Boolean | Int64, Float64) | (Float64, Boolean | Int64) => Some(Float64),
            (Date, Datetime) | (Datetime, Date) => Some(Datetime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ColumnType {
    /// Only nulls so far.
    Empty,
    Typed(Candidate),
    /// Widened to text; keeps the first pair that had no common type.
    Widened(Candidate, Candidate),
}

#[derive(Debug, Clone, Copy)]
struct ColumnState {
    ty: ColumnType,
    /// Some non-null cell was quoted in the input.
    quoted: bool,
}

impl ColumnState {
    fn conflict(&self) -> Option<(Candidate, Candidate)> {
        match self.ty {
            ColumnType::Widened(first, then) if self.quoted => Some((first, then)),
            _ => None,
        }
    }
}

/// Infers column types from a sample of rows.
#[derive(Debug, Clone, Default)]
pub struct SchemaInferencer {
    options: InferenceOptions,
}

impl SchemaInferencer {
    /// Creates an inferencer.
    pub fn new(options: InferenceOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    /// Samples up to `sample_size` rows from a fresh pass over `source` and
    /// returns a schema of nullable, unqualified fields.
    pub fn infer<S: RowSource + ?Sized>(&self, source: &S) -> Result<Schema, SourceError> {
        let names = source.columns()?;
        let mut states = vec![
            ColumnState {
                ty: ColumnType::Empty,
                quoted: false,
            };
            names.len()
        ];

        let mut sampled = 0;
        for (i, row) in source.open_sample()?.take(self.options.sample_size).enumerate() {
            let row = row?;
            sampled += 1;
            if row.cells.len() > names.len() {
                if self.options.strict {
                    return Err(InferenceError::RowLength {
                        row: i + 1,
                        expected: names.len(),
                        found: row.cells.len(),
                    }
                    .into());
                }
                debug!(row = i + 1, found = row.cells.len(), "truncating overlong row");
            }

            for (col, cell) in row.cells.iter().take(names.len()).enumerate() {
                let Some(cell) = cell.as_deref() else {
                    continue;
                };
                if self.options.null_values.iter().any(|n| n == cell) {
                    continue;
                }
                let state = &mut states[col];
                state.quoted |= row.is_quoted(col);
                let seen = Candidate::classify(cell, &self.options.formats);
                state.ty = match state.ty {
                    ColumnType::Empty => ColumnType::Typed(seen),
                    widened @ ColumnType::Widened(..) => widened,
                    ColumnType::Typed(current) => match current.merge(seen) {
                        Some(merged) => ColumnType::Typed(merged),
                        None => {
                            debug!(
                                column = %names[col],
                                first = %current.data_type(),
                                then = %seen.data_type(),
                                "mixed types, widening column to text"
                            );
                            ColumnType::Widened(current, seen)
                        }
                    },
                };
            }
        }

        for (name, state) in names.iter().zip(&states) {
            let Some((first, then)) = state.conflict() else {
                continue;
            };
            if self.options.strict {
                return Err(InferenceError::ConflictingTypes {
                    column: name.clone(),
                    types: vec![first.data_type(), then.data_type()],
                }
                .into());
            }
            warn!(
                column = %name,
                first = %first.data_type(),
                then = %then.data_type(),
                "conflicting quoted types, reading column as text"
            );
        }

        let fields = names
            .into_iter()
            .zip(states)
            .map(|(name, state)| {
                let data_type = match state.ty {
                    ColumnType::Typed(c) => c.data_type(),
                    ColumnType::Empty | ColumnType::Widened(..) => DataType::Utf8,
                };
                Field::nullable(name, data_type)
            })
            .collect();
        let schema = Schema::new(fields);
        debug!(source = source.name(), rows = sampled, schema = %schema, "inferred schema");
        Ok(schema)
    }
}
