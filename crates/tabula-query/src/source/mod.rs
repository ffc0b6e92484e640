//! Row sources.
//!
//! A [`RowSource`] hands out fresh iterators of raw text rows. Sources know
//! nothing about types: the [`SchemaInferencer`] samples a prefix to pick
//! column types, and the scan operator decodes cells with [`decode_cell`].
//!
//! Every call to [`RowSource::open`] starts from the first row, so schema
//! inference and execution never share a cursor.

use std::fmt;

use thiserror::Error;

use crate::logical::Schema;

mod counting;
mod csv;
mod decode;
mod infer;
mod memory;

pub use counting::CountingSource;
pub use csv::{CsvReadOptions, CsvSource};
pub use decode::{decode_cell, DecodeOptions, TemporalFormats};
pub use infer::{InferenceError, InferenceOptions, SchemaInferencer};
pub use memory::MemorySource;

/// One row of raw cells. `None` is a missing cell (a short row).
pub type RawRow = Vec<Option<String>>;

/// Iterator over the rows of one pass through a source.
pub type RowStream = Box<dyn Iterator<Item = Result<RawRow, SourceError>> + Send>;

/// Errors raised by row sources and schema inference.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be opened or read.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path or source name.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV input.
    #[error("CSV error in {name}: {message}")]
    Csv {
        /// Source name.
        name: String,
        /// Parser message.
        message: String,
    },

    /// The sampled rows have no consistent schema.
    #[error(transparent)]
    SchemaInference(#[from] InferenceError),

    /// A row has more cells than the header.
    #[error("Row {row} has {found} fields, expected {expected}")]
    RowLength {
        /// 1-based row number, excluding the header.
        row: usize,
        /// Number of header columns.
        expected: usize,
        /// Number of cells found.
        found: usize,
    },
}

/// A row read for schema inference, with the cells that were quoted in
/// the input flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRow {
    /// The raw cells.
    pub cells: RawRow,
    /// One flag per cell; empty when the source has no quoting.
    pub quoted: Vec<bool>,
}

impl SampleRow {
    /// A row with no quoted cells.
    pub fn unquoted(cells: RawRow) -> Self {
        Self {
            cells,
            quoted: Vec::new(),
        }
    }

    /// Whether cell `i` was quoted.
    pub fn is_quoted(&self, i: usize) -> bool {
        self.quoted.get(i).copied().unwrap_or(false)
    }
}

/// Iterator over the rows of one sampling pass.
pub type SampleStream = Box<dyn Iterator<Item = Result<SampleRow, SourceError>> + Send>;

/// A source of text rows.
///
/// Implementations must be cheap to reopen: the inferencer and every
/// execution call [`open`](RowSource::open) independently.
pub trait RowSource: Send + Sync + fmt::Debug {
    /// Name used in plans and error messages.
    fn name(&self) -> &str;

    /// Column names, in order.
    fn columns(&self) -> Result<Vec<String>, SourceError>;

    /// Starts a fresh pass over the rows.
    fn open(&self) -> Result<RowStream, SourceError>;

    /// Starts a fresh pass for schema inference. Sources with quoting
    /// override this to report which cells were quoted.
    fn open_sample(&self) -> Result<SampleStream, SourceError> {
        Ok(Box::new(self.open()?.map(|row| row.map(SampleRow::unquoted))))
    }

    /// Infers a schema from at most `sample_size` rows with the default
    /// inference options.
    fn schema_hint(&self, sample_size: usize) -> Result<Schema, SourceError> {
        let options = InferenceOptions {
            sample_size,
            ..InferenceOptions::default()
        };
        SchemaInferencer::new(options).infer(self)
    }
}

/// Makes header names unique by suffixing repeats.
pub(crate) fn dedup_names(names: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .map(|name| {
            if seen.insert(name.clone()) {
                return name;
            }
            let mut n = 0;
            loop {
                let candidate = format!("{}_duplicated_{}", name, n);
                if seen.insert(candidate.clone()) {
                    return candidate;
                }
                n += 1;
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DataType;

    #[test]
    fn test_dedup_names() {
        let names = dedup_names(vec!["a".into(), "b".into(), "a".into(), "a".into()]);
        assert_eq!(names, vec!["a", "b", "a_duplicated_0", "a_duplicated_1"]);
    }

    #[test]
    fn test_error_display() {
        let err = SourceError::from(InferenceError::ConflictingTypes {
            column: "x".into(),
            types: vec![DataType::Int64, DataType::Utf8],
        });
        assert_eq!(
            err.to_string(),
            "Cannot infer type of column 'x': conflicting types i64, str"
        );

        let err = SourceError::from(InferenceError::RowLength {
            row: 1,
            expected: 2,
            found: 3,
        });
        assert_eq!(
            err.to_string(),
            "Cannot infer schema: row 1 has 3 fields, expected 2"
        );
    }
}
