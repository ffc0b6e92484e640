//! In-memory row source.

use std::sync::Arc;

use super::{RawRow, RowSource, RowStream, SourceError};

/// Text rows held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    columns: Vec<String>,
    rows: Arc<Vec<RawRow>>,
}

impl MemorySource {
    /// Creates a source from raw rows.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Arc::new(rows),
        }
    }

    /// Creates a source from string slices. Every cell is present; empty
    /// strings are read as null by the default null tokens.
    pub fn from_strs(name: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| Some(c.to_string())).collect())
                .collect(),
        )
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the source holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RowSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.columns.clone())
    }

    fn open(&self) -> Result<RowStream, SourceError> {
        let rows = Arc::clone(&self.rows);
        Ok(Box::new(
            (0..rows.len()).filter_map(move |i| rows.get(i).cloned().map(Ok)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let source = MemorySource::from_strs("t", &["a", "b"], &[&["1", "x"], &["2", ""]]);
        assert_eq!(source.len(), 2);
        assert_eq!(source.columns().unwrap(), vec!["a", "b"]);

        let rows: Vec<RawRow> = source.open().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(rows[1], vec![Some("2".to_string()), Some(String::new())]);
    }
}
