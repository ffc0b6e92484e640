//! Record batch: the row chunk passed between operators.
//!
//! A [`RecordBatch`] stores a bounded number of rows in columnar form. Its
//! size is governed by the execution batch size, which is what bounds peak
//! memory in streaming mode.

use std::fmt;
use std::sync::Arc;

use super::{ExecutionError, Row, Value};
use crate::logical::Schema;
use crate::parser::DataType;

/// A batch of rows stored column by column.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// The schema of this batch.
    schema: Arc<Schema>,
    /// The columns in this batch.
    columns: Vec<Column>,
    /// Number of rows in this batch.
    num_rows: usize,
}

impl RecordBatch {
    /// Creates a new record batch with the given schema and columns.
    pub fn new(schema: Arc<Schema>, columns: Vec<Column>) -> Result<Self, ExecutionError> {
        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);

        for (i, col) in columns.iter().enumerate() {
            if col.len() != num_rows {
                return Err(ExecutionError::Internal(format!(
                    "column {} has {} rows, expected {}",
                    i,
                    col.len(),
                    num_rows
                )));
            }
        }

        if columns.len() != schema.len() {
            return Err(ExecutionError::Internal(format!(
                "column count {} doesn't match schema field count {}",
                columns.len(),
                schema.len()
            )));
        }

        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// Creates an empty record batch with the given schema.
    pub fn empty(schema: Arc<Schema>) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| Column::empty(f.data_type.clone()))
            .collect();
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    /// Creates a record batch from rows.
    pub fn from_rows(schema: Arc<Schema>, rows: Vec<Row>) -> Result<Self, ExecutionError> {
        let mut builder = RecordBatchBuilder::with_capacity(schema, rows.len());
        for row in rows {
            builder.append_row(row)?;
        }
        builder.build()
    }

    /// Creates a record batch with columns but no fields, holding `num_rows`
    /// empty rows.
    pub fn empty_rows(num_rows: usize) -> Self {
        Self {
            schema: Arc::new(Schema::empty()),
            columns: Vec::new(),
            num_rows,
        }
    }

    /// Returns the schema of this batch.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the number of rows in this batch.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns the number of columns in this batch.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if this batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Returns the column at the given index.
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns all columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Consumes the batch and returns its columns.
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Returns the row at the given index.
    pub fn row(&self, index: usize) -> Option<Row> {
        if index >= self.num_rows {
            return None;
        }
        Some(Row::new(
            self.columns.iter().map(|c| c.get(index).clone()).collect(),
        ))
    }

    /// Returns an iterator over all rows.
    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.num_rows).filter_map(move |i| self.row(i))
    }

    /// Projects the batch to the specified columns.
    pub fn project(&self, indices: &[usize], schema: Arc<Schema>) -> Result<RecordBatch, ExecutionError> {
        let columns = indices
            .iter()
            .map(|&i| {
                self.columns.get(i).cloned().ok_or_else(|| {
                    ExecutionError::Internal(format!("column index {} out of range", i))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordBatch {
            schema,
            columns,
            num_rows: self.num_rows,
        })
    }

    /// Keeps the rows whose mask entry is true.
    pub fn filter(&self, mask: &[bool]) -> Result<RecordBatch, ExecutionError> {
        if mask.len() != self.num_rows {
            return Err(ExecutionError::Internal(format!(
                "filter mask has {} entries for {} rows",
                mask.len(),
                self.num_rows
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|col| {
                let values = col
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect();
                Column::new(col.data_type.clone(), values)
            })
            .collect();
        Ok(RecordBatch {
            schema: self.schema.clone(),
            columns,
            num_rows: mask.iter().filter(|k| **k).count(),
        })
    }

    /// Concatenates batches sharing a schema.
    pub fn concat(schema: Arc<Schema>, batches: &[RecordBatch]) -> Result<RecordBatch, ExecutionError> {
        let total: usize = batches.iter().map(|b| b.num_rows).sum();
        let mut columns: Vec<Column> = schema
            .fields()
            .iter()
            .map(|f| Column::with_capacity(f.data_type.clone(), total))
            .collect();
        for batch in batches {
            if batch.num_columns() != columns.len() {
                return Err(ExecutionError::Internal(format!(
                    "cannot concatenate batch of {} columns into {} columns",
                    batch.num_columns(),
                    columns.len()
                )));
            }
            for (target, source) in columns.iter_mut().zip(&batch.columns) {
                target.values.extend(source.values.iter().cloned());
            }
        }
        Ok(RecordBatch {
            schema,
            columns,
            num_rows: total,
        })
    }

    /// Returns `length` rows starting at `offset`, clamped to the batch.
    pub fn slice(&self, offset: usize, length: usize) -> RecordBatch {
        let start = offset.min(self.num_rows);
        let end = start.saturating_add(length).min(self.num_rows);
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.data_type.clone(), c.values[start..end].to_vec()))
            .collect();
        RecordBatch {
            schema: self.schema.clone(),
            columns,
            num_rows: end - start,
        }
    }

    /// Appends a column, extending the schema.
    pub fn with_column(mut self, schema: Arc<Schema>, column: Column) -> Result<RecordBatch, ExecutionError> {
        if column.len() != self.num_rows {
            return Err(ExecutionError::Internal(format!(
                "appended column has {} rows, expected {}",
                column.len(),
                self.num_rows
            )));
        }
        self.columns.push(column);
        RecordBatch::new(schema, self.columns)
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.schema.names().join(" | "))?;
        for row in self.rows() {
            let cells: Vec<_> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}

/// A column of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// The data type of this column.
    data_type: DataType,
    /// The values.
    values: Vec<Value>,
}

impl Column {
    /// Creates a new column.
    pub fn new(data_type: DataType, values: Vec<Value>) -> Self {
        Self { data_type, values }
    }

    /// Creates an empty column.
    pub fn empty(data_type: DataType) -> Self {
        Self {
            data_type,
            values: Vec::new(),
        }
    }

    /// Creates an empty column with room for `capacity` values.
    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        Self {
            data_type,
            values: Vec::with_capacity(capacity),
        }
    }

    /// Returns the data type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the column is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at the given index, or NULL when out of range.
    pub fn get(&self, index: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(index).unwrap_or(&NULL)
    }

    /// Returns all values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the column and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns an iterator over the values.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Appends a value.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Returns the number of null values.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

/// Builder for creating record batches row by row.
#[derive(Debug)]
pub struct RecordBatchBuilder {
    /// The schema.
    schema: Arc<Schema>,
    /// The columns being built.
    columns: Vec<Vec<Value>>,
    /// Rows appended so far.
    num_rows: usize,
}

impl RecordBatchBuilder {
    /// Creates a new builder with the given schema.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_capacity(schema, 0)
    }

    /// Creates a builder with room for `capacity` rows.
    pub fn with_capacity(schema: Arc<Schema>, capacity: usize) -> Self {
        let columns = (0..schema.len())
            .map(|_| Vec::with_capacity(capacity))
            .collect();
        Self {
            schema,
            columns,
            num_rows: 0,
        }
    }

    /// Appends a row to the batch.
    pub fn append_row(&mut self, row: Row) -> Result<(), ExecutionError> {
        if row.num_columns() != self.columns.len() {
            return Err(ExecutionError::Internal(format!(
                "row has {} columns, expected {}",
                row.num_columns(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        self.num_rows += 1;
        Ok(())
    }

    /// Returns the current number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns true if no row has been appended.
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Builds the record batch.
    pub fn build(self) -> Result<RecordBatch, ExecutionError> {
        if self.columns.is_empty() {
            let mut batch = RecordBatch::empty_rows(self.num_rows);
            batch.schema = self.schema;
            return Ok(batch);
        }
        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .zip(self.schema.fields().iter())
            .map(|(values, field)| Column::new(field.data_type.clone(), values))
            .collect();
        RecordBatch::new(self.schema, columns)
    }

    /// Builds the batch and resets the builder for reuse.
    pub fn flush(&mut self) -> Result<RecordBatch, ExecutionError> {
        let builder = std::mem::replace(self, RecordBatchBuilder::new(self.schema.clone()));
        builder.build()
    }
}
