//! Row representation for query execution.
//!
//! Operators that need a whole tuple at a time (joins, window partitions,
//! sort buffers) work on [`Row`]s taken out of a record batch.

use std::fmt;

use super::Value;

/// A single row of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Row {
    /// The values in this row.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates a row with all NULL values.
    pub fn nulls(num_columns: usize) -> Self {
        Self {
            values: vec![Value::Null; num_columns],
        }
    }

    /// Returns the number of columns in this row.
    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at the given index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value at the given index, or NULL when out of range.
    pub fn value(&self, index: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(index).unwrap_or(&NULL)
    }

    /// Appends a value to this row.
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Extends this row with values from an iterator.
    pub fn extend<I: IntoIterator<Item = Value>>(&mut self, iter: I) {
        self.values.extend(iter);
    }

    /// Returns an iterator over the values.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// Returns the values as a slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns the values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Projects this row to include only the specified columns.
    pub fn project(&self, indices: &[usize]) -> Row {
        let values = indices.iter().map(|&i| self.value(i).clone()).collect();
        Row { values }
    }

    /// Concatenates this row with another row.
    pub fn concat(&self, other: &Row) -> Row {
        let mut values = Vec::with_capacity(self.values.len() + other.values.len());
        values.extend(self.values.iter().cloned());
        values.extend(other.values.iter().cloned());
        Row { values }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let row = Row::new(vec![Value::int(2020), Value::string("A"), Value::Null]);
        assert_eq!(row.num_columns(), 3);
        assert_eq!(row.get(0), Some(&Value::int(2020)));
        assert_eq!(row.value(7), &Value::Null);
    }

    #[test]
    fn test_row_project_and_concat() {
        let row = Row::new(vec![Value::int(1), Value::string("a"), Value::float(2.5)]);
        let projected = row.project(&[2, 0]);
        assert_eq!(projected.values(), &[Value::float(2.5), Value::int(1)]);

        let joined = projected.concat(&Row::nulls(2));
        assert_eq!(joined.num_columns(), 4);
        assert!(joined.value(3).is_null());
    }

    #[test]
    fn test_row_display() {
        let row = Row::new(vec![Value::int(1), Value::string("x"), Value::Null]);
        assert_eq!(row.to_string(), "(1, x, null)");
    }
}
