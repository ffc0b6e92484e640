//! Schema representation for logical plans.
//!
//! Schemas describe the output columns of each operator in a logical plan.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::parser::DataType;

/// A column reference, optionally qualified by a relation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Column {
    /// Optional table/relation qualifier.
    pub qualifier: Option<String>,
    /// Column name.
    pub name: String,
}

impl Column {
    /// Creates a new unqualified column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Creates a new qualified column.
    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    /// Returns the fully qualified name.
    pub fn qualified_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q, self.name),
            None => self.name.clone(),
        }
    }

    /// Returns true if this column matches the given reference.
    ///
    /// An unqualified reference matches any qualifier; a qualified reference
    /// only matches the same qualifier.
    pub fn matches(&self, qualifier: Option<&str>, name: &str) -> bool {
        if self.name != name {
            return false;
        }
        match (qualifier, &self.qualifier) {
            (Some(q), Some(sq)) => q == sq,
            (None, _) => true,
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// A field in a schema (column + type + nullability).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Column identifier.
    pub column: Column,
    /// Data type.
    pub data_type: DataType,
    /// Whether NULL is allowed.
    pub nullable: bool,
}

impl Field {
    /// Creates a new field.
    pub fn new(column: Column, data_type: DataType, nullable: bool) -> Self {
        Self {
            column,
            data_type,
            nullable,
        }
    }

    /// Creates a new non-nullable field.
    pub fn not_null(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(Column::new(name), data_type, false)
    }

    /// Creates a new nullable field.
    pub fn nullable(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(Column::new(name), data_type, true)
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.column.name
    }

    /// Returns the qualified column name.
    pub fn qualified_name(&self) -> String {
        self.column.qualified_name()
    }

    /// Returns a copy of this field under a different qualifier.
    pub fn with_qualifier(&self, qualifier: Option<String>) -> Self {
        Self {
            column: Column {
                qualifier,
                name: self.column.name.clone(),
            },
            ..self.clone()
        }
    }

    /// Returns a copy of this field under a different name, unqualified.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            column: Column::new(name),
            ..self.clone()
        }
    }

    /// Returns a copy of this field with the given type.
    pub fn with_data_type(&self, data_type: DataType) -> Self {
        Self {
            data_type,
            ..self.clone()
        }
    }

    /// Returns a nullable copy of this field.
    pub fn into_nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}{}",
            self.column,
            self.data_type,
            if self.nullable { "" } else { " NOT NULL" }
        )
    }
}

/// Reason a column reference failed to resolve against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No field matches.
    NotFound,
    /// More than one field matches; carries the candidates' qualified names.
    Ambiguous(Vec<String>),
}

/// Schema describes the columns output by a plan node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Fields in the schema.
    fields: Vec<Field>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Creates a schema from a list of fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the fields.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the field at the given index.
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Returns the unqualified column names in order.
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name().to_string()).collect()
    }

    /// Resolves a column reference to a field index.
    pub fn resolve(&self, qualifier: Option<&str>, name: &str) -> Result<usize, LookupError> {
        let mut matches = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.column.matches(qualifier, name));

        match (matches.next(), matches.next()) {
            (None, _) => Err(LookupError::NotFound),
            (Some((i, _)), None) => Ok(i),
            (Some((i, _)), Some((j, _))) => {
                let mut candidates = vec![self.fields[i].qualified_name(), self.fields[j].qualified_name()];
                candidates.extend(matches.map(|(_, f)| f.qualified_name()));
                Err(LookupError::Ambiguous(candidates))
            }
        }
    }

    /// Resolves a column to a field index.
    pub fn resolve_column(&self, column: &Column) -> Result<usize, LookupError> {
        self.resolve(column.qualifier.as_deref(), &column.name)
    }

    /// Finds the index of an unambiguous unqualified field name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.resolve(None, name).ok()
    }

    /// Finds a field by unqualified name.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).and_then(|i| self.fields.get(i))
    }

    /// Returns true if an unqualified field of this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }

    /// Merges two schemas (for joins).
    pub fn merge(&self, other: &Schema) -> Self {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Schema::new(fields)
    }

    /// Projects the schema to the specified column indices.
    pub fn project(&self, indices: &[usize]) -> Self {
        let fields: Vec<_> = indices
            .iter()
            .filter_map(|&i| self.fields.get(i).cloned())
            .collect();
        Schema::new(fields)
    }

    /// Returns a copy of this schema with every field under `qualifier`.
    pub fn with_qualifier(&self, qualifier: Option<&str>) -> Self {
        Schema::new(
            self.fields
                .iter()
                .map(|f| f.with_qualifier(qualifier.map(str::to_string)))
                .collect(),
        )
    }

    /// Returns the data types of all fields.
    pub fn data_types(&self) -> Vec<&DataType> {
        self.fields.iter().map(|f| &f.data_type).collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "]")
    }
}

/// A reference-counted schema for sharing.
pub type SchemaRef = Arc<Schema>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column() {
        let col = Column::new("id");
        assert!(col.qualifier.is_none());
        assert_eq!(col.qualified_name(), "id");

        let qcol = Column::qualified("sales", "id");
        assert_eq!(qcol.qualified_name(), "sales.id");
    }

    #[test]
    fn test_column_matches() {
        let col = Column::qualified("sales", "id");
        assert!(col.matches(Some("sales"), "id"));
        assert!(col.matches(None, "id"));
        assert!(!col.matches(Some("towns"), "id"));
        assert!(!col.matches(None, "name"));
    }

    #[test]
    fn test_schema_resolve() {
        let schema = Schema::new(vec![
            Field::not_null("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
        ]);

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.index_of("town"), Some(1));
        assert_eq!(schema.resolve(None, "missing"), Err(LookupError::NotFound));
    }

    #[test]
    fn test_schema_resolve_ambiguous() {
        let left = Schema::new(vec![Field::nullable("Address", DataType::Utf8)])
            .with_qualifier(Some("a"));
        let right = Schema::new(vec![Field::nullable("Address", DataType::Utf8)])
            .with_qualifier(Some("b"));
        let merged = left.merge(&right);

        assert_eq!(merged.resolve(Some("b"), "Address"), Ok(1));
        match merged.resolve(None, "Address") {
            Err(LookupError::Ambiguous(candidates)) => {
                assert_eq!(candidates, vec!["a.Address", "b.Address"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_project() {
        let schema = Schema::new(vec![
            Field::not_null("a", DataType::Int64),
            Field::not_null("b", DataType::Int64),
            Field::not_null("c", DataType::Int64),
        ]);
        let projected = schema.project(&[0, 2]);
        assert_eq!(projected.names(), vec!["a", "c"]);
    }
}
