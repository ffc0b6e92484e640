//! Table catalogs for SQL name resolution.
//!
//! SQL never sees a global namespace: every query is bound against an
//! explicit [`Catalog`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::operator::LogicalOperator;
use super::schema::SchemaRef;

/// Catalog interface for resolving table names to plans.
pub trait Catalog: Send + Sync {
    /// Resolves a table by name. The returned plan produces unqualified
    /// columns; the binder qualifies them with the table name or alias.
    fn table(&self, name: &str) -> Option<Arc<LogicalOperator>>;

    /// Returns the registered table names in sorted order.
    fn table_names(&self) -> Vec<String>;

    /// Returns the schema of a table.
    fn table_schema(&self, name: &str) -> Option<SchemaRef> {
        self.table(name).map(|t| t.schema())
    }
}

/// In-memory catalog mapping names to plans.
///
/// Lookups try the exact name first and then a case-insensitive match, so
/// `SELECT * FROM Sales` finds a table registered as `sales`.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: RwLock<BTreeMap<String, Arc<LogicalOperator>>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a table. Returns the previous plan, if any.
    pub fn register(
        &self,
        name: impl Into<String>,
        plan: Arc<LogicalOperator>,
    ) -> Option<Arc<LogicalOperator>> {
        self.tables.write().insert(name.into(), plan)
    }

    /// Removes a table.
    pub fn deregister(&self, name: &str) -> Option<Arc<LogicalOperator>> {
        self.tables.write().remove(name)
    }

    /// Returns true if a table of this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Returns the number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    /// Returns true if no tables are registered.
    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

impl Catalog for MemoryCatalog {
    fn table(&self, name: &str) -> Option<Arc<LogicalOperator>> {
        let tables = self.tables.read();
        if let Some(plan) = tables.get(name) {
            return Some(plan.clone());
        }
        tables
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Row, Value};
    use crate::logical::builder::LogicalPlanBuilder;
    use crate::logical::schema::{Field, Schema};
    use crate::parser::DataType;

    fn one_row() -> Arc<LogicalOperator> {
        let schema = Schema::new(vec![Field::nullable("x", DataType::Int64)]);
        LogicalPlanBuilder::values(schema, vec![Row::new(vec![Value::int(1)])])
            .unwrap()
            .into_arc()
    }

    #[test]
    fn test_register_and_lookup() {
        let catalog = MemoryCatalog::new();
        assert!(catalog.register("sales", one_row()).is_none());
        assert!(catalog.register("sales", one_row()).is_some());

        assert!(catalog.contains("sales"));
        assert!(catalog.contains("SALES"));
        assert!(!catalog.contains("towns"));
        assert_eq!(catalog.table_schema("sales").unwrap().names(), vec!["x"]);
        assert_eq!(catalog.table_names(), vec!["sales"]);

        catalog.deregister("sales");
        assert!(catalog.is_empty());
    }
}
