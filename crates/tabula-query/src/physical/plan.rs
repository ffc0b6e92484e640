//! Physical plan representation and display.

use std::fmt;
use std::sync::Arc;

use crate::logical::SchemaRef;

use super::operator::PhysicalOperator;

/// A physical execution plan.
///
/// Wraps a tree of physical operators together with the output schema of
/// the logical plan it was created from. Operators that only rename
/// columns have no physical counterpart, so the root operator's schema may
/// differ from `schema` in qualifiers.
#[derive(Debug, Clone)]
pub struct PhysicalPlan {
    /// Root operator of the plan.
    pub root: Arc<PhysicalOperator>,
    /// Output schema.
    pub schema: SchemaRef,
    /// Planning time in microseconds.
    pub planning_time_us: u64,
}

impl PhysicalPlan {
    /// Creates a plan from its root operator and output schema.
    pub fn new(root: PhysicalOperator, schema: SchemaRef) -> Self {
        Self {
            root: Arc::new(root),
            schema,
            planning_time_us: 0,
        }
    }

    /// Sets the planning time.
    pub fn with_planning_time(mut self, time_us: u64) -> Self {
        self.planning_time_us = time_us;
        self
    }

    /// Returns the root operator.
    pub fn root(&self) -> &PhysicalOperator {
        &self.root
    }

    /// Returns the output schema.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Generates an EXPLAIN output for the plan.
    pub fn explain(&self, verbose: bool) -> String {
        let mut output = String::new();
        explain_recursive(&self.root, 0, verbose, &mut output);
        output
    }

    /// Counts the total number of operators in the plan.
    pub fn operator_count(&self) -> usize {
        fn count(op: &PhysicalOperator) -> usize {
            1 + op.children().iter().map(|c| count(c)).sum::<usize>()
        }
        count(&self.root)
    }
}

fn explain_recursive(op: &PhysicalOperator, indent: usize, verbose: bool, output: &mut String) {
    output.push_str(&"  ".repeat(indent));
    output.push_str(op.name());

    match op {
        PhysicalOperator::SeqScan(scan) => {
            output.push_str(&format!(
                " (table={}, cols=[{}]",
                scan.table_name,
                scan.projected_schema.names().join(", ")
            ));
            if !scan.filters.is_empty() {
                if verbose {
                    let filters: Vec<_> = scan.filters.iter().map(|f| f.to_string()).collect();
                    output.push_str(&format!(", filters=[{}]", filters.join(", ")));
                } else {
                    output.push_str(&format!(", filters={}", scan.filters.len()));
                }
            }
            if let Some(limit) = scan.limit {
                output.push_str(&format!(", limit={}", limit));
            }
            output.push(')');
        }
        PhysicalOperator::Values(values) => {
            output.push_str(&format!(" (rows={})", values.rows.len()));
        }
        PhysicalOperator::Filter(filter) => {
            output.push_str(&format!(" ({})", filter.predicate));
        }
        PhysicalOperator::Projection(proj) => {
            if verbose {
                let exprs: Vec<_> = proj.exprs.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!(" ({})", exprs.join(", ")));
            } else {
                output.push_str(&format!(" (cols={})", proj.exprs.len()));
            }
        }
        PhysicalOperator::HashJoin(join) => {
            output.push_str(&format!(" (type={}, keys={}", join.join_type, join.left_keys.len()));
            if join.filter.is_some() {
                output.push_str(", filter");
            }
            output.push(')');
        }
        PhysicalOperator::HashAggregate(agg) => {
            if verbose {
                let aggs: Vec<_> = agg.aggregates.iter().map(|a| a.to_string()).collect();
                output.push_str(&format!(
                    " (groups={}, aggs=[{}])",
                    agg.group_by.len(),
                    aggs.join(", ")
                ));
            } else {
                output.push_str(&format!(
                    " (groups={}, aggs={})",
                    agg.group_by.len(),
                    agg.aggregates.len()
                ));
            }
        }
        PhysicalOperator::Sort(sort) => {
            let keys: Vec<_> = sort.order_by.iter().map(|k| k.to_string()).collect();
            output.push_str(&format!(" ({})", keys.join(", ")));
        }
        PhysicalOperator::TopN(topn) => {
            let keys: Vec<_> = topn.order_by.iter().map(|k| k.to_string()).collect();
            output.push_str(&format!(" (n={}, {})", topn.n, keys.join(", ")));
        }
        PhysicalOperator::Limit(limit) => {
            output.push_str(&format!(" (offset={}", limit.offset));
            if let Some(fetch) = limit.fetch {
                output.push_str(&format!(", fetch={}", fetch));
            }
            output.push(')');
        }
        PhysicalOperator::Distinct(_) => {}
        PhysicalOperator::Union(union) => {
            output.push_str(&format!(" (inputs={})", union.inputs.len()));
        }
        PhysicalOperator::Pivot(pivot) => {
            output.push_str(&format!(
                " (columns={}, agg={})",
                pivot.on_values.len(),
                pivot.aggregate
            ));
        }
        PhysicalOperator::Melt(melt) => {
            output.push_str(&format!(" (value_vars={})", melt.value_vars.len()));
        }
        PhysicalOperator::Window(window) => {
            if verbose {
                let exprs: Vec<_> = window.window_exprs.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!(" ({})", exprs.join(", ")));
            } else {
                output.push_str(&format!(" (exprs={})", window.window_exprs.len()));
            }
        }
        PhysicalOperator::Rolling(rolling) => {
            output.push_str(&format!(
                " (index={}, span={}, aggs={})",
                rolling.index_name,
                rolling.span,
                rolling.aggregates.len()
            ));
        }
    }
    output.push('\n');

    for child in op.children() {
        explain_recursive(child, indent + 1, verbose, output);
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explain(false))
    }
}
