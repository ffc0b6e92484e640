//! Logical plan wrapper and utilities.

use std::fmt;
use std::sync::Arc;

use super::operator::LogicalOperator;
use super::schema::SchemaRef;

/// A logical query plan.
#[derive(Debug, Clone)]
pub struct LogicalPlan {
    /// Root operator.
    pub root: Arc<LogicalOperator>,
}

impl LogicalPlan {
    /// Creates a new logical plan.
    pub fn new(root: LogicalOperator) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    /// Creates from an Arc.
    pub fn from_arc(root: Arc<LogicalOperator>) -> Self {
        Self { root }
    }

    /// Returns the output schema.
    pub fn schema(&self) -> SchemaRef {
        self.root.schema()
    }

    /// Returns a formatted string representation of the plan.
    pub fn display(&self) -> String {
        let mut output = String::new();
        self.format_node(&self.root, 0, &mut output);
        output
    }

    /// Returns a detailed formatted string for EXPLAIN.
    pub fn explain(&self) -> String {
        let mut output = String::new();
        self.explain_node(&self.root, 0, &mut output);
        output
    }

    /// Counts the operators in the plan.
    pub fn node_count(&self) -> usize {
        struct Counter(usize);
        impl PlanVisitor for Counter {
            fn pre_visit(&mut self, _op: &LogicalOperator) -> bool {
                self.0 += 1;
                true
            }
            fn post_visit(&mut self, _op: &LogicalOperator) {}
        }
        let mut counter = Counter(0);
        visit_plan(&self.root, &mut counter);
        counter.0
    }

    fn format_node(&self, op: &LogicalOperator, indent: usize, output: &mut String) {
        let prefix = "  ".repeat(indent);

        match op {
            LogicalOperator::Scan(scan) => {
                output.push_str(&format!("{}Scan: {}", prefix, scan.table_name));
                if !scan.filters.is_empty() {
                    output.push_str(&format!(" (filters: {})", scan.filters.len()));
                }
                if scan.projection.is_some() {
                    output.push_str(&format!(
                        " (projection: [{}])",
                        scan.projected_schema.names().join(", ")
                    ));
                }
                if let Some(limit) = scan.limit {
                    output.push_str(&format!(" (limit: {})", limit));
                }
                output.push('\n');
            }
            LogicalOperator::Values(values) => {
                output.push_str(&format!("{}Values: {} rows\n", prefix, values.rows.len()));
            }
            LogicalOperator::Select(select) => {
                let cols: Vec<_> = select.columns.iter().map(|c| c.to_string()).collect();
                output.push_str(&format!("{}Select: {}\n", prefix, cols.join(", ")));
                self.format_node(&select.input, indent + 1, output);
            }
            LogicalOperator::Projection(proj) => {
                let exprs: Vec<_> = proj.exprs.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!("{}Projection: {}\n", prefix, exprs.join(", ")));
                self.format_node(&proj.input, indent + 1, output);
            }
            LogicalOperator::Filter(filter) => {
                output.push_str(&format!("{}Filter: {}\n", prefix, filter.predicate));
                self.format_node(&filter.input, indent + 1, output);
            }
            LogicalOperator::Aggregate(agg) => {
                let groups: Vec<_> = agg.group_by.iter().map(|e| e.to_string()).collect();
                let aggs: Vec<_> = agg.aggregates.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!(
                    "{}Aggregate: groups=[{}] aggs=[{}]\n",
                    prefix,
                    groups.join(", "),
                    aggs.join(", ")
                ));
                self.format_node(&agg.input, indent + 1, output);
            }
            LogicalOperator::Join(join) => {
                output.push_str(&format!("{}Join: {}", prefix, join.join_type));
                if !join.on.is_empty() {
                    let keys: Vec<_> = join
                        .on
                        .iter()
                        .map(|(l, r)| format!("{} = {}", l, r))
                        .collect();
                    output.push_str(&format!(" ON {}", keys.join(" AND ")));
                }
                if let Some(filter) = &join.filter {
                    output.push_str(&format!(" FILTER {}", filter));
                }
                output.push('\n');
                self.format_node(&join.left, indent + 1, output);
                self.format_node(&join.right, indent + 1, output);
            }
            LogicalOperator::Pivot(pivot) => {
                let index: Vec<_> = pivot.index.iter().map(|c| c.to_string()).collect();
                output.push_str(&format!(
                    "{}Pivot: index=[{}] on={} values={} agg={} ({} columns)\n",
                    prefix,
                    index.join(", "),
                    pivot.on,
                    pivot.values,
                    pivot.aggregate,
                    pivot.on_values.len()
                ));
                self.format_node(&pivot.input, indent + 1, output);
            }
            LogicalOperator::Melt(melt) => {
                let ids: Vec<_> = melt.id_vars.iter().map(|c| c.to_string()).collect();
                let vals: Vec<_> = melt.value_vars.iter().map(|c| c.to_string()).collect();
                output.push_str(&format!(
                    "{}Melt: id=[{}] value=[{}]\n",
                    prefix,
                    ids.join(", "),
                    vals.join(", ")
                ));
                self.format_node(&melt.input, indent + 1, output);
            }
            LogicalOperator::Sort(sort) => {
                let exprs: Vec<_> = sort.order_by.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!("{}Sort: {}", prefix, exprs.join(", ")));
                if let Some(fetch) = sort.fetch {
                    output.push_str(&format!(" (fetch: {})", fetch));
                }
                output.push('\n');
                self.format_node(&sort.input, indent + 1, output);
            }
            LogicalOperator::Window(window) => {
                let exprs: Vec<_> = window.window_exprs.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!("{}Window: {}\n", prefix, exprs.join(", ")));
                self.format_node(&window.input, indent + 1, output);
            }
            LogicalOperator::Rolling(rolling) => {
                let aggs: Vec<_> = rolling.aggregates.iter().map(|e| e.to_string()).collect();
                output.push_str(&format!(
                    "{}Rolling: index={} period={}",
                    prefix, rolling.index_column, rolling.period
                ));
                if !rolling.group_by.is_empty() {
                    let groups: Vec<_> = rolling.group_by.iter().map(|c| c.to_string()).collect();
                    output.push_str(&format!(" by=[{}]", groups.join(", ")));
                }
                output.push_str(&format!(" aggs=[{}]\n", aggs.join(", ")));
                self.format_node(&rolling.input, indent + 1, output);
            }
            LogicalOperator::Union(union) => {
                output.push_str(&format!("{}Union: {}\n", prefix, union.mode));
                for input in &union.inputs {
                    self.format_node(input, indent + 1, output);
                }
            }
            LogicalOperator::Limit(limit) => {
                output.push_str(&format!(
                    "{}Limit: offset={} fetch={:?}\n",
                    prefix, limit.offset, limit.fetch
                ));
                self.format_node(&limit.input, indent + 1, output);
            }
            LogicalOperator::Distinct(distinct) => {
                output.push_str(&format!("{}Distinct\n", prefix));
                self.format_node(&distinct.input, indent + 1, output);
            }
            LogicalOperator::SubqueryAlias(alias) => {
                output.push_str(&format!("{}SubqueryAlias: {}\n", prefix, alias.alias));
                self.format_node(&alias.input, indent + 1, output);
            }
        }
    }

    fn explain_node(&self, op: &LogicalOperator, indent: usize, output: &mut String) {
        let prefix = "  ".repeat(indent);

        match op {
            LogicalOperator::Scan(scan) => {
                output.push_str(&format!("{}Scan: {}\n", prefix, scan.table_name));
                output.push_str(&format!("{}  Schema: {}\n", prefix, scan.projected_schema));
                if !scan.filters.is_empty() {
                    output.push_str(&format!("{}  Filters:\n", prefix));
                    for filter in &scan.filters {
                        output.push_str(&format!("{}    - {}\n", prefix, filter));
                    }
                }
                if let Some(proj) = &scan.projection {
                    output.push_str(&format!("{}  Projection: {:?}\n", prefix, proj));
                }
                if let Some(limit) = scan.limit {
                    output.push_str(&format!("{}  Limit: {}\n", prefix, limit));
                }
            }
            LogicalOperator::Projection(proj) => {
                output.push_str(&format!("{}Projection:\n", prefix));
                output.push_str(&format!("{}  Schema: {}\n", prefix, proj.schema));
                output.push_str(&format!("{}  Expressions:\n", prefix));
                for expr in &proj.exprs {
                    output.push_str(&format!("{}    - {}\n", prefix, expr));
                }
                self.explain_node(&proj.input, indent + 1, output);
            }
            LogicalOperator::Join(join) => {
                output.push_str(&format!("{}Join: {}\n", prefix, join.join_type));
                output.push_str(&format!("{}  Schema: {}\n", prefix, join.schema));
                if !join.on.is_empty() {
                    output.push_str(&format!("{}  Keys:\n", prefix));
                    for (l, r) in &join.on {
                        output.push_str(&format!("{}    {} = {}\n", prefix, l, r));
                    }
                }
                if let Some(filter) = &join.filter {
                    output.push_str(&format!("{}  Filter: {}\n", prefix, filter));
                }
                if join.options.nulls_equal {
                    output.push_str(&format!("{}  Nulls equal: true\n", prefix));
                }
                self.explain_node(&join.left, indent + 1, output);
                self.explain_node(&join.right, indent + 1, output);
            }
            LogicalOperator::Aggregate(agg) => {
                output.push_str(&format!("{}Aggregate:\n", prefix));
                output.push_str(&format!("{}  Schema: {}\n", prefix, agg.schema));
                if !agg.group_by.is_empty() {
                    output.push_str(&format!("{}  Group By:\n", prefix));
                    for expr in &agg.group_by {
                        output.push_str(&format!("{}    - {}\n", prefix, expr));
                    }
                }
                output.push_str(&format!("{}  Aggregates:\n", prefix));
                for expr in &agg.aggregates {
                    output.push_str(&format!("{}    - {}\n", prefix, expr));
                }
                self.explain_node(&agg.input, indent + 1, output);
            }
            LogicalOperator::Sort(sort) => {
                output.push_str(&format!("{}Sort:\n", prefix));
                for expr in &sort.order_by {
                    output.push_str(&format!("{}  - {}\n", prefix, expr));
                }
                if let Some(fetch) = sort.fetch {
                    output.push_str(&format!("{}  Fetch: {}\n", prefix, fetch));
                }
                self.explain_node(&sort.input, indent + 1, output);
            }
            LogicalOperator::Pivot(pivot) => {
                output.push_str(&format!("{}Pivot:\n", prefix));
                output.push_str(&format!("{}  Schema: {}\n", prefix, pivot.schema));
                output.push_str(&format!("{}  Aggregate: {}\n", prefix, pivot.aggregate));
                self.explain_node(&pivot.input, indent + 1, output);
            }
            LogicalOperator::Melt(melt) => {
                output.push_str(&format!("{}Melt:\n", prefix));
                output.push_str(&format!("{}  Schema: {}\n", prefix, melt.schema));
                self.explain_node(&melt.input, indent + 1, output);
            }
            LogicalOperator::Rolling(rolling) => {
                output.push_str(&format!(
                    "{}Rolling: index={} period={}\n",
                    prefix, rolling.index_column, rolling.period
                ));
                output.push_str(&format!("{}  Schema: {}\n", prefix, rolling.schema));
                for expr in &rolling.aggregates {
                    output.push_str(&format!("{}    - {}\n", prefix, expr));
                }
                self.explain_node(&rolling.input, indent + 1, output);
            }
            _ => {
                let mut line = String::new();
                self.format_header(op, &mut line);
                output.push_str(&format!("{}{}", prefix, line));
                for child in op.children() {
                    self.explain_node(child, indent + 1, output);
                }
            }
        }
    }

    fn format_header(&self, op: &LogicalOperator, output: &mut String) {
        let mut full = String::new();
        self.format_node(op, 0, &mut full);
        if let Some(first) = full.lines().next() {
            output.push_str(first);
            output.push('\n');
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Visitor trait for traversing logical plans.
pub trait PlanVisitor {
    /// Called before visiting children.
    fn pre_visit(&mut self, op: &LogicalOperator) -> bool;
    /// Called after visiting children.
    fn post_visit(&mut self, op: &LogicalOperator);
}

/// Visit a logical plan tree.
pub fn visit_plan<V: PlanVisitor>(op: &LogicalOperator, visitor: &mut V) {
    if visitor.pre_visit(op) {
        for child in op.children() {
            visit_plan(child, visitor);
        }
    }
    visitor.post_visit(op);
}

/// Rewriter trait for transforming logical plans.
pub trait PlanRewriter {
    /// Error raised by the rewriter.
    type Error;

    /// Rewrite an operator whose children are already rewritten. Return
    /// `None` to keep it as it is.
    fn rewrite(&mut self, op: &Arc<LogicalOperator>) -> Result<Option<LogicalOperator>, Self::Error>;
}

/// Rewrite a logical plan tree bottom-up. Unchanged subtrees keep their
/// `Arc` identity.
pub fn rewrite_plan<R: PlanRewriter>(
    op: &Arc<LogicalOperator>,
    rewriter: &mut R,
) -> Result<Arc<LogicalOperator>, R::Error> {
    let children = op.children();
    let mut new_children = Vec::with_capacity(children.len());
    let mut changed = false;
    for child in children {
        let new_child = rewrite_plan(child, rewriter)?;
        changed |= !Arc::ptr_eq(&new_child, child);
        new_children.push(new_child);
    }

    let op = if changed {
        Arc::new(op.with_new_inputs(new_children))
    } else {
        op.clone()
    };

    Ok(match rewriter.rewrite(&op)? {
        Some(new_op) => Arc::new(new_op),
        None => op,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::operator::{LimitOperator, ScanOperator};
    use crate::logical::schema::{Field, Schema};
    use crate::parser::DataType;
    use crate::source::{DecodeOptions, MemorySource};

    fn scan() -> LogicalOperator {
        let schema = Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
        ]);
        let source = MemorySource::from_strs("sales", &["year", "town"], &[]);
        LogicalOperator::Scan(ScanOperator::new(
            "sales",
            Arc::new(source),
            schema,
            DecodeOptions::default(),
        ))
    }

    #[test]
    fn test_plan_display() {
        let plan = LogicalPlan::new(LogicalOperator::Limit(LimitOperator {
            input: Arc::new(scan()),
            offset: 0,
            fetch: Some(5),
        }));

        let display = plan.display();
        assert!(display.starts_with("Limit: offset=0 fetch=Some(5)"));
        assert!(display.contains("  Scan: sales"));
        assert_eq!(plan.node_count(), 2);
    }

    #[test]
    fn test_plan_explain() {
        let plan = LogicalPlan::new(scan());
        let explain = plan.explain();
        assert!(explain.contains("Schema: [year: i64, town: str]"));
    }

    #[test]
    fn test_rewrite_keeps_identity_when_unchanged() {
        struct Noop;
        impl PlanRewriter for Noop {
            type Error = ();
            fn rewrite(&mut self, _op: &Arc<LogicalOperator>) -> Result<Option<LogicalOperator>, ()> {
                Ok(None)
            }
        }

        let plan = LogicalPlan::new(LogicalOperator::Limit(LimitOperator {
            input: Arc::new(scan()),
            offset: 0,
            fetch: Some(1),
        }));
        let rewritten = rewrite_plan(&plan.root, &mut Noop).unwrap();
        assert!(Arc::ptr_eq(&rewritten, &plan.root));
    }
}
