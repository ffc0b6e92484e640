//! Query execution engine.
//!
//! This module provides the main execution engine that converts physical plans
//! into executable operator trees and runs queries.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::{
    DistinctExec, ExecutionResult, FilterExec, HashAggregateExec, HashJoinExec, LimitExec,
    MeltExec, Operator, PivotExec, ProjectionExec, RecordBatch, RollingExec, Row, SeqScanExec,
    SortExec, TopNExec, UnionExec, ValuesExec, WindowExec,
};
use crate::logical::Schema;
use crate::physical::{ExecutionContext, ExecutionMetrics, PhysicalOperator, PhysicalPlan};

/// Query executor that runs physical plans.
#[derive(Debug, Default)]
pub struct QueryExecutor {
    /// Execution context.
    ctx: ExecutionContext,
}

impl QueryExecutor {
    /// Creates a new query executor.
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Returns the execution context.
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Executes a physical plan and returns all results.
    ///
    /// Cancellation is checked between batches. Any error discards the
    /// batches collected so far.
    pub fn execute(&self, plan: &PhysicalPlan) -> ExecutionResult<QueryResult> {
        let start = Instant::now();

        let mut root = self.build_operator(&plan.root)?;
        let schema = plan.schema();
        let all_columns: Vec<usize> = (0..schema.len()).collect();

        let mut batches = Vec::new();
        let mut total_rows = 0;

        while let Some(batch) = root.next_batch()? {
            self.ctx.check_cancelled()?;
            self.ctx.metrics().add_batch();
            total_rows += batch.num_rows();
            // Relabel to the logical output schema; aliases have no operator.
            batches.push(batch.project(&all_columns, schema.clone())?);
        }

        let elapsed = start.elapsed();
        let metrics = ExecutionMetrics {
            rows_produced: total_rows,
            execution_time_us: elapsed.as_micros() as u64,
            ..self.ctx.metrics().snapshot()
        };
        debug!(
            rows = total_rows,
            batches = metrics.batches_produced,
            rows_pulled = metrics.rows_pulled,
            elapsed_us = metrics.execution_time_us,
            "query executed"
        );

        Ok(QueryResult {
            schema,
            batches,
            total_rows,
            execution_time_ms: elapsed.as_millis() as u64,
            metrics,
        })
    }

    /// Executes and returns a streaming iterator over batches.
    pub fn execute_stream(&self, plan: &PhysicalPlan) -> ExecutionResult<Box<dyn Operator>> {
        self.build_operator(&plan.root)
    }

    /// Builds an operator tree from a physical operator.
    fn build_operator(&self, op: &PhysicalOperator) -> ExecutionResult<Box<dyn Operator>> {
        let batch_size = self.ctx.batch_size();
        match op {
            PhysicalOperator::SeqScan(scan) => {
                Ok(Box::new(SeqScanExec::from_physical(scan, self.ctx.clone())))
            }

            PhysicalOperator::Values(values) => Ok(Box::new(ValuesExec::new(
                values.schema.clone(),
                Arc::clone(&values.rows),
                self.ctx.clone(),
            ))),

            PhysicalOperator::Filter(filter) => {
                let child = self.build_operator(&filter.input)?;
                Ok(Box::new(FilterExec::new(child, filter.predicate.clone())))
            }

            PhysicalOperator::Projection(proj) => {
                let child = self.build_operator(&proj.input)?;
                Ok(Box::new(ProjectionExec::new(
                    child,
                    proj.exprs.clone(),
                    proj.schema.clone(),
                )))
            }

            PhysicalOperator::Limit(limit) => {
                let child = self.build_operator(&limit.input)?;
                Ok(Box::new(LimitExec::new(child, limit.offset, limit.fetch)))
            }

            PhysicalOperator::HashJoin(join) => {
                let left = self.build_operator(&join.left)?;
                let right = self.build_operator(&join.right)?;
                Ok(Box::new(HashJoinExec::new(
                    left,
                    right,
                    join.left_keys.clone(),
                    join.right_keys.clone(),
                    join.filter.clone(),
                    join.join_type,
                    join.nulls_equal,
                    join.schema.clone(),
                )))
            }

            PhysicalOperator::HashAggregate(agg) => {
                let child = self.build_operator(&agg.input)?;
                Ok(Box::new(HashAggregateExec::new(
                    child,
                    agg.group_by.clone(),
                    agg.aggregates.clone(),
                    agg.output_exprs.clone(),
                    agg.schema.clone(),
                    batch_size,
                )))
            }

            PhysicalOperator::Sort(sort) => {
                let child = self.build_operator(&sort.input)?;
                Ok(Box::new(SortExec::new(child, sort.order_by.clone(), batch_size)))
            }

            PhysicalOperator::TopN(topn) => {
                let child = self.build_operator(&topn.input)?;
                Ok(Box::new(TopNExec::new(child, topn.order_by.clone(), topn.n)))
            }

            PhysicalOperator::Distinct(distinct) => {
                let child = self.build_operator(&distinct.input)?;
                Ok(Box::new(DistinctExec::new(child)))
            }

            PhysicalOperator::Union(union) => {
                let inputs = union
                    .inputs
                    .iter()
                    .map(|input| self.build_operator(input))
                    .collect::<ExecutionResult<Vec<_>>>()?;
                Ok(Box::new(UnionExec::new(
                    inputs,
                    union.mappings.clone(),
                    union.schema.clone(),
                )))
            }

            PhysicalOperator::Pivot(pivot) => {
                let child = self.build_operator(&pivot.input)?;
                Ok(Box::new(PivotExec::new(
                    child,
                    pivot.index.clone(),
                    pivot.on,
                    pivot.values,
                    pivot.on_values.clone(),
                    pivot.aggregate,
                    pivot.value_type.clone(),
                    pivot.schema.clone(),
                    batch_size,
                )))
            }

            PhysicalOperator::Melt(melt) => {
                let child = self.build_operator(&melt.input)?;
                Ok(Box::new(MeltExec::new(
                    child,
                    melt.id_vars.clone(),
                    melt.value_vars.clone(),
                    melt.value_type.clone(),
                    melt.schema.clone(),
                )))
            }

            PhysicalOperator::Window(window) => {
                let child = self.build_operator(&window.input)?;
                Ok(Box::new(WindowExec::new(
                    child,
                    window.window_exprs.clone(),
                    window.schema.clone(),
                    batch_size,
                )))
            }

            PhysicalOperator::Rolling(rolling) => {
                let child = self.build_operator(&rolling.input)?;
                Ok(Box::new(RollingExec::new(
                    child,
                    rolling.index,
                    rolling.index_name.clone(),
                    rolling.span,
                    rolling.group_by.clone(),
                    rolling.aggregates.clone(),
                    rolling.schema.clone(),
                    batch_size,
                )))
            }
        }
    }
}

/// Result of query execution.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Output schema.
    pub schema: Arc<Schema>,
    /// Result batches.
    pub batches: Vec<RecordBatch>,
    /// Total number of rows.
    pub total_rows: usize,
    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Execution metrics.
    pub metrics: ExecutionMetrics,
}

impl QueryResult {
    /// Returns all rows as a vector.
    pub fn rows(&self) -> Vec<Row> {
        self.batches.iter().flat_map(|b| b.rows()).collect()
    }

    /// Returns true if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }

    /// Pretty prints the result as a table.
    pub fn display(&self) -> String {
        let mut output = String::new();

        let fields = self.schema.fields();
        let mut col_widths: Vec<usize> = fields.iter().map(|f| f.name().chars().count()).collect();

        for batch in &self.batches {
            for row in batch.rows() {
                for (i, val) in row.iter().enumerate() {
                    if let Some(width) = col_widths.get_mut(i) {
                        *width = (*width).max(val.to_string().chars().count());
                    }
                }
            }
        }

        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                output.push_str(" | ");
            }
            output.push_str(&format!("{:width$}", field.name(), width = col_widths[i]));
        }
        output.push('\n');

        for (i, width) in col_widths.iter().enumerate() {
            if i > 0 {
                output.push_str("-+-");
            }
            output.push_str(&"-".repeat(*width));
        }
        output.push('\n');

        for batch in &self.batches {
            for row in batch.rows() {
                for (i, val) in row.iter().enumerate() {
                    if i > 0 {
                        output.push_str(" | ");
                    }
                    let width = col_widths.get(i).copied().unwrap_or(0);
                    output.push_str(&format!("{:width$}", val.to_string(), width = width));
                }
                output.push('\n');
            }
        }

        output.push_str(&format!("({} rows)\n", self.total_rows));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutionError, Value};
    use crate::logical::{col, lit, LogicalPlanBuilder};
    use crate::physical::{ExecutionConfig, PhysicalPlanner};
    use crate::source::{CountingSource, DecodeOptions, MemorySource, RowSource};

    fn source() -> Arc<MemorySource> {
        Arc::new(MemorySource::from_strs(
            "sales",
            &["year", "amount"],
            &[&["2020", "100"], &["2019", "50"], &["2020", "200"]],
        ))
    }

    fn run(builder: LogicalPlanBuilder, ctx: ExecutionContext) -> ExecutionResult<QueryResult> {
        let plan = builder.build();
        let physical = PhysicalPlanner::new(&ctx)
            .create_physical_plan(&plan)
            .unwrap();
        QueryExecutor::new(ctx).execute(&physical)
    }

    fn scan(source: Arc<dyn RowSource>) -> LogicalPlanBuilder {
        let schema = source.schema_hint(100).unwrap();
        LogicalPlanBuilder::scan("sales", source, schema, DecodeOptions::default())
    }

    #[test]
    fn test_execute_filter_projection() {
        let builder = scan(source())
            .filter(col("year").eq(lit(2020i64)))
            .unwrap()
            .project(vec![col("amount")])
            .unwrap();
        let result = run(builder, ExecutionContext::default()).unwrap();
        assert_eq!(result.total_rows, 2);
        let amounts: Vec<_> = result.rows().iter().map(|r| r.value(0).clone()).collect();
        assert_eq!(amounts, vec![Value::int(100), Value::int(200)]);
        assert_eq!(result.metrics.rows_pulled, 3);
        assert!(result.display().contains("(2 rows)"));
    }

    #[test]
    fn test_batches_follow_batch_size() {
        let ctx = ExecutionContext::new(ExecutionConfig {
            batch_size: 1,
            streaming: true,
        });
        let result = run(scan(source()), ctx).unwrap();
        assert_eq!(result.batches.len(), 3);
        assert_eq!(result.metrics.batches_produced, 3);
    }

    #[test]
    fn test_cancelled_execution() {
        let ctx = ExecutionContext::default();
        ctx.cancel();
        let err = run(scan(source()), ctx).unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
    }

    #[test]
    fn test_limit_above_scan_reads_one_chunk() {
        let counting = CountingSource::new(source());
        let builder = scan(Arc::new(counting.clone())).limit(0, Some(1)).unwrap();
        counting.reset();
        let result = run(builder, ExecutionContext::default()).unwrap();
        assert_eq!(result.total_rows, 1);
        // Without the optimizer the Limit stays above the scan, which reads
        // one full chunk.
        assert_eq!(counting.pulled(), 3);
    }
}
