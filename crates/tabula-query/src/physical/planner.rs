//! Physical planner for converting logical plans to physical execution plans.
//!
//! The planner binds every expression to column positions and selects the
//! execution algorithm for each node:
//! - Joins run as hash joins; keyless joins pair every row
//! - Sort followed by a small limit becomes TopN
//! - Bare column selections become index projections
//! - Subquery aliases only rename, and disappear

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::logical::{
    AggregateOperator, Column, Field, JoinOperator, LimitOperator, LogicalExpr, LogicalOperator,
    LogicalPlan, MeltOperator, PivotOperator, PlanError, RollingOperator, ScanOperator, Schema,
    SortExpr, UnionMode, UnionOperator,
};

use super::context::ExecutionContext;
use super::expr::{
    create_aggregate_expr, create_physical_expr, create_sort_expr, create_window_expr,
    PhysicalAggregateExpr, PhysicalExpr, PhysicalSortExpr,
};
use super::operator::*;
use super::plan::PhysicalPlan;

/// Errors raised while creating a physical plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    /// A column could not be bound to an input position.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// The plan uses something the executor cannot run.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The logical plan is malformed.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// A logical validation error surfaced while planning.
    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Physical planner that converts logical plans to physical execution plans.
#[derive(Debug)]
pub struct PhysicalPlanner<'a> {
    /// Execution context with configuration.
    ctx: &'a ExecutionContext,
}

impl<'a> PhysicalPlanner<'a> {
    /// Creates a new physical planner.
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Converts a logical plan to a physical plan.
    pub fn create_physical_plan(&self, logical: &LogicalPlan) -> Result<PhysicalPlan, PlanningError> {
        let start = Instant::now();
        let root = self.plan_operator(&logical.root)?;
        let elapsed = start.elapsed().as_micros() as u64;
        debug!(operator = root.name(), planning_us = elapsed, "physical plan created");
        Ok(PhysicalPlan::new(root, logical.schema()).with_planning_time(elapsed))
    }

    /// Plans a single logical operator.
    fn plan_operator(&self, logical: &LogicalOperator) -> Result<PhysicalOperator, PlanningError> {
        match logical {
            LogicalOperator::Scan(scan) => self.plan_scan(scan),
            LogicalOperator::Values(values) => Ok(PhysicalOperator::Values(ValuesPhysicalOperator {
                rows: values.rows.clone(),
                schema: values.schema.clone(),
            })),
            LogicalOperator::Select(select) => {
                let input_schema = select.input.schema();
                let exprs = select
                    .columns
                    .iter()
                    .map(|c| {
                        Ok(PhysicalExpr::column(
                            c.name.clone(),
                            column_index(&input_schema, c)?,
                        ))
                    })
                    .collect::<Result<_, PlanningError>>()?;
                Ok(PhysicalOperator::Projection(ProjectionPhysicalOperator {
                    input: Arc::new(self.plan_operator(&select.input)?),
                    exprs,
                    schema: select.schema.clone(),
                }))
            }
            LogicalOperator::Projection(proj) => {
                let input_schema = proj.input.schema();
                let exprs = proj
                    .exprs
                    .iter()
                    .map(|e| create_physical_expr(e, &input_schema))
                    .collect::<Result<_, _>>()?;
                Ok(PhysicalOperator::Projection(ProjectionPhysicalOperator {
                    input: Arc::new(self.plan_operator(&proj.input)?),
                    exprs,
                    schema: proj.schema.clone(),
                }))
            }
            LogicalOperator::Filter(filter) => {
                let predicate = create_physical_expr(&filter.predicate, &filter.input.schema())?;
                Ok(PhysicalOperator::Filter(FilterPhysicalOperator {
                    input: Arc::new(self.plan_operator(&filter.input)?),
                    predicate,
                }))
            }
            LogicalOperator::Aggregate(agg) => self.plan_aggregate(agg),
            LogicalOperator::Join(join) => self.plan_join(join),
            LogicalOperator::Pivot(pivot) => self.plan_pivot(pivot),
            LogicalOperator::Melt(melt) => self.plan_melt(melt),
            LogicalOperator::Sort(sort) => {
                let input = self.plan_operator(&sort.input)?;
                let order_by = self.sort_exprs(&sort.order_by, &sort.input.schema())?;
                Ok(self.sort_or_top_n(input, order_by, sort.fetch))
            }
            LogicalOperator::Window(window) => {
                let input_schema = window.input.schema();
                let window_exprs = window
                    .window_exprs
                    .iter()
                    .map(|e| create_window_expr(e, &input_schema))
                    .collect::<Result<_, _>>()?;
                Ok(PhysicalOperator::Window(WindowPhysicalOperator {
                    input: Arc::new(self.plan_operator(&window.input)?),
                    window_exprs,
                    schema: window.schema.clone(),
                }))
            }
            LogicalOperator::Rolling(rolling) => self.plan_rolling(rolling),
            LogicalOperator::Union(union) => self.plan_union(union),
            LogicalOperator::Limit(limit) => self.plan_limit(limit),
            LogicalOperator::Distinct(distinct) => {
                Ok(PhysicalOperator::Distinct(DistinctPhysicalOperator {
                    input: Arc::new(self.plan_operator(&distinct.input)?),
                }))
            }
            LogicalOperator::SubqueryAlias(alias) => self.plan_operator(&alias.input),
        }
    }

    /// Plans a source scan. Pushed filters are bound to the projected row.
    fn plan_scan(&self, scan: &ScanOperator) -> Result<PhysicalOperator, PlanningError> {
        let filters = scan
            .filters
            .iter()
            .map(|f| create_physical_expr(f, &scan.projected_schema))
            .collect::<Result<_, _>>()?;

        Ok(PhysicalOperator::SeqScan(SeqScanOperator {
            table_name: scan.table_name.clone(),
            source: scan.source.clone(),
            table_schema: scan.table_schema.clone(),
            projection: scan.read_indices(),
            projected_schema: scan.projected_schema.clone(),
            filters,
            limit: scan.limit,
            decode: scan.decode.clone(),
        }))
    }

    /// Plans an aggregation.
    ///
    /// Every aggregate call becomes one accumulator. The logical aggregate
    /// expressions are rebound to the group row: the group keys followed by
    /// one column per call.
    fn plan_aggregate(&self, agg: &AggregateOperator) -> Result<PhysicalOperator, PlanningError> {
        let input_schema = agg.input.schema();

        let group_by = agg
            .group_by
            .iter()
            .map(|e| create_physical_expr(e, &input_schema))
            .collect::<Result<Vec<_>, _>>()?;

        let mut calls: Vec<LogicalExpr> = Vec::new();
        for expr in &agg.aggregates {
            collect_aggregate_calls(expr, &mut calls);
        }

        let mut aggregates: Vec<PhysicalAggregateExpr> = Vec::with_capacity(calls.len());
        let mut group_fields: Vec<Field> = agg.schema.fields()[..agg.group_by.len()].to_vec();
        for (i, call) in calls.iter().enumerate() {
            let name = format!("__agg_{}", i);
            let physical = create_aggregate_expr(&call.clone().alias(name.clone()), &input_schema)?;
            group_fields.push(Field::nullable(name, physical.data_type.clone()));
            aggregates.push(physical);
        }
        let group_schema = Schema::new(group_fields);

        let output_exprs = agg
            .aggregates
            .iter()
            .map(|expr| {
                let rebound = expr.transform(&mut |e| match e {
                    LogicalExpr::AggregateCall { .. } => calls
                        .iter()
                        .position(|c| c == e)
                        .map(|i| LogicalExpr::col(format!("__agg_{}", i))),
                    _ => None,
                });
                create_physical_expr(&rebound, &group_schema)
            })
            .collect::<Result<_, _>>()?;

        Ok(PhysicalOperator::HashAggregate(HashAggregateOperator {
            input: Arc::new(self.plan_operator(&agg.input)?),
            group_by,
            aggregates,
            output_exprs,
            schema: agg.schema.clone(),
        }))
    }

    /// Plans a join. Keys are bound to their own side; the residual filter
    /// to the left columns followed by the right columns.
    fn plan_join(&self, join: &JoinOperator) -> Result<PhysicalOperator, PlanningError> {
        let left_schema = join.left.schema();
        let right_schema = join.right.schema();

        let left_keys = join
            .on
            .iter()
            .map(|(l, _)| create_physical_expr(l, &left_schema))
            .collect::<Result<_, _>>()?;
        let right_keys = join
            .on
            .iter()
            .map(|(_, r)| create_physical_expr(r, &right_schema))
            .collect::<Result<_, _>>()?;
        let filter = join
            .filter
            .as_ref()
            .map(|f| create_physical_expr(f, &join.combined_schema()))
            .transpose()?;

        Ok(PhysicalOperator::HashJoin(HashJoinOperator {
            left: Arc::new(self.plan_operator(&join.left)?),
            right: Arc::new(self.plan_operator(&join.right)?),
            join_type: join.join_type,
            left_keys,
            right_keys,
            filter,
            nulls_equal: join.options.nulls_equal,
            schema: join.schema.clone(),
        }))
    }

    fn plan_pivot(&self, pivot: &PivotOperator) -> Result<PhysicalOperator, PlanningError> {
        let input_schema = pivot.input.schema();
        let index = pivot
            .index
            .iter()
            .map(|c| column_index(&input_schema, c))
            .collect::<Result<_, _>>()?;
        let on = column_index(&input_schema, &pivot.on)?;
        let values = column_index(&input_schema, &pivot.values)?;
        let value_type = pivot
            .aggregate
            .return_type(Some(&input_schema.fields()[values].data_type))?;

        Ok(PhysicalOperator::Pivot(PivotPhysicalOperator {
            input: Arc::new(self.plan_operator(&pivot.input)?),
            index,
            on,
            values,
            on_values: pivot.on_values.clone(),
            aggregate: pivot.aggregate,
            value_type,
            schema: pivot.schema.clone(),
        }))
    }

    fn plan_melt(&self, melt: &MeltOperator) -> Result<PhysicalOperator, PlanningError> {
        let input_schema = melt.input.schema();
        let id_vars = melt
            .id_vars
            .iter()
            .map(|c| column_index(&input_schema, c))
            .collect::<Result<_, _>>()?;
        let value_vars = melt
            .value_vars
            .iter()
            .map(|c| Ok((column_index(&input_schema, c)?, c.name.clone())))
            .collect::<Result<_, PlanningError>>()?;
        let value_type = melt
            .schema
            .fields()
            .last()
            .map(|f| f.data_type.clone())
            .ok_or_else(|| PlanningError::InvalidPlan("melt without output columns".into()))?;

        Ok(PhysicalOperator::Melt(MeltPhysicalOperator {
            input: Arc::new(self.plan_operator(&melt.input)?),
            id_vars,
            value_vars,
            value_type,
            schema: melt.schema.clone(),
        }))
    }

    fn plan_rolling(&self, rolling: &RollingOperator) -> Result<PhysicalOperator, PlanningError> {
        let input_schema = rolling.input.schema();
        let index = column_index(&input_schema, &rolling.index_column)?;
        let span = rolling.period.span(&input_schema.fields()[index].data_type)?;
        let group_by = rolling
            .group_by
            .iter()
            .map(|c| column_index(&input_schema, c))
            .collect::<Result<_, _>>()?;
        let aggregates = rolling
            .aggregates
            .iter()
            .map(|e| create_aggregate_expr(e, &input_schema))
            .collect::<Result<_, _>>()?;

        Ok(PhysicalOperator::Rolling(RollingPhysicalOperator {
            input: Arc::new(self.plan_operator(&rolling.input)?),
            index,
            index_name: rolling.index_column.name.clone(),
            span,
            group_by,
            aggregates,
            schema: rolling.schema.clone(),
        }))
    }

    /// Plans a union. Diagonal unions align inputs by column name.
    fn plan_union(&self, union: &UnionOperator) -> Result<PhysicalOperator, PlanningError> {
        let mut inputs = Vec::with_capacity(union.inputs.len());
        let mut mappings = Vec::with_capacity(union.inputs.len());
        for input in &union.inputs {
            let input_schema = input.schema();
            let mapping = match union.mode {
                UnionMode::Vertical => (0..union.schema.len()).map(Some).collect(),
                UnionMode::Diagonal | UnionMode::DiagonalRelaxed => union
                    .schema
                    .fields()
                    .iter()
                    .map(|f| input_schema.index_of(f.name()))
                    .collect(),
            };
            mappings.push(mapping);
            inputs.push(Arc::new(self.plan_operator(input)?));
        }

        Ok(PhysicalOperator::Union(UnionPhysicalOperator {
            inputs,
            mappings,
            schema: union.schema.clone(),
        }))
    }

    /// Plans a limit. A limit directly over a sort becomes a TopN.
    fn plan_limit(&self, limit: &LimitOperator) -> Result<PhysicalOperator, PlanningError> {
        if let (LogicalOperator::Sort(sort), Some(fetch)) = (limit.input.as_ref(), limit.fetch) {
            let n = limit.offset.saturating_add(fetch);
            let n = sort.fetch.map_or(n, |f| f.min(n));
            let input = self.plan_operator(&sort.input)?;
            let order_by = self.sort_exprs(&sort.order_by, &sort.input.schema())?;
            let sorted = self.sort_or_top_n(input, order_by, Some(n));
            if limit.offset == 0 && matches!(sorted, PhysicalOperator::TopN(_)) {
                return Ok(sorted);
            }
            return Ok(PhysicalOperator::Limit(LimitPhysicalOperator {
                input: Arc::new(sorted),
                offset: limit.offset,
                fetch: limit.fetch,
            }));
        }

        Ok(PhysicalOperator::Limit(LimitPhysicalOperator {
            input: Arc::new(self.plan_operator(&limit.input)?),
            offset: limit.offset,
            fetch: limit.fetch,
        }))
    }

    fn sort_exprs(&self, order_by: &[SortExpr], schema: &Schema) -> Result<Vec<PhysicalSortExpr>, PlanningError> {
        order_by.iter().map(|s| create_sort_expr(s, schema)).collect()
    }

    /// Uses TopN when the fetch fits in one batch, otherwise a full sort
    /// followed by a limit.
    fn sort_or_top_n(
        &self,
        input: PhysicalOperator,
        order_by: Vec<PhysicalSortExpr>,
        fetch: Option<usize>,
    ) -> PhysicalOperator {
        match fetch {
            Some(n) if n <= self.ctx.batch_size() => PhysicalOperator::TopN(TopNOperator {
                input: Arc::new(input),
                order_by,
                n,
            }),
            Some(n) => PhysicalOperator::Limit(LimitPhysicalOperator {
                input: Arc::new(PhysicalOperator::Sort(SortPhysicalOperator {
                    input: Arc::new(input),
                    order_by,
                })),
                offset: 0,
                fetch: Some(n),
            }),
            None => PhysicalOperator::Sort(SortPhysicalOperator {
                input: Arc::new(input),
                order_by,
            }),
        }
    }
}

fn column_index(schema: &Schema, column: &Column) -> Result<usize, PlanningError> {
    schema
        .resolve_column(column)
        .map_err(|_| PlanningError::ColumnNotFound(column.qualified_name()))
}

fn collect_aggregate_calls(expr: &LogicalExpr, calls: &mut Vec<LogicalExpr>) {
    match expr {
        LogicalExpr::AggregateCall { .. } => {
            if !calls.contains(expr) {
                calls.push(expr.clone());
            }
        }
        LogicalExpr::WindowCall { .. } => {}
        other => {
            for child in other.children() {
                collect_aggregate_calls(child, calls);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{col, count_star, LogicalPlanBuilder, SortExpr};
    use crate::parser::DataType;
    use crate::source::{DecodeOptions, MemorySource};

    fn sales() -> LogicalPlanBuilder {
        let schema = Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("value", DataType::Float64),
        ]);
        let source = MemorySource::from_strs("sales", &["year", "value"], &[&["2020", "1.0"]]);
        LogicalPlanBuilder::scan("sales", Arc::new(source), schema, DecodeOptions::default())
    }

    fn plan(builder: LogicalPlanBuilder) -> PhysicalPlan {
        let ctx = ExecutionContext::default();
        PhysicalPlanner::new(&ctx)
            .create_physical_plan(&builder.build())
            .unwrap()
    }

    #[test]
    fn test_plan_scan_filter() {
        let physical = plan(sales().filter(col("year").gt(crate::logical::lit(2019))).unwrap());
        assert_eq!(physical.root().name(), "Filter");
        assert!(physical.explain(false).contains("SeqScan (table=sales"));
        assert_eq!(physical.operator_count(), 2);
    }

    #[test]
    fn test_plan_sort_limit_as_top_n() {
        let builder = sales()
            .sort(vec![SortExpr::desc(col("value"))])
            .unwrap()
            .limit(0, Some(3))
            .unwrap();
        let physical = plan(builder);
        match physical.root() {
            PhysicalOperator::TopN(top) => assert_eq!(top.n, 3),
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn test_plan_composite_aggregate() {
        let builder = sales()
            .aggregate(
                vec![col("year")],
                vec![col("value").sum().div(count_star()).alias("avg")],
            )
            .unwrap();
        let physical = plan(builder);
        match physical.root() {
            PhysicalOperator::HashAggregate(agg) => {
                assert_eq!(agg.aggregates.len(), 2);
                assert_eq!(agg.output_exprs.len(), 1);
                assert_eq!(agg.output_exprs[0].to_string(), "(__agg_0@1 / __agg_1@2)");
            }
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn test_plan_alias_is_transparent() {
        let physical = plan(sales().alias("s").unwrap());
        assert_eq!(physical.root().name(), "SeqScan");
        assert_eq!(physical.schema().fields()[0].qualified_name(), "s.year");
    }
}
