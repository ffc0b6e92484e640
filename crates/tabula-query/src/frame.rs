//! Lazy frames, materialized frames and the session that owns the catalog.
//!
//! A [`LazyFrame`] is a logical plan plus the configuration it will run
//! with. Builder methods return new frames and never touch data; the plan
//! is optimized, planned and executed only by the `collect` family.
//!
//! ```rust
//! use std::sync::Arc;
//! use tabula_query::{col, SessionContext};
//! use tabula_query::source::MemorySource;
//!
//! let ctx = SessionContext::new();
//! ctx.register_source(
//!     "sales",
//!     Arc::new(MemorySource::from_strs(
//!         "sales",
//!         &["year", "value"],
//!         &[&["2020", "100"], &["2019", "50"]],
//!     )),
//! )
//! .unwrap();
//!
//! let df = ctx
//!     .sql("SELECT year FROM sales WHERE value > 60")
//!     .unwrap()
//!     .collect()
//!     .unwrap();
//! assert_eq!(df.height(), 1);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{QueryError, TabulaResult};
use crate::executor::{Column as ColumnData, QueryExecutor, RecordBatch, Row, Value};
use crate::logical::{
    bind_statement, AggregateFunc, Catalog, Column, JoinOptions, LogicalExpr, LogicalPlan,
    LogicalPlanBuilder, MemoryCatalog, Period, PlanError, PlanResult, Schema, SchemaRef, SortExpr,
    UnionMode,
};
use crate::optimizer::Optimizer;
use crate::parser::{JoinType, Parser};
use crate::physical::{ExecutionConfig, ExecutionContext, ExecutionMetrics, PhysicalPlanner};
use crate::source::{CsvReadOptions, CsvSource, RowSource, SchemaInferencer};

// ============================================================================
// LazyFrame
// ============================================================================

/// A deferred query.
///
/// Cloning is cheap: plan nodes are shared.
#[derive(Debug, Clone)]
pub struct LazyFrame {
    builder: LogicalPlanBuilder,
    config: Arc<EngineConfig>,
}

impl LazyFrame {
    pub(crate) fn new(builder: LogicalPlanBuilder, config: Arc<EngineConfig>) -> Self {
        Self { builder, config }
    }

    /// Scans a row source with the default configuration. The schema is
    /// inferred from a sample of the source.
    pub fn scan(source: Arc<dyn RowSource>) -> TabulaResult<Self> {
        Self::scan_with_config(source, Arc::new(EngineConfig::default()))
    }

    /// Scans a row source under `config`.
    pub fn scan_with_config(
        source: Arc<dyn RowSource>,
        config: Arc<EngineConfig>,
    ) -> TabulaResult<Self> {
        let schema = SchemaInferencer::new(config.inference.clone()).infer(source.as_ref())?;
        let name = source.name().to_string();
        let builder = LogicalPlanBuilder::scan(name, source, schema, config.decode_options());
        Ok(Self::new(builder, config))
    }

    /// Scans a CSV file.
    pub fn scan_csv(path: impl AsRef<Path>, options: CsvReadOptions) -> TabulaResult<Self> {
        let config = EngineConfig {
            csv: options.clone(),
            ..EngineConfig::default()
        };
        Self::scan_with_config(
            Arc::new(CsvSource::from_path(path, options)),
            Arc::new(config),
        )
    }

    /// Concatenates frames. The configuration of the first frame is kept.
    pub fn concat(frames: Vec<LazyFrame>, mode: UnionMode) -> TabulaResult<Self> {
        let config = frames
            .first()
            .map(|f| f.config.clone())
            .ok_or_else(|| QueryError::Plan(PlanError::InvalidPlan("concat of no frames".into())))?;
        let inputs = frames.into_iter().map(|f| f.builder.into_arc()).collect();
        Ok(Self::new(LogicalPlanBuilder::union(inputs, mode)?, config))
    }

    fn map<F>(self, f: F) -> TabulaResult<Self>
    where
        F: FnOnce(LogicalPlanBuilder) -> PlanResult<LogicalPlanBuilder>,
    {
        Ok(Self {
            builder: f(self.builder)?,
            config: self.config,
        })
    }

    /// Output schema.
    pub fn schema(&self) -> SchemaRef {
        self.builder.schema()
    }

    /// Configuration used when collecting.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the configuration.
    pub fn with_config(self, config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            ..self
        }
    }

    /// Projects to exactly `exprs`.
    pub fn select(self, exprs: Vec<LogicalExpr>) -> TabulaResult<Self> {
        self.map(|b| b.select(exprs))
    }

    /// Adds or replaces columns, keeping the others.
    pub fn with_columns(self, exprs: Vec<LogicalExpr>) -> TabulaResult<Self> {
        self.map(|b| b.with_columns(exprs))
    }

    /// Keeps rows where `predicate` is true.
    pub fn filter(self, predicate: LogicalExpr) -> TabulaResult<Self> {
        self.map(|b| b.filter(predicate))
    }

    /// Starts a grouped aggregation.
    pub fn group_by(self, keys: Vec<LogicalExpr>) -> GroupBy {
        GroupBy { frame: self, keys }
    }

    /// Joins with `other` using the default options.
    pub fn join(
        self,
        other: LazyFrame,
        left_on: Vec<LogicalExpr>,
        right_on: Vec<LogicalExpr>,
        join_type: JoinType,
    ) -> TabulaResult<Self> {
        self.join_with_options(other, left_on, right_on, join_type, JoinOptions::default())
    }

    /// Joins with `other`.
    pub fn join_with_options(
        self,
        other: LazyFrame,
        left_on: Vec<LogicalExpr>,
        right_on: Vec<LogicalExpr>,
        join_type: JoinType,
        options: JoinOptions,
    ) -> TabulaResult<Self> {
        let right = other.builder.into_arc();
        self.map(|b| b.join(right, join_type, left_on, right_on, options))
    }

    /// Reshapes long to wide with the declared `on_values`.
    pub fn pivot(
        self,
        index: &[&str],
        on: &str,
        values: &str,
        on_values: Vec<Value>,
        aggregate: AggregateFunc,
    ) -> TabulaResult<Self> {
        let index = index.iter().map(|c| Column::new(*c)).collect();
        self.map(|b| b.pivot(index, Column::new(on), Column::new(values), on_values, aggregate))
    }

    /// Reshapes wide to long into `variable` and `value` columns.
    pub fn melt(self, id_vars: &[&str], value_vars: &[&str]) -> TabulaResult<Self> {
        self.melt_with_names(id_vars, value_vars, "variable", "value")
    }

    /// Reshapes wide to long with custom output names.
    pub fn melt_with_names(
        self,
        id_vars: &[&str],
        value_vars: &[&str],
        variable_name: &str,
        value_name: &str,
    ) -> TabulaResult<Self> {
        let id_vars = id_vars.iter().map(|c| Column::new(*c)).collect();
        let value_vars = value_vars.iter().map(|c| Column::new(*c)).collect();
        self.map(|b| b.melt(id_vars, value_vars, variable_name, value_name))
    }

    /// Sorts by `by`, stable.
    pub fn sort(self, by: Vec<SortExpr>) -> TabulaResult<Self> {
        self.map(|b| b.sort(by))
    }

    /// Appends window columns.
    pub fn with_window(self, exprs: Vec<LogicalExpr>) -> TabulaResult<Self> {
        self.map(|b| b.window(exprs))
    }

    /// Appends rolling aggregates over `(t - period, t]` windows of
    /// `index_column`, e.g. `rolling("date", "3d", &[], ...)`.
    pub fn rolling(
        self,
        index_column: &str,
        period: &str,
        group_by: &[&str],
        aggregates: Vec<LogicalExpr>,
    ) -> TabulaResult<Self> {
        let period = Period::parse(period)?;
        let group_by = group_by.iter().map(|c| Column::new(*c)).collect();
        self.map(|b| b.rolling(Column::new(index_column), period, group_by, aggregates))
    }

    /// Keeps the first `n` rows.
    pub fn limit(self, n: usize) -> TabulaResult<Self> {
        self.slice(0, n)
    }

    /// Skips `offset` rows and keeps the next `n`.
    pub fn slice(self, offset: usize, n: usize) -> TabulaResult<Self> {
        self.map(|b| b.limit(offset, Some(n)))
    }

    /// Removes duplicate rows.
    pub fn distinct(self) -> TabulaResult<Self> {
        self.map(|b| b.distinct())
    }

    /// Qualifies every column with `alias`.
    pub fn alias(self, alias: &str) -> TabulaResult<Self> {
        self.map(|b| b.alias(alias))
    }

    /// The plan as built.
    pub fn logical_plan(&self) -> LogicalPlan {
        self.builder.clone().build()
    }

    /// The plan after optimization.
    pub fn optimized_plan(&self) -> TabulaResult<LogicalPlan> {
        let optimizer = Optimizer::new(self.config.optimizer.clone());
        Ok(optimizer.optimize(self.logical_plan())?)
    }

    /// Renders the plan before and after optimization.
    pub fn explain(&self) -> TabulaResult<String> {
        let optimized = self.optimized_plan()?;
        Ok(format!(
            "== Logical Plan ==\n{}\n== Optimized Plan ==\n{}",
            self.logical_plan().display(),
            optimized.display()
        ))
    }

    /// Executes with the configured streaming mode and no limit.
    pub fn collect(&self) -> TabulaResult<DataFrame> {
        self.collect_with(self.config.execution.streaming, None)
    }

    /// Executes and keeps at most `k` rows.
    pub fn fetch(&self, k: usize) -> TabulaResult<DataFrame> {
        self.collect_with(true, Some(k))
    }

    /// Executes the plan.
    ///
    /// With `streaming` the scans produce chunks of the configured batch
    /// size, otherwise each scan produces one chunk. `limit` is added to the
    /// plan before optimization, so it is pushed towards the scans like any
    /// other limit.
    pub fn collect_with(&self, streaming: bool, limit: Option<usize>) -> TabulaResult<DataFrame> {
        let ctx = ExecutionContext::new(ExecutionConfig {
            streaming,
            ..self.config.execution.clone()
        });
        self.collect_in(ctx, limit).map(|(df, _)| df)
    }

    /// Executes under an existing context (e.g. one whose cancellation flag
    /// is shared with another thread) and returns the execution metrics.
    pub fn collect_in(
        &self,
        ctx: ExecutionContext,
        limit: Option<usize>,
    ) -> TabulaResult<(DataFrame, ExecutionMetrics)> {
        let builder = match limit {
            Some(k) => self.builder.clone().limit(0, Some(k))?,
            None => self.builder.clone(),
        };
        let optimizer = Optimizer::new(self.config.optimizer.clone());
        let optimized = optimizer.optimize(builder.build())?;

        let physical = PhysicalPlanner::new(&ctx).create_physical_plan(&optimized)?;
        let result = QueryExecutor::new(ctx).execute(&physical)?;
        debug!(
            rows = result.total_rows,
            elapsed_ms = result.execution_time_ms,
            "frame collected"
        );

        let df = DataFrame::from_batches(result.schema, &result.batches)?;
        Ok((df, result.metrics))
    }
}

/// A pending grouped aggregation, created by [`LazyFrame::group_by`].
#[derive(Debug, Clone)]
pub struct GroupBy {
    frame: LazyFrame,
    keys: Vec<LogicalExpr>,
}

impl GroupBy {
    /// Aggregates every group. Output columns are the keys followed by the
    /// aggregates; groups appear in first-seen order.
    pub fn agg(self, aggregates: Vec<LogicalExpr>) -> TabulaResult<LazyFrame> {
        let keys = self.keys;
        self.frame.map(|b| b.aggregate(keys, aggregates))
    }
}

// ============================================================================
// DataFrame
// ============================================================================

/// A materialized, column-major table.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    schema: SchemaRef,
    columns: Vec<ColumnData>,
    num_rows: usize,
}

impl DataFrame {
    /// Builds a frame from row-major values.
    pub fn from_rows(schema: Schema, rows: Vec<Row>) -> TabulaResult<Self> {
        let schema = Arc::new(schema);
        let batch = RecordBatch::from_rows(schema.clone(), rows)?;
        Self::from_batches(schema, &[batch])
    }

    /// Concatenates result batches.
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> TabulaResult<Self> {
        let batch = RecordBatch::concat(schema.clone(), batches)?;
        let num_rows = batch.num_rows();
        Ok(Self {
            schema,
            columns: batch.into_columns(),
            num_rows,
        })
    }

    /// Schema of the frame.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.schema.names()
    }

    /// Values of the column called `name`.
    pub fn column(&self, name: &str) -> TabulaResult<&[Value]> {
        self.schema
            .index_of(name)
            .and_then(|i| self.column_at(i))
            .ok_or_else(|| QueryError::UnknownColumn {
                name: name.to_string(),
            })
    }

    /// Values of the column at `index`.
    pub fn column_at(&self, index: usize) -> Option<&[Value]> {
        self.columns.get(index).map(|c| c.values())
    }

    /// One cell.
    pub fn get(&self, row: usize, column: usize) -> Option<&Value> {
        self.columns.get(column).and_then(|c| c.values().get(row))
    }

    /// One row.
    pub fn row(&self, index: usize) -> Option<Row> {
        (index < self.num_rows)
            .then(|| Row::new(self.columns.iter().map(|c| c.get(index).clone()).collect()))
    }

    /// All rows, in order.
    pub fn rows(&self) -> Vec<Row> {
        (0..self.num_rows).filter_map(|i| self.row(i)).collect()
    }

    /// Turns the frame back into a lazy one over its rows. Column
    /// qualifiers are dropped.
    pub fn lazy(&self) -> TabulaResult<LazyFrame> {
        let schema = self.schema.with_qualifier(None);
        let builder = LogicalPlanBuilder::values(schema, self.rows())?;
        Ok(LazyFrame::new(builder, Arc::new(EngineConfig::default())))
    }

    /// Pivots with the distinct non-null values of `on`, in first-seen
    /// order, as output columns.
    pub fn pivot(
        &self,
        index: &[&str],
        on: &str,
        values: &str,
        aggregate: AggregateFunc,
    ) -> TabulaResult<DataFrame> {
        let mut seen = HashSet::new();
        let on_values: Vec<Value> = self
            .column(on)?
            .iter()
            .filter(|v| !v.is_null() && seen.insert((*v).clone()))
            .cloned()
            .collect();
        debug!(on, discovered = on_values.len(), "pivot values discovered");
        self.lazy()?
            .pivot(index, on, values, on_values, aggregate)?
            .collect()
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.schema.names();
        let cells: Vec<Vec<String>> = self
            .rows()
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();

        let mut widths: Vec<usize> = names.iter().map(|n| n.chars().count()).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |f: &mut fmt::Formatter<'_>, items: &[String]| -> fmt::Result {
            for (i, (item, width)) in items.iter().zip(&widths).enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{:width$}", item, width = *width)?;
            }
            writeln!(f)
        };

        line(f, &names)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("-+-"))?;
        for row in &cells {
            line(f, row)?;
        }
        write!(f, "({} rows)", self.num_rows)
    }
}

// ============================================================================
// SessionContext
// ============================================================================

/// Owns the table catalog that SQL queries resolve names against.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    catalog: Arc<MemoryCatalog>,
    config: Arc<EngineConfig>,
}

impl SessionContext {
    /// Creates a session with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session with a validated configuration.
    pub fn with_config(config: EngineConfig) -> TabulaResult<Self> {
        config.validate().map_err(QueryError::Config)?;
        Ok(Self {
            catalog: Arc::new(MemoryCatalog::new()),
            config: Arc::new(config),
        })
    }

    /// Session configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The catalog.
    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }

    /// Registers a CSV file read with the session's CSV options.
    pub fn register_csv(&self, name: &str, path: impl AsRef<Path>) -> TabulaResult<SchemaRef> {
        let source = CsvSource::from_path(path, self.config.csv.clone());
        self.register_source(name, Arc::new(source))
    }

    /// Registers a row source. Its schema is inferred now, from a sample.
    pub fn register_source(
        &self,
        name: &str,
        source: Arc<dyn RowSource>,
    ) -> TabulaResult<SchemaRef> {
        let schema = SchemaInferencer::new(self.config.inference.clone()).infer(source.as_ref())?;
        let builder =
            LogicalPlanBuilder::scan(name, source, schema, self.config.decode_options());
        let schema = builder.schema();
        info!(table = name, columns = schema.len(), "registered table");
        self.catalog.register(name, builder.into_arc());
        Ok(schema)
    }

    /// Registers the plan of a lazy frame as a table.
    pub fn register_frame(&self, name: &str, frame: &LazyFrame) {
        info!(table = name, "registered frame");
        self.catalog.register(name, frame.builder.clone().into_arc());
    }

    /// Removes a table. Returns true if it existed.
    pub fn deregister(&self, name: &str) -> bool {
        self.catalog.deregister(name).is_some()
    }

    /// Registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    /// Schema of a registered table.
    pub fn table_schema(&self, name: &str) -> Option<SchemaRef> {
        self.catalog.table_schema(name)
    }

    /// A lazy frame over a registered table.
    pub fn table(&self, name: &str) -> TabulaResult<LazyFrame> {
        let plan = self
            .catalog
            .table(name)
            .ok_or_else(|| PlanError::UnknownTable(name.to_string()))?;
        Ok(LazyFrame::new(
            LogicalPlanBuilder::from_arc(plan),
            self.config.clone(),
        ))
    }

    /// Parses and binds a query. `EXPLAIN <query>` binds the inner query.
    pub fn sql(&self, query: &str) -> TabulaResult<LazyFrame> {
        let statement = Parser::parse_one(query)?;
        let plan = bind_statement(&statement, self.catalog.as_ref())?;
        Ok(LazyFrame::new(
            LogicalPlanBuilder::from_plan(&plan),
            self.config.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{col, lit};
    use crate::parser::DataType;
    use crate::source::{CountingSource, MemorySource};

    fn sales_source() -> Arc<MemorySource> {
        Arc::new(MemorySource::from_strs(
            "sales",
            &["year", "town", "value"],
            &[
                &["2020", "A", "100"],
                &["2020", "B", "200"],
                &["2019", "A", "50"],
            ],
        ))
    }

    fn session() -> SessionContext {
        let ctx = SessionContext::with_config(EngineConfig::for_testing()).unwrap();
        ctx.register_source("sales", sales_source()).unwrap();
        ctx
    }

    #[test]
    fn test_register_source_infers_schema() {
        let ctx = session();
        let schema = ctx.table_schema("sales").unwrap();
        assert_eq!(schema.names(), vec!["year", "town", "value"]);
        assert_eq!(schema.fields()[0].data_type, DataType::Int64);
        assert_eq!(schema.fields()[1].data_type, DataType::Utf8);
        assert_eq!(ctx.table_names(), vec!["sales"]);
    }

    #[test]
    fn test_sql_group_by_mean() {
        let df = session()
            .sql("SELECT year, avg(value) AS mean FROM sales GROUP BY year")
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(df.column("year").unwrap(), &[Value::int(2020), Value::int(2019)]);
        assert_eq!(df.column("mean").unwrap(), &[Value::float(150.0), Value::float(50.0)]);
    }

    #[test]
    fn test_builder_group_by_matches_sql() {
        let ctx = session();
        let built = ctx
            .table("sales")
            .unwrap()
            .group_by(vec![col("year")])
            .agg(vec![col("value").mean().alias("mean")])
            .unwrap()
            .collect()
            .unwrap();
        let sql = ctx
            .sql("SELECT year, mean(value) AS mean FROM sales GROUP BY year")
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(built.rows(), sql.rows());
    }

    #[test]
    fn test_streaming_and_batch_collect_agree() {
        let frame = session()
            .table("sales")
            .unwrap()
            .filter(col("value").gt(lit(60)))
            .unwrap();
        let streamed = frame.collect_with(true, None).unwrap();
        let whole = frame.collect_with(false, None).unwrap();
        assert_eq!(streamed, whole);
        assert_eq!(streamed.height(), 2);
    }

    #[test]
    fn test_fetch_pulls_only_needed_rows() {
        let counting = CountingSource::new(sales_source());
        let ctx = SessionContext::new();
        ctx.register_source("sales", Arc::new(counting.clone())).unwrap();
        counting.reset();

        let df = ctx.table("sales").unwrap().fetch(2).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(counting.pulled(), 2);
    }

    #[test]
    fn test_explain_shows_both_plans() {
        let text = session()
            .sql("SELECT town FROM sales WHERE year = 2019 + 1")
            .unwrap()
            .explain()
            .unwrap();
        assert!(text.contains("== Logical Plan =="));
        assert!(text.contains("== Optimized Plan =="));
        let (before, after) = text.split_once("== Optimized Plan ==").unwrap();
        assert!(before.contains("Filter"));
        assert!(after.contains("(filters: 1)"));
    }

    #[test]
    fn test_unknown_names() {
        let ctx = session();
        assert!(matches!(
            ctx.table("missing").unwrap_err(),
            QueryError::Plan(PlanError::UnknownTable(_))
        ));
        assert!(matches!(
            ctx.table("sales").unwrap().select(vec![col("nope")]).unwrap_err(),
            QueryError::UnknownColumn { .. }
        ));
        assert!(matches!(
            ctx.sql("SELEC 1").unwrap_err(),
            QueryError::Parse(_)
        ));
    }

    #[test]
    fn test_dataframe_access_and_display() {
        let df = session().table("sales").unwrap().collect().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
        assert_eq!(df.get(2, 0), Some(&Value::int(2019)));
        assert_eq!(df.row(1).unwrap().value(1), &Value::string("B"));
        assert!(df.row(3).is_none());
        assert!(df.column("missing").is_err());

        let text = df.to_string();
        assert!(text.starts_with("year | town | value"));
        assert!(text.ends_with("(3 rows)"));
    }

    #[test]
    fn test_dataframe_lazy_round_trip() {
        let df = session().table("sales").unwrap().collect().unwrap();
        let again = df
            .lazy()
            .unwrap()
            .filter(col("town").eq(lit("A")))
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(again.height(), 2);
        assert_eq!(again.column("value").unwrap(), &[Value::int(100), Value::int(50)]);
    }

    #[test]
    fn test_dataframe_pivot_discovers_values() {
        let df = session().table("sales").unwrap().collect().unwrap();
        let wide = df.pivot(&["year"], "town", "value", AggregateFunc::Sum).unwrap();
        assert_eq!(wide.column_names(), vec!["year", "A", "B"]);
        assert_eq!(wide.column("A").unwrap(), &[Value::int(100), Value::int(50)]);
        assert_eq!(wide.column("B").unwrap(), &[Value::int(200), Value::Null]);
    }

    #[test]
    fn test_cancelled_collect() {
        let ctx = ExecutionContext::default();
        ctx.cancel();
        let err = session().table("sales").unwrap().collect_in(ctx, None).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Execution(crate::executor::ExecutionError::Cancelled)
        ));
    }

    #[test]
    fn test_invalid_session_config() {
        let mut config = EngineConfig::default();
        config.execution.batch_size = 0;
        assert!(matches!(
            SessionContext::with_config(config).unwrap_err(),
            QueryError::Config(_)
        ));
    }
}
