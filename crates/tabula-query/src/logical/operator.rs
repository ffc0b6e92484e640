//! Logical operators for query plans.
//!
//! These represent the abstract operations in a query plan DAG. Every
//! operator carries (or derives) its output schema; inputs are shared
//! through `Arc` and never mutated.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::builder::PlanError;
use super::expr::{AggregateFunc, LogicalExpr, SortExpr};
use super::schema::{Column, Schema, SchemaRef};
use crate::executor::{Row, Value};
use crate::parser::{DataType, JoinType};
use crate::source::{DecodeOptions, RowSource};

/// A logical operator in a query plan.
#[derive(Debug, Clone)]
pub enum LogicalOperator {
    /// Read from a row source.
    Scan(ScanOperator),

    /// Inline typed rows.
    Values(ValuesOperator),

    /// Bare column selection.
    Select(SelectOperator),

    /// Computed projection.
    Projection(ProjectionOperator),

    /// Row filter.
    Filter(FilterOperator),

    /// Grouping with aggregation.
    Aggregate(AggregateOperator),

    /// Join of two inputs.
    Join(JoinOperator),

    /// Long to wide reshape.
    Pivot(PivotOperator),

    /// Wide to long reshape.
    Melt(MeltOperator),

    /// Stable multi-key sort.
    Sort(SortOperator),

    /// Window functions appended as columns.
    Window(WindowOperator),

    /// Time or index based rolling aggregates appended as columns.
    Rolling(RollingOperator),

    /// Concatenation of several inputs.
    Union(UnionOperator),

    /// Offset and fetch.
    Limit(LimitOperator),

    /// Duplicate row removal.
    Distinct(DistinctOperator),

    /// Re-qualification of an input under a new relation name.
    SubqueryAlias(SubqueryAliasOperator),
}

impl LogicalOperator {
    /// Returns the output schema of this operator.
    pub fn schema(&self) -> SchemaRef {
        match self {
            LogicalOperator::Scan(op) => op.projected_schema.clone(),
            LogicalOperator::Values(op) => op.schema.clone(),
            LogicalOperator::Select(op) => op.schema.clone(),
            LogicalOperator::Projection(op) => op.schema.clone(),
            LogicalOperator::Filter(op) => op.input.schema(),
            LogicalOperator::Aggregate(op) => op.schema.clone(),
            LogicalOperator::Join(op) => op.schema.clone(),
            LogicalOperator::Pivot(op) => op.schema.clone(),
            LogicalOperator::Melt(op) => op.schema.clone(),
            LogicalOperator::Sort(op) => op.input.schema(),
            LogicalOperator::Window(op) => op.schema.clone(),
            LogicalOperator::Rolling(op) => op.schema.clone(),
            LogicalOperator::Union(op) => op.schema.clone(),
            LogicalOperator::Limit(op) => op.input.schema(),
            LogicalOperator::Distinct(op) => op.input.schema(),
            LogicalOperator::SubqueryAlias(op) => op.schema.clone(),
        }
    }

    /// Returns the child operators.
    pub fn children(&self) -> Vec<&Arc<LogicalOperator>> {
        match self {
            LogicalOperator::Scan(_) | LogicalOperator::Values(_) => vec![],
            LogicalOperator::Select(op) => vec![&op.input],
            LogicalOperator::Projection(op) => vec![&op.input],
            LogicalOperator::Filter(op) => vec![&op.input],
            LogicalOperator::Aggregate(op) => vec![&op.input],
            LogicalOperator::Join(op) => vec![&op.left, &op.right],
            LogicalOperator::Pivot(op) => vec![&op.input],
            LogicalOperator::Melt(op) => vec![&op.input],
            LogicalOperator::Sort(op) => vec![&op.input],
            LogicalOperator::Window(op) => vec![&op.input],
            LogicalOperator::Rolling(op) => vec![&op.input],
            LogicalOperator::Union(op) => op.inputs.iter().collect(),
            LogicalOperator::Limit(op) => vec![&op.input],
            LogicalOperator::Distinct(op) => vec![&op.input],
            LogicalOperator::SubqueryAlias(op) => vec![&op.input],
        }
    }

    /// Returns a copy of this operator reading from new inputs.
    ///
    /// Stored schemas are kept as they are, so the new inputs must expose
    /// the same columns the operator references.
    pub fn with_new_inputs(&self, mut inputs: Vec<Arc<LogicalOperator>>) -> LogicalOperator {
        let mut next = || inputs.remove(0);
        match self {
            LogicalOperator::Scan(_) | LogicalOperator::Values(_) => self.clone(),
            LogicalOperator::Select(op) => LogicalOperator::Select(SelectOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Projection(op) => LogicalOperator::Projection(ProjectionOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Filter(op) => LogicalOperator::Filter(FilterOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Aggregate(op) => LogicalOperator::Aggregate(AggregateOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Join(op) => {
                let left = next();
                let right = next();
                LogicalOperator::Join(JoinOperator {
                    left,
                    right,
                    ..op.clone()
                })
            }
            LogicalOperator::Pivot(op) => LogicalOperator::Pivot(PivotOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Melt(op) => LogicalOperator::Melt(MeltOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Sort(op) => LogicalOperator::Sort(SortOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Window(op) => LogicalOperator::Window(WindowOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Rolling(op) => LogicalOperator::Rolling(RollingOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Union(op) => LogicalOperator::Union(UnionOperator {
                inputs: std::mem::take(&mut inputs),
                ..op.clone()
            }),
            LogicalOperator::Limit(op) => LogicalOperator::Limit(LimitOperator {
                input: next(),
                ..op.clone()
            }),
            LogicalOperator::Distinct(_) => {
                LogicalOperator::Distinct(DistinctOperator { input: next() })
            }
            LogicalOperator::SubqueryAlias(op) => {
                LogicalOperator::SubqueryAlias(SubqueryAliasOperator {
                    input: next(),
                    ..op.clone()
                })
            }
        }
    }

    /// Returns true if this is a leaf operator.
    pub fn is_leaf(&self) -> bool {
        matches!(self, LogicalOperator::Scan(_) | LogicalOperator::Values(_))
    }

    /// Returns true if the output row order depends on the input row order
    /// in a way that filters or limits moved below it would change.
    pub fn is_order_sensitive(&self) -> bool {
        matches!(
            self,
            LogicalOperator::Window(_)
                | LogicalOperator::Rolling(_)
                | LogicalOperator::Limit(_)
                | LogicalOperator::Pivot(_)
                | LogicalOperator::Melt(_)
        )
    }

    /// Returns the operator name.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperator::Scan(_) => "Scan",
            LogicalOperator::Values(_) => "Values",
            LogicalOperator::Select(_) => "Select",
            LogicalOperator::Projection(_) => "Projection",
            LogicalOperator::Filter(_) => "Filter",
            LogicalOperator::Aggregate(_) => "Aggregate",
            LogicalOperator::Join(_) => "Join",
            LogicalOperator::Pivot(_) => "Pivot",
            LogicalOperator::Melt(_) => "Melt",
            LogicalOperator::Sort(_) => "Sort",
            LogicalOperator::Window(_) => "Window",
            LogicalOperator::Rolling(_) => "Rolling",
            LogicalOperator::Union(_) => "Union",
            LogicalOperator::Limit(_) => "Limit",
            LogicalOperator::Distinct(_) => "Distinct",
            LogicalOperator::SubqueryAlias(_) => "SubqueryAlias",
        }
    }
}

/// Source scan operator.
#[derive(Debug, Clone)]
pub struct ScanOperator {
    /// Table name used for display.
    pub table_name: String,
    /// Row source; opened once per execution.
    pub source: Arc<dyn RowSource>,
    /// Full schema of the source.
    pub table_schema: SchemaRef,
    /// Projected column indices into `table_schema` (None = all).
    pub projection: Option<Vec<usize>>,
    /// Schema after projection.
    pub projected_schema: SchemaRef,
    /// Filters pushed down to the scan, evaluated on the projected row.
    pub filters: Vec<LogicalExpr>,
    /// Maximum rows to emit after filtering.
    pub limit: Option<usize>,
    /// How raw cells are decoded into typed values.
    pub decode: DecodeOptions,
}

impl ScanOperator {
    /// Creates a new scan operator.
    pub fn new(
        table_name: impl Into<String>,
        source: Arc<dyn RowSource>,
        schema: Schema,
        decode: DecodeOptions,
    ) -> Self {
        let schema = Arc::new(schema);
        Self {
            table_name: table_name.into(),
            source,
            table_schema: schema.clone(),
            projection: None,
            projected_schema: schema,
            filters: Vec::new(),
            limit: None,
            decode,
        }
    }

    /// Sets the projection.
    pub fn with_projection(mut self, indices: Vec<usize>) -> Self {
        self.projected_schema = Arc::new(self.table_schema.project(&indices));
        self.projection = Some(indices);
        self
    }

    /// Adds a filter.
    pub fn with_filter(mut self, filter: LogicalExpr) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the table column indices read by this scan.
    pub fn read_indices(&self) -> Vec<usize> {
        match &self.projection {
            Some(indices) => indices.clone(),
            None => (0..self.table_schema.len()).collect(),
        }
    }
}

/// Inline typed rows, used for materialized frames and `SELECT` without
/// `FROM`.
#[derive(Debug, Clone)]
pub struct ValuesOperator {
    /// Rows, each matching `schema`.
    pub rows: Arc<Vec<Row>>,
    /// Schema.
    pub schema: SchemaRef,
}

/// Bare column selection.
#[derive(Debug, Clone)]
pub struct SelectOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Selected columns, resolved against the input schema.
    pub columns: Vec<Column>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Projection operator.
#[derive(Debug, Clone)]
pub struct ProjectionOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Projection expressions.
    pub exprs: Vec<LogicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Filter operator.
#[derive(Debug, Clone)]
pub struct FilterOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Filter predicate.
    pub predicate: LogicalExpr,
}

/// Aggregate operator.
///
/// Output columns are the group keys followed by one column per aggregate
/// expression. An aggregate expression contains at least one aggregate
/// call and may combine several (`sum(a) / count(*)`).
#[derive(Debug, Clone)]
pub struct AggregateOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Group-by expressions; empty for a single global group.
    pub group_by: Vec<LogicalExpr>,
    /// Aggregate expressions.
    pub aggregates: Vec<LogicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Options controlling join output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Suffix appended to right-side columns whose names collide with the
    /// left side.
    pub suffix: String,
    /// Whether null keys match each other.
    pub nulls_equal: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            suffix: "_right".to_string(),
            nulls_equal: false,
        }
    }
}

/// Join operator.
#[derive(Debug, Clone)]
pub struct JoinOperator {
    /// Left input.
    pub left: Arc<LogicalOperator>,
    /// Right input.
    pub right: Arc<LogicalOperator>,
    /// Join type.
    pub join_type: JoinType,
    /// Equi-join keys: (left expression, right expression), each resolved
    /// against its own side. Empty for a cross join.
    pub on: Vec<(LogicalExpr, LogicalExpr)>,
    /// Residual predicate, resolved against the combined left and right
    /// columns.
    pub filter: Option<LogicalExpr>,
    /// Join options.
    pub options: JoinOptions,
    /// Output schema.
    pub schema: SchemaRef,
}

impl JoinOperator {
    /// Returns the schema the residual filter is resolved against: all
    /// left columns followed by all right columns.
    pub fn combined_schema(&self) -> Schema {
        self.left.schema().merge(&self.right.schema())
    }
}

/// Long to wide reshape.
///
/// Output columns are the index columns followed by one column per value in
/// `on_values`, named after the value's display form.
#[derive(Debug, Clone)]
pub struct PivotOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Index columns; one output row per distinct index key.
    pub index: Vec<Column>,
    /// Column whose values become output columns.
    pub on: Column,
    /// Column providing the cell values.
    pub values: Column,
    /// Declared pivot values, in output column order.
    pub on_values: Vec<Value>,
    /// Aggregate applied when several rows share an index key and pivot
    /// value.
    pub aggregate: AggregateFunc,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Wide to long reshape.
///
/// Each input row produces one output row per value column, in input row
/// order.
#[derive(Debug, Clone)]
pub struct MeltOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Identifier columns copied to every output row.
    pub id_vars: Vec<Column>,
    /// Columns unpivoted into `(variable, value)` pairs.
    pub value_vars: Vec<Column>,
    /// Name of the output column holding the source column name.
    pub variable_name: String,
    /// Name of the output column holding the value.
    pub value_name: String,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Sort operator.
#[derive(Debug, Clone)]
pub struct SortOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Sort expressions.
    pub order_by: Vec<SortExpr>,
    /// Fetch limit (for top-N).
    pub fetch: Option<usize>,
}

/// Window operator: input columns followed by one column per window
/// expression.
#[derive(Debug, Clone)]
pub struct WindowOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Window expressions, each a window call, possibly aliased.
    pub window_exprs: Vec<LogicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Unit of a rolling window period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    /// Calendar days (`d`).
    Days,
    /// Weeks of seven days (`w`).
    Weeks,
    /// Hours (`h`).
    Hours,
    /// Minutes (`m`).
    Minutes,
    /// Seconds (`s`).
    Seconds,
    /// Raw index units for integer indexes (`i`).
    Index,
}

/// A rolling window length such as `3d` or `10i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    /// Number of units.
    pub amount: i64,
    /// Unit.
    pub unit: PeriodUnit,
}

impl Period {
    /// Parses a period string: a positive integer followed by one of
    /// `d`, `w`, `h`, `m`, `s` or `i`.
    pub fn parse(text: &str) -> Result<Period, PlanError> {
        let text = text.trim();
        let invalid = || PlanError::InvalidPlan(format!("invalid rolling period '{}'", text));
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (digits, unit) = text.split_at(split);
        let amount: i64 = digits.parse().map_err(|_| invalid())?;
        if amount <= 0 {
            return Err(invalid());
        }
        let unit = match unit {
            "d" => PeriodUnit::Days,
            "w" => PeriodUnit::Weeks,
            "h" => PeriodUnit::Hours,
            "m" => PeriodUnit::Minutes,
            "s" => PeriodUnit::Seconds,
            "i" => PeriodUnit::Index,
            _ => return Err(invalid()),
        };
        Ok(Period { amount, unit })
    }

    /// Returns the window length in the units of
    /// [`Value::index_position`] for an index column of type `index_type`.
    pub fn span(&self, index_type: &DataType) -> Result<i64, PlanError> {
        const MICROS_PER_SECOND: i64 = 1_000_000;
        let per_unit = match (index_type, self.unit) {
            (DataType::Date, PeriodUnit::Days) => 1,
            (DataType::Date, PeriodUnit::Weeks) => 7,
            (DataType::Datetime, PeriodUnit::Days) => 86_400 * MICROS_PER_SECOND,
            (DataType::Datetime, PeriodUnit::Weeks) => 7 * 86_400 * MICROS_PER_SECOND,
            (DataType::Datetime | DataType::Time, PeriodUnit::Hours) => 3_600 * MICROS_PER_SECOND,
            (DataType::Datetime | DataType::Time, PeriodUnit::Minutes) => 60 * MICROS_PER_SECOND,
            (DataType::Datetime | DataType::Time, PeriodUnit::Seconds) => MICROS_PER_SECOND,
            (DataType::Int64, PeriodUnit::Index) => 1,
            _ => {
                return Err(PlanError::TypeMismatch(format!(
                    "rolling period {} does not apply to an index of type {}",
                    self, index_type
                )))
            }
        };
        self.amount
            .checked_mul(per_unit)
            .ok_or_else(|| PlanError::InvalidPlan(format!("rolling period {} is too long", self)))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            PeriodUnit::Days => "d",
            PeriodUnit::Weeks => "w",
            PeriodUnit::Hours => "h",
            PeriodUnit::Minutes => "m",
            PeriodUnit::Seconds => "s",
            PeriodUnit::Index => "i",
        };
        write!(f, "{}{}", self.amount, unit)
    }
}

/// Rolling operator: input columns followed by one column per rolling
/// aggregate. Each row's window covers the rows of its group whose index
/// lies in `(t - period, t]`.
#[derive(Debug, Clone)]
pub struct RollingOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Index column; must be non-decreasing within each group.
    pub index_column: Column,
    /// Window length.
    pub period: Period,
    /// Grouping columns; windows never cross groups.
    pub group_by: Vec<Column>,
    /// Aggregate expressions over a single column, possibly aliased.
    pub aggregates: Vec<LogicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// How union inputs are aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnionMode {
    /// Inputs share names and types, in the same order.
    #[default]
    Vertical,
    /// Output holds every column seen; missing columns are null-filled and
    /// shared columns must have the same type.
    Diagonal,
    /// Like `Diagonal`, with shared columns cast to their relaxed supertype.
    DiagonalRelaxed,
}

impl fmt::Display for UnionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnionMode::Vertical => write!(f, "vertical"),
            UnionMode::Diagonal => write!(f, "diagonal"),
            UnionMode::DiagonalRelaxed => write!(f, "diagonal_relaxed"),
        }
    }
}

/// Union operator.
#[derive(Debug, Clone)]
pub struct UnionOperator {
    /// Inputs, concatenated in order.
    pub inputs: Vec<Arc<LogicalOperator>>,
    /// Alignment mode.
    pub mode: UnionMode,
    /// Output schema; columns in first-seen order.
    pub schema: SchemaRef,
}

/// Limit operator.
#[derive(Debug, Clone)]
pub struct LimitOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Number of rows to skip.
    pub offset: usize,
    /// Maximum number of rows to return.
    pub fetch: Option<usize>,
}

/// Distinct operator over all columns; keeps the first occurrence.
#[derive(Debug, Clone)]
pub struct DistinctOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
}

/// Subquery alias operator.
#[derive(Debug, Clone)]
pub struct SubqueryAliasOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Alias name.
    pub alias: String,
    /// Aliased schema.
    pub schema: SchemaRef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::schema::Field;
    use crate::source::MemorySource;

    fn sales_scan() -> ScanOperator {
        let schema = Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
        ]);
        let source = MemorySource::from_strs("sales", &["year", "town"], &[&["2020", "A"]]);
        ScanOperator::new("sales", Arc::new(source), schema, DecodeOptions::default())
    }

    #[test]
    fn test_scan_with_projection() {
        let scan = sales_scan().with_projection(vec![1]);
        assert_eq!(scan.projected_schema.len(), 1);
        assert_eq!(scan.projected_schema.field(0).unwrap().name(), "town");
        assert_eq!(scan.read_indices(), vec![1]);
    }

    #[test]
    fn test_join_type_properties() {
        assert!(JoinType::Left.preserves_left());
        assert!(!JoinType::Left.preserves_right());
        assert!(JoinType::Semi.pushes_left());
        assert!(!JoinType::Left.pushes_right());
    }

    #[test]
    fn test_period_parse() {
        assert_eq!(
            Period::parse("3d").unwrap(),
            Period {
                amount: 3,
                unit: PeriodUnit::Days
            }
        );
        assert_eq!(Period::parse("2w").unwrap().span(&DataType::Date).unwrap(), 14);
        assert_eq!(
            Period::parse("1h").unwrap().span(&DataType::Datetime).unwrap(),
            3_600_000_000
        );
        assert!(Period::parse("0d").is_err());
        assert!(Period::parse("3x").is_err());
        assert!(Period::parse("d").is_err());
        assert!(Period::parse("1h").unwrap().span(&DataType::Date).is_err());
    }

    #[test]
    fn test_with_new_inputs_keeps_parameters() {
        let scan = Arc::new(LogicalOperator::Scan(sales_scan()));
        let limit = LogicalOperator::Limit(LimitOperator {
            input: scan.clone(),
            offset: 1,
            fetch: Some(2),
        });
        match limit.with_new_inputs(vec![scan]) {
            LogicalOperator::Limit(op) => {
                assert_eq!(op.offset, 1);
                assert_eq!(op.fetch, Some(2));
            }
            other => panic!("unexpected {}", other.name()),
        }
    }
}
