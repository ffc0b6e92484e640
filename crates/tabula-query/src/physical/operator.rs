//! Physical operators for query execution.
//!
//! Physical operators describe how each step of a plan is computed. Every
//! expression is already bound to column indices of the operator's input.

use std::fmt;
use std::sync::Arc;

use crate::executor::{Row, Value};
use crate::logical::{AggregateFunc, SchemaRef};
use crate::parser::{DataType, JoinType};
use crate::source::{DecodeOptions, RowSource};

use super::expr::{PhysicalAggregateExpr, PhysicalExpr, PhysicalSortExpr, PhysicalWindowExpr};

/// A physical operator in the execution plan.
#[derive(Debug, Clone)]
pub enum PhysicalOperator {
    /// Sequential scan of a row source.
    SeqScan(SeqScanOperator),

    /// Inline rows.
    Values(ValuesPhysicalOperator),

    /// Filter operator.
    Filter(FilterPhysicalOperator),

    /// Projection operator.
    Projection(ProjectionPhysicalOperator),

    /// Hash join; a join without keys pairs every row.
    HashJoin(HashJoinOperator),

    /// Hash aggregate.
    HashAggregate(HashAggregateOperator),

    /// Full sort.
    Sort(SortPhysicalOperator),

    /// Top-N operator (sort with a fetch limit).
    TopN(TopNOperator),

    /// Limit operator.
    Limit(LimitPhysicalOperator),

    /// Distinct operator.
    Distinct(DistinctPhysicalOperator),

    /// Concatenation of inputs.
    Union(UnionPhysicalOperator),

    /// Long to wide reshape.
    Pivot(PivotPhysicalOperator),

    /// Wide to long reshape.
    Melt(MeltPhysicalOperator),

    /// Window functions.
    Window(WindowPhysicalOperator),

    /// Rolling aggregates.
    Rolling(RollingPhysicalOperator),
}

impl PhysicalOperator {
    /// Returns the output schema.
    pub fn schema(&self) -> SchemaRef {
        match self {
            PhysicalOperator::SeqScan(op) => op.projected_schema.clone(),
            PhysicalOperator::Values(op) => op.schema.clone(),
            PhysicalOperator::Filter(op) => op.input.schema(),
            PhysicalOperator::Projection(op) => op.schema.clone(),
            PhysicalOperator::HashJoin(op) => op.schema.clone(),
            PhysicalOperator::HashAggregate(op) => op.schema.clone(),
            PhysicalOperator::Sort(op) => op.input.schema(),
            PhysicalOperator::TopN(op) => op.input.schema(),
            PhysicalOperator::Limit(op) => op.input.schema(),
            PhysicalOperator::Distinct(op) => op.input.schema(),
            PhysicalOperator::Union(op) => op.schema.clone(),
            PhysicalOperator::Pivot(op) => op.schema.clone(),
            PhysicalOperator::Melt(op) => op.schema.clone(),
            PhysicalOperator::Window(op) => op.schema.clone(),
            PhysicalOperator::Rolling(op) => op.schema.clone(),
        }
    }

    /// Returns child operators.
    pub fn children(&self) -> Vec<&Arc<PhysicalOperator>> {
        match self {
            PhysicalOperator::SeqScan(_) | PhysicalOperator::Values(_) => vec![],

            PhysicalOperator::Filter(op) => vec![&op.input],
            PhysicalOperator::Projection(op) => vec![&op.input],
            PhysicalOperator::HashAggregate(op) => vec![&op.input],
            PhysicalOperator::Sort(op) => vec![&op.input],
            PhysicalOperator::TopN(op) => vec![&op.input],
            PhysicalOperator::Limit(op) => vec![&op.input],
            PhysicalOperator::Distinct(op) => vec![&op.input],
            PhysicalOperator::Pivot(op) => vec![&op.input],
            PhysicalOperator::Melt(op) => vec![&op.input],
            PhysicalOperator::Window(op) => vec![&op.input],
            PhysicalOperator::Rolling(op) => vec![&op.input],

            PhysicalOperator::HashJoin(op) => vec![&op.left, &op.right],
            PhysicalOperator::Union(op) => op.inputs.iter().collect(),
        }
    }

    /// Returns the operator name.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalOperator::SeqScan(_) => "SeqScan",
            PhysicalOperator::Values(_) => "Values",
            PhysicalOperator::Filter(_) => "Filter",
            PhysicalOperator::Projection(_) => "Projection",
            PhysicalOperator::HashJoin(_) => "HashJoin",
            PhysicalOperator::HashAggregate(_) => "HashAggregate",
            PhysicalOperator::Sort(_) => "Sort",
            PhysicalOperator::TopN(_) => "TopN",
            PhysicalOperator::Limit(_) => "Limit",
            PhysicalOperator::Distinct(_) => "Distinct",
            PhysicalOperator::Union(_) => "Union",
            PhysicalOperator::Pivot(_) => "Pivot",
            PhysicalOperator::Melt(_) => "Melt",
            PhysicalOperator::Window(_) => "Window",
            PhysicalOperator::Rolling(_) => "Rolling",
        }
    }

    /// Returns true if the operator reads its whole input before emitting
    /// the first row.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::HashAggregate(_)
                | PhysicalOperator::Sort(_)
                | PhysicalOperator::TopN(_)
                | PhysicalOperator::Pivot(_)
                | PhysicalOperator::Window(_)
                | PhysicalOperator::Rolling(_)
        )
    }
}

impl fmt::Display for PhysicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Leaf Operators
// ============================================================================

/// Sequential scan operator.
#[derive(Debug, Clone)]
pub struct SeqScanOperator {
    /// Table name.
    pub table_name: String,
    /// Row source.
    pub source: Arc<dyn RowSource>,
    /// Full table schema.
    pub table_schema: SchemaRef,
    /// Table column indices to decode, in output order.
    pub projection: Vec<usize>,
    /// Projected schema.
    pub projected_schema: SchemaRef,
    /// Pushed-down predicates, bound to the projected row.
    pub filters: Vec<PhysicalExpr>,
    /// Maximum rows to emit after filtering.
    pub limit: Option<usize>,
    /// Cell decoding options.
    pub decode: DecodeOptions,
}

/// Inline rows.
#[derive(Debug, Clone)]
pub struct ValuesPhysicalOperator {
    /// Rows.
    pub rows: Arc<Vec<Row>>,
    /// Schema.
    pub schema: SchemaRef,
}

// ============================================================================
// Filter and Projection
// ============================================================================

/// Physical filter operator.
#[derive(Debug, Clone)]
pub struct FilterPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Filter predicate.
    pub predicate: PhysicalExpr,
}

/// Physical projection operator.
#[derive(Debug, Clone)]
pub struct ProjectionPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Projection expressions.
    pub exprs: Vec<PhysicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

// ============================================================================
// Joins
// ============================================================================

/// Hash join operator.
///
/// The right input is the build side, except for right joins, which build
/// on the left so the probe side is the preserved one.
#[derive(Debug, Clone)]
pub struct HashJoinOperator {
    /// Left input.
    pub left: Arc<PhysicalOperator>,
    /// Right input.
    pub right: Arc<PhysicalOperator>,
    /// Join type.
    pub join_type: JoinType,
    /// Left key expressions.
    pub left_keys: Vec<PhysicalExpr>,
    /// Right key expressions.
    pub right_keys: Vec<PhysicalExpr>,
    /// Residual predicate over a left row followed by a right row.
    pub filter: Option<PhysicalExpr>,
    /// Whether null keys match each other.
    pub nulls_equal: bool,
    /// Output schema.
    pub schema: SchemaRef,
}

// ============================================================================
// Aggregation
// ============================================================================

/// Hash aggregate operator.
///
/// Each group row holds the group key values followed by one value per
/// aggregate call. `output_exprs` are evaluated on that row to produce the
/// aggregate columns, so `sum(a) / count(*)` is computed after grouping.
#[derive(Debug, Clone)]
pub struct HashAggregateOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Group-by expressions.
    pub group_by: Vec<PhysicalExpr>,
    /// Distinct aggregate calls.
    pub aggregates: Vec<PhysicalAggregateExpr>,
    /// Output aggregate columns, bound to the group row.
    pub output_exprs: Vec<PhysicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Long to wide reshape.
#[derive(Debug, Clone)]
pub struct PivotPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Index column positions.
    pub index: Vec<usize>,
    /// Pivot column position.
    pub on: usize,
    /// Value column position.
    pub values: usize,
    /// Declared pivot values, one output column each.
    pub on_values: Vec<Value>,
    /// Aggregate for cells with several rows.
    pub aggregate: AggregateFunc,
    /// Output type of the pivoted cells.
    pub value_type: DataType,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Wide to long reshape.
#[derive(Debug, Clone)]
pub struct MeltPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Identifier column positions.
    pub id_vars: Vec<usize>,
    /// Value column positions with their names.
    pub value_vars: Vec<(usize, String)>,
    /// Type of the value column.
    pub value_type: DataType,
    /// Output schema.
    pub schema: SchemaRef,
}

// ============================================================================
// Ordering
// ============================================================================

/// Physical sort operator.
#[derive(Debug, Clone)]
pub struct SortPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Sort expressions.
    pub order_by: Vec<PhysicalSortExpr>,
}

/// Top-N operator: the first `n` rows of a stable sort.
#[derive(Debug, Clone)]
pub struct TopNOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Sort expressions.
    pub order_by: Vec<PhysicalSortExpr>,
    /// Number of rows to keep.
    pub n: usize,
}

/// Physical limit operator.
#[derive(Debug, Clone)]
pub struct LimitPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to return.
    pub fetch: Option<usize>,
}

/// Physical distinct operator.
#[derive(Debug, Clone)]
pub struct DistinctPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
}

/// Physical union operator.
#[derive(Debug, Clone)]
pub struct UnionPhysicalOperator {
    /// Inputs, read in order.
    pub inputs: Vec<Arc<PhysicalOperator>>,
    /// Per input, the input column feeding each output column; `None`
    /// null-fills.
    pub mappings: Vec<Vec<Option<usize>>>,
    /// Output schema.
    pub schema: SchemaRef,
}

// ============================================================================
// Windows
// ============================================================================

/// Window operator.
#[derive(Debug, Clone)]
pub struct WindowPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Window expressions.
    pub window_exprs: Vec<PhysicalWindowExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Rolling aggregate operator.
#[derive(Debug, Clone)]
pub struct RollingPhysicalOperator {
    /// Input operator.
    pub input: Arc<PhysicalOperator>,
    /// Index column position.
    pub index: usize,
    /// Index column name, for errors.
    pub index_name: String,
    /// Window length in index position units.
    pub span: i64,
    /// Group column positions.
    pub group_by: Vec<usize>,
    /// Aggregates, each over a single column.
    pub aggregates: Vec<PhysicalAggregateExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{Field, Schema};

    fn values() -> PhysicalOperator {
        let schema = Arc::new(Schema::new(vec![Field::nullable("a", DataType::Int64)]));
        PhysicalOperator::Values(ValuesPhysicalOperator {
            rows: Arc::new(vec![Row::new(vec![Value::int(1)])]),
            schema,
        })
    }

    #[test]
    fn test_operator_children_and_schema() {
        let limit = PhysicalOperator::Limit(LimitPhysicalOperator {
            input: Arc::new(values()),
            offset: 0,
            fetch: Some(1),
        });
        assert_eq!(limit.children().len(), 1);
        assert_eq!(limit.schema().names(), vec!["a"]);
        assert_eq!(limit.to_string(), "Limit");
        assert!(!limit.is_blocking());
    }

    #[test]
    fn test_blocking_operators() {
        let sort = PhysicalOperator::Sort(SortPhysicalOperator {
            input: Arc::new(values()),
            order_by: vec![],
        });
        assert!(sort.is_blocking());
    }
}
