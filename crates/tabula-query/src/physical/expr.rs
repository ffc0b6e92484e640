//! Physical expressions for execution.
//!
//! Physical expressions are logical expressions with every column reference
//! bound to an index in the input row. Aliases are gone; the planner keeps
//! output names in the operator schemas.

use std::fmt;

use super::planner::PlanningError;
use crate::executor::Value;
use crate::logical::{
    AggregateFunc, BinaryOp, LogicalExpr, ScalarFunc, Schema, SortExpr, UnaryOp, WindowFunc,
};
use crate::parser::DataType;

/// A physical expression that can be evaluated on a row.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalExpr {
    /// Column reference by index.
    Column {
        /// Column name for display.
        name: String,
        /// Column index in the input row.
        index: usize,
    },

    /// Constant value.
    Literal(Value),

    /// Binary operation.
    BinaryExpr {
        /// Left operand.
        left: Box<PhysicalExpr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<PhysicalExpr>,
    },

    /// Unary operation.
    UnaryExpr {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<PhysicalExpr>,
    },

    /// IS NULL check.
    IsNull(Box<PhysicalExpr>),

    /// IS NOT NULL check.
    IsNotNull(Box<PhysicalExpr>),

    /// CAST expression.
    Cast {
        /// Expression to cast.
        expr: Box<PhysicalExpr>,
        /// Target data type.
        data_type: DataType,
    },

    /// CASE expression.
    Case {
        /// Optional operand for simple CASE.
        operand: Option<Box<PhysicalExpr>>,
        /// WHEN-THEN pairs.
        when_then: Vec<(PhysicalExpr, PhysicalExpr)>,
        /// ELSE result.
        else_result: Option<Box<PhysicalExpr>>,
    },

    /// Scalar function.
    ScalarFunction {
        /// Function.
        func: ScalarFunc,
        /// Arguments.
        args: Vec<PhysicalExpr>,
        /// Field names, for `struct_pack`.
        names: Vec<String>,
    },

    /// IN list check.
    InList {
        /// Expression to check.
        expr: Box<PhysicalExpr>,
        /// List of values.
        list: Vec<PhysicalExpr>,
        /// Whether negated (NOT IN).
        negated: bool,
    },
}

impl PhysicalExpr {
    /// Creates a column reference.
    pub fn column(name: impl Into<String>, index: usize) -> Self {
        PhysicalExpr::Column {
            name: name.into(),
            index,
        }
    }

    /// Creates a literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        PhysicalExpr::Literal(value.into())
    }

    /// Creates a binary expression.
    pub fn binary(left: PhysicalExpr, op: BinaryOp, right: PhysicalExpr) -> Self {
        PhysicalExpr::BinaryExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Returns true if this expression is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, PhysicalExpr::Literal(_))
    }

    /// Returns the column index if this is a bare column reference.
    pub fn as_column(&self) -> Option<usize> {
        match self {
            PhysicalExpr::Column { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for PhysicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalExpr::Column { name, index } => write!(f, "{}@{}", name, index),
            PhysicalExpr::Literal(Value::Utf8(s)) => write!(f, "'{}'", s),
            PhysicalExpr::Literal(v) => write!(f, "{}", v),
            PhysicalExpr::BinaryExpr { left, op, right } => write!(f, "({} {} {})", left, op, right),
            PhysicalExpr::UnaryExpr { op, expr } => match op {
                UnaryOp::Not => write!(f, "NOT {}", expr),
                UnaryOp::Minus => write!(f, "-{}", expr),
            },
            PhysicalExpr::IsNull(expr) => write!(f, "{} IS NULL", expr),
            PhysicalExpr::IsNotNull(expr) => write!(f, "{} IS NOT NULL", expr),
            PhysicalExpr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
            PhysicalExpr::Case { .. } => write!(f, "CASE"),
            PhysicalExpr::ScalarFunction { func, args, .. } => {
                let args: Vec<_> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func, args.join(", "))
            }
            PhysicalExpr::InList { expr, negated, .. } => {
                write!(f, "{} {}IN (...)", expr, if *negated { "NOT " } else { "" })
            }
        }
    }
}

/// Physical aggregate expression.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalAggregateExpr {
    /// Aggregate function.
    pub func: AggregateFunc,
    /// Argument; `None` for `count(*)`.
    pub arg: Option<PhysicalExpr>,
    /// Whether DISTINCT.
    pub distinct: bool,
    /// Output name.
    pub name: String,
    /// Output type.
    pub data_type: DataType,
}

impl fmt::Display for PhysicalAggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            None => write!(f, "count(*)")?,
            Some(arg) => write!(
                f,
                "{}({}{})",
                self.func,
                if self.distinct { "DISTINCT " } else { "" },
                arg
            )?,
        }
        write!(f, " AS {}", self.name)
    }
}

/// Physical sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSortExpr {
    /// Expression to sort by.
    pub expr: PhysicalExpr,
    /// Ascending order.
    pub asc: bool,
    /// Nulls sort before non-null values.
    pub nulls_first: bool,
}

impl fmt::Display for PhysicalSortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.expr,
            if self.asc { "ASC" } else { "DESC" },
            if self.nulls_first { " NULLS FIRST" } else { "" }
        )
    }
}

/// Physical window function call.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalWindowExpr {
    /// Window function.
    pub func: WindowFunc,
    /// Arguments.
    pub args: Vec<PhysicalExpr>,
    /// Partition keys.
    pub partition_by: Vec<PhysicalExpr>,
    /// Ordering within a partition.
    pub order_by: Vec<PhysicalSortExpr>,
    /// Output name.
    pub name: String,
    /// Output type.
    pub data_type: DataType,
}

impl fmt::Display for PhysicalWindowExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{}({})", self.func, args.join(", "))?;
        if !self.partition_by.is_empty() {
            let keys: Vec<_> = self.partition_by.iter().map(|a| a.to_string()).collect();
            write!(f, " PARTITION BY {}", keys.join(", "))?;
        }
        if !self.order_by.is_empty() {
            let keys: Vec<_> = self.order_by.iter().map(|a| a.to_string()).collect();
            write!(f, " ORDER BY {}", keys.join(", "))?;
        }
        write!(f, " AS {}", self.name)
    }
}

/// Converts a logical expression to a physical expression bound to `schema`.
pub fn create_physical_expr(
    expr: &LogicalExpr,
    schema: &Schema,
) -> Result<PhysicalExpr, PlanningError> {
    let bind = |e: &LogicalExpr| create_physical_expr(e, schema);
    let bind_all = |es: &[LogicalExpr]| {
        es.iter()
            .map(|e| create_physical_expr(e, schema))
            .collect::<Result<Vec<_>, _>>()
    };

    match expr {
        LogicalExpr::Column(col) => {
            let index = schema
                .resolve_column(col)
                .map_err(|_| PlanningError::ColumnNotFound(col.qualified_name()))?;
            Ok(PhysicalExpr::column(col.name.clone(), index))
        }

        LogicalExpr::Literal(lit) => Ok(PhysicalExpr::Literal(Value::from_literal(lit))),

        LogicalExpr::Alias { expr, .. } => bind(expr),

        LogicalExpr::BinaryOp { left, op, right } => {
            Ok(PhysicalExpr::binary(bind(left)?, *op, bind(right)?))
        }

        LogicalExpr::UnaryOp { op, expr } => Ok(PhysicalExpr::UnaryExpr {
            op: *op,
            expr: Box::new(bind(expr)?),
        }),

        LogicalExpr::IsNull(e) => Ok(PhysicalExpr::IsNull(Box::new(bind(e)?))),

        LogicalExpr::IsNotNull(e) => Ok(PhysicalExpr::IsNotNull(Box::new(bind(e)?))),

        LogicalExpr::InList {
            expr,
            list,
            negated,
        } => Ok(PhysicalExpr::InList {
            expr: Box::new(bind(expr)?),
            list: bind_all(list)?,
            negated: *negated,
        }),

        LogicalExpr::Case {
            operand,
            when_then,
            else_result,
        } => Ok(PhysicalExpr::Case {
            operand: operand
                .as_ref()
                .map(|o| bind(o).map(Box::new))
                .transpose()?,
            when_then: when_then
                .iter()
                .map(|(w, t)| Ok((bind(w)?, bind(t)?)))
                .collect::<Result<_, PlanningError>>()?,
            else_result: else_result
                .as_ref()
                .map(|e| bind(e).map(Box::new))
                .transpose()?,
        }),

        LogicalExpr::Cast { expr, data_type } => Ok(PhysicalExpr::Cast {
            expr: Box::new(bind(expr)?),
            data_type: data_type.clone(),
        }),

        LogicalExpr::ScalarFunction { func, args } => Ok(PhysicalExpr::ScalarFunction {
            func: *func,
            args: bind_all(args)?,
            names: args.iter().map(|a| a.output_name()).collect(),
        }),

        LogicalExpr::AggregateCall { .. } | LogicalExpr::WindowCall { .. } => Err(
            PlanningError::InvalidPlan(format!("{} cannot be evaluated per row", expr)),
        ),

        LogicalExpr::Wildcard => Err(PlanningError::InvalidPlan(
            "unexpanded wildcard".to_string(),
        )),
    }
}

/// Converts an aggregate expression (optionally aliased) to its physical form.
pub fn create_aggregate_expr(
    expr: &LogicalExpr,
    schema: &Schema,
) -> Result<PhysicalAggregateExpr, PlanningError> {
    let name = expr.output_name();
    let data_type = expr.data_type(schema)?;
    match expr.clone().unalias() {
        LogicalExpr::AggregateCall {
            func,
            args,
            distinct,
        } => {
            let arg = match args.first() {
                None | Some(LogicalExpr::Wildcard) => None,
                Some(arg) => Some(create_physical_expr(arg, schema)?),
            };
            Ok(PhysicalAggregateExpr {
                func,
                arg,
                distinct,
                name,
                data_type,
            })
        }
        other => Err(PlanningError::InvalidPlan(format!(
            "{} is not an aggregate call",
            other
        ))),
    }
}

/// Converts a sort key to its physical form.
pub fn create_sort_expr(
    sort: &SortExpr,
    schema: &Schema,
) -> Result<PhysicalSortExpr, PlanningError> {
    Ok(PhysicalSortExpr {
        expr: create_physical_expr(&sort.expr, schema)?,
        asc: sort.asc,
        nulls_first: sort.nulls_first,
    })
}

/// Converts a window call (optionally aliased) to its physical form.
pub fn create_window_expr(
    expr: &LogicalExpr,
    schema: &Schema,
) -> Result<PhysicalWindowExpr, PlanningError> {
    let name = expr.output_name();
    let data_type = expr.data_type(schema)?;
    match expr.clone().unalias() {
        LogicalExpr::WindowCall {
            func,
            args,
            partition_by,
            order_by,
        } => Ok(PhysicalWindowExpr {
            func,
            args: args
                .iter()
                .map(|a| create_physical_expr(a, schema))
                .collect::<Result<_, _>>()?,
            partition_by: partition_by
                .iter()
                .map(|p| create_physical_expr(p, schema))
                .collect::<Result<_, _>>()?,
            order_by: order_by
                .iter()
                .map(|o| create_sort_expr(o, schema))
                .collect::<Result<_, _>>()?,
            name,
            data_type,
        }),
        other => Err(PlanningError::InvalidPlan(format!(
            "{} is not a window call",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{col, lit, Field};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::nullable("a", DataType::Int64),
            Field::nullable("b", DataType::Utf8),
        ])
    }

    #[test]
    fn test_bind_columns() {
        let expr = create_physical_expr(&col("b").eq(lit("x")), &schema()).unwrap();
        match expr {
            PhysicalExpr::BinaryExpr { left, .. } => assert_eq!(left.as_column(), Some(1)),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_unknown_column() {
        let err = create_physical_expr(&col("zz"), &schema()).unwrap_err();
        assert!(matches!(err, PlanningError::ColumnNotFound(_)));
    }

    #[test]
    fn test_aggregate_expr() {
        let agg = create_aggregate_expr(&col("a").sum().alias("total"), &schema()).unwrap();
        assert_eq!(agg.name, "total");
        assert_eq!(agg.data_type, DataType::Int64);
        assert!(agg.arg.is_some());
        assert_eq!(agg.to_string(), "sum(a@0) AS total");
    }

    #[test]
    fn test_aggregate_rejects_plain_expr() {
        assert!(create_aggregate_expr(&col("a"), &schema()).is_err());
    }
}
