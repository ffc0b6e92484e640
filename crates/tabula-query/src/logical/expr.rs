//! Logical expressions for query plans.
//!
//! These expressions are used in logical plans and are independent of
//! physical execution. They support type inference and the usual
//! builder-style construction:
//!
//! ```ignore
//! use tabula_query::logical::{col, lit};
//!
//! let expr = col("value").gt(lit(100)).and(col("town").upper().eq(lit("A")));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::builder::PlanError;
use super::schema::{Column, LookupError, Schema};
use crate::parser::{DataType, Literal};

/// A logical expression.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalExpr {
    /// Column reference.
    Column(Column),

    /// Literal value.
    Literal(Literal),

    /// Alias (expression AS name).
    Alias {
        /// Aliased expression.
        expr: Box<LogicalExpr>,
        /// Output name.
        name: String,
    },

    /// Binary operation.
    BinaryOp {
        /// Left operand.
        left: Box<LogicalExpr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<LogicalExpr>,
    },

    /// Unary operation.
    UnaryOp {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        expr: Box<LogicalExpr>,
    },

    /// IS NULL check.
    IsNull(Box<LogicalExpr>),

    /// IS NOT NULL check.
    IsNotNull(Box<LogicalExpr>),

    /// IN list.
    InList {
        /// Expression to test.
        expr: Box<LogicalExpr>,
        /// Candidate values.
        list: Vec<LogicalExpr>,
        /// NOT IN.
        negated: bool,
    },

    /// CASE expression.
    Case {
        /// Operand of a simple CASE.
        operand: Option<Box<LogicalExpr>>,
        /// WHEN-THEN pairs.
        when_then: Vec<(LogicalExpr, LogicalExpr)>,
        /// ELSE result.
        else_result: Option<Box<LogicalExpr>>,
    },

    /// CAST expression.
    Cast {
        /// Expression to cast.
        expr: Box<LogicalExpr>,
        /// Target type.
        data_type: DataType,
    },

    /// Scalar function call.
    ScalarFunction {
        /// Function.
        func: ScalarFunc,
        /// Arguments.
        args: Vec<LogicalExpr>,
    },

    /// Aggregate function call.
    AggregateCall {
        /// Function.
        func: AggregateFunc,
        /// Arguments (empty for `count(*)`).
        args: Vec<LogicalExpr>,
        /// Aggregate over distinct values only.
        distinct: bool,
    },

    /// Window function call.
    WindowCall {
        /// Function.
        func: WindowFunc,
        /// Arguments.
        args: Vec<LogicalExpr>,
        /// Partition keys.
        partition_by: Vec<LogicalExpr>,
        /// Ordering within a partition; empty means arrival order.
        order_by: Vec<SortExpr>,
    },

    /// Wildcard (`*`), only valid in a SELECT list or `count(*)`.
    Wildcard,
}

/// Creates a column reference.
pub fn col(name: impl Into<String>) -> LogicalExpr {
    LogicalExpr::col(name)
}

/// Creates a literal.
pub fn lit(value: impl Into<Literal>) -> LogicalExpr {
    LogicalExpr::Literal(value.into())
}

/// Creates a NULL literal.
pub fn lit_null() -> LogicalExpr {
    LogicalExpr::Literal(Literal::Null)
}

/// `count(*)`: number of rows, including nulls.
pub fn count_star() -> LogicalExpr {
    LogicalExpr::AggregateCall {
        func: AggregateFunc::CountStar,
        args: vec![],
        distinct: false,
    }
}

/// First non-null argument.
pub fn coalesce(args: Vec<LogicalExpr>) -> LogicalExpr {
    LogicalExpr::ScalarFunction {
        func: ScalarFunc::Coalesce,
        args,
    }
}

/// String concatenation of all arguments; null if any argument is null.
pub fn concat(args: Vec<LogicalExpr>) -> LogicalExpr {
    LogicalExpr::ScalarFunction {
        func: ScalarFunc::Concat,
        args,
    }
}

/// Packs the arguments into a struct, one field per argument output name.
pub fn as_struct(args: Vec<LogicalExpr>) -> LogicalExpr {
    LogicalExpr::ScalarFunction {
        func: ScalarFunc::Struct,
        args,
    }
}

/// Row number in arrival order (or in `order_by` order after `order_by`).
pub fn row_number() -> LogicalExpr {
    LogicalExpr::WindowCall {
        func: WindowFunc::RowNumber,
        args: vec![],
        partition_by: vec![],
        order_by: vec![],
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Boolean(v)
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Integer(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Integer(i64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::String(v)
    }
}

impl From<chrono::NaiveDate> for Literal {
    fn from(v: chrono::NaiveDate) -> Self {
        Literal::Date(v)
    }
}

impl From<chrono::NaiveDateTime> for Literal {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Literal::Datetime(v)
    }
}

impl LogicalExpr {
    // ===== Constructors =====

    /// Creates a column reference.
    pub fn col(name: impl Into<String>) -> Self {
        LogicalExpr::Column(Column::new(name))
    }

    /// Creates a qualified column reference.
    pub fn qualified_col(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        LogicalExpr::Column(Column::qualified(qualifier, name))
    }

    /// Creates a literal integer.
    pub fn lit_i64(value: i64) -> Self {
        LogicalExpr::Literal(Literal::Integer(value))
    }

    /// Creates a literal float.
    pub fn lit_f64(value: f64) -> Self {
        LogicalExpr::Literal(Literal::Float(value))
    }

    /// Creates a literal string.
    pub fn lit_str(value: impl Into<String>) -> Self {
        LogicalExpr::Literal(Literal::String(value.into()))
    }

    /// Creates a literal boolean.
    pub fn lit_bool(value: bool) -> Self {
        LogicalExpr::Literal(Literal::Boolean(value))
    }

    /// Creates an alias.
    pub fn alias(self, name: impl Into<String>) -> Self {
        LogicalExpr::Alias {
            expr: Box::new(self.unalias()),
            name: name.into(),
        }
    }

    /// Strips a top-level alias.
    pub fn unalias(self) -> Self {
        match self {
            LogicalExpr::Alias { expr, .. } => *expr,
            other => other,
        }
    }

    // ===== Binary operations =====

    /// Equality comparison.
    pub fn eq(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Eq, other)
    }

    /// Not equal comparison.
    pub fn not_eq(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::NotEq, other)
    }

    /// Less than comparison.
    pub fn lt(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Lt, other)
    }

    /// Less than or equal comparison.
    pub fn lt_eq(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::LtEq, other)
    }

    /// Greater than comparison.
    pub fn gt(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Gt, other)
    }

    /// Greater than or equal comparison.
    pub fn gt_eq(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::GtEq, other)
    }

    /// Logical AND.
    pub fn and(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::And, other)
    }

    /// Logical OR.
    pub fn or(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Or, other)
    }

    /// Addition.
    pub fn add(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Plus, other)
    }

    /// Subtraction.
    pub fn sub(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Minus, other)
    }

    /// Multiplication.
    pub fn mul(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Multiply, other)
    }

    /// True division; always produces a float.
    pub fn div(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Divide, other)
    }

    /// Remainder.
    pub fn modulo(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Modulo, other)
    }

    /// String concatenation (`||`).
    pub fn concat_with(self, other: LogicalExpr) -> Self {
        self.binary_op(BinaryOp::Concat, other)
    }

    fn binary_op(self, op: BinaryOp, right: LogicalExpr) -> Self {
        LogicalExpr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    // ===== Unary operations =====

    /// Logical NOT.
    pub fn not(self) -> Self {
        LogicalExpr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(self),
        }
    }

    /// Negation.
    pub fn neg(self) -> Self {
        LogicalExpr::UnaryOp {
            op: UnaryOp::Minus,
            expr: Box::new(self),
        }
    }

    /// IS NULL.
    pub fn is_null(self) -> Self {
        LogicalExpr::IsNull(Box::new(self))
    }

    /// IS NOT NULL.
    pub fn is_not_null(self) -> Self {
        LogicalExpr::IsNotNull(Box::new(self))
    }

    /// IN (list).
    pub fn is_in(self, list: Vec<LogicalExpr>) -> Self {
        LogicalExpr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    /// CAST to the given type.
    pub fn cast(self, data_type: DataType) -> Self {
        LogicalExpr::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    // ===== Scalar functions =====

    fn scalar(self, func: ScalarFunc, extra: Vec<LogicalExpr>) -> Self {
        let mut args = vec![self];
        args.extend(extra);
        LogicalExpr::ScalarFunction { func, args }
    }

    /// Upper-cases a string.
    pub fn upper(self) -> Self {
        self.scalar(ScalarFunc::Upper, vec![])
    }

    /// Lower-cases a string.
    pub fn lower(self) -> Self {
        self.scalar(ScalarFunc::Lower, vec![])
    }

    /// Strips leading and trailing whitespace.
    pub fn trim(self) -> Self {
        self.scalar(ScalarFunc::Trim, vec![])
    }

    /// Length of a string in characters, or of a list in elements.
    pub fn length(self) -> Self {
        self.scalar(ScalarFunc::Length, vec![])
    }

    /// Substring test.
    pub fn contains(self, pattern: LogicalExpr) -> Self {
        self.scalar(ScalarFunc::Contains, vec![pattern])
    }

    /// Prefix test.
    pub fn starts_with(self, prefix: LogicalExpr) -> Self {
        self.scalar(ScalarFunc::StartsWith, vec![prefix])
    }

    /// Suffix test.
    pub fn ends_with(self, suffix: LogicalExpr) -> Self {
        self.scalar(ScalarFunc::EndsWith, vec![suffix])
    }

    /// Replaces every occurrence of `from` with `to`.
    pub fn replace(self, from: LogicalExpr, to: LogicalExpr) -> Self {
        self.scalar(ScalarFunc::Replace, vec![from, to])
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        self.scalar(ScalarFunc::Abs, vec![])
    }

    /// Rounds to `decimals` places.
    pub fn round(self, decimals: i64) -> Self {
        self.scalar(ScalarFunc::Round, vec![LogicalExpr::lit_i64(decimals)])
    }

    /// Calendar year of a date or datetime.
    pub fn year(self) -> Self {
        self.scalar(ScalarFunc::Year, vec![])
    }

    /// Month (1-12) of a date or datetime.
    pub fn month(self) -> Self {
        self.scalar(ScalarFunc::Month, vec![])
    }

    /// Day of month of a date or datetime.
    pub fn day(self) -> Self {
        self.scalar(ScalarFunc::Day, vec![])
    }

    /// Element at `index` (zero-based) of a list; null when out of range.
    pub fn list_get(self, index: i64) -> Self {
        self.scalar(ScalarFunc::ListGet, vec![LogicalExpr::lit_i64(index)])
    }

    /// Field of a struct.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.scalar(ScalarFunc::StructField, vec![LogicalExpr::lit_str(name)])
    }

    // ===== Aggregate functions =====

    fn aggregate(self, func: AggregateFunc) -> Self {
        LogicalExpr::AggregateCall {
            func,
            args: vec![self],
            distinct: false,
        }
    }

    /// COUNT of non-null values.
    pub fn count(self) -> Self {
        self.aggregate(AggregateFunc::Count)
    }

    /// SUM aggregate.
    pub fn sum(self) -> Self {
        self.aggregate(AggregateFunc::Sum)
    }

    /// Arithmetic mean.
    pub fn mean(self) -> Self {
        self.aggregate(AggregateFunc::Mean)
    }

    /// Median.
    pub fn median(self) -> Self {
        self.aggregate(AggregateFunc::Median)
    }

    /// MIN aggregate.
    pub fn min(self) -> Self {
        self.aggregate(AggregateFunc::Min)
    }

    /// MAX aggregate.
    pub fn max(self) -> Self {
        self.aggregate(AggregateFunc::Max)
    }

    /// First value in arrival order.
    pub fn first(self) -> Self {
        self.aggregate(AggregateFunc::First)
    }

    /// Last value in arrival order.
    pub fn last(self) -> Self {
        self.aggregate(AggregateFunc::Last)
    }

    /// Number of distinct non-null values.
    pub fn n_unique(self) -> Self {
        self.aggregate(AggregateFunc::NUnique)
    }

    /// Collects the group's values into a list.
    pub fn implode(self) -> Self {
        self.aggregate(AggregateFunc::List)
    }

    // ===== Window functions =====

    /// Ranks values with the given method.
    pub fn rank(self, method: RankMethod, descending: bool) -> Self {
        let order = if descending {
            SortExpr::desc(self)
        } else {
            SortExpr::asc(self)
        };
        LogicalExpr::WindowCall {
            func: WindowFunc::Rank(method),
            args: vec![],
            partition_by: vec![],
            order_by: vec![order],
        }
    }

    /// Value `offset` rows earlier in the partition.
    pub fn lag(self, offset: i64) -> Self {
        LogicalExpr::WindowCall {
            func: WindowFunc::Lag,
            args: vec![self, LogicalExpr::lit_i64(offset)],
            partition_by: vec![],
            order_by: vec![],
        }
    }

    /// Value `offset` rows later in the partition.
    pub fn lead(self, offset: i64) -> Self {
        LogicalExpr::WindowCall {
            func: WindowFunc::Lead,
            args: vec![self, LogicalExpr::lit_i64(offset)],
            partition_by: vec![],
            order_by: vec![],
        }
    }

    /// Evaluates this window or aggregate expression per partition.
    ///
    /// An aggregate becomes a window aggregate over the partition; an
    /// existing window call gets its partition keys replaced. Aliases are
    /// preserved.
    pub fn over(self, partition_by: Vec<LogicalExpr>) -> Self {
        match self {
            LogicalExpr::Alias { expr, name } => expr.over(partition_by).alias(name),
            LogicalExpr::AggregateCall { func, args, .. } => LogicalExpr::WindowCall {
                func: WindowFunc::Aggregate(func),
                args,
                partition_by,
                order_by: vec![],
            },
            LogicalExpr::WindowCall {
                func,
                args,
                order_by,
                ..
            } => LogicalExpr::WindowCall {
                func,
                args,
                partition_by,
                order_by,
            },
            other => other,
        }
    }

    /// Sets the ordering of a window call.
    pub fn order_by(self, order_by: Vec<SortExpr>) -> Self {
        match self {
            LogicalExpr::Alias { expr, name } => expr.order_by(order_by).alias(name),
            LogicalExpr::WindowCall {
                func,
                args,
                partition_by,
                ..
            } => LogicalExpr::WindowCall {
                func,
                args,
                partition_by,
                order_by,
            },
            other => other,
        }
    }

    // ===== Analysis methods =====

    /// Returns all column references in this expression, in sorted order.
    pub fn columns(&self) -> BTreeSet<Column> {
        let mut cols = BTreeSet::new();
        self.collect_columns(&mut cols);
        cols
    }

    fn collect_columns(&self, cols: &mut BTreeSet<Column>) {
        match self {
            LogicalExpr::Column(c) => {
                cols.insert(c.clone());
            }
            LogicalExpr::Literal(_) | LogicalExpr::Wildcard => {}
            LogicalExpr::Alias { expr, .. }
            | LogicalExpr::UnaryOp { expr, .. }
            | LogicalExpr::Cast { expr, .. }
            | LogicalExpr::IsNull(expr)
            | LogicalExpr::IsNotNull(expr) => expr.collect_columns(cols),
            LogicalExpr::BinaryOp { left, right, .. } => {
                left.collect_columns(cols);
                right.collect_columns(cols);
            }
            LogicalExpr::InList { expr, list, .. } => {
                expr.collect_columns(cols);
                for e in list {
                    e.collect_columns(cols);
                }
            }
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => {
                if let Some(op) = operand {
                    op.collect_columns(cols);
                }
                for (w, t) in when_then {
                    w.collect_columns(cols);
                    t.collect_columns(cols);
                }
                if let Some(e) = else_result {
                    e.collect_columns(cols);
                }
            }
            LogicalExpr::ScalarFunction { args, .. } | LogicalExpr::AggregateCall { args, .. } => {
                for arg in args {
                    arg.collect_columns(cols);
                }
            }
            LogicalExpr::WindowCall {
                args,
                partition_by,
                order_by,
                ..
            } => {
                for arg in args {
                    arg.collect_columns(cols);
                }
                for p in partition_by {
                    p.collect_columns(cols);
                }
                for o in order_by {
                    o.expr.collect_columns(cols);
                }
            }
        }
    }

    /// Returns the direct children of this expression.
    pub fn children(&self) -> Vec<&LogicalExpr> {
        match self {
            LogicalExpr::Column(_) | LogicalExpr::Literal(_) | LogicalExpr::Wildcard => vec![],
            LogicalExpr::Alias { expr, .. }
            | LogicalExpr::UnaryOp { expr, .. }
            | LogicalExpr::Cast { expr, .. }
            | LogicalExpr::IsNull(expr)
            | LogicalExpr::IsNotNull(expr) => vec![expr],
            LogicalExpr::BinaryOp { left, right, .. } => vec![left, right],
            LogicalExpr::InList { expr, list, .. } => {
                let mut out = vec![expr.as_ref()];
                out.extend(list.iter());
                out
            }
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => {
                let mut out = Vec::new();
                if let Some(op) = operand {
                    out.push(op.as_ref());
                }
                for (w, t) in when_then {
                    out.push(w);
                    out.push(t);
                }
                if let Some(e) = else_result {
                    out.push(e.as_ref());
                }
                out
            }
            LogicalExpr::ScalarFunction { args, .. } | LogicalExpr::AggregateCall { args, .. } => {
                args.iter().collect()
            }
            LogicalExpr::WindowCall {
                args,
                partition_by,
                order_by,
                ..
            } => args
                .iter()
                .chain(partition_by.iter())
                .chain(order_by.iter().map(|o| &o.expr))
                .collect(),
        }
    }

    /// Rewrites this expression top-down. Where `f` returns a replacement the
    /// whole subtree is replaced; otherwise the children are rewritten.
    pub fn transform<F>(&self, f: &mut F) -> LogicalExpr
    where
        F: FnMut(&LogicalExpr) -> Option<LogicalExpr>,
    {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        let boxed = |e: &LogicalExpr, f: &mut F| Box::new(e.transform(f));
        match self {
            LogicalExpr::Column(_) | LogicalExpr::Literal(_) | LogicalExpr::Wildcard => {
                self.clone()
            }
            LogicalExpr::Alias { expr, name } => LogicalExpr::Alias {
                expr: boxed(expr, f),
                name: name.clone(),
            },
            LogicalExpr::BinaryOp { left, op, right } => LogicalExpr::BinaryOp {
                left: boxed(left, f),
                op: *op,
                right: boxed(right, f),
            },
            LogicalExpr::UnaryOp { op, expr } => LogicalExpr::UnaryOp {
                op: *op,
                expr: boxed(expr, f),
            },
            LogicalExpr::IsNull(e) => LogicalExpr::IsNull(boxed(e, f)),
            LogicalExpr::IsNotNull(e) => LogicalExpr::IsNotNull(boxed(e, f)),
            LogicalExpr::InList {
                expr,
                list,
                negated,
            } => LogicalExpr::InList {
                expr: boxed(expr, f),
                list: list.iter().map(|e| e.transform(f)).collect(),
                negated: *negated,
            },
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => LogicalExpr::Case {
                operand: operand.as_ref().map(|o| boxed(o, f)),
                when_then: when_then
                    .iter()
                    .map(|(w, t)| (w.transform(f), t.transform(f)))
                    .collect(),
                else_result: else_result.as_ref().map(|e| boxed(e, f)),
            },
            LogicalExpr::Cast { expr, data_type } => LogicalExpr::Cast {
                expr: boxed(expr, f),
                data_type: data_type.clone(),
            },
            LogicalExpr::ScalarFunction { func, args } => LogicalExpr::ScalarFunction {
                func: *func,
                args: args.iter().map(|a| a.transform(f)).collect(),
            },
            LogicalExpr::AggregateCall {
                func,
                args,
                distinct,
            } => LogicalExpr::AggregateCall {
                func: *func,
                args: args.iter().map(|a| a.transform(f)).collect(),
                distinct: *distinct,
            },
            LogicalExpr::WindowCall {
                func,
                args,
                partition_by,
                order_by,
            } => LogicalExpr::WindowCall {
                func: *func,
                args: args.iter().map(|a| a.transform(f)).collect(),
                partition_by: partition_by.iter().map(|p| p.transform(f)).collect(),
                order_by: order_by
                    .iter()
                    .map(|o| SortExpr {
                        expr: o.expr.transform(f),
                        asc: o.asc,
                        nulls_first: o.nulls_first,
                    })
                    .collect(),
            },
        }
    }

    /// Replaces column references according to `map`; unmapped columns are
    /// kept.
    pub fn replace_columns<F>(&self, mut map: F) -> LogicalExpr
    where
        F: FnMut(&Column) -> Option<LogicalExpr>,
    {
        self.transform(&mut |e| match e {
            LogicalExpr::Column(c) => map(c),
            _ => None,
        })
    }

    /// Returns true if this expression contains any aggregate call outside
    /// of a window.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            LogicalExpr::AggregateCall { .. } => true,
            LogicalExpr::WindowCall { .. } => false,
            other => other.children().iter().any(|c| c.contains_aggregate()),
        }
    }

    /// Returns true if this expression contains a window call.
    pub fn contains_window(&self) -> bool {
        match self {
            LogicalExpr::WindowCall { .. } => true,
            other => other.children().iter().any(|c| c.contains_window()),
        }
    }

    /// Returns true if this expression only involves literals.
    pub fn is_constant(&self) -> bool {
        match self {
            LogicalExpr::Literal(_) => true,
            LogicalExpr::Column(_)
            | LogicalExpr::Wildcard
            | LogicalExpr::AggregateCall { .. }
            | LogicalExpr::WindowCall { .. } => false,
            other => other.children().iter().all(|c| c.is_constant()),
        }
    }

    /// Infers the output data type of this expression given an input schema,
    /// rejecting references to unknown columns and ill-typed operations.
    pub fn data_type(&self, schema: &Schema) -> Result<DataType, PlanError> {
        match self {
            LogicalExpr::Column(col) => {
                let index = resolve_column(schema, col)?;
                Ok(schema.fields()[index].data_type.clone())
            }
            LogicalExpr::Literal(lit) => Ok(lit.data_type()),
            LogicalExpr::Alias { expr, .. } => expr.data_type(schema),
            LogicalExpr::BinaryOp { left, op, right } => {
                binary_op_data_type(*op, &left.data_type(schema)?, &right.data_type(schema)?)
                    .ok_or_else(|| {
                        PlanError::TypeMismatch(format!(
                            "cannot apply '{}' to {} ({}) and {} ({})",
                            op,
                            left,
                            left.data_type(schema).unwrap_or(DataType::Null),
                            right,
                            right.data_type(schema).unwrap_or(DataType::Null)
                        ))
                    })
            }
            LogicalExpr::UnaryOp { op, expr } => {
                let input = expr.data_type(schema)?;
                match op {
                    UnaryOp::Not if matches!(input, DataType::Boolean | DataType::Null) => {
                        Ok(DataType::Boolean)
                    }
                    UnaryOp::Minus if input.is_numeric() || input.is_null() => Ok(input),
                    _ => Err(PlanError::TypeMismatch(format!(
                        "cannot apply '{}' to {} ({})",
                        op, expr, input
                    ))),
                }
            }
            LogicalExpr::IsNull(e) | LogicalExpr::IsNotNull(e) => {
                e.data_type(schema)?;
                Ok(DataType::Boolean)
            }
            LogicalExpr::InList { expr, list, .. } => {
                let t = expr.data_type(schema)?;
                for item in list {
                    let it = item.data_type(schema)?;
                    if !comparable(&t, &it) {
                        return Err(PlanError::TypeMismatch(format!(
                            "IN list item {} ({}) is not comparable with {} ({})",
                            item, it, expr, t
                        )));
                    }
                }
                Ok(DataType::Boolean)
            }
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => {
                let operand_type = operand
                    .as_ref()
                    .map(|o| o.data_type(schema))
                    .transpose()?;
                let mut result = DataType::Null;
                for (when, then) in when_then {
                    let wt = when.data_type(schema)?;
                    match &operand_type {
                        Some(ot) if !comparable(ot, &wt) => {
                            return Err(PlanError::TypeMismatch(format!(
                                "CASE operand ({}) is not comparable with WHEN {} ({})",
                                ot, when, wt
                            )))
                        }
                        None if !matches!(wt, DataType::Boolean | DataType::Null) => {
                            return Err(PlanError::TypeMismatch(format!(
                                "CASE condition {} must be boolean, found {}",
                                when, wt
                            )))
                        }
                        _ => {}
                    }
                    result = unify(&result, &then.data_type(schema)?, "CASE branches")?;
                }
                if let Some(e) = else_result {
                    result = unify(&result, &e.data_type(schema)?, "CASE branches")?;
                }
                Ok(result)
            }
            LogicalExpr::Cast { expr, data_type } => {
                expr.data_type(schema)?;
                Ok(data_type.clone())
            }
            LogicalExpr::ScalarFunction { func, args } => {
                let types = args
                    .iter()
                    .map(|a| a.data_type(schema))
                    .collect::<Result<Vec<_>, _>>()?;
                func.return_type(args, &types)
            }
            LogicalExpr::AggregateCall { func, args, .. } => {
                if args.iter().any(|a| a.contains_aggregate()) {
                    return Err(PlanError::InvalidPlan(format!(
                        "aggregate calls cannot be nested: {}",
                        self
                    )));
                }
                let input = match args.first() {
                    Some(LogicalExpr::Wildcard) | None => None,
                    Some(arg) => Some(arg.data_type(schema)?),
                };
                func.return_type(input.as_ref())
            }
            LogicalExpr::WindowCall {
                func,
                args,
                partition_by,
                order_by,
            } => {
                for p in partition_by {
                    p.data_type(schema)?;
                }
                for o in order_by {
                    o.expr.data_type(schema)?;
                }
                let input = args.first().map(|a| a.data_type(schema)).transpose()?;
                match func {
                    WindowFunc::RowNumber => Ok(DataType::Int64),
                    WindowFunc::Rank(method) => {
                        if order_by.is_empty() {
                            return Err(PlanError::InvalidPlan(
                                "rank requires an ordering".to_string(),
                            ));
                        }
                        Ok(match method {
                            RankMethod::Average => DataType::Float64,
                            _ => DataType::Int64,
                        })
                    }
                    WindowFunc::Lag | WindowFunc::Lead => input.ok_or_else(|| {
                        PlanError::InvalidPlan(format!("{} requires an argument", func))
                    }),
                    WindowFunc::Aggregate(agg) => agg.return_type(input.as_ref()),
                }
            }
            LogicalExpr::Wildcard => Err(PlanError::InvalidPlan(
                "'*' is only valid in a SELECT list or count(*)".to_string(),
            )),
        }
    }

    /// Returns whether this expression may produce NULL.
    pub fn nullable(&self, schema: &Schema) -> bool {
        match self {
            LogicalExpr::Column(col) => resolve_column(schema, col)
                .map(|i| schema.fields()[i].nullable)
                .unwrap_or(true),
            LogicalExpr::Literal(lit) => lit.is_null(),
            LogicalExpr::Alias { expr, .. } => expr.nullable(schema),
            LogicalExpr::IsNull(_) | LogicalExpr::IsNotNull(_) => false,
            LogicalExpr::AggregateCall {
                func: AggregateFunc::Count | AggregateFunc::CountStar | AggregateFunc::NUnique,
                ..
            } => false,
            LogicalExpr::WindowCall {
                func: WindowFunc::RowNumber | WindowFunc::Rank(_),
                ..
            } => false,
            _ => true,
        }
    }

    /// Returns the output name of this expression.
    ///
    /// Aliased expressions take their alias; other expressions are named
    /// after the first column they reference, so `col("x").upper()` is still
    /// called `x`. Expressions without a column reference are `literal`,
    /// and `count(*)` is `count`.
    pub fn output_name(&self) -> String {
        match self {
            LogicalExpr::Column(col) => col.name.clone(),
            LogicalExpr::Alias { name, .. } => name.clone(),
            LogicalExpr::AggregateCall {
                func: AggregateFunc::CountStar,
                ..
            } => "count".to_string(),
            LogicalExpr::WindowCall {
                func: WindowFunc::RowNumber,
                args,
                ..
            } if args.is_empty() => "row_number".to_string(),
            LogicalExpr::WindowCall {
                func: WindowFunc::Rank(_),
                order_by,
                ..
            } => order_by
                .first()
                .map(|o| o.expr.output_name())
                .unwrap_or_else(|| "rank".to_string()),
            other => other
                .children()
                .into_iter()
                .map(|c| c.output_name())
                .find(|n| n != "literal")
                .unwrap_or_else(|| "literal".to_string()),
        }
    }
}

pub(crate) fn resolve_column(schema: &Schema, col: &Column) -> Result<usize, PlanError> {
    schema.resolve_column(col).map_err(|e| match e {
        LookupError::NotFound => PlanError::UnknownColumn {
            name: col.qualified_name(),
            available: schema.fields().iter().map(|f| f.qualified_name()).collect(),
        },
        LookupError::Ambiguous(candidates) => PlanError::AmbiguousColumn {
            name: col.qualified_name(),
            candidates,
        },
    })
}

/// Two types can be compared if they share a supertype, or if one is text
/// and the other temporal (the text is parsed at evaluation time).
pub(crate) fn comparable(a: &DataType, b: &DataType) -> bool {
    a.is_comparable_with(b)
        || (a.is_string() && b.is_temporal())
        || (a.is_temporal() && b.is_string())
}

fn unify(acc: &DataType, next: &DataType, context: &str) -> Result<DataType, PlanError> {
    acc.supertype(next).ok_or_else(|| {
        PlanError::TypeMismatch(format!("{} have incompatible types {} and {}", context, acc, next))
    })
}

fn binary_op_data_type(op: BinaryOp, left: &DataType, right: &DataType) -> Option<DataType> {
    use DataType::*;
    match op {
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq => comparable(left, right).then_some(Boolean),

        BinaryOp::And | BinaryOp::Or => {
            (matches!(left, Boolean | Null) && matches!(right, Boolean | Null)).then_some(Boolean)
        }

        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Modulo => {
            match (left, right) {
                (Int64, Int64) => Some(Int64),
                (Null, Null) => Some(Null),
                (l, r) if (l.is_numeric() || l.is_null()) && (r.is_numeric() || r.is_null()) => {
                    l.supertype(r)
                }
                _ => None,
            }
        }
        BinaryOp::Divide => ((left.is_numeric() || left.is_null())
            && (right.is_numeric() || right.is_null()))
        .then_some(Float64),

        BinaryOp::Concat => (!left.is_nested() && !right.is_nested()).then_some(Utf8),
    }
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum BinaryOp {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,

    // Logical
    And,
    Or,

    // String
    Concat,
}

impl BinaryOp {
    /// Returns true if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Returns true if this is a logical operator.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Returns true if this is an arithmetic operator.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus
                | BinaryOp::Minus
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    /// Returns true if this operator is commutative.
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Plus | BinaryOp::Multiply | BinaryOp::And | BinaryOp::Or
        )
    }

    /// Returns the negation of this comparison operator.
    pub fn negate(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::NotEq),
            BinaryOp::NotEq => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::GtEq),
            BinaryOp::LtEq => Some(BinaryOp::Gt),
            BinaryOp::Gt => Some(BinaryOp::LtEq),
            BinaryOp::GtEq => Some(BinaryOp::Lt),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::Plus => write!(f, "+"),
            BinaryOp::Minus => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Modulo => write!(f, "%"),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Concat => write!(f, "||"),
        }
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum UnaryOp {
    Not,
    Minus,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::Minus => write!(f, "-"),
        }
    }
}

/// Built-in scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum ScalarFunc {
    Upper,
    Lower,
    Trim,
    LTrim,
    RTrim,
    Length,
    Concat,
    Substring,
    Replace,
    StartsWith,
    EndsWith,
    Contains,
    Coalesce,
    Abs,
    Round,
    Floor,
    Ceil,
    Year,
    Month,
    Day,
    ListGet,
    StructField,
    Struct,
}

impl ScalarFunc {
    /// Looks up a function by its SQL name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "upper" | "ucase" => ScalarFunc::Upper,
            "lower" | "lcase" => ScalarFunc::Lower,
            "trim" | "btrim" => ScalarFunc::Trim,
            "ltrim" => ScalarFunc::LTrim,
            "rtrim" => ScalarFunc::RTrim,
            "length" | "char_length" | "character_length" | "len" => ScalarFunc::Length,
            "concat" => ScalarFunc::Concat,
            "substring" | "substr" => ScalarFunc::Substring,
            "replace" => ScalarFunc::Replace,
            "starts_with" => ScalarFunc::StartsWith,
            "ends_with" => ScalarFunc::EndsWith,
            "contains" => ScalarFunc::Contains,
            "coalesce" | "ifnull" => ScalarFunc::Coalesce,
            "abs" => ScalarFunc::Abs,
            "round" => ScalarFunc::Round,
            "floor" => ScalarFunc::Floor,
            "ceil" | "ceiling" => ScalarFunc::Ceil,
            "year" => ScalarFunc::Year,
            "month" => ScalarFunc::Month,
            "day" => ScalarFunc::Day,
            "list_get" | "list_extract" => ScalarFunc::ListGet,
            "struct_extract" => ScalarFunc::StructField,
            "struct_pack" => ScalarFunc::Struct,
            _ => return None,
        })
    }

    /// Returns the function's name.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunc::Upper => "upper",
            ScalarFunc::Lower => "lower",
            ScalarFunc::Trim => "trim",
            ScalarFunc::LTrim => "ltrim",
            ScalarFunc::RTrim => "rtrim",
            ScalarFunc::Length => "length",
            ScalarFunc::Concat => "concat",
            ScalarFunc::Substring => "substring",
            ScalarFunc::Replace => "replace",
            ScalarFunc::StartsWith => "starts_with",
            ScalarFunc::EndsWith => "ends_with",
            ScalarFunc::Contains => "contains",
            ScalarFunc::Coalesce => "coalesce",
            ScalarFunc::Abs => "abs",
            ScalarFunc::Round => "round",
            ScalarFunc::Floor => "floor",
            ScalarFunc::Ceil => "ceil",
            ScalarFunc::Year => "year",
            ScalarFunc::Month => "month",
            ScalarFunc::Day => "day",
            ScalarFunc::ListGet => "list_get",
            ScalarFunc::StructField => "struct_extract",
            ScalarFunc::Struct => "struct_pack",
        }
    }

    fn return_type(&self, args: &[LogicalExpr], types: &[DataType]) -> Result<DataType, PlanError> {
        use DataType::*;

        let mismatch = || {
            PlanError::TypeMismatch(format!(
                "{}({}) is not defined",
                self.name(),
                types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
            ))
        };
        let arity = |range: std::ops::RangeInclusive<usize>| {
            if range.contains(&types.len()) {
                Ok(())
            } else {
                Err(PlanError::InvalidPlan(format!(
                    "{} expects {} to {} arguments, got {}",
                    self.name(),
                    range.start(),
                    range.end(),
                    types.len()
                )))
            }
        };
        let is_text = |t: &DataType| matches!(t, Utf8 | Null);
        let is_num = |t: &DataType| t.is_numeric() || t.is_null();

        match self {
            ScalarFunc::Upper
            | ScalarFunc::Lower
            | ScalarFunc::Trim
            | ScalarFunc::LTrim
            | ScalarFunc::RTrim => {
                arity(1..=1)?;
                is_text(&types[0]).then_some(Utf8).ok_or_else(mismatch)
            }
            ScalarFunc::Length => {
                arity(1..=1)?;
                (is_text(&types[0]) || matches!(types[0], List(_)))
                    .then_some(Int64)
                    .ok_or_else(mismatch)
            }
            ScalarFunc::Concat => {
                arity(1..=usize::MAX)?;
                types
                    .iter()
                    .all(|t| !t.is_nested())
                    .then_some(Utf8)
                    .ok_or_else(mismatch)
            }
            ScalarFunc::Substring => {
                arity(2..=3)?;
                (is_text(&types[0]) && types[1..].iter().all(|t| matches!(t, Int64 | Null)))
                    .then_some(Utf8)
                    .ok_or_else(mismatch)
            }
            ScalarFunc::Replace => {
                arity(3..=3)?;
                types.iter().all(is_text).then_some(Utf8).ok_or_else(mismatch)
            }
            ScalarFunc::StartsWith | ScalarFunc::EndsWith | ScalarFunc::Contains => {
                arity(2..=2)?;
                types.iter().all(is_text).then_some(Boolean).ok_or_else(mismatch)
            }
            ScalarFunc::Coalesce => {
                arity(1..=usize::MAX)?;
                let mut result = Null;
                for t in types {
                    result = unify(&result, t, "coalesce arguments")?;
                }
                Ok(result)
            }
            ScalarFunc::Abs => {
                arity(1..=1)?;
                is_num(&types[0]).then(|| types[0].clone()).ok_or_else(mismatch)
            }
            ScalarFunc::Round => {
                arity(1..=2)?;
                (is_num(&types[0]) && types[1..].iter().all(|t| matches!(t, Int64 | Null)))
                    .then(|| types[0].clone())
                    .ok_or_else(mismatch)
            }
            ScalarFunc::Floor | ScalarFunc::Ceil => {
                arity(1..=1)?;
                is_num(&types[0]).then(|| types[0].clone()).ok_or_else(mismatch)
            }
            ScalarFunc::Year | ScalarFunc::Month | ScalarFunc::Day => {
                arity(1..=1)?;
                matches!(types[0], Date | Datetime | Null)
                    .then_some(Int64)
                    .ok_or_else(mismatch)
            }
            ScalarFunc::ListGet => {
                arity(2..=2)?;
                match (&types[0], &types[1]) {
                    (List(inner), Int64) => Ok((**inner).clone()),
                    (Null, Int64) => Ok(Null),
                    _ => Err(mismatch()),
                }
            }
            ScalarFunc::StructField => {
                arity(2..=2)?;
                let name = match &args[1] {
                    LogicalExpr::Literal(Literal::String(s)) => s,
                    _ => return Err(mismatch()),
                };
                match &types[0] {
                    Struct(fields) => fields
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, t)| t.clone())
                        .ok_or_else(|| PlanError::UnknownColumn {
                            name: name.clone(),
                            available: fields.iter().map(|(n, _)| n.clone()).collect(),
                        }),
                    _ => Err(mismatch()),
                }
            }
            ScalarFunc::Struct => {
                arity(1..=usize::MAX)?;
                Ok(Struct(
                    args.iter()
                        .zip(types.iter())
                        .map(|(a, t)| (a.output_name(), t.clone()))
                        .collect(),
                ))
            }
        }
    }
}

impl fmt::Display for ScalarFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AggregateFunc {
    Count,
    CountStar,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    First,
    Last,
    NUnique,
    /// Collects values into a list.
    List,
}

impl AggregateFunc {
    /// Looks up an aggregate by its SQL name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "count" => AggregateFunc::Count,
            "sum" => AggregateFunc::Sum,
            "avg" | "mean" => AggregateFunc::Mean,
            "median" => AggregateFunc::Median,
            "min" => AggregateFunc::Min,
            "max" => AggregateFunc::Max,
            "first" | "first_value" => AggregateFunc::First,
            "last" | "last_value" => AggregateFunc::Last,
            "n_unique" => AggregateFunc::NUnique,
            "list" | "array_agg" => AggregateFunc::List,
            _ => return None,
        })
    }

    /// Returns the output type for the given input type.
    pub fn return_type(&self, input: Option<&DataType>) -> Result<DataType, PlanError> {
        use DataType::*;
        let input = match (self, input) {
            (AggregateFunc::CountStar, _) => return Ok(Int64),
            (_, Some(t)) => t,
            (_, None) => {
                return Err(PlanError::InvalidPlan(format!("{} requires an argument", self)))
            }
        };
        let mismatch = || PlanError::TypeMismatch(format!("{} is not defined for {}", self, input));
        match self {
            AggregateFunc::Count | AggregateFunc::CountStar | AggregateFunc::NUnique => Ok(Int64),
            AggregateFunc::Sum => match input {
                Int64 | Boolean | Null => Ok(Int64),
                Float64 => Ok(Float64),
                _ => Err(mismatch()),
            },
            AggregateFunc::Mean | AggregateFunc::Median => match input {
                Int64 | Float64 | Boolean | Null => Ok(Float64),
                _ => Err(mismatch()),
            },
            AggregateFunc::Min | AggregateFunc::Max => {
                if matches!(input, Struct(_)) {
                    Err(mismatch())
                } else {
                    Ok(input.clone())
                }
            }
            AggregateFunc::First | AggregateFunc::Last => Ok(input.clone()),
            AggregateFunc::List => Ok(List(Box::new(input.clone()))),
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunc::Count | AggregateFunc::CountStar => write!(f, "count"),
            AggregateFunc::Sum => write!(f, "sum"),
            AggregateFunc::Mean => write!(f, "mean"),
            AggregateFunc::Median => write!(f, "median"),
            AggregateFunc::Min => write!(f, "min"),
            AggregateFunc::Max => write!(f, "max"),
            AggregateFunc::First => write!(f, "first"),
            AggregateFunc::Last => write!(f, "last"),
            AggregateFunc::NUnique => write!(f, "n_unique"),
            AggregateFunc::List => write!(f, "list"),
        }
    }
}

/// Tie-breaking policy for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMethod {
    /// Ties share a rank; the next rank follows without gaps.
    #[default]
    Dense,
    /// Ties share the lowest rank; gaps follow (SQL `RANK`).
    Min,
    /// Ties share the highest rank.
    Max,
    /// Every row gets a distinct rank in order of appearance (`ROW_NUMBER`).
    Ordinal,
    /// Ties share the mean of the ranks they span.
    Average,
}

/// Window function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowFunc {
    /// Aggregate used as window function.
    Aggregate(AggregateFunc),
    /// ROW_NUMBER().
    RowNumber,
    /// Ranking with a tie policy.
    Rank(RankMethod),
    /// LAG(expr, offset).
    Lag,
    /// LEAD(expr, offset).
    Lead,
}

impl fmt::Display for WindowFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowFunc::Aggregate(agg) => write!(f, "{}", agg),
            WindowFunc::RowNumber => write!(f, "row_number"),
            WindowFunc::Rank(RankMethod::Dense) => write!(f, "dense_rank"),
            WindowFunc::Rank(RankMethod::Min) => write!(f, "rank"),
            WindowFunc::Rank(RankMethod::Ordinal) => write!(f, "ordinal_rank"),
            WindowFunc::Rank(RankMethod::Max) => write!(f, "max_rank"),
            WindowFunc::Rank(RankMethod::Average) => write!(f, "average_rank"),
            WindowFunc::Lag => write!(f, "lag"),
            WindowFunc::Lead => write!(f, "lead"),
        }
    }
}

/// Sort expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    /// Expression to sort by.
    pub expr: LogicalExpr,
    /// Sort direction.
    pub asc: bool,
    /// NULL handling.
    pub nulls_first: bool,
}

impl SortExpr {
    /// Creates a new ascending sort, nulls last.
    pub fn asc(expr: LogicalExpr) -> Self {
        Self {
            expr,
            asc: true,
            nulls_first: false,
        }
    }

    /// Creates a new descending sort, nulls first.
    pub fn desc(expr: LogicalExpr) -> Self {
        Self {
            expr,
            asc: false,
            nulls_first: true,
        }
    }

    /// Overrides null placement.
    pub fn nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = nulls_first;
        self
    }
}

impl fmt::Display for SortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if self.asc {
            write!(f, " ASC")?;
        } else {
            write!(f, " DESC")?;
        }
        if self.nulls_first {
            write!(f, " NULLS FIRST")
        } else {
            write!(f, " NULLS LAST")
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for LogicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalExpr::Column(c) => write!(f, "{}", c),
            LogicalExpr::Literal(l) => write!(f, "{}", l),
            LogicalExpr::Alias { expr, name } => write!(f, "{} AS {}", expr, name),
            LogicalExpr::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            LogicalExpr::UnaryOp { op: UnaryOp::Not, expr } => write!(f, "NOT {}", expr),
            LogicalExpr::UnaryOp { op, expr } => write!(f, "{}{}", op, expr),
            LogicalExpr::IsNull(e) => write!(f, "{} IS NULL", e),
            LogicalExpr::IsNotNull(e) => write!(f, "{} IS NOT NULL", e),
            LogicalExpr::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{} {}IN (", expr, if *negated { "NOT " } else { "" })?;
                write_list(f, list)?;
                write!(f, ")")
            }
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => {
                write!(f, "CASE")?;
                if let Some(op) = operand {
                    write!(f, " {}", op)?;
                }
                for (w, t) in when_then {
                    write!(f, " WHEN {} THEN {}", w, t)?;
                }
                if let Some(e) = else_result {
                    write!(f, " ELSE {}", e)?;
                }
                write!(f, " END")
            }
            LogicalExpr::Cast { expr, data_type } => {
                write!(f, "CAST({} AS {})", expr, data_type)
            }
            LogicalExpr::ScalarFunction { func, args } => {
                write!(f, "{}(", func)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            LogicalExpr::AggregateCall {
                func: AggregateFunc::CountStar,
                ..
            } => write!(f, "count(*)"),
            LogicalExpr::AggregateCall {
                func,
                args,
                distinct,
            } => {
                write!(f, "{}({}", func, if *distinct { "DISTINCT " } else { "" })?;
                write_list(f, args)?;
                write!(f, ")")
            }
            LogicalExpr::WindowCall {
                func,
                args,
                partition_by,
                order_by,
            } => {
                write!(f, "{}(", func)?;
                write_list(f, args)?;
                write!(f, ") OVER (")?;
                if !partition_by.is_empty() {
                    write!(f, "PARTITION BY ")?;
                    write_list(f, partition_by)?;
                    if !order_by.is_empty() {
                        write!(f, " ")?;
                    }
                }
                if !order_by.is_empty() {
                    write!(f, "ORDER BY ")?;
                    write_list(f, order_by)?;
                }
                write!(f, ")")
            }
            LogicalExpr::Wildcard => write!(f, "*"),
        }
    }
}

/// Splits a predicate into its AND-ed conjuncts.
pub fn split_conjunction(expr: &LogicalExpr) -> Vec<LogicalExpr> {
    match expr {
        LogicalExpr::BinaryOp {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut out = split_conjunction(left);
            out.extend(split_conjunction(right));
            out
        }
        other => vec![other.clone()],
    }
}

/// Joins predicates with AND; `None` for an empty list.
pub fn conjoin(exprs: Vec<LogicalExpr>) -> Option<LogicalExpr> {
    exprs.into_iter().reduce(|acc, e| acc.and(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::schema::Field;

    fn sales_schema() -> Schema {
        Schema::new(vec![
            Field::not_null("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
            Field::nullable("value", DataType::Float64),
            Field::nullable("date", DataType::Date),
        ])
    }

    #[test]
    fn test_expr_constructors() {
        assert!(matches!(col("id"), LogicalExpr::Column(_)));
        assert!(matches!(lit(42), LogicalExpr::Literal(Literal::Integer(42))));
        assert!(matches!(lit("a"), LogicalExpr::Literal(Literal::String(_))));
    }

    #[test]
    fn test_columns_extraction() {
        let expr = col("a").add(col("b")).mul(col("a"));
        let cols: Vec<_> = expr.columns().into_iter().map(|c| c.name).collect();
        assert_eq!(cols, vec!["a", "b"]);
    }

    #[test]
    fn test_contains_aggregate() {
        assert!(!col("a").add(lit(1)).contains_aggregate());
        assert!(col("a").sum().add(lit(1)).contains_aggregate());
        assert!(!col("a").sum().over(vec![col("b")]).contains_aggregate());
    }

    #[test]
    fn test_data_type_inference() {
        let schema = sales_schema();
        assert_eq!(col("year").data_type(&schema).unwrap(), DataType::Int64);
        assert_eq!(
            col("year").add(col("value")).data_type(&schema).unwrap(),
            DataType::Float64
        );
        assert_eq!(col("year").div(lit(2)).data_type(&schema).unwrap(), DataType::Float64);
        assert_eq!(col("value").mean().data_type(&schema).unwrap(), DataType::Float64);
        assert_eq!(
            col("town").implode().data_type(&schema).unwrap(),
            DataType::List(Box::new(DataType::Utf8))
        );
        assert_eq!(col("date").year().data_type(&schema).unwrap(), DataType::Int64);
    }

    #[test]
    fn test_unknown_column() {
        let err = col("price").data_type(&sales_schema()).unwrap_err();
        assert!(matches!(err, PlanError::UnknownColumn { ref name, .. } if name == "price"));
    }

    #[test]
    fn test_type_mismatch() {
        let schema = sales_schema();
        assert!(matches!(
            col("town").add(lit(1)).data_type(&schema),
            Err(PlanError::TypeMismatch(_))
        ));
        assert!(matches!(
            col("year").upper().data_type(&schema),
            Err(PlanError::TypeMismatch(_))
        ));
        assert!(matches!(
            col("town").mean().data_type(&schema),
            Err(PlanError::TypeMismatch(_))
        ));
        // Text compares with dates by parsing.
        assert!(col("date").gt(lit("2020-01-01")).data_type(&schema).is_ok());
    }

    #[test]
    fn test_output_name() {
        assert_eq!(col("town").upper().output_name(), "town");
        assert_eq!(col("value").mean().alias("avg").output_name(), "avg");
        assert_eq!(count_star().output_name(), "count");
        assert_eq!(lit(1).add(lit(2)).output_name(), "literal");
        assert_eq!(
            col("value").rank(RankMethod::Dense, true).output_name(),
            "value"
        );
    }

    #[test]
    fn test_over_builds_window_call() {
        let expr = col("value").sum().over(vec![col("town")]).alias("town_total");
        match expr {
            LogicalExpr::Alias { expr, name } => {
                assert_eq!(name, "town_total");
                assert!(matches!(
                    *expr,
                    LogicalExpr::WindowCall {
                        func: WindowFunc::Aggregate(AggregateFunc::Sum),
                        ..
                    }
                ));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_display() {
        let expr = col("value").gt(lit(100)).and(col("town").is_not_null());
        assert_eq!(expr.to_string(), "((value > 100) AND town IS NOT NULL)");
        assert_eq!(count_star().to_string(), "count(*)");
    }

    #[test]
    fn test_transform_replaces_subtrees() {
        let expr = col("a").add(col("b").sum());
        let rewritten = expr.transform(&mut |e| match e {
            LogicalExpr::AggregateCall { .. } => Some(col("sum_b")),
            _ => None,
        });
        assert_eq!(rewritten, col("a").add(col("sum_b")));

        let renamed = col("a").gt(lit(1)).replace_columns(|c| {
            (c.name == "a").then(|| LogicalExpr::qualified_col("t", "a"))
        });
        assert_eq!(renamed.to_string(), "(t.a > 1)");
    }

    #[test]
    fn test_split_conjunction() {
        let expr = col("a").eq(lit(1)).and(col("b").gt(lit(2)).and(col("c").lt(lit(3))));
        let parts = split_conjunction(&expr);
        assert_eq!(parts.len(), 3);
        assert_eq!(conjoin(parts).unwrap().columns().len(), 3);
    }
}
