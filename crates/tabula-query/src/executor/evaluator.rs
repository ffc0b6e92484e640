//! Expression evaluator for physical expressions.
//!
//! This module evaluates physical expressions on rows and record batches,
//! and provides the accumulators behind every aggregate.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::{ExecutionError, ExecutionResult, RecordBatch, Row, Value};
use crate::logical::{AggregateFunc, BinaryOp, ScalarFunc, UnaryOp};
use crate::parser::DataType;
use crate::physical::{PhysicalAggregateExpr, PhysicalExpr};

/// Evaluates a physical expression on a single row.
pub fn evaluate_expr(expr: &PhysicalExpr, row: &Row) -> ExecutionResult<Value> {
    match expr {
        PhysicalExpr::Column { index, .. } => Ok(row.get(*index).cloned().unwrap_or(Value::Null)),

        PhysicalExpr::Literal(value) => Ok(value.clone()),

        PhysicalExpr::BinaryExpr { left, op, right } => {
            let left_val = evaluate_expr(left, row)?;
            // AND and OR short-circuit on a deciding left operand.
            match (op, left_val.as_bool()) {
                (BinaryOp::And, Some(false)) => return Ok(Value::Boolean(false)),
                (BinaryOp::Or, Some(true)) => return Ok(Value::Boolean(true)),
                _ => {}
            }
            let right_val = evaluate_expr(right, row)?;
            evaluate_binary_op(*op, &left_val, &right_val)
        }

        PhysicalExpr::UnaryExpr { op, expr } => {
            let val = evaluate_expr(expr, row)?;
            evaluate_unary_op(*op, &val)
        }

        PhysicalExpr::IsNull(expr) => Ok(Value::Boolean(evaluate_expr(expr, row)?.is_null())),

        PhysicalExpr::IsNotNull(expr) => Ok(Value::Boolean(!evaluate_expr(expr, row)?.is_null())),

        PhysicalExpr::Cast { expr, data_type } => evaluate_expr(expr, row)?.cast(data_type),

        PhysicalExpr::Case {
            operand,
            when_then,
            else_result,
        } => evaluate_case(operand.as_deref(), when_then, else_result.as_deref(), row),

        PhysicalExpr::ScalarFunction { func, args, names } => {
            let arg_vals = args
                .iter()
                .map(|a| evaluate_expr(a, row))
                .collect::<Result<Vec<_>, _>>()?;
            evaluate_scalar_function(*func, &arg_vals, names)
        }

        PhysicalExpr::InList {
            expr,
            list,
            negated,
        } => {
            let val = evaluate_expr(expr, row)?;
            if val.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let item = evaluate_expr(item, row)?;
                if item.is_null() {
                    saw_null = true;
                    continue;
                }
                if compare_values(&val, &item)? == Ordering::Equal {
                    return Ok(Value::Boolean(!*negated));
                }
            }
            if saw_null {
                Ok(Value::Null)
            } else {
                Ok(Value::Boolean(*negated))
            }
        }
    }
}

/// Evaluates a physical expression on all rows in a batch.
pub fn evaluate_batch(expr: &PhysicalExpr, batch: &RecordBatch) -> ExecutionResult<Vec<Value>> {
    batch.rows().map(|row| evaluate_expr(expr, &row)).collect()
}

/// Evaluates a predicate on all rows in a batch. Null counts as false.
pub fn evaluate_predicate(expr: &PhysicalExpr, batch: &RecordBatch) -> ExecutionResult<Vec<bool>> {
    batch
        .rows()
        .map(|row| is_true(&evaluate_expr(expr, &row)?))
        .collect()
}

/// Returns true only for a boolean true; null is not true.
pub fn is_true(value: &Value) -> ExecutionResult<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(ExecutionError::TypeMismatch(format!(
            "predicate produced {} instead of a boolean",
            other.data_type()
        ))),
    }
}

/// Compares two non-null values, converting text to a temporal operand's
/// type and dates to datetimes when they meet.
pub fn compare_values(left: &Value, right: &Value) -> ExecutionResult<Ordering> {
    Ok(match (left, right) {
        (Value::Utf8(_), Value::Date(_) | Value::Time(_) | Value::Datetime(_)) => {
            left.cast(&right.data_type())?.cmp(right)
        }
        (Value::Date(_) | Value::Time(_) | Value::Datetime(_), Value::Utf8(_)) => {
            left.cmp(&right.cast(&left.data_type())?)
        }
        (Value::Date(_), Value::Datetime(_)) => left.cast(&DataType::Datetime)?.cmp(right),
        (Value::Datetime(_), Value::Date(_)) => left.cmp(&right.cast(&DataType::Datetime)?),
        _ => left.cmp(right),
    })
}

fn evaluate_binary_op(op: BinaryOp, left: &Value, right: &Value) -> ExecutionResult<Value> {
    match op {
        BinaryOp::And => {
            let (l, r) = (logical_operand(left)?, logical_operand(right)?);
            Ok(match (l, r) {
                (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                (Some(true), Some(true)) => Value::Boolean(true),
                _ => Value::Null,
            })
        }
        BinaryOp::Or => {
            let (l, r) = (logical_operand(left)?, logical_operand(right)?);
            Ok(match (l, r) {
                (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                (Some(false), Some(false)) => Value::Boolean(false),
                _ => Value::Null,
            })
        }
        _ if left.is_null() || right.is_null() => Ok(Value::Null),

        BinaryOp::Eq => Ok(Value::Boolean(compare_values(left, right)? == Ordering::Equal)),
        BinaryOp::NotEq => Ok(Value::Boolean(compare_values(left, right)? != Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Boolean(compare_values(left, right)? == Ordering::Less)),
        BinaryOp::LtEq => Ok(Value::Boolean(compare_values(left, right)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Boolean(compare_values(left, right)? == Ordering::Greater)),
        BinaryOp::GtEq => Ok(Value::Boolean(compare_values(left, right)? != Ordering::Less)),

        BinaryOp::Plus => evaluate_arithmetic(op, left, right, i64::checked_add, |a, b| a + b),
        BinaryOp::Minus => evaluate_arithmetic(op, left, right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Multiply => evaluate_arithmetic(op, left, right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Divide => {
            let (l, r) = (numeric_operand(op, left)?, numeric_operand(op, right)?);
            if r == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float64(l / r))
            }
        }
        BinaryOp::Modulo => {
            if right.to_f64() == Some(0.0) {
                return Ok(Value::Null);
            }
            evaluate_arithmetic(op, left, right, i64::checked_rem, |a, b| a % b)
        }

        BinaryOp::Concat => Ok(Value::Utf8(format!("{}{}", left, right))),
    }
}

fn logical_operand(value: &Value) -> ExecutionResult<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(ExecutionError::TypeMismatch(format!(
            "logical operator applied to {}",
            other.data_type()
        ))),
    }
}

fn numeric_operand(op: BinaryOp, value: &Value) -> ExecutionResult<f64> {
    value.to_f64().ok_or_else(|| {
        ExecutionError::TypeMismatch(format!("'{}' applied to {}", op, value.data_type()))
    })
}

/// Integer operands use checked arithmetic; any float operand makes the
/// whole operation floating point.
fn evaluate_arithmetic<F, G>(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int_op: F,
    float_op: G,
) -> ExecutionResult<Value>
where
    F: Fn(i64, i64) -> Option<i64>,
    G: Fn(f64, f64) -> f64,
{
    match (left, right) {
        (Value::Int64(l), Value::Int64(r)) => int_op(*l, *r)
            .map(Value::Int64)
            .ok_or_else(|| ExecutionError::Overflow(format!("{} {} {}", l, op, r))),
        _ => {
            let (l, r) = (numeric_operand(op, left)?, numeric_operand(op, right)?);
            Ok(Value::Float64(float_op(l, r)))
        }
    }
}

fn evaluate_unary_op(op: UnaryOp, val: &Value) -> ExecutionResult<Value> {
    match (op, val) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOp::Minus, Value::Int64(i)) => i
            .checked_neg()
            .map(Value::Int64)
            .ok_or_else(|| ExecutionError::Overflow(format!("-{}", i))),
        (UnaryOp::Minus, Value::Float64(f)) => Ok(Value::Float64(-f)),
        (op, other) => Err(ExecutionError::TypeMismatch(format!(
            "'{}' applied to {}",
            op,
            other.data_type()
        ))),
    }
}

fn evaluate_case(
    operand: Option<&PhysicalExpr>,
    when_then: &[(PhysicalExpr, PhysicalExpr)],
    else_result: Option<&PhysicalExpr>,
    row: &Row,
) -> ExecutionResult<Value> {
    let operand_val = operand.map(|o| evaluate_expr(o, row)).transpose()?;

    for (when_expr, then_expr) in when_then {
        let when_val = evaluate_expr(when_expr, row)?;

        let matches = match &operand_val {
            Some(op_val) => {
                !when_val.is_null()
                    && !op_val.is_null()
                    && compare_values(op_val, &when_val)? == Ordering::Equal
            }
            None => is_true(&when_val)?,
        };

        if matches {
            return evaluate_expr(then_expr, row);
        }
    }

    match else_result {
        Some(else_expr) => evaluate_expr(else_expr, row),
        None => Ok(Value::Null),
    }
}

fn text_arg<'a>(func: ScalarFunc, value: &'a Value) -> ExecutionResult<&'a str> {
    value.as_str().ok_or_else(|| {
        ExecutionError::TypeMismatch(format!("{} expects text, got {}", func, value.data_type()))
    })
}

fn int_arg(func: ScalarFunc, value: &Value) -> ExecutionResult<i64> {
    match value {
        Value::Int64(i) => Ok(*i),
        other => Err(ExecutionError::TypeMismatch(format!(
            "{} expects an integer, got {}",
            func,
            other.data_type()
        ))),
    }
}

fn evaluate_scalar_function(func: ScalarFunc, args: &[Value], names: &[String]) -> ExecutionResult<Value> {
    let arg = |i: usize| args.get(i).unwrap_or(&Value::Null);

    match func {
        ScalarFunc::Coalesce => {
            return Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null))
        }
        ScalarFunc::Struct => {
            return Ok(Value::Struct(
                names.iter().cloned().zip(args.iter().cloned()).collect(),
            ))
        }
        _ if args.iter().any(|v| v.is_null()) => return Ok(Value::Null),
        _ => {}
    }

    match func {
        ScalarFunc::Upper => Ok(Value::Utf8(text_arg(func, arg(0))?.to_uppercase())),
        ScalarFunc::Lower => Ok(Value::Utf8(text_arg(func, arg(0))?.to_lowercase())),
        ScalarFunc::Trim => Ok(Value::Utf8(text_arg(func, arg(0))?.trim().to_string())),
        ScalarFunc::LTrim => Ok(Value::Utf8(text_arg(func, arg(0))?.trim_start().to_string())),
        ScalarFunc::RTrim => Ok(Value::Utf8(text_arg(func, arg(0))?.trim_end().to_string())),
        ScalarFunc::Length => match arg(0) {
            Value::List(items) => Ok(Value::Int64(items.len() as i64)),
            other => Ok(Value::Int64(text_arg(func, other)?.chars().count() as i64)),
        },
        ScalarFunc::Concat => Ok(Value::Utf8(args.iter().map(|v| v.to_string()).collect())),
        ScalarFunc::Substring => {
            let s = text_arg(func, arg(0))?;
            let chars: Vec<char> = s.chars().collect();
            // SQL positions are 1-based; a start before 1 shortens the length.
            let start = int_arg(func, arg(1))?.saturating_sub(1);
            let end = match args.get(2) {
                Some(len) => start.saturating_add(int_arg(func, len)?.max(0)),
                None => chars.len() as i64,
            };
            let clamp = |i: i64| i.clamp(0, chars.len() as i64) as usize;
            let (from, to) = (clamp(start), clamp(end));
            Ok(Value::Utf8(chars[from..to.max(from)].iter().collect()))
        }
        ScalarFunc::Replace => {
            let s = text_arg(func, arg(0))?;
            let from = text_arg(func, arg(1))?;
            let to = text_arg(func, arg(2))?;
            if from.is_empty() {
                Ok(Value::Utf8(s.to_string()))
            } else {
                Ok(Value::Utf8(s.replace(from, to)))
            }
        }
        ScalarFunc::StartsWith => Ok(Value::Boolean(
            text_arg(func, arg(0))?.starts_with(text_arg(func, arg(1))?),
        )),
        ScalarFunc::EndsWith => Ok(Value::Boolean(
            text_arg(func, arg(0))?.ends_with(text_arg(func, arg(1))?),
        )),
        ScalarFunc::Contains => Ok(Value::Boolean(
            text_arg(func, arg(0))?.contains(text_arg(func, arg(1))?),
        )),
        ScalarFunc::Abs => match arg(0) {
            Value::Int64(i) => i
                .checked_abs()
                .map(Value::Int64)
                .ok_or_else(|| ExecutionError::Overflow(format!("abs({})", i))),
            Value::Float64(f) => Ok(Value::Float64(f.abs())),
            other => Err(ExecutionError::TypeMismatch(format!(
                "abs expects a number, got {}",
                other.data_type()
            ))),
        },
        ScalarFunc::Round => {
            let decimals = match args.get(1) {
                Some(d) => int_arg(func, d)?,
                None => 0,
            };
            match arg(0) {
                Value::Int64(i) => Ok(Value::Int64(*i)),
                Value::Float64(f) => {
                    let factor = 10f64.powi(decimals.clamp(-300, 300) as i32);
                    Ok(Value::Float64((f * factor).round() / factor))
                }
                other => Err(ExecutionError::TypeMismatch(format!(
                    "round expects a number, got {}",
                    other.data_type()
                ))),
            }
        }
        ScalarFunc::Floor | ScalarFunc::Ceil => match arg(0) {
            Value::Int64(i) => Ok(Value::Int64(*i)),
            Value::Float64(f) if func == ScalarFunc::Floor => Ok(Value::Float64(f.floor())),
            Value::Float64(f) => Ok(Value::Float64(f.ceil())),
            other => Err(ExecutionError::TypeMismatch(format!(
                "{} expects a number, got {}",
                func,
                other.data_type()
            ))),
        },
        ScalarFunc::Year | ScalarFunc::Month | ScalarFunc::Day => {
            let value = arg(0);
            let part = match func {
                ScalarFunc::Year => value.year(),
                ScalarFunc::Month => value.month(),
                _ => value.day(),
            };
            part.map(Value::Int64).ok_or_else(|| {
                ExecutionError::TypeMismatch(format!(
                    "{} expects a date, got {}",
                    func,
                    value.data_type()
                ))
            })
        }
        ScalarFunc::ListGet => {
            let items = match arg(0) {
                Value::List(items) => items,
                other => {
                    return Err(ExecutionError::TypeMismatch(format!(
                        "list_get expects a list, got {}",
                        other.data_type()
                    )))
                }
            };
            // Zero-based; negative indexes count from the end.
            let index = int_arg(func, arg(1))?;
            let position = if index < 0 {
                (items.len() as i64).checked_add(index)
            } else {
                Some(index)
            };
            Ok(position
                .and_then(|p| usize::try_from(p).ok())
                .and_then(|p| items.get(p).cloned())
                .unwrap_or(Value::Null))
        }
        ScalarFunc::StructField => {
            let name = text_arg(func, arg(1))?;
            match arg(0) {
                Value::Struct(fields) => Ok(fields
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null)),
                other => Err(ExecutionError::TypeMismatch(format!(
                    "struct_extract expects a struct, got {}",
                    other.data_type()
                ))),
            }
        }
        ScalarFunc::Coalesce | ScalarFunc::Struct => Err(ExecutionError::Internal(format!(
            "{} handled above",
            func
        ))),
    }
}

/// Accumulator for aggregate functions.
#[derive(Debug, Clone)]
pub struct Accumulator {
    /// The aggregate function.
    func: AggregateFunc,
    /// Values already seen, for DISTINCT aggregates.
    seen: Option<HashSet<Value>>,
    /// Accumulated state.
    state: AccumulatorState,
}

/// State for different aggregate functions.
#[derive(Debug, Clone)]
enum AccumulatorState {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Mean { sum: f64, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Option<Value>),
    Unique(HashSet<Value>),
    /// Buffered values, for median and list.
    Values(Vec<Value>),
}

impl Accumulator {
    /// Creates a new accumulator for the given aggregate expression.
    pub fn new(agg: &PhysicalAggregateExpr) -> Self {
        Self::for_function(agg.func, agg.distinct, &agg.data_type)
    }

    /// Creates an accumulator from its parts. `output_type` selects integer
    /// or floating point summation.
    pub fn for_function(func: AggregateFunc, distinct: bool, output_type: &DataType) -> Self {
        let state = match func {
            AggregateFunc::Count | AggregateFunc::CountStar => AccumulatorState::Count(0),
            AggregateFunc::Sum if output_type == &DataType::Float64 => {
                AccumulatorState::SumFloat(None)
            }
            AggregateFunc::Sum => AccumulatorState::SumInt(None),
            AggregateFunc::Mean => AccumulatorState::Mean { sum: 0.0, count: 0 },
            AggregateFunc::Min => AccumulatorState::Min(None),
            AggregateFunc::Max => AccumulatorState::Max(None),
            AggregateFunc::First => AccumulatorState::First(None),
            AggregateFunc::Last => AccumulatorState::Last(None),
            AggregateFunc::NUnique => AccumulatorState::Unique(HashSet::new()),
            AggregateFunc::Median | AggregateFunc::List => AccumulatorState::Values(Vec::new()),
        };

        Self {
            func,
            seen: distinct.then(HashSet::new),
            state,
        }
    }

    /// Accumulates a value. Nulls are skipped, except by `count(*)`, which
    /// counts every call, and `list`, which keeps them.
    pub fn accumulate(&mut self, value: &Value) -> ExecutionResult<()> {
        if value.is_null() && !matches!(self.func, AggregateFunc::CountStar | AggregateFunc::List) {
            return Ok(());
        }
        if let Some(seen) = &mut self.seen {
            if !seen.insert(value.clone()) {
                return Ok(());
            }
        }

        match &mut self.state {
            AccumulatorState::Count(count) => *count += 1,
            AccumulatorState::SumInt(sum) => {
                let v = match value {
                    Value::Boolean(b) => i64::from(*b),
                    other => other.to_i64().ok_or_else(|| {
                        ExecutionError::TypeMismatch(format!("sum of {}", other.data_type()))
                    })?,
                };
                *sum = Some(
                    sum.unwrap_or(0)
                        .checked_add(v)
                        .ok_or_else(|| ExecutionError::Overflow("integer sum".to_string()))?,
                );
            }
            AccumulatorState::SumFloat(sum) => {
                if let Some(v) = value.to_f64() {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            AccumulatorState::Mean { sum, count } => {
                let v = match value {
                    Value::Boolean(b) => f64::from(u8::from(*b)),
                    other => other.to_f64().ok_or_else(|| {
                        ExecutionError::TypeMismatch(format!("mean of {}", other.data_type()))
                    })?,
                };
                *sum += v;
                *count += 1;
            }
            AccumulatorState::Min(min) => {
                if min.as_ref().map_or(true, |m| value < m) {
                    *min = Some(value.clone());
                }
            }
            AccumulatorState::Max(max) => {
                if max.as_ref().map_or(true, |m| value > m) {
                    *max = Some(value.clone());
                }
            }
            AccumulatorState::First(first) => {
                if first.is_none() {
                    *first = Some(value.clone());
                }
            }
            AccumulatorState::Last(last) => *last = Some(value.clone()),
            AccumulatorState::Unique(values) => {
                values.insert(value.clone());
            }
            AccumulatorState::Values(values) => values.push(value.clone()),
        }
        Ok(())
    }

    /// Returns the final result. Empty input gives 0 for counts and null
    /// for everything else.
    pub fn result(&self) -> Value {
        match &self.state {
            AccumulatorState::Count(count) => Value::Int64(*count),
            AccumulatorState::SumInt(sum) => sum.map(Value::Int64).unwrap_or(Value::Null),
            AccumulatorState::SumFloat(sum) => sum.map(Value::Float64).unwrap_or(Value::Null),
            AccumulatorState::Mean { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Float64(*sum / *count as f64)
                }
            }
            AccumulatorState::Min(v)
            | AccumulatorState::Max(v)
            | AccumulatorState::First(v)
            | AccumulatorState::Last(v) => v.clone().unwrap_or(Value::Null),
            AccumulatorState::Unique(values) => Value::Int64(values.len() as i64),
            AccumulatorState::Values(values) if self.func == AggregateFunc::List => {
                if values.is_empty() {
                    Value::Null
                } else {
                    Value::List(values.clone())
                }
            }
            AccumulatorState::Values(values) => median(values),
        }
    }

    /// Resets the accumulator.
    pub fn reset(&mut self) {
        if let Some(seen) = &mut self.seen {
            seen.clear();
        }
        match &mut self.state {
            AccumulatorState::Count(count) => *count = 0,
            AccumulatorState::SumInt(sum) => *sum = None,
            AccumulatorState::SumFloat(sum) => *sum = None,
            AccumulatorState::Mean { sum, count } => {
                *sum = 0.0;
                *count = 0;
            }
            AccumulatorState::Min(v)
            | AccumulatorState::Max(v)
            | AccumulatorState::First(v)
            | AccumulatorState::Last(v) => *v = None,
            AccumulatorState::Unique(values) => values.clear(),
            AccumulatorState::Values(values) => values.clear(),
        }
    }
}

fn median(values: &[Value]) -> Value {
    let mut numbers: Vec<f64> = values.iter().filter_map(|v| v.to_f64()).collect();
    if numbers.is_empty() {
        return Value::Null;
    }
    numbers.sort_by(|a, b| a.total_cmp(b));
    let mid = numbers.len() / 2;
    if numbers.len() % 2 == 0 {
        Value::Float64((numbers[mid - 1] + numbers[mid]) / 2.0)
    } else {
        Value::Float64(numbers[mid])
    }
}
