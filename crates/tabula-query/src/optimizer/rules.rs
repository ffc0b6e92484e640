//! Optimization rules for the query optimizer.
//!
//! This module contains the individual optimization rules that transform
//! logical plans into more efficient forms. Every rule keeps the output
//! schema and the row order of the plan it rewrites.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::executor::{evaluate_expr, Row};
use crate::logical::{
    conjoin, rewrite_plan, split_conjunction, BinaryOp, Column, FilterOperator, LimitOperator, LogicalExpr,
    LogicalOperator, LogicalPlan, PlanRewriter, ProjectionOperator, Schema, SelectOperator,
    SortExpr, UnaryOp, UnionMode,
};
use crate::parser::{DataType, Literal};
use crate::physical::create_physical_expr;

use super::{OptimizerError, OptimizerResult, OptimizerRule};

/// Adapts a closure to [`PlanRewriter`].
struct FnRewriter<F>(F);

impl<F> PlanRewriter for FnRewriter<F>
where
    F: FnMut(&Arc<LogicalOperator>) -> OptimizerResult<Option<LogicalOperator>>,
{
    type Error = OptimizerError;

    fn rewrite(
        &mut self,
        op: &Arc<LogicalOperator>,
    ) -> Result<Option<LogicalOperator>, OptimizerError> {
        (self.0)(op)
    }
}

/// Rewrites the plan bottom-up; `None` when no node changed.
fn rewrite_bottom_up<F>(plan: &LogicalPlan, f: F) -> OptimizerResult<Option<LogicalPlan>>
where
    F: FnMut(&Arc<LogicalOperator>) -> OptimizerResult<Option<LogicalOperator>>,
{
    let root = rewrite_plan(&plan.root, &mut FnRewriter(f))?;
    if Arc::ptr_eq(&root, &plan.root) {
        Ok(None)
    } else {
        Ok(Some(LogicalPlan::from_arc(root)))
    }
}

/// Places `predicates` as a filter over `input`, or returns `input` when
/// there are none.
fn with_filter(input: Arc<LogicalOperator>, predicates: Vec<LogicalExpr>) -> Arc<LogicalOperator> {
    match conjoin(predicates) {
        Some(predicate) => Arc::new(LogicalOperator::Filter(FilterOperator { input, predicate })),
        None => input,
    }
}

fn is_bool_literal(expr: &LogicalExpr, value: bool) -> bool {
    matches!(expr, LogicalExpr::Literal(Literal::Boolean(b)) if *b == value)
}

// ============================================================================
// Constant Folding Rule
// ============================================================================

/// Evaluates constant expressions at planning time.
///
/// Literal-only subexpressions are replaced by their value, and the boolean
/// identities `x AND true` and `x OR false` reduce to `x`. Expressions whose
/// evaluation fails, or whose value has no literal form, are left for the
/// executor so that errors surface at the same place as without folding.
///
/// # Example
///
/// Before: `Filter(year = 2019 + 1)`
/// After: `Filter(year = 2020)`
#[derive(Debug)]
pub struct ConstantFoldingRule;

impl OptimizerRule for ConstantFoldingRule {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn optimize(&self, plan: &LogicalPlan) -> OptimizerResult<Option<LogicalPlan>> {
        rewrite_bottom_up(plan, |op| Ok(self.fold_operator(op)))
    }
}

impl ConstantFoldingRule {
    fn fold_operator(&self, op: &LogicalOperator) -> Option<LogicalOperator> {
        let mut changed = false;
        let new_op = match op {
            LogicalOperator::Projection(proj) => LogicalOperator::Projection(ProjectionOperator {
                exprs: proj
                    .exprs
                    .iter()
                    .map(|e| self.fold_expr(e, &mut changed))
                    .collect(),
                ..proj.clone()
            }),
            LogicalOperator::Filter(filter) => LogicalOperator::Filter(FilterOperator {
                input: filter.input.clone(),
                predicate: self.fold_expr(&filter.predicate, &mut changed),
            }),
            LogicalOperator::Scan(scan) => {
                let mut scan = scan.clone();
                scan.filters = scan
                    .filters
                    .iter()
                    .map(|f| self.fold_expr(f, &mut changed))
                    .collect();
                LogicalOperator::Scan(scan)
            }
            LogicalOperator::Join(join) => {
                let mut join = join.clone();
                join.filter = join.filter.map(|f| self.fold_expr(&f, &mut changed));
                LogicalOperator::Join(join)
            }
            LogicalOperator::Sort(sort) => {
                let mut sort = sort.clone();
                sort.order_by = sort
                    .order_by
                    .iter()
                    .map(|s| SortExpr {
                        expr: self.fold_expr(&s.expr, &mut changed),
                        ..s.clone()
                    })
                    .collect();
                LogicalOperator::Sort(sort)
            }
            _ => return None,
        };
        changed.then_some(new_op)
    }

    /// Folds an expression, setting `changed` when anything was replaced.
    pub fn fold_expr(&self, expr: &LogicalExpr, changed: &mut bool) -> LogicalExpr {
        expr.transform(&mut |e| self.fold_node(e, changed))
    }

    fn fold_node(&self, expr: &LogicalExpr, changed: &mut bool) -> Option<LogicalExpr> {
        match expr {
            // Aliases keep their name; the aliased expression is folded.
            LogicalExpr::Literal(_) | LogicalExpr::Alias { .. } => None,
            LogicalExpr::BinaryOp { left, op, right } if op.is_logical() => {
                let left = self.fold_expr(left, changed);
                let right = self.fold_expr(right, changed);
                let identity = *op == BinaryOp::And;
                if is_bool_literal(&left, identity) {
                    *changed = true;
                    return Some(right);
                }
                if is_bool_literal(&right, identity) {
                    *changed = true;
                    return Some(left);
                }
                let rebuilt = LogicalExpr::BinaryOp {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                };
                if rebuilt.is_constant() {
                    if let Some(folded) = evaluate_constant(&rebuilt) {
                        *changed = true;
                        return Some(folded);
                    }
                }
                Some(rebuilt)
            }
            _ if expr.is_constant() => {
                let folded = evaluate_constant(expr)?;
                *changed = true;
                Some(folded)
            }
            _ => None,
        }
    }
}

/// Evaluates a literal-only expression. A null result is only folded when
/// the expression is untyped null, so typed nulls keep their type.
fn evaluate_constant(expr: &LogicalExpr) -> Option<LogicalExpr> {
    let empty = Schema::empty();
    let physical = create_physical_expr(expr, &empty).ok()?;
    let value = evaluate_expr(&physical, &Row::new(Vec::new())).ok()?;
    if value.is_null() && expr.data_type(&empty).ok()? != DataType::Null {
        return None;
    }
    value.to_literal().map(LogicalExpr::Literal)
}

// ============================================================================
// Filter Simplification Rule
// ============================================================================

/// Simplifies filter predicates.
///
/// - `Filter(true)` is removed
/// - adjacent filters merge into one, the lower predicate first
/// - duplicate conjuncts and `true` conjuncts are dropped
/// - `NOT` over a comparison becomes the negated comparison, and double
///   negation cancels
#[derive(Debug)]
pub struct FilterSimplificationRule;

impl OptimizerRule for FilterSimplificationRule {
    fn name(&self) -> &str {
        "FilterSimplification"
    }

    fn optimize(&self, plan: &LogicalPlan) -> OptimizerResult<Option<LogicalPlan>> {
        rewrite_bottom_up(plan, |op| Ok(self.simplify(op)))
    }
}

impl FilterSimplificationRule {
    fn simplify(&self, op: &LogicalOperator) -> Option<LogicalOperator> {
        let LogicalOperator::Filter(filter) = op else {
            return None;
        };

        let (input, mut conjuncts) = match filter.input.as_ref() {
            LogicalOperator::Filter(inner) => {
                let mut conjuncts = split_conjunction(&inner.predicate);
                conjuncts.extend(split_conjunction(&filter.predicate));
                (inner.input.clone(), conjuncts)
            }
            _ => (filter.input.clone(), split_conjunction(&filter.predicate)),
        };
        let merged = !Arc::ptr_eq(&input, &filter.input);

        let before = conjuncts.len();
        let mut simplified_any = false;
        let mut seen: Vec<LogicalExpr> = Vec::with_capacity(conjuncts.len());
        for conjunct in conjuncts.drain(..) {
            let simplified = simplify_negation(&conjunct);
            simplified_any |= simplified != conjunct;
            if is_bool_literal(&simplified, true) || seen.contains(&simplified) {
                continue;
            }
            seen.push(simplified);
        }

        if !merged && !simplified_any && seen.len() == before {
            return None;
        }

        match conjoin(seen) {
            Some(predicate) => Some(LogicalOperator::Filter(FilterOperator { input, predicate })),
            None => Some(input.as_ref().clone()),
        }
    }
}

/// Pushes `NOT` into comparisons and cancels double negation. Both are
/// exact under three-valued logic.
fn simplify_negation(expr: &LogicalExpr) -> LogicalExpr {
    let LogicalExpr::UnaryOp {
        op: UnaryOp::Not,
        expr: inner,
    } = expr
    else {
        return expr.clone();
    };
    match inner.as_ref() {
        LogicalExpr::UnaryOp {
            op: UnaryOp::Not,
            expr: operand,
        } => simplify_negation(operand),
        LogicalExpr::BinaryOp { left, op, right } => match op.negate() {
            Some(negated) => LogicalExpr::BinaryOp {
                left: left.clone(),
                op: negated,
                right: right.clone(),
            },
            None => expr.clone(),
        },
        LogicalExpr::IsNull(operand) => LogicalExpr::IsNotNull(operand.clone()),
        LogicalExpr::IsNotNull(operand) => LogicalExpr::IsNull(operand.clone()),
        _ => expr.clone(),
    }
}

// ============================================================================
// Predicate Pushdown Rule
// ============================================================================

/// Pushes filter predicates closer to data sources.
///
/// Each conjunct of a filter moves independently. A conjunct passes:
/// - Select, Projection and SubqueryAlias when every column it uses is a
///   plain pass-through column
/// - Sort (without fetch) and Distinct unchanged
/// - Aggregate when it only uses group keys
/// - Join into the side(s) whose rows the join does not null-extend
/// - Union into every branch, when the columns keep their type there
///
/// and finally lands in the scan's filter list. Limit, Window, Rolling,
/// Pivot and Melt are barriers.
///
/// # Example
///
/// Before:
/// ```text
/// Filter(year = 2020)
///   Join
///     Scan(sales)
///     Scan(towns)
/// ```
///
/// After:
/// ```text
/// Join
///   Scan(sales) (filters: 1)
///   Scan(towns)
/// ```
#[derive(Debug)]
pub struct PredicatePushdownRule;

impl OptimizerRule for PredicatePushdownRule {
    fn name(&self) -> &str {
        "PredicatePushdown"
    }

    fn optimize(&self, plan: &LogicalPlan) -> OptimizerResult<Option<LogicalPlan>> {
        rewrite_bottom_up(plan, |op| {
            let LogicalOperator::Filter(filter) = op.as_ref() else {
                return Ok(None);
            };
            let (input, remaining) =
                self.push_into(&filter.input, split_conjunction(&filter.predicate));
            if Arc::ptr_eq(&input, &filter.input) {
                return Ok(None);
            }
            Ok(Some(with_filter(input, remaining).as_ref().clone()))
        })
    }
}

impl PredicatePushdownRule {
    /// Pushes `predicates` into `input` as far as possible. Returns the new
    /// input and the predicates that must stay above it; the input `Arc` is
    /// returned unchanged when nothing moved.
    fn push_into(
        &self,
        input: &Arc<LogicalOperator>,
        predicates: Vec<LogicalExpr>,
    ) -> (Arc<LogicalOperator>, Vec<LogicalExpr>) {
        if predicates.is_empty() {
            return (input.clone(), predicates);
        }

        match input.as_ref() {
            LogicalOperator::Scan(scan) => {
                let mut scan = scan.clone();
                scan.filters.extend(predicates);
                (Arc::new(LogicalOperator::Scan(scan)), Vec::new())
            }

            LogicalOperator::Filter(inner) => {
                let mut merged = split_conjunction(&inner.predicate);
                merged.extend(predicates);
                let (child, remaining) = self.push_into(&inner.input, merged);
                (with_filter(child, remaining), Vec::new())
            }

            LogicalOperator::Projection(proj) => {
                self.push_through_single(input, &proj.input, predicates, |pred| {
                    rewrite_columns(pred, &proj.schema, |i| {
                        match proj.exprs.get(i).cloned().map(LogicalExpr::unalias) {
                            Some(col @ LogicalExpr::Column(_)) => Some(col),
                            _ => None,
                        }
                    })
                })
            }

            LogicalOperator::Select(select) => {
                self.push_through_single(input, &select.input, predicates, |pred| {
                    rewrite_columns(pred, &select.schema, |i| {
                        select.columns.get(i).cloned().map(LogicalExpr::Column)
                    })
                })
            }

            LogicalOperator::SubqueryAlias(alias) => {
                let input_schema = alias.input.schema();
                self.push_through_single(input, &alias.input, predicates, |pred| {
                    rewrite_columns(pred, &alias.schema, |i| {
                        input_schema
                            .field(i)
                            .map(|f| LogicalExpr::Column(f.column.clone()))
                    })
                })
            }

            LogicalOperator::Sort(sort) if sort.fetch.is_none() => {
                self.push_through_single(input, &sort.input, predicates, |pred| Some(pred.clone()))
            }

            LogicalOperator::Distinct(distinct) => {
                self.push_through_single(input, &distinct.input, predicates, |pred| {
                    Some(pred.clone())
                })
            }

            LogicalOperator::Aggregate(agg) => {
                self.push_through_single(input, &agg.input, predicates, |pred| {
                    // A predicate without columns would turn an empty global
                    // group into no group at all.
                    if pred.columns().is_empty() {
                        return None;
                    }
                    rewrite_columns(pred, &agg.schema, |i| {
                        agg.group_by.get(i).cloned().map(LogicalExpr::unalias)
                    })
                })
            }

            LogicalOperator::Join(join) => self.push_through_join(input, join, predicates),

            LogicalOperator::Union(union) => {
                let mut per_branch: Vec<Vec<LogicalExpr>> = vec![Vec::new(); union.inputs.len()];
                let mut remaining = Vec::new();
                for pred in predicates {
                    let rewritten: Option<Vec<LogicalExpr>> = union
                        .inputs
                        .iter()
                        .map(|branch| {
                            let branch_schema = branch.schema();
                            rewrite_columns(&pred, &union.schema, |i| {
                                let field = union.schema.field(i)?;
                                let index = match union.mode {
                                    UnionMode::Vertical => i,
                                    UnionMode::Diagonal | UnionMode::DiagonalRelaxed => {
                                        branch_schema.index_of(field.name())?
                                    }
                                };
                                let branch_field = branch_schema.field(index)?;
                                (branch_field.data_type == field.data_type)
                                    .then(|| LogicalExpr::Column(branch_field.column.clone()))
                            })
                        })
                        .collect();
                    match rewritten {
                        Some(preds) => {
                            for (slot, p) in per_branch.iter_mut().zip(preds) {
                                slot.push(p);
                            }
                        }
                        None => remaining.push(pred),
                    }
                }
                if per_branch.iter().all(Vec::is_empty) {
                    return (input.clone(), remaining);
                }
                let inputs = union
                    .inputs
                    .iter()
                    .zip(per_branch)
                    .map(|(branch, preds)| self.place(branch, preds))
                    .collect();
                (Arc::new(input.with_new_inputs(inputs)), remaining)
            }

            // Barriers: Values, Limit, Window, Rolling, Pivot, Melt and a
            // sort with fetch.
            _ => (input.clone(), predicates),
        }
    }

    /// Pushes the predicates that `rewrite` maps onto `child` and rebuilds
    /// the single-input operator `op` on top.
    fn push_through_single<F>(
        &self,
        op: &Arc<LogicalOperator>,
        child: &Arc<LogicalOperator>,
        predicates: Vec<LogicalExpr>,
        mut rewrite: F,
    ) -> (Arc<LogicalOperator>, Vec<LogicalExpr>)
    where
        F: FnMut(&LogicalExpr) -> Option<LogicalExpr>,
    {
        let mut pushed = Vec::new();
        let mut remaining = Vec::new();
        for pred in predicates {
            match rewrite(&pred) {
                Some(rewritten) => pushed.push(rewritten),
                None => remaining.push(pred),
            }
        }
        if pushed.is_empty() {
            return (op.clone(), remaining);
        }
        let new_child = self.place(child, pushed);
        (Arc::new(op.with_new_inputs(vec![new_child])), remaining)
    }

    fn push_through_join(
        &self,
        op: &Arc<LogicalOperator>,
        join: &crate::logical::JoinOperator,
        predicates: Vec<LogicalExpr>,
    ) -> (Arc<LogicalOperator>, Vec<LogicalExpr>) {
        let left_schema = join.left.schema();
        let right_schema = join.right.schema();
        let left_len = left_schema.len();

        let mut left_preds = Vec::new();
        let mut right_preds = Vec::new();
        let mut remaining = Vec::new();

        for pred in predicates {
            let to_left = if join.join_type.pushes_left() {
                rewrite_columns(&pred, &join.schema, |i| {
                    (i < left_len)
                        .then(|| left_schema.field(i))
                        .flatten()
                        .map(|f| LogicalExpr::Column(f.column.clone()))
                })
            } else {
                None
            };
            if let Some(p) = to_left {
                left_preds.push(p);
                continue;
            }

            let to_right = if join.join_type.pushes_right() && !join.join_type.is_filtering() {
                rewrite_columns(&pred, &join.schema, |i| {
                    i.checked_sub(left_len)
                        .and_then(|j| right_schema.field(j))
                        .map(|f| LogicalExpr::Column(f.column.clone()))
                })
            } else {
                None
            };
            match to_right {
                Some(p) => right_preds.push(p),
                None => remaining.push(pred),
            }
        }

        if left_preds.is_empty() && right_preds.is_empty() {
            return (op.clone(), remaining);
        }
        let left = self.place(&join.left, left_preds);
        let right = self.place(&join.right, right_preds);
        (Arc::new(op.with_new_inputs(vec![left, right])), remaining)
    }

    /// Pushes `predicates` into `child` and keeps what cannot move as a
    /// filter directly above it.
    fn place(&self, child: &Arc<LogicalOperator>, predicates: Vec<LogicalExpr>) -> Arc<LogicalOperator> {
        let (new_child, remaining) = self.push_into(child, predicates);
        with_filter(new_child, remaining)
    }
}

/// Rewrites every column of `pred`, resolved against `schema`, with the
/// expression `map` returns for its index. `None` if any column cannot be
/// mapped.
fn rewrite_columns<F>(pred: &LogicalExpr, schema: &Schema, mut map: F) -> Option<LogicalExpr>
where
    F: FnMut(usize) -> Option<LogicalExpr>,
{
    let mut complete = true;
    let rewritten = pred.replace_columns(|c| {
        let replacement = schema.resolve_column(c).ok().and_then(&mut map);
        if replacement.is_none() {
            complete = false;
        }
        replacement
    });
    complete.then_some(rewritten)
}

// ============================================================================
// Projection Pruning Rule
// ============================================================================

/// Eliminates unused columns early in the plan.
///
/// The set of output columns each node's parent needs is propagated
/// downward. Projections drop expressions nobody reads, and scans read only
/// the columns used above them (at least one, so row counts survive).
/// Distinct and Union need all of their input columns.
#[derive(Debug)]
pub struct ProjectionPruningRule;

impl OptimizerRule for ProjectionPruningRule {
    fn name(&self) -> &str {
        "ProjectionPruning"
    }

    fn optimize(&self, plan: &LogicalPlan) -> OptimizerResult<Option<LogicalPlan>> {
        let all = (0..plan.schema().len()).collect();
        let (root, kept) = self.prune(&plan.root, &all);
        if kept.len() != all.len() {
            return Err(OptimizerError::RuleFailed {
                rule: self.name().to_string(),
                message: "root columns were pruned".to_string(),
            });
        }
        if Arc::ptr_eq(&root, &plan.root) {
            Ok(None)
        } else {
            Ok(Some(LogicalPlan::from_arc(root)))
        }
    }
}

impl ProjectionPruningRule {
    /// Prunes `op` given the indices of its output columns that are needed.
    /// Returns the new operator and the original output indices it still
    /// produces, in order.
    fn prune(
        &self,
        op: &Arc<LogicalOperator>,
        required: &BTreeSet<usize>,
    ) -> (Arc<LogicalOperator>, Vec<usize>) {
        let width = op.schema().len();
        let all: Vec<usize> = (0..width).collect();
        let unchanged = || (op.clone(), (0..width).collect::<Vec<_>>());

        match op.as_ref() {
            LogicalOperator::Scan(scan) => {
                let mut need = required.clone();
                for filter in &scan.filters {
                    need.extend(column_indices(&filter.columns(), &scan.projected_schema));
                }
                let kept = non_empty(need, width);
                if kept.len() == width {
                    return unchanged();
                }
                let read = scan.read_indices();
                let projection = kept.iter().map(|&i| read[i]).collect();
                let scan = scan.clone().with_projection(projection);
                (Arc::new(LogicalOperator::Scan(scan)), kept)
            }

            LogicalOperator::Values(_) => unchanged(),

            LogicalOperator::Filter(filter) => {
                let mut need = required.clone();
                need.extend(column_indices(&filter.predicate.columns(), &filter.input.schema()));
                self.prune_pass_through(op, &filter.input, &need)
            }

            LogicalOperator::Sort(sort) => {
                let mut need = required.clone();
                let input_schema = sort.input.schema();
                for s in &sort.order_by {
                    need.extend(column_indices(&s.expr.columns(), &input_schema));
                }
                self.prune_pass_through(op, &sort.input, &need)
            }

            LogicalOperator::Limit(limit) => self.prune_pass_through(op, &limit.input, required),

            LogicalOperator::SubqueryAlias(alias) => {
                let (child, kept) = self.prune(&alias.input, required);
                if Arc::ptr_eq(&child, &alias.input) {
                    return unchanged();
                }
                let mut alias = alias.clone();
                alias.input = child;
                alias.schema = Arc::new(alias.schema.project(&kept));
                (Arc::new(LogicalOperator::SubqueryAlias(alias)), kept)
            }

            LogicalOperator::Distinct(distinct) => {
                let need = (0..width).collect();
                self.prune_pass_through(op, &distinct.input, &need)
            }

            LogicalOperator::Projection(proj) => {
                let kept = non_empty(required.clone(), width);
                let exprs: Vec<LogicalExpr> = kept.iter().map(|&i| proj.exprs[i].clone()).collect();
                let input_schema = proj.input.schema();
                let mut need = BTreeSet::new();
                for e in &exprs {
                    need.extend(column_indices(&e.columns(), &input_schema));
                }
                let (child, _) = self.prune(&proj.input, &need);
                if kept.len() == width && Arc::ptr_eq(&child, &proj.input) {
                    return unchanged();
                }
                let proj = ProjectionOperator {
                    input: child,
                    exprs,
                    schema: Arc::new(proj.schema.project(&kept)),
                };
                (Arc::new(LogicalOperator::Projection(proj)), kept)
            }

            LogicalOperator::Select(select) => {
                let kept = non_empty(required.clone(), width);
                let columns: Vec<Column> = kept.iter().map(|&i| select.columns[i].clone()).collect();
                let need = column_indices(&columns.iter().cloned().collect(), &select.input.schema());
                let (child, _) = self.prune(&select.input, &need);
                if kept.len() == width && Arc::ptr_eq(&child, &select.input) {
                    return unchanged();
                }
                let select = SelectOperator {
                    input: child,
                    columns,
                    schema: Arc::new(select.schema.project(&kept)),
                };
                (Arc::new(LogicalOperator::Select(select)), kept)
            }

            LogicalOperator::Aggregate(agg) => {
                let input_schema = agg.input.schema();
                let mut need = BTreeSet::new();
                for e in agg.group_by.iter().chain(&agg.aggregates) {
                    need.extend(column_indices(&e.columns(), &input_schema));
                }
                self.prune_fixed_output(op, &agg.input, &need, all)
            }

            LogicalOperator::Pivot(pivot) => {
                let input_schema = pivot.input.schema();
                let columns: BTreeSet<Column> = pivot
                    .index
                    .iter()
                    .chain([&pivot.on, &pivot.values])
                    .cloned()
                    .collect();
                let need = column_indices(&columns, &input_schema);
                self.prune_fixed_output(op, &pivot.input, &need, all)
            }

            LogicalOperator::Melt(melt) => {
                let columns: BTreeSet<Column> =
                    melt.id_vars.iter().chain(&melt.value_vars).cloned().collect();
                let need = column_indices(&columns, &melt.input.schema());
                self.prune_fixed_output(op, &melt.input, &need, all)
            }

            LogicalOperator::Window(window) => {
                let input_schema = window.input.schema();
                let mut need: BTreeSet<usize> =
                    required.iter().copied().filter(|&i| i < input_schema.len()).collect();
                for e in &window.window_exprs {
                    need.extend(column_indices(&e.columns(), &input_schema));
                }
                let (child, mut kept) = self.prune(&window.input, &need);
                if Arc::ptr_eq(&child, &window.input) {
                    return unchanged();
                }
                kept.extend(input_schema.len()..width);
                let mut window = window.clone();
                window.input = child;
                window.schema = Arc::new(window.schema.project(&kept));
                (Arc::new(LogicalOperator::Window(window)), kept)
            }

            LogicalOperator::Rolling(rolling) => {
                let input_schema = rolling.input.schema();
                let mut need: BTreeSet<usize> =
                    required.iter().copied().filter(|&i| i < input_schema.len()).collect();
                let mut columns: BTreeSet<Column> = rolling.group_by.iter().cloned().collect();
                columns.insert(rolling.index_column.clone());
                for e in &rolling.aggregates {
                    columns.extend(e.columns());
                }
                need.extend(column_indices(&columns, &input_schema));
                let (child, mut kept) = self.prune(&rolling.input, &need);
                if Arc::ptr_eq(&child, &rolling.input) {
                    return unchanged();
                }
                kept.extend(input_schema.len()..width);
                let mut rolling = rolling.clone();
                rolling.input = child;
                rolling.schema = Arc::new(rolling.schema.project(&kept));
                (Arc::new(LogicalOperator::Rolling(rolling)), kept)
            }

            LogicalOperator::Join(join) => {
                let left_schema = join.left.schema();
                let right_schema = join.right.schema();
                let left_len = left_schema.len();

                let mut left_need = BTreeSet::new();
                let mut right_need = BTreeSet::new();
                let mut split = |i: usize| {
                    if i < left_len {
                        left_need.insert(i);
                    } else {
                        right_need.insert(i - left_len);
                    }
                };
                for &i in required {
                    split(i);
                }
                if let Some(filter) = &join.filter {
                    for i in column_indices(&filter.columns(), &join.combined_schema()) {
                        split(i);
                    }
                }
                for (l, r) in &join.on {
                    left_need.extend(column_indices(&l.columns(), &left_schema));
                    right_need.extend(column_indices(&r.columns(), &right_schema));
                }

                let (left, left_kept) = self.prune(&join.left, &left_need);
                let (right, right_kept) = self.prune(&join.right, &right_need);
                if Arc::ptr_eq(&left, &join.left) && Arc::ptr_eq(&right, &join.right) {
                    return unchanged();
                }

                let mut kept = left_kept;
                if !join.join_type.is_filtering() {
                    kept.extend(right_kept.iter().map(|i| i + left_len));
                }
                let mut join = join.clone();
                join.left = left;
                join.right = right;
                join.schema = Arc::new(join.schema.project(&kept));
                (Arc::new(LogicalOperator::Join(join)), kept)
            }

            LogicalOperator::Union(union) => {
                let mut changed = false;
                let inputs = union
                    .inputs
                    .iter()
                    .map(|branch| {
                        let need = (0..branch.schema().len()).collect();
                        let (new_branch, _) = self.prune(branch, &need);
                        changed |= !Arc::ptr_eq(&new_branch, branch);
                        new_branch
                    })
                    .collect();
                if !changed {
                    return unchanged();
                }
                (Arc::new(op.with_new_inputs(inputs)), all)
            }
        }
    }

    /// Prunes below an operator whose output is its input (Filter, Sort,
    /// Limit, Distinct).
    fn prune_pass_through(
        &self,
        op: &Arc<LogicalOperator>,
        child: &Arc<LogicalOperator>,
        need: &BTreeSet<usize>,
    ) -> (Arc<LogicalOperator>, Vec<usize>) {
        let (new_child, kept) = self.prune(child, need);
        if Arc::ptr_eq(&new_child, child) {
            return (op.clone(), kept);
        }
        (Arc::new(op.with_new_inputs(vec![new_child])), kept)
    }

    /// Prunes below an operator whose output schema does not depend on
    /// which input columns exist (Aggregate, Pivot, Melt).
    fn prune_fixed_output(
        &self,
        op: &Arc<LogicalOperator>,
        child: &Arc<LogicalOperator>,
        need: &BTreeSet<usize>,
        all: Vec<usize>,
    ) -> (Arc<LogicalOperator>, Vec<usize>) {
        let (new_child, _) = self.prune(child, need);
        if Arc::ptr_eq(&new_child, child) {
            return (op.clone(), all);
        }
        (Arc::new(op.with_new_inputs(vec![new_child])), all)
    }
}

/// Resolves columns to indices of `schema`. A column that does not resolve
/// cleanly keeps every field of that name.
fn column_indices(columns: &BTreeSet<Column>, schema: &Schema) -> BTreeSet<usize> {
    let mut indices = BTreeSet::new();
    for column in columns {
        match schema.resolve_column(column) {
            Ok(i) => {
                indices.insert(i);
            }
            Err(_) => indices.extend(
                schema
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.name() == column.name)
                    .map(|(i, _)| i),
            ),
        }
    }
    indices
}

/// Keeps the first column when nothing is required.
fn non_empty(mut indices: BTreeSet<usize>, width: usize) -> Vec<usize> {
    if indices.is_empty() && width > 0 {
        indices.insert(0);
    }
    indices.into_iter().filter(|&i| i < width).collect()
}

// ============================================================================
// Limit Pushdown Rule
// ============================================================================

/// Pushes LIMIT through compatible operators.
///
/// A limit moves below Select, Projection and SubqueryAlias, is copied into
/// every Union branch, merges with a limit directly below it, and reaches
/// the scan as a read limit of `offset + fetch` rows. It never passes
/// Filter, Sort, Aggregate, Join, Window, Rolling, Pivot, Melt or Distinct.
#[derive(Debug)]
pub struct LimitPushdownRule;

impl OptimizerRule for LimitPushdownRule {
    fn name(&self) -> &str {
        "LimitPushdown"
    }

    fn optimize(&self, plan: &LogicalPlan) -> OptimizerResult<Option<LogicalPlan>> {
        rewrite_bottom_up(plan, |op| match op.as_ref() {
            LogicalOperator::Limit(limit) => Ok(self.push_limit(limit)),
            _ => Ok(None),
        })
    }
}

impl LimitPushdownRule {
    /// Returns a replacement for the limit node, or `None` if the limit
    /// cannot move.
    fn push_limit(&self, limit: &LimitOperator) -> Option<LogicalOperator> {
        let fetch = limit.fetch?;
        let bound = limit.offset.saturating_add(fetch);

        match limit.input.as_ref() {
            LogicalOperator::Projection(ProjectionOperator { input, .. })
            | LogicalOperator::Select(SelectOperator { input, .. }) => {
                Some(self.swap_below(limit, input))
            }
            LogicalOperator::SubqueryAlias(alias) => Some(self.swap_below(limit, &alias.input)),

            LogicalOperator::Limit(inner) => {
                let offset = inner.offset.saturating_add(limit.offset);
                let remaining = inner.fetch.map(|f| f.saturating_sub(limit.offset));
                let merged = LimitOperator {
                    input: inner.input.clone(),
                    offset,
                    fetch: Some(remaining.map_or(fetch, |r| r.min(fetch))),
                };
                Some(
                    self.push_limit(&merged)
                        .unwrap_or(LogicalOperator::Limit(merged)),
                )
            }

            LogicalOperator::Scan(scan) if scan.limit.map_or(true, |l| l > bound) => {
                let scan = scan.clone().with_limit(bound);
                Some(LogicalOperator::Limit(LimitOperator {
                    input: Arc::new(LogicalOperator::Scan(scan)),
                    ..limit.clone()
                }))
            }

            LogicalOperator::Union(union) => {
                let mut changed = false;
                let inputs = union
                    .inputs
                    .iter()
                    .map(|branch| {
                        if max_rows(branch).is_some_and(|m| m <= bound) {
                            return branch.clone();
                        }
                        changed = true;
                        let branch_limit = LimitOperator {
                            input: branch.clone(),
                            offset: 0,
                            fetch: Some(bound),
                        };
                        Arc::new(
                            self.push_limit(&branch_limit)
                                .unwrap_or(LogicalOperator::Limit(branch_limit)),
                        )
                    })
                    .collect();
                changed.then(|| {
                    LogicalOperator::Limit(LimitOperator {
                        input: Arc::new(limit.input.with_new_inputs(inputs)),
                        ..limit.clone()
                    })
                })
            }

            _ => None,
        }
    }

    /// Moves the limit below the single-input operator above `child`.
    fn swap_below(&self, limit: &LimitOperator, child: &Arc<LogicalOperator>) -> LogicalOperator {
        let inner = LimitOperator {
            input: child.clone(),
            ..limit.clone()
        };
        let inner = self
            .push_limit(&inner)
            .unwrap_or(LogicalOperator::Limit(inner));
        limit.input.with_new_inputs(vec![Arc::new(inner)])
    }
}

/// Upper bound on the rows an operator can produce, when known.
fn max_rows(op: &LogicalOperator) -> Option<usize> {
    match op {
        LogicalOperator::Scan(scan) => scan.limit,
        LogicalOperator::Values(values) => Some(values.rows.len()),
        LogicalOperator::Limit(limit) => {
            let below = max_rows(&limit.input).map(|m| m.saturating_sub(limit.offset));
            match (limit.fetch, below) {
                (Some(f), Some(b)) => Some(f.min(b)),
                (f, b) => f.or(b),
            }
        }
        LogicalOperator::Sort(sort) => match (sort.fetch, max_rows(&sort.input)) {
            (Some(f), Some(b)) => Some(f.min(b)),
            (f, b) => f.or(b),
        },
        LogicalOperator::Projection(ProjectionOperator { input, .. })
        | LogicalOperator::Select(SelectOperator { input, .. })
        | LogicalOperator::Filter(FilterOperator { input, .. }) => max_rows(input),
        LogicalOperator::SubqueryAlias(alias) => max_rows(&alias.input),
        LogicalOperator::Distinct(distinct) => max_rows(&distinct.input),
        _ => None,
    }
}
