//! SQL binder.
//!
//! Converts parsed SQL statements into logical plans, resolving table
//! names against an explicit [`Catalog`] and column names against the
//! schemas the [`LogicalPlanBuilder`] computes.
//!
//! Aggregate calls are evaluated by an Aggregate node and referenced by
//! their display string above it; window calls move into a Window node the
//! same way.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::executor::Row;
use crate::parser::{
    self, Expr as AstExpr, FromItem, FunctionCall, JoinType, Literal, NullsOrder,
    OrderByExpr as AstOrderBy, OrderDirection, QueryStatement, SelectStatement, SetExpr,
    SetOpType, Statement,
};

use super::builder::{LogicalPlanBuilder, PlanError, PlanResult};
use super::catalog::Catalog;
use super::expr::{AggregateFunc, BinaryOp, LogicalExpr, RankMethod, ScalarFunc, SortExpr, WindowFunc};
use super::operator::{JoinOptions, LogicalOperator, UnionMode};
use super::plan::LogicalPlan;
use super::schema::{Column, Schema};

/// Binds a statement against `catalog`. `EXPLAIN` binds its inner query.
pub fn bind_statement(stmt: &Statement, catalog: &dyn Catalog) -> PlanResult<LogicalPlan> {
    let mut binder = SqlBinder::new(catalog);
    let plan = binder.bind_query(stmt.query())?.build();
    debug!(nodes = plan.node_count(), "bound SQL statement");
    Ok(plan)
}

/// Where an ORDER BY key points.
enum OrderTarget {
    /// An output column, by position.
    Output(usize),
    /// An expression over the SELECT input.
    Expr(LogicalExpr),
}

/// Stateful binder; holds the CTE scopes of the query being bound.
pub struct SqlBinder<'a> {
    catalog: &'a dyn Catalog,
    ctes: Vec<HashMap<String, Arc<LogicalOperator>>>,
}

impl<'a> SqlBinder<'a> {
    /// Creates a binder over `catalog`.
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            ctes: Vec::new(),
        }
    }

    /// Binds a full query.
    pub fn bind_query(&mut self, query: &QueryStatement) -> PlanResult<LogicalPlanBuilder> {
        self.ctes.push(HashMap::new());
        let result = self.bind_query_in_scope(query);
        self.ctes.pop();
        result
    }

    fn bind_query_in_scope(&mut self, query: &QueryStatement) -> PlanResult<LogicalPlanBuilder> {
        for cte in &query.ctes {
            let mut builder = self.bind_query(&cte.query)?;
            if !cte.columns.is_empty() {
                builder = rename_columns(builder, &cte.columns)?;
            }
            if let Some(scope) = self.ctes.last_mut() {
                scope.insert(cte.name.clone(), builder.into_arc());
            }
        }

        let mut builder = match &query.body {
            SetExpr::Select(select) => self.bind_select(select, &query.order_by)?,
            other => {
                let builder = self.bind_set_expr(other)?;
                self.bind_output_order(builder, &query.order_by)?
            }
        };

        if query.limit.is_some() || query.offset.is_some() {
            let offset = query.offset.unwrap_or(0) as usize;
            builder = builder.limit(offset, query.limit.map(|l| l as usize))?;
        }
        Ok(builder)
    }

    fn bind_set_expr(&mut self, body: &SetExpr) -> PlanResult<LogicalPlanBuilder> {
        match body {
            SetExpr::Select(select) => self.bind_select(select, &[]),
            SetExpr::Query(query) => self.bind_query(query),
            SetExpr::SetOperation { op, left, right } => {
                let left = self.bind_set_expr(left)?;
                let mut right = self.bind_set_expr(right)?;

                // Set operations match columns by position; take the left
                // side's names.
                let left_names = left.schema().names();
                if right.schema().names() != left_names && right.schema().len() == left_names.len() {
                    right = rename_columns(right, &left_names)?;
                }

                let union = LogicalPlanBuilder::union(
                    vec![left.into_arc(), right.into_arc()],
                    UnionMode::Vertical,
                )?;
                match op {
                    SetOpType::UnionAll => Ok(union),
                    SetOpType::Union => union.distinct(),
                }
            }
        }
    }

    fn bind_output_order(
        &mut self,
        builder: LogicalPlanBuilder,
        order_by: &[AstOrderBy],
    ) -> PlanResult<LogicalPlanBuilder> {
        if order_by.is_empty() {
            return Ok(builder);
        }
        let schema = builder.schema();
        let mut keys = Vec::with_capacity(order_by.len());
        for item in order_by {
            let expr = match &item.expr {
                AstExpr::Literal(Literal::Integer(n)) => {
                    LogicalExpr::Column(output_column(&schema, *n)?)
                }
                other => self.bind_expr(other)?,
            };
            keys.push(sort_expr(expr, item));
        }
        builder.sort(keys)
    }

    fn bind_select(
        &mut self,
        select: &SelectStatement,
        order_by: &[AstOrderBy],
    ) -> PlanResult<LogicalPlanBuilder> {
        let mut builder = self.bind_from(&select.from)?;

        if let Some(predicate) = &select.where_clause {
            let predicate = self.bind_expr(predicate)?;
            if predicate.contains_aggregate() {
                return Err(PlanError::InvalidPlan(
                    "aggregate functions are not allowed in WHERE".into(),
                ));
            }
            builder = builder.filter(predicate)?;
        }
        let input_schema = builder.schema();

        let mut items = Vec::with_capacity(select.columns.len());
        for item in &select.columns {
            match &item.expr {
                AstExpr::Wildcard => items.extend(
                    input_schema
                        .fields()
                        .iter()
                        .map(|f| LogicalExpr::Column(f.column.clone())),
                ),
                AstExpr::QualifiedWildcard(table) => {
                    let before = items.len();
                    items.extend(
                        input_schema
                            .fields()
                            .iter()
                            .filter(|f| f.column.qualifier.as_deref() == Some(table.as_str()))
                            .map(|f| LogicalExpr::Column(f.column.clone())),
                    );
                    if items.len() == before {
                        return Err(PlanError::UnknownTable(table.clone()));
                    }
                }
                expr => {
                    let bound = self.bind_expr(expr)?;
                    items.push(name_item(bound, item.alias.as_deref()));
                }
            }
        }

        let mut group_by = Vec::with_capacity(select.group_by.len());
        for key in &select.group_by {
            group_by.push(self.bind_group_key(key, &items, &input_schema)?);
        }
        let having = select.having.as_ref().map(|h| self.bind_expr(h)).transpose()?;

        let mut order = Vec::with_capacity(order_by.len());
        for item in order_by {
            let target = match &item.expr {
                AstExpr::Literal(Literal::Integer(n)) => OrderTarget::Output(ordinal(*n, items.len())?),
                AstExpr::Column(c) if c.table.is_none() => {
                    match items.iter().position(|i| i.output_name() == c.column) {
                        Some(i) => OrderTarget::Output(i),
                        None => OrderTarget::Expr(self.bind_expr(&item.expr)?),
                    }
                }
                expr => OrderTarget::Expr(self.bind_expr(expr)?),
            };
            order.push((target, item));
        }

        let aggregating = !group_by.is_empty()
            || items.iter().any(|i| i.contains_aggregate())
            || having.as_ref().is_some_and(|h| h.contains_aggregate())
            || order.iter().any(|(t, _)| matches!(t, OrderTarget::Expr(e) if e.contains_aggregate()));

        if aggregating {
            let mut calls = Vec::new();
            for expr in items.iter().chain(having.iter()).chain(order.iter().filter_map(|(t, _)| match t {
                OrderTarget::Expr(e) => Some(e),
                OrderTarget::Output(_) => None,
            })) {
                collect_aggregate_calls(expr, &mut calls);
            }

            let keys: Vec<LogicalExpr> = group_by
                .iter()
                .map(|k| match k {
                    LogicalExpr::Column(_) => k.clone(),
                    other => other.clone().alias(other.to_string()),
                })
                .collect();
            let aggregates = calls.iter().map(|c| c.clone().alias(c.to_string())).collect();
            builder = builder.aggregate(keys, aggregates)?;
            let agg_schema = builder.schema();

            let rewrite = |expr: &LogicalExpr| -> PlanResult<LogicalExpr> {
                let rewritten = expr.transform(&mut |e| match e {
                    LogicalExpr::AggregateCall { .. } => Some(LogicalExpr::col(e.to_string())),
                    LogicalExpr::Column(_) => None,
                    other if group_by.contains(other) => Some(LogicalExpr::col(other.to_string())),
                    _ => None,
                });
                for column in rewritten.columns() {
                    if agg_schema.resolve_column(&column).is_err() {
                        return Err(PlanError::InvalidPlan(format!(
                            "column {} must appear in the GROUP BY clause or be used in an aggregate function",
                            column
                        )));
                    }
                }
                Ok(rewritten)
            };

            items = items.iter().map(&rewrite).collect::<PlanResult<_>>()?;
            if let Some(h) = &having {
                builder = builder.filter(rewrite(h)?)?;
            }
            for (target, _) in order.iter_mut() {
                if let OrderTarget::Expr(e) = target {
                    *e = rewrite(e)?;
                }
            }
        } else if having.is_some() {
            return Err(PlanError::InvalidPlan(
                "HAVING requires GROUP BY or an aggregate".into(),
            ));
        }

        // Sort keys that are not output columns ride along as hidden
        // columns and are dropped after the sort.
        let visible = items.len();
        let mut sort_targets = Vec::with_capacity(order.len());
        for (target, item) in order {
            let index = match target {
                OrderTarget::Output(i) => i,
                OrderTarget::Expr(e) => match items.iter().position(|i| i.clone().unalias() == e) {
                    Some(i) => i,
                    None => {
                        items.push(e.alias(format!("__sort_{}", items.len() - visible)));
                        items.len() - 1
                    }
                },
            };
            sort_targets.push((index, item));
        }
        if select.distinct && items.len() > visible {
            return Err(PlanError::InvalidPlan(
                "with SELECT DISTINCT, ORDER BY expressions must appear in the select list".into(),
            ));
        }

        builder = builder.select(items)?;
        if select.distinct {
            builder = builder.distinct()?;
        }
        if !sort_targets.is_empty() {
            let schema = builder.schema();
            let keys = sort_targets
                .into_iter()
                .map(|(i, item)| {
                    let column = schema.fields()[i].column.clone();
                    sort_expr(LogicalExpr::Column(column), item)
                })
                .collect();
            builder = builder.sort(keys)?;
        }
        if builder.schema().len() > visible {
            let columns = builder.schema().fields()[..visible]
                .iter()
                .map(|f| f.column.clone())
                .collect();
            builder = builder.select_columns(columns)?;
        }
        Ok(builder)
    }

    /// GROUP BY accepts input expressions, select-list aliases and 1-based
    /// select-list positions.
    fn bind_group_key(
        &mut self,
        key: &AstExpr,
        items: &[LogicalExpr],
        input_schema: &Schema,
    ) -> PlanResult<LogicalExpr> {
        match key {
            AstExpr::Literal(Literal::Integer(n)) => {
                Ok(items[ordinal(*n, items.len())?].clone().unalias())
            }
            AstExpr::Column(c) if c.table.is_none() && !input_schema.contains(&c.column) => items
                .iter()
                .find(|i| matches!(i, LogicalExpr::Alias { name, .. } if *name == c.column))
                .map(|i| i.clone().unalias())
                .ok_or_else(|| PlanError::UnknownColumn {
                    name: c.column.clone(),
                    available: input_schema.fields().iter().map(|f| f.qualified_name()).collect(),
                }),
            other => self.bind_expr(other),
        }
    }

    fn bind_from(&mut self, from: &[FromItem]) -> PlanResult<LogicalPlanBuilder> {
        let Some((first, rest)) = from.split_first() else {
            return LogicalPlanBuilder::values(Schema::empty(), vec![Row::new(vec![])]);
        };
        let mut builder = self.bind_from_item(first)?;
        for item in rest {
            let right = self.bind_from_item(item)?;
            builder = builder.join_on(
                right.into_arc(),
                JoinType::Cross,
                vec![],
                None,
                JoinOptions::default(),
            )?;
        }
        Ok(builder)
    }

    fn bind_from_item(&mut self, item: &FromItem) -> PlanResult<LogicalPlanBuilder> {
        match item {
            FromItem::Table(table) => {
                let plan = self
                    .ctes
                    .iter()
                    .rev()
                    .find_map(|scope| scope.get(&table.table).cloned())
                    .or_else(|| self.catalog.table(&table.table))
                    .ok_or_else(|| PlanError::UnknownTable(table.table.clone()))?;
                LogicalPlanBuilder::from_arc(plan).alias(table.effective_name())
            }
            FromItem::Subquery { query, alias } => self.bind_query(query)?.alias(alias.clone()),
            FromItem::Join {
                left,
                join_type,
                right,
                on,
                using,
            } => {
                let left = self.bind_from_item(left)?;
                let right = self.bind_from_item(right)?;
                let left_schema = left.schema();
                let right_schema = right.schema();

                let mut pairs = Vec::new();
                let mut residual = Vec::new();
                if let Some(on) = on {
                    let on = self.bind_expr(on)?;
                    for conjunct in super::expr::split_conjunction(&on) {
                        match equi_pair(&conjunct, &left_schema, &right_schema) {
                            Some(pair) => pairs.push(pair),
                            None => residual.push(conjunct),
                        }
                    }
                }
                for name in using {
                    pairs.push((LogicalExpr::col(name.clone()), LogicalExpr::col(name.clone())));
                }

                left.join_on(
                    right.into_arc(),
                    *join_type,
                    pairs,
                    super::expr::conjoin(residual),
                    JoinOptions::default(),
                )
            }
        }
    }

    /// Converts an AST expression into a logical expression. Column
    /// references stay unresolved; the builder resolves them.
    pub fn bind_expr(&mut self, expr: &AstExpr) -> PlanResult<LogicalExpr> {
        Ok(match expr {
            AstExpr::Column(c) => match &c.table {
                Some(t) => LogicalExpr::qualified_col(t.clone(), c.column.clone()),
                None => LogicalExpr::col(c.column.clone()),
            },
            AstExpr::Literal(l) => LogicalExpr::Literal(l.clone()),
            AstExpr::BinaryOp { left, op, right } => LogicalExpr::BinaryOp {
                left: Box::new(self.bind_expr(left)?),
                op: convert_binary_op(op),
                right: Box::new(self.bind_expr(right)?),
            },
            AstExpr::UnaryOp { op, expr } => {
                let inner = self.bind_expr(expr)?;
                match op {
                    parser::UnaryOperator::Not => inner.not(),
                    parser::UnaryOperator::Minus => inner.neg(),
                    parser::UnaryOperator::Plus => inner,
                }
            }
            AstExpr::Function(call) => self.bind_function(call)?,
            AstExpr::Case {
                operand,
                when_clauses,
                else_clause,
            } => LogicalExpr::Case {
                operand: operand
                    .as_ref()
                    .map(|o| self.bind_expr(o).map(Box::new))
                    .transpose()?,
                when_then: when_clauses
                    .iter()
                    .map(|(w, t)| Ok((self.bind_expr(w)?, self.bind_expr(t)?)))
                    .collect::<PlanResult<_>>()?,
                else_result: else_clause
                    .as_ref()
                    .map(|e| self.bind_expr(e).map(Box::new))
                    .transpose()?,
            },
            AstExpr::Cast { expr, data_type } => self.bind_expr(expr)?.cast(data_type.clone()),
            AstExpr::IsNull(e) => self.bind_expr(e)?.is_null(),
            AstExpr::IsNotNull(e) => self.bind_expr(e)?.is_not_null(),
            AstExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let e = self.bind_expr(expr)?;
                let between = e
                    .clone()
                    .gt_eq(self.bind_expr(low)?)
                    .and(e.lt_eq(self.bind_expr(high)?));
                if *negated {
                    between.not()
                } else {
                    between
                }
            }
            AstExpr::InList {
                expr,
                list,
                negated,
            } => LogicalExpr::InList {
                expr: Box::new(self.bind_expr(expr)?),
                list: list
                    .iter()
                    .map(|e| self.bind_expr(e))
                    .collect::<PlanResult<_>>()?,
                negated: *negated,
            },
            AstExpr::Wildcard => LogicalExpr::Wildcard,
            AstExpr::QualifiedWildcard(t) => {
                return Err(PlanError::Unsupported(format!(
                    "{}.* outside of a select list",
                    t
                )))
            }
            AstExpr::Nested(inner) => self.bind_expr(inner)?,
        })
    }

    fn bind_function(&mut self, call: &FunctionCall) -> PlanResult<LogicalExpr> {
        let mut args = call
            .args
            .iter()
            .map(|a| self.bind_expr(a))
            .collect::<PlanResult<Vec<_>>>()?;
        let name = call.name.as_str();

        if let Some(over) = &call.over {
            let partition_by = over
                .partition_by
                .iter()
                .map(|e| self.bind_expr(e))
                .collect::<PlanResult<Vec<_>>>()?;
            let order_by = over
                .order_by
                .iter()
                .map(|o| Ok(sort_expr(self.bind_expr(&o.expr)?, o)))
                .collect::<PlanResult<Vec<_>>>()?;
            let func = match name {
                "row_number" => WindowFunc::RowNumber,
                "rank" => WindowFunc::Rank(RankMethod::Min),
                "dense_rank" => WindowFunc::Rank(RankMethod::Dense),
                "lag" | "lead" => {
                    if args.is_empty() || args.len() > 2 {
                        return Err(PlanError::InvalidPlan(format!(
                            "{} expects an expression and an optional offset",
                            name
                        )));
                    }
                    if args.len() == 1 {
                        args.push(LogicalExpr::lit_i64(1));
                    }
                    if name == "lag" {
                        WindowFunc::Lag
                    } else {
                        WindowFunc::Lead
                    }
                }
                other => match aggregate_func(other, &args) {
                    Some(agg) => {
                        if agg == AggregateFunc::CountStar {
                            args.clear();
                        }
                        WindowFunc::Aggregate(agg)
                    }
                    None => {
                        return Err(PlanError::Unsupported(format!("window function {}", other)))
                    }
                },
            };
            return Ok(LogicalExpr::WindowCall {
                func,
                args,
                partition_by,
                order_by,
            });
        }

        if let Some(func) = aggregate_func(name, &args) {
            if func == AggregateFunc::CountStar {
                args.clear();
            }
            return Ok(LogicalExpr::AggregateCall {
                func,
                args,
                distinct: call.distinct,
            });
        }

        match ScalarFunc::from_name(name) {
            Some(func) => Ok(LogicalExpr::ScalarFunction { func, args }),
            None => Err(PlanError::Unsupported(format!("function {}", name))),
        }
    }
}

fn aggregate_func(name: &str, args: &[LogicalExpr]) -> Option<AggregateFunc> {
    let func = AggregateFunc::from_name(name)?;
    if func == AggregateFunc::Count && matches!(args, [] | [LogicalExpr::Wildcard]) {
        return Some(AggregateFunc::CountStar);
    }
    Some(func)
}

fn convert_binary_op(op: &parser::BinaryOperator) -> BinaryOp {
    use parser::BinaryOperator as B;
    match op {
        B::Eq => BinaryOp::Eq,
        B::NotEq => BinaryOp::NotEq,
        B::Lt => BinaryOp::Lt,
        B::LtEq => BinaryOp::LtEq,
        B::Gt => BinaryOp::Gt,
        B::GtEq => BinaryOp::GtEq,
        B::Plus => BinaryOp::Plus,
        B::Minus => BinaryOp::Minus,
        B::Multiply => BinaryOp::Multiply,
        B::Divide => BinaryOp::Divide,
        B::Modulo => BinaryOp::Modulo,
        B::And => BinaryOp::And,
        B::Or => BinaryOp::Or,
        B::Concat => BinaryOp::Concat,
    }
}

fn sort_expr(expr: LogicalExpr, item: &AstOrderBy) -> SortExpr {
    let sort = match item.direction {
        OrderDirection::Asc => SortExpr::asc(expr),
        OrderDirection::Desc => SortExpr::desc(expr),
    };
    match item.nulls {
        Some(NullsOrder::First) => sort.nulls_first(true),
        Some(NullsOrder::Last) => sort.nulls_first(false),
        None => sort,
    }
}

/// Names a select-list item: explicit aliases win, bare columns keep their
/// name and anything else is named after its SQL text.
fn name_item(expr: LogicalExpr, alias: Option<&str>) -> LogicalExpr {
    match (alias, &expr) {
        (Some(alias), _) => expr.alias(alias),
        (None, LogicalExpr::Column(_)) => expr,
        (None, _) => {
            let name = expr.to_string();
            expr.alias(name)
        }
    }
}

fn ordinal(n: i64, len: usize) -> PlanResult<usize> {
    if n >= 1 && (n as usize) <= len {
        Ok(n as usize - 1)
    } else {
        Err(PlanError::InvalidPlan(format!(
            "position {} is not in the select list (1..={})",
            n, len
        )))
    }
}

fn output_column(schema: &Schema, n: i64) -> PlanResult<Column> {
    let i = ordinal(n, schema.len())?;
    Ok(schema.fields()[i].column.clone())
}

fn rename_columns(builder: LogicalPlanBuilder, names: &[String]) -> PlanResult<LogicalPlanBuilder> {
    let schema = builder.schema();
    if names.len() != schema.len() {
        return Err(PlanError::InvalidPlan(format!(
            "{} column names given for {} columns",
            names.len(),
            schema.len()
        )));
    }
    let exprs = schema
        .fields()
        .iter()
        .zip(names)
        .map(|(f, n)| LogicalExpr::Column(f.column.clone()).alias(n.clone()))
        .collect();
    builder.project(exprs)
}

fn collect_aggregate_calls(expr: &LogicalExpr, calls: &mut Vec<LogicalExpr>) {
    match expr {
        LogicalExpr::AggregateCall { .. } => {
            if !calls.contains(expr) {
                calls.push(expr.clone());
            }
        }
        other => {
            for child in other.children() {
                collect_aggregate_calls(child, calls);
            }
        }
    }
}

/// Splits `l = r` into a (left key, right key) pair when each operand only
/// references one side of the join.
fn equi_pair(
    expr: &LogicalExpr,
    left: &Schema,
    right: &Schema,
) -> Option<(LogicalExpr, LogicalExpr)> {
    let LogicalExpr::BinaryOp {
        left: a,
        op: BinaryOp::Eq,
        right: b,
    } = expr
    else {
        return None;
    };
    let side = |e: &LogicalExpr| -> Option<bool> {
        let cols = e.columns();
        if cols.is_empty() {
            return None;
        }
        let in_left = cols.iter().all(|c| left.resolve_column(c).is_ok());
        let in_right = cols.iter().all(|c| right.resolve_column(c).is_ok());
        match (in_left, in_right) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    };
    match (side(a)?, side(b)?) {
        (true, false) => Some(((**a).clone(), (**b).clone())),
        (false, true) => Some(((**b).clone(), (**a).clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::catalog::MemoryCatalog;
    use crate::logical::schema::Field;
    use crate::parser::{DataType, Parser};
    use crate::source::{DecodeOptions, MemorySource};

    fn catalog() -> MemoryCatalog {
        let catalog = MemoryCatalog::new();
        let sales = Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
            Field::nullable("value", DataType::Float64),
        ]);
        let source = MemorySource::from_strs("sales", &["year", "town", "value"], &[]);
        catalog.register(
            "sales",
            LogicalPlanBuilder::scan("sales", Arc::new(source), sales, DecodeOptions::default())
                .into_arc(),
        );
        let towns = Schema::new(vec![
            Field::nullable("town", DataType::Utf8),
            Field::nullable("Address", DataType::Utf8),
        ]);
        let source = MemorySource::from_strs("towns", &["town", "Address"], &[]);
        catalog.register(
            "towns",
            LogicalPlanBuilder::scan("towns", Arc::new(source), towns, DecodeOptions::default())
                .into_arc(),
        );
        catalog
    }

    fn bind(sql: &str) -> PlanResult<LogicalPlan> {
        let stmt = Parser::parse_one(sql).unwrap();
        bind_statement(&stmt, &catalog())
    }

    #[test]
    fn test_simple_select() {
        let plan = bind("SELECT year, town FROM sales").unwrap();
        assert_eq!(plan.schema().names(), vec!["year", "town"]);
        assert!(plan.display().contains("Scan: sales"));
    }

    #[test]
    fn test_select_with_where() {
        let plan = bind("SELECT * FROM sales WHERE value > 100").unwrap();
        assert!(plan.display().contains("Filter: (value > 100)"));
        assert_eq!(plan.schema().len(), 3);
    }

    #[test]
    fn test_unknown_table_and_column() {
        assert!(matches!(bind("SELECT * FROM nope"), Err(PlanError::UnknownTable(_))));
        assert!(matches!(
            bind("SELECT price FROM sales"),
            Err(PlanError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_group_by() {
        let plan = bind("SELECT year, AVG(value) AS avg_value FROM sales GROUP BY year").unwrap();
        assert_eq!(plan.schema().names(), vec!["year", "avg_value"]);
        assert!(plan.display().contains("Aggregate: groups=[year]"));
    }

    #[test]
    fn test_group_by_requires_keys() {
        let err = bind("SELECT town, SUM(value) FROM sales GROUP BY year").unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan(_)));
    }

    #[test]
    fn test_having_and_order_by_aggregate() {
        let plan = bind(
            "SELECT town FROM sales GROUP BY town HAVING COUNT(*) > 1 ORDER BY SUM(value) DESC",
        )
        .unwrap();
        assert_eq!(plan.schema().names(), vec!["town"]);
        let display = plan.display();
        assert!(display.contains("Sort:"));
        assert!(display.contains("Filter: (count(*) > 1)"));
    }

    #[test]
    fn test_join_keys_are_split() {
        let plan = bind(
            "SELECT s.year, t.Address FROM sales s JOIN towns t ON s.town = t.town AND s.value > 1",
        )
        .unwrap();
        match &*plan.root {
            LogicalOperator::Select(select) => match &*select.input {
                LogicalOperator::Join(join) => {
                    assert_eq!(join.on.len(), 1);
                    assert!(join.filter.is_some());
                }
                other => panic!("unexpected {}", other.name()),
            },
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn test_ambiguous_column() {
        let err = bind("SELECT town FROM sales s JOIN towns t ON s.town = t.town").unwrap_err();
        assert!(matches!(err, PlanError::AmbiguousColumn { .. }));
    }

    #[test]
    fn test_window_function() {
        let plan =
            bind("SELECT town, RANK() OVER (ORDER BY value DESC) AS r FROM sales").unwrap();
        assert_eq!(plan.schema().names(), vec!["town", "r"]);
        assert!(plan.display().contains("Window:"));
    }

    #[test]
    fn test_union_and_limit() {
        let plan = bind(
            "SELECT town FROM sales UNION ALL SELECT town FROM towns ORDER BY town LIMIT 3",
        )
        .unwrap();
        let display = plan.display();
        assert!(display.starts_with("Limit: offset=0 fetch=Some(3)"));
        assert!(display.contains("Union: vertical"));
    }

    #[test]
    fn test_select_without_from() {
        let plan = bind("SELECT 1 + 2 AS three").unwrap();
        assert_eq!(plan.schema().names(), vec!["three"]);
    }

    #[test]
    fn test_cte() {
        let plan = bind("WITH big AS (SELECT * FROM sales WHERE value > 100) SELECT town FROM big")
            .unwrap();
        assert_eq!(plan.schema().names(), vec!["town"]);
    }

    #[test]
    fn test_order_by_hidden_column() {
        let plan = bind("SELECT town FROM sales ORDER BY value").unwrap();
        assert_eq!(plan.schema().names(), vec!["town"]);
    }
}
