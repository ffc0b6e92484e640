//! Logical plan builder.
//!
//! [`LogicalPlanBuilder`] validates every step against its input schema and
//! produces immutable plan nodes. Both the SQL binder and the `LazyFrame`
//! API build plans through it, so all build-time checks live here.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use super::expr::{comparable, resolve_column, AggregateFunc, LogicalExpr, SortExpr};
use super::operator::*;
use super::plan::LogicalPlan;
use super::schema::{Column, Field, Schema, SchemaRef};
use crate::executor::{Row, Value};
use crate::parser::{DataType, JoinType};
use crate::source::{DecodeOptions, RowSource};

/// Errors that can occur during plan building.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// A column reference matches no input column.
    #[error("unknown column '{name}' (available: {})", available.join(", "))]
    UnknownColumn {
        /// The reference as written.
        name: String,
        /// Qualified names of the input columns.
        available: Vec<String>,
    },

    /// An unqualified reference matches several input columns.
    #[error("ambiguous column '{name}' (candidates: {})", candidates.join(", "))]
    AmbiguousColumn {
        /// The reference as written.
        name: String,
        /// Qualified names of the matching columns.
        candidates: Vec<String>,
    },

    /// An operation is applied to operands of the wrong type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A join key does not exist on its side of the join.
    #[error("join key '{key}' not found on the {side} side")]
    JoinKey {
        /// The key expression.
        key: String,
        /// `left` or `right`.
        side: String,
    },

    /// Two output columns would share a name.
    #[error("duplicate output column '{0}'")]
    DuplicateColumn(String),

    /// A table is not registered in the catalog.
    #[error("table not found: {0}")]
    UnknownTable(String),

    /// The query uses a feature the planner does not support.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The plan is malformed.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

/// Result type for plan building.
pub type PlanResult<T> = Result<T, PlanError>;

/// Builds logical plans one validated node at a time.
#[derive(Debug, Clone)]
pub struct LogicalPlanBuilder {
    plan: Arc<LogicalOperator>,
}

impl LogicalPlanBuilder {
    /// Starts from an existing operator.
    pub fn from_arc(plan: Arc<LogicalOperator>) -> Self {
        Self { plan }
    }

    /// Starts from an existing plan.
    pub fn from_plan(plan: &LogicalPlan) -> Self {
        Self::from_arc(plan.root.clone())
    }

    /// Starts from a scan of `source` with an already known schema.
    pub fn scan(
        table_name: impl Into<String>,
        source: Arc<dyn RowSource>,
        schema: Schema,
        decode: DecodeOptions,
    ) -> Self {
        let scan = ScanOperator::new(table_name, source, schema, decode);
        Self::from_arc(Arc::new(LogicalOperator::Scan(scan)))
    }

    /// Starts from inline rows.
    pub fn values(schema: Schema, rows: Vec<Row>) -> PlanResult<Self> {
        if let Some(row) = rows.iter().find(|r| r.num_columns() != schema.len()) {
            return Err(PlanError::InvalidPlan(format!(
                "row {} has {} values, schema has {} columns",
                row,
                row.num_columns(),
                schema.len()
            )));
        }
        Ok(Self::from_arc(Arc::new(LogicalOperator::Values(
            ValuesOperator {
                rows: Arc::new(rows),
                schema: Arc::new(schema),
            },
        ))))
    }

    /// Returns the current output schema.
    pub fn schema(&self) -> SchemaRef {
        self.plan.schema()
    }

    /// Finishes the plan.
    pub fn build(self) -> LogicalPlan {
        LogicalPlan::from_arc(self.plan)
    }

    /// Returns the current root operator.
    pub fn into_arc(self) -> Arc<LogicalOperator> {
        self.plan
    }

    fn wrap(op: LogicalOperator) -> Self {
        Self::from_arc(Arc::new(op))
    }

    /// Projects to exactly `exprs`.
    ///
    /// A list of bare columns lowers to a Select node, anything else to a
    /// Projection. When every expression is an aggregate the whole input
    /// forms a single group. Window calls are evaluated by a Window node
    /// placed below the projection.
    pub fn select(self, exprs: Vec<LogicalExpr>) -> PlanResult<Self> {
        let exprs = expand_wildcards(exprs, &self.schema())?;
        if exprs.is_empty() {
            return Err(PlanError::InvalidPlan("select needs at least one expression".into()));
        }

        let aggregated = exprs.iter().filter(|e| e.contains_aggregate()).count();
        if aggregated == exprs.len() {
            return self.aggregate(vec![], exprs);
        }
        if aggregated > 0 {
            return Err(PlanError::InvalidPlan(
                "cannot mix aggregate and non-aggregate expressions without group_by".into(),
            ));
        }

        if exprs.iter().all(|e| matches!(e, LogicalExpr::Column(_))) {
            let columns = exprs
                .into_iter()
                .filter_map(|e| match e {
                    LogicalExpr::Column(c) => Some(c),
                    _ => None,
                })
                .collect();
            return self.select_columns(columns);
        }

        let (builder, exprs) = self.extract_windows(exprs)?;
        builder.project(exprs)
    }

    /// Selects bare columns.
    pub fn select_columns(self, columns: Vec<Column>) -> PlanResult<Self> {
        let input_schema = self.schema();
        let mut fields = Vec::with_capacity(columns.len());
        for column in &columns {
            let index = resolve_column(&input_schema, column)?;
            fields.push(input_schema.fields()[index].clone());
        }
        check_unique(&fields)?;
        Ok(Self::wrap(LogicalOperator::Select(SelectOperator {
            input: self.plan,
            columns,
            schema: Arc::new(Schema::new(fields)),
        })))
    }

    /// Adds a Projection evaluating `exprs`. Window calls must already be
    /// extracted.
    pub fn project(self, exprs: Vec<LogicalExpr>) -> PlanResult<Self> {
        let input_schema = self.schema();
        let exprs = expand_wildcards(exprs, &input_schema)?;
        let mut fields = Vec::with_capacity(exprs.len());
        for expr in &exprs {
            if expr.contains_aggregate() {
                return Err(PlanError::InvalidPlan(format!(
                    "aggregate {} is only valid in group_by().agg() or a global select",
                    expr
                )));
            }
            if expr.contains_window() {
                return Err(PlanError::InvalidPlan(format!(
                    "window expression {} cannot be projected directly",
                    expr
                )));
            }
            fields.push(expr_field(expr, &input_schema)?);
        }
        check_unique(&fields)?;
        Ok(Self::wrap(LogicalOperator::Projection(ProjectionOperator {
            input: self.plan,
            exprs,
            schema: Arc::new(Schema::new(fields)),
        })))
    }

    /// Keeps every input column, replacing same-named columns in place and
    /// appending new ones.
    pub fn with_columns(self, exprs: Vec<LogicalExpr>) -> PlanResult<Self> {
        let input_schema = self.schema();
        let mut names = HashSet::new();
        for expr in &exprs {
            if expr.contains_aggregate() {
                return Err(PlanError::InvalidPlan(format!(
                    "aggregate {} needs .over() inside with_columns",
                    expr
                )));
            }
            if !names.insert(expr.output_name()) {
                return Err(PlanError::DuplicateColumn(expr.output_name()));
            }
        }

        let (builder, rewritten) = self.extract_windows(exprs)?;

        let mut projection: Vec<LogicalExpr> = input_schema
            .fields()
            .iter()
            .map(|f| LogicalExpr::Column(f.column.clone()))
            .collect();
        for expr in rewritten {
            let name = expr.output_name();
            match input_schema.fields().iter().position(|f| f.name() == name) {
                Some(i) => projection[i] = expr.alias(name),
                None => projection.push(expr),
            }
        }
        builder.project(projection)
    }

    /// Keeps rows for which `predicate` is true.
    pub fn filter(self, predicate: LogicalExpr) -> PlanResult<Self> {
        let schema = self.schema();
        if predicate.contains_aggregate() || predicate.contains_window() {
            return Err(PlanError::InvalidPlan(format!(
                "filter predicate {} cannot contain aggregate or window calls",
                predicate
            )));
        }
        let data_type = predicate.data_type(&schema)?;
        if !matches!(data_type, DataType::Boolean | DataType::Null) {
            return Err(PlanError::TypeMismatch(format!(
                "filter predicate {} must be boolean, found {}",
                predicate, data_type
            )));
        }
        Ok(Self::wrap(LogicalOperator::Filter(FilterOperator {
            input: self.plan,
            predicate,
        })))
    }

    /// Groups by `group_by` and evaluates `aggregates` per group.
    ///
    /// Each aggregate expression must contain an aggregate call; columns
    /// used outside aggregate calls must be grouping keys.
    pub fn aggregate(self, group_by: Vec<LogicalExpr>, aggregates: Vec<LogicalExpr>) -> PlanResult<Self> {
        let input_schema = self.schema();
        let group_by = expand_wildcards(group_by, &input_schema)?;

        let mut key_indices = HashSet::new();
        let mut fields = Vec::with_capacity(group_by.len() + aggregates.len());
        for key in &group_by {
            if key.contains_aggregate() || key.contains_window() {
                return Err(PlanError::InvalidPlan(format!(
                    "group key {} cannot contain aggregate or window calls",
                    key
                )));
            }
            if let LogicalExpr::Column(c) = key {
                key_indices.insert(resolve_column(&input_schema, c)?);
            }
            fields.push(expr_field(key, &input_schema)?);
        }

        for agg in &aggregates {
            if !agg.contains_aggregate() {
                return Err(PlanError::InvalidPlan(format!(
                    "{} is not an aggregate expression",
                    agg
                )));
            }
            if agg.contains_window() {
                return Err(PlanError::InvalidPlan(format!(
                    "window expression {} cannot be used as an aggregate",
                    agg
                )));
            }
            for column in columns_outside_aggregates(agg) {
                let index = resolve_column(&input_schema, &column)?;
                if !key_indices.contains(&index) {
                    return Err(PlanError::InvalidPlan(format!(
                        "column {} must be a group key or used inside an aggregate",
                        column
                    )));
                }
            }
            let data_type = agg.data_type(&input_schema)?;
            fields.push(Field::new(
                Column::new(agg.output_name()),
                data_type,
                agg.nullable(&input_schema),
            ));
        }
        check_unique(&fields)?;

        Ok(Self::wrap(LogicalOperator::Aggregate(AggregateOperator {
            input: self.plan,
            group_by,
            aggregates,
            schema: Arc::new(Schema::new(fields)),
        })))
    }

    /// Equi-joins with `right` on pairwise keys.
    pub fn join(
        self,
        right: Arc<LogicalOperator>,
        join_type: JoinType,
        left_on: Vec<LogicalExpr>,
        right_on: Vec<LogicalExpr>,
        options: JoinOptions,
    ) -> PlanResult<Self> {
        if left_on.len() != right_on.len() {
            return Err(PlanError::InvalidPlan(format!(
                "join needs the same number of keys on both sides ({} vs {})",
                left_on.len(),
                right_on.len()
            )));
        }
        if join_type == JoinType::Cross && !left_on.is_empty() {
            return Err(PlanError::InvalidPlan("cross join takes no keys".into()));
        }
        let on = left_on.into_iter().zip(right_on).collect();
        self.join_on(right, join_type, on, None, options)
    }

    /// Joins with `right` on key pairs plus an optional residual predicate
    /// over the combined columns.
    pub fn join_on(
        self,
        right: Arc<LogicalOperator>,
        join_type: JoinType,
        on: Vec<(LogicalExpr, LogicalExpr)>,
        filter: Option<LogicalExpr>,
        options: JoinOptions,
    ) -> PlanResult<Self> {
        let left_schema = self.schema();
        let right_schema = right.schema();

        for (l, r) in &on {
            let lt = join_key_type(l, &left_schema, "left")?;
            let rt = join_key_type(r, &right_schema, "right")?;
            if !comparable(&lt, &rt) {
                return Err(PlanError::TypeMismatch(format!(
                    "join keys {} ({}) and {} ({}) have no common type",
                    l, lt, r, rt
                )));
            }
        }

        if let Some(predicate) = &filter {
            let combined = left_schema.merge(&right_schema);
            let data_type = predicate.data_type(&combined)?;
            if !matches!(data_type, DataType::Boolean | DataType::Null) {
                return Err(PlanError::TypeMismatch(format!(
                    "join condition {} must be boolean, found {}",
                    predicate, data_type
                )));
            }
        }

        let schema = join_schema(&left_schema, &right_schema, join_type, &options.suffix);
        check_unique(schema.fields())?;

        Ok(Self::wrap(LogicalOperator::Join(JoinOperator {
            left: self.plan,
            right,
            join_type,
            on,
            filter,
            options,
            schema: Arc::new(schema),
        })))
    }

    /// Reshapes long to wide: one row per distinct `index` key and one
    /// column per entry of `on_values`.
    pub fn pivot(
        self,
        index: Vec<Column>,
        on: Column,
        values: Column,
        on_values: Vec<Value>,
        aggregate: AggregateFunc,
    ) -> PlanResult<Self> {
        let input_schema = self.schema();
        let mut fields = Vec::with_capacity(index.len() + on_values.len());
        for column in &index {
            let i = resolve_column(&input_schema, column)?;
            fields.push(input_schema.fields()[i].clone());
        }
        let on_index = resolve_column(&input_schema, &on)?;
        let values_index = resolve_column(&input_schema, &values)?;
        if index.iter().any(|c| resolve_column(&input_schema, c).ok() == Some(on_index)) {
            return Err(PlanError::InvalidPlan(format!(
                "pivot column {} cannot also be an index column",
                on
            )));
        }

        let on_type = &input_schema.fields()[on_index].data_type;
        for value in &on_values {
            if !value.is_null() && !comparable(&value.data_type(), on_type) {
                return Err(PlanError::TypeMismatch(format!(
                    "pivot value {} ({}) does not match column {} ({})",
                    value,
                    value.data_type(),
                    on,
                    on_type
                )));
            }
        }

        let value_type = aggregate.return_type(Some(&input_schema.fields()[values_index].data_type))?;
        for value in &on_values {
            fields.push(Field::nullable(value.to_string(), value_type.clone()));
        }
        check_unique(&fields)?;

        Ok(Self::wrap(LogicalOperator::Pivot(PivotOperator {
            input: self.plan,
            index,
            on,
            values,
            on_values,
            aggregate,
            schema: Arc::new(Schema::new(fields)),
        })))
    }

    /// Reshapes wide to long. Empty `value_vars` means every column that is
    /// not an identifier.
    pub fn melt(
        self,
        id_vars: Vec<Column>,
        value_vars: Vec<Column>,
        variable_name: impl Into<String>,
        value_name: impl Into<String>,
    ) -> PlanResult<Self> {
        let input_schema = self.schema();
        let variable_name = variable_name.into();
        let value_name = value_name.into();

        let mut id_indices = Vec::with_capacity(id_vars.len());
        for column in &id_vars {
            id_indices.push(resolve_column(&input_schema, column)?);
        }
        let value_vars = if value_vars.is_empty() {
            input_schema
                .fields()
                .iter()
                .enumerate()
                .filter(|(i, _)| !id_indices.contains(i))
                .map(|(_, f)| f.column.clone())
                .collect()
        } else {
            value_vars
        };

        let mut value_type = DataType::Null;
        for column in &value_vars {
            let i = resolve_column(&input_schema, column)?;
            let t = &input_schema.fields()[i].data_type;
            value_type = value_type.relaxed_supertype(t).ok_or_else(|| {
                PlanError::TypeMismatch(format!(
                    "melt value column {} ({}) has no common type with {}",
                    column, t, value_type
                ))
            })?;
        }

        let mut fields: Vec<Field> = id_indices
            .iter()
            .map(|&i| input_schema.fields()[i].clone())
            .collect();
        fields.push(Field::not_null(variable_name.clone(), DataType::Utf8));
        fields.push(Field::nullable(value_name.clone(), value_type));
        check_unique(&fields)?;

        Ok(Self::wrap(LogicalOperator::Melt(MeltOperator {
            input: self.plan,
            id_vars,
            value_vars,
            variable_name,
            value_name,
            schema: Arc::new(Schema::new(fields)),
        })))
    }

    /// Sorts by the given keys; stable.
    pub fn sort(self, order_by: Vec<SortExpr>) -> PlanResult<Self> {
        let schema = self.schema();
        if order_by.is_empty() {
            return Err(PlanError::InvalidPlan("sort needs at least one key".into()));
        }
        for key in &order_by {
            if key.expr.contains_aggregate() || key.expr.contains_window() {
                return Err(PlanError::InvalidPlan(format!(
                    "sort key {} cannot contain aggregate or window calls",
                    key.expr
                )));
            }
            let t = key.expr.data_type(&schema)?;
            if matches!(t, DataType::Struct(_)) {
                return Err(PlanError::TypeMismatch(format!("cannot sort by struct {}", key.expr)));
            }
        }
        Ok(Self::wrap(LogicalOperator::Sort(SortOperator {
            input: self.plan,
            order_by,
            fetch: None,
        })))
    }

    /// Appends one column per window expression.
    pub fn window(self, window_exprs: Vec<LogicalExpr>) -> PlanResult<Self> {
        let input_schema = self.schema();
        let mut fields = input_schema.fields().to_vec();
        for expr in &window_exprs {
            match expr.clone().unalias() {
                LogicalExpr::WindowCall { args, partition_by, order_by, .. } => {
                    if args
                        .iter()
                        .chain(partition_by.iter())
                        .chain(order_by.iter().map(|o| &o.expr))
                        .any(|e| e.contains_window() || e.contains_aggregate())
                    {
                        return Err(PlanError::InvalidPlan(format!(
                            "window expression {} cannot nest aggregate or window calls",
                            expr
                        )));
                    }
                }
                _ => {
                    return Err(PlanError::InvalidPlan(format!(
                        "{} is not a window expression",
                        expr
                    )))
                }
            }
            fields.push(Field::new(
                Column::new(expr.output_name()),
                expr.data_type(&input_schema)?,
                expr.nullable(&input_schema),
            ));
        }
        check_unique(&fields)?;
        Ok(Self::wrap(LogicalOperator::Window(WindowOperator {
            input: self.plan,
            window_exprs,
            schema: Arc::new(Schema::new(fields)),
        })))
    }

    /// Appends one rolling aggregate column per expression, over windows of
    /// `period` ending at each row's index value.
    pub fn rolling(
        self,
        index_column: Column,
        period: Period,
        group_by: Vec<Column>,
        aggregates: Vec<LogicalExpr>,
    ) -> PlanResult<Self> {
        let input_schema = self.schema();
        let index = resolve_column(&input_schema, &index_column)?;
        let index_type = &input_schema.fields()[index].data_type;
        if !matches!(
            index_type,
            DataType::Date | DataType::Datetime | DataType::Time | DataType::Int64
        ) {
            return Err(PlanError::TypeMismatch(format!(
                "rolling index {} must be a date, datetime, time or integer, found {}",
                index_column, index_type
            )));
        }
        period.span(index_type)?;
        for column in &group_by {
            resolve_column(&input_schema, column)?;
        }

        let mut fields = input_schema.fields().to_vec();
        for expr in &aggregates {
            match expr.clone().unalias() {
                LogicalExpr::AggregateCall { func, args, .. }
                    if matches!(
                        func,
                        AggregateFunc::Mean
                            | AggregateFunc::Sum
                            | AggregateFunc::Min
                            | AggregateFunc::Max
                            | AggregateFunc::Count
                            | AggregateFunc::Median
                    ) && args.len() == 1
                        && matches!(args[0], LogicalExpr::Column(_)) => {}
                _ => {
                    return Err(PlanError::InvalidPlan(format!(
                        "rolling aggregate {} must be mean, sum, min, max, count or median of a column",
                        expr
                    )))
                }
            }
            fields.push(Field::new(
                Column::new(expr.output_name()),
                expr.data_type(&input_schema)?,
                expr.nullable(&input_schema),
            ));
        }
        check_unique(&fields)?;

        Ok(Self::wrap(LogicalOperator::Rolling(RollingOperator {
            input: self.plan,
            index_column,
            period,
            group_by,
            aggregates,
            schema: Arc::new(Schema::new(fields)),
        })))
    }

    /// Concatenates `inputs` under the given alignment mode.
    pub fn union(inputs: Vec<Arc<LogicalOperator>>, mode: UnionMode) -> PlanResult<Self> {
        if inputs.is_empty() {
            return Err(PlanError::InvalidPlan("union needs at least one input".into()));
        }
        let schema = union_schema(&inputs, mode)?;
        Ok(Self::wrap(LogicalOperator::Union(UnionOperator {
            inputs,
            mode,
            schema: Arc::new(schema),
        })))
    }

    /// Skips `offset` rows and keeps at most `fetch`.
    pub fn limit(self, offset: usize, fetch: Option<usize>) -> PlanResult<Self> {
        Ok(Self::wrap(LogicalOperator::Limit(LimitOperator {
            input: self.plan,
            offset,
            fetch,
        })))
    }

    /// Removes duplicate rows, keeping first occurrences.
    pub fn distinct(self) -> PlanResult<Self> {
        Ok(Self::wrap(LogicalOperator::Distinct(DistinctOperator {
            input: self.plan,
        })))
    }

    /// Re-qualifies every output column under `alias`.
    pub fn alias(self, alias: impl Into<String>) -> PlanResult<Self> {
        let alias = alias.into();
        let schema = self.schema().with_qualifier(Some(&alias));
        check_unique(schema.fields())?;
        Ok(Self::wrap(LogicalOperator::SubqueryAlias(
            SubqueryAliasOperator {
                input: self.plan,
                alias,
                schema: Arc::new(schema),
            },
        )))
    }

    /// Moves every window call in `exprs` into a Window node below the
    /// returned builder and replaces the calls with references to the
    /// appended columns. Rewritten expressions keep their output names.
    pub fn extract_windows(self, exprs: Vec<LogicalExpr>) -> PlanResult<(Self, Vec<LogicalExpr>)> {
        let mut calls: Vec<LogicalExpr> = Vec::new();
        for expr in &exprs {
            collect_window_calls(expr, &mut calls);
        }
        if calls.is_empty() {
            return Ok((self, exprs));
        }

        let window_exprs = calls.iter().map(|c| c.clone().alias(c.to_string())).collect();
        let builder = self.window(window_exprs)?;

        let rewritten = exprs
            .into_iter()
            .map(|expr| {
                let name = expr.output_name();
                let replaced = expr.transform(&mut |e| match e {
                    LogicalExpr::WindowCall { .. } => Some(LogicalExpr::col(e.to_string())),
                    _ => None,
                });
                if replaced.output_name() == name {
                    replaced
                } else {
                    replaced.alias(name)
                }
            })
            .collect();
        Ok((builder, rewritten))
    }
}

/// Returns the output field of `expr` over `schema`. Bare column references
/// keep their input field, qualifier included.
pub(crate) fn expr_field(expr: &LogicalExpr, schema: &Schema) -> PlanResult<Field> {
    let data_type = expr.data_type(schema)?;
    if let LogicalExpr::Column(c) = expr {
        let index = resolve_column(schema, c)?;
        return Ok(schema.fields()[index].clone());
    }
    Ok(Field::new(
        Column::new(expr.output_name()),
        data_type,
        expr.nullable(schema),
    ))
}

/// Rejects field lists in which two fields share qualifier and name.
pub(crate) fn check_unique(fields: &[Field]) -> PlanResult<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert((field.column.qualifier.as_deref(), field.name())) {
            return Err(PlanError::DuplicateColumn(field.qualified_name()));
        }
    }
    Ok(())
}

fn expand_wildcards(exprs: Vec<LogicalExpr>, schema: &Schema) -> PlanResult<Vec<LogicalExpr>> {
    let mut out = Vec::with_capacity(exprs.len());
    for expr in exprs {
        match expr {
            LogicalExpr::Wildcard => out.extend(
                schema
                    .fields()
                    .iter()
                    .map(|f| LogicalExpr::Column(f.column.clone())),
            ),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn columns_outside_aggregates(expr: &LogicalExpr) -> Vec<Column> {
    let mut out = Vec::new();
    fn walk(expr: &LogicalExpr, out: &mut Vec<Column>) {
        match expr {
            LogicalExpr::AggregateCall { .. } => {}
            LogicalExpr::Column(c) => out.push(c.clone()),
            other => {
                for child in other.children() {
                    walk(child, out);
                }
            }
        }
    }
    walk(expr, &mut out);
    out
}

fn collect_window_calls(expr: &LogicalExpr, calls: &mut Vec<LogicalExpr>) {
    match expr {
        LogicalExpr::WindowCall { .. } => {
            if !calls.contains(expr) {
                calls.push(expr.clone());
            }
        }
        other => {
            for child in other.children() {
                collect_window_calls(child, calls);
            }
        }
    }
}

fn join_key_type(key: &LogicalExpr, schema: &Schema, side: &str) -> PlanResult<DataType> {
    if key.contains_aggregate() || key.contains_window() {
        return Err(PlanError::InvalidPlan(format!(
            "join key {} cannot contain aggregate or window calls",
            key
        )));
    }
    key.data_type(schema).map_err(|e| match e {
        PlanError::UnknownColumn { .. } => PlanError::JoinKey {
            key: key.to_string(),
            side: side.to_string(),
        },
        other => other,
    })
}

/// Output schema of a join: left fields then right fields. Semi and anti
/// joins only return the left side. Right fields whose name collides with a
/// left field under the same (or no) qualifier get `suffix`.
pub(crate) fn join_schema(left: &Schema, right: &Schema, join_type: JoinType, suffix: &str) -> Schema {
    let nullable_left = join_type.preserves_right();
    let nullable_right = join_type.preserves_left();

    let mut fields: Vec<Field> = left
        .fields()
        .iter()
        .map(|f| if nullable_left { f.clone().into_nullable() } else { f.clone() })
        .collect();
    if join_type.is_filtering() {
        return Schema::new(fields);
    }

    for field in right.fields() {
        let collides = left.fields().iter().any(|l| {
            l.name() == field.name()
                && match (&l.column.qualifier, &field.column.qualifier) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                }
        });
        let mut out = if collides {
            field.renamed(format!("{}{}", field.name(), suffix))
        } else {
            field.clone()
        };
        if nullable_right {
            out = out.into_nullable();
        }
        fields.push(out);
    }
    Schema::new(fields)
}

fn union_schema(inputs: &[Arc<LogicalOperator>], mode: UnionMode) -> PlanResult<Schema> {
    let schemas: Vec<SchemaRef> = inputs.iter().map(|i| i.schema()).collect();
    let first = &schemas[0];

    match mode {
        UnionMode::Vertical => {
            let mut fields: Vec<Field> = first
                .fields()
                .iter()
                .map(|f| f.with_qualifier(None))
                .collect();
            for schema in &schemas[1..] {
                if schema.len() != fields.len() {
                    return Err(PlanError::TypeMismatch(format!(
                        "vertical union inputs have {} and {} columns",
                        fields.len(),
                        schema.len()
                    )));
                }
                for (field, other) in fields.iter_mut().zip(schema.fields()) {
                    if field.name() != other.name() {
                        return Err(PlanError::TypeMismatch(format!(
                            "vertical union column '{}' does not match '{}'",
                            field.name(),
                            other.name()
                        )));
                    }
                    let t = field.data_type.supertype(&other.data_type).ok_or_else(|| {
                        PlanError::TypeMismatch(format!(
                            "vertical union column '{}' has types {} and {}",
                            field.name(),
                            field.data_type,
                            other.data_type
                        ))
                    })?;
                    field.data_type = t;
                    field.nullable |= other.nullable;
                }
            }
            Ok(Schema::new(fields))
        }
        UnionMode::Diagonal | UnionMode::DiagonalRelaxed => {
            let mut fields: Vec<Field> = Vec::new();
            for schema in &schemas {
                for other in schema.fields() {
                    match fields.iter_mut().find(|f| f.name() == other.name()) {
                        Some(field) => {
                            let t = if mode == UnionMode::Diagonal {
                                field.data_type.supertype(&other.data_type)
                            } else {
                                field.data_type.relaxed_supertype(&other.data_type)
                            };
                            field.data_type = t.ok_or_else(|| {
                                PlanError::TypeMismatch(format!(
                                    "{} union column '{}' has types {} and {}",
                                    mode,
                                    other.name(),
                                    field.data_type,
                                    other.data_type
                                ))
                            })?;
                            field.nullable |= other.nullable;
                        }
                        None => fields.push(other.with_qualifier(None)),
                    }
                }
            }
            // Columns missing from any input are null-filled.
            for field in &mut fields {
                if schemas.iter().any(|s| !s.contains(field.name())) {
                    field.nullable = true;
                }
            }
            Ok(Schema::new(fields))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::expr::{col, count_star, lit, RankMethod};
    use crate::source::MemorySource;

    fn sales() -> LogicalPlanBuilder {
        let schema = Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
            Field::nullable("value", DataType::Float64),
            Field::nullable("date", DataType::Date),
        ]);
        let source = MemorySource::from_strs("sales", &["year", "town", "value", "date"], &[]);
        LogicalPlanBuilder::scan("sales", Arc::new(source), schema, DecodeOptions::default())
    }

    fn towns() -> Arc<LogicalOperator> {
        let schema = Schema::new(vec![
            Field::nullable("town", DataType::Utf8),
            Field::nullable("Address", DataType::Utf8),
        ]);
        let source = MemorySource::from_strs("towns", &["town", "Address"], &[]);
        LogicalPlanBuilder::scan("towns", Arc::new(source), schema, DecodeOptions::default()).into_arc()
    }

    #[test]
    fn test_select_columns_lowers_to_select() {
        let plan = sales().select(vec![col("town"), col("year")]).unwrap().build();
        assert!(matches!(&*plan.root, LogicalOperator::Select(_)));
        assert_eq!(plan.schema().names(), vec!["town", "year"]);
    }

    #[test]
    fn test_select_expressions_lowers_to_projection() {
        let plan = sales()
            .select(vec![col("town").upper(), col("value").mul(lit(2)).alias("double")])
            .unwrap()
            .build();
        assert!(matches!(&*plan.root, LogicalOperator::Projection(_)));
        assert_eq!(plan.schema().names(), vec!["town", "double"]);
    }

    #[test]
    fn test_select_unknown_column() {
        let err = sales().select(vec![col("price")]).unwrap_err();
        assert!(matches!(err, PlanError::UnknownColumn { name, .. } if name == "price"));
    }

    #[test]
    fn test_select_all_aggregates_is_global_aggregate() {
        let plan = sales().select(vec![col("value").sum(), count_star()]).unwrap().build();
        match &*plan.root {
            LogicalOperator::Aggregate(agg) => assert!(agg.group_by.is_empty()),
            other => panic!("unexpected {}", other.name()),
        }
        assert_eq!(plan.schema().names(), vec!["value", "count"]);
    }

    #[test]
    fn test_filter_requires_boolean() {
        let err = sales().filter(col("value").add(lit(1))).unwrap_err();
        assert!(matches!(err, PlanError::TypeMismatch(_)));
        assert!(sales().filter(col("value").gt(lit(100))).is_ok());
    }

    #[test]
    fn test_with_columns_replaces_and_appends() {
        let plan = sales()
            .with_columns(vec![col("town").lower(), col("value").mul(lit(2)).alias("double")])
            .unwrap()
            .build();
        assert_eq!(plan.schema().names(), vec!["year", "town", "value", "date", "double"]);
    }

    #[test]
    fn test_aggregate_schema() {
        let plan = sales()
            .aggregate(vec![col("year")], vec![col("value").mean()])
            .unwrap()
            .build();
        let schema = plan.schema();
        assert_eq!(schema.names(), vec!["year", "value"]);
        assert_eq!(schema.field(1).unwrap().data_type, DataType::Float64);
    }

    #[test]
    fn test_aggregate_rejects_plain_columns() {
        let err = sales()
            .aggregate(vec![col("year")], vec![col("town")])
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan(_)));
        let err = sales()
            .aggregate(vec![col("year")], vec![col("value").sum().add(col("town"))])
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan(_)));
    }

    #[test]
    fn test_join_suffixes_collisions() {
        let plan = sales()
            .join(towns(), JoinType::Left, vec![col("town")], vec![col("town")], JoinOptions::default())
            .unwrap()
            .build();
        let schema = plan.schema();
        assert_eq!(
            schema.names(),
            vec!["year", "town", "value", "date", "town_right", "Address"]
        );
        assert!(schema.field(5).unwrap().nullable);
    }

    #[test]
    fn test_join_missing_key() {
        let err = sales()
            .join(towns(), JoinType::Inner, vec![col("town")], vec![col("name")], JoinOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::JoinKey {
                key: "name".into(),
                side: "right".into()
            }
        );
    }

    #[test]
    fn test_join_key_type_mismatch() {
        let err = sales()
            .join(towns(), JoinType::Inner, vec![col("year")], vec![col("town")], JoinOptions::default())
            .unwrap_err();
        assert!(matches!(err, PlanError::TypeMismatch(_)));
    }

    #[test]
    fn test_semi_join_keeps_left_schema() {
        let plan = sales()
            .join(towns(), JoinType::Semi, vec![col("town")], vec![col("town")], JoinOptions::default())
            .unwrap()
            .build();
        assert_eq!(plan.schema().len(), 4);
    }

    #[test]
    fn test_pivot_schema() {
        let plan = sales()
            .pivot(
                vec![Column::new("town")],
                Column::new("year"),
                Column::new("value"),
                vec![Value::int(2019), Value::int(2020)],
                AggregateFunc::First,
            )
            .unwrap()
            .build();
        assert_eq!(plan.schema().names(), vec!["town", "2019", "2020"]);
    }

    #[test]
    fn test_melt_schema() {
        let plan = sales()
            .melt(
                vec![Column::new("town")],
                vec![Column::new("year"), Column::new("value")],
                "variable",
                "v",
            )
            .unwrap()
            .build();
        let schema = plan.schema();
        assert_eq!(schema.names(), vec!["town", "variable", "v"]);
        assert_eq!(schema.field(2).unwrap().data_type, DataType::Float64);
    }

    #[test]
    fn test_window_and_select_extraction() {
        let plan = sales()
            .select(vec![
                col("town"),
                col("value").rank(RankMethod::Dense, true).alias("rank"),
            ])
            .unwrap()
            .build();
        assert_eq!(plan.schema().names(), vec!["town", "rank"]);
        match &*plan.root {
            LogicalOperator::Projection(p) => {
                assert!(matches!(&*p.input, LogicalOperator::Window(_)))
            }
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn test_window_name_collision() {
        let err = sales()
            .window(vec![col("value").sum().over(vec![col("town")])])
            .unwrap_err();
        assert_eq!(err, PlanError::DuplicateColumn("value".into()));
    }

    #[test]
    fn test_rolling_validation() {
        let period = Period::parse("3d").unwrap();
        let ok = sales().rolling(
            Column::new("date"),
            period,
            vec![],
            vec![col("value").mean().alias("value_3d")],
        );
        assert_eq!(ok.unwrap().schema().len(), 5);

        let bad_index = sales().rolling(Column::new("town"), period, vec![], vec![]);
        assert!(matches!(bad_index, Err(PlanError::TypeMismatch(_))));

        let bad_agg = sales().rolling(
            Column::new("date"),
            period,
            vec![],
            vec![col("value").first().alias("f")],
        );
        assert!(matches!(bad_agg, Err(PlanError::InvalidPlan(_))));
    }

    #[test]
    fn test_union_modes() {
        let a = sales().select(vec![col("year"), col("town")]).unwrap().into_arc();
        let b = sales().select(vec![col("town"), col("value")]).unwrap().into_arc();

        assert!(LogicalPlanBuilder::union(vec![a.clone(), b.clone()], UnionMode::Vertical).is_err());

        let diagonal = LogicalPlanBuilder::union(vec![a.clone(), b], UnionMode::Diagonal).unwrap();
        assert_eq!(diagonal.schema().names(), vec!["year", "town", "value"]);
        assert!(diagonal.schema().field(0).unwrap().nullable);

        let c = sales()
            .select(vec![col("town").alias("year"), col("town")])
            .unwrap()
            .into_arc();
        assert!(LogicalPlanBuilder::union(vec![a.clone(), c.clone()], UnionMode::Diagonal).is_err());
        let relaxed = LogicalPlanBuilder::union(vec![a, c], UnionMode::DiagonalRelaxed).unwrap();
        assert_eq!(relaxed.schema().field(0).unwrap().data_type, DataType::Utf8);
    }

    #[test]
    fn test_alias_qualifies() {
        let plan = sales().alias("s").unwrap().build();
        assert_eq!(plan.schema().field(0).unwrap().qualified_name(), "s.year");
    }
}
