//! SQL statement parsing and representation.
//!
//! Only read-only statements are supported: queries and EXPLAIN.

use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::{Expr, JoinType, OrderByExpr, ParseError, ParseResult, SetOpType, TableRef};

/// A parsed SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// A query.
    Query(QueryStatement),
    /// EXPLAIN query.
    Explain(Box<Statement>),
}

impl Statement {
    /// Converts from sqlparser's Statement.
    pub fn from_sql_ast(stmt: sql_ast::Statement) -> ParseResult<Self> {
        match stmt {
            sql_ast::Statement::Query(query) => {
                Ok(Statement::Query(QueryStatement::from_sql_ast(*query)?))
            }
            sql_ast::Statement::Explain { statement, .. } => {
                Ok(Statement::Explain(Box::new(Statement::from_sql_ast(*statement)?)))
            }
            _ => Err(ParseError::Unsupported(format!("Statement: {}", stmt))),
        }
    }

    /// Returns the query, unwrapping EXPLAIN.
    pub fn query(&self) -> &QueryStatement {
        match self {
            Statement::Query(q) => q,
            Statement::Explain(inner) => inner.query(),
        }
    }
}

/// A full query: optional CTEs, a set expression, ordering and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatement {
    /// WITH clause (Common Table Expressions).
    pub ctes: Vec<Cte>,
    /// Query body.
    pub body: SetExpr,
    /// ORDER BY clauses.
    pub order_by: Vec<OrderByExpr>,
    /// LIMIT clause.
    pub limit: Option<u64>,
    /// OFFSET clause.
    pub offset: Option<u64>,
}

impl QueryStatement {
    /// Converts from sqlparser's Query.
    pub fn from_sql_ast(query: sql_ast::Query) -> ParseResult<Self> {
        let ctes: ParseResult<Vec<_>> = query
            .with
            .map(|w| w.cte_tables.into_iter().map(Cte::from_sql_ast).collect())
            .unwrap_or_else(|| Ok(Vec::new()));

        let order_by: ParseResult<Vec<_>> = query
            .order_by
            .into_iter()
            .map(OrderByExpr::from_sql_ast)
            .collect();

        let limit = query.limit.map(|e| extract_limit(&e)).transpose()?;
        let offset = query.offset.map(|o| extract_limit(&o.value)).transpose()?;

        Ok(Self {
            ctes: ctes?,
            body: SetExpr::from_sql_ast(*query.body)?,
            order_by: order_by?,
            limit,
            offset,
        })
    }
}

/// Body of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetExpr {
    /// A SELECT block.
    Select(Box<SelectStatement>),
    /// UNION [ALL] of two bodies.
    SetOperation {
        /// Operation.
        op: SetOpType,
        /// Left input.
        left: Box<SetExpr>,
        /// Right input.
        right: Box<SetExpr>,
    },
    /// A parenthesized query.
    Query(Box<QueryStatement>),
}

impl SetExpr {
    /// Converts from sqlparser's SetExpr.
    pub fn from_sql_ast(body: sql_ast::SetExpr) -> ParseResult<Self> {
        match body {
            sql_ast::SetExpr::Select(select) => Ok(SetExpr::Select(Box::new(
                SelectStatement::from_sql_ast(*select)?,
            ))),
            sql_ast::SetExpr::Query(query) => Ok(SetExpr::Query(Box::new(
                QueryStatement::from_sql_ast(*query)?,
            ))),
            sql_ast::SetExpr::SetOperation {
                op: sql_ast::SetOperator::Union,
                set_quantifier,
                left,
                right,
            } => {
                let op = match set_quantifier {
                    sql_ast::SetQuantifier::All => SetOpType::UnionAll,
                    sql_ast::SetQuantifier::Distinct | sql_ast::SetQuantifier::None => {
                        SetOpType::Union
                    }
                    other => {
                        return Err(ParseError::Unsupported(format!("UNION {}", other)))
                    }
                };
                Ok(SetExpr::SetOperation {
                    op,
                    left: Box::new(SetExpr::from_sql_ast(*left)?),
                    right: Box::new(SetExpr::from_sql_ast(*right)?),
                })
            }
            other => Err(ParseError::Unsupported(format!("Set expression: {}", other))),
        }
    }
}

/// SELECT block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectStatement {
    /// Whether DISTINCT is specified.
    pub distinct: bool,
    /// Selected columns/expressions.
    pub columns: Vec<SelectItem>,
    /// FROM clause items.
    pub from: Vec<FromItem>,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
    /// GROUP BY expressions.
    pub group_by: Vec<Expr>,
    /// HAVING clause.
    pub having: Option<Expr>,
}

impl SelectStatement {
    /// Converts from sqlparser's Select.
    pub fn from_sql_ast(select: sql_ast::Select) -> ParseResult<Self> {
        let columns: ParseResult<Vec<_>> = select
            .projection
            .into_iter()
            .map(SelectItem::from_sql_ast)
            .collect();

        let from: ParseResult<Vec<_>> = select
            .from
            .into_iter()
            .map(FromItem::from_sql_ast)
            .collect();

        let where_clause = select.selection.map(Expr::from_sql_ast).transpose()?;

        let group_by: ParseResult<Vec<_>> = match select.group_by {
            sql_ast::GroupByExpr::Expressions(exprs) => {
                exprs.into_iter().map(Expr::from_sql_ast).collect()
            }
            sql_ast::GroupByExpr::All => {
                return Err(ParseError::Unsupported("GROUP BY ALL".to_string()))
            }
        };

        let having = select.having.map(Expr::from_sql_ast).transpose()?;

        let distinct = match select.distinct {
            None => false,
            Some(sql_ast::Distinct::Distinct) => true,
            Some(sql_ast::Distinct::On(_)) => {
                return Err(ParseError::Unsupported("DISTINCT ON".to_string()))
            }
        };

        Ok(Self {
            distinct,
            columns: columns?,
            from: from?,
            where_clause,
            group_by: group_by?,
            having,
        })
    }
}

/// A selected item (column or expression).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    /// The expression.
    pub expr: Expr,
    /// Optional alias.
    pub alias: Option<String>,
}

impl SelectItem {
    /// Creates a new select item.
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    /// Converts from sqlparser's SelectItem.
    pub fn from_sql_ast(item: sql_ast::SelectItem) -> ParseResult<Self> {
        match item {
            sql_ast::SelectItem::UnnamedExpr(expr) => Ok(Self {
                expr: Expr::from_sql_ast(expr)?,
                alias: None,
            }),
            sql_ast::SelectItem::ExprWithAlias { expr, alias } => Ok(Self {
                expr: Expr::from_sql_ast(expr)?,
                alias: Some(alias.value),
            }),
            sql_ast::SelectItem::Wildcard(_) => Ok(Self {
                expr: Expr::Wildcard,
                alias: None,
            }),
            sql_ast::SelectItem::QualifiedWildcard(name, _) => Ok(Self {
                expr: Expr::QualifiedWildcard(name.to_string()),
                alias: None,
            }),
        }
    }
}

/// A FROM clause item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromItem {
    /// A table reference.
    Table(TableRef),
    /// A joined table.
    Join {
        /// Left side.
        left: Box<FromItem>,
        /// Join type.
        join_type: JoinType,
        /// Right side.
        right: Box<FromItem>,
        /// Join condition.
        on: Option<Expr>,
        /// Columns named in USING (...).
        using: Vec<String>,
    },
    /// A subquery.
    Subquery {
        /// The subquery.
        query: Box<QueryStatement>,
        /// Alias.
        alias: String,
    },
}

impl FromItem {
    /// Creates a table reference.
    pub fn table(name: impl Into<String>) -> Self {
        FromItem::Table(TableRef::new(name))
    }

    /// Converts from sqlparser's TableWithJoins.
    pub fn from_sql_ast(table: sql_ast::TableWithJoins) -> ParseResult<Self> {
        let mut result = from_table_factor(table.relation)?;

        for join in table.joins {
            let right = from_table_factor(join.relation)?;
            let join_type = JoinType::from_sql_ast(&join.join_operator)?;
            let constraint = match &join.join_operator {
                sql_ast::JoinOperator::Inner(c)
                | sql_ast::JoinOperator::LeftOuter(c)
                | sql_ast::JoinOperator::RightOuter(c)
                | sql_ast::JoinOperator::FullOuter(c)
                | sql_ast::JoinOperator::LeftSemi(c)
                | sql_ast::JoinOperator::LeftAnti(c) => Some(c),
                _ => None,
            };
            let (on, using) = match constraint {
                Some(sql_ast::JoinConstraint::On(expr)) => {
                    (Some(Expr::from_sql_ast(expr.clone())?), Vec::new())
                }
                Some(sql_ast::JoinConstraint::Using(idents)) => {
                    (None, idents.iter().map(|i| i.value.clone()).collect())
                }
                Some(sql_ast::JoinConstraint::Natural) => {
                    return Err(ParseError::Unsupported("NATURAL JOIN".to_string()))
                }
                _ => (None, Vec::new()),
            };

            result = FromItem::Join {
                left: Box::new(result),
                join_type,
                right: Box::new(right),
                on,
                using,
            };
        }

        Ok(result)
    }
}

/// Converts a TableFactor to FromItem.
fn from_table_factor(factor: sql_ast::TableFactor) -> ParseResult<FromItem> {
    match factor {
        sql_ast::TableFactor::Table { name, alias, .. } => {
            let mut table_ref = TableRef::new(
                name.0
                    .iter()
                    .map(|i| i.value.clone())
                    .collect::<Vec<_>>()
                    .join("."),
            );
            if let Some(a) = alias {
                table_ref.alias = Some(a.name.value);
            }
            Ok(FromItem::Table(table_ref))
        }
        sql_ast::TableFactor::Derived {
            subquery, alias, ..
        } => {
            let alias = alias
                .ok_or_else(|| ParseError::Syntax("Subquery requires alias".to_string()))?
                .name
                .value;
            Ok(FromItem::Subquery {
                query: Box::new(QueryStatement::from_sql_ast(*subquery)?),
                alias,
            })
        }
        sql_ast::TableFactor::NestedJoin {
            table_with_joins,
            alias,
        } => {
            let mut result = FromItem::from_sql_ast(*table_with_joins)?;
            if let Some(a) = alias {
                if let FromItem::Table(ref mut t) = result {
                    t.alias = Some(a.name.value);
                }
            }
            Ok(result)
        }
        other => Err(ParseError::Unsupported(format!("Table factor: {}", other))),
    }
}

/// Common Table Expression (WITH clause).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cte {
    /// Name of the CTE.
    pub name: String,
    /// Column aliases.
    pub columns: Vec<String>,
    /// The query.
    pub query: QueryStatement,
}

impl Cte {
    /// Converts from sqlparser's Cte.
    pub fn from_sql_ast(cte: sql_ast::Cte) -> ParseResult<Self> {
        Ok(Self {
            name: cte.alias.name.value,
            columns: cte.alias.columns.into_iter().map(|c| c.value).collect(),
            query: QueryStatement::from_sql_ast(*cte.query)?,
        })
    }
}

/// Extracts a non-negative integer from a LIMIT or OFFSET expression.
fn extract_limit(expr: &sql_ast::Expr) -> ParseResult<u64> {
    match expr {
        sql_ast::Expr::Value(sql_ast::Value::Number(n, _)) => n
            .parse()
            .map_err(|_| ParseError::InvalidLiteral(format!("LIMIT {}", n))),
        other => Err(ParseError::Unsupported(format!("LIMIT expression: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn select_of(sql: &str) -> (QueryStatement, SelectStatement) {
        match Parser::parse_one(sql).unwrap() {
            Statement::Query(q) => match &q.body {
                SetExpr::Select(s) => {
                    let s = (**s).clone();
                    (q, s)
                }
                other => panic!("expected SELECT, got {:?}", other),
            },
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[test]
    fn test_select_statement() {
        let (query, select) =
            select_of("SELECT year, value FROM sales WHERE value > 100 ORDER BY year LIMIT 10");
        assert_eq!(select.columns.len(), 2);
        assert!(select.where_clause.is_some());
        assert_eq!(query.order_by.len(), 1);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_group_by_having() {
        let (_, select) = select_of(
            "SELECT year, avg(value) AS avg_value FROM sales GROUP BY year HAVING count(*) > 1",
        );
        assert_eq!(select.group_by.len(), 1);
        assert!(select.having.is_some());
        assert_eq!(select.columns[1].alias.as_deref(), Some("avg_value"));
    }

    #[test]
    fn test_join() {
        let (_, select) =
            select_of("SELECT * FROM a LEFT JOIN b ON a.Address = b.Address");
        match &select.from[0] {
            FromItem::Join { join_type, on, .. } => {
                assert_eq!(*join_type, JoinType::Left);
                assert!(on.is_some());
            }
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_join_using() {
        let (_, select) = select_of("SELECT * FROM a JOIN b USING (Address)");
        match &select.from[0] {
            FromItem::Join { using, .. } => assert_eq!(using, &vec!["Address".to_string()]),
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_union_all() {
        let stmt = Parser::parse_one("SELECT a FROM t1 UNION ALL SELECT a FROM t2").unwrap();
        match stmt.query().body {
            SetExpr::SetOperation { op, .. } => assert_eq!(op, SetOpType::UnionAll),
            ref other => panic!("expected set operation, got {:?}", other),
        }
    }

    #[test]
    fn test_subquery_and_cte() {
        let stmt = Parser::parse_one(
            "WITH big AS (SELECT * FROM sales WHERE value > 100) \
             SELECT t.year FROM (SELECT year FROM big) AS t",
        )
        .unwrap();
        let query = stmt.query();
        assert_eq!(query.ctes.len(), 1);
        assert_eq!(query.ctes[0].name, "big");
    }

    #[test]
    fn test_explain() {
        let stmt = Parser::parse_one("EXPLAIN SELECT 1").unwrap();
        assert!(matches!(stmt, Statement::Explain(_)));
    }
}
