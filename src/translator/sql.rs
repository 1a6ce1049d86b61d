// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Lowering of SQL queries into the algebra.
//!
//! A structural walk over the [`sqlparser`] AST. `SELECT` becomes the usual
//! stack of scan, selection, grouping, projection, ordering and a `rownum`
//! selection for `LIMIT`/`OFFSET`. The output is a set, so a query without
//! `DISTINCT` gets a non-fatal warning instead of bag semantics.

use sqlparser::ast::{
    BinaryOperator, DataType as SqlDataType, Distinct, Expr as SqlExpr, FunctionArg,
    FunctionArgExpr, FunctionArguments, GroupByExpr, JoinConstraint, JoinOperator, Query, Select,
    SelectItem, SetExpr, SetOperator, SetQuantifier, TableFactor, TableWithJoins, UnaryOperator,
    Value,
};
use tracing::warn;

use super::{ErrorKind, Result};
use crate::algebra::{AggCall, AggKind, JoinCondition, JoinOp, OrderKey, Plan};
use crate::catalog::RootCatalog;
use crate::expr::{BinaryOp, ColumnRef, Expr, UnaryOp};
use crate::types::{ConvertError, Date, DataValue};

/// Row products above this make a cross join worth a warning.
const CROSS_JOIN_WARN_ROWS: usize = 1_000_000;

/// Translate a SQL query against a catalog.
pub fn translate(query: Query, catalog: &RootCatalog) -> Result {
    bind_query(query, catalog)
}

fn bind_query(query: Query, catalog: &RootCatalog) -> Result {
    if query.with.is_some() {
        return Err(ErrorKind::Unsupported("WITH".into()).into());
    }
    let mut plan = bind_set_expr(*query.body, catalog)?;
    if let Some(order_by) = query.order_by {
        let keys = order_by
            .exprs
            .into_iter()
            .map(|e| {
                Ok(OrderKey {
                    column: column_ref(&e.expr)?,
                    descending: e.asc == Some(false),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        plan = Plan::order_by(plan, keys);
    }
    bind_limit(plan, query.limit, query.offset)
}

fn bind_set_expr(body: SetExpr, catalog: &RootCatalog) -> Result {
    match body {
        SetExpr::Select(select) => bind_select(*select, catalog),
        SetExpr::Query(query) => Ok(bind_query(*query, catalog)?.into_parenthesized()),
        SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
        } => {
            let l = bind_set_expr(*left, catalog)?;
            let r = bind_set_expr(*right, catalog)?;
            let mut plan = match op {
                SetOperator::Union => Plan::union(l, r),
                SetOperator::Intersect => Plan::intersect(l, r),
                SetOperator::Except => Plan::difference(l, r),
                #[allow(unreachable_patterns)]
                op => return Err(ErrorKind::Unsupported(format!("set operator {op}")).into()),
            };
            if set_quantifier == SetQuantifier::All {
                plan.add_warning(
                    "ALL is ignored: set semantics cannot preserve duplicates",
                    None,
                );
            }
            Ok(plan)
        }
        body => Err(ErrorKind::Unsupported(format!("set expression {body}")).into()),
    }
}

fn bind_select(select: Select, catalog: &RootCatalog) -> Result {
    let mut plan = bind_from(select.from, catalog)?;

    if let Some(selection) = select.selection {
        plan = Plan::selection(plan, bind_expr(&selection)?);
    }

    let group_keys = match &select.group_by {
        GroupByExpr::All(_) => return Err(ErrorKind::Unsupported("GROUP BY ALL".into()).into()),
        GroupByExpr::Expressions(exprs, _) => exprs
            .iter()
            .map(column_ref)
            .collect::<Result<Vec<_>>>()?,
    };

    // collect aggregate calls from the select list; HAVING may add more
    let mut aggregates: Vec<AggCall> = Vec::new();
    let mut wildcard = false;
    let mut items: Vec<(ColumnRef, Option<String>)> = Vec::new();
    for item in select.projection {
        match item {
            SelectItem::Wildcard(_) => wildcard = true,
            SelectItem::UnnamedExpr(expr) => {
                items.push((projection_item(&expr, &mut aggregates)?, None));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                items.push((
                    projection_item(&expr, &mut aggregates)?,
                    Some(alias.value),
                ));
            }
            item => {
                return Err(ErrorKind::Unsupported(format!("select item {item}")).into());
            }
        }
    }
    let having = select
        .having
        .map(|h| bind_having(h, &mut aggregates))
        .transpose()?;

    if !group_keys.is_empty() || !aggregates.is_empty() {
        plan = Plan::group_by(plan, group_keys, aggregates);
    }
    if let Some(having) = having {
        plan = Plan::selection(plan, having);
    }

    if !wildcard && !items.is_empty() {
        plan = Plan::projection(plan, items.iter().map(|(c, _)| c.clone()).collect());
        let mapping: Vec<(String, String)> = items
            .into_iter()
            .filter_map(|(c, alias)| alias.map(|a| (c.name, a)))
            .collect();
        if !mapping.is_empty() {
            plan = Plan::rename_columns(plan, mapping);
        }
    }

    match select.distinct {
        None => plan.add_warning(
            "SELECT without DISTINCT is translated under set semantics; \
             duplicate rows are not preserved",
            None,
        ),
        Some(Distinct::Distinct) => {}
        Some(distinct) => {
            return Err(ErrorKind::Unsupported(format!("DISTINCT {distinct}")).into());
        }
    }
    Ok(plan)
}

fn bind_from(tables: Vec<TableWithJoins>, catalog: &RootCatalog) -> Result {
    let mut plan: Option<Plan> = None;
    for table in tables {
        let right = bind_table_with_joins(table, catalog)?;
        plan = Some(match plan {
            Some(left) => cross_join(left, right),
            None => right,
        });
    }
    plan.ok_or_else(|| ErrorKind::Unsupported("SELECT without FROM".into()).into())
}

fn cross_join(left: Plan, right: Plan) -> Plan {
    let mut plan = Plan::cross_join(left, right);
    let estimate = plan.estimated_rows();
    if estimate > CROSS_JOIN_WARN_ROWS {
        warn!(estimate, "cross join may produce a huge result");
        plan.add_warning(
            format!("cross join may produce up to {estimate} rows"),
            None,
        );
    }
    plan
}

fn bind_table_with_joins(table: TableWithJoins, catalog: &RootCatalog) -> Result {
    let mut plan = bind_table_factor(table.relation, catalog)?;
    for join in table.joins {
        let right = bind_table_factor(join.relation, catalog)?;
        plan = match join.join_operator {
            JoinOperator::CrossJoin => cross_join(plan, right),
            JoinOperator::Inner(c) => Plan::join(JoinOp::Inner, bind_constraint(c)?, plan, right),
            JoinOperator::LeftOuter(c) => {
                Plan::join(JoinOp::LeftOuter, bind_constraint(c)?, plan, right)
            }
            JoinOperator::RightOuter(c) => {
                Plan::join(JoinOp::RightOuter, bind_constraint(c)?, plan, right)
            }
            JoinOperator::FullOuter(c) => {
                Plan::join(JoinOp::FullOuter, bind_constraint(c)?, plan, right)
            }
            op => return Err(ErrorKind::Unsupported(format!("join type {op:?}")).into()),
        };
    }
    Ok(plan)
}

fn bind_table_factor(factor: TableFactor, catalog: &RootCatalog) -> Result {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let name = name.to_string();
            let table = catalog
                .get_table(&name)
                .ok_or(ErrorKind::UnknownRelation(name))?;
            let mut plan = Plan::relation((*table).clone());
            if let Some(alias) = alias {
                plan = Plan::rename_relation(plan, alias.name.value);
            }
            Ok(plan)
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            let mut plan = bind_query(*subquery, catalog)?.into_parenthesized();
            if let Some(alias) = alias {
                plan = Plan::rename_relation(plan, alias.name.value);
            }
            Ok(plan)
        }
        TableFactor::NestedJoin {
            table_with_joins,
            alias,
        } => {
            let mut plan = bind_table_with_joins(*table_with_joins, catalog)?.into_parenthesized();
            if let Some(alias) = alias {
                plan = Plan::rename_relation(plan, alias.name.value);
            }
            Ok(plan)
        }
        factor => Err(ErrorKind::Unsupported(format!("table factor {factor}")).into()),
    }
}

fn bind_constraint(constraint: JoinConstraint) -> Result<JoinCondition> {
    Ok(match constraint {
        JoinConstraint::On(expr) => JoinCondition::Theta(bind_expr(&expr)?),
        JoinConstraint::Using(columns) => JoinCondition::Natural {
            columns: Some(columns.iter().map(|c| c.to_string()).collect()),
        },
        JoinConstraint::Natural => JoinCondition::Natural { columns: None },
        // a bare JOIN behaves like a cross join
        JoinConstraint::None => JoinCondition::Theta(Expr::value(true)),
    })
}

/// A select item is either a column or an aggregate call; aggregates are
/// registered on the enclosing `GroupBy` and referenced by output name.
fn projection_item(expr: &SqlExpr, aggregates: &mut Vec<AggCall>) -> Result<ColumnRef> {
    if let Some(agg) = aggregate_call(expr)? {
        let name = agg.output_name();
        if !aggregates.contains(&agg) {
            aggregates.push(agg);
        }
        return Ok(ColumnRef::new(name));
    }
    column_ref(expr)
}

/// Rewrite a HAVING expression, replacing aggregate calls with references to
/// the aggregate's output column.
fn bind_having(expr: SqlExpr, aggregates: &mut Vec<AggCall>) -> Result<Expr> {
    if let Some(agg) = aggregate_call(&expr)? {
        let name = agg.output_name();
        if !aggregates.contains(&agg) {
            aggregates.push(agg);
        }
        return Ok(Expr::col(name));
    }
    match expr {
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::binary(
            binary_op(&op)?,
            bind_having(*left, aggregates)?,
            bind_having(*right, aggregates)?,
        )),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => Ok(bind_having(*expr, aggregates)?.not()),
        SqlExpr::Nested(expr) => bind_having(*expr, aggregates),
        expr => bind_expr(&expr),
    }
}

/// Recognise an aggregate function call.
fn aggregate_call(expr: &SqlExpr) -> Result<Option<AggCall>> {
    let SqlExpr::Function(func) = expr else {
        return Ok(None);
    };
    let name = func.name.to_string().to_lowercase();
    let kind = match name.as_str() {
        "count" => AggKind::Count,
        "sum" => AggKind::Sum,
        "min" => AggKind::Min,
        "max" => AggKind::Max,
        "avg" => AggKind::Avg,
        _ => return Ok(None),
    };
    let FunctionArguments::List(list) = &func.args else {
        return Err(ErrorKind::Unsupported(format!("arguments of {name}")).into());
    };
    let [arg] = list.args.as_slice() else {
        return Err(ErrorKind::Unsupported(format!("{name} takes one argument")).into());
    };
    match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
            if kind != AggKind::Count {
                return Err(ErrorKind::Unsupported(format!("{name}(*)")).into());
            }
            Ok(Some(AggCall::new(AggKind::RowCount, None)))
        }
        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => {
            Ok(Some(AggCall::new(kind, Some(column_ref(expr)?))))
        }
        arg => Err(ErrorKind::Unsupported(format!("argument {arg}")).into()),
    }
}

fn column_ref(expr: &SqlExpr) -> Result<ColumnRef> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(ColumnRef::new(&ident.value)),
        SqlExpr::CompoundIdentifier(idents) => match idents.as_slice() {
            [table, column] => Ok(ColumnRef::qualified(&table.value, &column.value)),
            _ => Err(ErrorKind::Unsupported(format!("identifier {expr}")).into()),
        },
        expr => Err(ErrorKind::Unsupported(format!("expected a column, got {expr}")).into()),
    }
}

fn bind_expr(expr: &SqlExpr) -> Result<Expr> {
    match expr {
        SqlExpr::Identifier(_) | SqlExpr::CompoundIdentifier(_) => {
            Ok(Expr::Column(column_ref(expr)?))
        }
        SqlExpr::Value(value) => Ok(Expr::Constant(bind_value(value)?)),
        SqlExpr::TypedString {
            data_type: SqlDataType::Date,
            value,
        } => {
            let date: Date = value
                .parse()
                .map_err(|_| ErrorKind::Convert(ConvertError::ParseDate(value.clone())))?;
            Ok(Expr::value(date))
        }
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::binary(
            binary_op(op)?,
            bind_expr(left)?,
            bind_expr(right)?,
        )),
        SqlExpr::UnaryOp { op, expr } => {
            let inner = bind_expr(expr)?;
            match op {
                UnaryOperator::Not => Ok(inner.not()),
                UnaryOperator::Minus => Ok(Expr::unary(UnaryOp::Neg, inner)),
                UnaryOperator::Plus => Ok(inner),
                op => Err(ErrorKind::Unsupported(format!("unary operator {op}")).into()),
            }
        }
        SqlExpr::Nested(expr) => bind_expr(expr),
        SqlExpr::IsNull(expr) => Ok(Expr::unary(UnaryOp::IsNull, bind_expr(expr)?)),
        SqlExpr::IsNotNull(expr) => Ok(Expr::unary(UnaryOp::IsNull, bind_expr(expr)?).not()),
        SqlExpr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let value = bind_expr(expr)?;
            let between = Expr::binary(BinaryOp::GtEq, value.clone(), bind_expr(low)?)
                .and(Expr::binary(BinaryOp::LtEq, value, bind_expr(high)?));
            Ok(if *negated { between.not() } else { between })
        }
        SqlExpr::Function(func) => {
            if aggregate_call(expr)?.is_some() {
                return Err(
                    ErrorKind::Unsupported("aggregate call outside SELECT/HAVING".into()).into(),
                );
            }
            let name = func.name.to_string().to_lowercase();
            let FunctionArguments::List(list) = &func.args else {
                return Err(ErrorKind::Unsupported(format!("arguments of {name}")).into());
            };
            let args = list
                .args
                .iter()
                .map(|arg| match arg {
                    FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => bind_expr(e),
                    arg => Err(ErrorKind::Unsupported(format!("argument {arg}")).into()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Expr::Function { name, args })
        }
        expr => Err(ErrorKind::Unsupported(format!("expression {expr}")).into()),
    }
}

fn bind_value(value: &Value) -> Result<DataValue> {
    Ok(match value {
        Value::Number(n, _) => DataValue::Number(
            n.parse()
                .map_err(|_| ErrorKind::Convert(ConvertError::ParseNumber(n.clone())))?,
        ),
        Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
            DataValue::String(s.clone())
        }
        Value::Boolean(b) => DataValue::Bool(*b),
        Value::Null => DataValue::Null,
        value => return Err(ErrorKind::Unsupported(format!("literal {value}")).into()),
    })
}

fn binary_op(op: &BinaryOperator) -> Result<BinaryOp> {
    use BinaryOperator::*;
    Ok(match op {
        Eq => BinaryOp::Eq,
        NotEq => BinaryOp::NotEq,
        Lt => BinaryOp::Lt,
        LtEq => BinaryOp::LtEq,
        Gt => BinaryOp::Gt,
        GtEq => BinaryOp::GtEq,
        And => BinaryOp::And,
        Or => BinaryOp::Or,
        Plus => BinaryOp::Add,
        Minus => BinaryOp::Sub,
        Multiply => BinaryOp::Mul,
        Divide => BinaryOp::Div,
        Modulo => BinaryOp::Mod,
        StringConcat => BinaryOp::Concat,
        op => return Err(ErrorKind::Unsupported(format!("operator {op}")).into()),
    })
}

/// Lower `LIMIT n OFFSET k` to a selection over the synthetic `rownum`
/// expression: `rownum > k and rownum <= n + k`. `n = -1` means no upper
/// bound.
fn bind_limit(
    plan: Plan,
    limit: Option<SqlExpr>,
    offset: Option<sqlparser::ast::Offset>,
) -> Result {
    if limit.is_none() && offset.is_none() {
        return Ok(plan);
    }
    let n = match &limit {
        Some(expr) => constant_i64(expr)?,
        None => -1,
    };
    let k = match &offset {
        Some(offset) => constant_i64(&offset.value)?,
        None => 0,
    };
    let lower = Expr::binary(BinaryOp::Gt, Expr::RowNum, Expr::value(k as f64));
    let predicate = if n < 0 {
        lower
    } else {
        lower.and(Expr::binary(
            BinaryOp::LtEq,
            Expr::RowNum,
            Expr::value((n + k) as f64),
        ))
    };
    Ok(Plan::selection(plan, predicate))
}

fn constant_i64(expr: &SqlExpr) -> Result<i64> {
    match expr {
        SqlExpr::Value(Value::Number(n, _)) => n
            .parse()
            .map_err(|_| ErrorKind::Convert(ConvertError::ParseNumber(n.clone())).into()),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => Ok(-constant_i64(expr)?),
        expr => Err(ErrorKind::Unsupported(format!("expected a constant, got {expr}")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnCatalog, TableCatalog};
    use crate::executor::execute;
    use crate::parser::{ast::Statement, parse};
    use crate::types::DataType;

    fn catalog() -> RootCatalog {
        let catalog = RootCatalog::new();
        catalog
            .add_table(
                TableCatalog::new(
                    "r",
                    vec![
                        ColumnCatalog::new("a", DataType::Number),
                        ColumnCatalog::new("b", DataType::String),
                    ],
                    vec![
                        vec![1.into(), "a".into()],
                        vec![3.into(), "c".into()],
                        vec![4.into(), "d".into()],
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        catalog
            .add_table(
                TableCatalog::new(
                    "s",
                    vec![
                        ColumnCatalog::new("b", DataType::String),
                        ColumnCatalog::new("d", DataType::Number),
                    ],
                    vec![
                        vec!["a".into(), 100.into()],
                        vec!["c".into(), 400.into()],
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        catalog
    }

    fn plan(sql: &str) -> Plan {
        let mut stmts = parse(sql).unwrap();
        let Statement::Query(query) = stmts.remove(0) else {
            panic!("expected a query");
        };
        translate(*query, &catalog()).unwrap()
    }

    #[test]
    fn select_where() {
        let plan = plan("SELECT DISTINCT a FROM r WHERE a > 2");
        assert_eq!(
            plan.to_string(),
            "Projection: a\n  Selection: (a > 2)\n    Relation: r\n"
        );
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.sorted_rows(), vec![vec![3.into()], vec![4.into()]]);
    }

    #[test]
    fn missing_distinct_warns() {
        let plan1 = plan("SELECT a FROM r");
        assert_eq!(plan1.collect_warnings().len(), 1);
        let plan2 = plan("SELECT DISTINCT a FROM r");
        assert!(plan2.collect_warnings().is_empty());
    }

    #[test]
    fn natural_join() {
        let plan = plan("SELECT DISTINCT * FROM r NATURAL JOIN s");
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.schema().to_string(), "r.a, r.b, s.d");
        assert_eq!(chunk.len(), 2);
    }

    #[test]
    fn join_on() {
        let plan = plan("SELECT DISTINCT * FROM r JOIN s ON r.b = s.b");
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.schema().to_string(), "r.a, r.b, s.b, s.d");
        assert_eq!(chunk.len(), 2);
    }

    #[test]
    fn join_using() {
        let plan = plan("SELECT DISTINCT * FROM r JOIN s USING (b)");
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.schema().to_string(), "r.a, r.b, s.d");
        assert_eq!(chunk.len(), 2);
    }

    #[test]
    fn left_outer_join() {
        let plan = plan("SELECT DISTINCT * FROM r LEFT JOIN s ON r.b = s.b");
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn set_operations() {
        let plan1 = plan("SELECT DISTINCT b FROM r UNION SELECT DISTINCT b FROM s");
        assert_eq!(execute(&plan1).unwrap().len(), 3);
        let plan2 = plan("SELECT DISTINCT b FROM r EXCEPT SELECT DISTINCT b FROM s");
        assert_eq!(
            execute(&plan2).unwrap().rows().to_vec(),
            vec![vec!["d".into()]]
        );
        let plan3 = plan("SELECT DISTINCT b FROM r UNION ALL SELECT DISTINCT b FROM s");
        assert_eq!(plan3.collect_warnings().len(), 1);
    }

    #[test]
    fn limit_offset_lowers_to_rownum() {
        let plan = plan("SELECT DISTINCT a FROM r ORDER BY a LIMIT 2 OFFSET 1");
        assert!(plan
            .to_string()
            .contains("Selection: ((rownum > 1) and (rownum <= 3))"));
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.rows().to_vec(), vec![vec![3.into()], vec![4.into()]]);
    }

    #[test]
    fn offset_alone_has_no_upper_bound() {
        let plan = plan("SELECT DISTINCT a FROM r ORDER BY a OFFSET 1");
        assert!(plan.to_string().contains("Selection: (rownum > 1)"));
        assert_eq!(execute(&plan).unwrap().len(), 2);
    }

    #[test]
    fn group_by_having() {
        let plan = plan(
            "SELECT DISTINCT b, count(*) FROM r GROUP BY b HAVING count(*) >= 1",
        );
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.schema().to_string(), "r.b, count(*)");
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn aggregate_without_group_by() {
        let plan = plan("SELECT DISTINCT count(*), sum(a) FROM r");
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.rows().to_vec(), vec![vec![3.into(), 8.into()]]);
    }

    #[test]
    fn alias_renames_output() {
        let plan = plan("SELECT DISTINCT a AS x FROM r");
        assert_eq!(plan.check().unwrap().to_string(), "r.x");
    }

    #[test]
    fn table_alias() {
        let plan = plan("SELECT DISTINCT t.a FROM r AS t WHERE t.a > 3");
        let chunk = execute(&plan).unwrap();
        assert_eq!(chunk.schema().to_string(), "t.a");
        assert_eq!(chunk.rows().to_vec(), vec![vec![4.into()]]);
    }

    #[test]
    fn unknown_table() {
        let mut stmts = parse("SELECT DISTINCT a FROM missing").unwrap();
        let Statement::Query(query) = stmts.remove(0) else {
            panic!("expected a query");
        };
        let err = translate(*query, &catalog()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnknownRelation("missing".into()));
    }

    #[test]
    fn computed_select_item_is_rejected() {
        let mut stmts = parse("SELECT DISTINCT a + 1 FROM r").unwrap();
        let Statement::Query(query) = stmts.remove(0) else {
            panic!("expected a query");
        };
        assert!(translate(*query, &catalog()).is_err());
    }
}
