// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Evaluation of plan trees over in-memory relations.
//!
//! The executor is synchronous and works under set semantics: the output of
//! every operator is deduplicated. It only reads the relation copies embedded
//! in the tree, never the catalog, so a tree evaluates the same regardless of
//! what happened to the catalog since translation.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use itertools::Itertools;

use crate::algebra::{AggCall, AggKind, JoinCondition, JoinOp, Plan, PlanError, PlanKind};
use crate::catalog::Schema;
use crate::expr::ExprError;
use crate::types::{DataValue, Row};

/// The result of evaluating a plan: a schema and the deduplicated rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    schema: Schema,
    rows: Vec<Row>,
}

impl Chunk {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows as a sorted set, for order-insensitive comparisons in tests.
    pub fn sorted_rows(&self) -> Vec<Row> {
        let mut rows = self.rows.clone();
        rows.sort();
        rows
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.schema)?;
        for row in &self.rows {
            writeln!(f, "{}", row.iter().format(", "))?;
        }
        Ok(())
    }
}

/// The error type of plan evaluation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExecuteError {
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("expression error: {0}")]
    Expr(#[from] ExprError),
}

/// Evaluate a plan tree. Checks the tree first if the caller has not.
pub fn execute(plan: &Plan) -> Result<Chunk, ExecuteError> {
    let schema = plan.check()?.clone();
    let rows = eval_plan(plan)?;
    Ok(Chunk { schema, rows })
}

fn eval_plan(plan: &Plan) -> Result<Vec<Row>, ExecuteError> {
    use PlanKind::*;
    let rows = match &plan.kind {
        Relation(table) => table.rows().to_vec(),
        Projection { child, columns } => {
            let input = child.check()?;
            let indices = columns
                .iter()
                .map(|col| col.resolve(input))
                .collect::<Result<Vec<_>, _>>()
                .map_err(PlanError::from)?;
            eval_plan(child)?
                .into_iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect()
        }
        Selection { child, predicate } => {
            let input = child.check()?;
            let mut out = Vec::new();
            for (i, row) in eval_plan(child)?.into_iter().enumerate() {
                if predicate.eval(input, &row, i + 1)? == DataValue::Bool(true) {
                    out.push(row);
                }
            }
            out
        }
        RenameRelation { child, .. } | RenameColumns { child, .. } => eval_plan(child)?,
        OrderBy { child, keys } => {
            let input = child.check()?;
            let key_indices = keys
                .iter()
                .map(|key| key.column.resolve(input).map(|i| (i, key.descending)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(PlanError::from)?;
            let mut rows = eval_plan(child)?;
            rows.sort_by(|a, b| {
                for &(i, descending) in &key_indices {
                    let ord = a[i].cmp(&b[i]);
                    let ord = if descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
            rows
        }
        GroupBy {
            child,
            keys,
            aggregates,
        } => eval_group_by(child, keys, aggregates)?,
        CrossJoin { left, right } => {
            let lrows = eval_plan(left)?;
            let rrows = eval_plan(right)?;
            lrows
                .iter()
                .cartesian_product(&rrows)
                .map(|(l, r)| l.iter().chain(r).cloned().collect())
                .collect()
        }
        Join {
            op,
            condition,
            left,
            right,
        } => eval_join(*op, condition, left, right)?,
        Union { left, right } => {
            let mut rows = eval_plan(left)?;
            rows.extend(eval_plan(right)?);
            rows
        }
        Intersect { left, right } => {
            let rset: HashSet<Row> = eval_plan(right)?.into_iter().collect();
            eval_plan(left)?
                .into_iter()
                .filter(|row| rset.contains(row))
                .collect()
        }
        Difference { left, right } => {
            let rset: HashSet<Row> = eval_plan(right)?.into_iter().collect();
            eval_plan(left)?
                .into_iter()
                .filter(|row| !rset.contains(row))
                .collect()
        }
        Division { left, right } => eval_division(left, right)?,
    };
    Ok(dedup(rows))
}

fn dedup(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.clone()))
        .collect()
}

/// Pairs of (left index, right index) the natural join equates.
fn shared_indices(
    condition: &JoinCondition,
    l: &Schema,
    r: &Schema,
) -> Result<Vec<(usize, usize)>, PlanError> {
    match condition {
        JoinCondition::Natural { columns } => {
            Ok(l.natural_join_pairs(r, columns.as_deref()).map_err(PlanError::from)?)
        }
        JoinCondition::Theta(_) => Ok(Vec::new()),
    }
}

fn eval_join(
    op: JoinOp,
    condition: &JoinCondition,
    left: &Plan,
    right: &Plan,
) -> Result<Vec<Row>, ExecuteError> {
    let lschema = left.check()?.clone();
    let rschema = right.check()?.clone();
    let lrows = eval_plan(left)?;
    let rrows = eval_plan(right)?;

    let shared = shared_indices(condition, &lschema, &rschema)?;
    let combined = {
        let mut fields = lschema.fields().to_vec();
        fields.extend_from_slice(rschema.fields());
        Schema::new(fields)
    };
    // nulls never match, in natural and theta joins alike
    let matches = |lrow: &Row, rrow: &Row| -> Result<bool, ExecuteError> {
        match condition {
            JoinCondition::Natural { .. } => Ok(shared
                .iter()
                .all(|&(li, ri)| !lrow[li].is_null() && lrow[li] == rrow[ri])),
            JoinCondition::Theta(predicate) => {
                let row: Row = lrow.iter().chain(rrow).cloned().collect();
                Ok(predicate.eval(&combined, &row, 1)? == DataValue::Bool(true))
            }
        }
    };

    // right columns that survive a natural join
    let right_kept: Vec<usize> = (0..rschema.len())
        .filter(|i| shared.iter().all(|&(_, ri)| ri != *i))
        .collect();
    let compose = |lrow: &Row, rrow: &Row| -> Row {
        match condition {
            JoinCondition::Natural { .. } => lrow
                .iter()
                .cloned()
                .chain(right_kept.iter().map(|&i| rrow[i].clone()))
                .collect(),
            JoinCondition::Theta(_) => lrow.iter().chain(rrow).cloned().collect(),
        }
    };
    let width = match condition {
        JoinCondition::Natural { .. } => lschema.len() + right_kept.len(),
        JoinCondition::Theta(_) => lschema.len() + rschema.len(),
    };

    let mut out = Vec::new();
    match op {
        JoinOp::LeftSemi | JoinOp::Anti => {
            for lrow in &lrows {
                let mut matched = false;
                for rrow in &rrows {
                    if matches(lrow, rrow)? {
                        matched = true;
                        break;
                    }
                }
                if matched == (op == JoinOp::LeftSemi) {
                    out.push(lrow.clone());
                }
            }
        }
        JoinOp::RightSemi => {
            for rrow in &rrows {
                for lrow in &lrows {
                    if matches(lrow, rrow)? {
                        out.push(rrow.clone());
                        break;
                    }
                }
            }
        }
        JoinOp::Inner | JoinOp::LeftOuter | JoinOp::RightOuter | JoinOp::FullOuter => {
            let mut rmatched = vec![false; rrows.len()];
            for lrow in &lrows {
                let mut matched = false;
                for (ri, rrow) in rrows.iter().enumerate() {
                    if matches(lrow, rrow)? {
                        matched = true;
                        rmatched[ri] = true;
                        out.push(compose(lrow, rrow));
                    }
                }
                if !matched && matches!(op, JoinOp::LeftOuter | JoinOp::FullOuter) {
                    let mut row = lrow.clone();
                    row.resize(width, DataValue::Null);
                    out.push(row);
                }
            }
            if matches!(op, JoinOp::RightOuter | JoinOp::FullOuter) {
                for (ri, rrow) in rrows.iter().enumerate() {
                    if rmatched[ri] {
                        continue;
                    }
                    let mut row = vec![DataValue::Null; width];
                    match condition {
                        JoinCondition::Natural { .. } => {
                            // shared columns live on the left side of the output
                            for &(li, rsi) in &shared {
                                row[li] = rrow[rsi].clone();
                            }
                            for (out_i, &ri2) in right_kept.iter().enumerate() {
                                row[lschema.len() + out_i] = rrow[ri2].clone();
                            }
                        }
                        JoinCondition::Theta(_) => {
                            for (i, value) in rrow.iter().enumerate() {
                                row[lschema.len() + i] = value.clone();
                            }
                        }
                    }
                    out.push(row);
                }
            }
        }
    }
    Ok(out)
}

fn eval_group_by(
    child: &Plan,
    keys: &[crate::expr::ColumnRef],
    aggregates: &[AggCall],
) -> Result<Vec<Row>, ExecuteError> {
    let input = child.check()?;
    let key_indices = keys
        .iter()
        .map(|col| col.resolve(input))
        .collect::<Result<Vec<_>, _>>()
        .map_err(PlanError::from)?;
    let agg_indices = aggregates
        .iter()
        .map(|agg| match &agg.arg {
            Some(arg) => arg.resolve(input).map(Some),
            None => Ok(None),
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(PlanError::from)?;
    let rows = eval_plan(child)?;

    // groups in first-seen order; no keys means one global group,
    // present even for empty input
    let mut order: Vec<Vec<DataValue>> = Vec::new();
    let mut groups: HashMap<Vec<DataValue>, Vec<&Row>> = HashMap::new();
    if key_indices.is_empty() {
        order.push(Vec::new());
        groups.insert(Vec::new(), rows.iter().collect());
    } else {
        for row in &rows {
            let key: Vec<DataValue> = key_indices.iter().map(|&i| row[i].clone()).collect();
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(row);
        }
    }

    let mut out = Vec::new();
    for key in order {
        let members = &groups[&key];
        let mut row = key.clone();
        for (agg, &arg_index) in aggregates.iter().zip(&agg_indices) {
            row.push(eval_aggregate(agg.kind, arg_index, members));
        }
        out.push(row);
    }
    Ok(out)
}

fn eval_aggregate(kind: AggKind, arg_index: Option<usize>, rows: &[&Row]) -> DataValue {
    if kind == AggKind::RowCount || arg_index.is_none() {
        return DataValue::from(rows.len() as f64);
    }
    let i = arg_index.unwrap();
    let values = rows.iter().map(|row| &row[i]).filter(|v| !v.is_null());
    match kind {
        AggKind::RowCount => unreachable!(),
        AggKind::Count => DataValue::from(values.count() as f64),
        AggKind::Min => values.min().cloned().unwrap_or(DataValue::Null),
        AggKind::Max => values.max().cloned().unwrap_or(DataValue::Null),
        AggKind::Sum | AggKind::Avg => {
            let numbers: Vec<f64> = values
                .filter_map(|v| match v {
                    DataValue::Number(n) => Some(n.into_inner()),
                    _ => None,
                })
                .collect();
            if numbers.is_empty() {
                return DataValue::Null;
            }
            let sum: f64 = numbers.iter().sum();
            match kind {
                AggKind::Sum => DataValue::from(sum),
                _ => DataValue::from(sum / numbers.len() as f64),
            }
        }
    }
}

fn eval_division(left: &Plan, right: &Plan) -> Result<Vec<Row>, ExecuteError> {
    let l = left.check()?;
    let r = right.check()?;
    let lrows = eval_plan(left)?;
    let rrows = eval_plan(right)?;

    let remainder = r
        .fields()
        .iter()
        .map(|field| l.resolve(None, &field.name))
        .collect::<Result<Vec<_>, _>>()
        .map_err(PlanError::from)?;
    let quotient: Vec<usize> = (0..l.len()).filter(|i| !remainder.contains(i)).collect();

    let mut order: Vec<Vec<DataValue>> = Vec::new();
    let mut groups: HashMap<Vec<DataValue>, HashSet<Vec<DataValue>>> = HashMap::new();
    for row in &lrows {
        let key: Vec<DataValue> = quotient.iter().map(|&i| row[i].clone()).collect();
        let value: Vec<DataValue> = remainder.iter().map(|&i| row[i].clone()).collect();
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                HashSet::new()
            })
            .insert(value);
    }
    Ok(order
        .into_iter()
        .filter(|key| {
            let seen = &groups[key];
            rrows.iter().all(|rrow| seen.contains(rrow))
        })
        .collect())
}
