// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Schema resolution and validation of plan trees.

use super::{AggCall, AggKind, JoinCondition, JoinOp, Plan, PlanKind};
use crate::catalog::{Field, Schema, SchemaError};
use crate::expr::ExprError;
use crate::types::DataType;

/// The error type of plan validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("predicate {1} must be boolean, got {0}")]
    NotBoolean(DataType, String),
    #[error("schemas are not union-compatible: ({0}) vs ({1})")]
    Incompatible(String, String),
    #[error("natural join column {0:?} must appear on both sides")]
    MissingJoinColumn(String),
    #[error("division mismatch: {0}")]
    DivisionMismatch(String),
    #[error("aggregate {0} requires a number argument, got {1}")]
    AggregateType(String, DataType),
}

impl Plan {
    /// Resolve and validate the output schema of the tree, bottom-up. The
    /// resolved schema is cached on each node, so repeated calls are cheap.
    pub fn check(&self) -> Result<&Schema, PlanError> {
        if let Some(schema) = self.schema.get() {
            return Ok(schema);
        }
        let schema = self.compute_schema()?;
        Ok(self.schema.get_or_init(|| schema))
    }

    /// The schema resolved by an earlier [`check`](Plan::check), if any.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.get()
    }

    fn compute_schema(&self) -> Result<Schema, PlanError> {
        use PlanKind::*;
        match &self.kind {
            Relation(table) => Ok(table.schema()),
            Projection { child, columns } => {
                let input = child.check()?;
                let fields = columns
                    .iter()
                    .map(|col| col.resolve(input).map(|i| input.fields()[i].clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Schema::new(fields))
            }
            Selection { child, predicate } => {
                let input = child.check()?;
                let ty = predicate.datatype(input)?;
                if !ty.is_compatible_with(DataType::Boolean) {
                    return Err(PlanError::NotBoolean(ty, predicate.to_string()));
                }
                Ok(input.clone())
            }
            RenameRelation { child, alias } => Ok(child.check()?.qualified(alias)),
            RenameColumns { child, mapping } => {
                let input = child.check()?;
                let mut fields = input.fields().to_vec();
                for (from, to) in mapping {
                    let i = input.resolve(None, from)?;
                    fields[i].name = to.clone();
                }
                Ok(Schema::new(fields))
            }
            OrderBy { child, keys } => {
                let input = child.check()?;
                for key in keys {
                    key.column.resolve(input)?;
                }
                Ok(input.clone())
            }
            GroupBy {
                child,
                keys,
                aggregates,
            } => {
                let input = child.check()?;
                let mut fields = keys
                    .iter()
                    .map(|col| col.resolve(input).map(|i| input.fields()[i].clone()))
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                for agg in aggregates {
                    fields.push(aggregate_field(agg, input)?);
                }
                Ok(Schema::new(fields))
            }
            CrossJoin { left, right } => {
                let mut fields = left.check()?.fields().to_vec();
                fields.extend_from_slice(right.check()?.fields());
                Ok(Schema::new(fields))
            }
            Join {
                op,
                condition,
                left,
                right,
            } => join_schema(*op, condition, left, right),
            Union { left, right } | Intersect { left, right } | Difference { left, right } => {
                let l = left.check()?;
                let r = right.check()?;
                if !l.is_union_compatible_with(r) {
                    return Err(PlanError::Incompatible(l.to_string(), r.to_string()));
                }
                Ok(l.clone())
            }
            Division { left, right } => {
                let l = left.check()?;
                let r = right.check()?;
                for field in r.fields() {
                    let i = l.resolve(None, &field.name).map_err(|_| {
                        PlanError::DivisionMismatch(format!(
                            "column {:?} not in the left input",
                            field.name
                        ))
                    })?;
                    if !l.fields()[i].datatype.is_compatible_with(field.datatype) {
                        return Err(PlanError::DivisionMismatch(format!(
                            "column {:?} has incompatible types",
                            field.name
                        )));
                    }
                }
                let fields = l
                    .fields()
                    .iter()
                    .filter(|f| r.fields().iter().all(|g| g.name != f.name))
                    .cloned()
                    .collect();
                Ok(Schema::new(fields))
            }
        }
    }
}

fn aggregate_field(agg: &AggCall, input: &Schema) -> Result<Field, PlanError> {
    let arg_type = match (&agg.kind, &agg.arg) {
        (AggKind::RowCount, _) | (_, None) => None,
        (_, Some(arg)) => Some(input.fields()[arg.resolve(input)?].datatype),
    };
    let datatype = match agg.kind {
        AggKind::RowCount | AggKind::Count => DataType::Number,
        AggKind::Sum | AggKind::Avg => {
            let ty = arg_type.unwrap_or(DataType::Null);
            if !ty.is_compatible_with(DataType::Number) {
                return Err(PlanError::AggregateType(agg.output_name(), ty));
            }
            DataType::Number
        }
        AggKind::Min | AggKind::Max => arg_type.unwrap_or(DataType::Null),
    };
    Ok(Field::new(None, &agg.output_name(), datatype))
}

fn join_schema(
    op: JoinOp,
    condition: &JoinCondition,
    left: &Plan,
    right: &Plan,
) -> Result<Schema, PlanError> {
    let l = left.check()?;
    let r = right.check()?;

    // validate the condition against both inputs
    let pairs = match condition {
        JoinCondition::Natural { columns } => {
            let pairs = l
                .natural_join_pairs(r, columns.as_deref())
                .map_err(|e| match e {
                    SchemaError::NotFound(name) => PlanError::MissingJoinColumn(name),
                    e => PlanError::Schema(e),
                })?;
            for &(i, j) in &pairs {
                if !l.fields()[i]
                    .datatype
                    .is_compatible_with(r.fields()[j].datatype)
                {
                    return Err(PlanError::Incompatible(l.to_string(), r.to_string()));
                }
            }
            pairs
        }
        JoinCondition::Theta(predicate) => {
            let mut combined = l.fields().to_vec();
            combined.extend_from_slice(r.fields());
            let combined = Schema::new(combined);
            let ty = predicate.datatype(&combined)?;
            if !ty.is_compatible_with(DataType::Boolean) {
                return Err(PlanError::NotBoolean(ty, predicate.to_string()));
            }
            Vec::new()
        }
    };

    match op {
        JoinOp::LeftSemi | JoinOp::Anti => Ok(l.clone()),
        JoinOp::RightSemi => Ok(r.clone()),
        JoinOp::Inner | JoinOp::LeftOuter | JoinOp::RightOuter | JoinOp::FullOuter => {
            let mut fields = l.fields().to_vec();
            match condition {
                JoinCondition::Natural { .. } => {
                    // paired columns appear once, with the left qualifier
                    fields.extend(
                        r.fields()
                            .iter()
                            .enumerate()
                            .filter(|(j, _)| pairs.iter().all(|&(_, rj)| rj != *j))
                            .map(|(_, f)| f.clone()),
                    );
                }
                JoinCondition::Theta(_) => fields.extend_from_slice(r.fields()),
            }
            Ok(Schema::new(fields))
        }
    }
}
