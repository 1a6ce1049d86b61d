// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Lowering of a native relational-algebra AST into the algebra.
//!
//! The trivial path: the AST mirrors the operator vocabulary with relation
//! names still unresolved and join conditions still in surface syntax.
//! Lowering resolves relations against the catalog (copying each handle into
//! the tree) and decodes the join conditions.

use super::{ErrorKind, Result};
use crate::algebra::{
    AggCall, CodeRegion, JoinCondition, JoinOp, OrderKey, Plan, RawJoinCondition,
};
use crate::catalog::RootCatalog;
use crate::expr::{ColumnRef, Expr};

/// A surface relational-algebra expression.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgebraAst {
    Relation {
        name: String,
        region: Option<CodeRegion>,
    },
    Projection {
        child: Box<AlgebraAst>,
        columns: Vec<ColumnRef>,
    },
    Selection {
        child: Box<AlgebraAst>,
        predicate: Expr,
    },
    RenameRelation {
        child: Box<AlgebraAst>,
        alias: String,
    },
    RenameColumns {
        child: Box<AlgebraAst>,
        mapping: Vec<(String, String)>,
    },
    OrderBy {
        child: Box<AlgebraAst>,
        keys: Vec<OrderKey>,
    },
    GroupBy {
        child: Box<AlgebraAst>,
        keys: Vec<ColumnRef>,
        aggregates: Vec<AggCall>,
    },
    CrossJoin {
        left: Box<AlgebraAst>,
        right: Box<AlgebraAst>,
    },
    Join {
        op: JoinOp,
        condition: Option<RawJoinCondition>,
        left: Box<AlgebraAst>,
        right: Box<AlgebraAst>,
    },
    Union {
        left: Box<AlgebraAst>,
        right: Box<AlgebraAst>,
    },
    Intersect {
        left: Box<AlgebraAst>,
        right: Box<AlgebraAst>,
    },
    Difference {
        left: Box<AlgebraAst>,
        right: Box<AlgebraAst>,
    },
    Division {
        left: Box<AlgebraAst>,
        right: Box<AlgebraAst>,
    },
}

/// Translate a relational-algebra AST against a catalog.
pub fn translate(ast: &AlgebraAst, catalog: &RootCatalog) -> Result {
    use AlgebraAst::*;
    Ok(match ast {
        Relation { name, region } => {
            let table = catalog
                .get_table(name)
                .ok_or_else(|| ErrorKind::UnknownRelation(name.clone()).at(region.as_ref()))?;
            Plan::relation((*table).clone()).with_region(region.clone())
        }
        Projection { child, columns } => {
            Plan::projection(translate(child, catalog)?, columns.clone())
        }
        Selection { child, predicate } => {
            Plan::selection(translate(child, catalog)?, predicate.clone())
        }
        RenameRelation { child, alias } => {
            Plan::rename_relation(translate(child, catalog)?, alias.clone())
        }
        RenameColumns { child, mapping } => {
            Plan::rename_columns(translate(child, catalog)?, mapping.clone())
        }
        OrderBy { child, keys } => Plan::order_by(translate(child, catalog)?, keys.clone()),
        GroupBy {
            child,
            keys,
            aggregates,
        } => Plan::group_by(translate(child, catalog)?, keys.clone(), aggregates.clone()),
        CrossJoin { left, right } => {
            Plan::cross_join(translate(left, catalog)?, translate(right, catalog)?)
        }
        Join {
            op,
            condition,
            left,
            right,
        } => Plan::join(
            *op,
            JoinCondition::decode(condition.clone()),
            translate(left, catalog)?,
            translate(right, catalog)?,
        ),
        Union { left, right } => {
            Plan::union(translate(left, catalog)?, translate(right, catalog)?)
        }
        Intersect { left, right } => {
            Plan::intersect(translate(left, catalog)?, translate(right, catalog)?)
        }
        Difference { left, right } => {
            Plan::difference(translate(left, catalog)?, translate(right, catalog)?)
        }
        Division { left, right } => {
            Plan::division(translate(left, catalog)?, translate(right, catalog)?)
        }
    })
}

impl AlgebraAst {
    pub fn relation(name: impl Into<String>) -> AlgebraAst {
        AlgebraAst::Relation {
            name: name.into(),
            region: None,
        }
    }

    pub fn join(
        op: JoinOp,
        condition: Option<RawJoinCondition>,
        left: AlgebraAst,
        right: AlgebraAst,
    ) -> AlgebraAst {
        AlgebraAst::Join {
            op,
            condition,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
