// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Join conditions and their surface-syntax decoder.

use std::fmt;

use itertools::Itertools;

use crate::expr::Expr;

/// The condition of a join node.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    /// Equate like-named columns. With `columns`, only the listed ones.
    Natural { columns: Option<Vec<String>> },
    /// An arbitrary boolean predicate over the combined schema.
    Theta(Expr),
}

/// The condition as it appears in a surface AST, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RawJoinCondition {
    Columns(Vec<String>),
    On(Expr),
}

impl JoinCondition {
    /// Decode the optional surface syntax: nothing means a natural join, a
    /// column list restricts the natural join to those columns, a boolean
    /// expression makes a theta join.
    pub fn decode(raw: Option<RawJoinCondition>) -> JoinCondition {
        match raw {
            None => JoinCondition::Natural { columns: None },
            Some(RawJoinCondition::Columns(columns)) => JoinCondition::Natural {
                columns: Some(columns),
            },
            Some(RawJoinCondition::On(expr)) => JoinCondition::Theta(expr),
        }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinCondition::Natural { columns: None } => write!(f, "natural"),
            JoinCondition::Natural {
                columns: Some(columns),
            } => write!(f, "natural ({})", columns.iter().format(", ")),
            JoinCondition::Theta(expr) => write!(f, "on {expr}"),
        }
    }
}
