// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! The relational-algebra operator tree.
//!
//! All three front ends (SQL, tuple relational calculus, native RA) lower
//! into this vocabulary. Nodes own their children; relations appearing as
//! leaves are copies of catalog entries, so a finished tree is independent
//! of later catalog changes.

use std::cell::OnceCell;
use std::fmt;

use itertools::Itertools;
use parse_display::Display;
use serde::Serialize;

use crate::catalog::{Schema, TableCatalog};
use crate::expr::{ColumnRef, Expr};

pub use self::check::PlanError;
pub use self::condition::{JoinCondition, RawJoinCondition};

mod check;
mod condition;

/// A byte span of the source text a node was derived from, for error
/// reporting and editor highlighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeRegion {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl CodeRegion {
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> CodeRegion {
        CodeRegion {
            start,
            end,
            text: text.into(),
        }
    }
}

impl fmt::Display for CodeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}: {:?}", self.start, self.end, self.text)
    }
}

/// A non-fatal diagnostic attached to a plan node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub region: Option<CodeRegion>,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum JoinOp {
    #[display("inner")]
    Inner,
    #[display("left outer")]
    LeftOuter,
    #[display("right outer")]
    RightOuter,
    #[display("full outer")]
    FullOuter,
    #[display("left semi")]
    LeftSemi,
    #[display("right semi")]
    RightSemi,
    #[display("anti")]
    Anti,
}

/// One sort key of an `OrderBy` node.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub column: ColumnRef,
    pub descending: bool,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    #[display("count")]
    RowCount,
    #[display("count")]
    Count,
    #[display("sum")]
    Sum,
    #[display("min")]
    Min,
    #[display("max")]
    Max,
    #[display("avg")]
    Avg,
}

/// One aggregate of a `GroupBy` node.
#[derive(Debug, Clone, PartialEq)]
pub struct AggCall {
    pub kind: AggKind,
    pub arg: Option<ColumnRef>,
    pub alias: Option<String>,
}

impl AggCall {
    pub fn new(kind: AggKind, arg: Option<ColumnRef>) -> AggCall {
        AggCall {
            kind,
            arg,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> AggCall {
        self.alias = Some(alias.into());
        self
    }

    /// The name of the output column.
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.arg {
            Some(arg) => format!("{}({})", self.kind, arg),
            None => format!("{}(*)", self.kind),
        }
    }
}

/// An operator of the algebra together with its children.
#[derive(Debug, Clone)]
pub enum PlanKind {
    /// A copied catalog relation.
    Relation(TableCatalog),
    Projection {
        child: Box<Plan>,
        columns: Vec<ColumnRef>,
    },
    Selection {
        child: Box<Plan>,
        predicate: Expr,
    },
    RenameRelation {
        child: Box<Plan>,
        alias: String,
    },
    RenameColumns {
        child: Box<Plan>,
        /// Pairs of `(old name, new name)`.
        mapping: Vec<(String, String)>,
    },
    OrderBy {
        child: Box<Plan>,
        keys: Vec<OrderKey>,
    },
    GroupBy {
        child: Box<Plan>,
        keys: Vec<ColumnRef>,
        aggregates: Vec<AggCall>,
    },
    CrossJoin {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    Join {
        op: JoinOp,
        condition: JoinCondition,
        left: Box<Plan>,
        right: Box<Plan>,
    },
    Union {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    Intersect {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    Difference {
        left: Box<Plan>,
        right: Box<Plan>,
    },
    Division {
        left: Box<Plan>,
        right: Box<Plan>,
    },
}

/// A node of the operator tree.
///
/// Carries the operator, the source region it was derived from, whether the
/// source wrapped it in parentheses (for round-tripping), warnings, and the
/// schema resolved by [`check`](Plan::check).
#[derive(Debug, Clone)]
pub struct Plan {
    pub kind: PlanKind,
    pub region: Option<CodeRegion>,
    pub parenthesized: bool,
    schema: OnceCell<Schema>,
    warnings: Vec<Warning>,
}

impl Plan {
    pub fn new(kind: PlanKind) -> Plan {
        Plan {
            kind,
            region: None,
            parenthesized: false,
            schema: OnceCell::new(),
            warnings: Vec::new(),
        }
    }

    pub fn relation(table: TableCatalog) -> Plan {
        Plan::new(PlanKind::Relation(table))
    }

    pub fn projection(child: Plan, columns: Vec<ColumnRef>) -> Plan {
        Plan::new(PlanKind::Projection {
            child: Box::new(child),
            columns,
        })
    }

    pub fn selection(child: Plan, predicate: Expr) -> Plan {
        Plan::new(PlanKind::Selection {
            child: Box::new(child),
            predicate,
        })
    }

    pub fn rename_relation(child: Plan, alias: impl Into<String>) -> Plan {
        Plan::new(PlanKind::RenameRelation {
            child: Box::new(child),
            alias: alias.into(),
        })
    }

    pub fn rename_columns(child: Plan, mapping: Vec<(String, String)>) -> Plan {
        Plan::new(PlanKind::RenameColumns {
            child: Box::new(child),
            mapping,
        })
    }

    pub fn order_by(child: Plan, keys: Vec<OrderKey>) -> Plan {
        Plan::new(PlanKind::OrderBy {
            child: Box::new(child),
            keys,
        })
    }

    pub fn group_by(child: Plan, keys: Vec<ColumnRef>, aggregates: Vec<AggCall>) -> Plan {
        Plan::new(PlanKind::GroupBy {
            child: Box::new(child),
            keys,
            aggregates,
        })
    }

    pub fn cross_join(left: Plan, right: Plan) -> Plan {
        Plan::new(PlanKind::CrossJoin {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn join(op: JoinOp, condition: JoinCondition, left: Plan, right: Plan) -> Plan {
        Plan::new(PlanKind::Join {
            op,
            condition,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// A natural left semi-join: the tuples of `left` with at least one
    /// match in `right`.
    pub fn semi_join(left: Plan, right: Plan) -> Plan {
        Plan::join(
            JoinOp::LeftSemi,
            JoinCondition::Natural { columns: None },
            left,
            right,
        )
    }

    pub fn union(left: Plan, right: Plan) -> Plan {
        Plan::new(PlanKind::Union {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn intersect(left: Plan, right: Plan) -> Plan {
        Plan::new(PlanKind::Intersect {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn difference(left: Plan, right: Plan) -> Plan {
        Plan::new(PlanKind::Difference {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn division(left: Plan, right: Plan) -> Plan {
        Plan::new(PlanKind::Division {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn with_region(mut self, region: Option<CodeRegion>) -> Plan {
        self.region = region;
        self
    }

    pub fn into_parenthesized(mut self) -> Plan {
        self.parenthesized = true;
        self
    }

    /// Record a non-fatal diagnostic on this node.
    pub fn add_warning(&mut self, message: impl Into<String>, region: Option<CodeRegion>) {
        self.warnings.push(Warning {
            message: message.into(),
            region,
        });
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// All warnings of the tree, pre-order.
    pub fn collect_warnings(&self) -> Vec<&Warning> {
        let mut out: Vec<&Warning> = self.warnings.iter().collect();
        for child in self.children() {
            out.extend(child.collect_warnings());
        }
        out
    }

    pub fn children(&self) -> Vec<&Plan> {
        use PlanKind::*;
        match &self.kind {
            Relation(_) => vec![],
            Projection { child, .. }
            | Selection { child, .. }
            | RenameRelation { child, .. }
            | RenameColumns { child, .. }
            | OrderBy { child, .. }
            | GroupBy { child, .. } => vec![child.as_ref()],
            CrossJoin { left, right }
            | Join { left, right, .. }
            | Union { left, right }
            | Intersect { left, right }
            | Difference { left, right }
            | Division { left, right } => vec![left.as_ref(), right.as_ref()],
        }
    }

    /// A crude upper bound on the number of rows this node may produce,
    /// used to warn about oversized cross joins.
    pub fn estimated_rows(&self) -> usize {
        use PlanKind::*;
        match &self.kind {
            Relation(table) => table.rows().len(),
            Projection { child, .. }
            | Selection { child, .. }
            | RenameRelation { child, .. }
            | RenameColumns { child, .. }
            | OrderBy { child, .. }
            | GroupBy { child, .. } => child.estimated_rows(),
            CrossJoin { left, right } => {
                left.estimated_rows().saturating_mul(right.estimated_rows())
            }
            Join {
                op: JoinOp::LeftSemi | JoinOp::Anti,
                left,
                ..
            } => left.estimated_rows(),
            Join {
                op: JoinOp::RightSemi,
                right,
                ..
            } => right.estimated_rows(),
            Join { left, right, .. } => {
                left.estimated_rows().saturating_mul(right.estimated_rows())
            }
            Union { left, right } => left.estimated_rows().saturating_add(right.estimated_rows()),
            Intersect { left, .. } | Difference { left, .. } | Division { left, .. } => {
                left.estimated_rows()
            }
        }
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        use PlanKind::*;
        for _ in 0..depth {
            write!(f, "  ")?;
        }
        match &self.kind {
            Relation(table) => writeln!(f, "Relation: {}", table.name())?,
            Projection { columns, .. } => {
                writeln!(f, "Projection: {}", columns.iter().format(", "))?
            }
            Selection { predicate, .. } => writeln!(f, "Selection: {predicate}")?,
            RenameRelation { alias, .. } => writeln!(f, "Rename: -> {alias}")?,
            RenameColumns { mapping, .. } => writeln!(
                f,
                "Rename: {}",
                mapping
                    .iter()
                    .format_with(", ", |(from, to), g| g(&format_args!("{from} -> {to}")))
            )?,
            OrderBy { keys, .. } => writeln!(
                f,
                "OrderBy: {}",
                keys.iter().format_with(", ", |key, g| g(&format_args!(
                    "{} {}",
                    key.column,
                    if key.descending { "desc" } else { "asc" }
                )))
            )?,
            GroupBy {
                keys, aggregates, ..
            } => writeln!(
                f,
                "GroupBy: [{}], aggs: [{}]",
                keys.iter().format(", "),
                aggregates
                    .iter()
                    .format_with(", ", |agg, g| g(&agg.output_name()))
            )?,
            CrossJoin { .. } => writeln!(f, "CrossJoin")?,
            Join { op, condition, .. } => writeln!(f, "Join: {op}, {condition}")?,
            Union { .. } => writeln!(f, "Union")?,
            Intersect { .. } => writeln!(f, "Intersect")?,
            Difference { .. } => writeln!(f, "Difference")?,
            Division { .. } => writeln!(f, "Division")?,
        }
        for child in self.children() {
            child.fmt_with(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnCatalog;
    use crate::types::DataType;

    fn table(name: &str, rows: usize) -> TableCatalog {
        TableCatalog::new(
            name,
            vec![ColumnCatalog::new("a", DataType::Number)],
            (0..rows).map(|i| vec![(i as i32).into()]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn estimated_rows_multiplies_cross_joins() {
        let plan = Plan::cross_join(
            Plan::relation(table("r", 2000)),
            Plan::relation(table("s", 600)),
        );
        assert_eq!(plan.estimated_rows(), 1_200_000);
    }

    #[test]
    fn warnings_are_collected_from_children() {
        let mut leaf = Plan::relation(table("r", 1));
        leaf.add_warning("leaf warning", None);
        let mut root = Plan::projection(leaf, vec![ColumnRef::new("a")]);
        root.add_warning("root warning", None);
        let warnings = root.collect_warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].message, "root warning");
    }

    #[test]
    fn display_indents_children() {
        let plan = Plan::selection(
            Plan::relation(table("r", 0)),
            Expr::binary(
                crate::expr::BinaryOp::Gt,
                Expr::col("a"),
                Expr::value(3.0),
            ),
        );
        assert_eq!(plan.to_string(), "Selection: (a > 3)\n  Relation: r\n");
    }
}
