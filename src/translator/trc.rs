// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Lowering of tuple relational calculus into the algebra.
//!
//! A TRC query `{ t.a, t.b | Φ(t) }` is declarative: Φ combines relation
//! predicates `R(t)`, comparisons, the connectives `and`/`or`/`implies`,
//! negation and the quantifiers `exists`/`forAll`. The translator rewrites
//! it into an operator tree by structural recursion over Φ, threading two
//! pieces of state:
//!
//! - `base`, the tree producing the current universe of tuples. It starts
//!   as the relation bound to the outer tuple variable and grows by a cross
//!   join whenever a quantifier introduces a new variable.
//! - `negated`, whether an odd number of negations is pending above the
//!   current node. Negation is never materialised as an operator: the
//!   De Morgan and implication rewrites push it inward, and the leaves
//!   resolve it with set differences and semi-joins.
//!
//! Universal quantification is eliminated up front (`forAll v: Φ` becomes
//! `not exists v: not Φ`), so only the existential case is translated.

use std::collections::HashMap;

use tracing::debug;

use super::{ErrorKind, Result};
use crate::algebra::{CodeRegion, Plan};
use crate::catalog::RootCatalog;
use crate::executor;
use crate::expr::{BinaryOp, ColumnRef, Expr};
use crate::types::DataValue;

/// A TRC query: the set constructor `{ variable.projections | formula }`.
/// An empty projection list keeps the whole tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct TrcQuery {
    pub variable: String,
    pub projections: Vec<String>,
    pub formula: Formula,
    pub region: Option<CodeRegion>,
}

impl TrcQuery {
    pub fn new(
        variable: impl Into<String>,
        projections: &[&str],
        formula: Formula,
    ) -> TrcQuery {
        TrcQuery {
            variable: variable.into(),
            projections: projections.iter().map(|p| p.to_string()).collect(),
            formula,
            region: None,
        }
    }
}

/// A reference to an attribute of a tuple variable, `variable.attribute`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrRef {
    pub variable: String,
    pub attribute: String,
}

impl AttrRef {
    pub fn new(variable: impl Into<String>, attribute: impl Into<String>) -> AttrRef {
        AttrRef {
            variable: variable.into(),
            attribute: attribute.into(),
        }
    }
}

/// The right side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Attribute(AttrRef),
    Value(DataValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl From<CompareOp> for BinaryOp {
    fn from(op: CompareOp) -> BinaryOp {
        match op {
            CompareOp::Eq => BinaryOp::Eq,
            CompareOp::NotEq => BinaryOp::NotEq,
            CompareOp::Lt => BinaryOp::Lt,
            CompareOp::LtEq => BinaryOp::LtEq,
            CompareOp::Gt => BinaryOp::Gt,
            CompareOp::GtEq => BinaryOp::GtEq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
    Implies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Exists,
    ForAll,
}

/// A TRC formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// `R(v)`: binds the tuple variable `v` to the relation `R`.
    Relation {
        variable: String,
        relation: String,
        region: Option<CodeRegion>,
    },
    /// `v.a op (w.b | constant)`.
    Comparison {
        left: AttrRef,
        op: CompareOp,
        right: Operand,
        region: Option<CodeRegion>,
    },
    Not {
        formula: Box<Formula>,
        region: Option<CodeRegion>,
    },
    Logical {
        op: Connective,
        left: Box<Formula>,
        right: Box<Formula>,
        region: Option<CodeRegion>,
    },
    Quantified {
        quantifier: Quantifier,
        variable: String,
        formula: Box<Formula>,
        region: Option<CodeRegion>,
    },
}

impl Formula {
    pub fn relation(relation: impl Into<String>, variable: impl Into<String>) -> Formula {
        Formula::Relation {
            variable: variable.into(),
            relation: relation.into(),
            region: None,
        }
    }

    pub fn cmp(left: AttrRef, op: CompareOp, right: Operand) -> Formula {
        Formula::Comparison {
            left,
            op,
            right,
            region: None,
        }
    }

    pub fn not(formula: Formula) -> Formula {
        Formula::Not {
            formula: Box::new(formula),
            region: None,
        }
    }

    pub fn and(left: Formula, right: Formula) -> Formula {
        Formula::logical(Connective::And, left, right)
    }

    pub fn or(left: Formula, right: Formula) -> Formula {
        Formula::logical(Connective::Or, left, right)
    }

    pub fn implies(left: Formula, right: Formula) -> Formula {
        Formula::logical(Connective::Implies, left, right)
    }

    pub fn logical(op: Connective, left: Formula, right: Formula) -> Formula {
        Formula::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
            region: None,
        }
    }

    pub fn exists(variable: impl Into<String>, formula: Formula) -> Formula {
        Formula::quantified(Quantifier::Exists, variable, formula)
    }

    pub fn for_all(variable: impl Into<String>, formula: Formula) -> Formula {
        Formula::quantified(Quantifier::ForAll, variable, formula)
    }

    pub fn quantified(
        quantifier: Quantifier,
        variable: impl Into<String>,
        formula: Formula,
    ) -> Formula {
        Formula::Quantified {
            quantifier,
            variable: variable.into(),
            formula: Box::new(formula),
            region: None,
        }
    }

    pub fn with_region(mut self, new: CodeRegion) -> Formula {
        match &mut self {
            Formula::Relation { region, .. }
            | Formula::Comparison { region, .. }
            | Formula::Not { region, .. }
            | Formula::Logical { region, .. }
            | Formula::Quantified { region, .. } => *region = Some(new),
        }
        self
    }

    pub fn region(&self) -> Option<&CodeRegion> {
        match self {
            Formula::Relation { region, .. }
            | Formula::Comparison { region, .. }
            | Formula::Not { region, .. }
            | Formula::Logical { region, .. }
            | Formula::Quantified { region, .. } => region.as_ref(),
        }
    }

    /// Whether the formula mentions the tuple variable anywhere.
    fn mentions(&self, variable: &str) -> bool {
        match self {
            Formula::Relation { variable: v, .. } => v == variable,
            Formula::Comparison { left, right, .. } => {
                left.variable == variable
                    || matches!(right, Operand::Attribute(attr) if attr.variable == variable)
            }
            Formula::Not { formula, .. } => formula.mentions(variable),
            Formula::Logical { left, right, .. } => {
                left.mentions(variable) || right.mentions(variable)
            }
            Formula::Quantified { formula, .. } => formula.mentions(variable),
        }
    }
}

/// The reference environment: which relation each tuple variable ranges
/// over, collected from the `R(v)` atoms in a pre-pass. Bindings are
/// write-once; binding one variable to two relations is an error.
#[derive(Debug, Default)]
struct Environment {
    bindings: HashMap<String, String>,
}

impl Environment {
    fn collect(&mut self, formula: &Formula) -> Result<()> {
        match formula {
            Formula::Relation {
                variable,
                relation,
                region,
            } => {
                match self.bindings.get(variable) {
                    Some(existing) if existing != relation => {
                        return Err(ErrorKind::ConflictingVariable(
                            variable.clone(),
                            existing.clone(),
                            relation.clone(),
                        )
                        .at(region.as_ref()));
                    }
                    _ => {
                        self.bindings.insert(variable.clone(), relation.clone());
                    }
                }
                Ok(())
            }
            Formula::Comparison { .. } => Ok(()),
            Formula::Not { formula, .. } | Formula::Quantified { formula, .. } => {
                self.collect(formula)
            }
            Formula::Logical { left, right, .. } => {
                self.collect(left)?;
                self.collect(right)
            }
        }
    }

    fn relation_of(&self, variable: &str) -> Option<&str> {
        self.bindings.get(variable).map(String::as_str)
    }
}

/// Translate a TRC query against a catalog.
pub fn translate(query: &TrcQuery, catalog: &RootCatalog) -> Result {
    let mut env = Environment::default();
    env.collect(&query.formula)?;
    let translator = Translator {
        catalog,
        env,
        outer: query.variable.clone(),
    };
    let base = translator.relation_plan(&query.variable, query.region.as_ref())?;
    let plan = translator.rec(&query.formula, Some(&base), false)?;
    debug!("translated TRC formula:\n{plan}");
    if query.projections.is_empty() {
        return Ok(plan);
    }
    // the projection targets are attributes of the outer variable's relation
    let relation = translator
        .env
        .relation_of(&query.variable)
        .expect("outer variable resolved above")
        .to_string();
    let columns = query
        .projections
        .iter()
        .map(|name| ColumnRef::qualified(&relation, name))
        .collect();
    Ok(Plan::projection(plan, columns).with_region(query.region.clone()))
}

struct Translator<'a> {
    catalog: &'a RootCatalog,
    env: Environment,
    /// The outer tuple variable `t*`, bound by the set constructor.
    outer: String,
}

impl Translator<'_> {
    /// A fresh leaf for the relation a variable is bound to.
    fn relation_plan(&self, variable: &str, region: Option<&CodeRegion>) -> Result {
        let relation = self
            .env
            .relation_of(variable)
            .ok_or_else(|| ErrorKind::UnboundVariable(variable.into()).at(region))?;
        let table = self
            .catalog
            .get_table(relation)
            .ok_or_else(|| ErrorKind::UnknownRelation(relation.into()).at(region))?;
        Ok(Plan::relation((*table).clone()))
    }

    fn rec(&self, formula: &Formula, base: Option<&Plan>, negated: bool) -> Result {
        match formula {
            Formula::Relation {
                relation, region, ..
            } => {
                // the normalisation rules rewrite negations away before they
                // can reach a bare relation predicate
                if negated {
                    return Err(ErrorKind::NegatedRelationPredicate.at(region.as_ref()));
                }
                let table = self.catalog.get_table(relation).ok_or_else(|| {
                    ErrorKind::UnknownRelation(relation.clone()).at(region.as_ref())
                })?;
                Ok(Plan::relation((*table).clone()).with_region(region.clone()))
            }

            Formula::Not { formula, .. } => self.rec(formula, base, !negated),

            Formula::Logical {
                op,
                left,
                right,
                region,
            } => {
                // a relation predicate on the left only contributes its
                // binding, which the pre-pass has already recorded
                if matches!(**left, Formula::Relation { .. }) {
                    return self.rec(right, base, negated);
                }
                match (op, negated) {
                    // p -> q  ==  not p or q;  not (p -> q)  ==  p and not q
                    (Connective::Implies, false) => self.rec(
                        &Formula::or(Formula::not((**left).clone()), (**right).clone()),
                        base,
                        false,
                    ),
                    (Connective::Implies, true) => self.rec(
                        &Formula::and((**left).clone(), Formula::not((**right).clone())),
                        base,
                        false,
                    ),
                    // De Morgan
                    (Connective::Or, true) => self.rec(
                        &Formula::and(
                            Formula::not((**left).clone()),
                            Formula::not((**right).clone()),
                        ),
                        base,
                        false,
                    ),
                    (Connective::And, true) => self.rec(
                        &Formula::or(
                            Formula::not((**left).clone()),
                            Formula::not((**right).clone()),
                        ),
                        base,
                        false,
                    ),
                    (Connective::Or, false) => Ok(Plan::union(
                        self.rec(left, base, false)?,
                        self.rec(right, base, false)?,
                    )
                    .with_region(region.clone())),
                    (Connective::And, false) => Ok(Plan::intersect(
                        self.rec(left, base, false)?,
                        self.rec(right, base, false)?,
                    )
                    .with_region(region.clone())),
                }
            }

            Formula::Quantified {
                quantifier: Quantifier::ForAll,
                variable,
                formula,
                region,
            } => {
                // forAll v: p  ==  not exists v: not p
                let rewritten = Formula::Quantified {
                    quantifier: Quantifier::Exists,
                    variable: variable.clone(),
                    formula: Box::new(Formula::not((**formula).clone())),
                    region: region.clone(),
                };
                self.rec(&rewritten, base, !negated)
            }

            Formula::Quantified {
                quantifier: Quantifier::Exists,
                variable,
                formula,
                region,
            } => {
                let base = base.ok_or_else(|| ErrorKind::NullBase.at(region.as_ref()))?;
                let bound = self.relation_plan(variable, region.as_ref())?;
                let joined = Plan::cross_join(bound, base.clone());
                let subtree = self.rec(formula, Some(&joined), false)?;

                if !formula.mentions(&self.outer) {
                    // Uncorrelated: the subformula is a plain truth value, so
                    // the result is all of `base` or nothing. Evaluate its
                    // cardinality now and gate with schema-preserving trees.
                    subtree
                        .check()
                        .map_err(|e| ErrorKind::Plan(e).at(region.as_ref()))?;
                    let cardinality = executor::execute(&subtree)
                        .map_err(|e| ErrorKind::Execute(e).at(region.as_ref()))?
                        .len();
                    debug!(cardinality, "uncorrelated existential");
                    let gate = if (cardinality > 0) ^ negated {
                        Plan::union(base.clone(), Plan::semi_join(base.clone(), subtree))
                    } else {
                        Plan::difference(base.clone(), base.clone())
                    };
                    return Ok(gate.with_region(region.clone()));
                }

                let semi = Plan::semi_join(base.clone(), subtree);
                Ok(if negated {
                    Plan::difference(base.clone(), semi)
                } else {
                    semi
                }
                .with_region(region.clone()))
            }

            Formula::Comparison {
                left,
                op,
                right,
                region,
            } => {
                // a != b  ==  not (a = b)
                if *op == CompareOp::NotEq {
                    let rewritten = Formula::Not {
                        formula: Box::new(Formula::Comparison {
                            left: left.clone(),
                            op: CompareOp::Eq,
                            right: right.clone(),
                            region: region.clone(),
                        }),
                        region: region.clone(),
                    };
                    return self.rec(&rewritten, base, negated);
                }
                let base = base.ok_or_else(|| ErrorKind::NullBase.at(region.as_ref()))?;
                let predicate = self.convert_predicate(left, *op, right, region.as_ref())?;

                if !negated {
                    // the positive form: remove the tuples failing p
                    let selection = Plan::selection(base.clone(), predicate.not());
                    return Ok(
                        Plan::difference(base.clone(), selection).with_region(region.clone())
                    );
                }

                let selection = Plan::selection(base.clone(), predicate);
                if self.references_outer(left, right) {
                    // Restrict the negation to tuples of the outer variable
                    // actually involved in p: removing raw matches would also
                    // delete tuples of unrelated variables.
                    let outer = self.relation_plan(&self.outer, region.as_ref())?;
                    let involved = Plan::semi_join(outer, selection);
                    let matched = Plan::semi_join(base.clone(), involved);
                    Ok(Plan::difference(base.clone(), matched).with_region(region.clone()))
                } else {
                    Ok(Plan::difference(base.clone(), selection).with_region(region.clone()))
                }
            }
        }
    }

    fn references_outer(&self, left: &AttrRef, right: &Operand) -> bool {
        left.variable == self.outer
            || matches!(right, Operand::Attribute(attr) if attr.variable == self.outer)
    }

    /// Lower a comparison to a value expression, qualifying each attribute
    /// with the relation its tuple variable is bound to.
    fn convert_predicate(
        &self,
        left: &AttrRef,
        op: CompareOp,
        right: &Operand,
        region: Option<&CodeRegion>,
    ) -> Result<Expr> {
        let lhs = self.attr_expr(left, region)?;
        let rhs = match right {
            Operand::Attribute(attr) => self.attr_expr(attr, region)?,
            Operand::Value(value) => Expr::Constant(value.clone()),
        };
        Ok(Expr::binary(op.into(), lhs, rhs))
    }

    fn attr_expr(&self, attr: &AttrRef, region: Option<&CodeRegion>) -> Result<Expr> {
        let relation = self
            .env
            .relation_of(&attr.variable)
            .ok_or_else(|| ErrorKind::UnboundVariable(attr.variable.clone()).at(region))?;
        Ok(Expr::Column(ColumnRef::qualified(relation, &attr.attribute)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnCatalog, TableCatalog};
    use crate::types::DataType;

    fn catalog() -> RootCatalog {
        let catalog = RootCatalog::new();
        catalog
            .add_table(
                TableCatalog::new(
                    "R",
                    vec![
                        ColumnCatalog::new("a", DataType::Number),
                        ColumnCatalog::new("b", DataType::String),
                    ],
                    vec![
                        vec![1.into(), "a".into()],
                        vec![3.into(), "c".into()],
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        catalog
            .add_table(
                TableCatalog::new(
                    "S",
                    vec![
                        ColumnCatalog::new("b", DataType::String),
                        ColumnCatalog::new("d", DataType::Number),
                    ],
                    vec![vec!["a".into(), 100.into()]],
                )
                .unwrap(),
            )
            .unwrap();
        catalog
    }

    fn gt(variable: &str, attribute: &str, value: i32) -> Formula {
        Formula::cmp(
            AttrRef::new(variable, attribute),
            CompareOp::Gt,
            Operand::Value(value.into()),
        )
    }

    #[test]
    fn positive_predicate_is_difference_of_negated_selection() {
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::and(Formula::relation("R", "t"), gt("t", "a", 2)),
        );
        let plan = translate(&query, &catalog()).unwrap();
        assert_eq!(
            plan.to_string(),
            "Difference\n  Relation: R\n  Selection: (not (R.a > 2))\n    Relation: R\n"
        );
    }

    #[test]
    fn projection_is_qualified_with_the_bound_relation() {
        let query = TrcQuery::new("t", &["a"], Formula::relation("R", "t"));
        let plan = translate(&query, &catalog()).unwrap();
        assert_eq!(plan.check().unwrap().to_string(), "R.a");
    }

    #[test]
    fn unknown_relation() {
        let query = TrcQuery::new("t", &[], Formula::relation("Q", "t"));
        let err = translate(&query, &catalog()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnknownRelation("Q".into()));
    }

    #[test]
    fn unbound_variable() {
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::and(Formula::relation("R", "t"), gt("u", "a", 2)),
        );
        let err = translate(&query, &catalog()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnboundVariable("u".into()));
    }

    #[test]
    fn conflicting_bindings() {
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::and(Formula::relation("R", "t"), Formula::relation("S", "t")),
        );
        let err = translate(&query, &catalog()).unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ConflictingVariable("t".into(), "R".into(), "S".into())
        );
    }

    #[test]
    fn negated_relation_predicate() {
        let query = TrcQuery::new("t", &[], Formula::not(Formula::relation("R", "t")));
        let err = translate(&query, &catalog()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NegatedRelationPredicate);
    }

    #[test]
    fn error_carries_the_region() {
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::relation("Q", "t").with_region(CodeRegion::new(4, 8, "Q(t)")),
        );
        let err = translate(&query, &catalog()).unwrap_err();
        assert_eq!(err.region(), Some(&CodeRegion::new(4, 8, "Q(t)")));
    }

    #[test]
    fn correlated_exists_is_a_semi_join() {
        let body = Formula::and(
            Formula::relation("S", "s"),
            Formula::cmp(
                AttrRef::new("s", "b"),
                CompareOp::Eq,
                Operand::Attribute(AttrRef::new("t", "b")),
            ),
        );
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::and(Formula::relation("R", "t"), Formula::exists("s", body)),
        );
        let plan = translate(&query, &catalog()).unwrap();
        assert!(plan.to_string().starts_with("Join: left semi, natural"));
    }

    #[test]
    fn uncorrelated_exists_gates_to_all() {
        // exists s: S(s) and s.d > 0 is true, so the gate is the identity
        let body = Formula::and(Formula::relation("S", "s"), gt("s", "d", 0));
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::and(Formula::relation("R", "t"), Formula::exists("s", body)),
        );
        let plan = translate(&query, &catalog()).unwrap();
        assert!(plan.to_string().starts_with("Union"));
        assert_eq!(executor::execute(&plan).unwrap().len(), 2);
    }

    #[test]
    fn uncorrelated_exists_gates_to_zero() {
        let body = Formula::and(Formula::relation("S", "s"), gt("s", "d", 1000));
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::and(Formula::relation("R", "t"), Formula::exists("s", body)),
        );
        let plan = translate(&query, &catalog()).unwrap();
        assert!(plan.to_string().starts_with("Difference"));
        assert!(executor::execute(&plan).unwrap().is_empty());
    }

    #[test]
    fn schema_is_preserved_without_projection() {
        let query = TrcQuery::new(
            "t",
            &[],
            Formula::and(Formula::relation("R", "t"), gt("t", "a", 0)),
        );
        let plan = translate(&query, &catalog()).unwrap();
        assert_eq!(plan.check().unwrap().to_string(), "R.a, R.b");
    }
}
