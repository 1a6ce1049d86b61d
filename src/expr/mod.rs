// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! Value expressions.
//!
//! A value expression is a typed scalar tree over the columns of one schema:
//! constants, column references, operators and functions. All three front
//! ends lower into this shape, and the executor evaluates it row by row.

use std::cmp::Ordering;
use std::fmt;

use itertools::Itertools;
use parse_display::Display;

use crate::catalog::{Schema, SchemaError};
use crate::types::{DataType, DataValue, Row};

/// An optionally qualified column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> ColumnRef {
        ColumnRef {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> ColumnRef {
        ColumnRef {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn resolve(&self, schema: &Schema) -> Result<usize, SchemaError> {
        schema.resolve(self.table.as_deref(), &self.name)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    #[display("=")]
    Eq,
    #[display("<>")]
    NotEq,
    #[display("<")]
    Lt,
    #[display("<=")]
    LtEq,
    #[display(">")]
    Gt,
    #[display(">=")]
    GtEq,
    #[display("and")]
    And,
    #[display("or")]
    Or,
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Mod,
    #[display("||")]
    Concat,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | NotEq | Lt | LtEq | Gt | GtEq)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    #[display("not")]
    Not,
    #[display("-")]
    Neg,
    #[display("is null")]
    IsNull,
}

/// A value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Constant(DataValue),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// The 1-based position of the current row, used by the SQL front end to
    /// lower `LIMIT`/`OFFSET`.
    RowNum,
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Expr {
        Expr::Column(ColumnRef::new(name))
    }

    pub fn qcol(table: impl Into<String>, name: impl Into<String>) -> Expr {
        Expr::Column(ColumnRef::qualified(table, name))
    }

    pub fn value(v: impl Into<DataValue>) -> Expr {
        Expr::Constant(v.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Expr {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn not(self) -> Expr {
        Expr::unary(UnaryOp::Not, self)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Or, self, other)
    }

    /// Derive the type of the expression against a schema, resolving column
    /// references on the way. Fails on unknown columns and operand types the
    /// operator cannot accept.
    pub fn datatype(&self, schema: &Schema) -> Result<DataType, ExprError> {
        match self {
            Expr::Column(col) => Ok(schema.fields()[col.resolve(schema)?].datatype),
            Expr::Constant(v) => Ok(v.datatype()),
            Expr::Unary { op, expr } => {
                let arg = expr.datatype(schema)?;
                let ok = match op {
                    UnaryOp::Not => arg.is_compatible_with(DataType::Boolean),
                    UnaryOp::Neg => arg.is_compatible_with(DataType::Number),
                    UnaryOp::IsNull => true,
                };
                if !ok {
                    return Err(ExprError::Unary(*op, arg));
                }
                match op {
                    UnaryOp::Not | UnaryOp::IsNull => Ok(DataType::Boolean),
                    UnaryOp::Neg => Ok(DataType::Number),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = left.datatype(schema)?;
                let r = right.datatype(schema)?;
                let mismatch = || ExprError::Binary(*op, l, r);
                use BinaryOp::*;
                match op {
                    Eq | NotEq | Lt | LtEq | Gt | GtEq => {
                        if !l.is_compatible_with(r) {
                            return Err(mismatch());
                        }
                        Ok(DataType::Boolean)
                    }
                    And | Or => {
                        if !l.is_compatible_with(DataType::Boolean)
                            || !r.is_compatible_with(DataType::Boolean)
                        {
                            return Err(mismatch());
                        }
                        Ok(DataType::Boolean)
                    }
                    Add | Sub | Mul | Div | Mod => {
                        if !l.is_compatible_with(DataType::Number)
                            || !r.is_compatible_with(DataType::Number)
                        {
                            return Err(mismatch());
                        }
                        Ok(DataType::Number)
                    }
                    Concat => {
                        if !l.is_compatible_with(DataType::String)
                            || !r.is_compatible_with(DataType::String)
                        {
                            return Err(mismatch());
                        }
                        Ok(DataType::String)
                    }
                }
            }
            Expr::Function { name, args } => {
                let types = args
                    .iter()
                    .map(|a| a.datatype(schema))
                    .collect::<Result<Vec<_>, _>>()?;
                function_type(name, &types)
            }
            Expr::RowNum => Ok(DataType::Number),
        }
    }

    /// Evaluate the expression over one row. `rownum` is the 1-based position
    /// of the row in its input.
    pub fn eval(&self, schema: &Schema, row: &Row, rownum: usize) -> Result<DataValue, ExprError> {
        use DataValue::*;
        match self {
            Expr::Column(col) => Ok(row[col.resolve(schema)?].clone()),
            Expr::Constant(v) => Ok(v.clone()),
            Expr::Unary { op, expr } => {
                let v = expr.eval(schema, row, rownum)?;
                match (op, v) {
                    (UnaryOp::IsNull, v) => Ok(Bool(v.is_null())),
                    (_, Null) => Ok(Null),
                    (UnaryOp::Not, Bool(b)) => Ok(Bool(!b)),
                    (UnaryOp::Neg, Number(n)) => Ok(Number(-n)),
                    (op, v) => Err(ExprError::Unary(*op, v.datatype())),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = left.eval(schema, row, rownum)?;
                let r = right.eval(schema, row, rownum)?;
                eval_binary(*op, l, r)
            }
            Expr::Function { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(schema, row, rownum))
                    .collect::<Result<Vec<_>, _>>()?;
                eval_function(name, values)
            }
            Expr::RowNum => Ok(DataValue::from(rownum as f64)),
        }
    }
}

fn eval_binary(op: BinaryOp, l: DataValue, r: DataValue) -> Result<DataValue, ExprError> {
    use BinaryOp::*;
    use DataValue::*;
    if op.is_comparison() {
        return Ok(match compare(op, &l, &r)? {
            Some(ord) => Bool(match op {
                Eq => ord == Ordering::Equal,
                NotEq => ord != Ordering::Equal,
                Lt => ord == Ordering::Less,
                LtEq => ord != Ordering::Greater,
                Gt => ord == Ordering::Greater,
                GtEq => ord != Ordering::Less,
                _ => unreachable!(),
            }),
            None => Null,
        });
    }
    match (op, l, r) {
        // three-valued logic
        (And, Bool(false), _) | (And, _, Bool(false)) => Ok(Bool(false)),
        (And, Bool(true), Bool(true)) => Ok(Bool(true)),
        (And, Null | Bool(true), Null | Bool(true)) => Ok(Null),
        (Or, Bool(true), _) | (Or, _, Bool(true)) => Ok(Bool(true)),
        (Or, Bool(false), Bool(false)) => Ok(Bool(false)),
        (Or, Null | Bool(false), Null | Bool(false)) => Ok(Null),
        (_, Null, _) | (_, _, Null) => Ok(Null),
        (Add, Number(x), Number(y)) => Ok(Number(x + y)),
        (Sub, Number(x), Number(y)) => Ok(Number(x - y)),
        (Mul, Number(x), Number(y)) => Ok(Number(x * y)),
        (Div, Number(_), Number(y)) if y.into_inner() == 0.0 => Err(ExprError::DivisionByZero),
        (Div, Number(x), Number(y)) => Ok(Number(x / y)),
        (Mod, Number(_), Number(y)) if y.into_inner() == 0.0 => Err(ExprError::DivisionByZero),
        (Mod, Number(x), Number(y)) => Ok(Number(x % y)),
        (Concat, String(x), String(y)) => Ok(String(x + &y)),
        (op, l, r) => Err(ExprError::Binary(op, l.datatype(), r.datatype())),
    }
}

/// Compare two values. `None` means unknown (either side is null); values of
/// different types do not compare.
fn compare(
    op: BinaryOp,
    l: &DataValue,
    r: &DataValue,
) -> Result<Option<Ordering>, ExprError> {
    use DataValue::*;
    match (l, r) {
        (Null, _) | (_, Null) => Ok(None),
        (Bool(a), Bool(b)) => Ok(Some(a.cmp(b))),
        (Number(a), Number(b)) => Ok(Some(a.cmp(b))),
        (String(a), String(b)) => Ok(Some(a.cmp(b))),
        (Date(a), Date(b)) => Ok(Some(a.cmp(b))),
        _ => Err(ExprError::Binary(op, l.datatype(), r.datatype())),
    }
}

fn function_type(name: &str, args: &[DataType]) -> Result<DataType, ExprError> {
    let expect = |n: usize, ty: DataType| {
        if args.len() != n {
            return Err(ExprError::Arity(name.into()));
        }
        for arg in args {
            if !arg.is_compatible_with(ty) {
                return Err(ExprError::Function(name.into(), *arg));
            }
        }
        Ok(())
    };
    match name {
        "upper" | "lower" => expect(1, DataType::String).map(|()| DataType::String),
        "length" => expect(1, DataType::String).map(|()| DataType::Number),
        "abs" => expect(1, DataType::Number).map(|()| DataType::Number),
        "coalesce" => {
            if args.is_empty() {
                return Err(ExprError::Arity(name.into()));
            }
            let ty = args
                .iter()
                .copied()
                .find(|t| *t != DataType::Null)
                .unwrap_or(DataType::Null);
            for arg in args {
                if !arg.is_compatible_with(ty) {
                    return Err(ExprError::Function(name.into(), *arg));
                }
            }
            Ok(ty)
        }
        _ => Err(ExprError::UnknownFunction(name.into())),
    }
}

fn eval_function(name: &str, mut args: Vec<DataValue>) -> Result<DataValue, ExprError> {
    use DataValue::*;
    let arg = |args: &mut Vec<DataValue>| args.drain(..).next().ok_or_else(|| ExprError::Arity(name.into()));
    match name {
        "upper" => match arg(&mut args)? {
            String(s) => Ok(String(s.to_uppercase())),
            Null => Ok(Null),
            v => Err(ExprError::Function(name.into(), v.datatype())),
        },
        "lower" => match arg(&mut args)? {
            String(s) => Ok(String(s.to_lowercase())),
            Null => Ok(Null),
            v => Err(ExprError::Function(name.into(), v.datatype())),
        },
        "length" => match arg(&mut args)? {
            String(s) => Ok(DataValue::from(s.chars().count() as f64)),
            Null => Ok(Null),
            v => Err(ExprError::Function(name.into(), v.datatype())),
        },
        "abs" => match arg(&mut args)? {
            Number(n) => Ok(DataValue::from(n.into_inner().abs())),
            Null => Ok(Null),
            v => Err(ExprError::Function(name.into(), v.datatype())),
        },
        "coalesce" => Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Null)),
        _ => Err(ExprError::UnknownFunction(name.into())),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{col}"),
            Expr::Constant(v) => write!(f, "{v}"),
            Expr::Unary {
                op: UnaryOp::IsNull,
                expr,
            } => write!(f, "({expr} is null)"),
            Expr::Unary { op, expr } => write!(f, "({op} {expr})"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Function { name, args } => {
                write!(f, "{name}({})", args.iter().format(", "))
            }
            Expr::RowNum => write!(f, "rownum"),
        }
    }
}

/// The error type of expression typing and evaluation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("cannot apply {0} to {1} and {2}")]
    Binary(BinaryOp, DataType, DataType),
    #[error("cannot apply {0} to {1}")]
    Unary(UnaryOp, DataType),
    #[error("cannot apply {0} to {1}")]
    Function(String, DataType),
    #[error("wrong number of arguments to {0:?}")]
    Arity(String),
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("division by zero")]
    DivisionByZero,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::catalog::Field;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new(Some("r"), "a", DataType::Number),
            Field::new(Some("r"), "b", DataType::String),
        ])
    }

    fn row() -> Row {
        vec![4.into(), "d".into()]
    }

    #[test_case(BinaryOp::Gt, 3.0, true; "gt")]
    #[test_case(BinaryOp::Lt, 3.0, false; "lt")]
    #[test_case(BinaryOp::Eq, 4.0, true; "eq")]
    #[test_case(BinaryOp::NotEq, 4.0, false; "neq")]
    fn comparisons(op: BinaryOp, rhs: f64, expected: bool) {
        let expr = Expr::binary(op, Expr::col("a"), Expr::value(rhs));
        assert_eq!(expr.datatype(&schema()).unwrap(), DataType::Boolean);
        assert_eq!(
            expr.eval(&schema(), &row(), 1).unwrap(),
            DataValue::Bool(expected)
        );
    }

    #[test]
    fn null_comparison_is_unknown() {
        let expr = Expr::binary(BinaryOp::Eq, Expr::col("a"), Expr::Constant(DataValue::Null));
        assert_eq!(expr.eval(&schema(), &row(), 1).unwrap(), DataValue::Null);
    }

    #[test]
    fn three_valued_logic() {
        let null = Expr::Constant(DataValue::Null);
        let f = Expr::value(false);
        assert_eq!(
            null.clone().and(f.clone()).eval(&schema(), &row(), 1).unwrap(),
            DataValue::Bool(false)
        );
        assert_eq!(
            null.clone().or(f).eval(&schema(), &row(), 1).unwrap(),
            DataValue::Null
        );
        assert_eq!(
            null.not().eval(&schema(), &row(), 1).unwrap(),
            DataValue::Null
        );
    }

    #[test]
    fn type_mismatch() {
        let expr = Expr::binary(BinaryOp::Gt, Expr::col("a"), Expr::value("d"));
        assert_eq!(
            expr.datatype(&schema()),
            Err(ExprError::Binary(
                BinaryOp::Gt,
                DataType::Number,
                DataType::String
            ))
        );
    }

    #[test]
    fn unknown_column() {
        let expr = Expr::col("z");
        assert_eq!(
            expr.datatype(&schema()),
            Err(ExprError::Schema(SchemaError::NotFound("z".into())))
        );
    }

    #[test]
    fn rownum() {
        assert_eq!(
            Expr::RowNum.eval(&schema(), &row(), 7).unwrap(),
            DataValue::from(7.0)
        );
    }

    #[test]
    fn display() {
        let expr = Expr::binary(BinaryOp::Gt, Expr::qcol("r", "a"), Expr::value(3.0)).not();
        assert_eq!(expr.to_string(), "(not (r.a > 3))");
    }
}
