// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

use tracing::debug;

use crate::algebra::{Plan, PlanError};
use crate::catalog::{CatalogError, ColumnCatalog, RootCatalog, TableCatalog};
use crate::executor::{self, Chunk, ExecuteError};
use crate::parser::{ast::Statement, parse, ParserError};
use crate::translator::{algebra::AlgebraAst, sql, trc, trc::TrcQuery, ErrorKind, TranslateError};
use crate::types::Row;

/// A catalog of in-memory relations together with the three translation
/// entry points. All translators return the same operator vocabulary.
#[derive(Default)]
pub struct Database {
    catalog: RootCatalog,
}

impl Database {
    /// Create a database with an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &RootCatalog {
        &self.catalog
    }

    /// Register a relation with inline rows.
    pub fn create_table(
        &self,
        name: &str,
        columns: Vec<ColumnCatalog>,
        rows: Vec<Row>,
    ) -> Result<(), Error> {
        self.catalog
            .add_table(TableCatalog::new(name, columns, rows)?)?;
        Ok(())
    }

    /// Translate a SQL query to a checked plan.
    pub fn translate_sql(&self, sql: &str) -> Result<Plan, Error> {
        let mut stmts = parse(sql)?;
        if stmts.len() != 1 {
            return Err(Error::Translate(
                ErrorKind::Unsupported("expected exactly one statement".into()).into(),
            ));
        }
        let Statement::Query(query) = stmts.remove(0) else {
            return Err(Error::Translate(
                ErrorKind::Unsupported("only queries can be translated".into()).into(),
            ));
        };
        let plan = sql::translate(*query, &self.catalog)?;
        debug!("sql plan:\n{plan}");
        plan.check()?;
        Ok(plan)
    }

    /// Translate a TRC query to a checked plan.
    pub fn translate_trc(&self, query: &TrcQuery) -> Result<Plan, Error> {
        let plan = trc::translate(query, &self.catalog)?;
        debug!("trc plan:\n{plan}");
        plan.check()?;
        Ok(plan)
    }

    /// Translate a native relational-algebra AST to a checked plan.
    pub fn translate_algebra(&self, ast: &AlgebraAst) -> Result<Plan, Error> {
        let plan = crate::translator::algebra::translate(ast, &self.catalog)?;
        debug!("algebra plan:\n{plan}");
        plan.check()?;
        Ok(plan)
    }

    /// Parse, translate and evaluate a SQL query.
    pub fn run(&self, sql: &str) -> Result<Chunk, Error> {
        let plan = self.translate_sql(sql)?;
        Ok(executor::execute(&plan)?)
    }

    /// Translate and evaluate a TRC query.
    pub fn run_trc(&self, query: &TrcQuery) -> Result<Chunk, Error> {
        let plan = self.translate_trc(query)?;
        Ok(executor::execute(&plan)?)
    }
}

/// The error type of database operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParserError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("translate error: {0}")]
    Translate(#[from] TranslateError),
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("execute error: {0}")]
    Execute(#[from] ExecuteError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn database() -> Database {
        let db = Database::new();
        db.create_table(
            "t",
            vec![
                ColumnCatalog::new("a", DataType::Number),
                ColumnCatalog::new("b", DataType::String),
            ],
            vec![
                vec![1.into(), "x".into()],
                vec![2.into(), "y".into()],
            ],
        )
        .unwrap();
        db
    }

    #[test]
    fn run_sql() {
        let db = database();
        let chunk = db.run("SELECT DISTINCT a FROM t WHERE b = 'y'").unwrap();
        assert_eq!(chunk.rows().to_vec(), vec![vec![2.into()]]);
    }

    #[test]
    fn only_queries_run() {
        let db = database();
        assert!(db.run("DROP TABLE t").is_err());
    }

    #[test]
    fn duplicate_table() {
        let db = database();
        assert!(matches!(
            db.create_table("t", vec![ColumnCatalog::new("a", DataType::Number)], vec![]),
            Err(Error::Catalog(CatalogError::Duplicated("table", _)))
        ));
    }
}
