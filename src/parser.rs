// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! SQL parsing, a thin wrapper over the [`sqlparser`] crate.

pub use sqlparser::ast;
pub use sqlparser::parser::ParserError;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Parse a SQL string into a list of statements.
pub fn parse(sql: &str) -> Result<Vec<ast::Statement>, ParserError> {
    Parser::parse_sql(&GenericDialect {}, sql)
}
