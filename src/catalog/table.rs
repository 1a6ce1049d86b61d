// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

use serde::Serialize;

use super::{CatalogError, ColumnCatalog, Field, Schema};
use crate::types::Row;

/// The catalog of a table: an ordered, typed column list and the rows of the
/// in-memory relation.
///
/// Cloning produces an independently owned handle that is safe to embed as a
/// plan leaf: later catalog changes never show through it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCatalog {
    name: String,
    columns: Vec<ColumnCatalog>,
    rows: Vec<Row>,
}

impl TableCatalog {
    /// Create a table. Every row must match the column list in arity and in
    /// types; `null` fits any column.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnCatalog>,
        rows: Vec<Row>,
    ) -> Result<TableCatalog, CatalogError> {
        let name = name.into();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name() == column.name()) {
                return Err(CatalogError::Duplicated("column", column.name().into()));
            }
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(CatalogError::InvalidRow(
                    name,
                    format!("expected {} values, got {}", columns.len(), row.len()),
                ));
            }
            for (value, column) in row.iter().zip(&columns) {
                if !value.datatype().is_compatible_with(column.datatype()) {
                    return Err(CatalogError::InvalidRow(
                        name,
                        format!("{} does not fit column {:?}", value, column.name()),
                    ));
                }
            }
        }
        Ok(TableCatalog {
            name,
            columns,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnCatalog] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The table's schema, with every field qualified by the table name.
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(Some(&self.name), c.name(), c.datatype()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, DataValue};

    #[test]
    fn rejects_bad_rows() {
        let columns = vec![
            ColumnCatalog::new("a", DataType::Number),
            ColumnCatalog::new("b", DataType::String),
        ];
        assert!(TableCatalog::new("t", columns.clone(), vec![vec![1.into()]]).is_err());
        assert!(
            TableCatalog::new("t", columns.clone(), vec![vec![1.into(), 2.into()]]).is_err()
        );
        let ok = TableCatalog::new(
            "t",
            columns,
            vec![vec![1.into(), "x".into()], vec![DataValue::Null, "y".into()]],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn schema_is_qualified() {
        let table = TableCatalog::new(
            "t",
            vec![ColumnCatalog::new("a", DataType::Number)],
            vec![],
        )
        .unwrap();
        assert_eq!(table.schema().to_string(), "t.a");
    }
}
