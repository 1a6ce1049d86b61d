// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

//! The catalog of in-memory relations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use self::column::*;
pub use self::schema::*;
pub use self::table::*;

mod column;
mod schema;
mod table;

pub type TableCatalogRef = Arc<TableCatalog>;

/// The root of the catalog: a mapping from relation names to tables.
///
/// The translators only read it. Every relation that ends up as a leaf of a
/// plan is cloned out of the catalog first, so mutating the catalog after a
/// translation has returned does not affect the produced tree.
#[derive(Default)]
pub struct RootCatalog {
    tables: Mutex<HashMap<String, TableCatalogRef>>,
}

impl RootCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Fails if a table with the same name exists.
    pub fn add_table(&self, table: TableCatalog) -> Result<(), CatalogError> {
        let mut tables = self.tables.lock().unwrap();
        let name = table.name().to_string();
        if tables.contains_key(&name) {
            return Err(CatalogError::Duplicated("table", name));
        }
        tables.insert(name, Arc::new(table));
        Ok(())
    }

    /// Replace a table, keeping the name. Used by fixtures to mutate data.
    pub fn replace_table(&self, table: TableCatalog) {
        let mut tables = self.tables.lock().unwrap();
        tables.insert(table.name().to_string(), Arc::new(table));
    }

    pub fn drop_table(&self, name: &str) -> Result<(), CatalogError> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CatalogError::NotFound("table", name.into()))
    }

    pub fn get_table(&self, name: &str) -> Option<TableCatalogRef> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn all_tables(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

/// The error type of catalog operations.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    #[error("duplicated {0}: {1}")]
    Duplicated(&'static str, String),
    #[error("invalid row for table {0}: {1}")]
    InvalidRow(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn add_get_drop() {
        let catalog = RootCatalog::new();
        let table = TableCatalog::new(
            "t",
            vec![ColumnCatalog::new("a", DataType::Number)],
            vec![vec![1.into()]],
        )
        .unwrap();
        catalog.add_table(table.clone()).unwrap();
        assert_eq!(
            catalog.add_table(table),
            Err(CatalogError::Duplicated("table", "t".into()))
        );
        assert!(catalog.get_table("t").is_some());
        catalog.drop_table("t").unwrap();
        assert_eq!(
            catalog.drop_table("t"),
            Err(CatalogError::NotFound("table", "t".into()))
        );
    }
}
