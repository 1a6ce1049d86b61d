// Copyright 2025 RelCalc Project Authors. Licensed under Apache-2.0.

use serde::Serialize;

use crate::types::DataType;

/// The catalog of a column: its name and declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCatalog {
    name: String,
    datatype: DataType,
}

impl ColumnCatalog {
    pub fn new(name: impl Into<String>, datatype: DataType) -> ColumnCatalog {
        ColumnCatalog {
            name: name.into(),
            datatype,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }
}
