use std::fmt;

use serde::{Deserialize, Serialize};

/// Name and type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Full column type as reported by the tablet, including collation when relevant.
    pub column_type: String,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// Definition of a table as fetched from one tablet.
///
/// Immutable once fetched. Scans of this table return rows whose values follow the order of
/// `columns` and which are sorted by `primary_key_columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    /// Names of the primary key columns, in key order.
    pub primary_key_columns: Vec<String>,
}

impl TableDefinition {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<ColumnDefinition>,
        primary_key_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key_columns,
        }
    }

    /// Returns the position of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Returns the column named `name`.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }
}

impl fmt::Display for TableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Set of table definitions fetched from one tablet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub table_definitions: Vec<TableDefinition>,
}

impl SchemaDefinition {
    pub fn new(table_definitions: Vec<TableDefinition>) -> Self {
        Self { table_definitions }
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.table_definitions
            .iter()
            .find(|table| table.name == name)
    }
}
