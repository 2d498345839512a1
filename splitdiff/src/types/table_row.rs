use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Cell;

/// A row produced by an ordered table scan.
///
/// Values are ordered to match the columns of the table definition that was scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }
}

impl fmt::Display for TableRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            value.fmt(f)?;
        }
        f.write_str(")")
    }
}

/// Builds a [`TableRow`] from a list of values convertible into [`Cell`].
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::types::TableRow::new(vec![$($crate::types::Cell::from($value)),*])
    };
}
