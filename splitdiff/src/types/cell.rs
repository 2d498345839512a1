use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single column value of a scanned row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Cell {
    /// Rank of the variant, used to order values of different variants.
    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::I64(_) | Cell::U64(_) => 2,
            Cell::F64(_) => 3,
            Cell::String(_) => 4,
            Cell::Bytes(_) => 5,
        }
    }

    /// Total order over cells, with `NULL` sorting first.
    ///
    /// Signed and unsigned integers compare by numeric value. Floats use the IEEE total order
    /// so that the comparison is consistent even in presence of `NaN`, except that `-0.0` and
    /// `0.0` are equal. Strings compare
    /// bytewise, which matches a binary collation.
    pub fn compare(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::I64(a), Cell::I64(b)) => a.cmp(b),
            (Cell::U64(a), Cell::U64(b)) => a.cmp(b),
            (Cell::I64(a), Cell::U64(b)) => compare_signed_unsigned(*a, *b),
            (Cell::U64(a), Cell::I64(b)) => compare_signed_unsigned(*b, *a).reverse(),
            (Cell::F64(a), Cell::F64(b)) if a == b => Ordering::Equal,
            (Cell::F64(a), Cell::F64(b)) => a.total_cmp(b),
            (Cell::String(a), Cell::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Cell::Bytes(a), Cell::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn compare_signed_unsigned(signed: i64, unsigned: u64) -> Ordering {
    if signed < 0 {
        return Ordering::Less;
    }

    (signed as u64).cmp(&unsigned)
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::I64(value) => write!(f, "{value}"),
            Cell::U64(value) => write!(f, "{value}"),
            Cell::F64(value) => write!(f, "{value}"),
            Cell::String(value) => write!(f, "{value:?}"),
            Cell::Bytes(value) => {
                f.write_str("0x")?;
                for byte in value {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i32> for Cell {
    fn from(value: i32) -> Self {
        Cell::I64(value.into())
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        Cell::U64(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::F64(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<Vec<u8>> for Cell {
    fn from(value: Vec<u8>) -> Self {
        Cell::Bytes(value)
    }
}

impl<T> From<Option<T>> for Cell
where
    T: Into<Cell>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}
