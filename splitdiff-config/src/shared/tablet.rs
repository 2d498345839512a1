use std::fmt;

use serde::{Deserialize, Serialize};

/// Serving role of a tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabletType {
    Primary,
    Replica,
    Rdonly,
    Spare,
    /// Removed from serving while a worker holds it.
    Drained,
}

impl TabletType {
    /// Returns `true` if a tablet of this type can be stopped and scanned for a diff.
    pub fn is_diffable(&self) -> bool {
        matches!(self, TabletType::Replica | TabletType::Rdonly)
    }
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TabletType::Primary => "PRIMARY",
            TabletType::Replica => "REPLICA",
            TabletType::Rdonly => "RDONLY",
            TabletType::Spare => "SPARE",
            TabletType::Drained => "DRAINED",
        };

        f.write_str(name)
    }
}
