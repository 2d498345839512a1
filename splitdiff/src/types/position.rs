use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque point in a replication log.
///
/// Positions are totally ordered by the replication layer, but the diff worker never
/// compares them itself: it only hands them back to the wait and stop primitives of the
/// tablet that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationPosition(String);

impl ReplicationPosition {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
