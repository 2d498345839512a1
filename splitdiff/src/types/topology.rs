use std::fmt;

use crate::types::TabletAlias;

/// Keyspace metadata read from the topology service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceInfo {
    pub name: String,
}

/// A source shard feeding a destination shard through filtered replication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceShard {
    /// Identifier of the filtered replication stream on the destination primary.
    pub uid: u32,
    pub keyspace: String,
    pub shard: String,
    /// Tables copied from the source shard. Also used as the schema filter for the diff.
    pub tables: Vec<String>,
}

impl fmt::Display for SourceShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.keyspace, self.shard)
    }
}

/// Shard metadata read from the topology service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardInfo {
    pub keyspace: String,
    pub name: String,
    pub primary: Option<TabletAlias>,
    pub source_shards: Vec<SourceShard>,
}

impl ShardInfo {
    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

impl fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.keyspace, self.name)
    }
}
