use std::future::Future;

use crate::error::DiffResult;
use crate::types::{KeyspaceInfo, ShardInfo, TabletAlias, TabletRecord};

/// Read access to the topology metadata of the cluster.
pub trait TopologyService {
    /// Returns the metadata of the keyspace named `keyspace`.
    fn get_keyspace(&self, keyspace: &str) -> impl Future<Output = DiffResult<KeyspaceInfo>> + Send;

    /// Returns the metadata of `keyspace/shard`, including its primary and source shards.
    fn get_shard(
        &self,
        keyspace: &str,
        shard: &str,
    ) -> impl Future<Output = DiffResult<ShardInfo>> + Send;

    /// Returns the topology record of a tablet.
    fn get_tablet(
        &self,
        alias: &TabletAlias,
    ) -> impl Future<Output = DiffResult<TabletRecord>> + Send;
}
