use std::future::Future;

use crate::error::DiffResult;
use crate::types::{TabletAlias, TabletType};

/// Picks tablets that are healthy enough to be taken out of serving for a diff.
pub trait TabletSelector {
    /// Returns one healthy tablet of `tablet_type` in `keyspace/shard` within `cell`.
    ///
    /// Must fail if fewer than `min_healthy` tablets of that type are healthy, since taking
    /// one away would leave the shard under-provisioned.
    fn find_healthy_tablet(
        &self,
        cell: &str,
        keyspace: &str,
        shard: &str,
        min_healthy: usize,
        tablet_type: TabletType,
    ) -> impl Future<Output = DiffResult<TabletAlias>> + Send;
}
