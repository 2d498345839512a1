use std::future::Future;
use std::time::Duration;

use crate::error::DiffResult;
use crate::types::{ReplicationPosition, TabletAlias, TabletType};

/// Replication control and role changes on individual tablets.
///
/// Filtered replication calls target the primary of a destination shard and address the
/// stream fed by one source shard through its uid.
pub trait TabletManager {
    /// Stops the filtered replication stream `source_uid` on `primary` and returns the source
    /// position recorded by the stream.
    fn pause_filtered_stream(
        &self,
        primary: &TabletAlias,
        source_uid: u32,
    ) -> impl Future<Output = DiffResult<ReplicationPosition>> + Send;

    /// Restarts the filtered replication stream `source_uid` on `primary`.
    ///
    /// With `until`, the stream stops by itself once it applied everything up to that source
    /// position.
    fn resume_filtered_stream(
        &self,
        primary: &TabletAlias,
        source_uid: u32,
        until: Option<&ReplicationPosition>,
    ) -> impl Future<Output = DiffResult<()>> + Send;

    /// Blocks until the filtered replication stream `source_uid` on `primary` reached
    /// `position`.
    fn wait_for_filtered_position(
        &self,
        primary: &TabletAlias,
        source_uid: u32,
        position: &ReplicationPosition,
    ) -> impl Future<Output = DiffResult<()>> + Send;

    /// Returns the current position of the replication log of `tablet`.
    fn current_position(
        &self,
        tablet: &TabletAlias,
    ) -> impl Future<Output = DiffResult<ReplicationPosition>> + Send;

    /// Stops replication on `tablet` at `minimum` or slightly past it, waiting at most
    /// `wait_timeout` for the tablet to get there, and returns the exact stop position.
    fn stop_replication_minimum(
        &self,
        tablet: &TabletAlias,
        minimum: &ReplicationPosition,
        wait_timeout: Duration,
    ) -> impl Future<Output = DiffResult<ReplicationPosition>> + Send;

    /// Restarts replication on `tablet`.
    fn start_replication(&self, tablet: &TabletAlias) -> impl Future<Output = DiffResult<()>> + Send;

    /// Changes the serving role of `tablet`.
    fn change_tablet_type(
        &self,
        tablet: &TabletAlias,
        tablet_type: TabletType,
    ) -> impl Future<Output = DiffResult<()>> + Send;
}
