use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::diff_error;
use crate::error::{DiffResult, ErrorKind};
use crate::remote::{
    SchemaService, TableScanner, TabletManager, TabletSelector, TopologyService,
};
use crate::test_utils::{Failure, FailureMode, FakeRowStream, Operation, RemoteCall};
use crate::types::{
    KeyspaceInfo, ReplicationPosition, SchemaDefinition, ShardInfo, TableDefinition, TableRow,
    TabletAlias, TabletRecord, TabletType,
};

/// Builds the replication position the fake cluster uses for offset `offset`.
pub fn position(offset: u64) -> ReplicationPosition {
    ReplicationPosition::new(format!("pos:{offset}"))
}

/// Parses a position built by [`position`].
pub fn parse_position(position: &ReplicationPosition) -> Option<u64> {
    position.as_str().strip_prefix("pos:")?.parse().ok()
}

#[derive(Debug, Clone)]
struct TabletState {
    replicating: bool,
    healthy: bool,
    position: u64,
}

impl Default for TabletState {
    fn default() -> Self {
        Self {
            replicating: true,
            healthy: true,
            position: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredTable {
    definition: TableDefinition,
    rows: Vec<TableRow>,
}

#[derive(Debug, Clone)]
struct FilteredStream {
    running: bool,
    position: u64,
}

#[derive(Debug, Default)]
struct ClusterState {
    keyspaces: BTreeSet<String>,
    shards: BTreeMap<(String, String), ShardInfo>,
    records: BTreeMap<TabletAlias, TabletRecord>,
    tablets: BTreeMap<TabletAlias, TabletState>,
    tables: BTreeMap<TabletAlias, BTreeMap<String, StoredTable>>,
    streams: BTreeMap<(TabletAlias, u32), FilteredStream>,
    failures: Vec<Failure>,
    journal: Vec<RemoteCall>,
    row_delay: Duration,
    rows_read: BTreeMap<(TabletAlias, String), usize>,
    stop_wait_timeouts: Vec<Duration>,
    open_streams_by_table: BTreeMap<String, usize>,
    open_streams: usize,
    max_open_streams: usize,
    max_tables_in_flight: usize,
}

impl ClusterState {
    fn take_failure(
        &mut self,
        operation: Operation,
        tablet: Option<&TabletAlias>,
        table: Option<&str>,
    ) -> Option<FailureMode> {
        let failure = self
            .failures
            .iter_mut()
            .find(|failure| failure.matches(operation, tablet, table))?;

        if failure.skip > 0 {
            failure.skip -= 1;
            return None;
        }

        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }

        Some(failure.mode)
    }

    fn stream_mut(&mut self, primary: &TabletAlias, source_uid: u32) -> DiffResult<&mut FilteredStream> {
        self.streams
            .get_mut(&(primary.clone(), source_uid))
            .ok_or_else(|| {
                diff_error!(
                    ErrorKind::RemoteActionFailed,
                    "Filtered stream not found",
                    format!("stream {source_uid} on {primary}")
                )
            })
    }
}

fn parse(position: &ReplicationPosition) -> DiffResult<u64> {
    parse_position(position).ok_or_else(|| {
        diff_error!(
            ErrorKind::RemoteActionFailed,
            "Malformed replication position",
            position
        )
    })
}

/// In-memory cluster implementing every remote service the worker needs.
///
/// Keeps a journal of the calls it received, fails calls on demand, tracks how many row
/// streams are open at once, and simulates replication positions as plain offsets.
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    /// Number of events a tablet replicates past the minimum it was asked to stop at.
    pub const STOP_OVERSHOOT: u64 = 3;

    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap()
    }

    pub fn add_keyspace(&self, keyspace: &str) {
        self.lock().keyspaces.insert(keyspace.to_string());
    }

    pub fn add_shard(&self, shard: ShardInfo) {
        let mut state = self.lock();
        state.keyspaces.insert(shard.keyspace.clone());
        state
            .shards
            .insert((shard.keyspace.clone(), shard.name.clone()), shard);
    }

    pub fn add_tablet(&self, alias: &TabletAlias, keyspace: &str, shard: &str, tablet_type: TabletType) {
        let mut state = self.lock();
        state.records.insert(
            alias.clone(),
            TabletRecord {
                alias: alias.clone(),
                keyspace: keyspace.to_string(),
                shard: shard.to_string(),
                tablet_type,
            },
        );
        state.tablets.entry(alias.clone()).or_default();
    }

    pub fn set_healthy(&self, alias: &TabletAlias, healthy: bool) {
        self.lock().tablets.entry(alias.clone()).or_default().healthy = healthy;
    }

    pub fn set_position(&self, alias: &TabletAlias, offset: u64) {
        self.lock().tablets.entry(alias.clone()).or_default().position = offset;
    }

    pub fn add_filtered_stream(&self, primary: &TabletAlias, source_uid: u32, offset: u64) {
        self.lock().streams.insert(
            (primary.clone(), source_uid),
            FilteredStream {
                running: true,
                position: offset,
            },
        );
    }

    pub fn add_table(&self, alias: &TabletAlias, definition: &TableDefinition, rows: Vec<TableRow>) {
        self.lock().tables.entry(alias.clone()).or_default().insert(
            definition.name.clone(),
            StoredTable {
                definition: definition.clone(),
                rows,
            },
        );
    }

    pub fn inject(&self, failure: Failure) {
        self.lock().failures.push(failure);
    }

    /// Delays every row read by `delay`.
    pub fn set_row_delay(&self, delay: Duration) {
        self.lock().row_delay = delay;
    }

    pub fn journal(&self) -> Vec<RemoteCall> {
        self.lock().journal.clone()
    }

    pub fn journal_of(&self, operation: Operation) -> Vec<RemoteCall> {
        self.lock()
            .journal
            .iter()
            .filter(|call| call.operation() == operation)
            .cloned()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    pub fn filtered_stream_running(&self, primary: &TabletAlias, source_uid: u32) -> bool {
        self.lock()
            .streams
            .get(&(primary.clone(), source_uid))
            .is_some_and(|stream| stream.running)
    }

    pub fn replication_running(&self, alias: &TabletAlias) -> bool {
        self.lock()
            .tablets
            .get(alias)
            .is_none_or(|tablet| tablet.replicating)
    }

    pub fn tablet_type(&self, alias: &TabletAlias) -> Option<TabletType> {
        self.lock()
            .records
            .get(alias)
            .map(|record| record.tablet_type)
    }

    /// Number of reads issued on the scans of `table` on `alias`, end of stream included.
    pub fn rows_read(&self, alias: &TabletAlias, table: &str) -> usize {
        self.lock()
            .rows_read
            .get(&(alias.clone(), table.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Wait budgets handed to the stop replication calls, in call order.
    pub fn stop_wait_timeouts(&self) -> Vec<Duration> {
        self.lock().stop_wait_timeouts.clone()
    }

    /// Number of row streams currently open.
    pub fn open_streams(&self) -> usize {
        self.lock().open_streams
    }

    /// Highest number of row streams open at the same time.
    pub fn max_open_streams(&self) -> usize {
        self.lock().max_open_streams
    }

    /// Highest number of tables with at least one open row stream at the same time.
    pub fn max_tables_in_flight(&self) -> usize {
        self.lock().max_tables_in_flight
    }

    /// Journals `call` and applies the failure injected for it, if any.
    async fn call(&self, call: RemoteCall) -> DiffResult<()> {
        let operation = call.operation();
        let mode = {
            let mut state = self.lock();
            let mode = state.take_failure(operation, call.tablet(), call.table());
            state.journal.push(call);
            mode
        };

        apply_failure(operation, mode).await
    }

    pub(crate) fn take_failure(
        &self,
        operation: Operation,
        tablet: &TabletAlias,
        table: &str,
    ) -> Option<FailureMode> {
        self.lock()
            .take_failure(operation, Some(tablet), Some(table))
    }

    pub(crate) fn record_read(&self, tablet: &TabletAlias, table: &str) -> Option<FailureMode> {
        let mut state = self.lock();
        *state
            .rows_read
            .entry((tablet.clone(), table.to_string()))
            .or_default() += 1;

        state.take_failure(Operation::NextRow, Some(tablet), Some(table))
    }

    pub(crate) fn release_stream(&self, table: &str) {
        let mut state = self.lock();
        state.open_streams -= 1;
        if let Some(count) = state.open_streams_by_table.get_mut(table) {
            *count -= 1;
            if *count == 0 {
                state.open_streams_by_table.remove(table);
            }
        }
    }
}

pub(crate) async fn apply_failure(operation: Operation, mode: Option<FailureMode>) -> DiffResult<()> {
    match mode {
        None => Ok(()),
        Some(FailureMode::Error) => Err(diff_error!(
            operation.error_kind(),
            "Injected failure",
            format!("{operation:?}")
        )),
        Some(FailureMode::Hang) => {
            std::future::pending::<()>().await;
            Ok(())
        }
        Some(FailureMode::Panic) => panic!("injected panic in {operation:?}"),
    }
}

impl TopologyService for FakeCluster {
    async fn get_keyspace(&self, keyspace: &str) -> DiffResult<KeyspaceInfo> {
        self.call(RemoteCall::GetKeyspace {
            keyspace: keyspace.to_string(),
        })
        .await?;

        if !self.lock().keyspaces.contains(keyspace) {
            return Err(diff_error!(
                ErrorKind::RemoteActionFailed,
                "Keyspace not found",
                keyspace
            ));
        }

        Ok(KeyspaceInfo {
            name: keyspace.to_string(),
        })
    }

    async fn get_shard(&self, keyspace: &str, shard: &str) -> DiffResult<ShardInfo> {
        self.call(RemoteCall::GetShard {
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
        })
        .await?;

        self.lock()
            .shards
            .get(&(keyspace.to_string(), shard.to_string()))
            .cloned()
            .ok_or_else(|| {
                diff_error!(
                    ErrorKind::RemoteActionFailed,
                    "Shard not found",
                    format!("{keyspace}/{shard}")
                )
            })
    }

    async fn get_tablet(&self, alias: &TabletAlias) -> DiffResult<TabletRecord> {
        self.call(RemoteCall::GetTablet {
            tablet: alias.clone(),
        })
        .await?;

        self.lock().records.get(alias).cloned().ok_or_else(|| {
            diff_error!(ErrorKind::RemoteActionFailed, "Tablet not found", alias)
        })
    }
}

impl TabletSelector for FakeCluster {
    async fn find_healthy_tablet(
        &self,
        cell: &str,
        keyspace: &str,
        shard: &str,
        min_healthy: usize,
        tablet_type: TabletType,
    ) -> DiffResult<TabletAlias> {
        self.call(RemoteCall::FindHealthyTablet {
            keyspace: keyspace.to_string(),
            shard: shard.to_string(),
            tablet_type,
        })
        .await?;

        let state = self.lock();
        let healthy: Vec<TabletAlias> = state
            .records
            .values()
            .filter(|record| {
                record.alias.cell == cell
                    && record.keyspace == keyspace
                    && record.shard == shard
                    && record.tablet_type == tablet_type
                    && state
                        .tablets
                        .get(&record.alias)
                        .is_none_or(|tablet| tablet.healthy)
            })
            .map(|record| record.alias.clone())
            .collect();

        if healthy.is_empty() || healthy.len() < min_healthy {
            return Err(diff_error!(
                ErrorKind::RemoteActionFailed,
                "Not enough healthy tablets",
                format!(
                    "{cell}/{keyspace}/{shard}: {} healthy {tablet_type} tablets, {min_healthy} required",
                    healthy.len()
                )
            ));
        }

        Ok(healthy[0].clone())
    }
}

impl TabletManager for FakeCluster {
    async fn pause_filtered_stream(
        &self,
        primary: &TabletAlias,
        source_uid: u32,
    ) -> DiffResult<ReplicationPosition> {
        self.call(RemoteCall::PauseFilteredStream {
            primary: primary.clone(),
            source_uid,
        })
        .await?;

        let mut state = self.lock();
        let stream = state.stream_mut(primary, source_uid)?;
        stream.running = false;

        Ok(position(stream.position))
    }

    async fn resume_filtered_stream(
        &self,
        primary: &TabletAlias,
        source_uid: u32,
        until: Option<&ReplicationPosition>,
    ) -> DiffResult<()> {
        self.call(RemoteCall::ResumeFilteredStream {
            primary: primary.clone(),
            source_uid,
            until: until.cloned(),
        })
        .await?;

        let target = until.map(parse).transpose()?;
        let mut state = self.lock();
        let stream = state.stream_mut(primary, source_uid)?;
        match target {
            // The stream applies everything up to the target, then stops by itself.
            Some(target) => {
                stream.position = stream.position.max(target);
                stream.running = false;
            }
            None => stream.running = true,
        }

        Ok(())
    }

    async fn wait_for_filtered_position(
        &self,
        primary: &TabletAlias,
        source_uid: u32,
        position: &ReplicationPosition,
    ) -> DiffResult<()> {
        self.call(RemoteCall::WaitForFilteredPosition {
            primary: primary.clone(),
            source_uid,
            position: position.clone(),
        })
        .await?;

        let target = parse(position)?;
        let mut state = self.lock();
        let stream = state.stream_mut(primary, source_uid)?;
        if stream.position < target {
            return Err(diff_error!(
                ErrorKind::RemoteActionFailed,
                "Filtered stream is behind the requested position",
                format!("stream at {}, waiting for {target}", stream.position)
            ));
        }

        Ok(())
    }

    async fn current_position(&self, tablet: &TabletAlias) -> DiffResult<ReplicationPosition> {
        self.call(RemoteCall::CurrentPosition {
            tablet: tablet.clone(),
        })
        .await?;

        let mut state = self.lock();
        let tablet = state.tablets.entry(tablet.clone()).or_default();

        Ok(position(tablet.position))
    }

    async fn stop_replication_minimum(
        &self,
        tablet: &TabletAlias,
        minimum: &ReplicationPosition,
        wait_timeout: Duration,
    ) -> DiffResult<ReplicationPosition> {
        self.lock().stop_wait_timeouts.push(wait_timeout);
        self.call(RemoteCall::StopReplicationMinimum {
            tablet: tablet.clone(),
            minimum: minimum.clone(),
        })
        .await?;

        let minimum = parse(minimum)?;
        let mut state = self.lock();
        let tablet = state.tablets.entry(tablet.clone()).or_default();
        tablet.position = tablet.position.max(minimum + Self::STOP_OVERSHOOT);
        tablet.replicating = false;

        Ok(position(tablet.position))
    }

    async fn start_replication(&self, tablet: &TabletAlias) -> DiffResult<()> {
        self.call(RemoteCall::StartReplication {
            tablet: tablet.clone(),
        })
        .await?;

        self.lock()
            .tablets
            .entry(tablet.clone())
            .or_default()
            .replicating = true;

        Ok(())
    }

    async fn change_tablet_type(&self, tablet: &TabletAlias, tablet_type: TabletType) -> DiffResult<()> {
        self.call(RemoteCall::ChangeTabletType {
            tablet: tablet.clone(),
            tablet_type,
        })
        .await?;

        if let Some(record) = self.lock().records.get_mut(tablet) {
            record.tablet_type = tablet_type;
        }

        Ok(())
    }
}

impl SchemaService for FakeCluster {
    async fn get_schema(&self, tablet: &TabletAlias, tables: &[String]) -> DiffResult<SchemaDefinition> {
        self.call(RemoteCall::GetSchema {
            tablet: tablet.clone(),
        })
        .await?;

        let state = self.lock();
        let table_definitions = state
            .tables
            .get(tablet)
            .map(|stored| {
                stored
                    .values()
                    .filter(|table| tables.is_empty() || tables.contains(&table.definition.name))
                    .map(|table| table.definition.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(SchemaDefinition::new(table_definitions))
    }
}

impl TableScanner for FakeCluster {
    type Stream = FakeRowStream;

    async fn open_ordered_scan(
        &self,
        tablet: &TabletAlias,
        table: &TableDefinition,
    ) -> DiffResult<FakeRowStream> {
        self.call(RemoteCall::OpenOrderedScan {
            tablet: tablet.clone(),
            table: table.name.clone(),
        })
        .await?;

        let mut state = self.lock();
        let Some(stored) = state
            .tables
            .get(tablet)
            .and_then(|tables| tables.get(&table.name))
        else {
            return Err(diff_error!(
                ErrorKind::RowStreamFailed,
                "Table not found on tablet",
                format!("{} on {tablet}", table.name)
            ));
        };
        let rows = stored.rows.clone();

        state.open_streams += 1;
        state.max_open_streams = state.max_open_streams.max(state.open_streams);
        *state
            .open_streams_by_table
            .entry(table.name.clone())
            .or_default() += 1;
        state.max_tables_in_flight = state
            .max_tables_in_flight
            .max(state.open_streams_by_table.len());
        let delay = state.row_delay;
        drop(state);

        Ok(FakeRowStream::new(
            self.clone(),
            tablet.clone(),
            table.name.clone(),
            rows,
            delay,
        ))
    }
}
