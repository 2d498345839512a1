use std::sync::Arc;
use std::time::Duration;

use splitdiff_config::shared::DiffConfig;

use crate::concurrency::cancel::{CancelTx, create_cancel_channel};
use crate::test_utils::FakeCluster;
use crate::types::{
    ColumnDefinition, ShardInfo, SourceShard, TableDefinition, TableRow, TabletAlias, TabletType,
};
use crate::workers::SplitDiffWorker;

pub const CELL: &str = "zone1";
pub const SOURCE_KEYSPACE: &str = "commerce";
pub const DESTINATION_KEYSPACE: &str = "customer";
pub const SHARD: &str = "0";

/// Offset of the filtered stream when the split is created.
pub const FILTERED_STREAM_OFFSET: u64 = 1_000;
/// Offset of the destination primary log when the split is created.
pub const DESTINATION_PRIMARY_OFFSET: u64 = 5_000;

/// Builds a table definition from `(name, type)` column pairs and key column names.
pub fn table_definition(name: &str, columns: &[(&str, &str)], key: &[&str]) -> TableDefinition {
    TableDefinition::new(
        name,
        columns
            .iter()
            .map(|(column, column_type)| ColumnDefinition::new(*column, *column_type))
            .collect(),
        key.iter().map(|column| column.to_string()).collect(),
    )
}

/// A vertical split of tables from `commerce/0` into `customer/0`, hosted by a [`FakeCluster`].
///
/// The source shard has a primary and two rdonly tablets, the destination shard has a primary
/// running filtered replication from the source and one rdonly tablet.
#[derive(Debug, Clone)]
pub struct VerticalSplit {
    pub cluster: FakeCluster,
    pub source_primary: TabletAlias,
    pub source_tablets: Vec<TabletAlias>,
    pub destination_primary: TabletAlias,
    pub destination_tablet: TabletAlias,
    pub source_uid: u32,
    pub tables: Vec<String>,
}

impl VerticalSplit {
    /// Creates the split for `tables`, without any table data.
    pub fn new(tables: &[&str]) -> Self {
        let cluster = FakeCluster::new();
        let source_primary = TabletAlias::new(CELL, 100);
        let source_tablets = vec![TabletAlias::new(CELL, 101), TabletAlias::new(CELL, 102)];
        let destination_primary = TabletAlias::new(CELL, 200);
        let destination_tablet = TabletAlias::new(CELL, 201);
        let source_uid = 0;

        cluster.add_shard(ShardInfo {
            keyspace: SOURCE_KEYSPACE.to_string(),
            name: SHARD.to_string(),
            primary: Some(source_primary.clone()),
            source_shards: vec![],
        });
        cluster.add_shard(ShardInfo {
            keyspace: DESTINATION_KEYSPACE.to_string(),
            name: SHARD.to_string(),
            primary: Some(destination_primary.clone()),
            source_shards: vec![SourceShard {
                uid: source_uid,
                keyspace: SOURCE_KEYSPACE.to_string(),
                shard: SHARD.to_string(),
                tables: tables.iter().map(|table| table.to_string()).collect(),
            }],
        });

        cluster.add_tablet(&source_primary, SOURCE_KEYSPACE, SHARD, TabletType::Primary);
        for tablet in &source_tablets {
            cluster.add_tablet(tablet, SOURCE_KEYSPACE, SHARD, TabletType::Rdonly);
            cluster.set_position(tablet, FILTERED_STREAM_OFFSET - 10);
        }
        cluster.add_tablet(
            &destination_primary,
            DESTINATION_KEYSPACE,
            SHARD,
            TabletType::Primary,
        );
        cluster.add_tablet(
            &destination_tablet,
            DESTINATION_KEYSPACE,
            SHARD,
            TabletType::Rdonly,
        );

        cluster.set_position(&destination_primary, DESTINATION_PRIMARY_OFFSET);
        cluster.set_position(&destination_tablet, DESTINATION_PRIMARY_OFFSET - 10);
        cluster.add_filtered_stream(&destination_primary, source_uid, FILTERED_STREAM_OFFSET);

        Self {
            cluster,
            source_primary,
            source_tablets,
            destination_primary,
            destination_tablet,
            source_uid,
            tables: tables.iter().map(|table| table.to_string()).collect(),
        }
    }

    /// Configuration verifying the destination shard, with short delays.
    pub fn config(&self) -> DiffConfig {
        let mut config = DiffConfig::new(CELL, DESTINATION_KEYSPACE, SHARD);
        config.remote_action_timeout_ms = 5_000;
        config.find_target_retry_delay_ms = 10;
        config
    }

    /// Creates a worker for this split with [`VerticalSplit::config`].
    pub fn worker(&self) -> (SplitDiffWorker<FakeCluster>, CancelTx) {
        self.worker_with(self.config())
    }

    pub fn worker_with(&self, config: DiffConfig) -> (SplitDiffWorker<FakeCluster>, CancelTx) {
        let (cancel_tx, cancel_rx) = create_cancel_channel();
        let worker = SplitDiffWorker::new(config, Arc::new(self.cluster.clone()), cancel_rx)
            .expect("Failed to create the split diff worker");

        (worker, cancel_tx)
    }

    /// Replaces the destination shard record, e.g. to break its metadata.
    pub fn update_destination_shard(&self, update: impl FnOnce(&mut ShardInfo)) {
        let mut shard = ShardInfo {
            keyspace: DESTINATION_KEYSPACE.to_string(),
            name: SHARD.to_string(),
            primary: Some(self.destination_primary.clone()),
            source_shards: vec![SourceShard {
                uid: self.source_uid,
                keyspace: SOURCE_KEYSPACE.to_string(),
                shard: SHARD.to_string(),
                tables: self.tables.clone(),
            }],
        };
        update(&mut shard);
        self.cluster.add_shard(shard);
    }

    /// Source tablet the worker picks, the lowest healthy rdonly alias.
    pub fn source_tablet(&self) -> &TabletAlias {
        &self.source_tablets[0]
    }

    pub fn add_source_table(&self, definition: &TableDefinition, rows: Vec<TableRow>) {
        for tablet in &self.source_tablets {
            self.cluster.add_table(tablet, definition, rows.clone());
        }
    }

    pub fn add_destination_table(&self, definition: &TableDefinition, rows: Vec<TableRow>) {
        self.cluster
            .add_table(&self.destination_tablet, definition, rows);
    }

    /// Adds `rows` to both sides of the split.
    pub fn add_table(&self, definition: &TableDefinition, rows: Vec<TableRow>) {
        self.add_source_table(definition, rows.clone());
        self.add_destination_table(definition, rows);
    }

    /// Asserts that every tablet is back in its original role with replication running.
    pub fn assert_restored(&self) {
        for tablet in &self.source_tablets {
            assert_eq!(self.cluster.tablet_type(tablet), Some(TabletType::Rdonly));
            assert!(self.cluster.replication_running(tablet), "{tablet} is stopped");
        }
        assert_eq!(
            self.cluster.tablet_type(&self.destination_tablet),
            Some(TabletType::Rdonly)
        );
        assert!(
            self.cluster.replication_running(&self.destination_tablet),
            "{} is stopped",
            self.destination_tablet
        );
        assert!(
            self.cluster
                .filtered_stream_running(&self.destination_primary, self.source_uid),
            "filtered replication is paused"
        );
        assert_eq!(self.cluster.open_streams(), 0);
    }

    /// Gives slow reads to the scans so that parallel diffs overlap.
    pub fn slow_down_scans(&self, delay: Duration) {
        self.cluster.set_row_delay(delay);
    }
}
