use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::{TabletType, ValidationError};

/// Upper bound of `parallel_diffs_count`, the permit limit of `tokio::sync::Semaphore`.
pub const MAX_PARALLEL_DIFFS_COUNT: usize = usize::MAX >> 3;

/// Configuration for one split diff run.
///
/// Holds every tunable the worker needs, passed explicitly at construction so that
/// concurrent workers in the same process can run with different settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Cell in which the source and destination tablets are picked.
    pub cell: String,
    /// Keyspace of the destination shard.
    pub keyspace: String,
    /// Destination shard to verify against its source shard.
    pub shard: String,
    /// Uid of the source shard entry to verify.
    ///
    /// Only needed when the destination shard declares more than one source shard.
    #[serde(default)]
    pub source_uid: Option<u32>,
    /// Minimum number of healthy rdonly tablets the source shard must keep.
    #[serde(default = "default_min_healthy_source_tablets")]
    pub min_healthy_source_tablets: usize,
    /// Minimum number of healthy tablets of `destination_tablet_type` in the destination shard.
    #[serde(default = "default_min_healthy_destination_tablets")]
    pub min_healthy_destination_tablets: usize,
    /// Type of the destination tablet used for the diff.
    #[serde(default = "default_destination_tablet_type")]
    pub destination_tablet_type: TabletType,
    /// Maximum number of table diffs running at the same time.
    #[serde(default = "default_parallel_diffs_count")]
    pub parallel_diffs_count: usize,
    /// Deadline applied to every remote call, in milliseconds.
    #[serde(default = "default_remote_action_timeout_ms")]
    pub remote_action_timeout_ms: u64,
    /// Number of attempts when looking for a healthy tablet.
    #[serde(default = "default_find_target_attempts")]
    pub find_target_attempts: u32,
    /// Delay between two tablet lookup attempts, in milliseconds.
    #[serde(default = "default_find_target_retry_delay_ms")]
    pub find_target_retry_delay_ms: u64,
    /// Maximum number of discrepancies stored per table. Counters stay exact.
    #[serde(default = "default_max_discrepancy_samples")]
    pub max_discrepancy_samples: usize,
}

const fn default_min_healthy_source_tablets() -> usize {
    2
}

const fn default_min_healthy_destination_tablets() -> usize {
    1
}

const fn default_destination_tablet_type() -> TabletType {
    TabletType::Rdonly
}

const fn default_parallel_diffs_count() -> usize {
    8
}

const fn default_remote_action_timeout_ms() -> u64 {
    30_000
}

const fn default_find_target_attempts() -> u32 {
    3
}

const fn default_find_target_retry_delay_ms() -> u64 {
    1_000
}

const fn default_max_discrepancy_samples() -> usize {
    100
}

impl DiffConfig {
    /// Creates a configuration for `keyspace/shard` in `cell` with default tunables.
    pub fn new(
        cell: impl Into<String>,
        keyspace: impl Into<String>,
        shard: impl Into<String>,
    ) -> Self {
        Self {
            cell: cell.into(),
            keyspace: keyspace.into(),
            shard: shard.into(),
            source_uid: None,
            min_healthy_source_tablets: default_min_healthy_source_tablets(),
            min_healthy_destination_tablets: default_min_healthy_destination_tablets(),
            destination_tablet_type: default_destination_tablet_type(),
            parallel_diffs_count: default_parallel_diffs_count(),
            remote_action_timeout_ms: default_remote_action_timeout_ms(),
            find_target_attempts: default_find_target_attempts(),
            find_target_retry_delay_ms: default_find_target_retry_delay_ms(),
            max_discrepancy_samples: default_max_discrepancy_samples(),
        }
    }

    /// Returns the deadline applied to each remote call.
    pub fn remote_action_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_action_timeout_ms)
    }

    /// Returns the delay between tablet lookup attempts.
    pub fn find_target_retry_delay(&self) -> Duration {
        Duration::from_millis(self.find_target_retry_delay_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cell.is_empty() {
            return Err(ValidationError::EmptyField("cell"));
        }
        if self.keyspace.is_empty() {
            return Err(ValidationError::EmptyField("keyspace"));
        }
        if self.shard.is_empty() {
            return Err(ValidationError::EmptyField("shard"));
        }

        if self.parallel_diffs_count == 0 {
            return Err(ValidationError::ParallelDiffsCountZero);
        }
        if self.parallel_diffs_count > MAX_PARALLEL_DIFFS_COUNT {
            return Err(ValidationError::ParallelDiffsCountTooLarge(
                self.parallel_diffs_count,
            ));
        }

        if self.remote_action_timeout_ms == 0 {
            return Err(ValidationError::RemoteActionTimeoutZero);
        }

        if self.find_target_attempts == 0 {
            return Err(ValidationError::FindTargetAttemptsZero);
        }

        if self.min_healthy_source_tablets == 0 {
            return Err(ValidationError::MinHealthyTabletsZero(
                "min_healthy_source_tablets",
            ));
        }
        if self.min_healthy_destination_tablets == 0 {
            return Err(ValidationError::MinHealthyTabletsZero(
                "min_healthy_destination_tablets",
            ));
        }

        if !self.destination_tablet_type.is_diffable() {
            return Err(ValidationError::InvalidDestinationTabletType(
                self.destination_tablet_type,
            ));
        }

        Ok(())
    }
}
