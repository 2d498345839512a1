use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required identifier was left empty.
    #[error("`{0}` cannot be empty")]
    EmptyField(&'static str),
    /// The number of concurrent table diffs cannot be zero.
    #[error("`parallel_diffs_count` cannot be zero")]
    ParallelDiffsCountZero,
    /// More concurrent table diffs than a semaphore can hand out permits for.
    #[error("`parallel_diffs_count` cannot exceed {max}, got {0}", max = crate::shared::MAX_PARALLEL_DIFFS_COUNT)]
    ParallelDiffsCountTooLarge(usize),
    /// Every remote call needs a non-zero deadline.
    #[error("`remote_action_timeout_ms` cannot be zero")]
    RemoteActionTimeoutZero,
    /// Tablet selection needs at least one attempt.
    #[error("`find_target_attempts` cannot be zero")]
    FindTargetAttemptsZero,
    /// A minimum healthy tablet count of zero would accept an empty shard.
    #[error("`{0}` cannot be zero")]
    MinHealthyTabletsZero(&'static str),
    /// The primary cannot serve as a diff target.
    #[error("`destination_tablet_type` must be a replica or rdonly type, got {0}")]
    InvalidDestinationTabletType(crate::shared::TabletType),
}
