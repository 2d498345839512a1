use std::time::Duration;

use tracing::info;

use crate::compensation::{CompensationAction, CompensationChain};
use crate::concurrency::deadline::with_deadline;
use crate::error::{DiffResult, ErrorKind};
use crate::remote::TabletManager;
use crate::types::{ReplicationPosition, TabletAlias};

/// Time a tablet may spend waiting to reach a stop position, kept under the remote action
/// deadline so the tablet reports its own timeout first.
fn remote_wait_budget(deadline: Duration) -> Duration {
    deadline - deadline / 10
}

/// Tablets taking part in a replication synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTargets {
    /// Primary of the destination shard, running the filtered replication stream.
    pub primary: TabletAlias,
    /// Uid of the filtered replication stream fed by the source shard.
    pub source_uid: u32,
    /// Tablet of the source shard that will be scanned.
    pub source: TabletAlias,
    /// Tablet of the destination shard that will be scanned.
    pub destination: TabletAlias,
}

/// Positions at which the scanned tablets were stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedPositions {
    pub source: ReplicationPosition,
    pub destination: ReplicationPosition,
}

/// Stops a source and a destination tablet at the same logical point of the replication
/// stream between their shards, without stopping writes on the primaries.
///
/// The protocol runs in five strictly sequential steps, each bounded by the remote action
/// deadline:
///
/// 1. Pause the filtered replication stream on the destination primary and read the source
///    position it recorded.
/// 2. Stop the source tablet at or past that position.
/// 3. Let the filtered replication stream run up to the exact stop position of the source
///    tablet and wait for it to get there.
/// 4. Stop the destination tablet at or past the position the destination primary reached.
/// 5. Restart the filtered replication stream for good.
///
/// After step 5 both tablets hold the same data, with the filtered stream free to go on.
#[derive(Debug)]
pub struct ReplicationSynchronizer<'a, M> {
    manager: &'a M,
    chain: &'a CompensationChain,
    deadline: Duration,
}

impl<'a, M> ReplicationSynchronizer<'a, M>
where
    M: TabletManager + Sync,
{
    pub fn new(manager: &'a M, chain: &'a CompensationChain, deadline: Duration) -> Self {
        Self {
            manager,
            chain,
            deadline,
        }
    }

    /// Runs the five synchronization steps.
    ///
    /// Each remote mutation records its inverse in the compensation chain as soon as it
    /// succeeded, so the chain reverts whatever was done if a later step fails. Any failure is
    /// reported as [`ErrorKind::SyncReplicationError`].
    pub async fn synchronize(&self, targets: &SyncTargets) -> DiffResult<SyncedPositions> {
        let SyncTargets {
            primary,
            source_uid,
            source,
            destination,
        } = targets;
        let source_uid = *source_uid;

        // 1 - pause the filtered stream and read where it stopped.
        info!("stopping filtered replication {source_uid} on primary {primary}");
        let stream_position = with_deadline(
            ErrorKind::SyncReplicationError,
            "Failed to pause filtered replication",
            "PauseFilteredStream",
            primary,
            self.deadline,
            self.manager.pause_filtered_stream(primary, source_uid),
        )
        .await?;
        let resume_stream = CompensationAction::ResumeFilteredStream {
            primary: primary.clone(),
            source_uid,
        };
        self.chain.record(resume_stream.clone()).await?;

        // 2 - stop the source tablet at or past the stream position.
        info!("stopping replication on {source} at a minimum of {stream_position}");
        let source_position = with_deadline(
            ErrorKind::SyncReplicationError,
            "Failed to stop replication on the source tablet",
            "StopReplicationMinimum",
            source,
            self.deadline,
            self.manager.stop_replication_minimum(
                source,
                &stream_position,
                remote_wait_budget(self.deadline),
            ),
        )
        .await?;
        self.chain
            .record(CompensationAction::StartReplication {
                tablet: source.clone(),
            })
            .await?;

        // 3 - let the filtered stream catch up with the source tablet, and no further.
        info!("restarting filtered replication on primary {primary} until {source_position}");
        with_deadline(
            ErrorKind::SyncReplicationError,
            "Failed to resume filtered replication up to the source position",
            "ResumeFilteredStreamUntil",
            primary,
            self.deadline,
            self.manager
                .resume_filtered_stream(primary, source_uid, Some(&source_position)),
        )
        .await?;
        with_deadline(
            ErrorKind::SyncReplicationError,
            "Filtered replication did not reach the source position",
            "WaitForFilteredPosition",
            primary,
            self.deadline,
            self.manager
                .wait_for_filtered_position(primary, source_uid, &source_position),
        )
        .await?;

        // 4 - stop the destination tablet where the primary is now.
        let primary_position = with_deadline(
            ErrorKind::SyncReplicationError,
            "Failed to read the destination primary position",
            "CurrentPosition",
            primary,
            self.deadline,
            self.manager.current_position(primary),
        )
        .await?;
        info!("waiting for destination tablet {destination} to catch up to {primary_position}");
        let destination_position = with_deadline(
            ErrorKind::SyncReplicationError,
            "Failed to stop replication on the destination tablet",
            "StopReplicationMinimum",
            destination,
            self.deadline,
            self.manager
                .stop_replication_minimum(
                    destination,
                    &primary_position,
                    remote_wait_budget(self.deadline),
                ),
        )
        .await?;
        self.chain
            .record(CompensationAction::StartReplication {
                tablet: destination.clone(),
            })
            .await?;

        // 5 - restart the filtered stream, nothing left to undo for step 1.
        info!("restarting filtered replication on primary {primary}");
        with_deadline(
            ErrorKind::SyncReplicationError,
            "Failed to resume filtered replication",
            "ResumeFilteredStream",
            primary,
            self.deadline,
            self.manager.resume_filtered_stream(primary, source_uid, None),
        )
        .await?;
        self.chain.remove(&resume_stream).await;

        info!(
            "source {source} stopped at {source_position}, destination {destination} stopped at \
             {destination_position}"
        );

        Ok(SyncedPositions {
            source: source_position,
            destination: destination_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeCluster, Failure, Operation, RemoteCall, position};

    fn targets() -> SyncTargets {
        SyncTargets {
            primary: TabletAlias::new("zone1", 200),
            source_uid: 0,
            source: TabletAlias::new("zone1", 101),
            destination: TabletAlias::new("zone1", 201),
        }
    }

    fn cluster() -> FakeCluster {
        let cluster = FakeCluster::new();
        let targets = targets();
        cluster.add_filtered_stream(&targets.primary, targets.source_uid, 1_000);
        cluster.set_position(&targets.primary, 5_000);
        cluster
    }

    #[tokio::test]
    async fn runs_the_five_steps_in_order() {
        let cluster = cluster();
        let chain = CompensationChain::new();
        let targets = targets();

        let positions = ReplicationSynchronizer::new(&cluster, &chain, Duration::from_secs(5))
            .synchronize(&targets)
            .await
            .unwrap();

        // The fake stops replication a few events past the requested minimum.
        let source_position = position(1_000 + FakeCluster::STOP_OVERSHOOT);
        let primary_position = position(5_000);
        assert_eq!(positions.source, source_position);
        assert_eq!(
            positions.destination,
            position(5_000 + FakeCluster::STOP_OVERSHOOT)
        );

        assert_eq!(
            cluster.journal(),
            vec![
                RemoteCall::PauseFilteredStream {
                    primary: targets.primary.clone(),
                    source_uid: 0
                },
                RemoteCall::StopReplicationMinimum {
                    tablet: targets.source.clone(),
                    minimum: position(1_000)
                },
                RemoteCall::ResumeFilteredStream {
                    primary: targets.primary.clone(),
                    source_uid: 0,
                    until: Some(source_position.clone())
                },
                RemoteCall::WaitForFilteredPosition {
                    primary: targets.primary.clone(),
                    source_uid: 0,
                    position: source_position.clone()
                },
                RemoteCall::CurrentPosition {
                    tablet: targets.primary.clone()
                },
                RemoteCall::StopReplicationMinimum {
                    tablet: targets.destination.clone(),
                    minimum: primary_position
                },
                RemoteCall::ResumeFilteredStream {
                    primary: targets.primary.clone(),
                    source_uid: 0,
                    until: None
                },
            ]
        );

        // The step 1 compensation is gone, the stopped tablets still have to be restarted.
        assert_eq!(
            chain.entries().await,
            vec![
                CompensationAction::StartReplication {
                    tablet: targets.source.clone()
                },
                CompensationAction::StartReplication {
                    tablet: targets.destination.clone()
                },
            ]
        );
        assert!(cluster.filtered_stream_running(&targets.primary, 0));
        assert!(!cluster.replication_running(&targets.source));
        assert!(!cluster.replication_running(&targets.destination));
    }

    #[tokio::test]
    async fn failure_keeps_compensations_of_completed_steps() {
        let cluster = cluster();
        cluster.inject(Failure::on(Operation::WaitForFilteredPosition));
        let chain = CompensationChain::new();
        let targets = targets();

        let err = ReplicationSynchronizer::new(&cluster, &chain, Duration::from_secs(5))
            .synchronize(&targets)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SyncReplicationError);
        assert!(err.detail().unwrap().contains("WaitForFilteredPosition"));
        assert_eq!(
            chain.entries().await,
            vec![
                CompensationAction::ResumeFilteredStream {
                    primary: targets.primary.clone(),
                    source_uid: 0
                },
                CompensationAction::StartReplication {
                    tablet: targets.source.clone()
                },
            ]
        );
    }

    #[tokio::test]
    async fn failed_final_resume_leaves_the_stream_to_cleanup() {
        let cluster = cluster();
        cluster.inject(
            Failure::on(Operation::ResumeFilteredStream)
                .after(1)
                .times(1),
        );
        let chain = CompensationChain::new();
        let targets = targets();

        let err = ReplicationSynchronizer::new(&cluster, &chain, Duration::from_secs(5))
            .synchronize(&targets)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SyncReplicationError);
        assert!(err.detail().unwrap().contains("ResumeFilteredStream on"));
        assert_eq!(
            chain.entries().await,
            vec![
                CompensationAction::ResumeFilteredStream {
                    primary: targets.primary.clone(),
                    source_uid: 0
                },
                CompensationAction::StartReplication {
                    tablet: targets.source.clone()
                },
                CompensationAction::StartReplication {
                    tablet: targets.destination.clone()
                },
            ]
        );
        assert!(!cluster.filtered_stream_running(&targets.primary, 0));
    }

    #[tokio::test]
    async fn tablets_wait_less_than_the_call_deadline() {
        let cluster = cluster();
        let chain = CompensationChain::new();
        let deadline = Duration::from_secs(30);

        ReplicationSynchronizer::new(&cluster, &chain, deadline)
            .synchronize(&targets())
            .await
            .unwrap();

        assert_eq!(
            cluster.stop_wait_timeouts(),
            vec![Duration::from_secs(27), Duration::from_secs(27)]
        );
    }

    #[tokio::test]
    async fn failed_pause_registers_nothing() {
        let cluster = cluster();
        cluster.inject(Failure::on(Operation::PauseFilteredStream));
        let chain = CompensationChain::new();

        let err = ReplicationSynchronizer::new(&cluster, &chain, Duration::from_secs(5))
            .synchronize(&targets())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SyncReplicationError);
        assert!(chain.entries().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_step_times_out() {
        let cluster = cluster();
        cluster.inject(Failure::on(Operation::CurrentPosition).hanging());
        let chain = CompensationChain::new();

        let err = ReplicationSynchronizer::new(&cluster, &chain, Duration::from_secs(5))
            .synchronize(&targets())
            .await
            .unwrap_err();

        assert_eq!(
            err.kinds(),
            vec![
                ErrorKind::SyncReplicationError,
                ErrorKind::RemoteActionTimeout
            ]
        );
        assert_eq!(chain.entries().await.len(), 2);
    }
}
