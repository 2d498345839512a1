use std::sync::Arc;

use splitdiff_config::shared::DiffConfig;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use crate::bail;
use crate::compensation::{CompensationAction, CompensationChain};
use crate::concurrency::cancel::CancelRx;
use crate::concurrency::deadline::with_deadline;
use crate::concurrency::recorder::ErrorAccumulator;
use crate::diff::{DiffOrchestrator, SplitDiffReport};
use crate::diff_error;
use crate::error::{DiffError, DiffResult, ErrorKind};
#[cfg(feature = "failpoints")]
use crate::failpoints::{after_phase, split_diff_fail_point};
use crate::remote::{SchemaService, TableScanner, TabletManager, TabletSelector, TopologyService};
use crate::replication::{ReplicationSynchronizer, SyncTargets};
use crate::types::{ShardInfo, SourceShard, TabletAlias, TabletType};
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::state::{SharedWorkerState, WorkerState};
use crate::workers::status::WorkerStatus;

/// Result of a split diff run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Terminal state, either [`WorkerState::Done`] or [`WorkerState::Error`].
    pub state: WorkerState,
    /// Error of the run combined with the error of the cleanup.
    pub error: Option<DiffError>,
    /// Whether any table diff failed or found differences.
    pub had_differences: bool,
    /// Schema and row level results, present once the diff phase ran.
    pub report: Option<SplitDiffReport>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == WorkerState::Done && self.error.is_none()
    }
}

/// Shard metadata resolved during init.
#[derive(Debug, Clone)]
struct SplitTargets {
    primary: TabletAlias,
    source_shard: SourceShard,
}

/// Tablets taken out of serving for the diff.
#[derive(Debug, Clone)]
struct ReservedTablets {
    source: TabletAlias,
    destination: TabletAlias,
}

/// Verifies that a destination shard of a vertical split holds the same data as its source
/// shard, while filtered replication keeps running between them.
///
/// The worker runs `init`, `find_targets`, `synchronize_replication` and `diff` in order,
/// checking for cancellation after each of them. Every remote mutation registers its inverse
/// in a [`CompensationChain`], which runs exactly once when the worker cleans up, whatever
/// the outcome of the phases.
#[derive(Debug)]
pub struct SplitDiffWorker<C> {
    config: DiffConfig,
    collaborators: Arc<C>,
    state: SharedWorkerState,
    chain: CompensationChain,
    cancel: CancelRx,
}

impl<C> SplitDiffWorker<C>
where
    C: TopologyService
        + TabletSelector
        + TabletManager
        + SchemaService
        + TableScanner
        + Send
        + Sync
        + 'static,
{
    /// Creates a worker for the shard named in `config`.
    ///
    /// Fails with [`ErrorKind::ConfigurationError`] if the configuration is invalid.
    pub fn new(config: DiffConfig, collaborators: Arc<C>, cancel: CancelRx) -> DiffResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            collaborators,
            state: SharedWorkerState::new(),
            chain: CompensationChain::new(),
            cancel,
        })
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    pub fn current_state(&self) -> WorkerState {
        self.state.get()
    }

    /// Returns the state shared with the worker, readable while it runs.
    pub fn state_handle(&self) -> SharedWorkerState {
        self.state.clone()
    }

    pub fn compensations(&self) -> &CompensationChain {
        &self.chain
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::new(&self.config.keyspace, &self.config.shard, self.state.clone())
    }

    pub fn status_as_text(&self) -> String {
        self.status().as_text()
    }

    pub fn status_as_html(&self) -> String {
        self.status().as_html()
    }

    /// Runs all phases, then cleans up.
    ///
    /// The terminal state is [`WorkerState::Error`] if either the phases or the cleanup
    /// failed, [`WorkerState::Done`] otherwise. A run whose tables had differences ends in
    /// error with [`RunOutcome::had_differences`] set.
    pub async fn run(self) -> RunOutcome {
        let span = info_span!(
            "split_diff_worker",
            keyspace = %self.config.keyspace,
            shard = %self.config.shard
        );

        async move {
            let mut report = None;
            let run_result = self.run_phases(&mut report).await;
            if let Err(err) = &run_result {
                error!("split diff failed: {err}");
            }

            let cleanup_result = self.clean_up().await;
            if let Err(err) = &cleanup_result {
                if run_result.is_err() {
                    error!("cleanup failed in addition to the run error: {err}");
                } else {
                    error!("cleanup failed: {err}");
                }
            }

            let mut error = DiffError::combine(run_result.err(), cleanup_result.err());
            let terminal = if error.is_some() {
                WorkerState::Error
            } else {
                WorkerState::Done
            };
            if let Err(err) = self.state.advance(terminal) {
                error = DiffError::combine(error, Some(err));
            }
            info!("split diff finished in state '{}'", self.state.get());

            RunOutcome {
                state: self.state.get(),
                error,
                had_differences: self.state.had_differences(),
                report,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_phases(&self, report: &mut Option<SplitDiffReport>) -> DiffResult<()> {
        let targets = self.init().await?;
        self.check_done(WorkerState::Init)?;

        self.state.advance(WorkerState::FindTargets)?;
        let tablets = self.find_targets(&targets).await?;
        self.check_done(WorkerState::FindTargets)?;

        self.state.advance(WorkerState::SyncReplication)?;
        self.synchronize_replication(&targets, &tablets).await?;
        self.check_done(WorkerState::SyncReplication)?;

        self.state.advance(WorkerState::Diff)?;
        let errors = ErrorAccumulator::new();
        *report = Some(self.diff(&targets, &tablets, &errors).await?);
        if let Some(err) = errors.error().await {
            return Err(err);
        }
        self.check_done(self.state.get())?;

        Ok(())
    }

    /// Fails if the worker was cancelled, or if the failpoint following `phase` fires.
    fn check_done(&self, phase: WorkerState) -> DiffResult<()> {
        #[cfg(feature = "failpoints")]
        if let Some(name) = after_phase(phase) {
            split_diff_fail_point(name)?;
        }

        if self.cancel.is_cancelled() {
            bail!(
                ErrorKind::Cancelled,
                "The split diff was cancelled",
                format!("cancelled after '{phase}'")
            );
        }

        Ok(())
    }

    /// Reads the destination shard and validates that it is the target of a split.
    async fn init(&self) -> DiffResult<SplitTargets> {
        let timeout = self.config.remote_action_timeout();
        let keyspace = &self.config.keyspace;
        let shard_name = &self.config.shard;

        with_deadline(
            ErrorKind::ConfigurationError,
            "Cannot read the keyspace",
            "GetKeyspace",
            keyspace,
            timeout,
            self.collaborators.get_keyspace(keyspace),
        )
        .await?;

        let shard = with_deadline(
            ErrorKind::ConfigurationError,
            "Cannot read the shard",
            "GetShard",
            format!("{keyspace}/{shard_name}"),
            timeout,
            self.collaborators.get_shard(keyspace, shard_name),
        )
        .await?;

        let source_shard = select_source_shard(&shard, self.config.source_uid)?.clone();
        if source_shard.tables.is_empty() {
            bail!(
                ErrorKind::ConfigurationError,
                "The source shard has no tables to copy",
                format!("{shard} from {source_shard}")
            );
        }

        let Some(primary) = shard.primary.clone() else {
            bail!(ErrorKind::ConfigurationError, "The shard has no primary", shard);
        };

        info!(
            "verifying {shard} against {source_shard} ({} tables)",
            source_shard.tables.len()
        );

        Ok(SplitTargets {
            primary,
            source_shard,
        })
    }

    /// Reserves one destination tablet and one source tablet for the diff.
    async fn find_targets(&self, targets: &SplitTargets) -> DiffResult<ReservedTablets> {
        let destination = self
            .reserve_tablet(
                &self.config.keyspace,
                &self.config.shard,
                self.config.min_healthy_destination_tablets,
                self.config.destination_tablet_type,
            )
            .await?;

        let source = self
            .reserve_tablet(
                &targets.source_shard.keyspace,
                &targets.source_shard.shard,
                self.config.min_healthy_source_tablets,
                TabletType::Rdonly,
            )
            .await?;

        Ok(ReservedTablets {
            source,
            destination,
        })
    }

    /// Finds a healthy tablet and drains it, so that no other traffic reaches it.
    async fn reserve_tablet(
        &self,
        keyspace: &str,
        shard: &str,
        min_healthy: usize,
        tablet_type: TabletType,
    ) -> DiffResult<TabletAlias> {
        let tablet = self
            .find_healthy_tablet(keyspace, shard, min_healthy, tablet_type)
            .await?;

        info!(
            "changing tablet {tablet} from {tablet_type} to {}",
            TabletType::Drained
        );
        with_deadline(
            ErrorKind::TargetUnavailable,
            "Failed to drain the tablet",
            "ChangeTabletType",
            &tablet,
            self.config.remote_action_timeout(),
            self.collaborators
                .change_tablet_type(&tablet, TabletType::Drained),
        )
        .await?;
        self.chain
            .record(CompensationAction::ChangeTabletType {
                tablet: tablet.clone(),
                tablet_type,
            })
            .await?;

        Ok(tablet)
    }

    async fn find_healthy_tablet(
        &self,
        keyspace: &str,
        shard: &str,
        min_healthy: usize,
        tablet_type: TabletType,
    ) -> DiffResult<TabletAlias> {
        let cell = &self.config.cell;
        let attempts = self.config.find_target_attempts;

        let mut last_error = None;
        for attempt in 1..=attempts {
            let result = with_deadline(
                ErrorKind::TargetUnavailable,
                "No healthy tablet available",
                "FindHealthyTablet",
                format!("{cell}/{keyspace}/{shard}"),
                self.config.remote_action_timeout(),
                self.collaborators.find_healthy_tablet(
                    cell,
                    keyspace,
                    shard,
                    min_healthy,
                    tablet_type,
                ),
            )
            .await;

            match result {
                Ok(tablet) => {
                    info!("found {tablet_type} tablet {tablet} in {keyspace}/{shard}");
                    return Ok(tablet);
                }
                Err(err) => {
                    warn!(
                        "attempt {attempt}/{attempts} to find a {tablet_type} tablet in {keyspace}/{shard} failed: {err}"
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.find_target_retry_delay()).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            diff_error!(
                ErrorKind::TargetUnavailable,
                "No healthy tablet available",
                format!("{cell}/{keyspace}/{shard}")
            )
        }))
    }

    /// Stops the reserved tablets at the same point of the filtered replication stream.
    async fn synchronize_replication(
        &self,
        targets: &SplitTargets,
        tablets: &ReservedTablets,
    ) -> DiffResult<()> {
        let timeout = self.config.remote_action_timeout();

        let primary = with_deadline(
            ErrorKind::SyncReplicationError,
            "Cannot read the tablet record of the primary",
            "GetTablet",
            &targets.primary,
            timeout,
            self.collaborators.get_tablet(&targets.primary),
        )
        .await?;

        let synchronizer =
            ReplicationSynchronizer::new(self.collaborators.as_ref(), &self.chain, timeout);
        let positions = synchronizer
            .synchronize(&SyncTargets {
                primary: primary.alias,
                source_uid: targets.source_shard.uid,
                source: tablets.source.clone(),
                destination: tablets.destination.clone(),
            })
            .await?;

        info!(
            "source {} stopped at {}, destination {} stopped at {}",
            tablets.source, positions.source, tablets.destination, positions.destination
        );

        Ok(())
    }

    async fn diff(
        &self,
        targets: &SplitTargets,
        tablets: &ReservedTablets,
        errors: &ErrorAccumulator,
    ) -> DiffResult<SplitDiffReport> {
        let orchestrator = DiffOrchestrator::new(
            self.collaborators.clone(),
            tablets.source.clone(),
            tablets.destination.clone(),
            &self.config,
            self.state.clone(),
        );

        orchestrator
            .run(&targets.source_shard.tables, errors)
            .await
    }

    /// Runs the compensation chain.
    async fn clean_up(&self) -> DiffResult<()> {
        let transition = self.state.advance(WorkerState::CleanUp);

        let cleanup = self
            .chain
            .cleanup(
                self.collaborators.as_ref(),
                self.config.remote_action_timeout(),
            )
            .await;

        match (transition, cleanup) {
            (Ok(()), result) => result,
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => Err(DiffError::many(vec![err, cleanup_err])),
        }
    }
}

/// Picks the source shard to verify.
///
/// `source_uid` is required when the shard declares more than one source shard.
fn select_source_shard(shard: &ShardInfo, source_uid: Option<u32>) -> DiffResult<&SourceShard> {
    match (shard.source_shards.as_slice(), source_uid) {
        ([], _) => bail!(
            ErrorKind::ConfigurationError,
            "The shard has no source shard",
            shard
        ),
        (source_shards, Some(uid)) => source_shards
            .iter()
            .find(|source_shard| source_shard.uid == uid)
            .ok_or_else(|| {
                diff_error!(
                    ErrorKind::ConfigurationError,
                    "The shard has no source shard with the requested uid",
                    format!("{shard}: uid {uid}")
                )
            }),
        ([source_shard], None) => Ok(source_shard),
        (source_shards, None) => bail!(
            ErrorKind::ConfigurationError,
            "The shard has several source shards and no source uid was given",
            format!("{shard}: {} source shards", source_shards.len())
        ),
    }
}

impl<C> Worker<SplitDiffWorkerHandle, WorkerState> for SplitDiffWorker<C>
where
    C: TopologyService
        + TabletSelector
        + TabletManager
        + SchemaService
        + TableScanner
        + Send
        + Sync
        + 'static,
{
    type Error = DiffError;

    async fn start(self) -> Result<SplitDiffWorkerHandle, Self::Error> {
        info!(
            "starting split diff worker for {}/{}",
            self.config.keyspace, self.config.shard
        );

        let status = self.status();
        let compensations = self.chain.clone();
        let handle = tokio::spawn(self.run());

        Ok(SplitDiffWorkerHandle {
            status,
            compensations,
            handle,
        })
    }
}

/// Handle of a split diff worker running in the background.
#[derive(Debug)]
pub struct SplitDiffWorkerHandle {
    status: WorkerStatus,
    compensations: CompensationChain,
    handle: JoinHandle<RunOutcome>,
}

impl SplitDiffWorkerHandle {
    pub fn status(&self) -> &WorkerStatus {
        &self.status
    }

    pub fn compensations(&self) -> &CompensationChain {
        &self.compensations
    }
}

impl WorkerHandle<WorkerState> for SplitDiffWorkerHandle {
    type Output = RunOutcome;

    fn state(&self) -> WorkerState {
        self.status.state()
    }

    async fn wait(self) -> DiffResult<RunOutcome> {
        Ok(self.handle.await?)
    }
}
