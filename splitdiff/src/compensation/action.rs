use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::concurrency::deadline::with_deadline;
use crate::error::{DiffResult, ErrorKind};
use crate::remote::TabletManager;
use crate::types::{TabletAlias, TabletType};

/// A compensating action, stored as data so that pending cleanups can be inspected.
///
/// All actions are safe to execute more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CompensationAction {
    /// Restarts the filtered replication stream `source_uid` on a destination primary.
    ResumeFilteredStream {
        primary: TabletAlias,
        source_uid: u32,
    },
    /// Restarts replication on a tablet that was stopped for the diff.
    StartReplication { tablet: TabletAlias },
    /// Puts a tablet back into the role it had before the worker reserved it.
    ChangeTabletType {
        tablet: TabletAlias,
        tablet_type: TabletType,
    },
}

impl CompensationAction {
    /// Name of the remote operation performed by this action.
    pub fn operation(&self) -> &'static str {
        match self {
            CompensationAction::ResumeFilteredStream { .. } => "ResumeFilteredStream",
            CompensationAction::StartReplication { .. } => "StartReplication",
            CompensationAction::ChangeTabletType { .. } => "ChangeTabletType",
        }
    }

    /// Tablet the action is executed on.
    pub fn tablet(&self) -> &TabletAlias {
        match self {
            CompensationAction::ResumeFilteredStream { primary, .. } => primary,
            CompensationAction::StartReplication { tablet }
            | CompensationAction::ChangeTabletType { tablet, .. } => tablet,
        }
    }

    /// Executes the action, failing with [`ErrorKind::CleanupError`] after `deadline`.
    pub async fn execute<M>(&self, manager: &M, deadline: Duration) -> DiffResult<()>
    where
        M: TabletManager,
    {
        let future = async {
            match self {
                CompensationAction::ResumeFilteredStream {
                    primary,
                    source_uid,
                } => {
                    manager
                        .resume_filtered_stream(primary, *source_uid, None)
                        .await
                }
                CompensationAction::StartReplication { tablet } => {
                    manager.start_replication(tablet).await
                }
                CompensationAction::ChangeTabletType {
                    tablet,
                    tablet_type,
                } => manager.change_tablet_type(tablet, *tablet_type).await,
            }
        };

        with_deadline(
            ErrorKind::CleanupError,
            "Compensating action failed",
            self.operation(),
            self.tablet(),
            deadline,
            future,
        )
        .await
    }
}

impl fmt::Display for CompensationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompensationAction::ResumeFilteredStream {
                primary,
                source_uid,
            } => write!(f, "ResumeFilteredStream({source_uid}) on {primary}"),
            CompensationAction::StartReplication { tablet } => {
                write!(f, "StartReplication on {tablet}")
            }
            CompensationAction::ChangeTabletType {
                tablet,
                tablet_type,
            } => write!(f, "ChangeTabletType({tablet_type}) on {tablet}"),
        }
    }
}
