//! Failpoints for injecting failures between the phases of a split diff worker.
//!
//! Uses the `fail` crate. A failpoint configured with `return` makes the worker fail right
//! after the phase it follows, so tests can check that cleanup undoes what was done so far.

use fail::fail_point;

use crate::bail;
use crate::error::{DiffResult, ErrorKind};
use crate::workers::state::WorkerState;

pub const SPLIT_DIFF_AFTER_INIT: &str = "split_diff.after_init";
pub const SPLIT_DIFF_AFTER_FIND_TARGETS: &str = "split_diff.after_find_targets";
pub const SPLIT_DIFF_AFTER_SYNC_REPLICATION: &str = "split_diff.after_sync_replication";
pub const SPLIT_DIFF_AFTER_DIFF: &str = "split_diff.after_diff";

/// Returns the failpoint evaluated once `phase` completed, if there is one.
pub fn after_phase(phase: WorkerState) -> Option<&'static str> {
    match phase {
        WorkerState::Init => Some(SPLIT_DIFF_AFTER_INIT),
        WorkerState::FindTargets => Some(SPLIT_DIFF_AFTER_FIND_TARGETS),
        WorkerState::SyncReplication => Some(SPLIT_DIFF_AFTER_SYNC_REPLICATION),
        WorkerState::Diff | WorkerState::DiffWillFail => Some(SPLIT_DIFF_AFTER_DIFF),
        _ => None,
    }
}

/// Evaluates the failpoint `name`.
///
/// Returns an [`ErrorKind::FailpointError`] error when the failpoint is configured to return,
/// and `Ok(())` when it is inactive.
pub fn split_diff_fail_point(name: &str) -> DiffResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::FailpointError,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}

