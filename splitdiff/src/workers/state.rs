use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::Serialize;

use crate::bail;
use crate::error::{DiffResult, ErrorKind};

/// Phase of a split diff worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Init = 0,
    FindTargets = 1,
    SyncReplication = 2,
    Diff = 3,
    /// Still diffing, but at least one table already failed or had differences.
    DiffWillFail = 4,
    CleanUp = 5,
    Done = 6,
    Error = 7,
}

impl WorkerState {
    fn from_u8(value: u8) -> WorkerState {
        match value {
            0 => WorkerState::Init,
            1 => WorkerState::FindTargets,
            2 => WorkerState::SyncReplication,
            3 => WorkerState::Diff,
            4 => WorkerState::DiffWillFail,
            5 => WorkerState::CleanUp,
            6 => WorkerState::Done,
            _ => WorkerState::Error,
        }
    }

    /// Returns `true` once the worker finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Done | WorkerState::Error)
    }

    /// Returns `true` if the worker may move from `self` to `next`.
    ///
    /// Phases only move forward. Cleanup can be entered from any running phase and is the only
    /// way into a terminal state.
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;

        match (self, next) {
            (Init, FindTargets)
            | (FindTargets, SyncReplication)
            | (SyncReplication, Diff)
            | (Diff, DiffWillFail)
            | (CleanUp, Done)
            | (CleanUp, Error) => true,
            (current, CleanUp) => !current.is_terminal() && *current != CleanUp,
            _ => false,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            WorkerState::Init => "initializing",
            WorkerState::FindTargets => "finding target instances",
            WorkerState::SyncReplication => "synchronizing replication",
            WorkerState::Diff => "running the diff",
            WorkerState::DiffWillFail => "running the diff, already found differences",
            WorkerState::CleanUp => "cleaning up",
            WorkerState::Done => "done",
            WorkerState::Error => "error",
        };

        f.write_str(description)
    }
}

#[derive(Debug)]
struct Inner {
    state: AtomicU8,
    had_differences: AtomicBool,
}

/// Worker state readable from any task.
///
/// Only the worker moves the state forward. Table diff tasks can additionally flag the run
/// as going to fail, and status readers only ever load it.
#[derive(Debug, Clone)]
pub struct SharedWorkerState {
    inner: Arc<Inner>,
}

impl SharedWorkerState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(WorkerState::Init as u8),
                had_differences: AtomicBool::new(false),
            }),
        }
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Returns `true` if any table diff failed or found differences during this run.
    pub fn had_differences(&self) -> bool {
        self.inner.had_differences.load(Ordering::Acquire)
    }

    /// Moves the worker to `next`, failing if the transition is not allowed.
    pub fn advance(&self, next: WorkerState) -> DiffResult<()> {
        let current = self.get();
        if !current.can_transition_to(next) {
            bail!(
                ErrorKind::InvalidState,
                "Invalid worker state transition",
                format!("{current:?} -> {next:?}")
            );
        }

        self.inner.state.store(next as u8, Ordering::Release);

        Ok(())
    }

    /// Flags the run as going to fail without interrupting it.
    ///
    /// Moves `Diff` to `DiffWillFail`. In any other state only the flag is recorded.
    pub fn mark_will_fail(&self) {
        self.inner.had_differences.store(true, Ordering::Release);
        let _ = self.inner.state.compare_exchange(
            WorkerState::Diff as u8,
            WorkerState::DiffWillFail as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Default for SharedWorkerState {
    fn default() -> Self {
        Self::new()
    }
}
