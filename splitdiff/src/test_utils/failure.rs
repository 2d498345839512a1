use crate::error::ErrorKind;
use crate::types::TabletAlias;

/// Remote operations of the fake cluster that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetKeyspace,
    GetShard,
    GetTablet,
    FindHealthyTablet,
    PauseFilteredStream,
    ResumeFilteredStream,
    WaitForFilteredPosition,
    CurrentPosition,
    StopReplicationMinimum,
    StartReplication,
    ChangeTabletType,
    GetSchema,
    OpenOrderedScan,
    NextRow,
    CloseScan,
}

impl Operation {
    /// Kind of the error returned when this operation fails.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Operation::GetSchema => ErrorKind::SchemaFetchFailed,
            Operation::OpenOrderedScan | Operation::NextRow | Operation::CloseScan => {
                ErrorKind::RowStreamFailed
            }
            _ => ErrorKind::RemoteActionFailed,
        }
    }
}

/// How an injected failure manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The operation returns an error.
    Error,
    /// The operation never completes.
    Hang,
    /// The operation panics.
    Panic,
}

/// A failure injected into the fake cluster.
///
/// Matches every call of `operation` unless narrowed down to a tablet or a table.
#[derive(Debug, Clone)]
pub struct Failure {
    pub(crate) operation: Operation,
    pub(crate) tablet: Option<TabletAlias>,
    pub(crate) table: Option<String>,
    pub(crate) skip: usize,
    pub(crate) remaining: Option<usize>,
    pub(crate) mode: FailureMode,
}

impl Failure {
    pub fn on(operation: Operation) -> Self {
        Self {
            operation,
            tablet: None,
            table: None,
            skip: 0,
            remaining: None,
            mode: FailureMode::Error,
        }
    }

    pub fn on_tablet(mut self, tablet: TabletAlias) -> Self {
        self.tablet = Some(tablet);
        self
    }

    pub fn for_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Lets the first `count` matching calls succeed.
    pub fn after(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    /// Fails only the next `count` matching calls.
    pub fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    pub fn hanging(mut self) -> Self {
        self.mode = FailureMode::Hang;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.mode = FailureMode::Panic;
        self
    }

    pub(crate) fn matches(
        &self,
        operation: Operation,
        tablet: Option<&TabletAlias>,
        table: Option<&str>,
    ) -> bool {
        if self.operation != operation || self.remaining == Some(0) {
            return false;
        }

        if let Some(expected) = &self.tablet
            && tablet != Some(expected)
        {
            return false;
        }

        if let Some(expected) = &self.table
            && table != Some(expected.as_str())
        {
            return false;
        }

        true
    }
}
