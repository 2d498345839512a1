use crate::test_utils::Operation;
use crate::types::{ReplicationPosition, TabletAlias, TabletType};

/// A remote call received by the fake cluster.
///
/// Row reads and stream closes are not journaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    GetKeyspace {
        keyspace: String,
    },
    GetShard {
        keyspace: String,
        shard: String,
    },
    GetTablet {
        tablet: TabletAlias,
    },
    FindHealthyTablet {
        keyspace: String,
        shard: String,
        tablet_type: TabletType,
    },
    PauseFilteredStream {
        primary: TabletAlias,
        source_uid: u32,
    },
    ResumeFilteredStream {
        primary: TabletAlias,
        source_uid: u32,
        until: Option<ReplicationPosition>,
    },
    WaitForFilteredPosition {
        primary: TabletAlias,
        source_uid: u32,
        position: ReplicationPosition,
    },
    CurrentPosition {
        tablet: TabletAlias,
    },
    StopReplicationMinimum {
        tablet: TabletAlias,
        minimum: ReplicationPosition,
    },
    StartReplication {
        tablet: TabletAlias,
    },
    ChangeTabletType {
        tablet: TabletAlias,
        tablet_type: TabletType,
    },
    GetSchema {
        tablet: TabletAlias,
    },
    OpenOrderedScan {
        tablet: TabletAlias,
        table: String,
    },
}

impl RemoteCall {
    pub fn operation(&self) -> Operation {
        match self {
            RemoteCall::GetKeyspace { .. } => Operation::GetKeyspace,
            RemoteCall::GetShard { .. } => Operation::GetShard,
            RemoteCall::GetTablet { .. } => Operation::GetTablet,
            RemoteCall::FindHealthyTablet { .. } => Operation::FindHealthyTablet,
            RemoteCall::PauseFilteredStream { .. } => Operation::PauseFilteredStream,
            RemoteCall::ResumeFilteredStream { .. } => Operation::ResumeFilteredStream,
            RemoteCall::WaitForFilteredPosition { .. } => Operation::WaitForFilteredPosition,
            RemoteCall::CurrentPosition { .. } => Operation::CurrentPosition,
            RemoteCall::StopReplicationMinimum { .. } => Operation::StopReplicationMinimum,
            RemoteCall::StartReplication { .. } => Operation::StartReplication,
            RemoteCall::ChangeTabletType { .. } => Operation::ChangeTabletType,
            RemoteCall::GetSchema { .. } => Operation::GetSchema,
            RemoteCall::OpenOrderedScan { .. } => Operation::OpenOrderedScan,
        }
    }

    /// Tablet the call was addressed to, if any.
    pub fn tablet(&self) -> Option<&TabletAlias> {
        match self {
            RemoteCall::GetKeyspace { .. }
            | RemoteCall::GetShard { .. }
            | RemoteCall::FindHealthyTablet { .. } => None,
            RemoteCall::PauseFilteredStream { primary, .. }
            | RemoteCall::ResumeFilteredStream { primary, .. }
            | RemoteCall::WaitForFilteredPosition { primary, .. } => Some(primary),
            RemoteCall::GetTablet { tablet }
            | RemoteCall::CurrentPosition { tablet }
            | RemoteCall::StopReplicationMinimum { tablet, .. }
            | RemoteCall::StartReplication { tablet }
            | RemoteCall::ChangeTabletType { tablet, .. }
            | RemoteCall::GetSchema { tablet }
            | RemoteCall::OpenOrderedScan { tablet, .. } => Some(tablet),
        }
    }

    /// Table the call was about, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            RemoteCall::OpenOrderedScan { table, .. } => Some(table),
            _ => None,
        }
    }

    /// Returns `true` if the call changes the state of the cluster.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RemoteCall::PauseFilteredStream { .. }
                | RemoteCall::ResumeFilteredStream { .. }
                | RemoteCall::StopReplicationMinimum { .. }
                | RemoteCall::StartReplication { .. }
                | RemoteCall::ChangeTabletType { .. }
        )
    }
}
