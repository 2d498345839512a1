//! Contracts of the remote services the diff worker calls into.
//!
//! Topology storage, tablet selection, replication control, schema fetching and table scans
//! are provided by the surrounding system. The worker is generic over a single collaborator
//! type implementing all of them, so that one in-memory fake can stand in for the whole
//! cluster in tests.

pub mod scan;
pub mod schema;
pub mod selection;
pub mod tablet_manager;
pub mod topology;

pub use scan::*;
pub use schema::*;
pub use selection::*;
pub use tablet_manager::*;
pub use topology::*;
