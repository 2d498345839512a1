//! In-memory stand-ins for the remote services, used by unit and integration tests.

mod cluster;
mod failure;
mod journal;
mod stream;
mod topology;

pub use cluster::*;
pub use failure::*;
pub use journal::*;
pub use stream::*;
pub use topology::*;
