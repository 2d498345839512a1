//! Alignment of the source and destination tablets on a common replication point.

mod sync;

pub use sync::*;
