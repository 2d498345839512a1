//! Verification of a vertical split while filtered replication keeps running.
//!
//! A [`workers::SplitDiffWorker`] stops one source tablet and one destination tablet at the
//! same point of the replication stream between their shards, compares the schemas and the
//! rows of every copied table, and restores both tablets afterwards.

pub mod compensation;
pub mod concurrency;
pub mod diff;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod remote;
pub mod replication;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
