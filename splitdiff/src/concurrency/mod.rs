//! Concurrency primitives shared by the worker phases.
//!
//! Contains the cancellation signal checked between phases, the error accumulator written
//! by parallel table diffs, and the deadline wrapper applied to every remote call.

pub mod cancel;
pub mod deadline;
pub mod recorder;
