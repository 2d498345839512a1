//! Inverse actions undoing the remote mutations of a diff run.
//!
//! Every phase that changes remote state records the inverse of its change right after the
//! change succeeded. The chain is consumed once, in reverse registration order, when the
//! worker cleans up.

mod action;
mod chain;

pub use action::*;
pub use chain::*;
