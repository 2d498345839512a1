//! The split diff worker and the pieces it is built from.

pub mod base;
pub mod state;
mod split_diff;
mod status;

pub use split_diff::*;
pub use status::*;
