//! Schema and row level comparison of the two sides of a split.

mod orchestrator;
mod report;
mod row;
mod schema;

pub use orchestrator::*;
pub use report::*;
pub use row::*;
pub use schema::*;
