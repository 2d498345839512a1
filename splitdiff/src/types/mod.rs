//! Core data types shared by the worker phases.
//!
//! Re-exports tablet and shard metadata, replication positions, schema definitions and row
//! values.

mod cell;
mod position;
mod schema;
mod table_row;
mod tablet;
mod topology;

pub use cell::*;
pub use position::*;
pub use schema::*;
pub use table_row::*;
pub use tablet::*;
pub use topology::*;
