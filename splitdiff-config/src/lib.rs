//! Configuration management for split diff workers.
//!
//! Provides environment detection, configuration loading from YAML files and
//! environment variables, and the shared configuration types consumed by the
//! worker.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
