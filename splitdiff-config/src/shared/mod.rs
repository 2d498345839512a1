mod base;
mod diff;
mod tablet;

pub use base::*;
pub use diff::*;
pub use tablet::*;
