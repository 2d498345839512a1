use std::future::Future;

use crate::error::DiffResult;
use crate::types::{SchemaDefinition, TabletAlias};

/// Fetches table definitions from a tablet.
pub trait SchemaService {
    /// Returns the definitions of the tables named in `tables` that exist on `tablet`.
    fn get_schema(
        &self,
        tablet: &TabletAlias,
        tables: &[String],
    ) -> impl Future<Output = DiffResult<SchemaDefinition>> + Send;
}
