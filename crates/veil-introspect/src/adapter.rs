use async_trait::async_trait;

use veil_core::TableMetaData;

use crate::errors::Result;

/// Source of structural information about the tables a policy touches.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Returns the engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Columns, types, sizes and key flags of `name` (`table` or `schema.table`).
    async fn table(&self, name: &str) -> Result<TableMetaData>;
}
