use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use veil_core::{TableMetaData, validate_metadata};

use crate::adapter::MetadataProvider;
use crate::errors::{MetadataError, Result};
use crate::options::MetadataOptions;

mod mapper;
mod queries;

pub use mapper::map_value_type;

/// Metadata provider backed by the PostgreSQL catalog.
#[derive(Debug, Clone)]
pub struct PostgresMetadata {
    pool: PgPool,
    options: MetadataOptions,
}

impl PostgresMetadata {
    /// Create a provider using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self::with_options(pool, MetadataOptions::default())
    }

    pub fn with_options(pool: PgPool, options: MetadataOptions) -> Self {
        Self { pool, options }
    }
}

#[async_trait]
impl MetadataProvider for PostgresMetadata {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn table(&self, name: &str) -> Result<TableMetaData> {
        let (schema, table) = self.options.qualify(name);
        if !queries::table_exists(&self.pool, schema, table).await? {
            return Err(MetadataError::TableNotFound(name.to_string()));
        }

        let raw = queries::list_columns(&self.pool, schema, table).await?;
        let primary_keys = queries::list_primary_key_columns(&self.pool, schema, table).await?;
        let foreign_keys = queries::list_foreign_key_columns(&self.pool, schema, table).await?;
        let metadata = TableMetaData {
            schema: Some(schema.to_string()),
            name: table.to_string(),
            columns: mapper::map_columns(raw, &primary_keys, &foreign_keys),
        };
        validate_metadata(&metadata)?;

        debug!(
            table = %metadata.canonical_name(),
            columns = metadata.columns.len(),
            primary_keys = primary_keys.len(),
            "loaded table metadata"
        );
        Ok(metadata)
    }
}
