use std::collections::HashMap;

use async_trait::async_trait;
use veil_core::{TableMetaData, validate_metadata};

use crate::adapter::MetadataProvider;
use crate::errors::{MetadataError, Result};

/// Metadata held in memory, e.g. loaded from a JSON snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    tables: HashMap<String, TableMetaData>,
}

impl StaticMetadata {
    pub fn new(tables: impl IntoIterator<Item = TableMetaData>) -> Result<Self> {
        let mut provider = Self::default();
        for table in tables {
            provider.insert(table)?;
        }
        Ok(provider)
    }

    /// Load a JSON array of tables.
    pub fn from_json(json: &str) -> Result<Self> {
        let tables: Vec<TableMetaData> = serde_json::from_str(json)?;
        Self::new(tables)
    }

    pub fn insert(&mut self, table: TableMetaData) -> Result<()> {
        validate_metadata(&table)?;
        // reachable both by bare and by qualified name
        self.tables
            .insert(table.name.to_ascii_lowercase(), table.clone());
        self.tables
            .insert(table.canonical_name().to_ascii_lowercase(), table);
        Ok(())
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadata {
    fn engine(&self) -> &'static str {
        "static"
    }

    async fn table(&self, name: &str) -> Result<TableMetaData> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| MetadataError::TableNotFound(name.to_string()))
    }
}
