use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::ValueType;

/// Structural information about one table, as reported by a metadata provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetaData {
    /// Namespace of the table when the engine has one (e.g. `public`).
    pub schema: Option<String>,
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnMetaData>,
}

/// Column metadata consumed by the row processor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnMetaData {
    pub name: String,
    /// Native type name as reported by the database (e.g. `varchar`, `int4`).
    pub sql_type: String,
    /// Value type inferred from `sql_type`.
    pub value_type: ValueType,
    /// Declared character size for text columns.
    pub size: Option<usize>,
    pub primary_key: bool,
    pub foreign_key: bool,
    pub nullable: bool,
}

impl ColumnMetaData {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            value_type,
            size: None,
            primary_key: false,
            foreign_key: false,
            nullable: true,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn foreign_key(mut self) -> Self {
        self.foreign_key = true;
        self
    }
}

impl TableMetaData {
    /// Canonical `schema.table` name, or the bare name without a schema.
    pub fn canonical_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Look up a column by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnMetaData> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name.as_str())
            .collect()
    }
}

/// Validate internal consistency of table metadata.
pub fn validate_metadata(table: &TableMetaData) -> Result<()> {
    if table.columns.is_empty() {
        return Err(Error::InvalidMetadata(format!(
            "table {} has no columns",
            table.canonical_name()
        )));
    }

    let mut seen = BTreeSet::new();
    for column in &table.columns {
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(Error::InvalidMetadata(format!(
                "duplicate column name: {}.{}",
                table.canonical_name(),
                column.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableMetaData {
        TableMetaData {
            schema: Some("public".to_string()),
            name: "users".to_string(),
            columns: vec![
                ColumnMetaData::new("id", "int4", ValueType::Int).primary_key(),
                ColumnMetaData::new("first_name", "varchar", ValueType::Text).with_size(20),
            ],
        }
    }

    #[test]
    fn finds_columns_case_insensitively() {
        let table = users();
        assert_eq!(table.canonical_name(), "public.users");
        assert_eq!(table.column("FIRST_NAME").and_then(|c| c.size), Some(20));
        assert_eq!(table.primary_keys(), vec!["id"]);
    }

    #[test]
    fn rejects_duplicate_columns() {
        let mut table = users();
        table
            .columns
            .push(ColumnMetaData::new("ID", "int8", ValueType::Int));
        assert!(matches!(
            validate_metadata(&table),
            Err(Error::InvalidMetadata(_))
        ));
    }
}
