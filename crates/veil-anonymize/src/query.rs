//! SELECT and UPDATE statements for one table.

use veil_core::{ColumnMetaData, Dialect, TableMetaData, Value};

use crate::errors::AnonymizeError;
use crate::exclude::ExcludeRules;

const MAX_IDENTIFIER_LEN: usize = 63;

/// Reject identifiers that cannot be quoted safely.
pub fn validate_identifier(ident: &str) -> Result<&str, AnonymizeError> {
    let mut chars = ident.chars();
    let valid = ident.len() <= MAX_IDENTIFIER_LEN
        && chars
            .next()
            .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$');
    if valid {
        Ok(ident)
    } else {
        Err(AnonymizeError::InvalidIdentifier(ident.to_string()))
    }
}

/// Quoted `schema.table` reference.
pub fn quote_table(dialect: Dialect, table: &TableMetaData) -> Result<String, AnonymizeError> {
    let name = dialect.quote_identifier(validate_identifier(&table.name)?);
    match &table.schema {
        Some(schema) => Ok(format!(
            "{}.{name}",
            dialect.quote_identifier(validate_identifier(schema)?)
        )),
        None => Ok(name),
    }
}

pub fn quote_column(dialect: Dialect, column: &str) -> Result<String, AnonymizeError> {
    Ok(dialect.quote_identifier(validate_identifier(column)?))
}

/// Read query streaming keys, targets and exclude-only columns.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    /// Canonical table name.
    pub table: String,
    pub sql: String,
    pub params: Vec<Value>,
    /// Selected columns, in row order.
    pub columns: Vec<String>,
    /// Table-level excludes already rendered into `sql`.
    pub excludes: ExcludeRules,
}

impl SelectQuery {
    pub fn build(
        dialect: Dialect,
        table: &TableMetaData,
        columns: &[&ColumnMetaData],
        filter: Option<&str>,
        excludes: &ExcludeRules,
    ) -> Result<Self, AnonymizeError> {
        let select_list = columns
            .iter()
            .map(|column| {
                quote_column(dialect, &column.name)
                    .map(|quoted| dialect.select_expression(&quoted, &column.sql_type))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut sql = format!("SELECT {} FROM {}", select_list.join(", "), quote_table(dialect, table)?);

        let mut params = Vec::new();
        let mut predicates = Vec::new();
        if let Some(filter) = filter {
            predicates.push(format!("({filter})"));
        }
        // exclude columns were checked against metadata during preflight
        let quote = |name: &str| {
            table
                .column(name)
                .map(|column| dialect.quote_identifier(&column.name))
                .unwrap_or_else(|| dialect.quote_identifier(name))
        };
        if let Some(predicate) = excludes.sql_predicate(dialect, quote, &mut params) {
            predicates.push(predicate);
        }
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        Ok(Self {
            table: table.canonical_name(),
            sql,
            params,
            columns: columns.iter().map(|column| column.name.clone()).collect(),
            excludes: excludes.clone(),
        })
    }
}

/// Parameterized `UPDATE .. SET c1 = ?, .. WHERE k1 = ? AND ..`.
///
/// Bound rows carry the SET values first, then the key values.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    pub table: String,
    pub sql: String,
    pub set_columns: Vec<String>,
    pub key_columns: Vec<String>,
}

impl UpdateQuery {
    pub fn build(
        dialect: Dialect,
        table: &TableMetaData,
        targets: &[&ColumnMetaData],
        keys: &[&ColumnMetaData],
    ) -> Result<Self, AnonymizeError> {
        validate_sql_types(targets)?;
        validate_sql_types(keys)?;
        let mut index = 0;
        let mut assign = |column: &ColumnMetaData| -> Result<String, AnonymizeError> {
            index += 1;
            Ok(format!(
                "{} = {}",
                quote_column(dialect, &column.name)?,
                dialect.typed_placeholder(index, &column.sql_type)
            ))
        };
        let set = targets
            .iter()
            .map(|&column| assign(column))
            .collect::<Result<Vec<_>, _>>()?;
        let filter = keys
            .iter()
            .map(|&column| assign(column))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            table: table.canonical_name(),
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                quote_table(dialect, table)?,
                set.join(", "),
                filter.join(" AND ")
            ),
            set_columns: targets.iter().map(|column| column.name.clone()).collect(),
            key_columns: keys.iter().map(|column| column.name.clone()).collect(),
        })
    }
}

/// Native type names end up in casts; only catalog-shaped names are accepted.
fn validate_sql_types(columns: &[&ColumnMetaData]) -> Result<(), AnonymizeError> {
    match columns.iter().find(|column| {
        !column.sql_type.chars().all(|ch| {
            ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | ' ' | '(' | ')' | ',' | '[' | ']')
        })
    }) {
        Some(column) => Err(AnonymizeError::InvalidIdentifier(column.sql_type.clone())),
        None => Ok(()),
    }
}
