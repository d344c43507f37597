use veil_core::{ColumnMetaData, ValueType};

use super::queries::RawColumn;

/// Infer the value type of a Postgres column from its `typname`.
///
/// Array types (`_int4`, `_text`) map to lists of the element type.
pub fn map_value_type(udt_name: &str, numeric_scale: Option<i32>) -> ValueType {
    if let Some(element) = udt_name.strip_prefix('_') {
        return ValueType::list_of(map_value_type(element, None));
    }
    match udt_name {
        "int2" | "int4" | "int8" | "oid" => ValueType::Int,
        "numeric" if numeric_scale == Some(0) => ValueType::Int,
        "float4" | "float8" | "numeric" | "money" => ValueType::Float,
        "bool" => ValueType::Bool,
        "date" => ValueType::Date,
        "timestamp" | "timestamptz" => ValueType::Timestamp,
        _ => ValueType::Text,
    }
}

pub fn map_columns(
    raw: Vec<RawColumn>,
    primary_keys: &[String],
    foreign_keys: &[String],
) -> Vec<ColumnMetaData> {
    raw.into_iter()
        .map(|col| {
            let value_type = map_value_type(&col.udt_name, col.numeric_scale);
            let size = match col.udt_name.as_str() {
                "varchar" | "bpchar" => col
                    .character_max_length
                    .and_then(|len| usize::try_from(len).ok()),
                _ => None,
            };
            ColumnMetaData {
                primary_key: primary_keys.contains(&col.name),
                foreign_key: foreign_keys.contains(&col.name),
                nullable: col.is_nullable,
                size,
                value_type,
                sql_type: col.formatted_type,
                name: col.name,
            }
        })
        .collect()
}
