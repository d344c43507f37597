use std::fmt;

use serde::{Deserialize, Serialize};

/// Column types PostgreSQL sessions decode without a text cast, in both
/// `format_type` and `typname` spelling. `numeric` is absent: its text form
/// keeps every digit.
const PG_NATIVE_TYPES: &[&str] = &[
    "bool",
    "boolean",
    "int2",
    "smallint",
    "int4",
    "integer",
    "int8",
    "bigint",
    "float4",
    "real",
    "float8",
    "double precision",
    "text",
    "varchar",
    "character varying",
    "bpchar",
    "character",
    "name",
    "uuid",
    "date",
    "timestamp",
    "timestamp without time zone",
    "timestamptz",
    "timestamp with time zone",
];

const PG_NATIVE_ARRAY_ELEMENTS: &[&str] = &[
    "text",
    "varchar",
    "character varying",
    "int4",
    "integer",
    "int8",
    "bigint",
];

/// SQL dialect identifier.
///
/// The row processor is dialect-agnostic; this only picks the handful of
/// fragments an engine decides. PostgreSQL is the only engine with sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Postgres,
}

impl Dialect {
    /// Detect the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        match url_scheme(url)?.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
        }
    }

    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// Bind placeholder cast to the column's native type, so text values can
    /// be written into typed columns.
    pub fn typed_placeholder(self, index: usize, sql_type: &str) -> String {
        let placeholder = self.placeholder(index);
        if sql_type.is_empty() {
            placeholder
        } else {
            format!("CAST({placeholder} AS {sql_type})")
        }
    }

    /// Quote a single identifier part. Callers validate the identifier first.
    pub fn quote_identifier(self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{ident}\""),
        }
    }

    /// Expression rendering `column` as text for comparisons against literals.
    pub fn text_cast(self, column: &str) -> String {
        match self {
            Dialect::Postgres => format!("CAST({column} AS TEXT)"),
        }
    }

    /// SELECT-list expression reading `column` of native type `sql_type`.
    ///
    /// Types without a native decoder (json, intervals, enums, ...) are read
    /// through their text form, which the typed write placeholder casts back.
    pub fn select_expression(self, column: &str, sql_type: &str) -> String {
        match self {
            Dialect::Postgres => {
                let normalized = normalize_type(sql_type);
                if normalized.is_empty() {
                    return column.to_string();
                }
                match normalized.strip_suffix("[]") {
                    Some(element) if PG_NATIVE_ARRAY_ELEMENTS.contains(&element) => {
                        column.to_string()
                    }
                    Some(_) => format!("CAST({column} AS TEXT[]) AS {column}"),
                    None if PG_NATIVE_TYPES.contains(&normalized.as_str()) => column.to_string(),
                    None => format!("CAST({column} AS TEXT) AS {column}"),
                }
            }
        }
    }

    /// Query returning up to `limit` distinct non-null values of `column`.
    pub fn distinct_sample(self, table: &str, column: &str, limit: usize) -> String {
        format!("SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL LIMIT {limit}")
    }

    /// Whether an open streaming cursor conflicts with writes on the same connection.
    pub fn separate_write_connection(self) -> bool {
        match self {
            Dialect::Postgres => true,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase type name without type modifiers; `_elem` arrays become `elem[]`.
fn normalize_type(sql_type: &str) -> String {
    let mut normalized = String::with_capacity(sql_type.len());
    let mut depth = 0usize;
    for ch in sql_type.trim().chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => normalized.push(ch.to_ascii_lowercase()),
            _ => {}
        }
    }
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    let normalized = normalized.replace(" []", "[]");
    match normalized.strip_prefix('_') {
        Some(element) if !element.ends_with("[]") => format!("{element}[]"),
        _ => normalized,
    }
}

/// Scheme of a `scheme://...` connection URL.
pub fn url_scheme(url: &str) -> Option<&str> {
    url.split_once("://")
        .map(|(scheme, _)| scheme)
        .filter(|scheme| !scheme.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dialect_from_url() {
        assert_eq!(
            Dialect::from_url("postgresql://u@localhost/db"),
            Some(Dialect::Postgres)
        );
        assert_eq!(Dialect::from_url("mysql://localhost"), None);
        assert_eq!(Dialect::from_url("localhost/db"), None);
        assert_eq!(url_scheme("mysql://localhost"), Some("mysql"));
        assert_eq!(url_scheme("://localhost"), None);
    }

    #[test]
    fn renders_dialect_fragments() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Postgres.text_cast("ssn"), "CAST(ssn AS TEXT)");
        assert_eq!(
            Dialect::Postgres.typed_placeholder(2, "uuid"),
            "CAST($2 AS uuid)"
        );
        assert_eq!(Dialect::Postgres.typed_placeholder(2, ""), "$2");
        assert_eq!(Dialect::Postgres.quote_identifier("Users"), "\"Users\"");
        assert_eq!(
            Dialect::Postgres.distinct_sample("users", "city", 10),
            "SELECT DISTINCT city FROM users WHERE city IS NOT NULL LIMIT 10"
        );
    }

    #[test]
    fn undecodable_types_are_selected_as_text() {
        let pg = Dialect::Postgres;
        assert_eq!(pg.select_expression("\"id\"", "integer"), "\"id\"");
        assert_eq!(
            pg.select_expression("\"n\"", "numeric(12,4)"),
            "CAST(\"n\" AS TEXT) AS \"n\""
        );
        assert_eq!(
            pg.select_expression("\"at\"", "timestamp(3) with time zone"),
            "\"at\""
        );
        assert_eq!(pg.select_expression("\"tags\"", "character varying(20)[]"), "\"tags\"");
        assert_eq!(pg.select_expression("\"ids\"", "_int8"), "\"ids\"");
        assert_eq!(
            pg.select_expression("\"doc\"", "jsonb"),
            "CAST(\"doc\" AS TEXT) AS \"doc\""
        );
        assert_eq!(
            pg.select_expression("\"mood\"", "mood"),
            "CAST(\"mood\" AS TEXT) AS \"mood\""
        );
        assert_eq!(
            pg.select_expression("\"amounts\"", "numeric(10,2)[]"),
            "CAST(\"amounts\" AS TEXT[]) AS \"amounts\""
        );
        assert_eq!(pg.select_expression("\"x\"", ""), "\"x\"");
    }
}
