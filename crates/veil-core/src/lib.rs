//! Core contracts and helpers for Veil.
//!
//! This crate defines the value model, type conversion rules, table metadata
//! and SQL dialect hooks shared by the policy, function and anonymizer crates.

pub mod convert;
pub mod dialect;
pub mod error;
pub mod metadata;
pub mod redaction;
pub mod value;

pub use convert::{ConversionKind, conversion_distance, conversion_kind, convert, is_convertible};
pub use dialect::{Dialect, url_scheme};
pub use error::{ConversionError, Error, Result};
pub use metadata::{ColumnMetaData, TableMetaData, validate_metadata};
pub use redaction::{RedactedConnection, redact_connection_string};
pub use value::{Value, ValueType};
