use thiserror::Error;

use crate::value::ValueType;

/// Core error type shared across Veil crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error or session failure.
    #[error("database error: {0}")]
    Db(String),
    /// Table metadata violates internal invariants.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    /// A requested feature is not yet supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by Veil crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to turn a value of one type into another.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// No constructor on the target type accepts the source type.
    #[error("no constructor converts {from} into {to}")]
    NoConstructor { from: ValueType, to: ValueType },
    /// A constructor exists but rejected the concrete value.
    #[error("cannot convert '{value}' into {to}: {reason}")]
    Invalid {
        value: String,
        to: ValueType,
        reason: String,
    },
}
