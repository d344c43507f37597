use thiserror::Error;

/// Errors raised while loading table metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] veil_core::Error),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
