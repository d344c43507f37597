use std::error::Error as StdError;

use thiserror::Error;
use veil_core::ConversionError;
use veil_functions::FunctionError;
use veil_introspect::MetadataError;
use veil_policy::PolicyError;

/// Failures raised by read/write sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("cannot decode column '{column}' of type {type_name}")]
    Decode { column: String, type_name: String },
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("{0}")]
    Other(String),
}

/// Errors raised by an anonymization run.
///
/// Configuration errors abort the run before any row is read; the remaining
/// variants fail a single table.
#[derive(Debug, Error)]
pub enum AnonymizeError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("cannot resolve plan for {table}.{column}")]
    Plan {
        table: String,
        column: String,
        #[source]
        source: FunctionError,
    },
    #[error("column {table}.{column} references unknown plan '{plan_ref}'")]
    UnknownPlan {
        table: String,
        column: String,
        plan_ref: String,
    },
    #[error("invalid exclude on {table}: {message}")]
    InvalidExclude { table: String, message: String },
    #[error("cannot load metadata for table '{table}'")]
    Metadata {
        table: String,
        #[source]
        source: MetadataError,
    },
    #[error("table '{0}' has no key columns")]
    MissingKey(String),
    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("cannot sample {table}.{column}")]
    Sampling {
        table: String,
        column: String,
        #[source]
        source: SessionError,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot generate value for column '{column}'")]
    Generation {
        column: String,
        #[source]
        source: FunctionError,
    },
    #[error("cannot convert value for column '{column}'")]
    Conversion {
        column: String,
        #[source]
        source: ConversionError,
    },
}

impl AnonymizeError {
    /// True for errors detected before any row is touched.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            AnonymizeError::Session(_)
                | AnonymizeError::Generation { .. }
                | AnonymizeError::Conversion { .. }
        )
    }
}

/// Render an error with every source, outermost first.
///
/// A source already rendered at the end of the message is not repeated.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_message = cause.to_string();
        if !message.ends_with(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}
