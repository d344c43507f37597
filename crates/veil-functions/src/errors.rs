use thiserror::Error;
use veil_core::ConversionError;

/// Failure raised by a function body.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        CallError::Message(message.into())
    }
}

/// Errors emitted while resolving or invoking functions and plans.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("invalid function reference '{0}': expected Type#member")]
    InvalidReference(String),
    #[error("no overload of '{reference}' accepts {request}; considered: [{}]", considered.join(", "))]
    NotFound {
        reference: String,
        request: String,
        considered: Vec<String>,
    },
    #[error("invalid argument for '{reference}': {message}")]
    InvalidArgument { reference: String, message: String },
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("'{reference}' failed")]
    Invocation {
        reference: String,
        #[source]
        source: CallError,
    },
    #[error("cannot convert value for '{reference}'")]
    Conversion {
        reference: String,
        #[source]
        source: ConversionError,
    },
}
