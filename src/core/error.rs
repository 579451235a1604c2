use std::fmt;
use thiserror::Error;

/// Failure reported by a table store backend.
///
/// Kept opaque on purpose: the mapper never interprets it, it only passes it
/// through to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StoreError {}

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Concurrency conflict on table '{table}': {message}")]
    ConcurrencyConflict { table: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Type '{0}' is not registered")]
    UnknownType(String),

    #[error("No index named '{index}' on table '{table}'")]
    UnknownIndex { table: String, index: String },

    #[error("Attribute '{0}' not found")]
    MissingAttribute(String),

    #[error("Malformed pagination token: {0}")]
    MalformedToken(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl MapperError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;

impl<T> From<std::sync::PoisonError<T>> for MapperError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
