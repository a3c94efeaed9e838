//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MetadataError {
    /// Whether the error means the requested record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ferry_core::Error> for MetadataError {
    fn from(e: ferry_core::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Map constraint violations raised by the database onto domain errors.
pub(crate) fn classify_write_error(err: sqlx::Error, what: impl FnOnce() -> String) -> MetadataError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return MetadataError::AlreadyExists(what());
        }
        if db_err.is_foreign_key_violation() {
            return MetadataError::NotFound(what());
        }
    }
    MetadataError::Database(err)
}
