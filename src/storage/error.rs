//! Storage layer error types
//!
//! All errors that can occur while reading or writing the object store and
//! the metadata database are defined here.

use thiserror::Error;

use crate::storage::types::{Digest, InvalidNameError};

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the metadata database
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// no blob is stored under the given digest
    #[error("object not found: {0}")]
    ObjectNotFound(Digest),

    /// a stored value could not be decoded, or a blob does not hash to its key
    #[error("corrupted data at {key}: {reason}")]
    CorruptedData { key: String, reason: String },

    /// a name or path failed validation
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ObjectNotFound(_)
                | StorageError::Database(rusqlite::Error::QueryReturnedNoRows)
        )
    }

    /// check if this error points at damaged repository state
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::ObjectNotFound(_) | StorageError::CorruptedData { .. }
        )
    }

    pub(crate) fn corrupted(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::CorruptedData {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
