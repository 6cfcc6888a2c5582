//! Repository error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::{Digest, InvalidNameError, RepoPath, StorageError};

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors surfaced by the repository controller.
#[derive(Debug, Error)]
pub enum RepoError {
    /// no metadata directory under the root
    #[error("not a repository: {0} does not exist (run `init` first)")]
    NotInitialized(PathBuf),

    #[error("repository already exists at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("file not found: {0}")]
    FileNotFound(String),

    /// a recorded digest has no blob: the object store is damaged
    #[error("object {0} is missing from the object store")]
    ObjectNotFound(Digest),

    #[error("file is not tracked: {0}")]
    UntrackedFile(RepoPath),

    #[error("no commits yet")]
    NoCommits,

    /// neither a baseline nor a commit id matched
    #[error("no baseline or commit matches '{0}'")]
    CommitNotFound(String),

    #[error("'{prefix}' matches {count} commits, use a longer prefix")]
    AmbiguousCommit { prefix: String, count: usize },

    #[error("nothing staged for commit")]
    NothingStaged,

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// the working tree has something in the way of a restored file;
    /// raised before checkout writes anything
    #[error("cannot restore {path}: {reason}")]
    CheckoutBlocked { path: RepoPath, reason: String },

    #[error("invalid baseline name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for RepoError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound(digest) => RepoError::ObjectNotFound(digest),
            StorageError::Io(io) => RepoError::Io(io),
            other => RepoError::Storage(other),
        }
    }
}

impl RepoError {
    /// true for conditions the user can correct and retry; false for
    /// generic I/O and database failures
    pub fn is_reported(&self) -> bool {
        !matches!(self, RepoError::Storage(_) | RepoError::Io(_))
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl ToString) -> Self {
        RepoError::InvalidPath {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_not_found_is_lifted() {
        let digest = Digest::from_bytes([7; 20]);
        let err: RepoError = StorageError::ObjectNotFound(digest).into();
        assert!(matches!(err, RepoError::ObjectNotFound(d) if d == digest));
        assert!(err.is_reported());
    }

    #[test]
    fn test_generic_failures_not_reported() {
        let io: RepoError = std::io::Error::other("disk full").into();
        assert!(!io.is_reported());

        let db: RepoError = StorageError::Internal("boom".into()).into();
        assert!(matches!(db, RepoError::Storage(_)));
        assert!(!db.is_reported());

        assert!(RepoError::NothingStaged.is_reported());
        assert!(RepoError::NoCommits.is_reported());
    }
}
