//! Storage error types.

use std::fmt;
use thiserror::Error;

/// Storage error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path is empty or malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Target is occupied by an entry of an incompatible kind.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend cannot perform this operation.
    #[error("{driver} storage does not support {operation}")]
    Unsupported {
        driver: &'static str,
        operation: &'static str,
    },

    /// Disk configuration is missing a required field or is otherwise invalid.
    #[error("invalid disk configuration: {0}")]
    Configuration(String),

    /// The backing store failed. Not interpreted further.
    #[error("backing store error: {0}")]
    BackingStore(#[from] BackingStoreError),

    /// A batch delete finished with some paths failing.
    ///
    /// Paths not listed in `failures` were deleted.
    #[error("failed to delete {} of {attempted} paths: {}", .failures.len(), DisplayFailures(.failures))]
    PartialDelete {
        attempted: usize,
        failures: Vec<DeleteFailure>,
    },
}

/// Errors raised by the store underneath a backend.
#[derive(Debug, Error)]
pub enum BackingStoreError {
    /// SQLite error from the table backend.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Object store client error.
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
}

/// One failed path from a batch delete.
#[derive(Debug)]
pub struct DeleteFailure {
    /// The path as given by the caller.
    pub path: String,
    pub error: Box<StorageError>,
}

struct DisplayFailures<'a>(&'a [DeleteFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} ({})", failure.path, failure.error)?;
        }
        Ok(())
    }
}

impl StorageError {
    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a Conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(driver: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { driver, operation }
    }

    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns true for NotFound.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for Conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::BackingStore(BackingStoreError::Sqlite(e))
    }
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            other => Self::BackingStore(BackingStoreError::ObjectStore(other)),
        }
    }
}

/// Storage result type.
pub type StorageResult<T> = Result<T, StorageError>;
