//! Storage capability trait.
//!
//! Every backend implements the same set of operations. Paths are plain
//! strings and are normalized by the backend (see [`crate::path`]).

use async_trait::async_trait;
use std::time::SystemTime;

use crate::disk::Driver;
use crate::error::{StorageError, StorageResult};
use crate::types::EntryAttr;

/// Core storage operations.
///
/// Backends that cannot perform an operation return
/// [`StorageError::Unsupported`] rather than succeeding silently.
#[async_trait]
pub trait Storage: Send + Sync {
    /// The driver this backend was built for.
    fn driver(&self) -> Driver;

    // ========================================================================
    // Reading
    // ========================================================================

    /// Get entry attributes.
    async fn stat(&self, path: &str) -> StorageResult<EntryAttr>;

    /// Read the whole content of a file.
    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Names of the directories directly under `parent`, sorted.
    ///
    /// `"/"` or `""` lists the root.
    async fn directories(&self, parent: &str) -> StorageResult<Vec<String>>;

    /// Names of the files directly under `parent`, sorted.
    async fn files(&self, parent: &str) -> StorageResult<Vec<String>>;

    /// Public URL of a path.
    fn url(&self, path: &str) -> StorageResult<String>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create or overwrite a file.
    async fn put(&self, path: &str, content: &[u8]) -> StorageResult<()>;

    /// Create a directory. Succeeds if it already exists.
    async fn make_directory(&self, path: &str) -> StorageResult<()>;

    /// Move a file or directory from `from` to `to`.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Copy a file from `from` to `to`.
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Delete a batch of files.
    ///
    /// Every path is attempted. If any fail, returns
    /// [`StorageError::PartialDelete`] naming each failed path; the others
    /// stay deleted.
    async fn delete_file(&self, paths: &[&str]) -> StorageResult<()>;

    /// Delete a directory and everything beneath it.
    async fn delete_directory(&self, path: &str) -> StorageResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    ///
    /// Only `NotFound` counts as absence; other errors propagate.
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Size of a file in bytes.
    async fn size(&self, path: &str) -> StorageResult<u64> {
        let attr = self.stat(path).await?;
        if attr.is_dir() {
            return Err(StorageError::conflict(format!("{} is a directory", attr.path)));
        }
        Ok(attr.size)
    }

    /// Last modification time of a file or directory.
    async fn last_modified(&self, path: &str) -> StorageResult<SystemTime> {
        Ok(self.stat(path).await?.modified)
    }
}
