//! URL-only backend for content served from elsewhere.

use async_trait::async_trait;

use crate::disk::Driver;
use crate::error::{StorageError, StorageResult};
use crate::ops::Storage;
use crate::path::{join_url, normalize};
use crate::types::EntryAttr;

/// Synthesizes public URLs and rejects everything else.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    url: String,
}

impl StaticBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn unsupported<T>(operation: &'static str) -> StorageResult<T> {
        Err(StorageError::unsupported("static", operation))
    }
}

#[async_trait]
impl Storage for StaticBackend {
    fn driver(&self) -> Driver {
        Driver::Static
    }

    async fn stat(&self, _path: &str) -> StorageResult<EntryAttr> {
        Self::unsupported("stat")
    }

    async fn read_file(&self, _path: &str) -> StorageResult<Vec<u8>> {
        Self::unsupported("read_file")
    }

    async fn exists(&self, _path: &str) -> StorageResult<bool> {
        Self::unsupported("exists")
    }

    async fn size(&self, _path: &str) -> StorageResult<u64> {
        Self::unsupported("size")
    }

    async fn last_modified(&self, _path: &str) -> StorageResult<std::time::SystemTime> {
        Self::unsupported("last_modified")
    }

    async fn directories(&self, _parent: &str) -> StorageResult<Vec<String>> {
        Self::unsupported("directories")
    }

    async fn files(&self, _parent: &str) -> StorageResult<Vec<String>> {
        Self::unsupported("files")
    }

    fn url(&self, path: &str) -> StorageResult<String> {
        Ok(join_url(&self.url, &normalize(path)?))
    }

    async fn put(&self, _path: &str, _content: &[u8]) -> StorageResult<()> {
        Self::unsupported("put")
    }

    async fn make_directory(&self, _path: &str) -> StorageResult<()> {
        Self::unsupported("make_directory")
    }

    async fn rename(&self, _from: &str, _to: &str) -> StorageResult<()> {
        Self::unsupported("rename")
    }

    async fn copy(&self, _from: &str, _to: &str) -> StorageResult<()> {
        Self::unsupported("copy")
    }

    async fn delete_file(&self, _paths: &[&str]) -> StorageResult<()> {
        Self::unsupported("delete_file")
    }

    async fn delete_directory(&self, _path: &str) -> StorageResult<()> {
        Self::unsupported("delete_directory")
    }
}
