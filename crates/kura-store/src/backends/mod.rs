//! Storage backend implementations.
//!
//! - `TableBackend`: virtual filesystem on a SQLite table
//! - `ObjectBackend`: S3 or any other `object_store` implementation
//! - `StaticBackend`: URL synthesis only

pub mod object;
pub mod static_url;
pub mod table;

pub use object::{DIRECTORY_MARKER, ObjectBackend};
pub use static_url::StaticBackend;
pub use table::{TableBackend, TableOptions};

use async_trait::async_trait;
use std::time::SystemTime;

use crate::disk::Driver;
use crate::error::StorageResult;
use crate::ops::Storage;
use crate::types::EntryAttr;

/// A backend chosen at construction time.
#[derive(Debug, Clone)]
pub enum Backend {
    Table(TableBackend),
    Object(ObjectBackend),
    Static(StaticBackend),
}

impl From<TableBackend> for Backend {
    fn from(backend: TableBackend) -> Self {
        Backend::Table(backend)
    }
}

impl From<ObjectBackend> for Backend {
    fn from(backend: ObjectBackend) -> Self {
        Backend::Object(backend)
    }
}

impl From<StaticBackend> for Backend {
    fn from(backend: StaticBackend) -> Self {
        Backend::Static(backend)
    }
}

macro_rules! delegate {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Backend::Table($backend) => $call,
            Backend::Object($backend) => $call,
            Backend::Static($backend) => $call,
        }
    };
}

#[async_trait]
impl Storage for Backend {
    fn driver(&self) -> Driver {
        delegate!(self, b => b.driver())
    }

    async fn stat(&self, path: &str) -> StorageResult<EntryAttr> {
        delegate!(self, b => b.stat(path).await)
    }

    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>> {
        delegate!(self, b => b.read_file(path).await)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        delegate!(self, b => b.exists(path).await)
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        delegate!(self, b => b.size(path).await)
    }

    async fn last_modified(&self, path: &str) -> StorageResult<SystemTime> {
        delegate!(self, b => b.last_modified(path).await)
    }

    async fn directories(&self, parent: &str) -> StorageResult<Vec<String>> {
        delegate!(self, b => b.directories(parent).await)
    }

    async fn files(&self, parent: &str) -> StorageResult<Vec<String>> {
        delegate!(self, b => b.files(parent).await)
    }

    fn url(&self, path: &str) -> StorageResult<String> {
        delegate!(self, b => b.url(path))
    }

    async fn put(&self, path: &str, content: &[u8]) -> StorageResult<()> {
        delegate!(self, b => b.put(path, content).await)
    }

    async fn make_directory(&self, path: &str) -> StorageResult<()> {
        delegate!(self, b => b.make_directory(path).await)
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        delegate!(self, b => b.rename(from, to).await)
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        delegate!(self, b => b.copy(from, to).await)
    }

    async fn delete_file(&self, paths: &[&str]) -> StorageResult<()> {
        delegate!(self, b => b.delete_file(paths).await)
    }

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        delegate!(self, b => b.delete_directory(path).await)
    }
}
