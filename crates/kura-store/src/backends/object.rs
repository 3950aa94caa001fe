//! Object store backend.
//!
//! Maps storage operations onto an [`ObjectStore`]. Object stores have no
//! directories, only key prefixes, so an empty directory is kept alive by a
//! zero-byte marker object named [`DIRECTORY_MARKER`]. Directory moves and
//! deletes walk the listed prefix one object at a time and are not atomic.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use tracing::{debug, warn};

use crate::disk::{Disk, Driver};
use crate::error::{DeleteFailure, StorageError, StorageResult};
use crate::hierarchy::{ancestors, is_within};
use crate::ops::Storage;
use crate::path::{join_url, normalize, normalize_parent};
use crate::types::{EntryAttr, EntryKind, time_from_millis};

/// Marker object that keeps an otherwise empty directory listable.
pub const DIRECTORY_MARKER: &str = ".kura-dir";

/// Storage backend over any [`ObjectStore`].
#[derive(Clone)]
pub struct ObjectBackend {
    store: Arc<dyn ObjectStore>,
    url: Option<String>,
}

impl std::fmt::Debug for ObjectBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBackend")
            .field("store", &self.store.to_string())
            .field("url", &self.url)
            .finish()
    }
}

fn is_missing<T>(result: &object_store::Result<T>) -> bool {
    matches!(result, Err(object_store::Error::NotFound { .. }))
}

impl ObjectBackend {
    /// Wrap an existing store. An empty `url` disables `url()`.
    pub fn new(store: Arc<dyn ObjectStore>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            store,
            url: (!url.is_empty()).then_some(url),
        }
    }

    /// Build an S3 client from a disk. No requests are made here.
    pub fn s3(disk: &Disk) -> StorageResult<Self> {
        let region = Disk::required(&disk.region, Driver::S3, "region")?;
        let key = Disk::required(&disk.key, Driver::S3, "key")?;
        let secret = Disk::required(&disk.secret, Driver::S3, "secret")?;
        let bucket = Disk::required(&disk.bucket, Driver::S3, "bucket")?;

        let mut builder = AmazonS3Builder::new()
            .with_region(region)
            .with_access_key_id(key)
            .with_secret_access_key(secret)
            .with_bucket_name(bucket);
        if let Some(endpoint) = disk.endpoint.as_deref().filter(|e| !e.is_empty()) {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::configuration(format!("s3 client: {e}")))?;
        Ok(Self::new(Arc::new(store), disk.url.clone()))
    }

    fn location(path: &str) -> StorageResult<(String, ObjectPath)> {
        let canonical = normalize(path)?;
        let location = ObjectPath::from(canonical.as_str());
        Ok((canonical, location))
    }

    fn marker(location: &ObjectPath) -> ObjectPath {
        location.child(DIRECTORY_MARKER)
    }

    async fn is_file(&self, location: &ObjectPath) -> StorageResult<bool> {
        let head = self.store.head(location).await;
        if is_missing(&head) {
            return Ok(false);
        }
        head?;
        Ok(true)
    }

    async fn list_under(&self, prefix: &ObjectPath) -> StorageResult<Vec<ObjectMeta>> {
        Ok(self.store.list(Some(prefix)).try_collect().await?)
    }

    async fn has_objects_under(&self, prefix: &ObjectPath) -> StorageResult<bool> {
        let mut listing = self.store.list(Some(prefix));
        Ok(listing.try_next().await?.is_some())
    }

    /// Files are leaves: fail if any ancestor of `canonical` is an object.
    async fn ensure_placeable(&self, canonical: &str) -> StorageResult<()> {
        for ancestor in ancestors(canonical) {
            if self.is_file(&ObjectPath::from(ancestor)).await? {
                return Err(StorageError::conflict(format!(
                    "{ancestor} is a file and cannot contain {canonical}"
                )));
            }
        }
        Ok(())
    }

    async fn ensure_vacant(&self, canonical: &str, location: &ObjectPath) -> StorageResult<()> {
        if self.is_file(location).await? || self.has_objects_under(location).await? {
            return Err(StorageError::conflict(format!("{canonical} already exists")));
        }
        Ok(())
    }

    async fn children(&self, parent: &str) -> StorageResult<object_store::ListResult> {
        let prefix = normalize_parent(parent)?.map(|p| ObjectPath::from(p.as_str()));
        Ok(self.store.list_with_delimiter(prefix.as_ref()).await?)
    }

    async fn delete_one(&self, path: &str) -> StorageResult<()> {
        let (canonical, location) = Self::location(path)?;
        if !self.is_file(&location).await? {
            return if self.has_objects_under(&location).await? {
                Err(StorageError::conflict(format!("{canonical} is a directory")))
            } else {
                Err(StorageError::not_found(canonical))
            };
        }
        self.store.delete(&location).await?;
        debug!(path = %canonical, "deleted object");
        Ok(())
    }
}

#[async_trait]
impl Storage for ObjectBackend {
    fn driver(&self) -> Driver {
        Driver::S3
    }

    async fn stat(&self, path: &str) -> StorageResult<EntryAttr> {
        let (canonical, location) = Self::location(path)?;

        let head = self.store.head(&location).await;
        if !is_missing(&head) {
            let meta = head?;
            return Ok(EntryAttr {
                path: canonical,
                kind: EntryKind::File,
                size: meta.size as u64,
                created: None,
                modified: time_from_millis(meta.last_modified.timestamp_millis()),
                checksum: None,
            });
        }

        // A directory is any non-empty prefix; its time is the newest object beneath it
        let newest = self
            .list_under(&location)
            .await?
            .iter()
            .map(|meta| meta.last_modified.timestamp_millis())
            .max()
            .ok_or_else(|| StorageError::not_found(&canonical))?;
        Ok(EntryAttr {
            path: canonical,
            kind: EntryKind::Directory,
            size: 0,
            created: None,
            modified: time_from_millis(newest),
            checksum: None,
        })
    }

    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>> {
        let (_, location) = Self::location(path)?;
        let bytes = self.store.get(&location).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        if normalize_parent(path)?.is_none() {
            return Ok(true);
        }
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn directories(&self, parent: &str) -> StorageResult<Vec<String>> {
        let listing = self.children(parent).await?;
        let mut names: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|prefix| prefix.filename())
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn files(&self, parent: &str) -> StorageResult<Vec<String>> {
        let listing = self.children(parent).await?;
        let mut names: Vec<String> = listing
            .objects
            .iter()
            .filter_map(|meta| meta.location.filename())
            .filter(|name| *name != DIRECTORY_MARKER)
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    fn url(&self, path: &str) -> StorageResult<String> {
        let base = self
            .url
            .as_deref()
            .ok_or_else(|| StorageError::unsupported("s3", "url without a base url"))?;
        Ok(join_url(base, &normalize(path)?))
    }

    #[tracing::instrument(skip(self, content), fields(size = content.len()), name = "object.put")]
    async fn put(&self, path: &str, content: &[u8]) -> StorageResult<()> {
        let (canonical, location) = Self::location(path)?;
        if self.has_objects_under(&location).await? {
            return Err(StorageError::conflict(format!("{canonical} is a directory")));
        }
        self.ensure_placeable(&canonical).await?;

        self.store
            .put(&location, PutPayload::from(content.to_vec()))
            .await?;
        debug!(path = %canonical, "stored object");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "object.make_directory")]
    async fn make_directory(&self, path: &str) -> StorageResult<()> {
        let (canonical, location) = Self::location(path)?;
        if self.is_file(&location).await? {
            return Err(StorageError::conflict(format!("{canonical} is a file")));
        }
        self.ensure_placeable(&canonical).await?;

        self.store
            .put(&Self::marker(&location), PutPayload::new())
            .await?;
        debug!(path = %canonical, "created directory marker");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "object.rename")]
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let (from_path, from_loc) = Self::location(from)?;
        let (to_path, to_loc) = Self::location(to)?;

        if self.is_file(&from_loc).await? {
            if from_path == to_path {
                return Ok(());
            }
            self.ensure_vacant(&to_path, &to_loc).await?;
            self.ensure_placeable(&to_path).await?;
            self.store.rename(&from_loc, &to_loc).await?;
            debug!(from = %from_path, to = %to_path, "moved object");
            return Ok(());
        }

        let objects = self.list_under(&from_loc).await?;
        if objects.is_empty() {
            return Err(StorageError::not_found(from_path));
        }
        if from_path == to_path {
            return Ok(());
        }
        if is_within(&to_path, &from_path) {
            return Err(StorageError::conflict(format!(
                "cannot move {from_path} into itself ({to_path})"
            )));
        }
        self.ensure_vacant(&to_path, &to_loc).await?;
        self.ensure_placeable(&to_path).await?;

        for meta in &objects {
            let Some(rest) = meta.location.prefix_match(&from_loc) else {
                continue;
            };
            let target: ObjectPath = to_loc.parts().chain(rest).collect();
            self.store.rename(&meta.location, &target).await?;
        }
        debug!(from = %from_path, to = %to_path, moved = objects.len(), "moved prefix");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "object.copy")]
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        let (from_path, from_loc) = Self::location(from)?;
        let (to_path, to_loc) = Self::location(to)?;

        if !self.is_file(&from_loc).await? {
            return if self.has_objects_under(&from_loc).await? {
                Err(StorageError::conflict(format!("{from_path} is a directory")))
            } else {
                Err(StorageError::not_found(from_path))
            };
        }
        if from_path == to_path {
            return Ok(());
        }
        if self.has_objects_under(&to_loc).await? {
            return Err(StorageError::conflict(format!("{to_path} is a directory")));
        }
        self.ensure_placeable(&to_path).await?;

        self.store.copy(&from_loc, &to_loc).await?;
        debug!(from = %from_path, to = %to_path, "copied object");
        Ok(())
    }

    async fn delete_file(&self, paths: &[&str]) -> StorageResult<()> {
        let mut failures = Vec::new();
        for path in paths {
            if let Err(error) = self.delete_one(path).await {
                warn!(%path, %error, "delete failed");
                failures.push(DeleteFailure {
                    path: path.to_string(),
                    error: Box::new(error),
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StorageError::PartialDelete {
                attempted: paths.len(),
                failures,
            })
        }
    }

    #[tracing::instrument(skip(self), name = "object.delete_directory")]
    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        let (canonical, location) = Self::location(path)?;
        if self.is_file(&location).await? {
            return Err(StorageError::conflict(format!("{canonical} is a file")));
        }

        let objects = self.list_under(&location).await?;
        if objects.is_empty() {
            return Err(StorageError::not_found(canonical));
        }
        for meta in &objects {
            self.store.delete(&meta.location).await?;
        }
        debug!(path = %canonical, deleted = objects.len(), "deleted prefix");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn test_backend() -> ObjectBackend {
        ObjectBackend::new(Arc::new(InMemory::new()), "https://bucket.example.com/")
    }

    #[tokio::test]
    async fn test_put_and_read() {
        let fs = test_backend();
        fs.put("/a/b.txt", b"hello").await.unwrap();
        assert_eq!(fs.read_file("a/b.txt").await.unwrap(), b"hello");
        assert_eq!(fs.size("a/b.txt").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let fs = test_backend();
        assert!(fs.read_file("nope.txt").await.unwrap_err().is_not_found());
        assert!(fs.stat("nope.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_exists_for_prefix() {
        let fs = test_backend();
        fs.put("a/b/c.txt", b"x").await.unwrap();
        assert!(fs.exists("/").await.unwrap());
        assert!(fs.exists("a").await.unwrap());
        assert!(fs.exists("a/b/c.txt").await.unwrap());
        assert!(!fs.exists("a/c").await.unwrap());

        let dir = fs.stat("a/b").await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.checksum, None);
    }

    #[tokio::test]
    async fn test_listing_hides_markers() {
        let fs = test_backend();
        fs.make_directory("docs").await.unwrap();
        fs.make_directory("docs/empty").await.unwrap();
        fs.put("docs/b.txt", b"b").await.unwrap();
        fs.put("docs/a.txt", b"a").await.unwrap();
        fs.put("docs/sub/c.txt", b"c").await.unwrap();

        assert_eq!(fs.directories("/").await.unwrap(), vec!["docs"]);
        assert_eq!(fs.directories("docs").await.unwrap(), vec!["empty", "sub"]);
        assert_eq!(fs.files("docs").await.unwrap(), vec!["a.txt", "b.txt"]);
        assert!(fs.files("docs/empty").await.unwrap().is_empty());
        assert!(fs.exists("docs/empty").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_conflicts() {
        let fs = test_backend();
        fs.put("a/b.txt", b"x").await.unwrap();
        assert!(fs.put("a", b"x").await.unwrap_err().is_conflict());
        assert!(fs.put("a/b.txt/c", b"x").await.unwrap_err().is_conflict());
        assert!(fs.make_directory("a/b.txt").await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_rename_file() {
        let fs = test_backend();
        fs.put("old.txt", b"x").await.unwrap();
        fs.rename("old.txt", "new.txt").await.unwrap();
        assert!(!fs.exists("old.txt").await.unwrap());
        assert_eq!(fs.read_file("new.txt").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_rename_directory() {
        let fs = test_backend();
        fs.make_directory("src").await.unwrap();
        fs.put("src/a.txt", b"a").await.unwrap();
        fs.put("src/sub/b.txt", b"b").await.unwrap();
        fs.put("srcfile.txt", b"s").await.unwrap();

        fs.rename("src", "dst").await.unwrap();

        assert!(!fs.exists("src").await.unwrap());
        assert_eq!(fs.read_file("dst/a.txt").await.unwrap(), b"a");
        assert_eq!(fs.read_file("dst/sub/b.txt").await.unwrap(), b"b");
        assert_eq!(fs.directories("dst").await.unwrap(), vec!["sub"]);
        assert!(fs.exists("srcfile.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_errors() {
        let fs = test_backend();
        fs.put("a/f.txt", b"x").await.unwrap();
        fs.put("b.txt", b"x").await.unwrap();
        assert!(fs.rename("missing", "x").await.unwrap_err().is_not_found());
        assert!(fs.rename("a", "a/inner").await.unwrap_err().is_conflict());
        assert!(fs.rename("b.txt", "a/f.txt").await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_copy() {
        let fs = test_backend();
        fs.put("a.txt", b"payload").await.unwrap();
        fs.copy("a.txt", "b.txt").await.unwrap();
        assert_eq!(fs.read_file("a.txt").await.unwrap(), b"payload");
        assert_eq!(fs.read_file("b.txt").await.unwrap(), b"payload");
        assert!(fs.copy("missing.txt", "c.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_file_best_effort() {
        let fs = test_backend();
        fs.put("a.txt", b"x").await.unwrap();
        fs.make_directory("dir").await.unwrap();

        let err = fs
            .delete_file(&["a.txt", "dir", "missing.txt"])
            .await
            .unwrap_err();
        let StorageError::PartialDelete { attempted, failures } = err else {
            panic!("expected PartialDelete");
        };
        assert_eq!(attempted, 3);
        assert_eq!(failures.len(), 2);
        assert!(failures[0].error.is_conflict());
        assert!(failures[1].error.is_not_found());
        assert!(!fs.exists("a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_directory() {
        let fs = test_backend();
        fs.make_directory("dir").await.unwrap();
        fs.put("dir/a.txt", b"x").await.unwrap();
        fs.put("dir.txt", b"x").await.unwrap();

        fs.delete_directory("dir").await.unwrap();

        assert!(!fs.exists("dir").await.unwrap());
        assert!(fs.exists("dir.txt").await.unwrap());
        assert!(fs.delete_directory("dir").await.unwrap_err().is_not_found());
        assert!(fs.delete_directory("dir.txt").await.unwrap_err().is_conflict());
    }

    #[test]
    fn test_url() {
        let fs = test_backend();
        assert_eq!(
            fs.url("/img/cat.png").unwrap(),
            "https://bucket.example.com/img/cat.png"
        );

        let bare = ObjectBackend::new(Arc::new(InMemory::new()), "");
        assert!(matches!(bare.url("x"), Err(StorageError::Unsupported { .. })));
    }

    #[test]
    fn test_s3_requires_credentials() {
        let disk = Disk::new(Driver::S3, "https://s3.example.com");
        assert!(matches!(
            ObjectBackend::s3(&disk),
            Err(StorageError::Configuration(_))
        ));

        let disk = disk.with_s3("us-east-1", "key", "secret", "bucket");
        let fs = ObjectBackend::s3(&disk).unwrap();
        assert_eq!(fs.driver(), Driver::S3);
    }
}
