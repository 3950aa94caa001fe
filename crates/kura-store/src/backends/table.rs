//! Table-backed virtual filesystem.
//!
//! Simulates a directory tree on one flat SQLite table keyed by canonical
//! path. Directory listings are derived from path prefixes (see
//! [`crate::hierarchy`]); only [`Storage::make_directory`] writes directory
//! rows. Parent directories of a file are implied, never inserted.
//!
//! Multi-statement writes run inside an IMMEDIATE transaction. A directory
//! move is a single `UPDATE` rewriting the prefix of every row beneath it,
//! so no reader ever sees a half-moved subtree.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::disk::{DEFAULT_TABLE, Driver, SharedConnection};
use crate::error::{DeleteFailure, StorageError, StorageResult};
use crate::hierarchy::{self, ancestors, descendant_range, is_within};
use crate::ops::Storage;
use crate::path::{join_url, normalize, normalize_parent};
use crate::types::{EntryAttr, EntryKind, content_hash, now_millis, time_from_millis};

/// Options for [`TableBackend::new`].
#[derive(Clone)]
pub struct TableOptions {
    pub connection: SharedConnection,
    pub table: String,
    /// Create the table if it is missing.
    pub automigrate: bool,
    /// Base URL for `url()`.
    pub url: Option<String>,
}

impl TableOptions {
    /// Options with the default table and automigration enabled.
    pub fn new(connection: SharedConnection) -> Self {
        Self {
            connection,
            table: DEFAULT_TABLE.to_string(),
            automigrate: true,
            url: None,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_automigrate(mut self, automigrate: bool) -> Self {
        self.automigrate = automigrate;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Storage backend over a SQLite table.
///
/// Holds no state besides the connection handle; clones share it.
#[derive(Clone)]
pub struct TableBackend {
    conn: SharedConnection,
    table: String,
    url: Option<String>,
}

impl std::fmt::Debug for TableBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableBackend")
            .field("table", &self.table)
            .field("url", &self.url)
            .finish()
    }
}

fn schema(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    path TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('file', 'directory')),
    content BLOB,
    size INTEGER NOT NULL DEFAULT 0,
    hash TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS "{table}_kind_path" ON "{table}"(kind, path);
"#
    )
}

/// Table names are spliced into SQL, so only plain identifiers are allowed.
fn validate_table_name(table: &str) -> StorageResult<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StorageError::configuration(format!(
            "table name {table:?} must be a plain SQL identifier"
        )))
    }
}

impl TableBackend {
    /// Build a backend, creating the table when `automigrate` is set.
    ///
    /// Without automigration nothing is checked here; a missing table shows
    /// up as a `BackingStore` error on the first operation.
    pub fn new(options: TableOptions) -> StorageResult<Self> {
        validate_table_name(&options.table)?;

        if options.automigrate {
            options
                .connection
                .lock()
                .execute_batch(&schema(&options.table))?;
            info!(table = %options.table, "table storage ready");
        }

        Ok(Self {
            conn: options.connection,
            table: options.table,
            url: options.url.filter(|u| !u.is_empty()),
        })
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn entries<'c>(&'c self, conn: &'c Connection) -> Entries<'c> {
        Entries {
            conn,
            table: &self.table,
        }
    }

    fn stat_entry(&self, path: &str) -> StorageResult<EntryAttr> {
        let path = normalize(path)?;
        let conn = self.conn.lock();
        let row = self
            .entries(&conn)
            .lookup(&path)?
            .ok_or_else(|| StorageError::not_found(&path))?;
        Ok(row.into_attr())
    }

    fn entry_exists(&self, path: &str) -> StorageResult<bool> {
        let Some(path) = normalize_parent(path)? else {
            // Root always exists
            return Ok(true);
        };
        let conn = self.conn.lock();
        Ok(self.entries(&conn).kind(&path)?.is_some())
    }

    fn read_content(&self, path: &str) -> StorageResult<Vec<u8>> {
        let path = normalize(path)?;
        let conn = self.conn.lock();
        let content: Option<Option<Vec<u8>>> = conn
            .query_row(
                &format!(
                    r#"SELECT content FROM "{}" WHERE path = ?1 AND kind = 'file'"#,
                    self.table
                ),
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        match content {
            Some(content) => Ok(content.unwrap_or_default()),
            None => Err(StorageError::not_found(path)),
        }
    }

    fn list_children(&self, parent: &str, kind: EntryKind) -> StorageResult<Vec<String>> {
        let parent = normalize_parent(parent)?;
        let conn = self.conn.lock();
        self.entries(&conn).children(parent.as_deref(), kind)
    }

    #[tracing::instrument(skip(self, content), fields(size = content.len()), name = "table.put")]
    fn put_entry(&self, path: &str, content: &[u8]) -> StorageResult<()> {
        let path = normalize(path)?;
        let hash = content_hash(content);
        let now = now_millis();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entries = self.entries(&tx);

        entries.ensure_placeable(&path)?;
        match entries.kind(&path)? {
            Some(EntryKind::Directory) => {
                return Err(StorageError::conflict(format!("{path} is a directory")));
            }
            Some(EntryKind::File) => {}
            None => {
                if entries.has_descendants(&path)? {
                    return Err(StorageError::conflict(format!(
                        "{path} has entries beneath it"
                    )));
                }
            }
        }

        tx.execute(
            &format!(
                r#"INSERT INTO "{}" (path, kind, content, size, hash, created_at, updated_at)
                   VALUES (?1, 'file', ?2, ?3, ?4, ?5, ?5)
                   ON CONFLICT(path) DO UPDATE SET
                       content = excluded.content,
                       size = excluded.size,
                       hash = excluded.hash,
                       updated_at = excluded.updated_at"#,
                self.table
            ),
            params![path, content, content.len() as i64, hash, now],
        )?;
        tx.commit()?;

        debug!(%path, "stored file");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "table.make_directory")]
    fn insert_directory(&self, path: &str) -> StorageResult<()> {
        let path = normalize(path)?;
        let now = now_millis();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entries = self.entries(&tx);

        entries.ensure_placeable(&path)?;
        match entries.kind(&path)? {
            Some(EntryKind::Directory) => return Ok(()),
            Some(EntryKind::File) => {
                return Err(StorageError::conflict(format!("{path} is a file")));
            }
            None => {}
        }

        tx.execute(
            &format!(
                r#"INSERT INTO "{}" (path, kind, content, size, hash, created_at, updated_at)
                   VALUES (?1, 'directory', NULL, 0, NULL, ?2, ?2)"#,
                self.table
            ),
            params![path, now],
        )?;
        tx.commit()?;

        debug!(%path, "created directory");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "table.rename")]
    fn move_entry(&self, from: &str, to: &str) -> StorageResult<()> {
        let from = normalize(from)?;
        let to = normalize(to)?;
        let now = now_millis();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entries = self.entries(&tx);

        let source = entries.kind(&from)?;
        if source.is_none() && !entries.has_descendants(&from)? {
            return Err(StorageError::not_found(&from));
        }
        if from == to {
            return Ok(());
        }
        if source != Some(EntryKind::File) && is_within(&to, &from) {
            return Err(StorageError::conflict(format!(
                "cannot move {from} into itself ({to})"
            )));
        }
        entries.ensure_vacant(&to)?;
        entries.ensure_placeable(&to)?;

        let moved = if source == Some(EntryKind::File) {
            tx.execute(
                &format!(
                    r#"UPDATE "{}" SET path = ?1, updated_at = ?2 WHERE path = ?3"#,
                    self.table
                ),
                params![to, now, from],
            )?
        } else {
            // Prefix substitution over the directory row and every descendant.
            // substr() counts characters, not bytes.
            let range = descendant_range(&from);
            let keep_from = from.chars().count() as i64 + 1;
            tx.execute(
                &format!(
                    r#"UPDATE "{}" SET path = ?1 || substr(path, ?2), updated_at = ?3
                       WHERE path = ?4 OR (path >= ?5 AND path < ?6)"#,
                    self.table
                ),
                params![to, keep_from, now, from, range.lower, range.upper],
            )?
        };
        tx.commit()?;

        debug!(%from, %to, moved, "moved entries");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "table.copy")]
    fn copy_entry(&self, from: &str, to: &str) -> StorageResult<()> {
        let from = normalize(from)?;
        let to = normalize(to)?;
        let now = now_millis();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entries = self.entries(&tx);

        let source: Option<(Option<Vec<u8>>, Option<String>)> = tx
            .query_row(
                &format!(
                    r#"SELECT content, hash FROM "{}" WHERE path = ?1 AND kind = 'file'"#,
                    self.table
                ),
                params![from],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((content, hash)) = source else {
            return match entries.kind(&from)? {
                Some(EntryKind::Directory) => Err(StorageError::conflict(format!(
                    "{from} is a directory"
                ))),
                _ => Err(StorageError::not_found(&from)),
            };
        };
        if from == to {
            return Ok(());
        }

        if entries.kind(&to)? == Some(EntryKind::Directory) || entries.has_descendants(&to)? {
            return Err(StorageError::conflict(format!("{to} is a directory")));
        }
        entries.ensure_placeable(&to)?;

        let content = content.unwrap_or_default();
        let hash = hash.unwrap_or_else(|| content_hash(&content));
        tx.execute(
            &format!(
                r#"INSERT OR REPLACE INTO "{}" (path, kind, content, size, hash, created_at, updated_at)
                   VALUES (?1, 'file', ?2, ?3, ?4, ?5, ?5)"#,
                self.table
            ),
            params![to, content, content.len() as i64, hash, now],
        )?;
        tx.commit()?;

        debug!(%from, %to, "copied file");
        Ok(())
    }

    fn delete_one(&self, path: &str) -> StorageResult<()> {
        let path = normalize(path)?;
        let conn = self.conn.lock();
        let deleted = conn.execute(
            &format!(
                r#"DELETE FROM "{}" WHERE path = ?1 AND kind = 'file'"#,
                self.table
            ),
            params![path],
        )?;
        if deleted == 0 {
            return match self.entries(&conn).kind(&path)? {
                Some(EntryKind::Directory) => Err(StorageError::conflict(format!(
                    "{path} is a directory"
                ))),
                _ => Err(StorageError::not_found(path)),
            };
        }
        debug!(%path, "deleted file");
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "table.delete_directory")]
    fn delete_tree(&self, path: &str) -> StorageResult<()> {
        let path = normalize(path)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if self.entries(&tx).kind(&path)? == Some(EntryKind::File) {
            return Err(StorageError::conflict(format!("{path} is a file")));
        }

        let range = descendant_range(&path);
        let deleted = tx.execute(
            &format!(
                r#"DELETE FROM "{}" WHERE path = ?1 OR (path >= ?2 AND path < ?3)"#,
                self.table
            ),
            params![path, range.lower, range.upper],
        )?;
        if deleted == 0 {
            return Err(StorageError::not_found(path));
        }
        tx.commit()?;

        debug!(%path, deleted, "deleted directory");
        Ok(())
    }
}

#[async_trait]
impl Storage for TableBackend {
    fn driver(&self) -> Driver {
        Driver::Sql
    }

    async fn stat(&self, path: &str) -> StorageResult<EntryAttr> {
        self.stat_entry(path)
    }

    async fn read_file(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.read_content(path)
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.entry_exists(path)
    }

    async fn directories(&self, parent: &str) -> StorageResult<Vec<String>> {
        self.list_children(parent, EntryKind::Directory)
    }

    async fn files(&self, parent: &str) -> StorageResult<Vec<String>> {
        self.list_children(parent, EntryKind::File)
    }

    fn url(&self, path: &str) -> StorageResult<String> {
        let base = self
            .url
            .as_deref()
            .ok_or_else(|| StorageError::unsupported("sql", "url without a base url"))?;
        Ok(join_url(base, &normalize(path)?))
    }

    async fn put(&self, path: &str, content: &[u8]) -> StorageResult<()> {
        self.put_entry(path, content)
    }

    async fn make_directory(&self, path: &str) -> StorageResult<()> {
        self.insert_directory(path)
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.move_entry(from, to)
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        self.copy_entry(from, to)
    }

    async fn delete_file(&self, paths: &[&str]) -> StorageResult<()> {
        let mut failures = Vec::new();
        for path in paths {
            if let Err(error) = self.delete_one(path) {
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

    async fn delete_directory(&self, path: &str) -> StorageResult<()> {
        self.delete_tree(path)
    }
}

/// One row, minus content.
#[derive(Debug, Clone)]
struct EntryRow {
    path: String,
    kind: EntryKind,
    size: i64,
    hash: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl EntryRow {
    fn into_attr(self) -> EntryAttr {
        EntryAttr {
            path: self.path,
            kind: self.kind,
            size: self.size.max(0) as u64,
            created: Some(time_from_millis(self.created_at)),
            modified: time_from_millis(self.updated_at),
            checksum: self.hash,
        }
    }
}

fn kind_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<EntryKind> {
    let value: String = row.get(idx)?;
    EntryKind::from_str(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown entry kind {value:?}").into(),
        )
    })
}

/// Path queries against one table, usable inside or outside a transaction.
struct Entries<'c> {
    conn: &'c Connection,
    table: &'c str,
}

impl Entries<'_> {
    fn lookup(&self, path: &str) -> StorageResult<Option<EntryRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    r#"SELECT path, kind, size, hash, created_at, updated_at
                       FROM "{}" WHERE path = ?1"#,
                    self.table
                ),
                params![path],
                |row| {
                    Ok(EntryRow {
                        path: row.get(0)?,
                        kind: kind_column(row, 1)?,
                        size: row.get(2)?,
                        hash: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn kind(&self, path: &str) -> StorageResult<Option<EntryKind>> {
        let kind = self
            .conn
            .query_row(
                &format!(r#"SELECT kind FROM "{}" WHERE path = ?1"#, self.table),
                params![path],
                |row| kind_column(row, 0),
            )
            .optional()?;
        Ok(kind)
    }

    fn has_descendants(&self, path: &str) -> StorageResult<bool> {
        let range = descendant_range(path);
        let found = self.conn.query_row(
            &format!(
                r#"SELECT EXISTS(SELECT 1 FROM "{}" WHERE path >= ?1 AND path < ?2)"#,
                self.table
            ),
            params![range.lower, range.upper],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Files are leaves: fail if any ancestor of `path` is a file.
    fn ensure_placeable(&self, path: &str) -> StorageResult<()> {
        for ancestor in ancestors(path) {
            if self.kind(ancestor)? == Some(EntryKind::File) {
                return Err(StorageError::conflict(format!(
                    "{ancestor} is a file and cannot contain {path}"
                )));
            }
        }
        Ok(())
    }

    /// Fail if anything exists at or beneath `path`.
    fn ensure_vacant(&self, path: &str) -> StorageResult<()> {
        if self.kind(path)?.is_some() || self.has_descendants(path)? {
            return Err(StorageError::conflict(format!("{path} already exists")));
        }
        Ok(())
    }

    fn children(&self, parent: Option<&str>, kind: EntryKind) -> StorageResult<Vec<String>> {
        let paths: Vec<String> = match parent {
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    r#"SELECT path FROM "{}" WHERE kind = ?1 AND instr(path, '/') = 0
                       ORDER BY path"#,
                    self.table
                ))?;
                stmt.query_map(params![kind.as_str()], |row| row.get(0))?
                    .collect::<rusqlite::Result<_>>()?
            }
            Some(parent) => {
                let range = descendant_range(parent);
                let mut stmt = self.conn.prepare(&format!(
                    r#"SELECT path FROM "{}" WHERE kind = ?1 AND path >= ?2 AND path < ?3
                       ORDER BY path"#,
                    self.table
                ))?;
                stmt.query_map(params![kind.as_str(), range.lower, range.upper], |row| {
                    row.get(0)
                })?
                .collect::<rusqlite::Result<_>>()?
            }
        };

        Ok(paths
            .iter()
            .filter_map(|path| hierarchy::child_name(parent, path))
            .map(str::to_string)
            .collect())
    }
}
