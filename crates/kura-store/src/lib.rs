//! Uniform file storage over interchangeable backends.
//!
//! Callers describe a [`Disk`], hand it to [`open`], and talk to the returned
//! [`Backend`] through the [`Storage`] trait:
//!
//! - **sql**: a hierarchical virtual filesystem on one flat SQLite table
//! - **s3**: an object store, with directories as key prefixes
//! - **static**: URL synthesis for content served elsewhere
//!
//! ```no_run
//! use kura_store::{Disk, Storage, open, shared_connection};
//!
//! # async fn demo() -> kura_store::StorageResult<()> {
//! let conn = shared_connection(rusqlite::Connection::open("kura.db")?);
//! let disk = open(Disk::sql("https://files.example.com", conn))?;
//!
//! disk.put("docs/readme.md", b"# hello").await?;
//! assert_eq!(disk.files("docs").await?, vec!["readme.md"]);
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod disk;
pub mod error;
pub mod hierarchy;
pub mod ops;
pub mod path;
pub mod selector;
pub mod types;

pub use backends::{Backend, DIRECTORY_MARKER, ObjectBackend, StaticBackend, TableBackend, TableOptions};
pub use disk::{DEFAULT_TABLE, Disk, DiskConfig, Driver, KuraConfig, SharedConnection, shared_connection};
pub use error::{BackingStoreError, DeleteFailure, StorageError, StorageResult};
pub use ops::Storage;
pub use selector::open;
pub use types::{EntryAttr, EntryKind, content_hash};
