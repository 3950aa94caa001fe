//! Disk configuration.
//!
//! A [`Disk`] describes how to build one backend. It can be assembled in code
//! or loaded from a TOML file holding several named disks:
//!
//! ```toml
//! default = "files"
//!
//! [disks.files]
//! driver = "sql"
//! url = "https://files.example.com"
//! database = "kura.db"
//! automigrate = true
//!
//! [disks.cdn]
//! driver = "static"
//! url = "https://cdn.example.com"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::{StorageError, StorageResult};

/// SQLite connection shared between table backends.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Wrap a connection for use by table backends.
pub fn shared_connection(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Table used when a sql disk does not name one.
pub const DEFAULT_TABLE: &str = "kura_entries";

/// Backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Driver {
    /// Table-backed virtual filesystem.
    Sql,
    /// S3-compatible object storage.
    S3,
    /// URL synthesis only.
    Static,
}

/// Description of one backend.
///
/// `driver` stays a raw string so an unrecognized driver is reported when
/// the disk is opened, not when it is written down.
#[derive(Clone, Default)]
pub struct Disk {
    pub driver: String,
    /// Base URL used by `url()`.
    pub url: String,
    /// Live connection for the sql driver.
    pub connection: Option<SharedConnection>,
    /// Table name for the sql driver.
    pub table: Option<String>,
    /// Create the table if it is missing.
    pub automigrate: bool,
    pub region: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub bucket: Option<String>,
    /// Endpoint override for S3-compatible services.
    pub endpoint: Option<String>,
}

impl fmt::Debug for Disk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disk")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("connection", &self.connection.as_ref().map(|_| "<connection>"))
            .field("table", &self.table)
            .field("automigrate", &self.automigrate)
            .field("region", &self.region)
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Disk {
    /// Start a disk for the given driver and base URL.
    pub fn new(driver: Driver, url: impl Into<String>) -> Self {
        Self {
            driver: driver.to_string(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Table-backed disk over a shared connection.
    pub fn sql(url: impl Into<String>, connection: SharedConnection) -> Self {
        Self {
            connection: Some(connection),
            automigrate: true,
            ..Self::new(Driver::Sql, url)
        }
    }

    /// Static URL disk.
    pub fn static_url(url: impl Into<String>) -> Self {
        Self::new(Driver::Static, url)
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Enable or disable automigration.
    pub fn with_automigrate(mut self, automigrate: bool) -> Self {
        self.automigrate = automigrate;
        self
    }

    /// Set S3 credentials and bucket.
    pub fn with_s3(
        mut self,
        region: impl Into<String>,
        key: impl Into<String>,
        secret: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        self.region = Some(region.into());
        self.key = Some(key.into());
        self.secret = Some(secret.into());
        self.bucket = Some(bucket.into());
        self
    }

    /// Returns true if no field has been set.
    pub fn is_empty(&self) -> bool {
        self.driver.is_empty()
            && self.url.is_empty()
            && self.connection.is_none()
            && self.table.is_none()
            && !self.automigrate
            && self.region.is_none()
            && self.key.is_none()
            && self.secret.is_none()
            && self.bucket.is_none()
            && self.endpoint.is_none()
    }

    /// Value of an optional field, treating blank strings as missing.
    pub(crate) fn required<'a>(
        value: &'a Option<String>,
        driver: Driver,
        field: &str,
    ) -> StorageResult<&'a str> {
        match value.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(StorageError::configuration(format!(
                "{field} is required for the {driver} driver"
            ))),
        }
    }
}

/// One disk as written in a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub url: String,
    /// SQLite database file, or `:memory:`.
    pub database: Option<PathBuf>,
    pub table: Option<String>,
    #[serde(default)]
    pub automigrate: bool,
    pub region: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
}

impl DiskConfig {
    /// Build a [`Disk`], opening the SQLite database if one is named.
    pub fn into_disk(self) -> StorageResult<Disk> {
        let connection = match &self.database {
            Some(path) if path.as_os_str() == ":memory:" => {
                Some(shared_connection(Connection::open_in_memory()?))
            }
            Some(path) => Some(shared_connection(Connection::open(path)?)),
            None => None,
        };

        Ok(Disk {
            driver: self.driver,
            url: self.url,
            connection,
            table: self.table,
            automigrate: self.automigrate,
            region: self.region,
            key: self.key,
            secret: self.secret,
            bucket: self.bucket,
            endpoint: self.endpoint,
        })
    }
}

/// Config file holding named disks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KuraConfig {
    /// Disk used when none is named.
    pub default: Option<String>,
    #[serde(default)]
    pub disks: BTreeMap<String, DiskConfig>,
}

impl KuraConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> StorageResult<Self> {
        toml::from_str(text).map_err(|e| StorageError::configuration(format!("config parse error: {e}")))
    }

    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StorageError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Look up a disk by name, or the default disk when `name` is `None`.
    pub fn disk(&self, name: Option<&str>) -> StorageResult<&DiskConfig> {
        let name = match name.or(self.default.as_deref()) {
            Some(name) => name,
            None => {
                // A lone disk needs no default
                let mut disks = self.disks.values();
                return match (disks.next(), disks.next()) {
                    (Some(only), None) => Ok(only),
                    _ => Err(StorageError::configuration(
                        "no disk named and no default disk configured",
                    )),
                };
            }
        };
        self.disks
            .get(name)
            .ok_or_else(|| StorageError::configuration(format!("unknown disk {name:?}")))
    }
}
