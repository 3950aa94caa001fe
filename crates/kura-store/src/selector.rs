//! Backend selection from a [`Disk`].

use std::str::FromStr;

use tracing::info;

use crate::backends::{Backend, ObjectBackend, StaticBackend, TableBackend, TableOptions};
use crate::disk::{DEFAULT_TABLE, Disk, Driver};
use crate::error::{StorageError, StorageResult};

/// Validate a disk and build its backend.
///
/// Checks run in a fixed order so the first missing piece is the one
/// reported: an empty disk, then the driver, then the URL, then the driver
/// name itself, then the driver's own fields.
pub fn open(disk: Disk) -> StorageResult<Backend> {
    if disk.is_empty() {
        return Err(StorageError::configuration("disk configuration is empty"));
    }
    if disk.driver.trim().is_empty() {
        return Err(StorageError::configuration("driver is required"));
    }
    if disk.url.trim().is_empty() {
        return Err(StorageError::configuration("url is required"));
    }
    let driver = Driver::from_str(disk.driver.trim()).map_err(|_| {
        StorageError::configuration(format!("unsupported driver {:?}", disk.driver))
    })?;

    let backend: Backend = match driver {
        Driver::Sql => {
            let connection = disk.connection.clone().ok_or_else(|| {
                StorageError::configuration("connection is required for the sql driver")
            })?;
            let table = match disk.table.as_deref().map(str::trim) {
                Some(table) if !table.is_empty() => table.to_string(),
                _ => DEFAULT_TABLE.to_string(),
            };
            let options = TableOptions::new(connection)
                .with_table(table)
                .with_automigrate(disk.automigrate)
                .with_url(disk.url.clone());
            TableBackend::new(options)?.into()
        }
        Driver::S3 => ObjectBackend::s3(&disk)?.into(),
        Driver::Static => StaticBackend::new(disk.url.clone()).into(),
    };

    info!(%driver, url = %disk.url, "opened storage backend");
    Ok(backend)
}
