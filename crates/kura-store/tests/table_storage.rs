//! Integration tests for table storage on a file-backed SQLite database.
//!
//! - **Walkthrough:** every operation against one disk opened through `open()`
//! - **Sharing:** two connections on one file see each other's writes
//! - **Config:** TOML config → `DiskConfig` → `open()` → same data on reopen

use std::path::Path;
use std::time::UNIX_EPOCH;

use kura_store::{
    Backend, DEFAULT_TABLE, Disk, KuraConfig, Storage, StorageError, open, shared_connection,
};
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// Shared test setup
// ============================================================================

fn open_file_disk(db: &Path, table: &str) -> Backend {
    let conn = shared_connection(Connection::open(db).unwrap());
    open(Disk::sql("https://example.com", conn).with_table(table)).unwrap()
}

fn temp_db() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("kura.db");
    (dir, db)
}

// ============================================================================
// Walkthrough
// ============================================================================

#[tokio::test]
async fn test_walkthrough() {
    let (_dir, db) = temp_db();
    let fs = open_file_disk(&db, "sqlstore");

    fs.put("test.txt", b"test").await.unwrap();
    assert_eq!(fs.read_file("test.txt").await.unwrap(), b"test");

    fs.put("size.txt", b"abcdef").await.unwrap();
    assert!(fs.exists("size.txt").await.unwrap());
    assert_eq!(fs.size("size.txt").await.unwrap(), 6);
    assert!(fs.last_modified("size.txt").await.unwrap() > UNIX_EPOCH);

    fs.make_directory("dir").await.unwrap();
    assert_eq!(fs.directories("/").await.unwrap(), vec!["dir"]);
    assert_eq!(fs.files("/").await.unwrap(), vec!["size.txt", "test.txt"]);

    assert_eq!(fs.url("url.txt").unwrap(), "https://example.com/url.txt");

    fs.put("delete.txt", b"x").await.unwrap();
    fs.delete_file(&["delete.txt"]).await.unwrap();
    assert!(!fs.exists("delete.txt").await.unwrap());

    fs.put("move.txt", b"m").await.unwrap();
    fs.rename("move.txt", "moved.txt").await.unwrap();
    assert!(!fs.exists("move.txt").await.unwrap());
    fs.copy("moved.txt", "copied.txt").await.unwrap();
    assert!(fs.exists("moved.txt").await.unwrap());
    assert_eq!(fs.read_file("copied.txt").await.unwrap(), b"m");

    assert!(matches!(
        fs.read_file("does-not-exist.txt").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_directory_tree_lifecycle() {
    let (_dir, db) = temp_db();
    let fs = open_file_disk(&db, DEFAULT_TABLE);

    fs.make_directory("projects").await.unwrap();
    fs.make_directory("projects/kura").await.unwrap();
    fs.put("projects/kura/readme.md", b"# kura").await.unwrap();
    fs.put("projects/kura/src/lib.rs", b"//!").await.unwrap();
    fs.put("projects-archive.tar", b"tar").await.unwrap();

    fs.rename("projects/kura", "archive/kura-old").await.unwrap();

    assert!(fs.directories("projects").await.unwrap().is_empty());
    assert_eq!(fs.directories("archive").await.unwrap(), vec!["kura-old"]);
    assert_eq!(
        fs.files("archive/kura-old").await.unwrap(),
        vec!["readme.md"]
    );
    assert_eq!(
        fs.read_file("archive/kura-old/src/lib.rs").await.unwrap(),
        b"//!"
    );

    fs.delete_directory("archive").await.unwrap();
    assert!(!fs.exists("archive/kura-old/readme.md").await.unwrap());
    assert!(fs.exists("projects").await.unwrap());
    assert!(fs.exists("projects-archive.tar").await.unwrap());
}

// ============================================================================
// Sharing
// ============================================================================

#[tokio::test]
async fn test_two_connections_one_file() {
    let (_dir, db) = temp_db();
    let writer = open_file_disk(&db, "shared");
    let reader = open_file_disk(&db, "shared");

    writer.put("a/b/c.txt", b"shared").await.unwrap();
    assert_eq!(reader.read_file("a/b/c.txt").await.unwrap(), b"shared");

    writer.rename("a", "z").await.unwrap();
    assert!(!reader.exists("a/b/c.txt").await.unwrap());
    assert_eq!(reader.files("z/b").await.unwrap(), vec!["c.txt"]);
}

#[tokio::test]
async fn test_tables_are_isolated() {
    let conn = shared_connection(Connection::open_in_memory().unwrap());
    let left = open(Disk::sql("https://l.example.com", conn.clone()).with_table("left")).unwrap();
    let right = open(Disk::sql("https://r.example.com", conn).with_table("right")).unwrap();

    left.put("only-left.txt", b"x").await.unwrap();
    assert!(left.exists("only-left.txt").await.unwrap());
    assert!(!right.exists("only-left.txt").await.unwrap());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let (_dir, db) = temp_db();
    {
        let fs = open_file_disk(&db, "persist");
        fs.put("keep.txt", b"kept").await.unwrap();
    }
    let fs = open_file_disk(&db, "persist");
    assert_eq!(fs.read_file("keep.txt").await.unwrap(), b"kept");

    let attr = fs.stat("keep.txt").await.unwrap();
    assert_eq!(attr.checksum, Some(kura_store::content_hash(b"kept")));
}

// ============================================================================
// Config
// ============================================================================

#[tokio::test]
async fn test_config_file_opens_backends() {
    let (dir, db) = temp_db();
    let config_path = dir.path().join("kura.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
default = "files"

[disks.files]
driver = "sql"
url = "https://files.example.com"
database = '{}'
automigrate = true

[disks.cdn]
driver = "static"
url = "https://cdn.example.com"
"#,
            db.display()
        ),
    )
    .unwrap();

    let config = KuraConfig::load(&config_path).unwrap();
    let files = open(config.disk(None).unwrap().clone().into_disk().unwrap()).unwrap();
    assert!(matches!(files, Backend::Table(_)));
    files.put("from-config.txt", b"hi").await.unwrap();

    let cdn = open(config.disk(Some("cdn")).unwrap().clone().into_disk().unwrap()).unwrap();
    assert!(matches!(cdn, Backend::Static(_)));
    assert_eq!(
        cdn.url("from-config.txt").unwrap(),
        "https://cdn.example.com/from-config.txt"
    );

    // Fresh load, fresh connection, same rows
    let again = KuraConfig::load(&config_path).unwrap();
    let files = open(again.disk(Some("files")).unwrap().clone().into_disk().unwrap()).unwrap();
    assert_eq!(files.read_file("from-config.txt").await.unwrap(), b"hi");
}

#[tokio::test]
async fn test_config_without_automigrate_on_fresh_file() {
    let (_dir, db) = temp_db();
    let config = KuraConfig::from_toml_str(&format!(
        "[disks.files]\ndriver = \"sql\"\nurl = \"https://f.example.com\"\ndatabase = '{}'\n",
        db.display()
    ))
    .unwrap();
    let disk = config.disk(None).unwrap().clone().into_disk().unwrap();
    let fs = open(disk).unwrap();
    assert!(matches!(fs, Backend::Table(_)));

    // No table was created, so the first query fails in SQLite
    assert!(matches!(
        fs.read_file("a.txt").await,
        Err(StorageError::BackingStore(_))
    ));
}
