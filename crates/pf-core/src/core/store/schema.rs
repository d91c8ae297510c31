use anyhow::{Context, Result};
use rusqlite::Connection;

/// A package may share its boot image with other packages, so boots are keyed
/// by content hash and linked through `PACKAGE_BOOT`.
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS PACKAGE (
        id INTEGER NOT NULL PRIMARY KEY,
        boot_hash TEXT NOT NULL,
        type TEXT CHECK (type IN ('firmware', 'rom')) NOT NULL,
        package_sig TEXT NOT NULL,
        file_path TEXT NOT NULL UNIQUE,
        epoch INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS BOOT (
        id INTEGER NOT NULL PRIMARY KEY,
        boot_hash TEXT NOT NULL UNIQUE,
        file_path TEXT NOT NULL,
        is_patched INTEGER CHECK (is_patched IN (0, 1)),
        magisk_version TEXT,
        hardware TEXT,
        epoch INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS PACKAGE_BOOT (
        package_id INTEGER,
        boot_id INTEGER,
        epoch INTEGER NOT NULL,
        PRIMARY KEY (package_id, boot_id),
        FOREIGN KEY (package_id) REFERENCES PACKAGE(id),
        FOREIGN KEY (boot_id) REFERENCES BOOT(id)
    );
"#;

pub(super) const TABLES: [&str; 3] = ["PACKAGE", "BOOT", "PACKAGE_BOOT"];

pub(super) fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys for provenance store")?;
    Ok(())
}

pub(super) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("failed to initialize provenance store schema")?;
    Ok(())
}
