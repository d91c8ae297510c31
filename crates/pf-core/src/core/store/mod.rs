//! Boot-image provenance store.
//!
//! A SQLite file recording every package that was scanned, every distinct boot
//! image (by content hash) pulled out of them, and which packages carried which
//! boot images. Rows are only ever inserted, rewritten by redaction on an
//! exported copy, or removed by an explicit purge.

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

mod rows;
mod schema;

/// Integrity signals callers are expected to branch on.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{table} already tracks {key}")]
    AlreadyTracked { table: &'static str, key: String },
    #[error("package {package_id} or boot {boot_id} does not exist")]
    InvalidReference { package_id: i64, boot_id: i64 },
    #[error("unknown package type '{0}'")]
    UnknownPackageType(String),
    #[error("provenance store is missing tables: {0}")]
    MissingTables(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Firmware,
    Rom,
}

impl PackageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Firmware => "firmware",
            Self::Rom => "rom",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PackageType {
    type Error = StoreError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "firmware" => Ok(Self::Firmware),
            "rom" => Ok(Self::Rom),
            other => Err(StoreError::UnknownPackageType(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPackage {
    pub boot_hash: String,
    pub package_type: PackageType,
    pub package_sig: String,
    pub file_path: String,
    pub epoch: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Package {
    pub id: i64,
    pub boot_hash: String,
    pub package_type: PackageType,
    pub package_sig: String,
    pub file_path: String,
    pub epoch: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBoot {
    pub boot_hash: String,
    pub file_path: String,
    pub is_patched: bool,
    pub magisk_version: Option<String>,
    pub hardware: Option<String>,
    pub epoch: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Boot {
    pub id: i64,
    pub boot_hash: String,
    pub file_path: String,
    pub is_patched: bool,
    pub magisk_version: Option<String>,
    pub hardware: Option<String>,
    pub epoch: i64,
}

/// A boot image joined with one package that carried it, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BootRecord {
    pub boot: Boot,
    pub package: Option<Package>,
}

/// Row id plus whether this call created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tracked {
    pub id: i64,
    pub inserted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedBoot {
    pub package: Tracked,
    pub boot: Tracked,
    pub linked: bool,
}

pub struct ProvenanceStore {
    conn: Connection,
    path: PathBuf,
}

impl ProvenanceStore {
    /// Opens (creating if needed) the store at `path` and ensures the schema.
    ///
    /// Safe to call on every startup.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open provenance store at {}", path.display()))?;
        schema::configure(&conn)?;
        schema::init(&conn)?;
        debug!(path = %path.display(), "provenance store ready");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fails with [`StoreError::MissingTables`] when any table is absent.
    ///
    /// # Errors
    /// Also returns an error when `sqlite_master` cannot be read.
    pub fn verify_schema(&self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let found = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        let missing: Vec<&str> = schema::TABLES
            .iter()
            .copied()
            .filter(|name| !found.contains(*name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::MissingTables(missing.join(", ")).into())
        }
    }

    /// Inserts a package; a duplicate `file_path` fails with
    /// [`StoreError::AlreadyTracked`].
    ///
    /// # Errors
    /// Returns an error on constraint violations or database failures.
    pub fn insert_package(&self, package: &NewPackage) -> Result<i64> {
        rows::insert_package(&self.conn, package)
    }

    /// # Errors
    /// Returns an error on database failures.
    pub fn package_by_path(&self, file_path: &str) -> Result<Option<Package>> {
        rows::package_by_path(&self.conn, file_path)
    }

    /// Inserts the package or returns the row already tracking its path.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub fn ensure_package(&self, package: &NewPackage) -> Result<Tracked> {
        rows::ensure_package(&self.conn, package)
    }

    /// Inserts a boot image; a duplicate `boot_hash` fails with
    /// [`StoreError::AlreadyTracked`].
    ///
    /// # Errors
    /// Returns an error on constraint violations or database failures.
    pub fn insert_boot(&self, boot: &NewBoot) -> Result<i64> {
        rows::insert_boot(&self.conn, boot)
    }

    /// # Errors
    /// Returns an error on database failures.
    pub fn boot_by_hash(&self, boot_hash: &str) -> Result<Option<Boot>> {
        rows::boot_by_hash(&self.conn, boot_hash)
    }

    /// Inserts the boot image or reuses the row with the same content hash.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub fn ensure_boot(&self, boot: &NewBoot) -> Result<Tracked> {
        rows::ensure_boot(&self.conn, boot)
    }

    /// Records that `package_id` carried `boot_id`. Linking an existing pair is
    /// a no-op that keeps the first epoch; returns whether a row was added.
    ///
    /// # Errors
    /// Fails with [`StoreError::InvalidReference`] when either id is unknown.
    pub fn link(&self, package_id: i64, boot_id: i64, epoch: i64) -> Result<bool> {
        rows::link(&self.conn, package_id, boot_id, epoch)
    }

    /// Ensures the package and boot rows exist and links them, all in one
    /// transaction.
    ///
    /// # Errors
    /// Returns an error on database failures; nothing is committed then.
    pub fn track_boot_image(
        &mut self,
        package: &NewPackage,
        boot: &NewBoot,
    ) -> Result<TrackedBoot> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start provenance transaction")?;
        let package_row = rows::ensure_package(&tx, package)?;
        let boot_row = rows::ensure_boot(&tx, boot)?;
        let linked = rows::link(&tx, package_row.id, boot_row.id, boot.epoch)?;
        tx.commit()
            .context("failed to commit provenance transaction")?;
        Ok(TrackedBoot {
            package: package_row,
            boot: boot_row,
            linked,
        })
    }

    /// # Errors
    /// Returns an error on database failures.
    pub fn boots_for_package(&self, package_id: i64) -> Result<Vec<Boot>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.boot_hash, b.file_path, b.is_patched, b.magisk_version, b.hardware, b.epoch \
             FROM BOOT b JOIN PACKAGE_BOOT pb ON pb.boot_id = b.id \
             WHERE pb.package_id = ?1 ORDER BY b.id",
        )?;
        let boots = stmt
            .query_map(params![package_id], |row| rows::boot_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(boots)
    }

    /// # Errors
    /// Returns an error on database failures.
    pub fn packages_for_boot(&self, boot_id: i64) -> Result<Vec<Package>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.boot_hash, p.type, p.package_sig, p.file_path, p.epoch \
             FROM PACKAGE p JOIN PACKAGE_BOOT pb ON pb.package_id = p.id \
             WHERE pb.boot_id = ?1 ORDER BY p.id",
        )?;
        let packages = stmt
            .query_map(params![boot_id], |row| rows::package_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packages)
    }

    /// Every boot image with each package that carried it; boots that were
    /// never linked appear once without a package.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub fn boot_records(&self) -> Result<Vec<BootRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.boot_hash, b.file_path, b.is_patched, b.magisk_version, b.hardware, b.epoch, \
                    p.id, p.boot_hash, p.type, p.package_sig, p.file_path, p.epoch \
             FROM BOOT b \
             LEFT JOIN PACKAGE_BOOT pb ON pb.boot_id = b.id \
             LEFT JOIN PACKAGE p ON p.id = pb.package_id \
             ORDER BY b.epoch DESC, b.id, p.id",
        )?;
        let records = stmt
            .query_map([], |row| {
                let boot = rows::boot_from_row(row, 0)?;
                let package = match row.get::<_, Option<i64>>(7)? {
                    Some(_) => Some(rows::package_from_row(row, 7)?),
                    None => None,
                };
                Ok(BootRecord { boot, package })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Rewrites `file_path` in `BOOT` and then `PACKAGE` through `rewrite`,
    /// committing each table as one transaction. Returns the number of rows
    /// that changed.
    ///
    /// # Errors
    /// Returns an error on database failures; a failed table is rolled back.
    pub fn rewrite_file_paths(&mut self, rewrite: impl Fn(&str) -> String) -> Result<usize> {
        let mut changed = 0;
        for table in ["BOOT", "PACKAGE"] {
            let tx = self.conn.transaction()?;
            let entries: Vec<(i64, String)> = {
                let mut stmt = tx.prepare(&format!("SELECT id, file_path FROM {table}"))?;
                let collected = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                collected
            };
            for (id, file_path) in entries {
                let rewritten = rewrite(&file_path);
                if rewritten != file_path {
                    tx.execute(
                        &format!("UPDATE {table} SET file_path = ?1 WHERE id = ?2"),
                        params![rewritten, id],
                    )?;
                    changed += 1;
                }
            }
            tx.commit()
                .with_context(|| format!("failed to rewrite file paths in {table}"))?;
        }
        Ok(changed)
    }

    /// Removes a boot image and its associations; returns whether it existed.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub fn purge_boot(&mut self, boot_id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM PACKAGE_BOOT WHERE boot_id = ?1", params![boot_id])?;
        let removed = tx.execute("DELETE FROM BOOT WHERE id = ?1", params![boot_id])?;
        tx.commit().context("failed to purge boot image")?;
        debug!(boot_id, removed, "purged boot image");
        Ok(removed > 0)
    }

    /// Removes a package and its associations; returns whether it existed.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub fn purge_package(&mut self, package_id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM PACKAGE_BOOT WHERE package_id = ?1",
            params![package_id],
        )?;
        let removed = tx.execute("DELETE FROM PACKAGE WHERE id = ?1", params![package_id])?;
        tx.commit().context("failed to purge package")?;
        debug!(package_id, removed, "purged package");
        Ok(removed > 0)
    }
}

/// Current Unix time in seconds, as stored in `epoch` columns.
#[must_use]
pub fn epoch_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// `true` when `err` carries [`StoreError::AlreadyTracked`].
#[must_use]
pub fn is_already_tracked(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::AlreadyTracked { .. })
    )
}
