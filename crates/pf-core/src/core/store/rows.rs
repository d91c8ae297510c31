//! Single-row operations, usable on a plain connection or inside a transaction.

use std::ffi::c_int;

use anyhow::{Context, Result};
use rusqlite::{ffi, params, types::Type, Connection, ErrorCode, OptionalExtension, Row};

use super::{is_already_tracked, Boot, NewBoot, NewPackage, Package, PackageType, StoreError, Tracked};

pub(super) fn insert_package(conn: &Connection, package: &NewPackage) -> Result<i64> {
    conn.execute(
        "INSERT INTO PACKAGE (boot_hash, type, package_sig, file_path, epoch) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            package.boot_hash,
            package.package_type.as_str(),
            package.package_sig,
            package.file_path,
            package.epoch
        ],
    )
    .map_err(|err| match constraint(&err) {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => StoreError::AlreadyTracked {
            table: "PACKAGE",
            key: package.file_path.clone(),
        }
        .into(),
        _ => anyhow::Error::new(err).context("failed to insert package"),
    })?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn package_by_path(conn: &Connection, file_path: &str) -> Result<Option<Package>> {
    let package = conn
        .query_row(
            "SELECT id, boot_hash, type, package_sig, file_path, epoch \
             FROM PACKAGE WHERE file_path = ?1",
            params![file_path],
            |row| package_from_row(row, 0),
        )
        .optional()?;
    Ok(package)
}

pub(super) fn ensure_package(conn: &Connection, package: &NewPackage) -> Result<Tracked> {
    match insert_package(conn, package) {
        Ok(id) => Ok(Tracked { id, inserted: true }),
        Err(err) if is_already_tracked(&err) => {
            let existing = package_by_path(conn, &package.file_path)?
                .with_context(|| format!("package {} vanished", package.file_path))?;
            Ok(Tracked {
                id: existing.id,
                inserted: false,
            })
        }
        Err(err) => Err(err),
    }
}

pub(super) fn insert_boot(conn: &Connection, boot: &NewBoot) -> Result<i64> {
    conn.execute(
        "INSERT INTO BOOT (boot_hash, file_path, is_patched, magisk_version, hardware, epoch) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            boot.boot_hash,
            boot.file_path,
            boot.is_patched,
            boot.magisk_version,
            boot.hardware,
            boot.epoch
        ],
    )
    .map_err(|err| match constraint(&err) {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => StoreError::AlreadyTracked {
            table: "BOOT",
            key: boot.boot_hash.clone(),
        }
        .into(),
        _ => anyhow::Error::new(err).context("failed to insert boot image"),
    })?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn boot_by_hash(conn: &Connection, boot_hash: &str) -> Result<Option<Boot>> {
    let boot = conn
        .query_row(
            "SELECT id, boot_hash, file_path, is_patched, magisk_version, hardware, epoch \
             FROM BOOT WHERE boot_hash = ?1",
            params![boot_hash],
            |row| boot_from_row(row, 0),
        )
        .optional()?;
    Ok(boot)
}

pub(super) fn ensure_boot(conn: &Connection, boot: &NewBoot) -> Result<Tracked> {
    match insert_boot(conn, boot) {
        Ok(id) => Ok(Tracked { id, inserted: true }),
        Err(err) if is_already_tracked(&err) => {
            let existing = boot_by_hash(conn, &boot.boot_hash)?
                .with_context(|| format!("boot {} vanished", boot.boot_hash))?;
            Ok(Tracked {
                id: existing.id,
                inserted: false,
            })
        }
        Err(err) => Err(err),
    }
}

pub(super) fn link(conn: &Connection, package_id: i64, boot_id: i64, epoch: i64) -> Result<bool> {
    let changed = conn
        .execute(
            "INSERT INTO PACKAGE_BOOT (package_id, boot_id, epoch) VALUES (?1, ?2, ?3) \
             ON CONFLICT (package_id, boot_id) DO NOTHING",
            params![package_id, boot_id, epoch],
        )
        .map_err(|err| match constraint(&err) {
            Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::InvalidReference {
                package_id,
                boot_id,
            }
            .into(),
            _ => anyhow::Error::new(err).context("failed to link package and boot"),
        })?;
    Ok(changed > 0)
}

pub(super) fn package_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Package> {
    let kind: String = row.get(offset + 2)?;
    let package_type = PackageType::try_from(kind.as_str()).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(offset + 2, Type::Text, Box::new(err))
    })?;
    Ok(Package {
        id: row.get(offset)?,
        boot_hash: row.get(offset + 1)?,
        package_type,
        package_sig: row.get(offset + 3)?,
        file_path: row.get(offset + 4)?,
        epoch: row.get(offset + 5)?,
    })
}

pub(super) fn boot_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Boot> {
    Ok(Boot {
        id: row.get(offset)?,
        boot_hash: row.get(offset + 1)?,
        file_path: row.get(offset + 2)?,
        is_patched: row.get::<_, Option<bool>>(offset + 3)?.unwrap_or(false),
        magisk_version: row.get(offset + 4)?,
        hardware: row.get(offset + 5)?,
        epoch: row.get(offset + 6)?,
    })
}

fn constraint(err: &rusqlite::Error) -> Option<c_int> {
    match err {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == ErrorCode::ConstraintViolation =>
        {
            Some(inner.extended_code)
        }
        _ => None,
    }
}
