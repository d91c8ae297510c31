//! Support bundle export.
//!
//! Copies configuration, the provenance store, labels, logs and diagram logs
//! into `<home>/support/`, adds a listing of the working root, redacts every
//! copied text artifact and the copied store, then zips the directory into
//! `<home>/support.zip`.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::core::config::{
    Layout, CONFIG_FILE_NAME, DIAGRAMS_DIR, FILE_LISTING, LABELS_FILE_NAME, LOGS_DIR,
};
use crate::core::fs::{copy_tree, delete_all};
use crate::core::redact::{sanitize_file, sanitize_store};

#[derive(Debug, Clone, Default)]
pub struct BundleReport {
    pub archive: PathBuf,
    /// Top-level artifacts copied into the bundle, by name.
    pub included: Vec<String>,
    /// Optional artifacts that were absent or failed to copy.
    pub skipped: Vec<String>,
    pub sanitized: usize,
    /// Copied files that could not be redacted.
    pub unsanitized: Vec<PathBuf>,
    /// Rows rewritten in the copied store.
    pub store_rows: Option<usize>,
}

/// Builds the support bundle for `layout`.
///
/// # Errors
/// Returns an error when the export directory cannot be prepared (including
/// stale entries from a previous export that cannot be deleted), the listing
/// cannot be written, or the archive cannot be created. Missing optional
/// artifacts are skipped.
pub fn export_support_bundle(layout: &Layout) -> Result<BundleReport> {
    let support_dir = layout.support_dir();
    let archive = layout.support_archive();
    if support_dir.exists() {
        debug!(dir = %support_dir.display(), "deleting previous support files");
        let failed = delete_all(&support_dir)?;
        if failed > 0 {
            bail!(
                "{failed} stale entries in {} could not be removed",
                support_dir.display()
            );
        }
    }
    if archive.exists() {
        debug!(path = %archive.display(), "deleting previous support archive");
        fs::remove_file(&archive)
            .with_context(|| format!("failed to remove {}", archive.display()))?;
    }
    fs::create_dir_all(&support_dir)
        .with_context(|| format!("failed to create {}", support_dir.display()))?;

    let mut report = BundleReport {
        archive: archive.clone(),
        ..BundleReport::default()
    };
    let db_path = layout.db_path();
    for source in [layout.config_file(), db_path.clone(), layout.labels_file()] {
        copy_artifact(&source, &support_dir, &mut report, |src, dest| {
            fs::copy(src, dest)?;
            Ok(())
        });
    }
    for source in [layout.logs_dir(), layout.diagrams_dir()] {
        copy_artifact(&source, &support_dir, &mut report, |src, dest| {
            copy_tree(src, dest).map(|_| ())
        });
    }

    let listing = support_dir.join(FILE_LISTING);
    write_listing(layout.home(), &support_dir, &listing)?;

    let mut text_files = vec![
        support_dir.join(CONFIG_FILE_NAME),
        support_dir.join(LABELS_FILE_NAME),
        listing,
    ];
    for dir in [LOGS_DIR, DIAGRAMS_DIR] {
        let copied = support_dir.join(dir);
        if copied.is_dir() {
            text_files.extend(
                WalkDir::new(&copied)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(walkdir::DirEntry::into_path),
            );
        }
    }
    for path in text_files.into_iter().filter(|path| path.exists()) {
        if sanitize_file(&path).applied {
            report.sanitized += 1;
        } else {
            report.unsanitized.push(path);
        }
    }

    if let Some(name) = db_path.file_name() {
        let copied = support_dir.join(name);
        if copied.exists() {
            match sanitize_store(&copied) {
                Ok(rows) => report.store_rows = Some(rows),
                Err(err) => {
                    warn!(path = %copied.display(), error = %err, "failed to sanitize store copy, leaving it out");
                    fs::remove_file(&copied).with_context(|| {
                        format!("failed to remove unsanitized {}", copied.display())
                    })?;
                    report.unsanitized.push(copied);
                }
            }
        }
    }

    zip_dir(&support_dir, &archive)?;
    debug!(archive = %archive.display(), "support bundle written");
    Ok(report)
}

fn copy_artifact(
    source: &Path,
    support_dir: &Path,
    report: &mut BundleReport,
    copy: impl FnOnce(&Path, &Path) -> Result<()>,
) {
    let Some(name) = source.file_name() else {
        return;
    };
    let label = name.to_string_lossy().into_owned();
    if !source.exists() {
        debug!(path = %source.display(), "not present, skipping");
        report.skipped.push(label);
        return;
    }
    debug!(path = %source.display(), dest = %support_dir.display(), "copying");
    match copy(source, &support_dir.join(name)) {
        Ok(()) => report.included.push(label),
        Err(err) => {
            warn!(path = %source.display(), error = %err, "failed to copy into support bundle");
            report.skipped.push(label);
        }
    }
}

/// Writes one `size path` line per entry under `root`, skipping the export
/// directory itself.
fn write_listing(root: &Path, support_dir: &Path, listing: &Path) -> Result<()> {
    let mut out = io::BufWriter::new(
        File::create(listing).with_context(|| format!("failed to create {}", listing.display()))?,
    );
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.path() != support_dir);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry in listing");
                continue;
            }
        };
        let size = entry.metadata().map(|meta| meta.len()).unwrap_or_default();
        writeln!(out, "{size:>12} {}", entry.path().display())?;
    }
    out.flush()?;
    Ok(())
}

/// Zips the contents of `src` (paths relative to `src`) into `dest`.
fn zip_dir(src: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for entry in WalkDir::new(src).sort_by_file_name().min_depth(1) {
        let entry = entry?;
        let name = entry
            .path()
            .strip_prefix(src)?
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else {
            zip.start_file(name, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut zip)?;
        }
    }
    zip.finish()?;
    Ok(())
}
