use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Deletes the files directly under `dir` whose names match `pattern`.
/// Returns how many were removed.
///
/// # Errors
/// Returns an error when `dir` cannot be listed or a matching file cannot be
/// removed.
pub fn purge(dir: &Path, pattern: &Regex) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if !pattern.is_match(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
        debug!(path = %path.display(), "purged");
        removed += 1;
    }
    Ok(removed)
}

/// Empties `dir`, keeping the directory itself. Entries that cannot be removed
/// are logged and skipped; their count is returned.
///
/// # Errors
/// Returns an error only when `dir` cannot be listed.
pub fn delete_all(dir: &Path) -> Result<usize> {
    let mut failed = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "failed to read directory entry");
                failed += 1;
                continue;
            }
        };
        let is_dir = fs::symlink_metadata(&path).is_ok_and(|meta| meta.is_dir());
        let result = if is_dir {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to delete");
            failed += 1;
        }
    }
    Ok(failed)
}

/// Recursively copies `src` into `dest`, creating `dest`.
///
/// # Errors
/// Returns an error when any directory or file cannot be copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<u64> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", src.display()))?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}
