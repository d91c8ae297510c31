//! Archive membership lookup for firmware and ROM packages.
//!
//! Packages arrive as zip files or (optionally gzip-compressed) tarballs, and
//! vendors routinely wrap the image zip inside another zip or tar. The lookup
//! answers one question: where, if anywhere, does a member with a given
//! basename live, including inside nested archives.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

mod reader;

/// Nested archives deeper than this are not opened.
pub const MAX_NESTING_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Zip,
    Tar,
}

impl ContainerKind {
    /// Container kind implied by a file extension; `None` for unsupported files.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(Self::Zip),
            "tgz" | "gz" | "tar" => Some(Self::Tar),
            _ => None,
        }
    }

    /// Kind of a member of this container that is worth descending into.
    fn nested_kind(self, name: &str) -> Option<Self> {
        match self {
            Self::Zip if name.ends_with(".zip") => Some(Self::Zip),
            Self::Tar if name.ends_with(".tar") => Some(Self::Tar),
            Self::Tar if name.ends_with(".zip") => Some(Self::Zip),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LocateOptions {
    pub nested: bool,
    pub max_depth: usize,
    /// Where zip members of tarballs are spilled for random access.
    pub spill_dir: Option<PathBuf>,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            nested: false,
            max_depth: MAX_NESTING_DEPTH,
            spill_dir: None,
        }
    }
}

impl LocateOptions {
    #[must_use]
    pub fn nested() -> Self {
        Self {
            nested: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }
}

/// `true` when `name` is `target` itself or ends in `/target`.
#[must_use]
pub fn member_matches(name: &str, target: &str) -> bool {
    name == target
        || name
            .strip_suffix(target)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// Finds `target` inside the archive at `archive`, returning the in-archive
/// path of the first match in archive order.
///
/// Unsupported extensions and archives without a match yield `Ok(None)`.
///
/// # Errors
/// Returns an error when the archive (or a nested archive) cannot be read.
pub fn locate_member(
    archive: &Path,
    target: &str,
    options: &LocateOptions,
) -> Result<Option<String>> {
    debug!(
        archive = %archive.display(),
        target,
        nested = options.nested,
        "looking for archive member"
    );
    let Some(kind) = ContainerKind::from_path(archive) else {
        debug!(archive = %archive.display(), "unsupported archive format");
        return Ok(None);
    };
    let mut container = reader::open(archive, kind)?;
    let found = reader::search(container.as_mut(), target, options, 0)?;
    match &found {
        Some(path) => debug!(path = %path, "found archive member"),
        None => debug!(target, "archive member was not found"),
    }
    Ok(found)
}
