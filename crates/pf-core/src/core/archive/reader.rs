//! Container readers and the nested-search recursion they share.

use std::{
    fs::File,
    io::{BufRead, BufReader, Cursor, Read, Seek, Write},
    path::Path,
};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use tempfile::NamedTempFile;
use zip::ZipArchive;

use super::{member_matches, ContainerKind, LocateOptions};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Ordered member enumeration over one container.
pub(super) trait ArchiveReader {
    fn kind(&self) -> ContainerKind;

    /// Feeds each member name and body to `visit` in archive order; a `Some`
    /// from `visit` stops the scan.
    fn scan(
        &mut self,
        visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<Option<String>>,
    ) -> Result<Option<String>>;
}

pub(super) struct ZipReader<R> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ZipReader<R> {
    pub(super) fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).context("failed to read zip archive")?;
        Ok(Self { archive })
    }
}

impl<R: Read + Seek> ArchiveReader for ZipReader<R> {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Zip
    }

    fn scan(
        &mut self,
        visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<Option<String>>,
    ) -> Result<Option<String>> {
        for index in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(index)
                .with_context(|| format!("failed to read zip entry #{index}"))?;
            let name = entry.name().to_string();
            if let Some(hit) = visit(&name, &mut entry)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

pub(super) struct TarReader<'a> {
    archive: tar::Archive<Box<dyn Read + 'a>>,
}

impl<'a> TarReader<'a> {
    /// Wraps a tar stream, transparently inflating gzip-compressed input.
    pub(super) fn new(reader: impl Read + 'a) -> Result<Self> {
        let mut buffered = BufReader::new(reader);
        let compressed = buffered
            .fill_buf()
            .context("failed to read tar header")?
            .starts_with(&GZIP_MAGIC);
        let stream: Box<dyn Read + 'a> = if compressed {
            Box::new(GzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };
        Ok(Self {
            archive: tar::Archive::new(stream),
        })
    }
}

impl ArchiveReader for TarReader<'_> {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Tar
    }

    fn scan(
        &mut self,
        visit: &mut dyn FnMut(&str, &mut dyn Read) -> Result<Option<String>>,
    ) -> Result<Option<String>> {
        let entries = self
            .archive
            .entries()
            .context("failed to read tar archive")?;
        for entry in entries {
            let mut entry = entry.context("failed to read tar entry")?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            if let Some(hit) = visit(&name, &mut entry)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }
}

/// Searches one container, descending into nested archives when allowed.
///
/// Hits inside a nested archive are reported as `<outer entry>/<inner path>`.
pub(super) fn search<A: ArchiveReader + ?Sized>(
    reader: &mut A,
    target: &str,
    options: &LocateOptions,
    depth: usize,
) -> Result<Option<String>> {
    let container = reader.kind();
    reader.scan(&mut |name, body| {
        if member_matches(name, target) {
            return Ok(Some(name.to_string()));
        }
        if !options.nested || depth >= options.max_depth {
            return Ok(None);
        }
        let Some(inner) = container.nested_kind(name) else {
            return Ok(None);
        };
        let found = descend(container, inner, name, body, target, options, depth + 1)
            .with_context(|| format!("failed to search nested archive {name}"))?;
        Ok(found.map(|path| format!("{name}/{path}")))
    })
}

fn descend(
    container: ContainerKind,
    inner: ContainerKind,
    name: &str,
    body: &mut dyn Read,
    target: &str,
    options: &LocateOptions,
    depth: usize,
) -> Result<Option<String>> {
    let mut bytes = Vec::new();
    body.read_to_end(&mut bytes)
        .with_context(|| format!("failed to read {name}"))?;
    match (container, inner) {
        (_, ContainerKind::Tar) => {
            let mut reader = TarReader::new(Cursor::new(bytes))?;
            search(&mut reader, target, options, depth)
        }
        (ContainerKind::Zip, ContainerKind::Zip) => {
            let mut reader = ZipReader::new(Cursor::new(bytes))?;
            search(&mut reader, target, options, depth)
        }
        (ContainerKind::Tar, ContainerKind::Zip) => {
            // The spill file is removed when it goes out of scope, hit or error.
            let spill = spill_to_disk(&bytes, options)?;
            let file = spill
                .reopen()
                .with_context(|| format!("failed to reopen {}", spill.path().display()))?;
            let mut reader = ZipReader::new(file)?;
            search(&mut reader, target, options, depth)
        }
    }
}

fn spill_to_disk(bytes: &[u8], options: &LocateOptions) -> Result<NamedTempFile> {
    let mut spill = match &options.spill_dir {
        Some(dir) => NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?,
        None => NamedTempFile::new().context("failed to create temporary file")?,
    };
    spill
        .write_all(bytes)
        .context("failed to write nested zip to temporary file")?;
    spill.flush()?;
    Ok(spill)
}

/// Opens the top-level archive at `path` as the reader for `kind`.
pub(super) fn open(path: &Path, kind: ContainerKind) -> Result<Box<dyn ArchiveReader>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader: Box<dyn ArchiveReader> = match kind {
        ContainerKind::Zip => Box::new(
            ZipReader::new(file)
                .with_context(|| format!("failed to read zip archive {}", path.display()))?,
        ),
        ContainerKind::Tar => Box::new(
            TarReader::new(file)
                .with_context(|| format!("failed to read tar archive {}", path.display()))?,
        ),
    };
    Ok(reader)
}
