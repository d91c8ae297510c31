//! Marker scans over raw partition images.
//!
//! A marker scan looks for a literal byte sequence anywhere in a file and reads a
//! fixed-width field at a fixed offset from it. The field is rendered with a
//! lossy printable-ASCII policy so extractions from different images can be
//! compared character by character.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use anyhow::{Context, Result};
use bstr::ByteSlice;
use tracing::{debug, warn};

/// Substitute for bytes outside the ASCII range.
pub const UNDECODABLE: char = '~';
/// Substitute for ASCII control characters.
pub const NON_PRINTABLE: char = '!';

pub const SHA1_MARKER: &[u8] = b"SHA1=";
pub const SHA1_SKIP: u64 = 5;
pub const SHA1_DEFAULT_LENGTH: usize = 8;

pub const FINGERPRINT_MARKER: &[u8] = b"fingerprint=";
pub const FINGERPRINT_SKIP: u64 = 12;
pub const FINGERPRINT_LENGTH: usize = 65;

/// Scans `path` for the first occurrence of `marker` and decodes `length` bytes
/// starting `skip` bytes after it.
///
/// Returns `Ok(None)` when the marker does not occur. A field cut short by the
/// end of the file yields whatever bytes were available.
///
/// # Errors
/// Returns an error only when the file cannot be opened or read.
pub fn extract_marker_field(
    path: &Path,
    marker: &[u8],
    skip: u64,
    length: usize,
) -> Result<Option<String>> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let Some(position) = contents.find(marker) else {
        debug!(path = %path.display(), marker = %marker.as_bstr(), "marker not found");
        return Ok(None);
    };

    file.seek(SeekFrom::Start(position as u64 + skip))
        .with_context(|| format!("failed to seek in {}", path.display()))?;
    let mut field = Vec::with_capacity(length);
    file.take(length as u64)
        .read_to_end(&mut field)
        .with_context(|| format!("failed to read field from {}", path.display()))?;
    Ok(Some(printable_ascii(&field)))
}

/// Recovers the (usually truncated) build hash following `SHA1=`.
///
/// # Errors
/// Propagates I/O failures from [`extract_marker_field`].
pub fn extract_sha1(path: &Path, length: usize) -> Result<Option<String>> {
    extract_marker_field(path, SHA1_MARKER, SHA1_SKIP, length)
}

/// Recovers the build fingerprint following `fingerprint=`.
///
/// # Errors
/// Propagates I/O failures from [`extract_marker_field`].
pub fn extract_fingerprint(path: &Path) -> Result<Option<String>> {
    extract_marker_field(path, FINGERPRINT_MARKER, FINGERPRINT_SKIP, FINGERPRINT_LENGTH)
}

/// Renders raw bytes as printable ASCII.
///
/// Non-ASCII bytes become [`UNDECODABLE`]; control characters and DEL become
/// [`NON_PRINTABLE`].
#[must_use]
pub fn printable_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| match byte {
            0x80..=0xff => UNDECODABLE,
            0x20..=0x7e => char::from(byte),
            _ => NON_PRINTABLE,
        })
        .collect()
}

/// Fraction of positions at which `expected` and `extracted` agree.
///
/// Strings of different lengths score `0.0`; two empty strings score `1.0`.
#[must_use]
pub fn compare_confidence(expected: &str, extracted: &str) -> f64 {
    let expected: Vec<char> = expected.chars().collect();
    let extracted: Vec<char> = extracted.chars().collect();
    if expected.len() != extracted.len() {
        warn!(
            expected = expected.len(),
            extracted = extracted.len(),
            "SHA1 values have different lengths"
        );
        return 0.0;
    }
    if expected.is_empty() {
        return 1.0;
    }
    let matching = expected
        .iter()
        .zip(&extracted)
        .filter(|(left, right)| left == right)
        .count();
    matching as f64 / expected.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_blob(bytes: &[u8]) -> Result<(tempfile::TempDir, std::path::PathBuf)> {
        let temp = tempdir()?;
        let path = temp.path().join("boot.img");
        fs::write(&path, bytes)?;
        Ok((temp, path))
    }

    #[test]
    fn extracts_sha1_field_after_marker() -> Result<()> {
        let mut blob = vec![0_u8; 64];
        blob.extend_from_slice(b"SHA1=abcdef12");
        blob.extend_from_slice(&[0xff; 16]);
        let (_temp, path) = write_blob(&blob)?;

        assert_eq!(extract_sha1(&path, 8)?.as_deref(), Some("abcdef12"));
        Ok(())
    }

    #[test]
    fn missing_marker_yields_none() -> Result<()> {
        let (_temp, path) = write_blob(b"no build hash in here")?;
        assert_eq!(extract_sha1(&path, SHA1_DEFAULT_LENGTH)?, None);
        assert_eq!(extract_fingerprint(&path)?, None);
        Ok(())
    }

    #[test]
    fn short_field_reads_available_bytes() -> Result<()> {
        let (_temp, path) = write_blob(b"xxSHA1=ab1")?;
        assert_eq!(extract_sha1(&path, 8)?.as_deref(), Some("ab1"));

        let (_temp, path) = write_blob(b"SHA1=")?;
        assert_eq!(extract_sha1(&path, 8)?.as_deref(), Some(""));
        Ok(())
    }

    #[test]
    fn substitutes_undecodable_and_control_bytes() -> Result<()> {
        let (_temp, path) = write_blob(b"SHA1=ab\x00\x7f\xc3\xa9z\n")?;
        assert_eq!(extract_sha1(&path, 8)?.as_deref(), Some("ab!!~~z!"));
        Ok(())
    }

    #[test]
    fn extracts_fingerprint_with_fixed_width() -> Result<()> {
        let fingerprint = "google/oriole/oriole:14/AP1A.240305.019.A1/11445699:user/release-keys";
        let mut blob = b"\x00\x01ro.build.".to_vec();
        blob.extend_from_slice(b"fingerprint=");
        blob.extend_from_slice(fingerprint.as_bytes());
        let (_temp, path) = write_blob(&blob)?;

        let extracted = extract_fingerprint(&path)?.expect("fingerprint present");
        assert_eq!(extracted.len(), FINGERPRINT_LENGTH);
        assert_eq!(extracted, fingerprint[..FINGERPRINT_LENGTH]);
        Ok(())
    }

    #[test]
    fn first_marker_occurrence_wins() -> Result<()> {
        let (_temp, path) = write_blob(b"SHA1=11111111 SHA1=22222222")?;
        assert_eq!(extract_sha1(&path, 8)?.as_deref(), Some("11111111"));
        Ok(())
    }

    #[test]
    fn confidence_scores_positional_matches() {
        assert!((compare_confidence("abcdef12", "abcdef12") - 1.0).abs() < f64::EPSILON);
        assert!((compare_confidence("abcdef12", "abcdef1!") - 0.875).abs() < f64::EPSILON);
        assert!((compare_confidence("", "") - 1.0).abs() < f64::EPSILON);
        assert!(compare_confidence("abcdef12", "abcdef").abs() < f64::EPSILON);
    }
}
