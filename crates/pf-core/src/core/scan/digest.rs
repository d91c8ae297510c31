use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Hex MD5 of a file, as published next to some vendor downloads.
///
/// # Errors
/// Returns an error when the file cannot be read.
pub fn md5_file(path: &Path) -> Result<String> {
    digest_file::<Md5>(path)
}

/// Hex SHA-1 of a file, streamed in fixed-size chunks.
///
/// # Errors
/// Returns an error when the file cannot be read.
pub fn sha1_file(path: &Path) -> Result<String> {
    digest_file::<Sha1>(path)
}

/// Hex SHA-256 of a file, streamed in fixed-size chunks.
///
/// # Errors
/// Returns an error when the file cannot be read.
pub fn sha256_file(path: &Path) -> Result<String> {
    digest_file::<Sha256>(path)
}

fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = vec![0_u8; 32 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
