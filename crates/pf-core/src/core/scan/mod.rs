//! Boot-image identification: file digests and marker-field extraction.

mod digest;
mod signature;

pub use digest::{md5_file, sha1_file, sha256_file};
pub use signature::{
    compare_confidence, extract_fingerprint, extract_marker_field, extract_sha1, printable_ascii,
    FINGERPRINT_LENGTH, FINGERPRINT_MARKER, FINGERPRINT_SKIP, NON_PRINTABLE, SHA1_DEFAULT_LENGTH,
    SHA1_MARKER, SHA1_SKIP, UNDECODABLE,
};
