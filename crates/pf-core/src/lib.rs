#![deny(clippy::all)]

mod core;

pub mod archive {
    pub use crate::core::archive::*;
}

pub mod config {
    pub use crate::core::config::*;
}

pub mod device {
    pub use crate::core::device::*;
}

pub mod fs {
    pub use crate::core::fs::*;
}

pub mod redact {
    pub use crate::core::redact::*;
}

pub mod runtime {
    pub use crate::core::runtime::*;
}

pub mod scan {
    pub use crate::core::scan::*;
}

pub mod store {
    pub use crate::core::store::*;
}

pub mod support {
    pub use crate::core::support::*;
}

pub mod tooling {
    pub use crate::core::tooling::*;
}

pub use crate::core::archive::{locate_member, LocateOptions};
pub use crate::core::config::{EnvSnapshot, Layout, Settings};
pub use crate::core::redact::{sanitize_file, sanitize_store, sanitize_text, SanitizeOutcome};
pub use crate::core::runtime::{Runtime, ShellError, ShellOutput};
pub use crate::core::scan::{compare_confidence, extract_fingerprint, extract_sha1};
pub use crate::core::store::{ProvenanceStore, StoreError};
pub use crate::core::support::{export_support_bundle, BundleReport};
