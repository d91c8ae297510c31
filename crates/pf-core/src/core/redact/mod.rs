//! Redaction of personal data from exported diagnostics.
//!
//! Support bundles carry logs, the settings file and a copy of the provenance
//! store. Before they leave the machine, home-directory user names and device
//! serials are replaced with a fixed placeholder. Redaction is textual and
//! irreversible; it never touches the live files, only exported copies.

use std::{fs, path::Path, sync::OnceLock};

use anyhow::Result;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::store::ProvenanceStore;
use crate::core::tooling::latin1;

pub const PLACEHOLDER: &str = "REDACTED";

const WINDOWS_HOME: &str = r"(?i)(\\Users\\+)(?:.*?)(\\+)";
const UNIX_HOME: &str = r"(?i)(/Users/+)(?:.*?)(/+)";

/// Applied in order; each keeps the literal context around the captured value.
const RULES: &[(&str, &str)] = &[
    (WINDOWS_HOME, "${1}REDACTED${2}"),
    (UNIX_HOME, "${1}REDACTED${2}"),
    (r#"(?i)("device":\s+)("\w+?")"#, "${1}REDACTED"),
    (r"(?i)(device\sid:\s+)(\w+)", "${1}REDACTED"),
    (r"(?i)(device:\s+)(\w+)", "${1}REDACTED"),
    (r"(?i)(Rebooting device\s+)(\w+)", "${1}REDACTED"),
    (r"(?i)(Flashing device\s+)(\w+)", "${1}REDACTED"),
    (r"(?i)(waiting for\s+)(\w+)", "${1}REDACTED"),
    (r"(?i)(Serial\sNumber\.+:\s+)(\w+)", "${1}REDACTED"),
    (r#"(?i)(fastboot(.exe)?"? -s\s+)(\w+)"#, "${1}REDACTED"),
    (r#"(?i)(adb(.exe)?"? -s\s+)(\w+)"#, "${1}REDACTED"),
    (
        r"(?i)(\S  \((?:adb|f\.b|rec|sid)\)   )(.+?)(\s+.*)",
        "${1}REDACTED${3}",
    ),
];

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rules() -> &'static [Rule] {
    static RULES_CELL: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES_CELL.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
                Ok(pattern) => Some(Rule {
                    pattern,
                    replacement,
                }),
                Err(err) => {
                    warn!(%pattern, error = %err, "skipping invalid redaction rule");
                    None
                }
            })
            .collect()
    })
}

fn home_rule() -> Option<&'static Regex> {
    static HOME: OnceLock<Option<Regex>> = OnceLock::new();
    HOME.get_or_init(|| {
        let pattern = if cfg!(windows) { WINDOWS_HOME } else { UNIX_HOME };
        Regex::new(pattern).ok()
    })
    .as_ref()
}

/// Outcome of a best-effort redaction; `applied` is `false` when the input was
/// left untouched because of an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SanitizeOutcome {
    pub applied: bool,
}

/// Runs every redaction rule over `content`.
#[must_use]
pub fn sanitize_text(content: &str) -> String {
    rules().iter().fold(content.to_string(), |text, rule| {
        rule.pattern
            .replace_all(&text, rule.replacement)
            .into_owned()
    })
}

/// Redacts the user segment of a home-directory path using this platform's
/// separator.
#[must_use]
pub fn sanitize_path(path: &str) -> String {
    match home_rule() {
        Some(rule) => rule.replace_all(path, "${1}REDACTED${2}").into_owned(),
        None => path.to_string(),
    }
}

/// Rewrites `path` in place with [`sanitize_text`].
///
/// The file is read and written as ISO-8859-1. Any failure leaves the file as it
/// was and is reported through the outcome, never as an error.
pub fn sanitize_file(path: &Path) -> SanitizeOutcome {
    debug!(path = %path.display(), "sanitizing file");
    let result = fs::read(path).and_then(|bytes| {
        let sanitized = sanitize_text(&latin1::decode(&bytes));
        fs::write(path, latin1::encode(&sanitized))
    });
    match result {
        Ok(()) => SanitizeOutcome { applied: true },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to sanitize file");
            SanitizeOutcome { applied: false }
        }
    }
}

/// Redacts `file_path` in every `BOOT` and `PACKAGE` row of the store at
/// `path`. Meant for the exported copy only.
///
/// # Errors
/// Returns an error when the store cannot be opened or updated.
pub fn sanitize_store(path: &Path) -> Result<usize> {
    debug!(path = %path.display(), "sanitizing provenance store");
    let mut store = ProvenanceStore::open(path)?;
    store.rewrite_file_paths(sanitize_path)
}
