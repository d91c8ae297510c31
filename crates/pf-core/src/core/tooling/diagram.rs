//! Execution-diagram log.
//!
//! Failures along the flashing workflow are appended as activity-diagram
//! fragments so a support bundle shows where a session went wrong. Writes are
//! best effort: a diagram that cannot be written is logged and skipped.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use time::{macros::format_description, OffsetDateTime};
use tracing::warn;

use super::latin1;

#[derive(Clone, Debug, Default)]
pub struct DiagramLog {
    path: Option<PathBuf>,
}

impl DiagramLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A log that drops every entry.
    #[must_use]
    pub fn disabled() -> Self {
        Self { path: None }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends `message`, followed by a `note left` timestamp when asked.
    pub fn append(&self, message: &str, timestamp: bool) {
        let Some(path) = &self.path else {
            return;
        };
        let mut text = message.to_string();
        if timestamp {
            text.push_str(&format!("note left:{}\n", now_stamp()));
        }
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(&latin1::encode(&text)));
        if let Err(err) = written {
            warn!(path = %path.display(), error = %err, "failed to write diagram log");
        }
    }

    /// Records a failed step with the error text attached as a note.
    pub fn failure(&self, step: &str, detail: &str) {
        self.append(&format!("#red:{step};\n"), true);
        self.append(&format!("note right\n{detail}\nend note\n"), false);
    }
}

/// UTC wall-clock stamp in `YYYY-MM-DD HH:MM:SS`.
#[must_use]
pub fn now_stamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}

/// File name for a new session's diagram, e.g. `session_2024-03-05_14-02-11.puml`.
#[must_use]
pub fn session_file_name() -> String {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))
        .unwrap_or_default();
    format!("session_{stamp}.puml")
}
