use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, Context, Result};
use pep440_rs::Version;
use tracing::debug;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CONFIG_FILE_NAME: &str = "pf.json";
pub const LABELS_FILE_NAME: &str = "labels.json";
pub const LOGS_DIR: &str = "logs";
pub const TMP_DIR: &str = "tmp";
pub const DIAGRAMS_DIR: &str = "diagrams";
pub const SUPPORT_DIR: &str = "support";
pub const SUPPORT_ARCHIVE: &str = "support.zip";
pub const FILE_LISTING: &str = "files.txt";

/// On-disk generation selected by the application version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaGeneration {
    /// Before 4.0.0.
    Legacy,
    /// 4.0.0 up to 6.0.0.
    Shared,
    /// 6.0.0 onwards.
    Current,
}

impl SchemaGeneration {
    #[must_use]
    pub fn for_version(version: &Version) -> Self {
        if *version < Version::new([4, 0, 0]) {
            Self::Legacy
        } else if *version < Version::new([6, 0, 0]) {
            Self::Shared
        } else {
            Self::Current
        }
    }

    #[must_use]
    pub fn db_file_name(self) -> &'static str {
        match self {
            Self::Legacy => "pf.db",
            Self::Shared => "pf4.db",
            Self::Current => "pf6.db",
        }
    }

    #[must_use]
    pub fn boot_images_dir(self) -> &'static str {
        match self {
            Self::Legacy => "boot_images",
            Self::Shared | Self::Current => "boot_images4",
        }
    }

    #[must_use]
    pub fn factory_images_dir(self) -> &'static str {
        match self {
            Self::Legacy | Self::Shared => "factory_images",
            Self::Current => "factory_images6",
        }
    }
}

/// Where everything lives on disk.
///
/// `config_dir` is the per-user directory holding `pf.json` and the store;
/// `home` is the working root, which `pf_home` may relocate.
#[derive(Clone, Debug)]
pub struct Layout {
    config_dir: PathBuf,
    home: PathBuf,
    version: Version,
}

impl Layout {
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>, home: impl Into<PathBuf>, version: Version) -> Self {
        Self {
            config_dir: config_dir.into(),
            home: home.into(),
            version,
        }
    }

    /// Layout for the running build's version.
    ///
    /// # Errors
    /// Returns an error if the crate version is not a valid version string.
    pub fn current(config_dir: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Result<Self> {
        let version = parse_version(APP_VERSION)?;
        Ok(Self::new(config_dir, home, version))
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn generation(&self) -> SchemaGeneration {
        SchemaGeneration::for_version(&self.version)
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.config_dir.join(self.generation().db_file_name())
    }

    #[must_use]
    pub fn labels_file(&self) -> PathBuf {
        self.home.join(LABELS_FILE_NAME)
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.home.join(LOGS_DIR)
    }

    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.home.join(TMP_DIR)
    }

    #[must_use]
    pub fn diagrams_dir(&self) -> PathBuf {
        self.home.join(DIAGRAMS_DIR)
    }

    #[must_use]
    pub fn boot_images_dir(&self) -> PathBuf {
        self.home.join(self.generation().boot_images_dir())
    }

    #[must_use]
    pub fn factory_images_dir(&self) -> PathBuf {
        self.home.join(self.generation().factory_images_dir())
    }

    #[must_use]
    pub fn support_dir(&self) -> PathBuf {
        self.home.join(SUPPORT_DIR)
    }

    #[must_use]
    pub fn support_archive(&self) -> PathBuf {
        self.home.join(SUPPORT_ARCHIVE)
    }

    /// Creates the working directories under `home` (and `config_dir` itself).
    ///
    /// # Errors
    /// Returns an error when a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [
            self.config_dir.clone(),
            self.logs_dir(),
            self.factory_images_dir(),
            self.boot_images_dir(),
            self.tmp_dir(),
            self.diagrams_dir(),
        ];
        for dir in dirs {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        debug!(home = %self.home.display(), "working directories ready");
        Ok(())
    }
}

/// Parses an application version such as `6.1.0`.
///
/// # Errors
/// Returns an error for strings that are not valid versions.
pub fn parse_version(raw: &str) -> Result<Version> {
    Version::from_str(raw.trim()).map_err(|err| anyhow!("invalid application version {raw}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(version: &str) -> Result<Layout> {
        Ok(Layout::new("/cfg", "/home", parse_version(version)?))
    }

    #[test]
    fn selects_generation_by_version() -> Result<()> {
        let cases = [
            ("3.9.2", "pf.db", "boot_images", "factory_images"),
            ("4.0.0", "pf4.db", "boot_images4", "factory_images"),
            ("5.8.1", "pf4.db", "boot_images4", "factory_images"),
            ("6.0.0", "pf6.db", "boot_images4", "factory_images6"),
            ("7.2", "pf6.db", "boot_images4", "factory_images6"),
        ];
        for (version, db, boot, factory) in cases {
            let layout = layout(version)?;
            assert_eq!(layout.db_path(), Path::new("/cfg").join(db), "{version}");
            assert_eq!(layout.boot_images_dir(), Path::new("/home").join(boot), "{version}");
            assert_eq!(
                layout.factory_images_dir(),
                Path::new("/home").join(factory),
                "{version}"
            );
        }
        Ok(())
    }

    #[test]
    fn running_build_uses_current_generation() -> Result<()> {
        let layout = Layout::current("/cfg", "/home")?;
        assert_eq!(layout.generation(), SchemaGeneration::Current);
        Ok(())
    }

    #[test]
    fn rejects_garbage_version() {
        assert!(parse_version("not-a-version").is_err());
    }

    #[test]
    fn ensure_dirs_creates_working_tree() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let layout = Layout::new(
            temp.path().join("cfg"),
            temp.path().join("home"),
            parse_version("6.1.0")?,
        );
        layout.ensure_dirs()?;
        layout.ensure_dirs()?;
        for dir in [
            layout.config_dir().to_path_buf(),
            layout.logs_dir(),
            layout.tmp_dir(),
            layout.diagrams_dir(),
            layout.boot_images_dir(),
            layout.factory_images_dir(),
        ] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        Ok(())
    }
}
