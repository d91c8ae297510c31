use std::{
    collections::{BTreeMap, HashMap},
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::layout::CONFIG_FILE_NAME;
use crate::core::store::BootRecord;
use crate::core::tooling::latin1;

pub const CONFIG_ROOT_ENV: &str = "PF_CONFIG_ROOT";
pub const DEFAULT_FONT_SIZE: u32 = 12;

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// The part of `pf.json` read at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub pf_home: Option<String>,
}

impl ConfigFile {
    /// Reads `pf.json` from `config_dir`. A missing or malformed file yields the
    /// default.
    #[must_use]
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let Ok(bytes) = fs::read(&path) else {
            debug!(path = %path.display(), "no config file");
            return Self::default();
        };
        match serde_json::from_str(&latin1::decode(&bytes)) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring malformed config file");
                Self::default()
            }
        }
    }
}

/// Per-user config directory: `PF_CONFIG_ROOT`, else `<data dir>/pf`.
///
/// # Errors
/// Returns an error when no override is set and the platform has no data
/// directory.
pub fn config_dir(env: &EnvSnapshot) -> Result<PathBuf> {
    if let Some(root) = env.var(CONFIG_ROOT_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    dirs_next::data_dir()
        .map(|dir| dir.join("pf"))
        .ok_or_else(|| anyhow!("unable to determine the per-user data directory"))
}

/// Working root: `pf_home` when it names an existing directory, else
/// `config_dir`.
#[must_use]
pub fn resolve_home(config_dir: &Path, config: &ConfigFile) -> PathBuf {
    match config.pf_home.as_deref().map(str::trim) {
        Some(home) if !home.is_empty() && Path::new(home).is_dir() => PathBuf::from(home),
        Some(home) if !home.is_empty() => {
            warn!(pf_home = home, "pf_home does not exist, using default root");
            config_dir.to_path_buf()
        }
        _ => config_dir.to_path_buf(),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    #[default]
    Boot,
    InitBoot,
    Recovery,
    VendorBoot,
}

/// Session state shared by every collaborator through [`crate::Runtime`].
#[derive(Clone, Debug, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Settings {
    pub adb: Option<PathBuf>,
    pub fastboot: Option<PathBuf>,
    pub adb_sha256: Option<String>,
    pub fastboot_sha256: Option<String>,
    pub phones: Vec<String>,
    pub phone: Option<String>,
    pub verbose: bool,
    pub advanced_options: bool,
    pub update_check: bool,
    pub firmware_model: Option<String>,
    pub firmware_id: Option<String>,
    pub custom_rom_id: Option<String>,
    pub custom_rom_file: Option<PathBuf>,
    pub logfile: Option<PathBuf>,
    pub sdk_version: Option<u32>,
    pub image_mode: ImageMode,
    pub image_path: Option<PathBuf>,
    pub message_box_title: Option<String>,
    pub message_box_message: Option<String>,
    pub boot: Option<BootRecord>,
    pub system_code_page: Option<u32>,
    pub codepage_setting: bool,
    pub codepage_value: Option<u32>,
    pub magisk_package: Option<String>,
    pub file_explorer: Option<String>,
    pub linux_shell: Option<String>,
    pub patched_with: Option<String>,
    pub customize_font: bool,
    pub font_face: Option<String>,
    pub font_size: u32,
    pub labels: BTreeMap<String, String>,
    pub a_only: bool,
    pub offer_patch_methods: bool,
    pub use_busybox_shell: bool,
    pub firmware_hash_valid: bool,
    pub firmware_has_init_boot: bool,
    pub rom_has_init_boot: bool,
    pub recovery_patch: bool,
    pub dlg_checkbox_values: BTreeMap<String, bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adb: None,
            fastboot: None,
            adb_sha256: None,
            fastboot_sha256: None,
            phones: Vec::new(),
            phone: None,
            verbose: false,
            advanced_options: false,
            update_check: true,
            firmware_model: None,
            firmware_id: None,
            custom_rom_id: None,
            custom_rom_file: None,
            logfile: None,
            sdk_version: None,
            image_mode: ImageMode::default(),
            image_path: None,
            message_box_title: None,
            message_box_message: None,
            boot: None,
            system_code_page: None,
            codepage_setting: false,
            codepage_value: None,
            magisk_package: None,
            file_explorer: None,
            linux_shell: None,
            patched_with: None,
            customize_font: false,
            font_face: None,
            font_size: DEFAULT_FONT_SIZE,
            labels: BTreeMap::new(),
            a_only: false,
            offer_patch_methods: false,
            use_busybox_shell: false,
            firmware_hash_valid: false,
            firmware_has_init_boot: false,
            rom_has_init_boot: false,
            recovery_patch: false,
            dlg_checkbox_values: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Code page to use for console output: the explicit setting when enabled,
    /// otherwise the detected system code page.
    #[must_use]
    pub fn effective_code_page(&self) -> Option<u32> {
        if self.codepage_setting {
            self.codepage_value.or(self.system_code_page)
        } else {
            self.system_code_page
        }
    }

    /// Loads `labels.json` into [`Settings::labels`]; unreadable files leave the
    /// map empty.
    pub fn load_labels(&mut self, path: &Path) {
        self.labels = match fs::read(path) {
            Ok(bytes) => serde_json::from_str(&latin1::decode(&bytes)).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "ignoring malformed labels file");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
    }

    /// Display label for a device serial, if one was assigned.
    #[must_use]
    pub fn label_for(&self, serial: &str) -> Option<&str> {
        self.labels.get(serial).map(String::as_str)
    }
}
