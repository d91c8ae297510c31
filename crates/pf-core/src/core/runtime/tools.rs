use std::path::{Path, PathBuf};

use tracing::{debug, error};

/// Resolves `name` against `PATH` (or checks it directly when it contains a
/// separator). Never fails; unresolved names yield `None`.
#[must_use]
pub fn find_executable(name: &str) -> Option<PathBuf> {
    match which::which(name) {
        Ok(path) => {
            debug!(name, path = %path.display(), "resolved executable");
            Some(path)
        }
        Err(err) => {
            debug!(name, error = %err, "executable not found");
            None
        }
    }
}

/// Platform-specific name of the bundled 7-Zip binary.
#[must_use]
pub fn seven_zip_name() -> &'static str {
    if cfg!(windows) {
        "7z.exe"
    } else if cfg!(target_os = "macos") {
        "7zz"
    } else {
        "7zzs"
    }
}

/// Locates the bundled 7-Zip binary under `<bundle_dir>/bin`.
#[must_use]
pub fn bundled_7z(bundle_dir: &Path) -> Option<PathBuf> {
    let path = bundle_dir.join("bin").join(seven_zip_name());
    if path.is_file() {
        Some(path)
    } else {
        error!(path = %path.display(), "bundled 7-Zip is not found");
        None
    }
}

/// Extracts the number from `chcp` output such as `Active code page: 437.`.
#[must_use]
pub fn parse_code_page(output: &str) -> Option<u32> {
    let (_, value) = output.split_once(':')?;
    value.trim().replace('.', "").parse().ok()
}
