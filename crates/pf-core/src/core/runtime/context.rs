use std::{
    path::Path,
    time::{Duration, Instant},
};

use anyhow::Result;
use tracing::{debug, error};

use super::process::{self, is_timeout, EventPump, NoopPump, ShellOutput};
use super::tools::parse_code_page;
use crate::core::archive::{self, LocateOptions};
use crate::core::config::{self, ConfigFile, EnvSnapshot, Layout, Settings};
use crate::core::fs::delete_all;
use crate::core::store::ProvenanceStore;
use crate::core::support::{self, BundleReport};
use crate::core::tooling::diagram::{self, DiagramLog};

/// Session context: the settings, on-disk layout, diagram log and event pump
/// every collaborator works through.
pub struct Runtime {
    pub settings: Settings,
    layout: Layout,
    diagram: DiagramLog,
    pump: Box<dyn EventPump>,
}

impl Runtime {
    /// Resolves the config root from `env`, applies the `pf_home` override,
    /// creates the working directories, opens a fresh diagram log and (on
    /// Windows) records the console code page.
    ///
    /// # Errors
    /// Returns an error when the config root cannot be determined or the
    /// working directories cannot be created.
    pub fn bootstrap(env: &EnvSnapshot) -> Result<Self> {
        let config_dir = config::config_dir(env)?;
        let file = ConfigFile::load(&config_dir);
        let home = config::resolve_home(&config_dir, &file);
        let layout = Layout::current(config_dir, home)?;
        layout.ensure_dirs()?;
        debug!(
            config_dir = %layout.config_dir().display(),
            home = %layout.home().display(),
            "runtime bootstrapped"
        );

        let mut settings = Settings::default();
        settings.load_labels(&layout.labels_file());
        let diagram = DiagramLog::new(layout.diagrams_dir().join(diagram::session_file_name()));
        let mut runtime = Self::new(layout, settings, diagram);
        runtime.detect_code_page();
        Ok(runtime)
    }

    #[must_use]
    pub fn new(layout: Layout, settings: Settings, diagram: DiagramLog) -> Self {
        Self {
            settings,
            layout,
            diagram,
            pump: Box::new(NoopPump),
        }
    }

    #[must_use]
    pub fn with_pump(mut self, pump: Box<dyn EventPump>) -> Self {
        self.pump = pump;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[must_use]
    pub fn diagram(&self) -> &DiagramLog {
        &self.diagram
    }

    /// Logs a propagated failure and records it in the diagram log.
    pub fn report_failure(&self, step: &str, err: &anyhow::Error) {
        let detail = format!("{err:#}");
        error!(step, error = %detail, "operation failed");
        self.diagram.failure(step, &detail);
    }

    /// Passes `result` through, reporting an error under `step` first.
    ///
    /// # Errors
    /// Returns `result`'s error unchanged.
    pub fn reported<T>(&self, step: &str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.report_failure(step, err);
        }
        result
    }

    /// Opens (creating if needed) the provenance store for this layout.
    ///
    /// # Errors
    /// Returns an error when the store cannot be opened or initialized.
    pub fn open_store(&self) -> Result<ProvenanceStore> {
        self.reported(
            "Failed to open provenance store",
            ProvenanceStore::open(&self.layout.db_path()),
        )
    }

    /// [`process::run_shell`] with this runtime's event pump and failure
    /// reporting.
    ///
    /// # Errors
    /// Propagates spawn failures and timeouts.
    pub fn run_shell(&self, cmd: &str, timeout: Option<Duration>) -> Result<ShellOutput> {
        let result = process::run_shell(cmd, timeout, self.pump.as_ref());
        match &result {
            Ok(output) if self.settings.verbose => {
                debug!(cmd, code = output.code, stdout = %output.stdout, stderr = %output.stderr, "shell output");
            }
            Err(err) => self.report_failure(shell_step(err), err),
            Ok(_) => {}
        }
        result
    }

    /// [`process::run_shell_streaming`] with a deadline `timeout` from now.
    ///
    /// # Errors
    /// Propagates spawn failures and timeouts.
    pub fn run_shell_streaming(
        &self,
        cmd: &str,
        timeout: Option<Duration>,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let result = process::run_shell_streaming(cmd, deadline, self.pump.as_ref(), on_line);
        if let Err(err) = &result {
            self.report_failure(shell_step(err), err);
        }
        result
    }

    /// Looks for `target` inside the archive at `path`, spilling nested zips to the
    /// layout's `tmp/` directory.
    ///
    /// # Errors
    /// Propagates unreadable or corrupt archives.
    pub fn locate_member(&self, path: &Path, target: &str, nested: bool) -> Result<Option<String>> {
        let options = LocateOptions {
            nested,
            ..LocateOptions::default()
        }
        .with_spill_dir(self.layout.tmp_dir());
        self.reported(
            "Failed to inspect archive",
            archive::locate_member(path, target, &options),
        )
    }

    /// Detects the console code page with `chcp` (Windows only) and stores it
    /// in [`Settings::system_code_page`].
    pub fn detect_code_page(&mut self) -> Option<u32> {
        if !cfg!(windows) {
            return None;
        }
        if let Some(cp) = self.settings.system_code_page {
            return Some(cp);
        }
        let output = self.run_shell("chcp", Some(Duration::from_secs(10))).ok()?;
        if !output.success() {
            error!(stderr = %output.stderr, "unable to get active code page");
            return None;
        }
        let cp = parse_code_page(&output.stdout);
        match cp {
            Some(cp) => debug!(cp, "active code page"),
            None => error!(stdout = %output.stdout, "unable to parse active code page"),
        }
        self.settings.system_code_page = cp;
        cp
    }

    /// Builds `support.zip` from sanitized copies of this session's files.
    ///
    /// # Errors
    /// See [`support::export_support_bundle`].
    pub fn export_support_bundle(&self) -> Result<BundleReport> {
        self.reported(
            "Failed to create support bundle",
            support::export_support_bundle(&self.layout),
        )
    }

    /// Empties the layout's `tmp/` directory; returns how many entries could
    /// not be removed.
    ///
    /// # Errors
    /// Returns an error when `tmp/` cannot be listed.
    pub fn clear_tmp(&self) -> Result<usize> {
        delete_all(&self.layout.tmp_dir())
    }
}

fn shell_step(err: &anyhow::Error) -> &'static str {
    if is_timeout(err) {
        "Command timed out"
    } else {
        "Encountered an error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, fs, rc::Rc};

    use crate::core::config::{CONFIG_FILE_NAME, CONFIG_ROOT_ENV};

    fn runtime(root: &Path) -> Result<Runtime> {
        let root = root.display().to_string();
        let env = EnvSnapshot::testing(&[(CONFIG_ROOT_ENV, root.as_str())]);
        Runtime::bootstrap(&env)
    }

    #[test]
    fn bootstrap_creates_layout_under_config_root() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let rt = runtime(temp.path())?;
        assert_eq!(rt.layout().home(), temp.path());
        assert!(rt.layout().logs_dir().is_dir());
        assert!(rt.layout().diagrams_dir().is_dir());
        assert!(rt.layout().tmp_dir().is_dir());
        assert!(rt
            .diagram()
            .path()
            .is_some_and(|path| path.starts_with(rt.layout().diagrams_dir())));
        Ok(())
    }

    #[test]
    fn bootstrap_honours_pf_home() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let home = temp.path().join("relocated");
        fs::create_dir_all(&home)?;
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            serde_json::json!({ "pf_home": home }).to_string(),
        )?;

        let rt = runtime(temp.path())?;
        assert_eq!(rt.layout().home(), home);
        assert_eq!(rt.layout().config_dir(), temp.path());
        assert!(home.join("logs").is_dir());
        Ok(())
    }

    #[test]
    fn failures_reach_the_diagram_log() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let rt = runtime(temp.path())?;
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"not a zip")?;

        assert!(rt.locate_member(&archive, "boot.img", true).is_err());
        let path = rt.diagram().path().expect("diagram path");
        let text = fs::read_to_string(path)?;
        assert!(text.contains("#red:Failed to inspect archive;"), "{text}");
        assert!(text.contains("end note"), "{text}");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn shell_calls_yield_to_pump() -> Result<()> {
        struct SharedPump(Rc<Cell<usize>>);
        impl EventPump for SharedPump {
            fn yield_now(&self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let temp = tempfile::tempdir()?;
        let count = Rc::new(Cell::new(0));
        let rt = runtime(temp.path())?.with_pump(Box::new(SharedPump(Rc::clone(&count))));
        let output = rt.run_shell("echo hi", None)?;
        assert_eq!(output.stdout.trim(), "hi");
        assert_eq!(count.get(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn timeout_is_recorded_as_timed_out_step() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let rt = runtime(temp.path())?;
        let err = rt
            .run_shell("exec sleep 5", Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(is_timeout(&err));
        let text = fs::read_to_string(rt.diagram().path().expect("diagram path"))?;
        assert!(text.contains("#red:Command timed out;"), "{text}");
        Ok(())
    }

    #[cfg(not(windows))]
    #[test]
    fn bootstrap_skips_code_page_off_windows() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut rt = runtime(temp.path())?;
        assert_eq!(rt.settings.system_code_page, None);
        assert_eq!(rt.detect_code_page(), None);
        Ok(())
    }

    #[cfg(windows)]
    #[test]
    fn bootstrap_records_code_page_on_windows() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut rt = runtime(temp.path())?;
        let detected = rt.settings.system_code_page;
        assert!(detected.is_some());
        assert_eq!(rt.settings.effective_code_page(), detected);
        assert_eq!(rt.detect_code_page(), detected);
        Ok(())
    }

    #[test]
    fn clear_tmp_empties_directory() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let rt = runtime(temp.path())?;
        fs::write(rt.layout().tmp_dir().join("leftover.img"), b"x")?;
        assert_eq!(rt.clear_tmp()?, 0);
        assert_eq!(fs::read_dir(rt.layout().tmp_dir())?.count(), 0);
        Ok(())
    }
}
