//! Bridge configuration, validated once at construction.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// How submissions map onto interpreter processes.
///
/// A named variant per mode keeps the persistent-stdin/continuous coupling
/// out of flag arithmetic: `PersistentStdin` is continuous by definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Spawn per submission, resolve once with the full output on exit.
    #[default]
    OneShot,
    /// Spawn per submission, emit each newline-terminated chunk as it
    /// arrives instead of waiting for exit.
    Continuous,
    /// Spawn on the first submission only; later submissions are written
    /// to the live process's stdin.
    PersistentStdin,
}

impl ExecMode {
    /// Mode for a (continuous, persistent-stdin) flag pair. Persistent
    /// stdin implies continuous regardless of the explicit flag.
    pub fn from_flags(continuous: bool, persistent_stdin: bool) -> Self {
        if persistent_stdin {
            Self::PersistentStdin
        } else if continuous {
            Self::Continuous
        } else {
            Self::OneShot
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous | Self::PersistentStdin)
    }

    pub fn keeps_process(&self) -> bool {
        matches!(self, Self::PersistentStdin)
    }
}

/// Immutable bridge configuration.
///
/// The interpreter is resolved from the virtualenv's `bin/` directory when
/// one is configured, else from the ambient search path. The spawned
/// process runs in the script's containing directory.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    script: PathBuf,
    virtualenv: Option<PathBuf>,
    mode: ExecMode,
    interpreter: String,
    idle_window: Duration,
    clear_delay: Duration,
}

impl BridgeConfig {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            virtualenv: None,
            mode: ExecMode::OneShot,
            interpreter: "python".to_string(),
            idle_window: Duration::from_secs(2),
            clear_delay: Duration::from_secs(2),
        }
    }

    pub fn with_virtualenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.virtualenv = Some(path.into());
        self
    }

    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    /// Interpreter executable name, `python` by default.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Quiet window after which the status reverts to standby while a
    /// process is running. Status reporting only, never lifecycle.
    pub fn with_idle_window(mut self, window: Duration) -> Self {
        self.idle_window = window;
        self
    }

    /// Delay between a process exiting and the status resetting to neutral.
    pub fn with_clear_delay(mut self, delay: Duration) -> Self {
        self.clear_delay = delay;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub(crate) fn idle_window(&self) -> Duration {
        self.idle_window
    }

    pub(crate) fn clear_delay(&self) -> Duration {
        self.clear_delay
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.script.is_file() {
            return Err(ConfigError::ScriptNotFound(self.script.clone()));
        }
        if let Some(venv) = &self.virtualenv
            && !venv.exists()
        {
            return Err(ConfigError::VirtualenvNotFound(venv.clone()));
        }
        Ok(())
    }

    pub(crate) fn interpreter_path(&self) -> PathBuf {
        match &self.virtualenv {
            Some(venv) => venv.join("bin").join(&self.interpreter),
            None => PathBuf::from(&self.interpreter),
        }
    }

    /// Directory the subprocess runs in.
    pub(crate) fn script_dir(&self) -> PathBuf {
        match self.script.parent() {
            Some(dir) if dir != Path::new("") => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Script file name, passed to the interpreter relative to the
    /// working directory.
    pub(crate) fn script_name(&self) -> &OsStr {
        self.script.file_name().unwrap_or(self.script.as_os_str())
    }
}
