//! Error taxonomy.
//!
//! Configuration failures are synchronous and fatal to bridge construction.
//! Run failures travel on the submission channel; they never cross the
//! bridge boundary as panics or raw I/O errors.

use std::path::PathBuf;

use thiserror::Error;

/// Rejected bridge configuration. No process is ever spawned for an
/// invalid config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("virtualenv not found: {}", .0.display())]
    VirtualenvNotFound(PathBuf),
}

/// Failure of a single submission.
#[derive(Debug, Error)]
pub enum RunError {
    /// The OS refused to start the interpreter process. The bridge stays
    /// usable; a later submission starts a fresh attempt.
    #[error("failed to spawn interpreter: {0}")]
    Spawn(#[source] std::io::Error),

    /// The script exited with a nonzero code; carries whatever the script
    /// wrote to its stderr.
    #[error("exit code: {code}, {stderr}")]
    Exit { code: i32, stderr: String },

    /// The session ended before the script produced a result.
    #[error("session closed before a result was produced")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_error_message_carries_code_and_stderr() {
        let error = RunError::Exit {
            code: 3,
            stderr: "boom".to_string(),
        };
        assert_eq!(error.to_string(), "exit code: 3, boom");
    }

    #[test]
    fn config_error_names_the_offending_path() {
        let error = ConfigError::ScriptNotFound(PathBuf::from("/tmp/missing.py"));
        assert!(error.to_string().contains("/tmp/missing.py"));
    }
}
