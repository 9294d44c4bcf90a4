//! Error types for runtime-env-manager

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while searching for a Python runtime
#[derive(Error, Debug)]
pub enum LocateError {
    /// Every candidate in the search plan was absent
    #[error("no Python runtime found after checking {candidates_checked} candidate locations")]
    NotFound { candidates_checked: usize },
}

/// Errors that can occur while launching the companion server
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The resolved executable does not exist at launch time
    #[error("runtime executable not found at {}", path.display())]
    MissingExecutable { path: PathBuf },

    /// The scratch directory could not be created
    #[error("failed to create scratch directory {}: {source}", path.display())]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bootstrap script could not be written to the scratch directory
    #[error("failed to write bootstrap script {}: {source}", path.display())]
    ScriptWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The diagnostics log could not be created
    #[error("failed to create diagnostics log {}: {source}", path.display())]
    DiagnosticsLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS rejected process creation
    #[error("failed to spawn {}: {source}", executable.display())]
    SpawnFailed {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Short machine-friendly label for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LaunchError::MissingExecutable { .. } => "missing-executable",
            LaunchError::ScratchDir { .. } => "scratch-dir",
            LaunchError::ScriptWrite { .. } => "script-write",
            LaunchError::DiagnosticsLog { .. } => "diagnostics-log",
            LaunchError::SpawnFailed { .. } => "spawn-failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_error_kinds() {
        let err = LaunchError::MissingExecutable {
            path: PathBuf::from("/nope/python3"),
        };
        assert_eq!(err.kind(), "missing-executable");
        assert!(err.to_string().contains("/nope/python3"));

        let err = LaunchError::SpawnFailed {
            executable: PathBuf::from("python3"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.kind(), "spawn-failed");
        assert!(err.to_string().contains("denied"));

        let err = LaunchError::ScratchDir {
            path: PathBuf::from("/ro/scratch"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert_eq!(err.kind(), "scratch-dir");
        assert!(err.to_string().contains("scratch directory /ro/scratch"));
    }

    #[test]
    fn test_not_found_reports_count() {
        let err = LocateError::NotFound {
            candidates_checked: 42,
        };
        assert!(err.to_string().contains("42"));
    }
}
