//! Error taxonomy of the supervisor
//!
//! Every variant is terminal for the current call. [`SupervisorError::user_message`]
//! renders the failing stage, the cause and a probable remedy in one block
//! of text that can be shown to an end user as-is.

use crate::config::CredentialKind;
use companion_client::{ApiError, JobError, JobId, ReadinessTimeout};
use runtime_env_manager::{LaunchError, LocateError};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage at which a supervisor call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Configuration,
    Locate,
    Launch,
    Readiness,
    Submit,
    Polling,
    Job,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configuration => "configuration",
            Stage::Locate => "runtime discovery",
            Stage::Launch => "server launch",
            Stage::Readiness => "server startup",
            Stage::Submit => "job submission",
            Stage::Polling => "job polling",
            Stage::Job => "OCR job",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors loading the configuration layers.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Supervisor failures.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Required credentials are absent; no process or network activity happened
    #[error("missing {kind} credentials: {}", missing.join(", "))]
    MissingCredentials {
        kind: CredentialKind,
        missing: Vec<String>,
    },

    /// No item keys survived normalisation
    #[error("no items to process")]
    EmptyBatch,

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be constructed
    #[error("failed to set up HTTP client: {0}")]
    ClientSetup(ApiError),

    #[error(transparent)]
    RuntimeNotFound(#[from] LocateError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    ReadinessTimeout(#[from] ReadinessTimeout),

    #[error("server rejected the batch: {source}")]
    Submit {
        #[source]
        source: ApiError,
    },

    #[error("lost contact with the server while polling job {job_id}: {source}")]
    StatusFetch {
        job_id: JobId,
        #[source]
        source: ApiError,
    },

    /// Terminal `failed` status; `representative` is the first server error
    #[error("job {job_id} failed: {representative}")]
    JobFailed {
        job_id: JobId,
        representative: String,
        errors: Vec<String>,
    },

    /// A blocking worker panicked or was cancelled
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JobError> for SupervisorError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::EmptyBatch => SupervisorError::EmptyBatch,
            JobError::Submit { source } => SupervisorError::Submit { source },
            JobError::StatusFetch { job_id, source } => {
                SupervisorError::StatusFetch { job_id, source }
            }
        }
    }
}

impl SupervisorError {
    pub fn stage(&self) -> Stage {
        match self {
            SupervisorError::MissingCredentials { .. }
            | SupervisorError::EmptyBatch
            | SupervisorError::Config(_)
            | SupervisorError::ClientSetup(_)
            | SupervisorError::Internal(_) => Stage::Configuration,
            SupervisorError::RuntimeNotFound(_) => Stage::Locate,
            SupervisorError::Launch(_) => Stage::Launch,
            SupervisorError::ReadinessTimeout(_) => Stage::Readiness,
            SupervisorError::Submit { .. } => Stage::Submit,
            SupervisorError::StatusFetch { .. } => Stage::Polling,
            SupervisorError::JobFailed { .. } => Stage::Job,
        }
    }

    /// Probable fix, phrased for an end user.
    pub fn remedy(&self) -> String {
        match self {
            SupervisorError::MissingCredentials { kind, missing } => format!(
                "Set {} ({}) in the environment or in the [credentials] table of the config file.",
                missing.join(", "),
                kind.describe()
            ),
            SupervisorError::EmptyBatch => "Select at least one item to process.".to_string(),
            SupervisorError::Config(_) => "Fix the configuration value shown above.".to_string(),
            SupervisorError::ClientSetup(_) => {
                "Check the configured server host and port.".to_string()
            }
            SupervisorError::RuntimeNotFound(_) => "Install Python 3.8 or newer, or point \
                 OCR_PYTHON_PATH (or --python) at an existing interpreter."
                .to_string(),
            SupervisorError::Launch(LaunchError::MissingExecutable { .. }) => {
                "Check the configured Python path; the file does not exist.".to_string()
            }
            SupervisorError::Launch(LaunchError::SpawnFailed { .. }) => {
                "Check that the Python executable can be run by the current user.".to_string()
            }
            SupervisorError::Launch(_) => {
                "Check that the scratch directory exists and is writable.".to_string()
            }
            SupervisorError::ReadinessTimeout(timeout) => match &timeout.log_path {
                Some(path) => format!(
                    "Make sure the companion server is installed (pip install \
                     mistral-ocr-zotero) and the port is free. Server log: {}",
                    path.display()
                ),
                None => "Make sure the companion server is installed (pip install \
                         mistral-ocr-zotero) and the port is free."
                    .to_string(),
            },
            SupervisorError::Submit { .. } => {
                "Check the selected items and the server's credentials.".to_string()
            }
            SupervisorError::StatusFetch { .. } => {
                "The server stopped answering. Run `ocrsup check --start` and retry.".to_string()
            }
            SupervisorError::JobFailed { .. } => {
                "See the per-item errors reported by the server.".to_string()
            }
            SupervisorError::Internal(_) => "Retry the operation.".to_string(),
        }
    }

    /// Stage, cause, log excerpt (if any) and remedy.
    pub fn user_message(&self) -> String {
        let mut message = format!("{} failed: {}", capitalize(self.stage().as_str()), self);
        if let SupervisorError::ReadinessTimeout(ReadinessTimeout {
            log_excerpt: Some(excerpt),
            ..
        }) = self
        {
            message.push_str("\n\nServer log:\n");
            message.push_str(excerpt);
        }
        message.push_str("\n\n");
        message.push_str(&self.remedy());
        message
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_credentials_message_names_group_and_vars() {
        let err = SupervisorError::MissingCredentials {
            kind: CredentialKind::Target,
            missing: vec!["ZOTERO_LIBRARY_ID".to_string(), "ZOTERO_API_KEY".to_string()],
        };
        assert_eq!(err.stage(), Stage::Configuration);
        let message = err.user_message();
        assert!(message.starts_with("Configuration failed: missing target-service credentials"));
        assert!(message.contains("ZOTERO_LIBRARY_ID, ZOTERO_API_KEY"));
    }

    #[test]
    fn test_readiness_message_includes_log_excerpt() {
        let err = SupervisorError::from(ReadinessTimeout {
            attempts: 20,
            waited: Duration::from_secs(20),
            log_path: Some(PathBuf::from("/tmp/ocrsup_server.log")),
            log_excerpt: Some("Error: Could not import mistral_ocr_zotero.server".to_string()),
        });
        assert_eq!(err.stage(), Stage::Readiness);
        let message = err.user_message();
        assert!(message.starts_with("Server startup failed"));
        assert!(message.contains("Error: Could not import"));
        assert!(message.contains("/tmp/ocrsup_server.log"));
    }

    #[test]
    fn test_job_error_mapping() {
        let err: SupervisorError = JobError::StatusFetch {
            job_id: JobId::from("j-1"),
            source: ApiError::Status {
                url: "u".to_string(),
                status: 502,
                body: "bad gateway".to_string(),
            },
        }
        .into();
        assert_eq!(err.stage(), Stage::Polling);
        assert!(matches!(
            SupervisorError::from(JobError::EmptyBatch),
            SupervisorError::EmptyBatch
        ));
    }

    #[test]
    fn test_launch_remedy_depends_on_kind() {
        let missing = SupervisorError::from(LaunchError::MissingExecutable {
            path: PathBuf::from("/nope/python"),
        });
        assert_eq!(missing.stage(), Stage::Launch);
        assert!(missing.remedy().contains("does not exist"));
    }

    #[test]
    fn test_locate_error_stage() {
        let err = SupervisorError::from(LocateError::NotFound {
            candidates_checked: 42,
        });
        assert_eq!(err.stage(), Stage::Locate);
        assert!(err.user_message().contains("42 candidate"));
    }
}
