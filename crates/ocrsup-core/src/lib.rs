//! ocrsup Core Library
//!
//! Supervises the local OCR companion server: loads configuration, brings
//! the server up when it is not answering, and drives batch jobs against it.
//!
//! ## Layer 2 - Orchestration
//!
//! Builds on `runtime-env-manager` (host environment) and
//! `companion-client` (HTTP contract).

pub mod config;
pub mod error;
pub mod obs;
pub mod report;
pub mod supervisor;
pub mod telemetry;

pub use config::{
    default_config_path, ConfigFile, CredentialKind, CredentialSpec, Credentials, ServerConfig,
    SupervisorConfig, REQUIRED_CREDENTIALS, SERVER_STATIC_ENV,
};
pub use error::{ConfigError, Stage, SupervisorError};
pub use obs::{
    emit_already_running, emit_ensure_running, emit_job_finished, emit_job_progress,
    emit_job_submitted, emit_server_launched, emit_stage_failed, job_span,
};
pub use report::{BatchOutcome, BatchReport};
pub use supervisor::Supervisor;
pub use telemetry::{init_tracing, level_for};

pub use companion_client::{HealthStatus, JobId, JobProgress, JobState};
pub use runtime_env_manager::{CandidateTier, LocatedRuntime};

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;
