//! Companion Client
//!
//! Talks to the local OCR companion server over its HTTP contract.
//!
//! - [`HttpCompanionClient`]: reqwest implementation of [`CompanionApi`]
//! - [`LoggingCompanionApi`]: call-logging decorator for any API
//! - [`ReadinessGate`]: bounded health polling
//! - [`JobClient`]: batch submission and status polling
//! - [`fakes`]: scripted in-memory server for tests

pub mod api;
pub mod error;
pub mod fakes;
pub mod jobs;
pub mod logging;
pub mod protocol;
pub mod readiness;

pub use api::{CompanionApi, HttpCompanionClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ApiError, ApiResult, JobError, ReadinessTimeout};
pub use jobs::{Job, JobClient, JobOutcome, JobProgress, DEFAULT_POLL_INTERVAL, UNKNOWN_FAILURE};
pub use logging::LoggingCompanionApi;
pub use protocol::{
    HealthResponse, ItemKeys, JobId, JobState, JobStatusResponse, SubmitRequest, SubmitResponse,
    HEALTH_OK,
};
pub use readiness::{error_excerpt, HealthStatus, ReadinessGate, ReadinessPolicy};
