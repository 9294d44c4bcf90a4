//! Error types for companion-client

use crate::protocol::JobId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the companion server over HTTP
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection refused, timed out, or otherwise never got a response
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Non-2xx response; the body is kept verbatim
    #[error("server returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// 2xx response whose body did not match the contract
    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ApiError {
    /// HTTP status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body, when the server answered with an error status.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Result type for API calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The health endpoint never reported `ok` within the attempt budget
#[derive(Error, Debug, Clone)]
#[error("server not ready after {attempts} health probes ({waited:?})")]
pub struct ReadinessTimeout {
    pub attempts: u32,
    /// Time actually spent, including slow probes
    pub waited: Duration,
    /// Diagnostics log that was consulted, if any
    pub log_path: Option<PathBuf>,
    /// Leading part of the log when it contained an error marker
    pub log_excerpt: Option<String>,
}

/// Failures of the submit/poll protocol
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// No usable item keys were supplied
    #[error("no item keys to submit")]
    EmptyBatch,

    /// The server rejected or never received the batch
    #[error("job submission failed: {source}")]
    Submit {
        #[source]
        source: ApiError,
    },

    /// A status fetch failed mid-job
    #[error("failed to get status of job {job_id}: {source}")]
    StatusFetch {
        job_id: JobId,
        #[source]
        source: ApiError,
    },
}
