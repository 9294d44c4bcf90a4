//! Final report of a `run_batch` call

use crate::error::SupervisorError;
use companion_client::{Job, JobId, JobProgress};
use std::fmt;

/// How a batch ended.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Terminal `completed`; `errors` are per-item failures
    Completed { errors: Vec<String> },
    /// Polling stopped by the caller; the server keeps working on the job
    Cancelled,
    /// Any terminal supervisor failure, including a failed job
    Failed(SupervisorError),
}

/// Counts and outcome of one batch.
#[derive(Debug)]
pub struct BatchReport {
    pub job_id: Option<JobId>,
    pub server_version: Option<String>,
    pub completed: u32,
    pub total: u32,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    /// Failure before any job existed.
    pub fn failed(error: SupervisorError) -> Self {
        BatchReport {
            job_id: None,
            server_version: None,
            completed: 0,
            total: 0,
            outcome: BatchOutcome::Failed(error),
        }
    }

    pub(crate) fn from_job(job: &Job, server_version: Option<String>, outcome: BatchOutcome) -> Self {
        BatchReport {
            job_id: Some(job.id.clone()),
            server_version,
            completed: job.completed,
            total: job.total,
            outcome,
        }
    }

    pub(crate) fn from_progress(
        job_id: JobId,
        progress: Option<&JobProgress>,
        server_version: Option<String>,
        error: SupervisorError,
    ) -> Self {
        BatchReport {
            job_id: Some(job_id),
            server_version,
            completed: progress.map(|p| p.completed).unwrap_or(0),
            total: progress.map(|p| p.total).unwrap_or(0),
            outcome: BatchOutcome::Failed(error),
        }
    }

    /// `true` for completed jobs, per-item errors included.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Completed { .. })
    }

    pub fn error(&self) -> Option<&SupervisorError> {
        match &self.outcome {
            BatchOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Per-item or job-level error messages reported by the server.
    pub fn server_errors(&self) -> &[String] {
        match &self.outcome {
            BatchOutcome::Completed { errors } => errors.as_slice(),
            BatchOutcome::Failed(SupervisorError::JobFailed { errors, .. }) => errors.as_slice(),
            _ => &[],
        }
    }

    /// One-line summary for the caller.
    pub fn message(&self) -> String {
        match &self.outcome {
            BatchOutcome::Completed { errors } if errors.is_empty() => {
                format!("Processed {}/{} items", self.completed, self.total)
            }
            BatchOutcome::Completed { errors } => format!(
                "Processed {}/{} items ({} errors)",
                self.completed,
                self.total,
                errors.len()
            ),
            BatchOutcome::Cancelled => format!(
                "Stopped waiting after {}/{} items; the server continues in the background",
                self.completed, self.total
            ),
            BatchOutcome::Failed(SupervisorError::JobFailed { representative, .. }) => {
                format!("Failed: {}", representative)
            }
            BatchOutcome::Failed(err) => err.user_message(),
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
