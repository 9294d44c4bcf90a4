//! Job Client: submit a batch, then poll it to a terminal state

use crate::api::CompanionApi;
use crate::error::JobError;
use crate::protocol::{ItemKeys, JobId, JobState, JobStatusResponse, SubmitRequest};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Reason reported for a failed job that carried no error messages.
pub const UNKNOWN_FAILURE: &str = "Unknown error";

/// Client-side view of one submitted job.
///
/// Only [`Job::apply`] mutates it, and only with freshly fetched status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub requested: ItemKeys,
    pub items_queued: u32,
    pub state: JobState,
    pub completed: u32,
    pub total: u32,
    pub current_item: Option<String>,
    pub errors: Vec<String>,
}

impl Job {
    pub fn new(id: JobId, requested: ItemKeys, items_queued: u32) -> Self {
        Job {
            id,
            requested,
            items_queued,
            state: JobState::Queued,
            completed: 0,
            total: items_queued,
            current_item: None,
            errors: Vec::new(),
        }
    }

    /// Fold a status response into the job.
    ///
    /// State never moves backwards and `completed` never decreases nor
    /// exceeds `total`.
    pub fn apply(&mut self, status: JobStatusResponse) {
        if status.status < self.state {
            warn!(
                "Job {} reported {} after {}, keeping {}",
                self.id, status.status, self.state, self.state
            );
        } else {
            self.state = status.status;
        }
        self.total = status.total;
        self.completed = self.completed.max(status.completed).min(self.total);
        self.current_item = status.current_item;
        self.errors = status.errors;
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            job_id: self.id.clone(),
            state: self.state,
            completed: self.completed,
            total: self.total,
            current_item: self.current_item.clone(),
        }
    }
}

/// Snapshot handed to progress callbacks after every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub job_id: JobId,
    pub state: JobState,
    pub completed: u32,
    pub total: u32,
    pub current_item: Option<String>,
}

impl JobProgress {
    /// `Processing 1/3 items (current: ABCD1234)`
    pub fn describe(&self) -> String {
        match &self.current_item {
            Some(item) => format!(
                "Processing {}/{} items (current: {})",
                self.completed, self.total, item
            ),
            None => format!("Processing {}/{} items", self.completed, self.total),
        }
    }
}

/// How polling ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Terminal `completed`, possibly with per-item errors
    Completed(Job),
    /// Terminal `failed`; `reason` is the first server error
    Failed { job: Job, reason: String },
    /// The caller stopped polling; the server-side job is untouched
    Cancelled(Job),
}

impl JobOutcome {
    pub fn job(&self) -> &Job {
        match self {
            JobOutcome::Completed(job) | JobOutcome::Cancelled(job) => job,
            JobOutcome::Failed { job, .. } => job,
        }
    }

    fn from_terminal(job: Job) -> Self {
        match job.state {
            JobState::Failed => {
                let reason = job
                    .errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_FAILURE.to_string());
                JobOutcome::Failed { job, reason }
            }
            _ => JobOutcome::Completed(job),
        }
    }
}

/// Submit/poll protocol over a [`CompanionApi`].
pub struct JobClient<'a, A: CompanionApi + ?Sized> {
    api: &'a A,
    poll_interval: Duration,
}

impl<'a, A: CompanionApi + ?Sized> JobClient<'a, A> {
    pub fn new(api: &'a A) -> Self {
        JobClient {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Send the whole batch as one request.
    pub async fn submit(&self, items: &ItemKeys, force: bool) -> Result<Job, JobError> {
        if items.is_empty() {
            return Err(JobError::EmptyBatch);
        }
        let request = SubmitRequest {
            item_keys: items.clone(),
            force,
        };
        let response = self
            .api
            .submit(&request)
            .await
            .map_err(|source| JobError::Submit { source })?;

        info!(
            "Job {} created, {} item(s) queued",
            response.job_id, response.items_queued
        );
        Ok(Job::new(response.job_id, items.clone(), response.items_queued))
    }

    /// Fetch status every poll interval until the job is terminal or `cancel` fires.
    ///
    /// `on_progress` runs after every successful fetch, changed or not. A
    /// failed fetch ends polling with [`JobError::StatusFetch`].
    pub async fn poll_until_terminal<F>(
        &self,
        mut job: Job,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<JobOutcome, JobError>
    where
        F: FnMut(&JobProgress) + Send,
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stopped polling job {} on request", job.id);
                    return Ok(JobOutcome::Cancelled(job));
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let status = self
                .api
                .job_status(&job.id)
                .await
                .map_err(|source| JobError::StatusFetch {
                    job_id: job.id.clone(),
                    source,
                })?;
            debug!(
                "Job {} is {} ({}/{})",
                job.id, status.status, status.completed, status.total
            );

            job.apply(status);
            on_progress(&job.progress());

            if job.is_terminal() {
                return Ok(JobOutcome::from_terminal(job));
            }
        }
    }
}
