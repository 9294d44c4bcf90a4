//! Call logging for any [`CompanionApi`]
//!
//! Wraps an API implementation and records every call and its result, so the
//! request/response history of a session can be reconstructed from the log.

use crate::api::CompanionApi;
use crate::error::ApiResult;
use crate::protocol::{HealthResponse, JobId, JobStatusResponse, SubmitRequest, SubmitResponse};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, warn};

/// Decorator that logs each call made through the inner API.
#[derive(Debug, Clone)]
pub struct LoggingCompanionApi<A> {
    inner: A,
}

impl<A: CompanionApi> LoggingCompanionApi<A> {
    pub fn new(inner: A) -> Self {
        LoggingCompanionApi { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

fn record<T: std::fmt::Debug>(operation: &str, started: Instant, result: &ApiResult<T>) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(value) => debug!(
            operation = operation,
            elapsed_ms = elapsed_ms,
            "companion call succeeded: {:?}",
            value
        ),
        Err(err) => warn!(
            operation = operation,
            elapsed_ms = elapsed_ms,
            status = ?err.status(),
            "companion call failed: {}",
            err
        ),
    }
}

#[async_trait]
impl<A: CompanionApi> CompanionApi for LoggingCompanionApi<A> {
    async fn health(&self) -> ApiResult<HealthResponse> {
        let started = Instant::now();
        let result = self.inner.health().await;
        record("health", started, &result);
        result
    }

    async fn submit(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse> {
        debug!(
            operation = "submit",
            items = request.item_keys.len(),
            force = request.force,
            "companion call"
        );
        let started = Instant::now();
        let result = self.inner.submit(request).await;
        record("submit", started, &result);
        result
    }

    async fn job_status(&self, job_id: &JobId) -> ApiResult<JobStatusResponse> {
        debug!(operation = "job_status", job_id = %job_id, "companion call");
        let started = Instant::now();
        let result = self.inner.job_status(job_id).await;
        record("job_status", started, &result);
        result
    }
}
