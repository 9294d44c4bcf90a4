//! In-memory fake of the companion server (testing only)
//!
//! [`FakeCompanion`] satisfies [`CompanionApi`] with scripted health and
//! job-status answers and records every call it receives.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::api::CompanionApi;
use crate::error::{ApiError, ApiResult};
use crate::protocol::*;

const FAKE_URL: &str = "http://fake-companion";

#[derive(Debug, Clone)]
enum HealthPlan {
    Healthy,
    Down,
    /// Probes before this 1-based index fail
    HealthyFromProbe(u32),
    /// Answers, but with a non-`ok` status
    Degraded(String),
}

#[derive(Debug)]
struct FakeState {
    health: HealthPlan,
    version: Option<String>,
    health_delay: Option<Duration>,
    statuses: VecDeque<JobStatusResponse>,
    submit_rejection: Option<(u16, String)>,
    status_failure: Option<ApiError>,
    health_calls: u32,
    status_calls: u32,
    submissions: Vec<SubmitRequest>,
}

/// Scripted companion server.
#[derive(Debug)]
pub struct FakeCompanion {
    state: Mutex<FakeState>,
}

impl Default for FakeCompanion {
    fn default() -> Self {
        FakeCompanion {
            state: Mutex::new(FakeState {
                health: HealthPlan::Healthy,
                version: None,
                health_delay: None,
                statuses: VecDeque::new(),
                submit_rejection: None,
                status_failure: None,
                health_calls: 0,
                status_calls: 0,
                submissions: Vec::new(),
            }),
        }
    }
}

impl FakeCompanion {
    /// A healthy server with no scripted job statuses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse connections on every probe.
    pub fn never_healthy(self) -> Self {
        self.state.lock().unwrap().health = HealthPlan::Down;
        self
    }

    /// Refuse the first `probe - 1` probes, then answer `ok`.
    pub fn healthy_on_probe(self, probe: u32) -> Self {
        self.state.lock().unwrap().health = HealthPlan::HealthyFromProbe(probe);
        self
    }

    /// Answer `/health` with a status other than `ok`.
    pub fn degraded(self, status: &str) -> Self {
        self.state.lock().unwrap().health = HealthPlan::Degraded(status.to_string());
        self
    }

    pub fn with_version(self, version: &str) -> Self {
        self.state.lock().unwrap().version = Some(version.to_string());
        self
    }

    /// Take `delay` to answer every health probe.
    pub fn with_health_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().health_delay = Some(delay);
        self
    }

    /// Status answers in order; the last one repeats forever.
    pub fn with_statuses(self, statuses: Vec<JobStatusResponse>) -> Self {
        self.state.lock().unwrap().statuses = statuses.into();
        self
    }

    /// Reject every submission with `status` and a verbatim `body`.
    pub fn reject_submissions(self, status: u16, body: &str) -> Self {
        self.state.lock().unwrap().submit_rejection = Some((status, body.to_string()));
        self
    }

    /// Fail every status fetch with `error`.
    pub fn fail_status_fetches(self, error: ApiError) -> Self {
        self.state.lock().unwrap().status_failure = Some(error);
        self
    }

    /// Flip health at runtime, e.g. once a fake launch "starts" the server.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().health = if healthy {
            HealthPlan::Healthy
        } else {
            HealthPlan::Down
        };
    }

    pub fn health_calls(&self) -> u32 {
        self.state.lock().unwrap().health_calls
    }

    pub fn status_calls(&self) -> u32 {
        self.state.lock().unwrap().status_calls
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state.lock().unwrap().submissions.clone()
    }
}

fn refused(path: &str) -> ApiError {
    ApiError::Transport {
        url: format!("{FAKE_URL}{path}"),
        message: "connection refused".to_string(),
    }
}

#[async_trait]
impl CompanionApi for FakeCompanion {
    async fn health(&self) -> ApiResult<HealthResponse> {
        let delay = self.state.lock().unwrap().health_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.health_calls += 1;
        let version = state.version.clone();
        match &state.health {
            HealthPlan::Healthy => Ok(HealthResponse::ok(version.as_deref())),
            HealthPlan::Down => Err(refused("/health")),
            HealthPlan::HealthyFromProbe(n) if state.health_calls >= *n => {
                Ok(HealthResponse::ok(version.as_deref()))
            }
            HealthPlan::HealthyFromProbe(_) => Err(refused("/health")),
            HealthPlan::Degraded(status) => Ok(HealthResponse {
                status: status.clone(),
                version,
            }),
        }
    }

    async fn submit(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse> {
        let mut state = self.state.lock().unwrap();
        state.submissions.push(request.clone());
        if let Some((status, body)) = &state.submit_rejection {
            return Err(ApiError::Status {
                url: format!("{FAKE_URL}/ocr"),
                status: *status,
                body: body.clone(),
            });
        }
        Ok(SubmitResponse {
            job_id: JobId::from(format!("job-{}", state.submissions.len())),
            items_queued: request.item_keys.len() as u32,
        })
    }

    async fn job_status(&self, job_id: &JobId) -> ApiResult<JobStatusResponse> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        if let Some(err) = &state.status_failure {
            return Err(err.clone());
        }
        let next = if state.statuses.len() > 1 {
            state.statuses.pop_front()
        } else {
            state.statuses.front().cloned()
        };
        next.ok_or_else(|| ApiError::Status {
            url: format!("{FAKE_URL}/status/{job_id}"),
            status: 404,
            body: "{\"detail\":\"Job not found\"}".to_string(),
        })
    }
}
