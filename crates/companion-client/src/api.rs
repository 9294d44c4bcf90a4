//! The companion server API seam and its reqwest implementation

use crate::error::{ApiError, ApiResult};
use crate::protocol::{HealthResponse, JobId, JobStatusResponse, SubmitRequest, SubmitResponse};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations exposed by the companion server.
///
/// Every call is a single request/response exchange; retries are the
/// caller's business.
#[async_trait]
pub trait CompanionApi: Send + Sync {
    /// `GET /health`
    async fn health(&self) -> ApiResult<HealthResponse>;

    /// `POST /ocr`
    async fn submit(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse>;

    /// `GET /status/{job_id}`
    async fn job_status(&self, job_id: &JobId) -> ApiResult<JobStatusResponse>;
}

#[async_trait]
impl<T: CompanionApi + ?Sized> CompanionApi for Arc<T> {
    async fn health(&self) -> ApiResult<HealthResponse> {
        (**self).health().await
    }

    async fn submit(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse> {
        (**self).submit(request).await
    }

    async fn job_status(&self, job_id: &JobId) -> ApiResult<JobStatusResponse> {
        (**self).job_status(job_id).await
    }
}

/// HTTP client for a companion server at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpCompanionClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCompanionClient {
    /// Create a client with the default request timeout.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .user_agent(concat!("ocrsup-companion-client/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport {
                url: base_url.clone(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(HttpCompanionClient { base_url, http })
    }

    /// Client for `http://{host}:{port}`.
    pub fn for_endpoint(host: &str, port: u16) -> ApiResult<Self> {
        Self::new(&format!("http://{host}:{port}"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: String,
        request: reqwest::RequestBuilder,
    ) -> ApiResult<T> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::Transport {
            url: url.clone(),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl CompanionApi for HttpCompanionClient {
    async fn health(&self) -> ApiResult<HealthResponse> {
        let url = self.url("/health");
        self.send(url.clone(), self.http.get(&url)).await
    }

    async fn submit(&self, request: &SubmitRequest) -> ApiResult<SubmitResponse> {
        let url = self.url("/ocr");
        debug!("Submitting {} item(s) to {}", request.item_keys.len(), url);
        self.send(url.clone(), self.http.post(&url).json(request))
            .await
    }

    async fn job_status(&self, job_id: &JobId) -> ApiResult<JobStatusResponse> {
        let url = self.url(&format!("/status/{}", job_id));
        self.send(url.clone(), self.http.get(&url)).await
    }
}
