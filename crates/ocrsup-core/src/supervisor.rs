//! Supervisor: the composition root
//!
//! `ensure_running`: probe, then credentials, locate, launch and wait.
//! `run_batch`: ensure running, then submit and poll one job to the end.
//!
//! No stage is retried here. The only loops are the bounded readiness wait
//! and job polling, which ends on a terminal state or caller cancellation.

use crate::config::{SupervisorConfig, SERVER_STATIC_ENV};
use crate::error::SupervisorError;
use crate::obs;
use crate::report::{BatchOutcome, BatchReport};
use companion_client::{
    CompanionApi, HealthStatus, HttpCompanionClient, ItemKeys, JobClient, JobId, JobOutcome,
    JobProgress, JobStatusResponse, LoggingCompanionApi, ReadinessGate,
};
use runtime_env_manager::{DetachedLauncher, LaunchRequest, Launcher, LocatedRuntime, RuntimeLocator};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

/// Supervises one companion server and the jobs sent to it.
pub struct Supervisor {
    config: SupervisorConfig,
    api: Arc<dyn CompanionApi>,
    locator: RuntimeLocator,
    launcher: Arc<dyn Launcher>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Assemble a supervisor from explicit parts.
    pub fn new(
        config: SupervisorConfig,
        api: Arc<dyn CompanionApi>,
        locator: RuntimeLocator,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Supervisor {
            config,
            api,
            locator,
            launcher,
        }
    }

    /// Production wiring: logged HTTP client, host locator, detached launcher.
    pub fn from_config(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let client = HttpCompanionClient::with_timeout(&config.base_url(), config.request_timeout)
            .map_err(SupervisorError::ClientSetup)?;
        let api: Arc<dyn CompanionApi> = Arc::new(LoggingCompanionApi::new(client));
        let locator =
            RuntimeLocator::for_host().with_override(config.server.runtime_override.clone());
        let launcher: Arc<dyn Launcher> = Arc::new(DetachedLauncher::new(config.launch.clone()));
        Ok(Self::new(config, api, locator, launcher))
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    fn gate(&self) -> ReadinessGate<'_, dyn CompanionApi> {
        ReadinessGate::new(self.api.as_ref(), self.config.readiness)
    }

    /// Single health probe, reporting the server version when up.
    pub async fn check_connection(&self) -> HealthStatus {
        self.gate().probe().await
    }

    /// Run the locator off the async threads.
    pub async fn locate_runtime(&self) -> Result<LocatedRuntime, SupervisorError> {
        let locator = self.locator.clone();
        let located = tokio::task::spawn_blocking(move || locator.locate())
            .await
            .map_err(|e| SupervisorError::Internal(format!("runtime search aborted: {e}")))??;
        Ok(located)
    }

    /// Child environment: credentials plus the static server variables.
    pub fn launch_request(&self, executable: &Path) -> LaunchRequest {
        let mut request = LaunchRequest::new(executable);
        for (name, value) in self.config.server.credentials.iter() {
            request = request.with_env(name, value);
        }
        for (name, value) in SERVER_STATIC_ENV {
            request = request.with_env(*name, *value);
        }
        request
    }

    /// Make sure the companion server answers `/health` with `ok`.
    ///
    /// A healthy first probe returns immediately without touching
    /// credentials, the locator or the launcher.
    pub async fn ensure_running(&self) -> Result<HealthStatus, SupervisorError> {
        let base_url = self.config.base_url();
        obs::emit_ensure_running(&base_url);

        let gate = self.gate();
        let status = gate.probe().await;
        if status.ready {
            obs::emit_already_running(&base_url, status.version.as_deref());
            return Ok(status);
        }

        let result = self.start_server(&gate).await;
        if let Err(err) = &result {
            obs::emit_stage_failed(err.stage().as_str(), err);
        }
        result
    }

    async fn start_server(
        &self,
        gate: &ReadinessGate<'_, dyn CompanionApi>,
    ) -> Result<HealthStatus, SupervisorError> {
        self.config.server.credentials.validate()?;

        let runtime = self.locate_runtime().await?;
        info!("Starting companion server with {:?} ({})", runtime.path, runtime.tier);

        let outcome = self.launcher.launch(&self.launch_request(&runtime.path)).await?;
        obs::emit_server_launched(&runtime.path, outcome.pid, &outcome.diagnostics_log);

        let status = gate.await_ready(Some(&outcome.diagnostics_log)).await?;
        Ok(status)
    }

    /// Fetch one job status.
    pub async fn job_status(&self, job_id: &JobId) -> Result<JobStatusResponse, SupervisorError> {
        self.api
            .job_status(job_id)
            .await
            .map_err(|source| SupervisorError::StatusFetch {
                job_id: job_id.clone(),
                source,
            })
    }

    /// Ensure the server is up, submit `items` and poll the job to the end.
    ///
    /// Never returns an error: every failure ends up in the report. Calls
    /// are expected to be serialised by the caller.
    pub async fn run_batch<I, S, F>(
        &self,
        items: I,
        force: bool,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: FnMut(&JobProgress) + Send,
    {
        let items = match ItemKeys::new(items) {
            Ok(items) => items,
            Err(err) => return BatchReport::failed(err.into()),
        };

        let health = match self.ensure_running().await {
            Ok(health) => health,
            Err(err) => return BatchReport::failed(err),
        };

        let client = JobClient::new(self.api.as_ref()).with_poll_interval(self.config.poll_interval);
        let job = match client.submit(&items, force).await {
            Ok(job) => job,
            Err(err) => {
                let err = SupervisorError::from(err);
                obs::emit_stage_failed(err.stage().as_str(), &err);
                let mut report = BatchReport::failed(err);
                report.server_version = health.version;
                return report;
            }
        };
        let job_id = job.id.clone();
        obs::emit_job_submitted(job_id.as_str(), items.len(), job.items_queued);

        let mut last: Option<JobProgress> = None;
        let polled = client
            .poll_until_terminal(job, cancel, |progress| {
                obs::emit_job_progress(progress);
                on_progress(progress);
                last = Some(progress.clone());
            })
            .instrument(obs::job_span(job_id.as_str()))
            .await;

        let report = match polled {
            Ok(JobOutcome::Completed(job)) => {
                let errors = job.errors.clone();
                BatchReport::from_job(&job, health.version, BatchOutcome::Completed { errors })
            }
            Ok(JobOutcome::Cancelled(job)) => {
                BatchReport::from_job(&job, health.version, BatchOutcome::Cancelled)
            }
            Ok(JobOutcome::Failed { job, reason }) => {
                let error = SupervisorError::JobFailed {
                    job_id: job.id.clone(),
                    representative: reason,
                    errors: job.errors.clone(),
                };
                BatchReport::from_job(&job, health.version, BatchOutcome::Failed(error))
            }
            Err(err) => BatchReport::from_progress(
                job_id.clone(),
                last.as_ref(),
                health.version,
                err.into(),
            ),
        };

        let outcome = match &report.outcome {
            BatchOutcome::Completed { .. } => "completed",
            BatchOutcome::Cancelled => "cancelled",
            BatchOutcome::Failed(_) => "failed",
        };
        obs::emit_job_finished(
            job_id.as_str(),
            outcome,
            report.completed,
            report.total,
            report.server_errors().len(),
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use companion_client::fakes::FakeCompanion;
    use runtime_env_manager::{HostLayout, Platform};
    use tempfile::tempdir;

    #[test]
    fn test_launch_request_carries_credentials_and_static_env() {
        let dir = tempdir().unwrap();
        let mut config = SupervisorConfig::default();
        config.server.credentials = Credentials::new()
            .with("MISTRAL_API_KEY", "m")
            .with("ZOTERO_LIBRARY_ID", "1")
            .with("ZOTERO_API_KEY", "z");
        let supervisor = Supervisor::new(
            config,
            Arc::new(FakeCompanion::new()),
            RuntimeLocator::new(HostLayout::rooted_at(Platform::Linux, dir.path())),
            Arc::new(DetachedLauncher::default()),
        );

        let request = supervisor.launch_request(Path::new("/usr/bin/python3"));
        assert_eq!(request.environment["MISTRAL_API_KEY"], "m");
        assert_eq!(request.environment["ZOTERO_API_KEY"], "z");
        assert_eq!(request.environment["ZOTERO_LOCAL"], "true");
        assert_eq!(request.environment.len(), 4);
    }

    #[tokio::test]
    async fn test_from_config_builds_http_wiring() {
        let supervisor = Supervisor::from_config(SupervisorConfig::default()).unwrap();
        assert_eq!(supervisor.config().base_url(), "http://127.0.0.1:8080");
    }
}
