//! Readiness Gate
//!
//! Bounded health polling. A server counts as ready only when `/health`
//! answers with the exact `ok` sentinel; transport errors, error statuses and
//! any other status string all count as "not yet".

use crate::api::CompanionApi;
use crate::error::ReadinessTimeout;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Marker that makes a diagnostics log worth attaching to a timeout.
pub const LOG_ERROR_MARKER: &str = "Error";

/// Number of characters of the diagnostics log attached to a timeout.
pub const LOG_EXCERPT_CHARS: usize = 500;

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthStatus {
    pub ready: bool,
    pub version: Option<String>,
}

impl HealthStatus {
    pub fn not_ready() -> Self {
        Self::default()
    }
}

/// Attempt budget of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    /// Wait before each probe
    pub interval: Duration,
    /// Attempt after which the diagnostics log is surfaced (capped at half the budget)
    pub diagnostics_checkpoint: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        ReadinessPolicy {
            attempts: 20,
            interval: Duration::from_secs(1),
            diagnostics_checkpoint: 5,
        }
    }
}

impl ReadinessPolicy {
    /// Attempt number at which the log is read mid-wait, if any.
    pub fn checkpoint(&self) -> Option<u32> {
        match self.diagnostics_checkpoint.min(self.attempts / 2) {
            0 => None,
            n => Some(n),
        }
    }

    /// Upper bound of the time spent waiting.
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts
    }
}

/// Polls a [`CompanionApi`] until it reports ready.
pub struct ReadinessGate<'a, A: CompanionApi + ?Sized> {
    api: &'a A,
    policy: ReadinessPolicy,
}

impl<'a, A: CompanionApi + ?Sized> ReadinessGate<'a, A> {
    pub fn new(api: &'a A, policy: ReadinessPolicy) -> Self {
        ReadinessGate { api, policy }
    }

    pub fn policy(&self) -> &ReadinessPolicy {
        &self.policy
    }

    /// One health probe. Never fails: every problem reads as not ready.
    pub async fn probe(&self) -> HealthStatus {
        match self.api.health().await {
            Ok(health) if health.is_ok() => HealthStatus {
                ready: true,
                version: health.version,
            },
            Ok(health) => {
                debug!("Health endpoint answered with status {:?}", health.status);
                HealthStatus::not_ready()
            }
            Err(err) => {
                debug!("Health probe failed: {}", err);
                HealthStatus::not_ready()
            }
        }
    }

    /// Sleep-then-probe up to `attempts` times.
    ///
    /// At the checkpoint the diagnostics log is surfaced through the log
    /// without cutting the wait short. On timeout the log is read once more
    /// and its head attached if it contains an error marker.
    pub async fn await_ready(
        &self,
        diagnostics_log: Option<&Path>,
    ) -> Result<HealthStatus, ReadinessTimeout> {
        let checkpoint = self.policy.checkpoint();
        let started = Instant::now();

        for attempt in 1..=self.policy.attempts {
            tokio::time::sleep(self.policy.interval).await;

            let status = self.probe().await;
            if status.ready {
                info!(
                    "Server ready after {} attempt(s), version {:?}",
                    attempt, status.version
                );
                return Ok(status);
            }
            debug!("Server not ready (attempt {}/{})", attempt, self.policy.attempts);

            if Some(attempt) == checkpoint {
                if let Some(path) = diagnostics_log {
                    match read_log(path).await {
                        Some(contents) => info!(
                            "Server still starting, diagnostics log {:?}:\n{}",
                            path, contents
                        ),
                        None => debug!("Diagnostics log {:?} not readable yet", path),
                    }
                }
            }
        }

        let log_excerpt = match diagnostics_log {
            Some(path) => read_log(path).await.and_then(|log| error_excerpt(&log)),
            None => None,
        };
        warn!(
            "Server did not become ready after {} attempts",
            self.policy.attempts
        );
        Err(ReadinessTimeout {
            attempts: self.policy.attempts,
            waited: started.elapsed(),
            log_path: diagnostics_log.map(Path::to_path_buf),
            log_excerpt,
        })
    }
}

async fn read_log(path: &Path) -> Option<String> {
    tokio::fs::read(path)
        .await
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Leading characters of `log`, when it contains the error marker.
pub fn error_excerpt(log: &str) -> Option<String> {
    if log.contains(LOG_ERROR_MARKER) {
        Some(log.chars().take(LOG_EXCERPT_CHARS).collect())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeCompanion;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn policy(attempts: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            attempts,
            ..ReadinessPolicy::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_iff_budget_covers_nth_probe() {
        for n in 1..=6u32 {
            for attempts in 1..=6u32 {
                let fake = FakeCompanion::new().healthy_on_probe(n);
                let gate = ReadinessGate::new(&fake, policy(attempts));
                let result = gate.await_ready(None).await;
                assert_eq!(result.is_ok(), attempts >= n, "n={n} attempts={attempts}");
                assert_eq!(fake.health_calls(), attempts.min(n));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_ok_status_is_not_ready() {
        let fake = FakeCompanion::new().degraded("starting");
        let gate = ReadinessGate::new(&fake, policy(3));
        assert!(!gate.probe().await.ready);
        let err = gate.await_ready(None).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(err.waited >= Duration::from_secs(3), "{:?}", err.waited);
        assert!(err.waited < Duration::from_secs(4), "{:?}", err.waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waited_counts_slow_probes() {
        let fake = FakeCompanion::new()
            .never_healthy()
            .with_health_delay(Duration::from_millis(500));
        let gate = ReadinessGate::new(&fake, policy(2));
        let err = gate.await_ready(None).await.unwrap_err();
        assert_eq!(err.waited, Duration::from_secs(3));
        assert_eq!(policy(2).budget(), Duration::from_secs(2));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_surfaces_log_and_keeps_waiting() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("server.log");
        std::fs::write(&log, "Error: port 8080 busy, retrying\n").unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        // Checkpoint after attempt 3 of 6; the server answers on probe 5.
        let fake = FakeCompanion::new().healthy_on_probe(5);
        let gate = ReadinessGate::new(&fake, policy(6));
        assert_eq!(gate.policy().checkpoint(), Some(3));

        let status = gate.await_ready(Some(&log)).await.unwrap();
        assert!(status.ready);
        assert_eq!(fake.health_calls(), 5);

        let output = captured.text();
        assert!(output.contains("Error: port 8080 busy, retrying"), "{output}");
        assert!(output.contains("Server ready after 5 attempt(s)"), "{output}");
        assert_eq!(output.matches("port 8080 busy").count(), 1, "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_reports_version() {
        let fake = FakeCompanion::new().with_version("0.9.4");
        let gate = ReadinessGate::new(&fake, ReadinessPolicy::default());
        let status = gate.probe().await;
        assert!(status.ready);
        assert_eq!(status.version.as_deref(), Some("0.9.4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_attaches_log_with_error_marker() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("server.log");
        let mut contents = String::from("Error: Could not import mistral_ocr_zotero.server\n");
        contents.push_str(&"x".repeat(1000));
        std::fs::write(&log, &contents).unwrap();

        let fake = FakeCompanion::new().never_healthy();
        let gate = ReadinessGate::new(&fake, policy(4));
        let err = gate.await_ready(Some(&log)).await.unwrap_err();

        assert_eq!(err.log_path.as_deref(), Some(log.as_path()));
        let excerpt = err.log_excerpt.unwrap();
        assert!(excerpt.starts_with("Error: Could not import"));
        assert_eq!(excerpt.chars().count(), LOG_EXCERPT_CHARS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_error_marker_has_no_excerpt() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("server.log");
        std::fs::write(&log, "Starting OCR companion server...\n").unwrap();

        let fake = FakeCompanion::new().never_healthy();
        let gate = ReadinessGate::new(&fake, policy(2));
        let err = gate.await_ready(Some(&log)).await.unwrap_err();
        assert!(err.log_excerpt.is_none());
        assert!(err.log_path.is_some());
    }

    #[test]
    fn test_checkpoint_capped_at_half_budget() {
        assert_eq!(ReadinessPolicy::default().checkpoint(), Some(5));
        assert_eq!(policy(6).checkpoint(), Some(3));
        assert_eq!(policy(1).checkpoint(), None);
    }

    #[test]
    fn test_error_excerpt_is_char_safe() {
        let log = format!("Error {}", "é".repeat(600));
        let excerpt = error_excerpt(&log).unwrap();
        assert_eq!(excerpt.chars().count(), LOG_EXCERPT_CHARS);
        assert!(error_excerpt("all good").is_none());
    }
}
