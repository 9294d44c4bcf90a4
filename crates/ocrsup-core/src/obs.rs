//! Structured lifecycle events of the supervisor.
//!
//! Every event carries an `event` field (`supervisor.ensure_running`,
//! `server.launched`, `job.submitted`, `job.progress`, `job.finished`) so
//! JSON logs can be filtered without parsing messages. Job events are
//! emitted inside the span returned by [`job_span`].

use companion_client::JobProgress;
use std::path::Path;
use tracing::{debug, info, warn};

/// Span tagging everything logged while a job is polled.
///
/// Attach it to a future with `tracing::Instrument::instrument`.
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("ocrsup.job", job_id = %job_id)
}

/// Emit event: ensure-running started against `base_url`.
pub fn emit_ensure_running(base_url: &str) {
    info!(event = "supervisor.ensure_running", base_url = %base_url);
}

/// Emit event: the server answered the first probe, no launch needed.
pub fn emit_already_running(base_url: &str, version: Option<&str>) {
    info!(
        event = "supervisor.already_running",
        base_url = %base_url,
        version = version.unwrap_or("unknown"),
    );
}

/// Emit event: the launcher accepted the process.
pub fn emit_server_launched(executable: &Path, pid: Option<u32>, log_path: &Path) {
    info!(
        event = "server.launched",
        executable = %executable.display(),
        pid = pid.unwrap_or_default(),
        log_path = %log_path.display(),
    );
}

/// Emit event: a batch was accepted by the server.
pub fn emit_job_submitted(job_id: &str, items_requested: usize, items_queued: u32) {
    info!(
        event = "job.submitted",
        job_id = %job_id,
        items_requested = items_requested,
        items_queued = items_queued,
    );
}

/// Emit event: one status fetch observed.
pub fn emit_job_progress(progress: &JobProgress) {
    debug!(
        event = "job.progress",
        job_id = %progress.job_id,
        state = %progress.state,
        completed = progress.completed,
        total = progress.total,
        current_item = progress.current_item.as_deref().unwrap_or(""),
    );
}

/// Emit event: the batch ended with `outcome` (`completed`, `failed`, `cancelled`).
pub fn emit_job_finished(job_id: &str, outcome: &str, completed: u32, total: u32, errors: usize) {
    if outcome == "failed" {
        warn!(
            event = "job.finished",
            job_id = %job_id,
            outcome = outcome,
            completed = completed,
            total = total,
            errors = errors,
        );
    } else {
        info!(
            event = "job.finished",
            job_id = %job_id,
            outcome = outcome,
            completed = completed,
            total = total,
            errors = errors,
        );
    }
}

/// Emit event: a supervisor stage failed (warning level).
pub fn emit_stage_failed(stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "supervisor.stage_failed", stage = %stage, error = %error);
}
