//! Detached launch of the companion server
//!
//! The launcher writes a bootstrap script and a diagnostics log into the
//! scratch directory, then spawns the interpreter detached from the caller.
//! Once the OS accepts the process the handle is dropped: the server is
//! owned by the OS and only ever reached over HTTP afterwards.

use crate::bootstrap::{render_bootstrap_script, DEFAULT_ENTRY_MODULE};
use crate::error::LaunchError;
use crate::locator::is_store_stub;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Where and how launch artifacts are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Directory receiving bootstrap scripts and diagnostics logs
    pub scratch_dir: PathBuf,
    /// Python module exposing `main()`
    pub entry_module: String,
    /// Working directory of the child (defaults to the scratch directory)
    pub working_dir: Option<PathBuf>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        LaunchSettings {
            scratch_dir: std::env::temp_dir(),
            entry_module: DEFAULT_ENTRY_MODULE.to_string(),
            working_dir: None,
        }
    }
}

/// Executable plus the environment to inject into the child.
#[derive(Clone, Default)]
pub struct LaunchRequest {
    pub executable: PathBuf,
    /// Variables set on the child only. Values are treated as secrets.
    pub environment: BTreeMap<String, String>,
}

impl std::fmt::Debug for LaunchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchRequest")
            .field("executable", &self.executable)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LaunchRequest {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        LaunchRequest {
            executable: executable.into(),
            environment: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// Fully resolved process description, built right before spawning.
#[derive(Clone)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub environment: BTreeMap<String, String>,
    pub script_path: PathBuf,
    pub diagnostics_log: PathBuf,
}

impl std::fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("executable", &self.executable)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("environment", &self.environment.keys().collect::<Vec<_>>())
            .field("script_path", &self.script_path)
            .field("diagnostics_log", &self.diagnostics_log)
            .finish()
    }
}

/// What is left after a successful launch. No process handle is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// OS process id at spawn time, informational only
    pub pid: Option<u32>,
    pub script_path: PathBuf,
    pub diagnostics_log: PathBuf,
}

/// Starts the companion server.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Returns as soon as the OS accepted the process; never waits for readiness.
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome>;
}

/// Launcher that spawns a detached, windowless interpreter.
#[derive(Debug, Clone, Default)]
pub struct DetachedLauncher {
    settings: LaunchSettings,
}

impl DetachedLauncher {
    pub fn new(settings: LaunchSettings) -> Self {
        DetachedLauncher { settings }
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Resolve the executable and write the bootstrap script.
    pub async fn prepare(&self, request: &LaunchRequest) -> Result<LaunchSpec> {
        let executable = resolve_executable(&request.executable).await?;

        tokio::fs::create_dir_all(&self.settings.scratch_dir)
            .await
            .map_err(|source| LaunchError::ScratchDir {
                path: self.settings.scratch_dir.clone(),
                source,
            })?;

        let stamp = launch_stamp();
        let script_path = self
            .settings
            .scratch_dir
            .join(format!("ocrsup_start_{stamp}.py"));
        let diagnostics_log = self
            .settings
            .scratch_dir
            .join(format!("ocrsup_server_{stamp}.log"));

        let script = render_bootstrap_script(&self.settings.entry_module, &diagnostics_log);
        tokio::fs::write(&script_path, script)
            .await
            .map_err(|source| LaunchError::ScriptWrite {
                path: script_path.clone(),
                source,
            })?;
        debug!("Created startup script at {:?}", script_path);

        Ok(LaunchSpec {
            executable,
            args: vec![script_path.to_string_lossy().into_owned()],
            working_dir: self
                .settings
                .working_dir
                .clone()
                .unwrap_or_else(|| self.settings.scratch_dir.clone()),
            environment: request.environment.clone(),
            script_path,
            diagnostics_log,
        })
    }

    /// Spawn a prepared spec without waiting on it.
    pub async fn spawn(&self, spec: &LaunchSpec) -> Result<LaunchOutcome> {
        let log_error = |source| LaunchError::DiagnosticsLog {
            path: spec.diagnostics_log.clone(),
            source,
        };
        let stdout = tokio::fs::File::create(&spec.diagnostics_log)
            .await
            .map_err(log_error)?
            .into_std()
            .await;
        let stderr = stdout.try_clone().map_err(log_error)?;

        let mut command = std::process::Command::new(&spec.executable);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .envs(&spec.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        detach(&mut command);

        // tokio reaps the child in the background once it exits.
        let mut command = tokio::process::Command::from(command);
        command.kill_on_drop(false);

        let child = command.spawn().map_err(|source| LaunchError::SpawnFailed {
            executable: spec.executable.clone(),
            source,
        })?;
        let pid = child.id();
        drop(child);

        info!(
            "Launched companion server (pid {:?}), log at {:?}",
            pid, spec.diagnostics_log
        );
        Ok(LaunchOutcome {
            pid,
            script_path: spec.script_path.clone(),
            diagnostics_log: spec.diagnostics_log.clone(),
        })
    }
}

#[async_trait]
impl Launcher for DetachedLauncher {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome> {
        info!("Starting server with Python: {:?}", request.executable);
        let spec = self.prepare(request).await?;
        self.spawn(&spec).await
    }
}

/// Existing paths are used as-is; bare command names go through PATH,
/// skipping Store redirectors.
async fn resolve_executable(executable: &Path) -> Result<PathBuf> {
    let missing = || LaunchError::MissingExecutable {
        path: executable.to_path_buf(),
    };
    if tokio::fs::metadata(executable).await.is_ok() {
        return Ok(executable.to_path_buf());
    }
    if executable.components().count() != 1 {
        return Err(missing());
    }

    let name = executable.as_os_str().to_os_string();
    let resolved = tokio::task::spawn_blocking(move || {
        which::which_all(&name)
            .map(|paths| paths.into_iter().find(|path| !is_store_stub(path)))
            .unwrap_or(None)
    })
    .await
    .unwrap_or_else(|e| {
        debug!("PATH lookup for {:?} aborted: {}", executable, e);
        None
    });
    resolved.ok_or_else(missing)
}

/// Timestamp used to keep artifacts of successive launches apart.
fn launch_stamp() -> String {
    format!(
        "{}_{}",
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        std::process::id()
    )
}

#[cfg(unix)]
fn detach(command: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    command.creation_flags(CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut std::process::Command) {}
