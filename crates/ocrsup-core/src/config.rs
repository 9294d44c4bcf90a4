//! Supervisor configuration
//!
//! Layers, later wins: built-in defaults, the TOML config file, environment
//! variables, then whatever the caller overrides programmatically (CLI flags).
//! The result is read-only once handed to the [`crate::Supervisor`].

use crate::error::{ConfigError, SupervisorError};
use companion_client::ReadinessPolicy;
use runtime_env_manager::LaunchSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

pub const ENV_HOST: &str = "OCR_SERVER_HOST";
pub const ENV_PORT: &str = "OCR_SERVER_PORT";
pub const ENV_PYTHON_PATH: &str = "OCR_PYTHON_PATH";

/// Non-secret variables always set on the companion server.
pub const SERVER_STATIC_ENV: &[(&str, &str)] = &[("ZOTERO_LOCAL", "true")];

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Which external service a credential unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// The OCR service used by the companion server
    Runtime,
    /// The reference library the results are written back to
    Target,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Runtime => "runtime-service",
            CredentialKind::Target => "target-service",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            CredentialKind::Runtime => "Mistral OCR API access",
            CredentialKind::Target => "Zotero library access",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential the companion server needs in its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSpec {
    pub env_var: &'static str,
    pub kind: CredentialKind,
}

/// Required credentials, runtime-service group first.
pub const REQUIRED_CREDENTIALS: &[CredentialSpec] = &[
    CredentialSpec {
        env_var: "MISTRAL_API_KEY",
        kind: CredentialKind::Runtime,
    },
    CredentialSpec {
        env_var: "ZOTERO_LIBRARY_ID",
        kind: CredentialKind::Target,
    },
    CredentialSpec {
        env_var: "ZOTERO_API_KEY",
        kind: CredentialKind::Target,
    },
];

/// Opaque credential values keyed by environment variable name.
///
/// `Debug` prints names only.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "********")))
            .finish()
    }
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value; blank values unset the credential.
    pub fn set(&mut self, name: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.0.remove(name);
        } else {
            self.0.insert(name.to_string(), value.to_string());
        }
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Missing variables of one group, in table order.
    pub fn missing(&self, kind: CredentialKind) -> Vec<&'static str> {
        REQUIRED_CREDENTIALS
            .iter()
            .filter(|spec| spec.kind == kind && !self.is_set(spec.env_var))
            .map(|spec| spec.env_var)
            .collect()
    }

    /// Fails on the first incomplete group, runtime-service before target-service.
    pub fn validate(&self) -> Result<(), SupervisorError> {
        for kind in [CredentialKind::Runtime, CredentialKind::Target] {
            let missing = self.missing(kind);
            if !missing.is_empty() {
                return Err(SupervisorError::MissingCredentials {
                    kind,
                    missing: missing.into_iter().map(str::to_string).collect(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ServerConfig / SupervisorConfig
// ---------------------------------------------------------------------------

/// Where the companion server listens and what it needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Python executable to use instead of searching; `None` triggers the locator
    pub runtime_override: Option<PathBuf>,
    pub credentials: Credentials,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            runtime_override: None,
            credentials: Credentials::new(),
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Everything the supervisor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub server: ServerConfig,
    pub readiness: ReadinessPolicy,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub launch: LaunchSettings,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            server: ServerConfig::default(),
            readiness: ReadinessPolicy::default(),
            poll_interval: companion_client::DEFAULT_POLL_INTERVAL,
            request_timeout: companion_client::DEFAULT_REQUEST_TIMEOUT,
            launch: LaunchSettings::default(),
        }
    }
}

impl SupervisorConfig {
    /// Defaults, then `path` (or the default file if it exists), then the process environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = SupervisorConfig::default();

        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.is_file()),
        };
        if let Some(file) = file {
            info!("Loading configuration from {:?}", file);
            config.apply_file(ConfigFile::read(&file)?)?;
        } else {
            debug!("No configuration file, using defaults and environment");
        }

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay the values present in `file`.
    pub fn apply_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        let ConfigFile {
            server,
            credentials,
            readiness,
            jobs,
            launch,
        } = file;

        if let Some(host) = server.host {
            self.server.host = host;
        }
        if let Some(port) = server.port {
            self.server.port = port;
        }
        if let Some(path) = server.python_path {
            self.set_runtime_override(&path);
        }
        for (name, value) in &credentials {
            self.server.credentials.set(name, value);
        }

        if let Some(attempts) = readiness.attempts {
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "readiness.attempts".to_string(),
                    value: attempts.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            self.readiness.attempts = attempts;
        }
        if let Some(ms) = readiness.interval_ms {
            self.readiness.interval = Duration::from_millis(ms);
        }
        if let Some(checkpoint) = readiness.diagnostics_checkpoint {
            self.readiness.diagnostics_checkpoint = checkpoint;
        }

        if let Some(ms) = jobs.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = jobs.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }

        if let Some(dir) = launch.scratch_dir {
            self.launch.scratch_dir = dir;
        }
        if let Some(module) = launch.entry_module {
            self.launch.entry_module = module;
        }
        if launch.working_dir.is_some() {
            self.launch.working_dir = launch.working_dir;
        }
        Ok(())
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.trim().is_empty()) {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = parse_port(ENV_PORT, &port)?;
        }
        if let Some(path) = lookup(ENV_PYTHON_PATH) {
            self.set_runtime_override(&path);
        }
        for spec in REQUIRED_CREDENTIALS {
            if let Some(value) = lookup(spec.env_var) {
                self.server.credentials.set(spec.env_var, &value);
            }
        }
        Ok(())
    }

    /// Blank paths clear the override.
    pub fn set_runtime_override(&mut self, path: &str) {
        let path = path.trim();
        self.server.runtime_override = if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        };
    }

    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    /// Printable summary with secrets masked.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut lines = vec![
            ("server.host".to_string(), self.server.host.clone()),
            ("server.port".to_string(), self.server.port.to_string()),
            (
                "server.python_path".to_string(),
                self.server
                    .runtime_override
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(auto-detect)".to_string()),
            ),
        ];
        for spec in REQUIRED_CREDENTIALS {
            let state = if self.server.credentials.is_set(spec.env_var) {
                "set"
            } else {
                "missing"
            };
            lines.push((format!("credentials.{}", spec.env_var), state.to_string()));
        }
        lines.extend([
            (
                "readiness.attempts".to_string(),
                self.readiness.attempts.to_string(),
            ),
            (
                "readiness.interval_ms".to_string(),
                self.readiness.interval.as_millis().to_string(),
            ),
            (
                "jobs.poll_interval_ms".to_string(),
                self.poll_interval.as_millis().to_string(),
            ),
            (
                "launch.scratch_dir".to_string(),
                self.launch.scratch_dir.display().to_string(),
            ),
            (
                "launch.entry_module".to_string(),
                self.launch.entry_module.clone(),
            ),
        ]);
        lines
    }
}

fn parse_port(name: &str, value: &str) -> Result<u16, ConfigError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a port number between 1 and 65535".to_string(),
        }),
    }
}

/// `<config dir>/ocrsup/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ocrsup").join("config.toml"))
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub credentials: BTreeMap<String, String>,
    pub readiness: ReadinessSection,
    pub jobs: JobsSection,
    pub launch: LaunchSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub python_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessSection {
    pub attempts: Option<u32>,
    pub interval_ms: Option<u64>,
    pub diagnostics_checkpoint: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsSection {
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchSection {
    pub scratch_dir: Option<PathBuf>,
    pub entry_module: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
