//! Tracing initialisation for the ocrsup binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored,
//! since the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// HTTP stack crates kept at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls"];

/// Default filter directives for `level`.
pub fn default_directives(level: Level) -> String {
    let mut directives = level.as_str().to_lowercase();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

/// Log level selected by the `--verbose` flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Initialise the global tracing subscriber.
///
/// * `json` emits newline-delimited JSON instead of human-readable lines.
/// * `level` is the default verbosity when `RUST_LOG` is not set.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}
