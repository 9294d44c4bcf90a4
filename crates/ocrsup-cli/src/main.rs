//! ocrsup - OCR companion server supervisor CLI
//!
//! Brings the local OCR companion server up on demand and runs batch OCR
//! jobs against it.
//!
//! ## Commands
//!
//! - `run`: OCR a batch of items and follow the job to the end
//! - `ensure`: make sure the server is running
//! - `check`: test the connection and report the server version
//! - `locate`: show which Python interpreter would be used
//! - `status`: fetch the status of one job
//! - `config`: print the effective configuration (secrets masked)

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ocrsup_core::{BatchOutcome, JobId, Supervisor, SupervisorConfig};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "ocrsup")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Supervisor for the local OCR companion server", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: <config dir>/ocrsup/config.toml)
    #[arg(short, long, global = true, env = "OCRSUP_CONFIG")]
    config: Option<PathBuf>,

    /// Server host (overrides config and OCR_SERVER_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port (overrides config and OCR_SERVER_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Python executable (overrides config and OCR_PYTHON_PATH)
    #[arg(long, global = true)]
    python: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// OCR a batch of items, starting the server if needed
    Run {
        /// Item keys to process
        #[arg(required = true)]
        items: Vec<String>,

        /// Re-process items that already have OCR output
        #[arg(short, long)]
        force: bool,
    },

    /// Start the companion server unless it is already running
    Ensure,

    /// Test the connection to the companion server
    Check {
        /// Start the server if the connection test fails
        #[arg(long)]
        start: bool,
    },

    /// Show the Python interpreter that would be used
    Locate,

    /// Show the status of a job
    Status {
        /// Job identifier returned at submission
        job_id: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    ocrsup_core::init_tracing(cli.json, ocrsup_core::level_for(cli.verbose));

    let config = load_config(&cli)?;
    debug!("Effective configuration: {:?}", config);

    match cli.command {
        Commands::Config => cmd_config(&config, cli.config.as_deref()),
        Commands::Run { items, force } => cmd_run(&supervisor(config)?, &items, force).await,
        Commands::Ensure => cmd_ensure(&supervisor(config)?).await,
        Commands::Check { start } => cmd_check(&supervisor(config)?, start).await,
        Commands::Locate => cmd_locate(&supervisor(config)?).await,
        Commands::Status { job_id } => cmd_status(&supervisor(config)?, &job_id).await,
    }
}

fn supervisor(config: SupervisorConfig) -> Result<Supervisor> {
    Supervisor::from_config(config).map_err(|e| anyhow!(e.user_message()))
}

/// Config file and environment, then command-line overrides.
fn load_config(cli: &Cli) -> Result<SupervisorConfig> {
    let mut config =
        SupervisorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(python) = &cli.python {
        config.set_runtime_override(python);
    }
    Ok(config)
}

/// Run a batch; Ctrl-C stops waiting but leaves the server-side job running
async fn cmd_run(supervisor: &Supervisor, items: &[String], force: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, no longer waiting for the job");
            on_interrupt.cancel();
        }
    });

    println!("Checking OCR server at {}...", supervisor.config().base_url());

    let mut last_line = String::new();
    let report = supervisor
        .run_batch(items, force, &cancel, |progress| {
            let line = progress.describe();
            if line != last_line {
                println!("  {}", line);
                last_line = line;
            }
        })
        .await;

    if let Some(job_id) = &report.job_id {
        println!("Job: {}", job_id);
    }
    for error in report.server_errors() {
        println!("  - {}", error);
    }

    match &report.outcome {
        BatchOutcome::Failed(_) => Err(anyhow!(report.message())),
        _ => {
            println!("{}", report.message());
            Ok(())
        }
    }
}

/// Start the server unless it already answers
async fn cmd_ensure(supervisor: &Supervisor) -> Result<()> {
    let status = supervisor
        .ensure_running()
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    println!("OCR server running at {}", supervisor.config().base_url());
    println!(
        "Version: {}",
        status.version.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

/// Connection test, optionally falling back to starting the server
async fn cmd_check(supervisor: &Supervisor, start: bool) -> Result<()> {
    let base_url = supervisor.config().base_url();
    let status = supervisor.check_connection().await;

    if status.ready {
        println!("Connected to OCR server at {}", base_url);
        println!(
            "Version: {}",
            status.version.as_deref().unwrap_or("unknown")
        );
        return Ok(());
    }

    if !start {
        anyhow::bail!(
            "Cannot reach OCR server at {}. Run `ocrsup check --start` to start it.",
            base_url
        );
    }

    println!("Server not running at {}, starting it...", base_url);
    cmd_ensure(supervisor).await
}

/// Show the interpreter the locator picks
async fn cmd_locate(supervisor: &Supervisor) -> Result<()> {
    let runtime = supervisor
        .locate_runtime()
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    println!("Python: {}", runtime.path.display());
    println!("Found via: {}", runtime.tier);
    Ok(())
}

/// Fetch and print one job status
async fn cmd_status(supervisor: &Supervisor, job_id: &str) -> Result<()> {
    let status = supervisor
        .job_status(&JobId::from(job_id))
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    println!("Job: {}", job_id);
    println!("Status: {}", status.status);
    println!("Progress: {}/{}", status.completed, status.total);
    if let Some(item) = &status.current_item {
        println!("Current item: {}", item);
    }
    if !status.errors.is_empty() {
        println!("Errors:");
        for error in &status.errors {
            println!("  - {}", error);
        }
    }
    Ok(())
}

/// Print the effective configuration with secrets masked
fn cmd_config(config: &SupervisorConfig, file: Option<&Path>) -> Result<()> {
    let source = file
        .map(Path::to_path_buf)
        .or_else(|| ocrsup_core::default_config_path().filter(|p| p.is_file()));
    match source {
        Some(path) => println!("# config file: {}", path.display()),
        None => println!("# config file: (none)"),
    }

    let entries = config.describe();
    let width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in entries {
        println!("{:width$}  {}", key, value, width = width);
    }
    Ok(())
}
