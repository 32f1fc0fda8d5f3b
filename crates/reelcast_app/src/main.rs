//! reelcast - command line entry point
//!
//! Handles:
//! - Configuration loading
//! - Application-level logging initialization
//! - Directory creation
//! - Running single jobs or batches and reporting their outcome

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use reelcast_core::config::ConfigManager;
use reelcast_core::jobs::{JobRequest, ReportKind};
use reelcast_core::logging::{init_tracing, LogCallback};
use reelcast_core::orchestrator::{CancelHandle, JobResult, JobRunner, RunHooks};

#[derive(Parser)]
#[command(name = "reelcast", version, about = "Narrated slide videos from report payloads")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Produce one video from a JSON payload
    Generate {
        /// Report kind: credit-report or bank-insights
        #[arg(long)]
        kind: ReportKind,

        /// Payload JSON file
        #[arg(long)]
        payload: PathBuf,

        /// Subject name, overriding the payload's
        #[arg(long)]
        name: Option<String>,

        /// Echo the job log to stdout
        #[arg(long, short)]
        verbose: bool,
    },

    /// Produce one video per payload, several at a time
    Batch {
        /// Payload JSON files
        #[arg(required = true)]
        payloads: Vec<PathBuf>,

        #[arg(long)]
        kind: ReportKind,

        /// Jobs in flight at once
        #[arg(long, default_value_t = 2)]
        concurrency: usize,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with every default filled in
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
    /// Change one setting, e.g. `render.settle_ms 800`
    Set {
        /// `<section>.<key>`
        key: String,
        value: String,
    },
}

/// Per-user config path, falling back to `.config/settings.toml`.
fn default_config_path() -> PathBuf {
    ProjectDirs::from("io", "reelcast", "reelcast")
        .map(|dirs| dirs.config_dir().join("settings.toml"))
        .unwrap_or_else(|| PathBuf::from(".config").join("settings.toml"))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    if let Command::Config { action } = &cli.command {
        return run_config(action, &config_path);
    }

    let mut config_manager = ConfigManager::new(&config_path);
    if let Err(e) = config_manager.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }

    let logs_dir = config_manager.logs_folder();
    let level = config_manager.settings().logging.level;
    let _log_guard = init_tracing(level, Some(logs_dir.as_path()));

    tracing::info!("reelcast starting");
    tracing::info!("Config: {}", config_path.display());
    tracing::info!("Core version: {}", reelcast_core::version());

    config_manager
        .ensure_dirs_exist()
        .context("failed to create configured directories")?;

    let runner = Arc::new(JobRunner::new(config_manager.into_settings()));
    let cancel = CancelHandle::new();
    watch_ctrl_c(cancel.clone());

    match cli.command {
        Command::Generate {
            kind,
            payload,
            name,
            verbose,
        } => {
            let mut request = JobRequest::new(kind, read_payload(&payload)?);
            if let Some(name) = name {
                request = request.with_name(name);
            }

            let log_callback: Option<LogCallback> = if verbose {
                Some(Box::new(|line: &str| println!("{}", line)))
            } else {
                None
            };
            let hooks = RunHooks {
                log_callback,
                progress: Some(Box::new(|stage: &str, percent: u32, message: &str| {
                    eprintln!("[{:>3}%] {}: {}", percent, stage, message);
                })),
                cancel: Some(cancel),
            };

            let result = runner.run(&request, hooks).await;
            Ok(exit_code(report(&result)))
        }
        Command::Batch {
            payloads,
            kind,
            concurrency,
        } => {
            let requests = payloads
                .iter()
                .map(|path| read_payload(path).map(|payload| JobRequest::new(kind, payload)))
                .collect::<Result<Vec<_>>>()?;

            tracing::info!(jobs = requests.len(), concurrency, "Running batch");
            let results = runner.run_batch(requests, concurrency, Some(cancel)).await;

            let succeeded = results.iter().filter(|result| report(result)).count();
            println!("{} of {} jobs succeeded", succeeded, results.len());

            Ok(exit_code(succeeded == results.len()))
        }
        Command::Config { action } => run_config(&action, &config_path),
    }
}

fn run_config(action: &ConfigAction, config_path: &Path) -> Result<ExitCode> {
    let mut manager = ConfigManager::new(config_path);
    match action {
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            manager.save().context("failed to write config")?;
            println!("{}", config_path.display());
        }
        ConfigAction::Show => {
            if config_path.exists() {
                manager.load().context("failed to read config")?;
            }
            print!("{}", manager.generate_config_with_comments()?);
        }
        ConfigAction::Set { key, value } => {
            manager.load_or_create().context("failed to read config")?;
            manager
                .set_value(key, value)
                .with_context(|| format!("failed to set {}", key))?;
            println!("{} = {}", key, value);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_payload(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read payload {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Print the outcome of one job; success prints only the video path.
fn report(result: &JobResult) -> bool {
    match (&result.output_path, result.success) {
        (Some(path), true) => {
            println!("{}", path.display());
            true
        }
        _ => {
            let kind = result
                .failure_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let slide = result
                .failed_slide
                .map(|i| format!(" at slide {}", i))
                .unwrap_or_default();
            eprintln!(
                "job {} failed ({}){}: {}",
                result.job_id,
                kind,
                slide,
                result.error.as_deref().unwrap_or("no details")
            );
            if let Some(log) = &result.log_path {
                eprintln!("  log: {}", log.display());
            }
            false
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// First Ctrl-C stops jobs at their next slide boundary.
fn watch_ctrl_c(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current slide");
            cancel.cancel();
        }
    });
}
