//! TaskGate - per-user rate-limited task gateway
//!
//! CLI entry point for the supervisor, its workers, and management commands.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{error, info, warn};

use taskgate::cli::{Cli, Command, OutputFormat};
use taskgate::config::Config;
use taskgate::daemon::DaemonManager;
use taskgate::executor::CompletionLog;
use taskgate::supervisor::{ProcessLauncher, Supervisor};
use taskgate::worker;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskgate")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // The supervisor and every worker share this file, so append rather than truncate
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("taskgate.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Workers are single-threaded; everything else gets the default scheduler
    let runtime = match cli.command {
        Some(Command::Worker { .. }) => tokio::runtime::Builder::new_current_thread().enable_all().build(),
        _ => tokio::runtime::Builder::new_multi_thread().enable_all().build(),
    }
    .context("Failed to build tokio runtime")?;

    runtime.block_on(dispatch(cli, config))
}

async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match &cli.command {
        Some(Command::Serve) => cmd_serve(&cli, &config).await,
        Some(Command::Start { foreground }) => cmd_start(&cli, &config, *foreground).await,
        Some(Command::Stop) => cmd_stop(),
        Some(Command::Status { format }) => cmd_status(format),
        Some(Command::Completions { lines, user }) => cmd_completions(&config, *lines, user.as_deref()),
        Some(Command::Worker { slot }) => cmd_worker(&config, *slot).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut sigint), Ok(mut sigterm)) = (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
        else {
            error!("Failed to install signal handlers, waiting for ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Run the supervisor in the foreground
async fn cmd_serve(cli: &Cli, config: &Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let daemon = DaemonManager::new();
    daemon.register_self()?;

    let launcher = Arc::new(ProcessLauncher::current_exe(cli.config.as_ref(), cli.verbose)?);
    let supervisor = Supervisor::new(config.workers.count, launcher);

    println!(
        "TaskGate supervisor {} serving http://{}:{} with {} workers",
        std::process::id(),
        config.server.host,
        config.server.port,
        config.workers.count
    );

    let result = supervisor.run(shutdown_signal()).await;
    daemon.release_self()?;

    let stats = result?;
    info!(?stats, "TaskGate supervisor exited");
    println!("TaskGate stopped ({} workers launched, {} restarts)", stats.launched, stats.restarts);
    Ok(())
}

async fn cmd_start(cli: &Cli, config: &Config, foreground: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let daemon = DaemonManager::new();

    if let Some(pid) = daemon.running_pid() {
        println!("TaskGate is already running (PID: {})", pid);
        return Ok(());
    }

    if foreground {
        return cmd_serve(cli, config).await;
    }

    let mut args = Vec::new();
    if let Some(path) = &cli.config {
        let path = path.canonicalize().unwrap_or_else(|_| path.clone());
        args.push("--config".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    if cli.verbose {
        args.push("--verbose".to_string());
    }

    let pid = daemon.start(&args)?;
    println!("TaskGate started (PID: {})", pid);
    Ok(())
}

fn cmd_stop() -> Result<()> {
    let daemon = DaemonManager::new();

    if !daemon.is_running() {
        println!("TaskGate is not running");
        return Ok(());
    }

    let pid = daemon.stop()?;
    println!("TaskGate stopped (was PID: {})", pid);
    Ok(())
}

fn cmd_status(format: &OutputFormat) -> Result<()> {
    let status = DaemonManager::new().status();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!("TaskGate Status");
            println!("---------------");
            match status.pid {
                Some(pid) => {
                    println!("Status: {}", "running".green());
                    println!("PID: {}", pid);
                }
                None => println!("Status: {}", "stopped".red()),
            }
            println!("PID file: {}", status.pid_file.display());
        }
    }

    Ok(())
}

fn cmd_completions(config: &Config, lines: usize, user: Option<&str>) -> Result<()> {
    let log = CompletionLog::new(&config.completion.log_path);
    let records = log.tail(lines, user)?;

    if records.is_empty() {
        println!("{}", format!("No completions in {}", log.path().display()).dimmed());
        return Ok(());
    }

    for line in records {
        println!("{}", line);
    }
    Ok(())
}

async fn cmd_worker(config: &Config, slot: usize) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let stats = worker::run_worker(config, slot, shutdown_signal()).await?;
    info!(slot, executed = stats.executed, queued = stats.queued, "Worker exiting");
    Ok(())
}
