//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TaskGate - per-user rate-limited task gateway
#[derive(Parser)]
#[command(
    name = "tg",
    about = "Per-user rate-limited task intake with paced, ordered execution",
    version,
    after_help = "Logs are written to: ~/.local/share/taskgate/logs/taskgate.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the supervisor and its process pool in the foreground
    Serve,

    /// Start the supervisor in the background
    Start {
        /// Don't fork to background (same as `serve`)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the background supervisor
    Stop,

    /// Show whether the supervisor is running
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show recent task completions
    Completions {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "20")]
        lines: usize,

        /// Only show completions for this user id
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Internal: run one worker process (used by `serve`)
    #[command(hide = true)]
    Worker {
        /// Pool slot this worker fills
        #[arg(long)]
        slot: usize,
    },
}

/// Output format for the status command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
