//! TaskGate configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::rate::LimitsConfig;

/// Environment variable overriding `server.port`
pub const PORT_ENV: &str = "PORT";

/// Main TaskGate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listening address shared by all workers
    pub server: ServerConfig,

    /// Worker pool
    pub workers: WorkersConfig,

    /// Burst and pace budgets (per worker)
    pub limits: LimitsConfig,

    /// Completion sink
    pub completion: CompletionConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.workers.count == 0 {
            return Err(eyre::eyre!("workers.count must be greater than zero"));
        }
        self.limits.validate()?;
        self.server.socket_addr()?;
        Ok(())
    }

    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .taskgate.yml
        let local_config = PathBuf::from(".taskgate.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/taskgate/taskgate.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskgate").join("taskgate.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let Ok(raw) = std::env::var(PORT_ENV) else {
            return;
        };
        match raw.trim().parse::<u16>() {
            Ok(port) => {
                tracing::info!(port, "Using port from {}", PORT_ENV);
                self.server.port = port;
            }
            Err(e) => {
                tracing::warn!("Ignoring {}={:?}: {}", PORT_ENV, raw, e);
            }
        }
    }
}

/// Listening address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// Worker pool size
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of worker processes kept alive by the supervisor
    pub count: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { count: 2 }
    }
}

/// Completion sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Append-only log receiving one line per executed task
    #[serde(rename = "log-path")]
    pub log_path: PathBuf,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("task_logs.txt"),
        }
    }
}
