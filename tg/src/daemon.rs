//! Background supervisor management
//!
//! `tg start` spawns a detached `tg serve` and records its PID; `tg stop` and
//! `tg status` find it again through that file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Polls of the process table before escalating to SIGKILL
const STOP_ATTEMPTS: u32 = 50;
const STOP_POLL: Duration = Duration::from_millis(100);

fn default_pid_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("taskgate")
        .join("taskgate.pid")
}

/// Status of the background supervisor
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    #[serde(rename = "pid-file")]
    pub pid_file: PathBuf,
}

/// PID-file based process manager for the supervisor
#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    pub fn new() -> Self {
        Self::with_pid_file(default_pid_path())
    }

    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        debug!(?pid_file, "DaemonManager::with_pid_file: called");
        Self { pid_file }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    /// PID of the supervisor, if the recorded process is still alive
    pub fn running_pid(&self) -> Option<u32> {
        self.read_pid().filter(|&pid| is_process_running(pid))
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        let status = DaemonStatus {
            running: pid.is_some(),
            pid,
            pid_file: self.pid_file.clone(),
        };
        debug!(?status, "DaemonManager::status: returning");
        status
    }

    fn read_pid(&self) -> Option<u32> {
        let contents = fs::read_to_string(&self.pid_file).ok()?;
        contents.trim().parse().ok()
    }

    fn write_pid(&self, pid: u32) -> Result<()> {
        debug!(pid, ?self.pid_file, "DaemonManager::write_pid: called");
        if let Some(parent) = self.pid_file.parent() {
            fs::create_dir_all(parent).context("Failed to create PID file directory")?;
        }
        fs::write(&self.pid_file, pid.to_string()).context("Failed to write PID file")
    }

    fn remove_pid_file(&self) -> Result<()> {
        if self.pid_file.exists() {
            fs::remove_file(&self.pid_file).context("Failed to remove PID file")?;
            debug!(path = ?self.pid_file, "Removed PID file");
        }
        Ok(())
    }

    /// Spawn a detached `serve` with `args` placed before the subcommand
    pub fn start(&self, args: &[String]) -> Result<u32> {
        debug!(?args, "DaemonManager::start: called");
        if let Some(pid) = self.running_pid() {
            return Err(eyre!("Supervisor already running with PID {}", pid));
        }

        let exe = std::env::current_exe().context("Failed to get current executable")?;
        let child = Command::new(&exe)
            .args(args)
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn supervisor process")?;

        let pid = child.id();
        self.write_pid(pid)?;
        info!(pid, "Supervisor started in background");
        Ok(pid)
    }

    /// SIGTERM the supervisor, escalating to SIGKILL if it lingers
    pub fn stop(&self) -> Result<u32> {
        let pid = self.running_pid().ok_or_else(|| eyre!("Supervisor is not running"))?;
        info!(pid, "Stopping supervisor");
        send_signal(pid, nix::sys::signal::Signal::SIGTERM).context("Failed to send SIGTERM")?;

        let mut attempts = 0;
        while is_process_running(pid) && attempts < STOP_ATTEMPTS {
            std::thread::sleep(STOP_POLL);
            attempts += 1;
        }

        if is_process_running(pid) {
            warn!(pid, "Supervisor did not stop gracefully, sending SIGKILL");
            let _ = send_signal(pid, nix::sys::signal::Signal::SIGKILL);
        }

        self.remove_pid_file()?;
        info!(pid, "Supervisor stopped");
        Ok(pid)
    }

    /// Record the calling process as the supervisor
    ///
    /// Fails if a different live process already holds the PID file. A file
    /// naming this process (written by `start`) is accepted.
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        if let Some(running) = self.running_pid()
            && running != pid
        {
            return Err(eyre!("Supervisor already running with PID {}", running));
        }
        self.write_pid(pid)?;
        info!(pid, path = ?self.pid_file, "Supervisor registered");
        Ok(())
    }

    /// Remove the PID file if it still names the calling process
    pub fn release_self(&self) -> Result<()> {
        let pid = std::process::id();
        match self.read_pid() {
            Some(recorded) if recorded == pid => self.remove_pid_file(),
            recorded => {
                debug!(pid, ?recorded, "DaemonManager::release_self: PID file not ours, leaving it");
                Ok(())
            }
        }
    }
}

fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::unistd::Pid;
    nix::sys::signal::kill(Pid::from_raw(pid as i32), signal)?;
    Ok(())
}

fn is_process_running(pid: u32) -> bool {
    use nix::unistd::Pid;
    // Signal 0 probes for existence without delivering anything
    nix::sys::signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}
