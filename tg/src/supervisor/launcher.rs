//! Launching worker units

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How a worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Exited with a status code
    Code(i32),

    /// Killed by a signal
    Signal(i32),

    /// Ended without a status (e.g. an in-process worker returned)
    Unknown,
}

impl From<ExitStatus> for WorkerExit {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return WorkerExit::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return WorkerExit::Signal(signal);
            }
        }
        WorkerExit::Unknown
    }
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {}", code),
            Self::Signal(signal) => write!(f, "signal {}", signal),
            Self::Unknown => write!(f, "unknown status"),
        }
    }
}

/// A running worker
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, if the worker is a process
    fn id(&self) -> Option<u32>;

    /// Wait for the worker to end on its own
    async fn wait(&mut self) -> Result<WorkerExit>;

    /// Ask the worker to stop, forcing it after `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<()>;
}

/// Starts workers for pool slots
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, slot: usize) -> Result<Box<dyn WorkerProcess>>;
}

/// Launches each worker as a child process running `<program> <args> worker --slot N`
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-run the current executable, forwarding the global CLI flags
    pub fn current_exe(config_path: Option<&PathBuf>, verbose: bool) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to get current executable")?;
        let mut args = Vec::new();
        if let Some(path) = config_path {
            args.push("--config".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        if verbose {
            args.push("--verbose".to_string());
        }
        debug!(?exe, ?args, "ProcessLauncher::current_exe: called");
        Ok(Self::new(exe, args))
    }

    fn command(&self, slot: usize) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("worker")
            .arg("--slot")
            .arg(slot.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches only the supervisor,
        // which then stops workers itself
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, slot: usize) -> Result<Box<dyn WorkerProcess>> {
        debug!(slot, program = ?self.program, "ProcessLauncher::launch: called");
        let child = self
            .command(slot)
            .spawn()
            .with_context(|| format!("Failed to spawn worker for slot {}", slot))?;
        Ok(Box::new(ChildWorker { child }))
    }
}

struct ChildWorker {
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<WorkerExit> {
        let status = self.child.wait().await.context("Failed to wait for worker")?;
        Ok(WorkerExit::from(status))
    }

    async fn terminate(&mut self, grace: Duration) -> Result<()> {
        let Some(pid) = self.child.id() else {
            debug!("ChildWorker::terminate: already reaped");
            return Ok(());
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            debug!(pid, "ChildWorker::terminate: sending SIGTERM");
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid, error = %e, "ChildWorker::terminate: SIGTERM failed");
            }
            if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
                return Ok(());
            }
        }
        #[cfg(not(unix))]
        let _ = grace;

        warn!(pid, "Worker did not stop gracefully, killing");
        self.child.kill().await.context("Failed to kill worker")?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_line_for_slot() {
        let launcher = ProcessLauncher::new("/usr/bin/tg", ["--config", "/etc/tg.yml"]);
        let cmd = launcher.command(3);
        let std_cmd = cmd.as_std();
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(std_cmd.get_program(), "/usr/bin/tg");
        assert_eq!(args, vec!["--config", "/etc/tg.yml", "worker", "--slot", "3"]);
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        // sh -c '<script>' worker --slot 0: the trailing words become $0.. and are ignored
        let launcher = ProcessLauncher::new("sh", ["-c", "exit 3"]);
        let mut worker = launcher.launch(0).await.unwrap();
        assert!(worker.id().is_some());
        assert_eq!(worker.wait().await.unwrap(), WorkerExit::Code(3));
    }

    #[tokio::test]
    async fn test_terminate_stops_long_running_worker() {
        let launcher = ProcessLauncher::new("sh", ["-c", "sleep 30"]);
        let mut worker = launcher.launch(0).await.unwrap();
        worker.terminate(Duration::from_secs(2)).await.unwrap();

        let exit = worker.wait().await.unwrap();
        assert_eq!(exit, WorkerExit::Signal(nix::sys::signal::Signal::SIGTERM as i32));
    }

    #[tokio::test]
    async fn test_worker_runs_in_its_own_process_group() {
        use nix::unistd::{Pid, getpgid};

        let launcher = ProcessLauncher::new("sh", ["-c", "sleep 30"]);
        let mut worker = launcher.launch(0).await.unwrap();
        let pid = Pid::from_raw(worker.id().unwrap() as i32);

        assert_eq!(getpgid(Some(pid)).unwrap(), pid);
        assert_ne!(getpgid(Some(pid)).unwrap(), getpgid(None).unwrap());

        worker.terminate(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_failure_is_an_error() {
        let launcher = ProcessLauncher::new("/nonexistent/taskgate-binary", Vec::<String>::new());
        assert!(launcher.launch(0).await.is_err());
    }

    #[test]
    fn test_current_exe_forwards_flags() {
        let config = PathBuf::from("/tmp/tg.yml");
        let launcher = ProcessLauncher::current_exe(Some(&config), true).unwrap();
        assert_eq!(launcher.args, vec!["--config", "/tmp/tg.yml", "--verbose"]);
    }
}
