//! Supervisor implementation

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::launcher::WorkerLauncher;

/// How long a worker gets to exit after SIGTERM during shutdown
const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Point-in-time pool counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorStats {
    /// Workers currently running
    pub live: usize,
    /// Workers launched since start, including the initial pool
    pub launched: u64,
    /// Launches that replaced a terminated worker
    pub restarts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    live: AtomicUsize,
    launched: AtomicU64,
    restarts: AtomicU64,
}

/// Read-only view of a running Supervisor's counters
#[derive(Debug, Clone, Default)]
pub struct SupervisorMonitor {
    counters: Arc<Counters>,
}

impl SupervisorMonitor {
    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            live: self.counters.live.load(Ordering::SeqCst),
            launched: self.counters.launched.load(Ordering::SeqCst),
            restarts: self.counters.restarts.load(Ordering::SeqCst),
        }
    }
}

/// Keeps `pool_size` workers alive, restarting any that terminate
pub struct Supervisor {
    pool_size: usize,
    launcher: Arc<dyn WorkerLauncher>,
    grace: Duration,
    monitor: SupervisorMonitor,
}

impl Supervisor {
    pub fn new(pool_size: usize, launcher: Arc<dyn WorkerLauncher>) -> Self {
        debug!(pool_size, "Supervisor::new: called");
        Self {
            pool_size,
            launcher,
            grace: DEFAULT_GRACE,
            monitor: SupervisorMonitor::default(),
        }
    }

    /// Set how long workers get to exit after SIGTERM on shutdown
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn monitor(&self) -> SupervisorMonitor {
        self.monitor.clone()
    }

    /// Run the pool until `shutdown` resolves
    ///
    /// Worker termination of any kind triggers an immediate relaunch of that
    /// slot. A failure to launch is returned as an error after the remaining
    /// workers are stopped.
    pub async fn run<F>(self, shutdown: F) -> Result<SupervisorStats>
    where
        F: Future<Output = ()> + Send,
    {
        info!("Supervisor {} is running", std::process::id());
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut slots = JoinSet::new();
        for slot in 0..self.pool_size {
            slots.spawn(run_slot(
                slot,
                Arc::clone(&self.launcher),
                Arc::clone(&self.monitor.counters),
                stop_rx.clone(),
                self.grace,
            ));
        }

        let result = tokio::select! {
            _ = shutdown => {
                info!("Supervisor shutting down");
                Ok(())
            }
            Some(joined) = slots.join_next() => {
                match joined {
                    Ok(Err(e)) => Err(e),
                    Ok(Ok(())) => Err(eyre!("Worker slot stopped unexpectedly")),
                    Err(e) => Err(eyre!("Worker slot panicked: {}", e)),
                }
            }
        };

        let _ = stop_tx.send(true);
        while let Some(joined) = slots.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Worker slot ended with error during shutdown"),
                Err(e) => warn!(error = %e, "Worker slot panicked during shutdown"),
            }
        }

        let stats = self.monitor.stats();
        info!(?stats, "Supervisor stopped");
        result.map(|_| stats)
    }
}

/// Restart loop for one pool slot
async fn run_slot(
    slot: usize,
    launcher: Arc<dyn WorkerLauncher>,
    counters: Arc<Counters>,
    mut stop_rx: watch::Receiver<bool>,
    grace: Duration,
) -> Result<()> {
    let mut first = true;
    loop {
        if *stop_rx.borrow() {
            return Ok(());
        }

        let mut worker = launcher
            .launch(slot)
            .await
            .with_context(|| format!("Failed to launch worker for slot {}", slot))?;
        counters.live.fetch_add(1, Ordering::SeqCst);
        counters.launched.fetch_add(1, Ordering::SeqCst);
        if !first {
            counters.restarts.fetch_add(1, Ordering::SeqCst);
        }
        first = false;

        let pid = worker.id();
        debug!(slot, ?pid, "run_slot: worker launched");

        tokio::select! {
            exit = worker.wait() => {
                counters.live.fetch_sub(1, Ordering::SeqCst);
                match exit {
                    Ok(status) => warn!(slot, %status, "Worker {} died", pid.unwrap_or_default()),
                    Err(e) => error!(slot, error = %e, "Worker {} lost", pid.unwrap_or_default()),
                }
            }
            _ = stop_rx.changed() => {
                debug!(slot, ?pid, "run_slot: stopping worker");
                let result = worker.terminate(grace).await;
                counters.live.fetch_sub(1, Ordering::SeqCst);
                return result;
            }
        }
    }
}
