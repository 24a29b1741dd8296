//! Scheduler task implementation
//!
//! One Scheduler task owns the worker's [`AdmissionController`] and
//! [`QueueStore`]. Every mutation happens on that task, one request at a
//! time, so a key's counters and queue are never touched concurrently.
//!
//! Per key the drain loop is a small state machine:
//!
//! ```text
//! Idle --enqueue--> Draining --step--> (empty) --> Idle
//!                      ^                 |
//!                      +--retry timer----+ (admitted and more left, or paced)
//! ```
//!
//! Steps never block on the timer: a rescheduled step is a detached sleep
//! that posts [`SchedulerRequest::DrainStep`] back to the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::{Task, UserKey};
use crate::executor::TaskExecutor;
use crate::rate::{AdmissionController, Decision, LimitsConfig};

use super::handle::SchedulerHandle;
use super::messages::{KeyState, SchedulerRequest, SchedulerStats, SubmitOutcome};
use super::queue::QueueStore;

/// Channel buffer size for scheduler requests
const CHANNEL_BUFFER: usize = 1024;

/// Per-worker admission and drain engine
pub struct Scheduler {
    tx: mpsc::Sender<SchedulerRequest>,
    rx: mpsc::Receiver<SchedulerRequest>,
    state: SchedulerState,
}

impl Scheduler {
    /// Create a new Scheduler with the given limits and executor
    pub fn new(limits: &LimitsConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        debug!(?limits, "Scheduler::new: called");
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let state = SchedulerState {
            admission: AdmissionController::new(limits),
            queues: QueueStore::new(),
            stats: SchedulerStats::default(),
            executor,
            retry_delay: limits.retry_delay(),
            tx: tx.clone(),
        };
        Self { tx, rx, state }
    }

    /// Get a handle for submitting work
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(self.tx.clone())
    }

    /// Spawn the Scheduler onto the current runtime and return its handle
    pub fn spawn(limits: &LimitsConfig, executor: Arc<dyn TaskExecutor>) -> SchedulerHandle {
        let scheduler = Self::new(limits, executor);
        let handle = scheduler.handle();
        tokio::spawn(scheduler.run());
        handle
    }

    /// Run the Scheduler task
    ///
    /// This consumes the Scheduler and runs until shutdown is requested,
    /// returning the final counters.
    pub async fn run(mut self) -> SchedulerStats {
        info!(retry_delay = ?self.state.retry_delay, "Scheduler started");

        while let Some(req) = self.rx.recv().await {
            match req {
                SchedulerRequest::Submit { key, payload, reply_tx } => {
                    self.state.submit(key, payload, reply_tx).await;
                }

                SchedulerRequest::DrainStep { key } => {
                    self.state.drain_step(key).await;
                }

                SchedulerRequest::Inspect { key, reply_tx } => {
                    let state = KeyState {
                        pending: self.state.queues.len(&key),
                        drain: self.state.queues.state(&key),
                    };
                    let _ = reply_tx.send(state);
                }

                SchedulerRequest::Stats { reply_tx } => {
                    let _ = reply_tx.send(self.state.snapshot());
                }

                SchedulerRequest::Shutdown => {
                    info!("Scheduler received shutdown");
                    break;
                }
            }
        }

        let stats = self.state.snapshot();
        if stats.queued > 0 {
            warn!(queued = stats.queued, "Scheduler stopping with queued tasks; they are dropped");
        }
        info!(?stats, "Scheduler stopped");
        stats
    }
}

/// State owned by the Scheduler task
struct SchedulerState {
    admission: AdmissionController,
    queues: QueueStore,
    stats: SchedulerStats,
    executor: Arc<dyn TaskExecutor>,
    retry_delay: Duration,
    tx: mpsc::Sender<SchedulerRequest>,
}

impl SchedulerState {
    async fn submit(
        &mut self,
        key: UserKey,
        payload: serde_json::Value,
        reply_tx: tokio::sync::oneshot::Sender<SubmitOutcome>,
    ) {
        debug!(%key, "SchedulerState::submit: called");
        self.stats.submitted += 1;

        match self.admission.admit_submission(&key) {
            Decision::Rejected { retry_after } => {
                warn!(%key, ?retry_after, "Burst limit exceeded, discarding task");
                self.stats.burst_rejected += 1;
                let _ = reply_tx.send(SubmitOutcome::RateLimited { retry_after });
            }
            Decision::Admitted { remaining } => {
                let queue_len = self.queues.enqueue(Task::new(key.clone(), payload));
                self.stats.accepted += 1;
                debug!(%key, queue_len, remaining, "SchedulerState::submit: queued");
                let _ = reply_tx.send(SubmitOutcome::Accepted { queue_len });

                if self.queues.begin_drain(&key) {
                    debug!(%key, "SchedulerState::submit: key was idle, starting drain");
                    self.drain_step(key).await;
                }
            }
        }
    }

    /// One pace-gated attempt at the head of `key`'s queue
    async fn drain_step(&mut self, key: UserKey) {
        debug!(%key, "SchedulerState::drain_step: called");
        let Some(task) = self.queues.peek_front(&key) else {
            debug!(%key, "SchedulerState::drain_step: queue empty, going idle");
            self.queues.finish_drain(&key);
            return;
        };

        if let Decision::Rejected { retry_after } = self.admission.admit_drain_step(&key) {
            debug!(%key, ?retry_after, "SchedulerState::drain_step: paced, retrying head later");
            self.stats.pace_rejected += 1;
            self.schedule_step(key);
            return;
        }

        match self.executor.execute(task).await {
            Ok(record) => {
                let waited = task.enqueued_at().elapsed();
                debug!(%key, ?waited, completed_at = %record.completed_at, "SchedulerState::drain_step: executed");
                self.stats.executed += 1;
                self.queues.pop_front(&key);
                if self.queues.is_empty(&key) {
                    self.queues.finish_drain(&key);
                } else {
                    self.schedule_step(key);
                }
            }
            Err(e) => {
                error!(%key, error = %e, "Task execution failed, retrying head later");
                self.stats.execution_failures += 1;
                self.schedule_step(key);
            }
        }
    }

    /// Post a drain step for `key` after the retry delay
    fn schedule_step(&self, key: UserKey) {
        let tx = self.tx.clone();
        let delay = self.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(SchedulerRequest::DrainStep { key }).await.is_err() {
                debug!("schedule_step: scheduler gone, dropping step");
            }
        });
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            active_keys: self.queues.draining_count(),
            queued: self.queues.total_pending(),
            ..self.stats.clone()
        }
    }
}
