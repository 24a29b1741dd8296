//! Message types for the Scheduler

use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::domain::UserKey;

use super::queue::DrainState;

/// Result of a submission, as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Admitted by the burst window and appended to the user's queue
    Accepted { queue_len: usize },

    /// Burst window exhausted; the task was discarded
    RateLimited { retry_after: Duration },
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }
}

/// Snapshot of one key's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub pending: usize,
    pub drain: DrainState,
}

/// Counters kept by the Scheduler task
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub accepted: u64,
    pub burst_rejected: u64,
    pub pace_rejected: u64,
    pub executed: u64,
    pub execution_failures: u64,
    /// Keys with a drain loop currently live
    pub active_keys: usize,
    /// Tasks waiting across all keys
    pub queued: usize,
}

/// Internal requests to the Scheduler task
#[derive(Debug)]
pub enum SchedulerRequest {
    /// Submit a task for a user
    Submit {
        key: UserKey,
        payload: serde_json::Value,
        reply_tx: oneshot::Sender<SubmitOutcome>,
    },

    /// Run one drain step for a key (posted by the key's retry timer)
    DrainStep { key: UserKey },

    /// Read one key's queue state
    Inspect {
        key: UserKey,
        reply_tx: oneshot::Sender<KeyState>,
    },

    /// Read the counters
    Stats { reply_tx: oneshot::Sender<SchedulerStats> },

    /// Stop the Scheduler; queued tasks are dropped
    Shutdown,
}
