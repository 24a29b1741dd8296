//! Task and completion record

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::UserKey;

/// A submission accepted into a user's queue
///
/// Immutable once created.
#[derive(Debug, Clone)]
pub struct Task {
    id: String,
    owner: UserKey,
    payload: serde_json::Value,
    enqueued_at: Instant,
}

impl Task {
    /// Create a task stamped with the current (tokio) time
    pub fn new(owner: UserKey, payload: serde_json::Value) -> Self {
        let id = Uuid::now_v7().to_string();
        debug!(%id, %owner, "Task::new: called");
        Self {
            id,
            owner,
            payload,
            enqueued_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &UserKey {
        &self.owner
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }
}

/// Write-once audit entry for one executed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub owner: UserKey,
    #[serde(rename = "completed-at")]
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// Record completion of `task` at the current wall-clock time
    pub fn now(task: &Task) -> Self {
        Self {
            owner: task.owner().clone(),
            completed_at: Utc::now(),
        }
    }

    /// Human-readable sink line, without the trailing newline
    ///
    /// The timestamp is RFC 3339 in UTC with millisecond precision so lines
    /// sort lexically in time order.
    pub fn to_line(&self) -> String {
        format!(
            "{} - task completed at - {}",
            self.owner,
            self.completed_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

impl std::fmt::Display for CompletionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_line())
    }
}
