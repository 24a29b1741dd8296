//! Fixed-window counter
//!
//! Each key owns a `(count, started_at)` pair. A window is live while
//! `now - started_at < duration`; the first access after that resets the
//! pair to `(1, now)`. Counts never carry over, so up to `2 * capacity`
//! admits can land in a short span straddling a window edge.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::domain::UserKey;

use super::RateBudget;

/// Outcome of a single `consume`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Within budget; `remaining` admits left in the current window
    Admitted { remaining: u32 },

    /// Over budget until the current window closes
    Rejected { retry_after: Duration },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    started_at: Instant,
}

/// Counting window keyed by user, enforcing one budget
#[derive(Debug)]
pub struct RateWindow {
    capacity: u32,
    duration: Duration,
    entries: HashMap<UserKey, WindowEntry>,
}

impl RateWindow {
    /// Create a window admitting `capacity` per `duration` per key
    pub fn new(capacity: u32, duration: Duration) -> Self {
        debug_assert!(capacity > 0, "rate window capacity must be positive");
        debug!(capacity, ?duration, "RateWindow::new: called");
        Self {
            capacity,
            duration,
            entries: HashMap::new(),
        }
    }

    pub fn from_budget(budget: RateBudget) -> Self {
        Self::new(budget.capacity, budget.duration())
    }

    /// Take one admit for `key` at the current time
    pub fn consume(&mut self, key: &UserKey) -> Decision {
        self.consume_at(key, Instant::now())
    }

    /// Take one admit for `key` as of `now`
    pub fn consume_at(&mut self, key: &UserKey, now: Instant) -> Decision {
        let duration = self.duration;
        let capacity = self.capacity;

        let Some(entry) = self.entries.get_mut(key) else {
            debug!(%key, "RateWindow::consume_at: new key, opening window");
            self.entries.insert(key.clone(), WindowEntry { count: 1, started_at: now });
            return Decision::Admitted {
                remaining: capacity - 1,
            };
        };

        let elapsed = now.saturating_duration_since(entry.started_at);
        if elapsed >= duration {
            debug!(%key, ?elapsed, "RateWindow::consume_at: window expired, resetting");
            *entry = WindowEntry { count: 1, started_at: now };
            return Decision::Admitted {
                remaining: capacity - 1,
            };
        }

        if entry.count < capacity {
            entry.count += 1;
            debug!(%key, count = entry.count, "RateWindow::consume_at: admitted");
            return Decision::Admitted {
                remaining: capacity - entry.count,
            };
        }

        let retry_after = duration - elapsed;
        debug!(%key, ?retry_after, "RateWindow::consume_at: rejected");
        Decision::Rejected { retry_after }
    }

    /// Admits consumed by `key` in its live window, if any
    pub fn consumed(&self, key: &UserKey) -> u32 {
        self.consumed_at(key, Instant::now())
    }

    pub fn consumed_at(&self, key: &UserKey, now: Instant) -> u32 {
        match self.entries.get(key) {
            Some(entry) if now.saturating_duration_since(entry.started_at) < self.duration => entry.count,
            _ => 0,
        }
    }

    /// Number of keys ever seen; entries are never evicted
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}
