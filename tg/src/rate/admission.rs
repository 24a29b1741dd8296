//! Admission controller: burst window + pace window

use tokio::time::Instant;
use tracing::debug;

use crate::domain::UserKey;

use super::config::LimitsConfig;
use super::window::{Decision, RateWindow};

/// Two independent rate windows owned by one worker
///
/// The burst window gates submissions; the pace window gates each drain step.
/// A key can pass the burst window and still be paced, never the reverse,
/// since pacing only happens to tasks that were already admitted.
#[derive(Debug)]
pub struct AdmissionController {
    burst: RateWindow,
    pace: RateWindow,
}

impl AdmissionController {
    pub fn new(limits: &LimitsConfig) -> Self {
        debug!(?limits, "AdmissionController::new: called");
        Self {
            burst: RateWindow::from_budget(limits.burst),
            pace: RateWindow::from_budget(limits.pace),
        }
    }

    /// Charge one submission against the burst window
    pub fn admit_submission(&mut self, key: &UserKey) -> Decision {
        self.admit_submission_at(key, Instant::now())
    }

    pub fn admit_submission_at(&mut self, key: &UserKey, now: Instant) -> Decision {
        let decision = self.burst.consume_at(key, now);
        debug!(%key, ?decision, "AdmissionController::admit_submission: decided");
        decision
    }

    /// Charge one execution against the pace window
    pub fn admit_drain_step(&mut self, key: &UserKey) -> Decision {
        self.admit_drain_step_at(key, Instant::now())
    }

    pub fn admit_drain_step_at(&mut self, key: &UserKey, now: Instant) -> Decision {
        let decision = self.pace.consume_at(key, now);
        debug!(%key, ?decision, "AdmissionController::admit_drain_step: decided");
        decision
    }

    pub fn burst(&self) -> &RateWindow {
        &self.burst
    }

    pub fn pace(&self) -> &RateWindow {
        &self.pace
    }
}
