//! Rate limit configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One window's budget: `capacity` admits per `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    /// Admits allowed per window
    pub capacity: u32,

    /// Window length in milliseconds
    #[serde(rename = "duration-ms")]
    pub duration_ms: u64,
}

impl RateBudget {
    pub fn new(capacity: u32, duration: Duration) -> Self {
        Self {
            capacity,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Get the window length as a Duration
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    fn validate(&self, name: &str) -> eyre::Result<()> {
        if self.capacity == 0 {
            return Err(eyre::eyre!("limits.{}.capacity must be greater than zero", name));
        }
        if self.duration_ms == 0 {
            return Err(eyre::eyre!("limits.{}.duration-ms must be greater than zero", name));
        }
        Ok(())
    }
}

/// Burst and pace budgets for one worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Coarse per-user ceiling checked at submission time
    #[serde(default = "default_burst")]
    pub burst: RateBudget,

    /// Fine per-user gate checked before each task executes
    #[serde(default = "default_pace")]
    pub pace: RateBudget,

    /// Delay between drain attempts; falls back to the pace duration
    #[serde(rename = "retry-delay-ms", default)]
    pub retry_delay_ms: Option<u64>,
}

fn default_burst() -> RateBudget {
    RateBudget {
        capacity: 20,
        duration_ms: 60_000,
    }
}

fn default_pace() -> RateBudget {
    RateBudget {
        capacity: 1,
        duration_ms: 1_000,
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            burst: default_burst(),
            pace: default_pace(),
            retry_delay_ms: None,
        }
    }
}

impl LimitsConfig {
    /// Delay before the next drain step for a key
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.pace.duration())
    }

    pub fn validate(&self) -> eyre::Result<()> {
        self.burst.validate("burst")?;
        self.pace.validate("pace")?;
        if self.retry_delay_ms == Some(0) {
            return Err(eyre::eyre!("limits.retry-delay-ms must be greater than zero"));
        }
        Ok(())
    }
}
