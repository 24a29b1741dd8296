//! Per-user rate limiting
//!
//! A [`RateWindow`] is a fixed-window counter keyed by [`UserKey`](crate::domain::UserKey).
//! The [`AdmissionController`] pairs two of them: a coarse burst window checked
//! when a task is submitted, and a fine pace window checked before each task runs.

mod admission;
mod config;
mod window;

pub use admission::AdmissionController;
pub use config::{LimitsConfig, RateBudget};
pub use window::{Decision, RateWindow};
