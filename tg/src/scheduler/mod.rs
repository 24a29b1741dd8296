//! Per-user task scheduling
//!
//! Admits submissions against the burst window, keeps one FIFO per user and
//! drains each FIFO one task at a time, gated by the pace window.

mod core;
mod handle;
mod messages;
mod queue;

pub use core::Scheduler;
pub use handle::SchedulerHandle;
pub use messages::{KeyState, SchedulerRequest, SchedulerStats, SubmitOutcome};
pub use queue::{DrainState, QueueStore, UserQueue};
