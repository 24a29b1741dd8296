//! TaskGate - per-user rate-limited task gateway
//!
//! Clients POST tasks tagged with a `user_id`. Each user gets a burst budget
//! at intake and a pace budget at execution; admitted tasks run one at a time
//! per user, in order, and each completion is appended to a log file.
//!
//! # Architecture
//!
//! - [`supervisor`]: keeps a pool of worker processes alive
//! - [`worker`]: one HTTP front and one [`scheduler::Scheduler`] per process
//! - [`scheduler`]: admission, per-user FIFO queues, and paced draining
//! - [`rate`]: fixed-window counters for the burst and pace budgets
//! - [`executor`]: runs a task and appends its completion record

pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod executor;
pub mod rate;
pub mod scheduler;
pub mod server;
pub mod supervisor;
pub mod worker;

pub use config::Config;
pub use domain::{CompletionRecord, Task, UserKey};
pub use executor::{CompletionLog, TaskExecutor};
pub use rate::{AdmissionController, Decision, LimitsConfig, RateBudget, RateWindow};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerStats, SubmitOutcome};
pub use supervisor::{ProcessLauncher, Supervisor, SupervisorStats};
