//! Domain types for task admission
//!
//! - [`UserKey`] partitions all rate and queue state
//! - [`Task`] is one accepted submission waiting to run
//! - [`CompletionRecord`] is the audit line written after a task runs

mod key;
mod task;

pub use key::UserKey;
pub use task::{CompletionRecord, Task};
