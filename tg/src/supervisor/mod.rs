//! Worker pool supervision
//!
//! The [`Supervisor`] keeps a fixed number of workers alive. Each slot runs
//! its own restart loop: launch, wait for exit, launch again. It holds no
//! task or rate state of its own.

mod core;
mod launcher;

pub use core::{Supervisor, SupervisorMonitor, SupervisorStats};
pub use launcher::{ProcessLauncher, WorkerExit, WorkerLauncher, WorkerProcess};
