//! HTTP front end for one worker
//!
//! Parses submissions, hands them to the worker's Scheduler and renders the
//! decision. Everything past the `user_id` check happens in the Scheduler.

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{ACCEPTED_MESSAGE, TASK_PATH, make_router};
