//! Routes and handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::debug;

use crate::domain::UserKey;
use crate::scheduler::{SchedulerHandle, SubmitOutcome};

use super::error::ApiError;

pub const TASK_PATH: &str = "/api/v1/task";

pub const ACCEPTED_MESSAGE: &str = "Task accepted and queued for processing";

#[derive(Debug, Serialize)]
struct Accepted {
    message: &'static str,
}

pub fn make_router(scheduler: SchedulerHandle) -> Router {
    Router::new().route(TASK_PATH, post(submit_task)).with_state(scheduler)
}

/// `user_id` must be a non-empty string
fn user_key(payload: &serde_json::Value) -> Option<UserKey> {
    payload
        .get("user_id")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .map(UserKey::from)
}

async fn submit_task(
    State(scheduler): State<SchedulerHandle>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let Json(payload) = body.map_err(|rejection| {
        debug!(%rejection, "submit_task: unreadable body");
        ApiError::MissingUserId
    })?;
    let key = user_key(&payload).ok_or(ApiError::MissingUserId)?;
    debug!(%key, "submit_task: called");

    match scheduler.submit(key, payload).await.map_err(ApiError::Unavailable)? {
        SubmitOutcome::Accepted { .. } => Ok((
            StatusCode::ACCEPTED,
            Json(Accepted {
                message: ACCEPTED_MESSAGE,
            }),
        )),
        SubmitOutcome::RateLimited { .. } => Err(ApiError::RateLimited),
    }
}
