//! HTTP error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures reported to submitters
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User ID is required")]
    MissingUserId,

    // The task is discarded; the wording is kept as clients already match on it
    #[error("Rate limit exceeded. Task queued for processing")]
    RateLimited,

    #[error("Worker unavailable")]
    Unavailable(eyre::Report),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUserId => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Unavailable(e) = &self {
            tracing::error!(error = %e, "Scheduler unavailable");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
