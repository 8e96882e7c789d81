use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use eventrelay_events::ValidationError;
use eventrelay_infra::RetryError;

/// Errors surfaced by handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Retry(#[from] RetryError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(err) => {
                let message = err.to_string();
                (
                    StatusCode::BAD_REQUEST,
                    axum::Json(json!({
                        "error": "validation_error",
                        "message": message,
                        "violations": err.violations,
                    })),
                )
                    .into_response()
            }
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Retry(err) => retry_error_to_response(err),
            ApiError::Task(err) => {
                tracing::error!(error = %err, "handler task failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
            }
        }
    }
}

pub fn retry_error_to_response(err: RetryError) -> Response {
    match err {
        RetryError::JobNotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        RetryError::Disabled => json_error(StatusCode::CONFLICT, "retry_disabled", err.to_string()),
        RetryError::Poisoned(_) => {
            tracing::error!(error = %err, "retry scheduler unavailable");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
