//! Story Runner: API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use storyrunner_core::error::StoryError;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `StoryError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub StoryError);

impl From<StoryError> for ApiError {
    fn from(err: StoryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            StoryError::InvalidParent(_) => (StatusCode::BAD_REQUEST, "invalid_parent"),
            StoryError::DuplicateModuleName(_) => (StatusCode::CONFLICT, "duplicate_module_name"),
            StoryError::LaunchFailure { .. } => (StatusCode::BAD_GATEWAY, "launch_failure"),
            StoryError::ManifestResolutionFailure(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "manifest_resolution_failure",
            ),
            StoryError::LinkNotFound(_) => (StatusCode::NOT_FOUND, "link_not_found"),
            StoryError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "stop_timeout"),
            StoryError::AlreadyStopped(_) => (StatusCode::CONFLICT, "already_stopped"),
            StoryError::NotRunning(_) => (StatusCode::NOT_FOUND, "module_not_running"),
            StoryError::ReadOnlyLink(_) => (StatusCode::FORBIDDEN, "read_only_link"),
            StoryError::Halted => (StatusCode::SERVICE_UNAVAILABLE, "story_halted"),
            StoryError::Ledger(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ledger_error"),
            StoryError::Shell(_) => (StatusCode::BAD_GATEWAY, "shell_error"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
