use crate::services::error::SnapshotError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 422 Unprocessable Entity
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, msg)
    }

    /// Shortcut for 415 Unsupported Media Type
    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        let status = match &err {
            SnapshotError::Fetch { .. }
            | SnapshotError::FetchTimeout { .. }
            | SnapshotError::ContentTooLarge { .. }
            | SnapshotError::MimeNotAllowed(_) => StatusCode::BAD_REQUEST,
            SnapshotError::Validation(_) | SnapshotError::CompressionUnavailable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SnapshotError::NotFound(_) => StatusCode::NOT_FOUND,
            SnapshotError::Decode { .. } | SnapshotError::Sqlx(_) | SnapshotError::Io(_) => {
                error!("snapshot operation failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::new(status, err.to_string())
    }
}
