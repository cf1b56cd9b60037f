use crate::services::storage_service::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for errors returned by the native JSON API.
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

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 401 Unauthorized
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
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

/// HTTP status for a core error, shared by both API surfaces.
pub fn status_for(err: &StorageError) -> StatusCode {
    match err {
        StorageError::Validation(_)
        | StorageError::BucketNotEmpty(_)
        | StorageError::InvalidObjectKey(_) => StatusCode::BAD_REQUEST,
        StorageError::BucketNotFound(_) | StorageError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Forbidden => StatusCode::FORBIDDEN,
        StorageError::BucketAlreadyExists(_) | StorageError::KeyConflict(_) => {
            StatusCode::CONFLICT
        }
        StorageError::Sqlx(_) | StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::error!("storage failure: {}", err);
            return AppError::internal("internal storage error");
        }
        AppError::new(status, err.to_string())
    }
}
