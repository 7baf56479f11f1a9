//! Application Error Types
//!
//! Centralized error handling with Axum integration. The same taxonomy is
//! rendered as HTTP responses for the request/response API and as `error`
//! frames on the WebSocket gateway.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Message safe to show to a client.
    ///
    /// Server-side failures collapse to a generic message; the detail is
    /// logged here so callers never have to remember to.
    pub fn client_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg) => msg.clone(),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".into()
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                "Internal server error".into()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".into()
            }
        }
    }

    /// Whether the error is caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            AppError::Internal(_) | AppError::Storage(_) | AppError::Database(_)
        )
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, 10001),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, 10003),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, 10004),
            AppError::Conflict(_) => (StatusCode::CONFLICT, 10005),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, 10007),
            AppError::Internal(_) | AppError::Storage(_) | AppError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, 10000)
            }
        };

        let body = ErrorResponse {
            code,
            message: self.client_message(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Internal("connection refused on 10.0.0.3".into());
        assert_eq!(err.client_message(), "Internal server error");
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = AppError::Forbidden("Not a member of this room".into());
        assert_eq!(err.client_message(), "Not a member of this room");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_status_mapping() {
        let response = AppError::NotFound("Room not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::Validation("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
