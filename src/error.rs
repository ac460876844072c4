use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::session::SessionError;

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Policy rejections vs. faults
///
/// `Unauthorized`, `Forbidden`, `TooManyRequests` and `BadRequest` are
/// expected, user-visible outcomes and are logged at debug level only.
/// `Session`, `Internal` and `ConfigError` are server faults and are logged
/// at error level with full details; clients only see a generic message.
///
/// Missing authentication on a page route is not an error at all: the
/// authorization layer answers it with a redirect to the login page.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid credentials: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests, retry after {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Session(SessionError::MissingField(_)) => StatusCode::BAD_REQUEST,
            AppError::Session(SessionError::TokenGeneration(_))
            | AppError::Internal(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let (error_type, message) = match &self {
            AppError::Session(SessionError::TokenGeneration(_)) => (
                "session_unavailable",
                "Could not start a session. Please try again later.".to_string(),
            ),
            AppError::Internal(_) => (
                "internal_error",
                "An internal error occurred. Please contact support if the issue persists."
                    .to_string(),
            ),
            AppError::ConfigError(_) => (
                "config_error",
                "Service configuration error. Please contact support.".to_string(),
            ),

            // Client errors - safe to show the message as it's user-facing
            AppError::Session(e @ SessionError::MissingField(_)) => ("bad_request", e.to_string()),
            AppError::Unauthorized(msg) => ("unauthorized", msg.clone()),
            AppError::Forbidden(msg) => ("forbidden", msg.clone()),
            AppError::BadRequest(msg) => ("bad_request", msg.clone()),
            AppError::TooManyRequests { .. } => (
                "too_many_requests",
                "Too many attempts. Please wait before retrying.".to_string(),
            ),
        };

        let body = axum::Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        match self {
            AppError::TooManyRequests { retry_after_secs } => (
                status,
                [(RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
