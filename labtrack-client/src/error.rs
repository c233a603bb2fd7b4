//! Error types for labtrack-client
//!
//! - `ClientError`: REST wrapper and collaborator failures
//! - `ApiError`: mock backend responses (JSON error bodies)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure talking to the backend
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, TLS, timeout, or request construction failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend rejected the bearer token (local artifacts already cleared)
    #[error("Not authenticated")]
    Unauthorized,

    /// Non-success status other than 401
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Base URL or path could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// labtrack-common error
    #[error("Common error: {0}")]
    Common(#[from] labtrack_common::Error),
}

/// Result type for backend calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Mock backend error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict (409) - e.g., email already registered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the configured size (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Upload MIME type not accepted (415)
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "TOO_LARGE"),
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_TYPE")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for mock backend handlers
pub type ApiResult<T> = Result<T, ApiError>;
