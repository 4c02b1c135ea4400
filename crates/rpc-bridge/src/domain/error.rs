//! Error types for the dispatch layer.
//!
//! `ApiError` is what handlers and the dispatch glue return; it carries the
//! HTTP status the caller sees. The response never includes the message.

use crate::codec::CodecError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

/// Broad classification used to map failures onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing, malformed, mis-signed or expired credentials (401)
    Unauthorized,
    /// Well-formed request whose content cannot be decoded (400)
    BadRequest,
    /// Anything else (500)
    Internal,
}

impl ErrorKind {
    /// Status code for this kind
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error surfaced at the HTTP boundary
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: StatusCode,
    /// Error message (logged, never sent)
    pub message: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Unauthorized - missing or invalid session
    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            format!("Unauthorized: {}", details.into()),
        )
    }

    /// Bad request - undecodable body, metadata or session payload
    pub fn bad_request(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            format!("Bad request: {}", details.into()),
        )
    }

    /// Request body exceeded the configured limit
    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Payload too large: body exceeds {} bytes", limit),
        )
    }

    /// Internal error
    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error: {}", details.into()),
        )
    }

    /// Build an error from a classified failure
    pub fn from_kind(kind: ErrorKind, details: impl Into<String>) -> Self {
        match kind {
            ErrorKind::Unauthorized => Self::unauthorized(details),
            ErrorKind::BadRequest => Self::bad_request(details),
            ErrorKind::Internal => Self::internal(details),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.status.into_response()
    }
}

impl From<CodecError> for ApiError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Deserialize(_) => Self::bad_request(e.to_string()),
            CodecError::Serialize(_) => Self::internal(e.to_string()),
        }
    }
}

/// Result type for handler operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Service-level errors (startup, registration, shutdown)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(#[source] std::io::Error),

    /// Server loop terminated with an error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// Handler belongs to a different service
    #[error("remote call {call} is defined in service {expected} but being added to service {actual}")]
    ServiceMismatch {
        /// Remote call name
        call: String,
        /// Service named by the call descriptor
        expected: String,
        /// Service the handler was added to
        actual: String,
    },

    /// Two handlers registered for the same path
    #[error("a handler is already registered for path {0}")]
    DuplicatePath(String),

    /// Metric creation or registration failed
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
