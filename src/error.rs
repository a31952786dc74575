//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the HTTP surface. Each
//! variant maps to a specific HTTP status code and structured JSON error
//! response. Registry outcomes convert into it via [`From<RegistryError>`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::RegistryError;
use crate::service::UpstreamFailure;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "entry not found: user:1",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                 |
/// |-----------|-----------------|-----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request             |
/// | 2000–2999 | Not Found       | 404 Not Found               |
/// | 3000–3999 | Server          | 500 Internal Server Error   |
/// | 5000–5999 | Upstream        | 502 Bad Gateway / 504 Gateway Timeout |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No registry entry exists for the key.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// No cached value exists for the key.
    #[error("cache key not found: {0}")]
    CacheKeyNotFound(String),

    /// The upstream operation failed.
    #[error("upstream failure: {message}")]
    UpstreamFailed {
        /// Upstream error message.
        message: String,
        /// Upstream HTTP status, when the failure was an HTTP response.
        status: Option<u16>,
    },

    /// The upstream operation did not resolve before its deadline.
    #[error("upstream timed out after {deadline_ms} ms")]
    UpstreamTimeout {
        /// Deadline that elapsed, in milliseconds.
        deadline_ms: u64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::EntryNotFound(_) => 2001,
            Self::CacheKeyNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::UpstreamFailed { .. } => 5001,
            Self::UpstreamTimeout { .. } => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::EntryNotFound(_) | Self::CacheKeyNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::UpstreamFailed {
                status: Some(status),
                ..
            } => Some(format!("upstream status {status}")),
            _ => None,
        }
    }
}

impl From<UpstreamFailure> for GatewayError {
    fn from(failure: UpstreamFailure) -> Self {
        if failure.is_invalid_path() {
            return Self::InvalidRequest(failure.to_string());
        }
        Self::UpstreamFailed {
            status: failure.status(),
            message: failure.to_string(),
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(error: RegistryError) -> Self {
        if let Some(cause) = error.upstream_cause() {
            let status = cause
                .downcast_ref::<UpstreamFailure>()
                .and_then(UpstreamFailure::status);
            return Self::UpstreamFailed {
                message: cause.to_string(),
                status,
            };
        }
        match error {
            RegistryError::Timeout { deadline_ms, .. } => Self::UpstreamTimeout { deadline_ms },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
