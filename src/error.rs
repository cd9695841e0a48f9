//! Bridge error types with HTTP status code mapping.
//!
//! [`BridgeError`] is the central error type of the crate. Variants that can
//! surface on the broker's read endpoints map to an HTTP status code and a
//! structured JSON error response.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1101,
///     "message": "unauthorized: missing or invalid token"
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

/// Crate-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1100–1199 | Authentication  | 401 Unauthorized          |
/// | 2000–2999 | Not Found       | 404 Not Found             |
/// | 3000–3999 | Server          | 500 Internal Server Error |
/// | 5000–5999 | Startup/Config  | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Missing or incorrect shared token.
    #[error("unauthorized: missing or invalid token")]
    Unauthorized,

    /// No route matched the request path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Refusing to expose the broker beyond loopback without a token.
    #[error(
        "refusing to bind {addr} without VIBE_ASSIST_TOKEN; set a token or bind to a loopback address"
    )]
    UnprotectedBind {
        /// The rejected bind address.
        addr: SocketAddr,
    },

    /// Socket or listener I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Unauthorized => 1101,
            Self::NotFound(_) => 2001,
            Self::Io(_) => 3002,
            Self::Config(_) => 5001,
            Self::UnprotectedBind { .. } => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Io(_) | Self::Config(_) | Self::UnprotectedBind { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
