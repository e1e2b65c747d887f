//! API error types and responses.
//!
//! Every failure leaving the gateway goes through [`ApiError::normalize`] and
//! is serialized as `{"error": <category>, "message": <detail>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use compliance_client::BackendError;

use crate::lifecycle::LifecycleError;

/// Message returned for every unexpected failure; details stay in the logs.
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or mistyped request input. The backend was not called.
    #[error("{0}")]
    Validation(String),

    /// The backend client could not be created.
    #[error("{0}")]
    Initialization(String),

    /// A backend operation failed.
    #[error("{category}: {source}")]
    Backend {
        /// Route-specific failure category, e.g. `Failed to create vault`.
        category: &'static str,
        /// The error returned by the backend client.
        source: BackendError,
    },

    /// No route matched.
    #[error("{0}")]
    NotFound(String),

    /// The path exists but not for this method.
    #[error("{0}")]
    MethodNotAllowed(String),

    /// The request body exceeded the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Anything else. The detail is logged, never returned.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Classification of a normalized error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request input was rejected.
    Validation,
    /// Backend client initialization failed.
    Initialization,
    /// A backend operation failed.
    Backend,
    /// Unknown route.
    NotFound,
    /// Known route, unsupported method.
    MethodNotAllowed,
    /// Oversized request body.
    PayloadTooLarge,
    /// Unexpected failure.
    Unexpected,
}

impl ErrorKind {
    /// Whether the request was turned away before any backend work, so no
    /// other layer has logged it.
    #[must_use]
    pub const fn is_rejection(self) -> bool {
        matches!(
            self,
            Self::Validation | Self::NotFound | Self::MethodNotAllowed | Self::PayloadTooLarge
        )
    }
}

/// The shape every failure takes before it is written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedError {
    /// Classification.
    pub error_kind: ErrorKind,
    /// Short category written to the `error` field.
    pub category: &'static str,
    /// Detail written to the `message` field.
    pub message: String,
    /// Response status.
    pub http_status: StatusCode,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    /// Wrap a backend failure under a route's category.
    #[must_use]
    pub const fn backend(category: &'static str, source: BackendError) -> Self {
        Self::Backend { category, source }
    }

    /// Build a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Get the HTTP status code for this error.
    ///
    /// Backend errors forward the backend's status when it is a valid error
    /// status; everything else without a status becomes 500.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Initialization(_) | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend { source, .. } => source
                .http_status()
                .and_then(|status| StatusCode::from_u16(status).ok())
                .filter(|status| status.is_client_error() || status.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Convert into the wire-level shape.
    #[must_use]
    pub fn normalize(&self) -> NormalizedError {
        let http_status = self.status_code();
        let (error_kind, category, message) = match self {
            Self::Validation(msg) => (ErrorKind::Validation, "Invalid request", msg.clone()),
            Self::Initialization(msg) => {
                (ErrorKind::Initialization, "Backend unavailable", msg.clone())
            }
            Self::Backend { category, source } => {
                (ErrorKind::Backend, *category, source.to_string())
            }
            Self::NotFound(msg) => (ErrorKind::NotFound, "Not found", msg.clone()),
            Self::MethodNotAllowed(msg) => {
                (ErrorKind::MethodNotAllowed, "Method not allowed", msg.clone())
            }
            Self::PayloadTooLarge(msg) => {
                (ErrorKind::PayloadTooLarge, "Payload too large", msg.clone())
            }
            Self::Unexpected(_) => (
                ErrorKind::Unexpected,
                "Internal server error",
                UNEXPECTED_MESSAGE.to_string(),
            ),
        };

        NormalizedError {
            error_kind,
            category,
            message,
            http_status,
        }
    }
}

impl IntoResponse for ApiError {
    /// Also attaches the [`NormalizedError`] as a response extension.
    fn into_response(self) -> Response {
        let normalized = self.normalize();
        let body = ErrorResponse {
            error: normalized.category,
            message: &normalized.message,
        };

        let mut response = (normalized.http_status, Json(body)).into_response();
        response.extensions_mut().insert(normalized);
        response
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        Self::Initialization(err.to_string())
    }
}
