//! Shared request pipeline.
//!
//! Every route follows the same three steps: validate the input, run exactly
//! one backend operation through the lifecycle, then map the outcome. The
//! helpers here hold the validation policy and the single forwarding
//! function, so handlers stay declarative.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::Value;

use compliance_client::BackendConnector;

use crate::error::{ApiError, NormalizedError};
use crate::state::GatewayState;

// =============================================================================
// Request context
// =============================================================================

/// Method and path of the current request, captured for logging.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP method.
    pub method: Method,
    /// Request path without the query string.
    pub path: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
        })
    }
}

/// Log every request turned away before reaching the backend.
///
/// Backend and initialization failures are logged by [`forward`]; this covers
/// the rest (validation, unknown routes, wrong methods, oversized bodies),
/// reading the [`NormalizedError`] that `ApiError` attaches to its response.
pub async fn log_rejections(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    if let Some(err) = response.extensions().get::<NormalizedError>() {
        if err.error_kind.is_rejection() {
            tracing::error!(
                method = %method,
                path = %path,
                status = err.http_status.as_u16(),
                error = err.category,
                detail = %err.message,
                "Request rejected"
            );
        }
    }

    response
}

// =============================================================================
// Validation
// =============================================================================

/// Unwrap path parameters, turning extractor failures into validation errors.
///
/// # Errors
///
/// Returns `ApiError::Validation` if the path could not be deserialized.
pub fn path_params<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(params)| params)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

/// Unwrap a query string, turning extractor failures into validation errors.
///
/// # Errors
///
/// Returns `ApiError::Validation` if the query string could not be parsed.
pub fn query_params<T: DeserializeOwned>(
    query: Result<Query<T>, QueryRejection>,
) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

/// Unwrap a JSON body, turning extractor failures into validation errors.
///
/// # Errors
///
/// Returns `ApiError::PayloadTooLarge` if the body hit the size limit, and
/// `ApiError::Validation` for a missing content type or malformed JSON.
pub fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::validation(rejection.body_text())
        }
    })
}

/// Require a non-blank identifier taken from the path.
///
/// # Errors
///
/// Returns `ApiError::Validation` if the value is empty or whitespace.
pub fn require_id(name: &str, value: String) -> Result<String, ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{name} must not be empty")));
    }
    Ok(value)
}

/// Require a string field in a JSON object.
///
/// # Errors
///
/// Returns `ApiError::Validation` if the field is missing or not a string.
pub fn require_str(body: &Value, field: &str) -> Result<String, ApiError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::validation(format!("{field} is required and must be a string")))
}

/// Require an array field in a JSON object.
///
/// # Errors
///
/// Returns `ApiError::Validation` if the field is missing or not an array.
pub fn require_array(body: &Value, field: &str) -> Result<Vec<Value>, ApiError> {
    body.get(field)
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| ApiError::validation(format!("{field} is required and must be an array")))
}

/// Require an array of strings in a JSON object.
///
/// # Errors
///
/// Returns `ApiError::Validation` if the field is missing, not an array, or
/// holds anything other than strings.
pub fn require_string_array(body: &Value, field: &str) -> Result<Vec<String>, ApiError> {
    require_array(body, field)?
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            _ => Err(ApiError::validation(format!(
                "{field} must be an array of strings"
            ))),
        })
        .collect()
}

// =============================================================================
// Forwarding
// =============================================================================

/// Run one backend operation for a validated request.
///
/// Obtains the shared client, runs `operation` with it and logs the outcome:
/// `info` on success, `error` with the original error on failure. Failures
/// are wrapped under `category`.
///
/// # Errors
///
/// Returns `ApiError::Initialization` if no client could be created, or
/// `ApiError::Backend` if the operation failed.
pub async fn forward<B, T, F, Fut>(
    state: &GatewayState<B>,
    ctx: &RequestContext,
    category: &'static str,
    operation: F,
) -> Result<T, ApiError>
where
    B: BackendConnector,
    F: FnOnce(Arc<B::Client>) -> Fut,
    Fut: Future<Output = compliance_client::Result<T>>,
{
    let client = match state.lifecycle.get_client().await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(
                method = %ctx.method,
                path = %ctx.path,
                error = ?err,
                "Backend client unavailable"
            );
            return Err(err.into());
        }
    };

    match operation(client).await {
        Ok(value) => {
            tracing::info!(method = %ctx.method, path = %ctx.path, "Request completed");
            Ok(value)
        }
        Err(err) => {
            tracing::error!(
                method = %ctx.method,
                path = %ctx.path,
                category,
                status = ?err.http_status(),
                error = ?err,
                "Backend operation failed"
            );
            Err(ApiError::backend(category, err))
        }
    }
}
