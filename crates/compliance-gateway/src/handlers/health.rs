//! Health check endpoints.
//!
//! `GET /health` exercises the backend client lifecycle and reports whether a
//! client can be obtained. `GET /health/live` only proves the process answers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use compliance_client::BackendConnector;

use crate::lifecycle::ClientLifecycle;
use crate::state::GatewayState;

/// Service name reported by the health endpoints.
pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// A backend client is available.
    Healthy,
    /// No backend client could be obtained.
    Unhealthy,
}

/// Result of a health check. Never an error.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// RFC 3339 UTC time of the check.
    pub timestamp: String,
    /// Why the check failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// The check result.
    #[serde(flatten)]
    pub report: HealthReport,
    /// Service name.
    pub service: &'static str,
}

/// Attempt to obtain the backend client and report the outcome.
///
/// Failures are captured in the report, never propagated.
pub async fn check_health<B>(lifecycle: &ClientLifecycle<B>) -> HealthReport
where
    B: BackendConnector,
{
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    match lifecycle.get_client().await {
        Ok(_) => HealthReport {
            status: HealthStatus::Healthy,
            timestamp,
            error: None,
        },
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            HealthReport {
                status: HealthStatus::Unhealthy,
                timestamp,
                error: Some(err.to_string()),
            }
        }
    }
}

/// Health check handler.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "timestamp": "2024-05-01T12:00:00.000Z",
///   "service": "compliance-gateway"
/// }
/// ```
///
/// Answers `503 Service Unavailable` with `"status": "unhealthy"` and an
/// `error` field when no backend client can be obtained.
pub async fn health<B>(State(state): State<Arc<GatewayState<B>>>) -> impl IntoResponse
where
    B: BackendConnector,
{
    let report = check_health(&state.lifecycle).await;
    let status = match report.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(HealthResponse {
            report,
            service: SERVICE_NAME,
        }),
    )
}

/// Liveness probe. Does not touch the backend.
pub async fn live() -> impl IntoResponse {
    #[derive(Serialize)]
    struct LiveResponse {
        status: &'static str,
        service: &'static str,
    }

    Json(LiveResponse {
        status: "alive",
        service: SERVICE_NAME,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use compliance_client::{BackendError, Credentials, InMemoryConnector};

    use super::*;
    use crate::lifecycle::ClientSettings;

    fn lifecycle(connector: &InMemoryConnector, token: Option<&str>) -> ClientLifecycle<InMemoryConnector> {
        ClientLifecycle::new(
            connector.clone(),
            ClientSettings {
                credentials: token.map(|t| Credentials::new(t)),
                base_url_template: "http://{service}.test".into(),
                timeout: Duration::from_secs(1),
                retries: 0,
            },
        )
    }

    #[tokio::test]
    async fn healthy_when_client_available() {
        let connector = InMemoryConnector::new();
        let report = check_health(&lifecycle(&connector, Some("tok"))).await;

        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.error.is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[tokio::test]
    async fn unhealthy_without_token() {
        let connector = InMemoryConnector::new();
        let report = check_health(&lifecycle(&connector, None)).await;

        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(
            report.error.as_deref(),
            Some("backend access token is not configured")
        );
    }

    #[tokio::test]
    async fn unhealthy_on_handshake_failure() {
        let connector = InMemoryConnector::new();
        connector.set_connect_failure(Some(BackendError::Handshake("401: expired".into())));

        let report = check_health(&lifecycle(&connector, Some("tok"))).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.error.unwrap().contains("expired"));
    }

    #[tokio::test]
    async fn live_returns_ok() {
        let response = live().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn report_serializes_without_empty_error() {
        let body = serde_json::to_value(HealthResponse {
            report: HealthReport {
                status: HealthStatus::Healthy,
                timestamp: "2024-05-01T12:00:00.000Z".into(),
                error: None,
            },
            service: SERVICE_NAME,
        })
        .unwrap();

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "compliance-gateway");
        assert!(body.get("error").is_none());
    }
}
