//! Internal API endpoints.
//!
//! Operator endpoints that are not part of the public surface.
//!
//! # Security
//!
//! Internal endpoints should be protected by network policies so that only
//! operators and in-cluster tooling can reach them.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use compliance_client::BackendConnector;

use crate::gateway::RequestContext;
use crate::lifecycle::LifecycleState;
use crate::state::GatewayState;

/// Response for a backend client reset.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    /// Always `reset`.
    pub status: &'static str,
    /// Lifecycle state before the reset.
    pub previous_state: LifecycleState,
}

/// Drop the shared backend client.
///
/// The next request or health check creates a fresh client from the
/// configured credentials. Use this after rotating the access token or when
/// the backend keeps rejecting the current one.
pub async fn reset_backend<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
) -> Json<ResetResponse>
where
    B: BackendConnector,
{
    let previous_state = state.lifecycle.reset();

    tracing::info!(
        method = %ctx.method,
        path = %ctx.path,
        previous_state = ?previous_state,
        unauthorized_count = state.lifecycle.unauthorized_count(),
        "Backend client reset requested"
    );

    Json(ResetResponse {
        status: "reset",
        previous_state,
    })
}
