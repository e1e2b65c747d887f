//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::any::Any;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use compliance_client::BackendConnector;

use crate::config::CorsConfig;
use crate::error::ApiError;
use crate::gateway::log_rejections;
use crate::handlers::{health, internal, vaults, workspaces};
use crate::state::GatewayState;

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Health
/// - `GET /health` - Backend-aware health check
/// - `GET /health/live` - Liveness probe
///
/// ## Workspaces
/// - `GET /api/workspaces/:workspace_uuid` - Workspace details
/// - `GET /api/workspaces/:workspace_uuid/business-types` - Business types
/// - `GET /api/workspaces/:workspace_uuid/relations` - Relations
/// - `GET /api/workspaces/:workspace_uuid/network` - Relation network
///
/// ## Vaults
/// - `GET /api/workspaces/:workspace_uuid/vaults` - List vaults
/// - `POST /api/workspaces/:workspace_uuid/vaults` - Create vault
/// - `GET .../vaults/:vault_id/placeholders` - Placeholders
/// - `GET .../vaults/:vault_id/answers` - Answers
/// - `PUT .../vaults/:vault_id/answers` - Save answers
/// - `GET .../vaults/:vault_id/files/:file_uuid?mimetype=` - Download file
/// - `POST .../vaults/:vault_id/lock` - Lock vault
/// - `POST .../vaults/:vault_id/unlock` - Unlock vault
/// - `POST .../vaults/:vault_id/share` - Share vault
///
/// ## Internal
/// - `POST /internal/backend/reset` - Drop the shared backend client
pub fn create_router<B>(state: GatewayState<B>) -> Router
where
    B: BackendConnector,
{
    let cors = build_cors_layer(&state.config.cors);
    let state = Arc::new(state);

    Router::new()
        // Health
        .route("/health", get(health::health::<B>))
        .route("/health/live", get(health::live))
        // Workspaces
        .route(
            "/api/workspaces/:workspace_uuid",
            get(workspaces::get_workspace::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/business-types",
            get(workspaces::get_business_types::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/relations",
            get(workspaces::get_relations::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/network",
            get(workspaces::get_network::<B>),
        )
        // Vaults
        .route(
            "/api/workspaces/:workspace_uuid/vaults",
            get(vaults::list_vaults::<B>).post(vaults::create_vault::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/vaults/:vault_id/placeholders",
            get(vaults::get_placeholders::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/vaults/:vault_id/answers",
            get(vaults::get_answers::<B>).put(vaults::save_answers::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/vaults/:vault_id/files/:file_uuid",
            get(vaults::download_file::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/vaults/:vault_id/lock",
            post(vaults::lock_vault::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/vaults/:vault_id/unlock",
            post(vaults::unlock_vault::<B>),
        )
        .route(
            "/api/workspaces/:workspace_uuid/vaults/:vault_id/share",
            post(vaults::share_vault::<B>),
        )
        // Internal
        .route(
            "/internal/backend/reset",
            post(internal::reset_backend::<B>),
        )
        // Applies only to the routes registered above
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        // Middleware
        .layer(middleware::from_fn(log_rejections))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the CORS layer from configuration.
///
/// A disabled layer allows no origins, so no CORS headers are sent. Origins
/// were checked when the configuration was resolved.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    if !cors.enabled {
        return CorsLayer::new();
    }

    if cors.origins().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(AnyOrigin)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = cors
            .origins()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AnyOrigin)
            .allow_headers(AnyOrigin)
    }
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {method} {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed(format!("{method} is not supported on {}", uri.path()))
}

#[allow(clippy::needless_pass_by_value)]
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_string()))
        .unwrap_or_else(|| "unknown panic payload".to_string());

    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::Unexpected(detail).into_response()
}
