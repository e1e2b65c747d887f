//! Workspace endpoints.
//!
//! Read-only views of a workspace: its details, business types, relations
//! and relation network.

use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use compliance_client::{BackendConnector, ComplianceBackend};

use crate::error::ApiError;
use crate::gateway::{forward, path_params, query_params, require_id, RequestContext};
use crate::state::GatewayState;

// =============================================================================
// Request Types
// =============================================================================

/// Query parameters for business type listing.
#[derive(Debug, Default, Deserialize)]
pub struct BusinessTypesQuery {
    /// Only list types available for this business type.
    #[serde(default)]
    pub available_for_business_type: Option<String>,
}

/// Query parameters for the relation network.
#[derive(Debug, Default, Deserialize)]
pub struct NetworkQuery {
    /// Only include relations of this business type.
    #[serde(default)]
    pub business_type: Option<String>,
}

/// Treat `?filter=` the same as an absent filter.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn workspace_id(path: Result<Path<String>, PathRejection>) -> Result<String, ApiError> {
    require_id("workspace_uuid", path_params(path)?)
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /api/workspaces/:workspace_uuid`
///
/// # Errors
///
/// Returns an error if the workspace id is blank or the backend call fails.
pub async fn get_workspace<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let workspace_uuid = workspace_id(path)?;

    let details = forward(&state, &ctx, "Failed to fetch workspace", |client| async move {
        client.get_workspace_details(&workspace_uuid).await
    })
    .await?;

    Ok(Json(details))
}

/// `GET /api/workspaces/:workspace_uuid/business-types`
///
/// # Errors
///
/// Returns an error if the input is invalid or the backend call fails.
pub async fn get_business_types<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<BusinessTypesQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let workspace_uuid = workspace_id(path)?;
    let filter = non_empty(query_params(query)?.available_for_business_type);

    let types = forward(&state, &ctx, "Failed to fetch business types", |client| async move {
        client
            .get_business_types(&workspace_uuid, filter.as_deref())
            .await
    })
    .await?;

    Ok(Json(types))
}

/// `GET /api/workspaces/:workspace_uuid/relations`
///
/// # Errors
///
/// Returns an error if the workspace id is blank or the backend call fails.
pub async fn get_relations<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let workspace_uuid = workspace_id(path)?;

    let relations = forward(&state, &ctx, "Failed to fetch relations", |client| async move {
        client.get_relations(&workspace_uuid).await
    })
    .await?;

    Ok(Json(relations))
}

/// `GET /api/workspaces/:workspace_uuid/network`
///
/// # Errors
///
/// Returns an error if the input is invalid or the backend call fails.
pub async fn get_network<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<NetworkQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let workspace_uuid = workspace_id(path)?;
    let business_type = non_empty(query_params(query)?.business_type);

    let network = forward(&state, &ctx, "Failed to fetch network", |client| async move {
        client
            .get_network(&workspace_uuid, business_type.as_deref())
            .await
    })
    .await?;

    Ok(Json(network))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filters_are_ignored() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some(" ".into())), None);
        assert_eq!(non_empty(Some("supplier".into())), Some("supplier".into()));
        assert_eq!(non_empty(None), None);
    }
}
