//! Vault endpoints.
//!
//! Vault creation, encrypted answers, file downloads and the lock/unlock/share
//! operations. Payloads are passed through to the backend untouched once the
//! required fields have been checked.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::Value;

use compliance_client::{BackendConnector, ComplianceBackend, NewVault};

use crate::error::ApiError;
use crate::gateway::{
    forward, json_body, path_params, query_params, require_array, require_id, require_str,
    require_string_array, RequestContext,
};
use crate::state::GatewayState;

// =============================================================================
// Request Types
// =============================================================================

/// Query parameters for file downloads.
#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    /// Content type to serve the file with.
    #[serde(default)]
    pub mimetype: Option<String>,
}

type WorkspacePath = Result<Path<String>, PathRejection>;
type VaultPath = Result<Path<(String, String)>, PathRejection>;
type FilePath = Result<Path<(String, String, String)>, PathRejection>;

fn workspace_id(path: WorkspacePath) -> Result<String, ApiError> {
    require_id("workspace_uuid", path_params(path)?)
}

fn vault_ids(path: VaultPath) -> Result<(String, String), ApiError> {
    let (workspace_uuid, vault_id) = path_params(path)?;
    Ok((
        require_id("workspace_uuid", workspace_uuid)?,
        require_id("vault_id", vault_id)?,
    ))
}

fn parse_new_vault(body: &Value) -> Result<NewVault, ApiError> {
    Ok(NewVault {
        name: require_str(body, "name")?,
        template_type: require_str(body, "template_type")?,
        push_category_uuid: require_str(body, "push_category_uuid")?,
        relation_uuids: require_string_array(body, "relation_uuids")?,
    })
}

fn content_type(query: FileQuery) -> Result<HeaderValue, ApiError> {
    let mimetype = query
        .mimetype
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::validation("mimetype query parameter is required"))?;

    HeaderValue::from_str(&mimetype)
        .map_err(|_| ApiError::validation("mimetype query parameter is not a valid content type"))
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /api/workspaces/:workspace_uuid/vaults`
///
/// # Errors
///
/// Returns an error if the workspace id is blank or the backend call fails.
pub async fn list_vaults<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: WorkspacePath,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let workspace_uuid = workspace_id(path)?;

    let vaults = forward(&state, &ctx, "Failed to fetch vaults", |client| async move {
        client.get_all_vaults(&workspace_uuid).await
    })
    .await?;

    Ok(Json(vaults))
}

/// `POST /api/workspaces/:workspace_uuid/vaults`
///
/// Answers with the backend's representation of the new vault.
///
/// # Errors
///
/// Returns an error if a required field is missing or mistyped, or if the
/// backend call fails.
pub async fn create_vault<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: WorkspacePath,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let workspace_uuid = workspace_id(path)?;
    let vault = parse_new_vault(&json_body(body)?)?;

    let created = forward(&state, &ctx, "Failed to create vault", |client| async move {
        client.create_vault(&workspace_uuid, vault).await
    })
    .await?;

    Ok(Json(created))
}

/// `GET /api/workspaces/:workspace_uuid/vaults/:vault_id/placeholders`
///
/// # Errors
///
/// Returns an error if an id is blank or the backend call fails.
pub async fn get_placeholders<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: VaultPath,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let (workspace_uuid, vault_id) = vault_ids(path)?;

    let placeholders = forward(&state, &ctx, "Failed to fetch placeholders", |client| async move {
        client
            .get_vault_placeholders(&workspace_uuid, &vault_id)
            .await
    })
    .await?;

    Ok(Json(placeholders))
}

/// `GET /api/workspaces/:workspace_uuid/vaults/:vault_id/answers`
///
/// # Errors
///
/// Returns an error if an id is blank or the backend call fails.
pub async fn get_answers<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: VaultPath,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let (workspace_uuid, vault_id) = vault_ids(path)?;

    let answers = forward(&state, &ctx, "Failed to fetch answers", |client| async move {
        client.get_vault_answers(&workspace_uuid, &vault_id).await
    })
    .await?;

    Ok(Json(answers))
}

/// `PUT /api/workspaces/:workspace_uuid/vaults/:vault_id/answers`
///
/// Body: `{"answers": [...]}`.
///
/// # Errors
///
/// Returns an error if `answers` is missing or not an array, or if the
/// backend call fails.
pub async fn save_answers<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: VaultPath,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let (workspace_uuid, vault_id) = vault_ids(path)?;
    let answers = require_array(&json_body(body)?, "answers")?;

    let saved = forward(&state, &ctx, "Failed to save answers", |client| async move {
        client
            .save_vault_answers(&workspace_uuid, &vault_id, answers)
            .await
    })
    .await?;

    Ok(Json(saved))
}

/// `GET /api/workspaces/:workspace_uuid/vaults/:vault_id/files/:file_uuid?mimetype=`
///
/// Streams the decrypted file with the caller-supplied content type. Errors
/// after the first chunk can no longer change the status, so they are only
/// logged and the body is cut short.
///
/// # Errors
///
/// Returns an error if `mimetype` is missing, an id is blank, or the backend
/// refuses the download.
pub async fn download_file<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: FilePath,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> Result<Response, ApiError>
where
    B: BackendConnector,
{
    let (workspace_uuid, vault_id, file_uuid) = path_params(path)?;
    let workspace_uuid = require_id("workspace_uuid", workspace_uuid)?;
    let vault_id = require_id("vault_id", vault_id)?;
    let file_uuid = require_id("file_uuid", file_uuid)?;
    let content_type = content_type(query_params(query)?)?;

    let stream = forward(&state, &ctx, "Failed to download file", |client| async move {
        client
            .download_vault_file(&workspace_uuid, &vault_id, &file_uuid)
            .await
    })
    .await?;

    let path = ctx.path;
    let stream = stream.inspect_err(move |err| {
        tracing::error!(path = %path, error = ?err, "File stream aborted");
    });

    Ok(([(CONTENT_TYPE, content_type)], Body::from_stream(stream)).into_response())
}

/// `POST /api/workspaces/:workspace_uuid/vaults/:vault_id/lock`
///
/// # Errors
///
/// Returns an error if an id is blank or the backend call fails.
pub async fn lock_vault<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: VaultPath,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let (workspace_uuid, vault_id) = vault_ids(path)?;

    let locked = forward(&state, &ctx, "Failed to lock vault", |client| async move {
        client.lock_vault(&workspace_uuid, &vault_id).await
    })
    .await?;

    Ok(Json(locked))
}

/// `POST /api/workspaces/:workspace_uuid/vaults/:vault_id/unlock`
///
/// # Errors
///
/// Returns an error if an id is blank or the backend call fails.
pub async fn unlock_vault<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: VaultPath,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let (workspace_uuid, vault_id) = vault_ids(path)?;

    let unlocked = forward(&state, &ctx, "Failed to unlock vault", |client| async move {
        client.unlock_vault(&workspace_uuid, &vault_id).await
    })
    .await?;

    Ok(Json(unlocked))
}

/// `POST /api/workspaces/:workspace_uuid/vaults/:vault_id/share`
///
/// Body: `{"relation_uuid": "..."}`.
///
/// # Errors
///
/// Returns an error if `relation_uuid` is missing or not a string, or if the
/// backend call fails.
pub async fn share_vault<B>(
    State(state): State<Arc<GatewayState<B>>>,
    ctx: RequestContext,
    path: VaultPath,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
    B: BackendConnector,
{
    let (workspace_uuid, vault_id) = vault_ids(path)?;
    let relation_uuid = require_str(&json_body(body)?, "relation_uuid")?;

    let shared = forward(&state, &ctx, "Failed to share vault", |client| async move {
        client
            .share_vault(&workspace_uuid, &vault_id, &relation_uuid)
            .await
    })
    .await?;

    Ok(Json(shared))
}
