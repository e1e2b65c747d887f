//! Backend client traits.
//!
//! [`BackendConnector`] creates authenticated clients, [`ComplianceBackend`]
//! is the set of domain operations a client offers. Both are traits so the
//! gateway can be exercised against an in-memory implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::credentials::Credentials;
use crate::error::Result;

/// Raw file contents streamed back from the backend.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Callback invoked whenever the backend rejects the current token.
pub type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

/// Everything a connector needs to create a client.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Token and decryption keys.
    pub credentials: Credentials,
    /// Base URL with a `{service}` placeholder.
    pub base_url_template: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How many times a retriable failure is retried.
    pub retries: u32,
    /// Monitoring hook for 401 responses.
    pub on_unauthorized: UnauthorizedCallback,
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("credentials", &self.credentials)
            .field("base_url_template", &self.base_url_template)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// Parameters for creating a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVault {
    /// Display name.
    pub name: String,
    /// Template the vault is created from.
    pub template_type: String,
    /// Push category the vault belongs to.
    pub push_category_uuid: String,
    /// Relations the vault is addressed to.
    pub relation_uuids: Vec<String>,
}

/// Creates authenticated backend clients.
#[async_trait]
pub trait BackendConnector: Send + Sync + 'static {
    /// The client type produced by this connector.
    type Client: ComplianceBackend + 'static;

    /// Create a client and validate its credentials with the backend.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Handshake` if the backend rejects the
    /// credentials, or a transport error if it cannot be reached.
    async fn connect(&self, options: ConnectOptions) -> Result<Self::Client>;
}

/// Domain operations offered by the compliance backend.
///
/// Payloads are opaque JSON; their meaning belongs to the backend.
#[async_trait]
pub trait ComplianceBackend: Send + Sync {
    /// Fetch workspace details.
    async fn get_workspace_details(&self, workspace_uuid: &str) -> Result<Value>;

    /// List business types, optionally only those available for another type.
    async fn get_business_types(
        &self,
        workspace_uuid: &str,
        available_for_business_type: Option<&str>,
    ) -> Result<Value>;

    /// List the workspace's relations.
    async fn get_relations(&self, workspace_uuid: &str) -> Result<Value>;

    /// Fetch the relation network, optionally filtered by business type.
    async fn get_network(&self, workspace_uuid: &str, business_type: Option<&str>)
        -> Result<Value>;

    /// List all vaults in a workspace.
    async fn get_all_vaults(&self, workspace_uuid: &str) -> Result<Value>;

    /// Create a vault.
    async fn create_vault(&self, workspace_uuid: &str, vault: NewVault) -> Result<Value>;

    /// Fetch the placeholders of a vault.
    async fn get_vault_placeholders(&self, workspace_uuid: &str, vault_id: &str)
        -> Result<Value>;

    /// Fetch the decrypted answers of a vault.
    async fn get_vault_answers(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value>;

    /// Replace the answers of a vault.
    async fn save_vault_answers(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        answers: Vec<Value>,
    ) -> Result<Value>;

    /// Download a file attached to a vault.
    async fn download_vault_file(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        file_uuid: &str,
    ) -> Result<ByteStream>;

    /// Lock a vault against edits.
    async fn lock_vault(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value>;

    /// Unlock a vault.
    async fn unlock_vault(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value>;

    /// Share a vault with a relation.
    async fn share_vault(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        relation_uuid: &str,
    ) -> Result<Value>;
}
