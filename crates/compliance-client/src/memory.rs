//! In-memory backend for tests.
//!
//! [`InMemoryConnector`] counts connect attempts and can be told to fail or
//! stall them; [`InMemoryBackend`] keeps workspaces, vaults, answers and files
//! in maps and can inject a failure for any operation by name.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use crate::backend::{
    BackendConnector, ByteStream, ComplianceBackend, ConnectOptions, NewVault,
    UnauthorizedCallback,
};
use crate::error::{BackendError, Result};

type VaultKey = (String, String);

#[derive(Default)]
struct Data {
    workspaces: HashMap<String, Value>,
    vaults: HashMap<String, Vec<Value>>,
    answers: HashMap<VaultKey, Vec<Value>>,
    files: HashMap<(String, String, String), Vec<u8>>,
    locked: HashSet<VaultKey>,
    shares: Vec<(VaultKey, String)>,
    failures: HashMap<String, BackendError>,
    next_vault: usize,
}

/// Fake compliance backend holding its data in memory.
#[derive(Default)]
pub struct InMemoryBackend {
    data: Mutex<Data>,
    calls: AtomicUsize,
    revoked: AtomicBool,
}

impl InMemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workspace so `get_workspace_details` finds it.
    pub fn insert_workspace(&self, workspace_uuid: impl Into<String>, details: Value) {
        self.data
            .lock()
            .workspaces
            .insert(workspace_uuid.into(), details);
    }

    /// Attach a file to a vault.
    pub fn insert_file(
        &self,
        workspace_uuid: impl Into<String>,
        vault_id: impl Into<String>,
        file_uuid: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) {
        self.data.lock().files.insert(
            (workspace_uuid.into(), vault_id.into(), file_uuid.into()),
            contents.into(),
        );
    }

    /// Make every call to `operation` fail with `error` until cleared.
    pub fn fail_operation(&self, operation: &str, error: BackendError) {
        self.data
            .lock()
            .failures
            .insert(operation.to_string(), error);
    }

    /// Remove an injected failure.
    pub fn clear_failure(&self, operation: &str) {
        self.data.lock().failures.remove(operation);
    }

    /// Reject the token on every subsequent call with a 401.
    pub fn revoke_token(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    /// Number of domain operations invoked so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether a vault is currently locked.
    #[must_use]
    pub fn is_locked(&self, workspace_uuid: &str, vault_id: &str) -> bool {
        self.data
            .lock()
            .locked
            .contains(&(workspace_uuid.to_string(), vault_id.to_string()))
    }

    fn begin(&self, operation: &str, on_unauthorized: &UnauthorizedCallback) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.revoked.load(Ordering::SeqCst) {
            on_unauthorized();
            return Err(BackendError::status(401, "access token is no longer valid"));
        }
        match self.data.lock().failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Connector handing out clients of a shared [`InMemoryBackend`].
#[derive(Clone)]
pub struct InMemoryConnector {
    backend: Arc<InMemoryBackend>,
    connects: Arc<AtomicUsize>,
    connect_delay: Arc<Mutex<Option<Duration>>>,
    connect_failure: Arc<Mutex<Option<BackendError>>>,
}

impl Default for InMemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnector {
    /// Create a connector over a fresh backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    /// Create a connector over an existing backend.
    #[must_use]
    pub fn with_backend(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            backend,
            connects: Arc::new(AtomicUsize::new(0)),
            connect_delay: Arc::new(Mutex::new(None)),
            connect_failure: Arc::new(Mutex::new(None)),
        }
    }

    /// The backend shared by every client this connector creates.
    #[must_use]
    pub fn backend(&self) -> Arc<InMemoryBackend> {
        Arc::clone(&self.backend)
    }

    /// Number of connect attempts, successful or not.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Stall each connect attempt for `delay`.
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        *self.connect_delay.lock() = delay;
    }

    /// Make connect attempts fail with `error`, or succeed again with `None`.
    pub fn set_connect_failure(&self, error: Option<BackendError>) {
        *self.connect_failure.lock() = error;
    }
}

#[async_trait]
impl BackendConnector for InMemoryConnector {
    type Client = InMemoryClient;

    async fn connect(&self, options: ConnectOptions) -> Result<InMemoryClient> {
        let connection = self.connects.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if options.credentials.access_token.expose_secret().is_empty() {
            return Err(BackendError::MissingToken);
        }
        let failure = self.connect_failure.lock().clone();
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(InMemoryClient {
            backend: Arc::clone(&self.backend),
            on_unauthorized: options.on_unauthorized,
            connection,
        })
    }
}

/// Client produced by [`InMemoryConnector`].
pub struct InMemoryClient {
    backend: Arc<InMemoryBackend>,
    on_unauthorized: UnauthorizedCallback,
    connection: usize,
}

impl fmt::Debug for InMemoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryClient")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl InMemoryClient {
    /// Sequence number of the connect attempt that produced this client.
    #[must_use]
    pub const fn connection(&self) -> usize {
        self.connection
    }

    fn begin(&self, operation: &str) -> Result<()> {
        self.backend.begin(operation, &self.on_unauthorized)
    }
}

fn key(workspace_uuid: &str, vault_id: &str) -> VaultKey {
    (workspace_uuid.to_string(), vault_id.to_string())
}

#[async_trait]
impl ComplianceBackend for InMemoryClient {
    async fn get_workspace_details(&self, workspace_uuid: &str) -> Result<Value> {
        self.begin("get_workspace_details")?;
        self.backend
            .data
            .lock()
            .workspaces
            .get(workspace_uuid)
            .cloned()
            .ok_or_else(|| BackendError::status(404, format!("workspace {workspace_uuid} not found")))
    }

    async fn get_business_types(
        &self,
        _workspace_uuid: &str,
        available_for_business_type: Option<&str>,
    ) -> Result<Value> {
        self.begin("get_business_types")?;
        Ok(json!({
            "business_types": [],
            "available_for_business_type": available_for_business_type,
        }))
    }

    async fn get_relations(&self, _workspace_uuid: &str) -> Result<Value> {
        self.begin("get_relations")?;
        Ok(json!({ "relations": [] }))
    }

    async fn get_network(
        &self,
        _workspace_uuid: &str,
        business_type: Option<&str>,
    ) -> Result<Value> {
        self.begin("get_network")?;
        Ok(json!({ "nodes": [], "business_type": business_type }))
    }

    async fn get_all_vaults(&self, workspace_uuid: &str) -> Result<Value> {
        self.begin("get_all_vaults")?;
        let vaults = self
            .backend
            .data
            .lock()
            .vaults
            .get(workspace_uuid)
            .cloned()
            .unwrap_or_default();
        Ok(Value::Array(vaults))
    }

    async fn create_vault(&self, workspace_uuid: &str, vault: NewVault) -> Result<Value> {
        self.begin("create_vault")?;
        let mut data = self.backend.data.lock();
        data.next_vault += 1;
        let created = json!({
            "id": format!("vault-{}", data.next_vault),
            "name": vault.name,
            "template_type": vault.template_type,
            "push_category_uuid": vault.push_category_uuid,
            "relation_uuids": vault.relation_uuids,
        });
        data.vaults
            .entry(workspace_uuid.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn get_vault_placeholders(
        &self,
        _workspace_uuid: &str,
        vault_id: &str,
    ) -> Result<Value> {
        self.begin("get_vault_placeholders")?;
        Ok(json!({ "vault_id": vault_id, "placeholders": [] }))
    }

    async fn get_vault_answers(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value> {
        self.begin("get_vault_answers")?;
        let answers = self
            .backend
            .data
            .lock()
            .answers
            .get(&key(workspace_uuid, vault_id))
            .cloned()
            .unwrap_or_default();
        Ok(json!({ "answers": answers }))
    }

    async fn save_vault_answers(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        answers: Vec<Value>,
    ) -> Result<Value> {
        self.begin("save_vault_answers")?;
        let mut data = self.backend.data.lock();
        let vault = key(workspace_uuid, vault_id);
        if data.locked.contains(&vault) {
            return Err(BackendError::status(423, format!("vault {vault_id} is locked")));
        }
        let saved = answers.len();
        data.answers.insert(vault, answers);
        Ok(json!({ "saved": saved }))
    }

    async fn download_vault_file(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        file_uuid: &str,
    ) -> Result<ByteStream> {
        self.begin("download_vault_file")?;
        let contents = self
            .backend
            .data
            .lock()
            .files
            .get(&(
                workspace_uuid.to_string(),
                vault_id.to_string(),
                file_uuid.to_string(),
            ))
            .cloned()
            .ok_or_else(|| BackendError::status(404, format!("file {file_uuid} not found")))?;

        // Two chunks so consumers exercise real streaming.
        let split = contents.len() / 2;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&contents[..split])),
            Ok(Bytes::copy_from_slice(&contents[split..])),
        ];
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn lock_vault(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value> {
        self.begin("lock_vault")?;
        self.backend
            .data
            .lock()
            .locked
            .insert(key(workspace_uuid, vault_id));
        Ok(json!({ "id": vault_id, "locked": true }))
    }

    async fn unlock_vault(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value> {
        self.begin("unlock_vault")?;
        self.backend
            .data
            .lock()
            .locked
            .remove(&key(workspace_uuid, vault_id));
        Ok(json!({ "id": vault_id, "locked": false }))
    }

    async fn share_vault(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        relation_uuid: &str,
    ) -> Result<Value> {
        self.begin("share_vault")?;
        self.backend
            .data
            .lock()
            .shares
            .push((key(workspace_uuid, vault_id), relation_uuid.to_string()));
        Ok(json!({ "id": vault_id, "shared_with": relation_uuid }))
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::credentials::Credentials;

    fn options(token: &str) -> ConnectOptions {
        ConnectOptions {
            credentials: Credentials::new(token),
            base_url_template: "memory://{service}".to_string(),
            timeout: Duration::from_secs(1),
            retries: 0,
            on_unauthorized: Arc::new(|| {}),
        }
    }

    #[tokio::test]
    async fn connect_counts_attempts() {
        let connector = InMemoryConnector::new();
        let first = connector.connect(options("tok")).await.unwrap();
        let second = connector.connect(options("tok")).await.unwrap();

        assert_eq!(first.connection(), 1);
        assert_eq!(second.connection(), 2);
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(
            format!("{second:?}"),
            "InMemoryClient { connection: 2, .. }"
        );
    }

    #[tokio::test]
    async fn connect_failure_is_injectable() {
        let connector = InMemoryConnector::new();
        connector.set_connect_failure(Some(BackendError::Handshake("denied".into())));

        let result = connector.connect(options("tok")).await;
        assert!(matches!(result, Err(BackendError::Handshake(_))));

        connector.set_connect_failure(None);
        assert!(connector.connect(options("tok")).await.is_ok());
    }

    #[tokio::test]
    async fn answers_round_trip() {
        let connector = InMemoryConnector::new();
        let client = connector.connect(options("tok")).await.unwrap();

        client
            .save_vault_answers("ws", "v", vec![json!({ "q": 1, "a": "yes" })])
            .await
            .unwrap();
        let answers = client.get_vault_answers("ws", "v").await.unwrap();

        assert_eq!(answers, json!({ "answers": [{ "q": 1, "a": "yes" }] }));
    }

    #[tokio::test]
    async fn locked_vault_rejects_answers() {
        let connector = InMemoryConnector::new();
        let client = connector.connect(options("tok")).await.unwrap();

        client.lock_vault("ws", "v").await.unwrap();
        let err = client.save_vault_answers("ws", "v", vec![]).await.unwrap_err();
        assert_eq!(err.http_status(), Some(423));

        client.unlock_vault("ws", "v").await.unwrap();
        assert!(client.save_vault_answers("ws", "v", vec![]).await.is_ok());
    }

    #[tokio::test]
    async fn revoked_token_notifies_hook() {
        let connector = InMemoryConnector::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let mut opts = options("tok");
        opts.on_unauthorized = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let client = connector.connect(opts).await.unwrap();

        connector.backend().revoke_token();
        let err = client.get_relations("ws").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn files_stream_in_chunks() {
        let connector = InMemoryConnector::new();
        connector.backend().insert_file("ws", "v", "f", b"hello world".to_vec());
        let client = connector.connect(options("tok")).await.unwrap();

        let chunks: Vec<Bytes> = client
            .download_vault_file("ws", "v", "f")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks.concat(), b"hello world");
    }
}
