//! HTTP implementation of the backend client.
//!
//! This module provides [`HttpConnector`], which validates credentials with
//! the backend's session endpoint and hands out [`HttpBackendClient`]s that
//! talk to the workspace and vault services over REST.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use crate::backend::{
    BackendConnector, ByteStream, ComplianceBackend, ConnectOptions, NewVault,
    UnauthorizedCallback,
};
use crate::credentials::Credentials;
use crate::error::{BackendError, Result};

/// Placeholder substituted with the service name in the base URL template.
pub const SERVICE_PLACEHOLDER: &str = "{service}";

/// Header carrying a workspace's decryption key on vault requests.
pub const DECRYPTION_KEY_HEADER: &str = "x-decryption-key";

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend services addressed through the URL template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Session and token validation.
    Auth,
    /// Workspaces, business types, relations and network.
    Workspaces,
    /// Vaults, answers and files.
    Vaults,
}

impl Service {
    /// Name substituted for [`SERVICE_PLACEHOLDER`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Workspaces => "workspaces",
            Self::Vaults => "vaults",
        }
    }
}

/// Error body returned by the backend.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Connector that creates [`HttpBackendClient`]s.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

impl HttpConnector {
    /// Create a new connector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackendConnector for HttpConnector {
    type Client = HttpBackendClient;

    async fn connect(&self, options: ConnectOptions) -> Result<HttpBackendClient> {
        if options.credentials.access_token.expose_secret().is_empty() {
            return Err(BackendError::MissingToken);
        }
        if !options.base_url_template.contains(SERVICE_PLACEHOLDER) {
            return Err(BackendError::Handshake(format!(
                "base URL template must contain {SERVICE_PLACEHOLDER}"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;

        let client = HttpBackendClient {
            http,
            base_url_template: options.base_url_template,
            credentials: options.credentials,
            retries: options.retries,
            on_unauthorized: options.on_unauthorized,
        };

        client.handshake().await?;
        tracing::debug!("Backend session validated");

        Ok(client)
    }
}

/// REST client for the compliance backend.
pub struct HttpBackendClient {
    http: reqwest::Client,
    base_url_template: String,
    credentials: Credentials,
    retries: u32,
    on_unauthorized: UnauthorizedCallback,
}

impl std::fmt::Debug for HttpBackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendClient")
            .field("base_url_template", &self.base_url_template)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl HttpBackendClient {
    /// Build the URL for a service from the template plus path segments.
    ///
    /// Segments are percent-encoded individually, so identifiers can never
    /// escape their path position.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the template does not produce a valid
    /// base URL.
    pub fn endpoint(&self, service: Service, segments: &[&str]) -> Result<reqwest::Url> {
        let base = self
            .base_url_template
            .replace(SERVICE_PLACEHOLDER, service.as_str());
        let mut url = reqwest::Url::parse(&base)
            .map_err(|e| BackendError::Transport(format!("invalid backend URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Transport(format!("backend URL cannot be a base: {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn handshake(&self) -> Result<()> {
        let url = self.endpoint(Service::Auth, &["v1", "session"])?;
        self.send(|| self.http.get(url.clone()), None)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                BackendError::Status { status, message } => {
                    BackendError::Handshake(format!("{status}: {message}"))
                }
                other => other,
            })
    }

    /// Send a request, retrying retriable failures with exponential backoff.
    async fn send<F>(&self, request: F, workspace_uuid: Option<&str>) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let mut builder = request().bearer_auth(self.credentials.access_token.expose_secret());
            if let Some(key) = workspace_uuid.and_then(|ws| self.credentials.decryption_key(ws)) {
                builder = builder.header(DECRYPTION_KEY_HEADER, key.expose_secret());
            }

            let err = match builder.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => error_from_response(response).await,
                Err(e) => BackendError::Transport(e.to_string()),
            };

            if err.is_unauthorized() {
                (self.on_unauthorized)();
            }

            if attempt >= self.retries || !err.is_retriable() {
                return Err(err);
            }

            let delay = backoff(attempt);
            attempt += 1;
            tracing::warn!(
                attempt,
                retries = self.retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying backend request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn get_json(&self, url: reqwest::Url, workspace_uuid: Option<&str>) -> Result<Value> {
        let response = self.send(|| self.http.get(url.clone()), workspace_uuid).await?;
        decode_json(response).await
    }

    async fn post_json(
        &self,
        url: reqwest::Url,
        body: &Value,
        workspace_uuid: Option<&str>,
    ) -> Result<Value> {
        let response = self
            .send(|| self.http.post(url.clone()).json(body), workspace_uuid)
            .await?;
        decode_json(response).await
    }

    fn vault_url(&self, workspace_uuid: &str, vault_id: &str, tail: &[&str]) -> Result<reqwest::Url> {
        let mut segments = vec!["v1", "workspaces", workspace_uuid, "vaults", vault_id];
        segments.extend_from_slice(tail);
        self.endpoint(Service::Vaults, &segments)
    }
}

/// Delay before retry number `attempt + 1`.
fn backoff(attempt: u32) -> Duration {
    INITIAL_BACKOFF
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

async fn error_from_response(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let message = response
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or_else(|| format!("backend returned {status}"));

    BackendError::status(status.as_u16(), message)
}

async fn decode_json(response: reqwest::Response) -> Result<Value> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| BackendError::Transport(e.to_string()))?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

#[async_trait]
impl ComplianceBackend for HttpBackendClient {
    async fn get_workspace_details(&self, workspace_uuid: &str) -> Result<Value> {
        let url = self.endpoint(Service::Workspaces, &["v1", "workspaces", workspace_uuid])?;
        self.get_json(url, None).await
    }

    async fn get_business_types(
        &self,
        workspace_uuid: &str,
        available_for_business_type: Option<&str>,
    ) -> Result<Value> {
        let mut url = self.endpoint(
            Service::Workspaces,
            &["v1", "workspaces", workspace_uuid, "business-types"],
        )?;
        if let Some(business_type) = available_for_business_type {
            url.query_pairs_mut()
                .append_pair("available_for_business_type", business_type);
        }
        self.get_json(url, None).await
    }

    async fn get_relations(&self, workspace_uuid: &str) -> Result<Value> {
        let url = self.endpoint(
            Service::Workspaces,
            &["v1", "workspaces", workspace_uuid, "relations"],
        )?;
        self.get_json(url, None).await
    }

    async fn get_network(
        &self,
        workspace_uuid: &str,
        business_type: Option<&str>,
    ) -> Result<Value> {
        let mut url = self.endpoint(
            Service::Workspaces,
            &["v1", "workspaces", workspace_uuid, "network"],
        )?;
        if let Some(business_type) = business_type {
            url.query_pairs_mut()
                .append_pair("business_type", business_type);
        }
        self.get_json(url, None).await
    }

    async fn get_all_vaults(&self, workspace_uuid: &str) -> Result<Value> {
        let url = self.endpoint(
            Service::Vaults,
            &["v1", "workspaces", workspace_uuid, "vaults"],
        )?;
        self.get_json(url, Some(workspace_uuid)).await
    }

    async fn create_vault(&self, workspace_uuid: &str, vault: NewVault) -> Result<Value> {
        let url = self.endpoint(
            Service::Vaults,
            &["v1", "workspaces", workspace_uuid, "vaults"],
        )?;
        let body = serde_json::to_value(&vault).map_err(|e| BackendError::Decode(e.to_string()))?;
        self.post_json(url, &body, Some(workspace_uuid)).await
    }

    async fn get_vault_placeholders(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
    ) -> Result<Value> {
        let url = self.vault_url(workspace_uuid, vault_id, &["placeholders"])?;
        self.get_json(url, Some(workspace_uuid)).await
    }

    async fn get_vault_answers(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value> {
        let url = self.vault_url(workspace_uuid, vault_id, &["answers"])?;
        self.get_json(url, Some(workspace_uuid)).await
    }

    async fn save_vault_answers(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        answers: Vec<Value>,
    ) -> Result<Value> {
        let url = self.vault_url(workspace_uuid, vault_id, &["answers"])?;
        let body = json!({ "answers": answers });
        let response = self
            .send(|| self.http.put(url.clone()).json(&body), Some(workspace_uuid))
            .await?;
        decode_json(response).await
    }

    async fn download_vault_file(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        file_uuid: &str,
    ) -> Result<ByteStream> {
        let url = self.vault_url(workspace_uuid, vault_id, &["files", file_uuid])?;
        let response = self
            .send(|| self.http.get(url.clone()), Some(workspace_uuid))
            .await?;

        Ok(response
            .bytes_stream()
            .map_err(|e| BackendError::Transport(e.to_string()))
            .boxed())
    }

    async fn lock_vault(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value> {
        let url = self.vault_url(workspace_uuid, vault_id, &["lock"])?;
        self.post_json(url, &json!({}), Some(workspace_uuid)).await
    }

    async fn unlock_vault(&self, workspace_uuid: &str, vault_id: &str) -> Result<Value> {
        let url = self.vault_url(workspace_uuid, vault_id, &["unlock"])?;
        self.post_json(url, &json!({}), Some(workspace_uuid)).await
    }

    async fn share_vault(
        &self,
        workspace_uuid: &str,
        vault_id: &str,
        relation_uuid: &str,
    ) -> Result<Value> {
        let url = self.vault_url(workspace_uuid, vault_id, &["share"])?;
        self.post_json(
            url,
            &json!({ "relation_uuid": relation_uuid }),
            Some(workspace_uuid),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use secrecy::SecretString;

    fn options(server: &MockServer, retries: u32) -> (ConnectOptions, Arc<AtomicUsize>) {
        let unauthorized = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unauthorized);
        let mut keys = HashMap::new();
        keys.insert("ws-1".to_string(), SecretString::from("ws-1-key"));

        let options = ConnectOptions {
            credentials: Credentials::new("test-token")
                .with_decryption_keys(keys),
            base_url_template: format!("{}/{SERVICE_PLACEHOLDER}", server.uri()),
            timeout: Duration::from_secs(5),
            retries,
            on_unauthorized: Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        };
        (options, unauthorized)
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth/v1/session"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "valid": true })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(0), Duration::from_millis(100));
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(3), Duration::from_millis(800));
        assert_eq!(backoff(20), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn connect_rejects_empty_token() {
        let server = MockServer::start().await;
        let (mut options, _) = options(&server, 0);
        options.credentials = Credentials::new("");

        let result = HttpConnector::new().connect(options).await;
        assert!(matches!(result, Err(BackendError::MissingToken)));
    }

    #[tokio::test]
    async fn connect_maps_rejected_session_to_handshake_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/session"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "token revoked" })),
            )
            .mount(&server)
            .await;

        let (options, unauthorized) = options(&server, 2);
        let err = HttpConnector::new().connect(options).await.unwrap_err();

        assert!(matches!(err, BackendError::Handshake(ref msg) if msg == "401: token revoked"));
        // 401 is not retried, the hook fires exactly once
        assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_is_forwarded_with_backend_message() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/vaults/v1/workspaces/ws-1/vaults"))
            .and(header(DECRYPTION_KEY_HEADER, "ws-1-key"))
            .and(body_json(json!({
                "name": "Audit 2026",
                "template_type": "supplier",
                "push_category_uuid": "cat-1",
                "relation_uuids": ["rel-1"]
            })))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "error": "vault already exists" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (options, _) = options(&server, 3);
        let client = HttpConnector::new().connect(options).await.unwrap();
        let err = client
            .create_vault(
                "ws-1",
                NewVault {
                    name: "Audit 2026".into(),
                    template_type: "supplier".into(),
                    push_category_uuid: "cat-1".into(),
                    relation_uuids: vec!["rel-1".into()],
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), Some(409));
        assert_eq!(err.to_string(), "vault already exists");
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/workspaces/v1/workspaces/ws-1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/workspaces/v1/workspaces/ws-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "ws-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let (options, _) = options(&server, 2);
        let client = HttpConnector::new().connect(options).await.unwrap();
        let details = client.get_workspace_details("ws-1").await.unwrap();

        assert_eq!(details["uuid"], "ws-1");
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/workspaces/v1/workspaces/ws-1/relations"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let (options, _) = options(&server, 1);
        let client = HttpConnector::new().connect(options).await.unwrap();
        let err = client.get_relations("ws-1").await.unwrap_err();

        assert_eq!(err.http_status(), Some(502));
        assert_eq!(err.to_string(), "backend returned 502 Bad Gateway");
    }

    #[tokio::test]
    async fn optional_filters_become_query_parameters() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/workspaces/v1/workspaces/ws-1/network"))
            .and(query_param("business_type", "supplier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nodes": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let (options, _) = options(&server, 0);
        let client = HttpConnector::new().connect(options).await.unwrap();
        let network = client.get_network("ws-1", Some("supplier")).await.unwrap();

        assert_eq!(network, json!({ "nodes": [] }));
    }

    #[tokio::test]
    async fn unauthorized_responses_invoke_the_hook() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/vaults/v1/workspaces/ws-1/vaults"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (options, unauthorized) = options(&server, 3);
        let client = HttpConnector::new().connect(options).await.unwrap();
        let err = client.get_all_vaults("ws-1").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(unauthorized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn file_download_streams_raw_bytes() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("GET"))
            .and(path("/vaults/v1/workspaces/ws-1/vaults/v-1/files/f-1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
            .mount(&server)
            .await;

        let (options, _) = options(&server, 0);
        let client = HttpConnector::new().connect(options).await.unwrap();
        let stream = client.download_vault_file("ws-1", "v-1", "f-1").await.unwrap();
        let chunks: Vec<_> = stream.try_collect().await.unwrap();

        assert_eq!(chunks.concat(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn empty_success_body_decodes_to_null() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/vaults/v1/workspaces/ws-1/vaults/v-1/lock"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let (options, _) = options(&server, 0);
        let client = HttpConnector::new().connect(options).await.unwrap();

        assert_eq!(client.lock_vault("ws-1", "v-1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn path_segments_are_encoded() {
        let server = MockServer::start().await;
        mount_session(&server).await;
        let (options, _) = options(&server, 0);
        let client = HttpConnector::new().connect(options).await.unwrap();

        let url = client
            .endpoint(Service::Workspaces, &["v1", "workspaces", "a/b"])
            .unwrap();
        assert!(url.path().ends_with("/workspaces/v1/workspaces/a%2Fb"));
    }
}
