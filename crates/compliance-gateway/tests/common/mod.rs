//! Shared harness for gateway route tests.
//!
//! Builds the real router over an in-memory backend so every test exercises
//! routing, validation, the client lifecycle and error mapping together.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::{TestResponse, TestServer};
use serde_json::Value;

use compliance_client::{Credentials, InMemoryBackend, InMemoryConnector};
use compliance_gateway::{
    create_router, ClientLifecycle, ClientSettings, GatewayState, ResolvedConfig,
};

/// Workspace registered in every fresh backend.
pub const WORKSPACE: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

/// A running gateway plus handles on its fake backend.
pub struct TestGateway {
    pub server: TestServer,
    pub connector: InMemoryConnector,
    pub backend: Arc<InMemoryBackend>,
    pub lifecycle: Arc<ClientLifecycle<InMemoryConnector>>,
}

impl TestGateway {
    /// Gateway with a configured access token.
    pub fn new() -> Self {
        Self::with_token(Some("test-token"))
    }

    /// Gateway started without `BACKEND_ACCESS_TOKEN`.
    pub fn without_token() -> Self {
        Self::with_token(None)
    }

    fn with_token(token: Option<&str>) -> Self {
        let connector = InMemoryConnector::new();
        let backend = connector.backend();
        backend.insert_workspace(
            WORKSPACE,
            serde_json::json!({ "uuid": WORKSPACE, "name": "Acme Holding" }),
        );

        let settings = ClientSettings {
            credentials: token.map(|t| Credentials::new(t)),
            base_url_template: "http://{service}.backend.test".to_string(),
            timeout: Duration::from_secs(5),
            retries: 0,
        };
        let lifecycle = Arc::new(ClientLifecycle::new(connector.clone(), settings));
        let state = GatewayState::new(Arc::clone(&lifecycle), ResolvedConfig::default());
        let server = TestServer::new(create_router(state)).expect("failed to start test server");

        Self {
            server,
            connector,
            backend,
            lifecycle,
        }
    }
}

/// Path of a vault sub-resource in the default workspace.
pub fn vault_path(vault_id: &str, rest: &str) -> String {
    format!("/api/workspaces/{WORKSPACE}/vaults/{vault_id}/{rest}")
}

/// Assert an error envelope and return its `message`.
pub fn assert_error(response: &TestResponse, status: StatusCode, error: &str) -> String {
    assert_eq!(response.status_code(), status, "body: {}", response.text());
    let body: Value = response.json();
    assert_eq!(body["error"], error, "body: {body}");
    body["message"]
        .as_str()
        .expect("error envelope has a string message")
        .to_string()
}
