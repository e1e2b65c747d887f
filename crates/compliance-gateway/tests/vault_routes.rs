//! Vault routes: creation, answers, files, lock/unlock/share.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use compliance_client::BackendError;
use compliance_gateway::routes::MAX_BODY_BYTES;
use common::{assert_error, vault_path, TestGateway, WORKSPACE};

fn new_vault_body() -> Value {
    json!({
        "name": "Supplier audit 2024",
        "template_type": "questionnaire",
        "push_category_uuid": "b0e2d1c4-0000-4000-8000-000000000001",
        "relation_uuids": ["rel-1", "rel-2"],
    })
}

#[tokio::test]
async fn create_vault_returns_the_new_vault() {
    let gateway = TestGateway::new();

    let response = gateway
        .server
        .post(&format!("/api/workspaces/{WORKSPACE}/vaults"))
        .json(&new_vault_body())
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["id"], "vault-1");
    assert_eq!(body["relation_uuids"], json!(["rel-1", "rel-2"]));

    let listed: Value = gateway
        .server
        .get(&format!("/api/workspaces/{WORKSPACE}/vaults"))
        .await
        .json();
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn create_vault_conflict_is_forwarded() {
    let gateway = TestGateway::new();
    gateway.backend.fail_operation(
        "create_vault",
        BackendError::status(409, "a vault with this name already exists"),
    );

    let response = gateway
        .server
        .post(&format!("/api/workspaces/{WORKSPACE}/vaults"))
        .json(&new_vault_body())
        .await;

    let message = assert_error(&response, StatusCode::CONFLICT, "Failed to create vault");
    assert_eq!(message, "a vault with this name already exists");
}

#[tokio::test]
async fn create_vault_validates_every_field() {
    let gateway = TestGateway::new();
    let cases = [
        ("name", json!(42), "name is required and must be a string"),
        (
            "template_type",
            Value::Null,
            "template_type is required and must be a string",
        ),
        (
            "relation_uuids",
            json!("rel-1"),
            "relation_uuids is required and must be an array",
        ),
        (
            "relation_uuids",
            json!(["rel-1", 7]),
            "relation_uuids must be an array of strings",
        ),
    ];

    for (field, value, expected) in cases {
        let mut body = new_vault_body();
        body[field] = value;

        let response = gateway
            .server
            .post(&format!("/api/workspaces/{WORKSPACE}/vaults"))
            .json(&body)
            .await;

        let message = assert_error(&response, StatusCode::BAD_REQUEST, "Invalid request");
        assert_eq!(message, expected);
    }

    assert_eq!(gateway.backend.call_count(), 0);
    assert_eq!(gateway.connector.connect_count(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let gateway = TestGateway::new();

    let response = gateway
        .server
        .post(&format!("/api/workspaces/{WORKSPACE}/vaults"))
        .text("{\"name\": ")
        .content_type("application/json")
        .await;

    assert_error(&response, StatusCode::BAD_REQUEST, "Invalid request");
    assert_eq!(gateway.backend.call_count(), 0);
}

#[tokio::test]
async fn oversized_body_is_413_envelope() {
    let gateway = TestGateway::new();
    let mut body = new_vault_body();
    body["name"] = Value::String("x".repeat(MAX_BODY_BYTES));

    let response = gateway
        .server
        .post(&format!("/api/workspaces/{WORKSPACE}/vaults"))
        .json(&body)
        .await;

    assert_error(&response, StatusCode::PAYLOAD_TOO_LARGE, "Payload too large");
    assert_eq!(gateway.backend.call_count(), 0);
}

#[tokio::test]
async fn answers_round_trip() {
    let gateway = TestGateway::new();
    let answers = json!([
        { "placeholder": "company_name", "value": "Acme Holding" },
        { "placeholder": "iso_certified", "value": true },
    ]);

    let response = gateway
        .server
        .put(&vault_path("vault-7", "answers"))
        .json(&json!({ "answers": answers }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["saved"], 2);

    let response = gateway.server.get(&vault_path("vault-7", "answers")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["answers"], answers);
}

#[tokio::test]
async fn answers_must_be_an_array() {
    let gateway = TestGateway::new();

    let response = gateway
        .server
        .put(&vault_path("vault-7", "answers"))
        .json(&json!({ "answers": { "company_name": "Acme" } }))
        .await;

    let message = assert_error(&response, StatusCode::BAD_REQUEST, "Invalid request");
    assert_eq!(message, "answers is required and must be an array");
    assert_eq!(gateway.backend.call_count(), 0);
}

#[tokio::test]
async fn locked_vault_rejects_answers() {
    let gateway = TestGateway::new();

    let response = gateway.server.post(&vault_path("vault-3", "lock")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(gateway.backend.is_locked(WORKSPACE, "vault-3"));

    let response = gateway
        .server
        .put(&vault_path("vault-3", "answers"))
        .json(&json!({ "answers": [] }))
        .await;
    assert_error(&response, StatusCode::LOCKED, "Failed to save answers");

    let response = gateway.server.post(&vault_path("vault-3", "unlock")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["locked"], false);
    assert!(!gateway.backend.is_locked(WORKSPACE, "vault-3"));
}

#[tokio::test]
async fn lock_failure_uses_lock_category() {
    let gateway = TestGateway::new();
    gateway
        .backend
        .fail_operation("lock_vault", BackendError::status(403, "not the vault owner"));

    let response = gateway.server.post(&vault_path("vault-3", "lock")).await;

    assert_error(&response, StatusCode::FORBIDDEN, "Failed to lock vault");
}

#[tokio::test]
async fn share_requires_relation_uuid() {
    let gateway = TestGateway::new();

    let response = gateway
        .server
        .post(&vault_path("vault-1", "share"))
        .json(&json!({ "relation": "rel-9" }))
        .await;
    let message = assert_error(&response, StatusCode::BAD_REQUEST, "Invalid request");
    assert_eq!(message, "relation_uuid is required and must be a string");

    let response = gateway
        .server
        .post(&vault_path("vault-1", "share"))
        .json(&json!({ "relation_uuid": "rel-9" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["shared_with"], "rel-9");
}

#[tokio::test]
async fn placeholders_are_fetched() {
    let gateway = TestGateway::new();

    let response = gateway
        .server
        .get(&vault_path("vault-1", "placeholders"))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["vault_id"], "vault-1");
}

#[tokio::test]
async fn download_requires_mimetype() {
    let gateway = TestGateway::new();

    let response = gateway
        .server
        .get("/api/workspaces/abc/vaults/xyz/files/f1")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<Value>(),
        json!({
            "error": "Invalid request",
            "message": "mimetype query parameter is required",
        })
    );
    assert_eq!(gateway.backend.call_count(), 0);
}

#[tokio::test]
async fn download_streams_file_with_content_type() {
    let gateway = TestGateway::new();
    let contents = b"%PDF-1.7 compliance certificate".to_vec();
    gateway
        .backend
        .insert_file(WORKSPACE, "vault-1", "file-1", contents.clone());

    let response = gateway
        .server
        .get(&vault_path("vault-1", "files/file-1"))
        .add_query_param("mimetype", "application/pdf")
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.header("content-type"), "application/pdf");
    assert_eq!(response.as_bytes().as_ref(), contents.as_slice());
}

#[tokio::test]
async fn missing_file_forwards_404() {
    let gateway = TestGateway::new();

    let response = gateway
        .server
        .get(&vault_path("vault-1", "files/nope"))
        .add_query_param("mimetype", "image/png")
        .await;

    assert_error(&response, StatusCode::NOT_FOUND, "Failed to download file");
}

#[tokio::test]
async fn revoked_token_is_reported_but_client_kept() {
    let gateway = TestGateway::new();
    gateway.server.get(&vault_path("vault-1", "answers")).await;
    gateway.backend.revoke_token();

    let response = gateway.server.get(&vault_path("vault-1", "answers")).await;

    assert_error(&response, StatusCode::UNAUTHORIZED, "Failed to fetch answers");
    assert_eq!(gateway.lifecycle.unauthorized_count(), 1);
    assert_eq!(gateway.connector.connect_count(), 1);
}
