//! Integration tests for the shopilot web server
//!
//! Each test boots the real server on a free port with its upstream APIs
//! (GitHub meta, Copilot completions and embeddings) pointed at a wiremock
//! server.

use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::ecdsa::signature::DigestSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{EncodePublicKey, LineEnding};
use serde_json::json;
use sha2::{Digest, Sha256};
use shopilot_core::AppConfig;
use shopilot_web::{create_app, AppState};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(mock_url: &str, db_dir: &std::path::Path, skip_verification: bool) -> AppConfig {
    AppConfig {
        fqdn: "https://shopilot.example.com".to_string(),
        client_id: "test-client-id".to_string(),
        client_secret: "test-client-secret".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        db_dir: db_dir.to_path_buf(),
        data_dir: "data".into(),
        github_token: Some("local-token".to_string()),
        github_integration_id: Some("shopilot".to_string()),
        debug_skip_verification: skip_verification,
        copilot_api_url: mock_url.to_string(),
        github_api_url: mock_url.to_string(),
    }
}

async fn spawn_server(config: AppConfig) -> String {
    let state = AppState::new(config).await.unwrap();
    let app = create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[7u8; 32]).unwrap()
}

fn sign(key: &SigningKey, body: &[u8]) -> String {
    let signature: Signature = key.sign_digest(Sha256::new_with_prefix(body));
    BASE64.encode(signature.to_der())
}

async fn mount_signing_key(server: &MockServer, key: &SigningKey) {
    let pem = key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    Mock::given(method("GET"))
        .and(path("/meta/public_keys/copilot_api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "public_keys": [{"key": pem, "key_identifier": "k1", "is_current": true}]
        })))
        .mount(server)
        .await;
}

async fn mount_embeddings(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0]}]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let mock = MockServer::start().await;
    let db = tempfile::tempdir().unwrap();
    let url = spawn_server(test_config(&mock.uri(), db.path(), true)).await;

    let response = reqwest::get(format!("{}/health", url)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn search_requires_a_query_parameter() {
    let mock = MockServer::start().await;
    let db = tempfile::tempdir().unwrap();
    let url = spawn_server(test_config(&mock.uri(), db.path(), true)).await;

    let response = reqwest::get(format!("{}/search", url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = reqwest::get(format!("{}/search?query=%20", url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsigned_agent_requests_are_rejected_before_any_upstream_call() {
    let mock = MockServer::start().await;
    mount_signing_key(&mock, &signing_key()).await;
    // Rejection must happen before retrieval or completion traffic.
    mount_embeddings(&mock, 0).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock)
        .await;

    let db = tempfile::tempdir().unwrap();
    let url = spawn_server(test_config(&mock.uri(), db.path(), false)).await;
    let body = json!({"messages": [{"role": "user", "content": "hi"}]}).to_string();
    let client = reqwest::Client::new();

    // No signature header at all.
    let response = client
        .post(format!("{}/agent", url))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A signature over different bytes.
    let wrong = sign(&signing_key(), b"other payload");
    let response = client
        .post(format!("{}/agent", url))
        .header("Github-Public-Key-Signature", wrong)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_agent_request_streams_the_completion() {
    let key = signing_key();
    let mock = MockServer::start().await;
    mount_signing_key(&mock, &key).await;
    mount_embeddings(&mock, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(concat!(
                    "data: {\"id\":\"1\",\"model\":\"gpt-4\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n",
                    "data: {\"id\":\"1\",\"model\":\"gpt-4\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
                    "data: [DONE]\n\n",
                )),
        )
        .expect(1)
        .mount(&mock)
        .await;

    let db = tempfile::tempdir().unwrap();
    // Pre-seed one indexed chunk so the response carries a references event.
    std::fs::write(
        db.path().join("documents.json"),
        json!([{
            "id": "data/docs/install.md_0",
            "content": "Install Shopware with composer.",
            "embedding": [1.0, 0.0],
            "metadata": {"source": "docs", "file": "data/docs/install.md"}
        }])
        .to_string(),
    )
    .unwrap();

    let url = spawn_server(test_config(&mock.uri(), db.path(), false)).await;
    let body = json!({"messages": [{"role": "user", "content": "How do I install Shopware?"}]})
        .to_string();
    let signature = sign(&key, body.as_bytes());

    let response = reqwest::Client::new()
        .post(format!("{}/agent", url))
        .header("Github-Public-Key-Signature", signature)
        .header("X-GitHub-Token", "request-token")
        .header("Copilot-Integration-Id", "copilot-chat")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let text = response.text().await.unwrap();
    assert!(text.contains("event: copilot_references"));
    assert!(text.contains(r#""display_name":"install.md""#));
    assert!(text.contains(r#""content":"Hello""#));
    assert!(text.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn agent_rejects_a_body_that_is_not_a_conversation() {
    let mock = MockServer::start().await;
    mount_embeddings(&mock, 0).await;
    let db = tempfile::tempdir().unwrap();
    let url = spawn_server(test_config(&mock.uri(), db.path(), true)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/agent", url))
        .body("not json at all")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn authorization_redirects_to_github() {
    let mock = MockServer::start().await;
    let db = tempfile::tempdir().unwrap();
    let url = spawn_server(test_config(&mock.uri(), db.path(), true)).await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let response = client
        .get(format!("{}/auth/authorization", url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://github.com/login/oauth/authorize"));
    assert!(location.contains("client_id=test-client-id"));
    assert!(location.contains("redirect_uri=https%3A%2F%2Fshopilot.example.com%2Fauth%2Fcallback"));
}

#[tokio::test]
async fn oauth_callback_requires_a_code() {
    let mock = MockServer::start().await;
    let db = tempfile::tempdir().unwrap();
    let url = spawn_server(test_config(&mock.uri(), db.path(), true)).await;

    let response = reqwest::get(format!("{}/auth/callback", url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
