//! Tests for the OpenAI-compatible client against a mock server

use std::time::Duration;

use chunkwise_common::{ChunkwiseError, ServiceErrorKind};
use chunkwise_llm::{CompletionService, CredentialPool, ModelEndpoint, OpenAiClient, RetryPolicy};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, model: &str) -> OpenAiClient {
    OpenAiClient::new(
        format!("{}/v1/", server.uri()),
        model,
        "text-embedding-ada-002",
        Duration::from_millis(500),
    )
    .unwrap()
}

fn error_body(code: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": "rejected",
            "type": "invalid_request_error",
            "code": code
        }
    })
}

fn service_kind(err: ChunkwiseError) -> Option<ServiceErrorKind> {
    err.service_kind()
}

/// Test that chat models use /chat/completions with a bearer token
#[tokio::test]
async fn test_chat_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-3.5-turbo"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "A short summary."}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server, "gpt-3.5-turbo");
    assert_eq!(client.endpoint(), ModelEndpoint::Chat);

    let output = client.complete("sk-test", "Summarize this.").await.unwrap();
    assert_eq!(output, "A short summary.");
}

/// Test that legacy models use /completions with the "###" stop sequence
#[tokio::test]
async fn test_legacy_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({"model": "text-davinci-003", "stop": ["###"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"text": "\n\nThe king had three sons."}]
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server, "text-davinci-003");
    assert_eq!(client.endpoint(), ModelEndpoint::Completion);

    let output = client.complete("sk-test", "Summarize this.").await.unwrap();
    assert_eq!(output.trim(), "The king had three sons.");
}

#[tokio::test]
async fn test_embedding() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"model": "text-embedding-ada-002", "input": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.25, -0.5, 1.0]}]
        })))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server, "gpt-3.5-turbo");
    let embedding = client.embed("sk-test", "hello").await.unwrap();
    assert_eq!(embedding, vec![0.25, -0.5, 1.0]);
}

#[tokio::test]
async fn test_empty_completion_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "   "}}]
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, "gpt-4").complete("sk-test", "x").await.unwrap_err();
    assert_eq!(service_kind(err), Some(ServiceErrorKind::Other));
}

#[tokio::test]
async fn test_quota_classification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body("insufficient_quota")))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, "gpt-4").complete("sk-test", "x").await.unwrap_err();
    assert_eq!(service_kind(err), Some(ServiceErrorKind::Quota));
}

#[tokio::test]
async fn test_invalid_key_classification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(error_body("invalid_api_key")))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, "gpt-4").complete("sk-bad", "x").await.unwrap_err();
    assert_eq!(service_kind(err), Some(ServiceErrorKind::InvalidCredential));
}

/// Test that rate limits and server errors are transient
#[tokio::test]
async fn test_transient_classification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body("rate_limit_exceeded")))
        .mount(&mock_server)
        .await;

    let client = client(&mock_server, "gpt-4");
    let err = client.complete("sk-test", "x").await.unwrap_err();
    assert_eq!(service_kind(err), Some(ServiceErrorKind::Transient));
    let err = client.embed("sk-test", "x").await.unwrap_err();
    assert_eq!(service_kind(err), Some(ServiceErrorKind::Transient));
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(json!({"choices": []})),
        )
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, "gpt-4").complete("sk-test", "x").await.unwrap_err();
    assert_eq!(service_kind(err), Some(ServiceErrorKind::Transient));
}

#[tokio::test]
async fn test_bad_request_is_other() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body("context_length_exceeded")))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, "gpt-4").complete("sk-test", "x").await.unwrap_err();
    assert_eq!(service_kind(err), Some(ServiceErrorKind::Other));
}

/// Test that the pool rotates away from a key the server reports as out of quota
#[tokio::test]
async fn test_pool_rotates_on_quota() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-empty"))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body("insufficient_quota")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(&mock_server, "gpt-4");
    let pool = CredentialPool::new(
        vec!["sk-empty".to_string(), "sk-good".to_string()],
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(2),
        },
    )
    .unwrap();

    let client = &client;
    let output = pool
        .execute("completion", move |token| async move { client.complete(&token, "x").await })
        .await
        .unwrap();

    assert_eq!(output, "ok");
    assert!(pool.is_deprecated("sk-empty"));
    assert_eq!(pool.active_tokens(), vec!["sk-good".to_string()]);
}
