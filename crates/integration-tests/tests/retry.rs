mod harness;

use std::time::Instant;

use harness::mock_backend::{FailStep, MockBackend};
use harness::server::TestServer;

fn simple_request() -> serde_json::Value {
    serde_json::json!({
        "model": "claude-3-5-sonnet",
        "messages": [{"role": "user", "content": "hi"}],
        "max_tokens": 16,
    })
}

/// Two 429s with `Retry-After: 2`, then success: the client sees one clean
/// 200, the backoff honors the header, and the retry budget is respected
#[tokio::test]
async fn rate_limits_are_retried_with_retry_after() {
    let mock = MockBackend::builder()
        .text("recovered")
        .fail_first(vec![
            FailStep { status: 429, retry_after: Some(2) },
            FailStep { status: 429, retry_after: Some(2) },
        ])
        .start()
        .await
        .unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let started = Instant::now();
    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&simple_request())
        .send()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["content"][0]["text"], "recovered");

    assert!(elapsed.as_secs_f64() >= 4.0, "waited only {elapsed:?}");
    assert_eq!(mock.request_count(), 3, "one initial attempt plus two retries");
}

#[tokio::test]
async fn server_errors_are_retried() {
    let mock = MockBackend::builder()
        .text("recovered")
        .fail_first(vec![FailStep { status: 503, retry_after: None }])
        .start()
        .await
        .unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&simple_request())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(mock.request_count(), 2);
}

#[tokio::test]
async fn exhausted_rate_limit_surfaces_as_429() {
    let mock = MockBackend::builder()
        .text("never reached")
        .fail_first(vec![
            FailStep { status: 429, retry_after: Some(1) };
            4
        ])
        .start()
        .await
        .unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&simple_request())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 429);
    assert_eq!(
        resp.headers().get("retry-after").and_then(|v| v.to_str().ok()),
        Some("1")
    );
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "rate_limit_error");
    assert_eq!(mock.request_count(), 4, "retry budget is three extra attempts");
}

#[tokio::test]
async fn auth_failures_are_not_retried() {
    let mock = MockBackend::builder()
        .text("never reached")
        .fail_first(vec![FailStep { status: 401, retry_after: None }])
        .start()
        .await
        .unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&simple_request())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "authentication_error");
    // The generic message never echoes the credential
    let message = json["error"]["message"].as_str().unwrap();
    assert!(!message.contains("sk-test"));
    assert_eq!(mock.request_count(), 1);
}
