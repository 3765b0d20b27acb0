mod harness;

use harness::mock_backend::MockBackend;
use harness::server::TestServer;

#[tokio::test]
async fn plain_text_non_streaming() {
    let mock = MockBackend::with_text("hi").await.unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Say hi."}],
            "max_tokens": 16,
            "stream": false,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();

    assert_eq!(json["type"], "message");
    assert_eq!(json["role"], "assistant");
    assert_eq!(json["model"], "claude-3-5-sonnet");
    assert_eq!(json["stop_reason"], "end_turn");
    assert_eq!(json["content"], serde_json::json!([{"type": "text", "text": "hi"}]));
    assert_eq!(json["usage"]["input_tokens"], 10);
    assert_eq!(json["usage"]["output_tokens"], 5);
}

#[tokio::test]
async fn unparseable_body_is_a_client_shaped_400() {
    let mock = MockBackend::with_text("unused").await.unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert_eq!(mock.request_count(), 0, "nothing should reach the backend");
}

#[tokio::test]
async fn orphan_tool_result_is_rejected() {
    let mock = MockBackend::with_text("unused").await.unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-3-5-sonnet",
            "messages": [
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "call_nowhere", "content": "x"},
                ]},
            ],
            "max_tokens": 16,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn incoming_authorization_is_ignored() {
    let mock = MockBackend::with_text("hi").await.unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    // The client may be configured with a dummy key; the proxy must not care
    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .header("x-api-key", "dummy_key")
        .header("authorization", "Bearer dummy_key")
        .json(&serde_json::json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Say hi."}],
            "max_tokens": 16,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unknown_fields_are_ignored() {
    let mock = MockBackend::with_text("hi").await.unwrap();
    let server = TestServer::start_xai(mock.base_url()).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&serde_json::json!({
            "model": "claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "Say hi."}],
            "max_tokens": 16,
            "metadata": {"user_id": "u1"},
            "top_k": 40,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
}
