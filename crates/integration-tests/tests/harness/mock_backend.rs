//! Mock chat-completions backend for end-to-end tests
//!
//! Speaks just enough of the OpenAI-style wire format: canned text or
//! tool-call responses, scripted SSE streams, failure plans for retry tests,
//! and capture of every request body the proxy sends.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

/// One step of a failure plan: a status to return before the backend recovers
#[derive(Debug, Clone, Copy)]
pub struct FailStep {
    pub status: u16,
    pub retry_after: Option<u64>,
}

#[derive(Default)]
struct MockConfig {
    /// Text returned by the default model
    text: String,
    /// Tool call returned instead of text, as (name, arguments JSON string)
    tool_call: Option<(String, String)>,
    /// Text returned when the requested model is the search model
    compound_text: Option<String>,
    /// Raw SSE `data:` payloads emitted for streaming requests
    stream_script: Option<Vec<String>>,
}

struct MockState {
    config: MockConfig,
    requests: Mutex<Vec<serde_json::Value>>,
    fail_plan: Mutex<Vec<FailStep>>,
}

/// Builder for a [`MockBackend`]
#[derive(Default)]
pub struct MockBackendBuilder {
    config: MockConfig,
    fail_plan: Vec<FailStep>,
}

impl MockBackendBuilder {
    pub fn text(mut self, text: &str) -> Self {
        self.config.text = text.to_owned();
        self
    }

    pub fn tool_call(mut self, name: &str, arguments: &str) -> Self {
        self.config.tool_call = Some((name.to_owned(), arguments.to_owned()));
        self
    }

    pub fn compound_text(mut self, text: &str) -> Self {
        self.config.compound_text = Some(text.to_owned());
        self
    }

    pub fn stream_script(mut self, payloads: Vec<String>) -> Self {
        self.config.stream_script = Some(payloads);
        self
    }

    /// Fail the first requests according to the plan, then recover
    pub fn fail_first(mut self, steps: Vec<FailStep>) -> Self {
        self.fail_plan = steps;
        self
    }

    pub async fn start(self) -> anyhow::Result<MockBackend> {
        MockBackend::start_inner(self.config, self.fail_plan).await
    }
}

/// A running mock backend
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockBackend {
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder::default()
    }

    /// Start a mock returning plain text
    pub async fn with_text(text: &str) -> anyhow::Result<Self> {
        Self::builder().text(text).start().await
    }

    async fn start_inner(config: MockConfig, fail_plan: Vec<FailStep>) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            config,
            requests: Mutex::new(Vec::new()),
            fail_plan: Mutex::new(fail_plan),
        });

        let app = Router::new()
            .route("/chat/completions", routing::post(handle_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL to hand the adapter under test
    pub fn base_url(&self) -> url::Url {
        url::Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    /// Bodies of every request received, in order
    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_completions(
    State(state): State<Arc<MockState>>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    state.requests.lock().unwrap().push(body.clone());

    if let Some(step) = {
        let mut plan = state.fail_plan.lock().unwrap();
        if plan.is_empty() { None } else { Some(plan.remove(0)) }
    } {
        let mut response = (
            StatusCode::from_u16(step.status).unwrap(),
            Json(serde_json::json!({
                "error": {"message": "mock failure", "type": "server_error"}
            })),
        )
            .into_response();
        if let Some(seconds) = step.retry_after {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_str(&seconds.to_string()).unwrap(),
            );
        }
        return response;
    }

    let model = body["model"].as_str().unwrap_or_default().to_owned();
    let streaming = body["stream"].as_bool().unwrap_or(false);

    if streaming {
        return stream_response(&state, &model);
    }

    // The search model answers with its own canned text
    if let Some(compound_text) = &state.config.compound_text
        && model.contains("compound")
    {
        return final_response(&model, compound_text, None);
    }

    match &state.config.tool_call {
        Some((name, arguments)) => final_response(&model, "", Some((name, arguments))),
        None => final_response(&model, &state.config.text, None),
    }
}

fn final_response(
    model: &str,
    text: &str,
    tool_call: Option<(&str, &str)>,
) -> axum::response::Response {
    let (content, tool_calls, finish_reason) = match tool_call {
        Some((name, arguments)) => (
            serde_json::Value::Null,
            serde_json::json!([{
                "id": "backend-call-1",
                "type": "function",
                "function": {"name": name, "arguments": arguments},
            }]),
            "tool_calls",
        ),
        None => (serde_json::json!(text), serde_json::Value::Null, "stop"),
    };

    Json(serde_json::json!({
        "id": "chatcmpl-mock-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            },
            "finish_reason": finish_reason,
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
    }))
    .into_response()
}

fn stream_response(state: &MockState, model: &str) -> axum::response::Response {
    let payloads = state.config.stream_script.clone().unwrap_or_else(|| {
        // Default script: the configured text split into word chunks
        let mut payloads = Vec::new();
        for word in state.config.text.split_whitespace() {
            payloads.push(
                serde_json::json!({
                    "id": "chatcmpl-mock-stream",
                    "object": "chat.completion.chunk",
                    "created": 1_700_000_000,
                    "model": model,
                    "choices": [{"index": 0, "delta": {"content": format!("{word} ")}}],
                })
                .to_string(),
            );
        }
        payloads.push(
            serde_json::json!({
                "id": "chatcmpl-mock-stream",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000,
                "model": model,
                "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            })
            .to_string(),
        );
        payloads.push("[DONE]".to_owned());
        payloads
    });

    let mut body = String::new();
    for payload in payloads {
        body.push_str(&format!("data: {payload}\n\n"));
    }

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}
