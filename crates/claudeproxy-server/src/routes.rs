//! HTTP route handlers
//!
//! `POST /v1/messages` is the real surface; every other `/v1/*` path gets a
//! 404 shaped like the client's upstream API so its error handling keeps
//! working. Request and response bodies are never logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use claudeproxy_llm::protocol::anthropic::{AnthropicErrorResponse, AnthropicRequest};
use claudeproxy_llm::{Adapter, ProxyError};

/// Shared route state
#[derive(Clone)]
pub struct ProxyState {
    pub adapter: Arc<dyn Adapter>,
}

/// Sentinel prefix on the health body; the pre-bind port probe matches it to
/// recognise an earlier instance of this proxy
pub const HEALTH_SENTINEL: &str = "claudeproxy";

/// Handle `POST /v1/messages`
///
/// The body is taken as raw bytes so that parse failures render as the
/// client-shaped 400 instead of the framework default.
pub async fn messages(State(state): State<ProxyState>, body: Bytes) -> Response {
    let request: AnthropicRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(error) => {
            return render_error(&ProxyError::InvalidClientRequest(format!(
                "unparseable request body: {error}"
            )));
        }
    };

    if request.wants_stream() {
        match state.adapter.handle_stream(request).await {
            Ok(stream) => sse_response(stream).into_response(),
            Err(error) => render_error(&error),
        }
    } else {
        match state.adapter.handle(request).await {
            Ok(response) => Json(response).into_response(),
            Err(error) => render_error(&error),
        }
    }
}

/// Handle `GET /healthz`
pub async fn healthz(State(state): State<ProxyState>) -> Response {
    let body = format!(
        "{HEALTH_SENTINEL} {} adapter={} ok",
        env!("CARGO_PKG_VERSION"),
        state.adapter.name()
    );
    (http::StatusCode::OK, body).into_response()
}

/// Catch-all for unimplemented `/v1/*` paths
pub async fn not_found() -> Response {
    let body = AnthropicErrorResponse::new("not_found_error", "Not found");
    (http::StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Build the SSE response for a streamed completion
fn sse_response(
    stream: claudeproxy_llm::ClientEventStream,
) -> Sse<impl futures_util::Stream<Item = Result<Event, axum::Error>>> {
    let events = stream.map(|event| {
        let name = event.event_name();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event(name).data(data))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Render a proxy error as the client-shaped JSON body
pub fn render_error(error: &ProxyError) -> Response {
    let status = error.status_code();
    let message = match error {
        ProxyError::Internal(source) => {
            // Correlate without exposing internals
            let incident = incident_id();
            tracing::error!(incident, error = %source, "internal error");
            format!("an internal error occurred (incident {incident})")
        }
        other => other.client_message(),
    };

    let body = AnthropicErrorResponse::new(error.error_type(), message);
    let mut response = (status, Json(body)).into_response();

    if let ProxyError::BackendRateLimited {
        retry_after: Some(seconds),
    } = error
        && let Ok(value) = http::HeaderValue::from_str(&seconds.to_string())
    {
        response
            .headers_mut()
            .insert(http::header::RETRY_AFTER, value);
    }

    response
}

/// Stable id echoed on internal errors for log correlation
fn incident_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{now:x}-{count:04x}")
}
