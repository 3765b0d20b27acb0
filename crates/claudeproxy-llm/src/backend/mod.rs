//! Backend adapters
//!
//! One adapter per backend composes the registry, transformer, selector and
//! HTTP client, and owns that backend's quirks. The server only sees the
//! [`Adapter`] trait.

pub mod client;
pub mod groq;
pub mod xai;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use claudeproxy_tools::ToolRegistry;

use crate::error::ProxyError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::select::{BackendProfile, Selection};
use crate::transform::{RoutePlan, StreamRewriter, to_backend, to_client_final};
use client::{BackendClient, BackendStreamItem};

/// Ordered stream of client events for one response
pub type ClientEventStream = Pin<Box<dyn Stream<Item = AnthropicStreamEvent> + Send>>;

/// A fully-wired backend
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Backend name for logs and the startup banner
    fn name(&self) -> &'static str;

    /// The registry whose tools this adapter offers
    fn registry(&self) -> &ToolRegistry;

    /// Serve one non-streaming request
    async fn handle(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProxyError>;

    /// Serve one streaming request
    async fn handle_stream(&self, request: AnthropicRequest) -> Result<ClientEventStream, ProxyError>;
}

/// Generate a response id in the client's `msg_` namespace
pub(crate) fn response_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("msg_{now:x}{count:04x}")
}

/// Build the route plan for a selection, respecting backend capabilities
pub(crate) fn plan_from(selection: &Selection, profile: &BackendProfile, attach_tools: bool) -> RoutePlan {
    RoutePlan {
        model: selection.model.clone(),
        reasoning_effort: if profile.supports_reasoning_effort {
            selection.reasoning_effort
        } else {
            None
        },
        attach_tools,
        max_tokens_ceiling: profile.max_tokens_ceiling,
    }
}

/// Translate, forward and translate back, non-streaming
pub(crate) async fn complete(
    client: &BackendClient,
    registry: &ToolRegistry,
    request: &AnthropicRequest,
    plan: &RoutePlan,
) -> Result<AnthropicResponse, ProxyError> {
    let chat_request = to_backend(request, plan, registry)
        .map_err(|e| ProxyError::InvalidClientRequest(e.to_string()))?;
    let chat_response = client.send(&chat_request).await?;
    Ok(to_client_final(chat_response, &request.model, registry))
}

/// Translate, forward and rewrite the backend stream into client events
pub(crate) async fn complete_stream(
    client: &BackendClient,
    registry: &Arc<ToolRegistry>,
    request: &AnthropicRequest,
    plan: &RoutePlan,
) -> Result<ClientEventStream, ProxyError> {
    let chat_request = to_backend(request, plan, registry)
        .map_err(|e| ProxyError::InvalidClientRequest(e.to_string()))?;
    let backend_stream = client.send_stream(&chat_request).await?;
    let rewriter = StreamRewriter::new(
        Arc::clone(registry),
        response_id(),
        request.model.clone(),
    );
    Ok(rewrite_stream(backend_stream, rewriter))
}

/// Drive a [`StreamRewriter`] over a backend stream
///
/// A backend stream that ends without its `[DONE]` marker or errors
/// mid-flight is a truncation: the client still receives a terminal
/// `message_delta`/`message_stop` pair, never an abrupt close.
fn rewrite_stream<S>(backend_stream: S, rewriter: StreamRewriter) -> ClientEventStream
where
    S: Stream<Item = Result<BackendStreamItem, client::BackendError>> + Send + 'static,
{
    struct State<S> {
        stream: S,
        rewriter: StreamRewriter,
        done: bool,
    }

    let events = futures_util::stream::unfold(
        State {
            stream: Box::pin(backend_stream),
            rewriter,
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }
            let events = match state.stream.next().await {
                Some(Ok(BackendStreamItem::Chunk(chunk))) => state.rewriter.on_chunk(&chunk),
                Some(Ok(BackendStreamItem::Done)) => {
                    state.done = true;
                    state.rewriter.finish()
                }
                None => {
                    state.done = true;
                    if state.rewriter.saw_finish_reason() {
                        state.rewriter.finish()
                    } else {
                        // EOF before a finish reason is a truncation
                        tracing::warn!("backend stream ended without a finish reason");
                        state.rewriter.fail()
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(%error, "backend stream failed mid-flight");
                    state.done = true;
                    state.rewriter.fail()
                }
            };
            Some((futures_util::stream::iter(events), state))
        },
    )
    .flatten();

    Box::pin(events)
}
