//! Groq backend adapter
//!
//! Mostly a passthrough, with one quirk absorbed here: web-search
//! interception. The search-capable model rejects tool definitions, so when
//! the request carries a pending web-search call the adapter answers it
//! itself with a side-channel call and hands the client a synthesised
//! `tool_result`.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use url::Url;

use claudeproxy_tools::ToolRegistry;

use super::{Adapter, ClientEventStream, complete, complete_stream, plan_from, response_id};
use crate::backend::client::BackendClient;
use crate::error::ProxyError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessageDelta, AnthropicRequest,
    AnthropicResponse, AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicStreamMessage, AnthropicUsage,
};
use crate::protocol::chat::{ChatMessage, ChatRequest};
use crate::select::{GROQ_PROFILE, ModelSelector, WEB_SEARCH_TOOLS, user_text};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// How a request leaves the adapter
enum Interception {
    /// Forward to the backend as usual
    Plain,
    /// Answered locally with a synthesised tool result
    Injected(AnthropicResponse),
}

/// Adapter for the Groq OpenAI-compatible backend
pub struct GroqAdapter {
    client: BackendClient,
    registry: Arc<ToolRegistry>,
    selector: ModelSelector,
}

impl GroqAdapter {
    /// Build the adapter against the production endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api_key: SecretString,
        registry: Arc<ToolRegistry>,
        haiku_high_reasoning: bool,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(DEFAULT_BASE_URL).expect("valid default URL");
        Self::with_base_url(base_url, api_key, registry, haiku_high_reasoning)
    }

    /// Build the adapter against a specific endpoint (tests point this at a
    /// mock backend)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_base_url(
        base_url: Url,
        api_key: SecretString,
        registry: Arc<ToolRegistry>,
        haiku_high_reasoning: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: BackendClient::new("groq", base_url, api_key)?,
            registry,
            selector: ModelSelector::new(&GROQ_PROFILE, haiku_high_reasoning),
        })
    }

    /// Decide routing and whether this request is answered locally
    async fn route(
        &self,
        request: &AnthropicRequest,
    ) -> Result<(crate::transform::RoutePlan, Interception), ProxyError> {
        let text = user_text(request);
        let selection = self
            .selector
            .select(&request.model, &text, request.declared_tool_names());
        tracing::debug!(model = %selection.model, search = selection.web_search_required, "selected backend model");

        if selection.web_search_required {
            // The search model accepts no tool definitions
            let plan = plan_from(&selection, self.selector.profile(), false);

            if let Some((call_id, query)) = pending_search_call(request) {
                let response = match self.run_search(&query).await {
                    Ok(result) => injected_response(request, &call_id, result, false),
                    Err(error) => {
                        tracing::warn!(%error, "web search side call failed");
                        injected_response(request, &call_id, "web search unavailable".to_owned(), true)
                    }
                };
                return Ok((plan, Interception::Injected(response)));
            }

            return Ok((plan, Interception::Plain));
        }

        Ok((plan_from(&selection, self.selector.profile(), true), Interception::Plain))
    }

    /// Side-channel call answering a web search with the search-capable model
    async fn run_search(&self, query: &str) -> Result<String, ProxyError> {
        let profile = self.selector.profile();
        let model = profile
            .web_search_model
            .expect("groq profile declares a search model");

        let search_request = ChatRequest {
            model: model.to_owned(),
            messages: vec![ChatMessage::text("user", format!("Search the web for: {query}"))],
            temperature: None,
            max_tokens: Some(profile.max_tokens_ceiling),
            stream: None,
            tools: None,
            tool_choice: None,
            reasoning_effort: None,
        };

        let response = self.client.send(&search_request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(content)
    }
}

/// Find the latest web-search `tool_use` in the request that no later
/// `tool_result` answers
fn pending_search_call(request: &AnthropicRequest) -> Option<(String, String)> {
    let mut pending: Option<(String, String)> = None;

    for turn in &request.messages {
        let AnthropicContent::Blocks(blocks) = &turn.content else {
            continue;
        };
        for block in blocks {
            match block {
                AnthropicContentBlock::ToolUse { id, name, input }
                    if WEB_SEARCH_TOOLS.contains(&name.as_str()) =>
                {
                    let query = input
                        .get("query")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_owned();
                    pending = Some((id.clone(), query));
                }
                AnthropicContentBlock::ToolResult { tool_use_id, .. } => {
                    if pending.as_ref().is_some_and(|(id, _)| id == tool_use_id) {
                        pending = None;
                    }
                }
                _ => {}
            }
        }
    }

    pending
}

/// Build the response carrying a synthesised tool result
fn injected_response(
    request: &AnthropicRequest,
    call_id: &str,
    content: String,
    is_error: bool,
) -> AnthropicResponse {
    AnthropicResponse {
        id: response_id(),
        response_type: "message".to_owned(),
        role: "assistant".to_owned(),
        content: vec![AnthropicResponseBlock::ToolResult {
            tool_use_id: call_id.to_owned(),
            content,
            is_error: if is_error { Some(true) } else { None },
        }],
        model: request.model.clone(),
        stop_reason: Some("end_turn".to_owned()),
        stop_sequence: None,
        usage: AnthropicUsage::default(),
    }
}

/// Replay an injected response as a minimal event stream
///
/// The streaming grammar has no tool_result block, so the synthesised search
/// outcome streams as a single text block.
fn injected_stream(response: &AnthropicResponse) -> Vec<AnthropicStreamEvent> {
    let text = response
        .content
        .iter()
        .map(|block| match block {
            AnthropicResponseBlock::Text { text } => text.clone(),
            AnthropicResponseBlock::ToolResult { content, .. } => content.clone(),
            AnthropicResponseBlock::ToolUse { .. } => String::new(),
        })
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        AnthropicStreamEvent::MessageStart {
            message: AnthropicStreamMessage {
                id: response.id.clone(),
                message_type: "message".to_owned(),
                role: "assistant".to_owned(),
                model: response.model.clone(),
                content: Vec::new(),
                usage: AnthropicUsage::default(),
            },
        },
        AnthropicStreamEvent::ContentBlockStart {
            index: 0,
            content_block: AnthropicStreamContentBlock::Text { text: String::new() },
        },
        AnthropicStreamEvent::ContentBlockDelta {
            index: 0,
            delta: AnthropicStreamDelta::TextDelta { text },
        },
        AnthropicStreamEvent::ContentBlockStop { index: 0 },
        AnthropicStreamEvent::MessageDelta {
            delta: AnthropicMessageDelta {
                stop_reason: Some("end_turn".to_owned()),
                stop_sequence: None,
            },
            usage: Some(AnthropicUsage::default()),
        },
        AnthropicStreamEvent::MessageStop,
    ]
}

#[async_trait]
impl Adapter for GroqAdapter {
    fn name(&self) -> &'static str {
        "groq"
    }

    fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    async fn handle(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProxyError> {
        match self.route(&request).await? {
            (_, Interception::Injected(response)) => Ok(response),
            (plan, Interception::Plain) => {
                complete(&self.client, &self.registry, &request, &plan).await
            }
        }
    }

    async fn handle_stream(&self, request: AnthropicRequest) -> Result<ClientEventStream, ProxyError> {
        match self.route(&request).await? {
            (_, Interception::Injected(response)) => {
                let events = injected_stream(&response);
                Ok(Box::pin(futures_util::stream::iter(events)))
            }
            (plan, Interception::Plain) => {
                complete_stream(&self.client, &self.registry, &request, &plan).await
            }
        }
    }
}
