//! Client request → backend request translation
//!
//! Pure functions; no I/O. The block structure of the client schema is
//! flattened into the backend's role-stamped message list.

use claudeproxy_tools::ToolRegistry;
use thiserror::Error;

use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicRequest,
};
use crate::protocol::chat::{
    ChatFunction, ChatFunctionCall, ChatMessage, ChatRequest, ChatTool, ChatToolCall,
    ReasoningEffort,
};

/// Routing decisions that shape the outgoing request
#[derive(Debug, Clone)]
pub struct RoutePlan {
    /// Backend model to target
    pub model: String,
    /// Effort hint, kept only when the backend supports it
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Whether to offer the registry's tools to the model
    pub attach_tools: bool,
    /// Backend's declared output-token ceiling
    pub max_tokens_ceiling: u32,
}

/// Structural errors in the client request
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    /// A `tool_result` references an id with no earlier `tool_use`
    #[error("tool_result {id} does not match any earlier tool_use")]
    OrphanToolResult { id: String },
}

/// Translate a client request into the backend's chat-completion schema
///
/// - a top-level system string becomes a leading `system` message;
/// - `text` blocks of a turn are joined with single newlines;
/// - assistant `tool_use` blocks become a `tool_calls` array;
/// - `tool_result` blocks become their own `tool`-role messages;
/// - declared client tools are replaced with the registry's catalog.
///
/// # Errors
///
/// Returns [`TransformError`] when a `tool_result` references an id that no
/// earlier `tool_use` introduced.
pub fn to_backend(
    request: &AnthropicRequest,
    plan: &RoutePlan,
    registry: &ToolRegistry,
) -> Result<ChatRequest, TransformError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system
        && !system.is_empty()
    {
        messages.push(ChatMessage::text("system", system.clone()));
    }

    let mut seen_tool_use_ids: Vec<String> = Vec::new();
    for turn in &request.messages {
        flatten_turn(turn, &mut messages, &mut seen_tool_use_ids)?;
    }

    let tools = if plan.attach_tools && request.tools.as_ref().is_some_and(|t| !t.is_empty()) {
        Some(
            registry
                .entries()
                .iter()
                .map(|entry| ChatTool {
                    tool_type: "function".to_owned(),
                    function: ChatFunction {
                        name: entry.name.to_owned(),
                        description: Some(entry.description.clone()),
                        parameters: Some(entry.parameters.clone()),
                    },
                })
                .collect(),
        )
    } else {
        None
    };
    let tool_choice = tools.as_ref().map(|_| "auto".to_owned());

    Ok(ChatRequest {
        model: plan.model.clone(),
        messages,
        temperature: request.temperature,
        max_tokens: Some(
            request
                .max_tokens
                .unwrap_or(plan.max_tokens_ceiling)
                .min(plan.max_tokens_ceiling),
        ),
        stream: if request.wants_stream() { Some(true) } else { None },
        tools,
        tool_choice,
        reasoning_effort: plan.reasoning_effort,
    })
}

/// Flatten one client turn into backend messages, in block order
fn flatten_turn(
    turn: &AnthropicMessage,
    messages: &mut Vec<ChatMessage>,
    seen_tool_use_ids: &mut Vec<String>,
) -> Result<(), TransformError> {
    let role = match turn.role.as_str() {
        "assistant" => "assistant",
        "system" => "system",
        _ => "user",
    };

    let blocks = match &turn.content {
        AnthropicContent::Text(text) => {
            messages.push(ChatMessage::text(role, text.clone()));
            return Ok(());
        }
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ChatToolCall> = Vec::new();

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => text_parts.push(text),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                seen_tool_use_ids.push(id.clone());
                let arguments =
                    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_owned());
                tool_calls.push(ChatToolCall {
                    id: id.clone(),
                    tool_type: "function".to_owned(),
                    function: ChatFunctionCall {
                        name: name.clone(),
                        arguments,
                    },
                });
            }
            AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                if !seen_tool_use_ids.contains(tool_use_id) {
                    return Err(TransformError::OrphanToolResult {
                        id: tool_use_id.clone(),
                    });
                }
                messages.push(ChatMessage {
                    role: "tool".to_owned(),
                    content: Some(content.as_ref().map(|c| c.as_text()).unwrap_or_default()),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
        }
    }

    let text = text_parts.join("\n");
    if !tool_calls.is_empty() {
        messages.push(ChatMessage {
            role: role.to_owned(),
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        });
    } else if !text.is_empty() {
        messages.push(ChatMessage::text(role, text));
    }

    Ok(())
}
