//! Backend response → client response translation

use std::hash::{Hash, Hasher};

use claudeproxy_tools::ToolRegistry;

use crate::protocol::anthropic::{AnthropicResponse, AnthropicResponseBlock, AnthropicUsage};
use crate::protocol::chat::{ChatResponse, ChatUsage};

/// Derive a fresh client-visible call id from a backend call id
///
/// The id is a stable hash of the backend's id, so a retried request maps the
/// same backend call to the same client id.
pub fn stable_call_id(backend_id: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    backend_id.hash(&mut hasher);
    format!("call_{:016x}", hasher.finish())
}

/// Map a backend finish reason onto the client's stop reasons
pub fn map_finish_reason(finish_reason: Option<&str>) -> &'static str {
    match finish_reason {
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        // "stop" and anything unrecognised end the turn
        _ => "end_turn",
    }
}

pub(crate) fn usage_from(usage: Option<ChatUsage>) -> AnthropicUsage {
    usage.map_or_else(AnthropicUsage::default, |u| AnthropicUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    })
}

/// Translate a final backend response into the client's message shape
///
/// Takes the first choice. Tool calls are normalised through the registry;
/// calls whose argument string does not parse as JSON degrade to a text block
/// carrying the raw string, and calls whose arguments fail validation degrade
/// to an `is_error` tool result so the model can self-correct next turn.
pub fn to_client_final(
    response: ChatResponse,
    original_model: &str,
    registry: &ToolRegistry,
) -> AnthropicResponse {
    let choice = response.choices.into_iter().next();

    let mut content = Vec::new();
    let mut saw_tool_use = false;
    let mut finish_reason = None;

    if let Some(choice) = choice {
        finish_reason = choice.finish_reason;

        if let Some(text) = choice.message.content
            && !text.is_empty()
        {
            content.push(AnthropicResponseBlock::Text { text });
        }

        for call in choice.message.tool_calls.unwrap_or_default() {
            let id = stable_call_id(&call.id);
            let raw_args = call.function.arguments;

            let parsed: serde_json::Value = match serde_json::from_str(&raw_args) {
                Ok(value) => value,
                Err(error) => {
                    // Unparseable arguments: degrade the whole call to text
                    // rather than emit a tool_use the client cannot run
                    tracing::warn!(
                        tool = %call.function.name,
                        %error,
                        "tool call arguments did not parse; degrading to text"
                    );
                    content.push(AnthropicResponseBlock::Text { text: raw_args });
                    continue;
                }
            };

            match registry.canonical_args(&call.function.name, parsed) {
                Ok((name, input)) => {
                    saw_tool_use = true;
                    content.push(AnthropicResponseBlock::ToolUse { id, name, input });
                }
                Err(error) => {
                    tracing::warn!(%error, "tool call failed validation; returning error result");
                    content.push(AnthropicResponseBlock::ToolResult {
                        tool_use_id: id,
                        content: raw_args,
                        is_error: Some(true),
                    });
                }
            }
        }
    }

    let stop_reason = if saw_tool_use {
        "tool_use"
    } else {
        map_finish_reason(finish_reason.as_deref())
    };

    AnthropicResponse {
        id: response.id,
        response_type: "message".to_owned(),
        role: "assistant".to_owned(),
        content,
        model: original_model.to_owned(),
        stop_reason: Some(stop_reason.to_owned()),
        stop_sequence: None,
        usage: usage_from(response.usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::request::{RoutePlan, to_backend};
    use claudeproxy_tools::OsFamily;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        ToolRegistry::for_os(OsFamily::Unix)
    }

    fn text_response(content: &str, finish_reason: &str) -> ChatResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "model": "backend-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": finish_reason,
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
        }))
        .unwrap()
    }

    #[test]
    fn text_response_maps_to_single_text_block() {
        let response = to_client_final(text_response("hi", "stop"), "claude-3-5-sonnet", &registry());
        assert_eq!(response.model, "claude-3-5-sonnet");
        assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 5);
        match &response.content[..] {
            [AnthropicResponseBlock::Text { text }] => assert_eq!(text, "hi"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("stop")), "end_turn");
        assert_eq!(map_finish_reason(Some("length")), "max_tokens");
        assert_eq!(map_finish_reason(Some("tool_calls")), "tool_use");
        assert_eq!(map_finish_reason(Some("content_filter")), "end_turn");
        assert_eq!(map_finish_reason(None), "end_turn");
    }

    #[test]
    fn tool_call_is_normalised_and_renamed() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-2",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "backend-call-1",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"path\":\"/tmp/x\"}"},
                    }],
                },
                "finish_reason": "tool_calls",
            }],
        }))
        .unwrap();

        let out = to_client_final(response, "claude-3-5-sonnet", &registry());
        assert_eq!(out.stop_reason.as_deref(), Some("tool_use"));
        match &out.content[..] {
            [AnthropicResponseBlock::ToolUse { id, name, input }] => {
                assert!(id.starts_with("call_"), "id {id} not call_-prefixed");
                assert_eq!(id.len(), "call_".len() + 16);
                assert_eq!(name, "read_file");
                assert_eq!(input, &json!({"file_path": "/tmp/x"}));
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn todo_list_of_strings_is_coerced() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-3",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "c9",
                        "type": "function",
                        "function": {
                            "name": "manage_todos",
                            "arguments": "{\"tasks\":[\"write spec\",\"review\"]}",
                        },
                    }],
                },
                "finish_reason": "tool_calls",
            }],
        }))
        .unwrap();

        let out = to_client_final(response, "claude-3-5-sonnet", &registry());
        match &out.content[..] {
            [AnthropicResponseBlock::ToolUse { name, input, .. }] => {
                assert_eq!(name, "manage_todos");
                assert_eq!(
                    input,
                    &json!({"todos": [
                        {"content": "write spec", "status": "pending", "activeForm": "writing spec"},
                        {"content": "review", "status": "pending", "activeForm": "reviewing"},
                    ]})
                );
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn unparseable_arguments_degrade_to_text() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-4",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{not json"},
                    }],
                },
                "finish_reason": "tool_calls",
            }],
        }))
        .unwrap();

        let out = to_client_final(response, "m", &registry());
        match &out.content[..] {
            [AnthropicResponseBlock::Text { text }] => assert_eq!(text, "{not json"),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn invalid_arguments_become_error_tool_result() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-5",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "edit_file", "arguments": "{\"file_path\":\"/a\"}"},
                    }],
                },
                "finish_reason": "tool_calls",
            }],
        }))
        .unwrap();

        let out = to_client_final(response, "m", &registry());
        match &out.content[..] {
            [AnthropicResponseBlock::ToolResult {
                is_error, content, ..
            }] => {
                assert_eq!(*is_error, Some(true));
                assert!(content.contains("file_path"));
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn call_ids_are_stable_across_retries() {
        assert_eq!(stable_call_id("backend-1"), stable_call_id("backend-1"));
        assert_ne!(stable_call_id("backend-1"), stable_call_id("backend-2"));
    }

    #[test]
    fn absent_usage_maps_to_zero() {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "x",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop",
            }],
        }))
        .unwrap();
        let out = to_client_final(response, "m", &registry());
        assert_eq!(out.usage.input_tokens, 0);
        assert_eq!(out.usage.output_tokens, 0);
    }

    /// Round-trip law: translating a plain-text assistant reply back into a
    /// backend request preserves the joined text
    #[test]
    fn plain_text_round_trip_is_identity_on_content() {
        let reply = to_client_final(text_response("the answer\nis 42", "stop"), "m", &registry());

        let follow_up: crate::protocol::anthropic::AnthropicRequest =
            serde_json::from_value(json!({
                "model": "m",
                "messages": [
                    {"role": "assistant", "content": serde_json::to_value(&reply.content).unwrap()},
                ],
            }))
            .unwrap();

        let plan = RoutePlan {
            model: "m".to_owned(),
            reasoning_effort: None,
            attach_tools: false,
            max_tokens_ceiling: 8192,
        };
        let chat = to_backend(&follow_up, &plan, &registry()).unwrap();

        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(
            normalize(chat.messages[0].content.as_deref().unwrap()),
            normalize("the answer\nis 42")
        );
    }
}
