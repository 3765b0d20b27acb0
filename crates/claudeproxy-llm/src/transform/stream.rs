//! Streaming response rewriter
//!
//! Converts a backend chat-completion chunk stream into the client's SSE
//! event sequence. Text streams through as it arrives; tool calls accumulate
//! per backend index and are emitted as one atomic block
//! (`content_block_start` → one `content_block_delta` → `content_block_stop`)
//! the moment their argument JSON parses, so the client never sees a partial
//! or unparseable argument fragment and two tool blocks never interleave.

use std::sync::Arc;

use claudeproxy_tools::ToolRegistry;

use crate::protocol::anthropic::{
    AnthropicMessageDelta, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicStreamMessage, AnthropicUsage,
};
use crate::protocol::chat::{ChatStreamChunk, ChatStreamToolCall, ChatUsage};
use crate::transform::response::{map_finish_reason, stable_call_id, usage_from};

/// Per-call accumulator
///
/// Tracks the two states that matter: "not yet parseable" (keep buffering)
/// and "parsed once" (block emitted, further fragments ignored).
struct CallAccum {
    backend_index: u32,
    id: String,
    name: String,
    buf: String,
    emitted: bool,
}

/// State machine converting one backend stream into client events
pub struct StreamRewriter {
    registry: Arc<ToolRegistry>,
    response_id: String,
    model: String,
    started: bool,
    finished: bool,
    /// Next client-visible content block index
    next_index: u32,
    /// Index of the currently open text block, if any
    open_text: Option<u32>,
    calls: Vec<CallAccum>,
    finish_reason: Option<String>,
    usage: Option<ChatUsage>,
}

impl StreamRewriter {
    pub fn new(registry: Arc<ToolRegistry>, response_id: String, model: String) -> Self {
        Self {
            registry,
            response_id,
            model,
            started: false,
            finished: false,
            next_index: 0,
            open_text: None,
            calls: Vec::new(),
            finish_reason: None,
            usage: None,
        }
    }

    /// Whether the backend delivered a finish reason
    ///
    /// A stream that ends without one was truncated, not completed.
    pub const fn saw_finish_reason(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Convert one backend chunk into zero or more client events
    pub fn on_chunk(&mut self, chunk: &ChatStreamChunk) -> Vec<AnthropicStreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        for choice in &chunk.choices {
            if let Some(text) = &choice.delta.content
                && !text.is_empty()
            {
                self.ensure_started(&mut events);
                let index = self.ensure_text_open(&mut events);
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index,
                    delta: AnthropicStreamDelta::TextDelta { text: text.clone() },
                });
            }

            for fragment in choice.delta.tool_calls.as_deref().unwrap_or_default() {
                self.ensure_started(&mut events);
                self.accumulate_call(fragment, &mut events);
            }

            if let Some(reason) = &choice.finish_reason {
                self.finish_reason = Some(reason.clone());
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        events
    }

    /// Close the stream normally, flushing pending blocks and terminal frames
    pub fn finish(&mut self) -> Vec<AnthropicStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        self.ensure_started(&mut events);
        self.close_text(&mut events);
        self.flush_pending_calls(&mut events);

        let stop_reason = map_finish_reason(self.finish_reason.as_deref());
        events.push(AnthropicStreamEvent::MessageDelta {
            delta: AnthropicMessageDelta {
                stop_reason: Some(stop_reason.to_owned()),
                stop_sequence: None,
            },
            usage: Some(usage_from(self.usage)),
        });
        events.push(AnthropicStreamEvent::MessageStop);
        events
    }

    /// Terminate after a mid-stream failure
    ///
    /// The client always receives a terminal frame pair; never an abrupt
    /// close without one.
    pub fn fail(&mut self) -> Vec<AnthropicStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        self.ensure_started(&mut events);
        self.close_text(&mut events);
        events.push(AnthropicStreamEvent::MessageDelta {
            delta: AnthropicMessageDelta {
                stop_reason: Some("error".to_owned()),
                stop_sequence: None,
            },
            usage: Some(usage_from(self.usage)),
        });
        events.push(AnthropicStreamEvent::MessageStop);
        events
    }

    fn ensure_started(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        if self.started {
            return;
        }
        self.started = true;
        events.push(AnthropicStreamEvent::MessageStart {
            message: AnthropicStreamMessage {
                id: self.response_id.clone(),
                message_type: "message".to_owned(),
                role: "assistant".to_owned(),
                model: self.model.clone(),
                content: Vec::new(),
                usage: AnthropicUsage::default(),
            },
        });
    }

    fn ensure_text_open(&mut self, events: &mut Vec<AnthropicStreamEvent>) -> u32 {
        if let Some(index) = self.open_text {
            return index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.open_text = Some(index);
        events.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamContentBlock::Text {
                text: String::new(),
            },
        });
        index
    }

    fn close_text(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        if let Some(index) = self.open_text.take() {
            events.push(AnthropicStreamEvent::ContentBlockStop { index });
        }
    }

    /// Fold one tool-call fragment into its accumulator, emitting the block
    /// if its arguments just became parseable
    fn accumulate_call(
        &mut self,
        fragment: &ChatStreamToolCall,
        events: &mut Vec<AnthropicStreamEvent>,
    ) {
        let pos = match self
            .calls
            .iter()
            .position(|c| c.backend_index == fragment.index)
        {
            Some(pos) => pos,
            None => {
                self.calls.push(CallAccum {
                    backend_index: fragment.index,
                    id: fragment.id.clone().unwrap_or_default(),
                    name: fragment
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default(),
                    buf: String::new(),
                    emitted: false,
                });
                self.calls.len() - 1
            }
        };

        {
            let call = &mut self.calls[pos];
            if let Some(id) = &fragment.id
                && call.id.is_empty()
            {
                call.id = id.clone();
            }
            if let Some(function) = &fragment.function {
                if let Some(name) = &function.name
                    && call.name.is_empty()
                {
                    call.name = name.clone();
                }
                if let Some(arguments) = &function.arguments {
                    call.buf.push_str(arguments);
                }
            }
        }

        let (ready, parsed) = {
            let call = &self.calls[pos];
            if call.emitted || call.buf.is_empty() {
                (false, None)
            } else {
                match serde_json::from_str::<serde_json::Value>(&call.buf) {
                    Ok(value) => (true, Some(value)),
                    Err(_) => (false, None),
                }
            }
        };

        if ready {
            self.emit_call(pos, parsed.unwrap_or_default(), events);
        }
    }

    /// Emit a complete tool_use block for a parsed call
    fn emit_call(
        &mut self,
        pos: usize,
        parsed: serde_json::Value,
        events: &mut Vec<AnthropicStreamEvent>,
    ) {
        self.close_text(events);

        let (backend_name, backend_id) = {
            let call = &self.calls[pos];
            (call.name.clone(), call.id.clone())
        };

        let (name, input) = match self.registry.canonical_args(&backend_name, parsed.clone()) {
            Ok(pair) => pair,
            Err(error) => {
                // Validation failed; the parsed-but-unnormalised arguments
                // are still well-formed JSON, so pass them through
                tracing::warn!(%error, "streamed tool call failed validation");
                (
                    self.registry.reverse_tool_name(&backend_name).to_owned(),
                    parsed,
                )
            }
        };

        let index = self.next_index;
        self.next_index += 1;

        events.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicStreamContentBlock::ToolUse {
                id: stable_call_id(&backend_id),
                name,
                input: serde_json::json!({}),
            },
        });
        events.push(AnthropicStreamEvent::ContentBlockDelta {
            index,
            delta: AnthropicStreamDelta::InputJsonDelta {
                partial_json: input.to_string(),
            },
        });
        events.push(AnthropicStreamEvent::ContentBlockStop { index });

        self.calls[pos].emitted = true;
    }

    /// At stream end, settle calls whose arguments never parsed mid-stream
    fn flush_pending_calls(&mut self, events: &mut Vec<AnthropicStreamEvent>) {
        for pos in 0..self.calls.len() {
            if self.calls[pos].emitted {
                continue;
            }
            let buf = self.calls[pos].buf.clone();
            if buf.is_empty() {
                // No-argument call; an empty object is a complete input
                self.emit_call(pos, serde_json::json!({}), events);
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&buf) {
                Ok(parsed) => self.emit_call(pos, parsed, events),
                Err(error) => {
                    // Arguments never became valid JSON; open and close the
                    // block with an empty input rather than expose fragments
                    tracing::warn!(
                        tool = %self.calls[pos].name,
                        %error,
                        "tool call arguments never parsed; emitting empty input"
                    );
                    let index = self.next_index;
                    self.next_index += 1;
                    let call = &mut self.calls[pos];
                    events.push(AnthropicStreamEvent::ContentBlockStart {
                        index,
                        content_block: AnthropicStreamContentBlock::ToolUse {
                            id: stable_call_id(&call.id),
                            name: call.name.clone(),
                            input: serde_json::json!({}),
                        },
                    });
                    events.push(AnthropicStreamEvent::ContentBlockStop { index });
                    call.emitted = true;
                }
            }
        }
    }
}
