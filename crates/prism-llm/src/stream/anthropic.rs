use serde_json::{Value, json};

use super::state::{ChunkDecoder, ChunkDelta, StreamState, ToolBuffer, ToolDelta};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicStreamDelta, AnthropicStreamEvent};
use crate::provider::Provider;
use crate::response::anthropic_usage;

pub(super) struct AnthropicDecoder;

impl ChunkDecoder for AnthropicDecoder {
    fn decode(&mut self, chunk: &Value) -> Result<ChunkDelta, LlmError> {
        let event = match serde_json::from_value::<AnthropicStreamEvent>(chunk.clone()) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unrecognized anthropic stream event");
                return Ok(ChunkDelta::default());
            }
        };

        let delta = match event {
            AnthropicStreamEvent::MessageStart { message } => ChunkDelta {
                id: Some(message.id),
                model: (!message.model.is_empty()).then_some(message.model),
                usage: message.usage.as_ref().map(anthropic_usage),
                ..ChunkDelta::default()
            },
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicContentBlock::ToolUse { id, name, .. } => ChunkDelta {
                    tool_deltas: vec![ToolDelta {
                        index,
                        id: Some(id),
                        name: Some(name),
                        arguments: String::new(),
                    }],
                    ..ChunkDelta::default()
                },
                AnthropicContentBlock::Text { text } if !text.is_empty() => ChunkDelta {
                    text: Some(text),
                    ..ChunkDelta::default()
                },
                _ => ChunkDelta::default(),
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => ChunkDelta {
                    text: Some(text),
                    ..ChunkDelta::default()
                },
                AnthropicStreamDelta::InputJsonDelta { partial_json } => ChunkDelta {
                    tool_deltas: vec![ToolDelta {
                        index,
                        id: None,
                        name: None,
                        arguments: partial_json,
                    }],
                    ..ChunkDelta::default()
                },
                AnthropicStreamDelta::Other => ChunkDelta::default(),
            },
            AnthropicStreamEvent::ContentBlockStop { index } => ChunkDelta {
                tool_stops: vec![index],
                ..ChunkDelta::default()
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => ChunkDelta {
                finish_reason: delta.stop_reason,
                usage: usage.as_ref().map(anthropic_usage),
                ..ChunkDelta::default()
            },
            AnthropicStreamEvent::MessageStop | AnthropicStreamEvent::Ping => ChunkDelta::default(),
            AnthropicStreamEvent::Error { error } => {
                return Err(LlmError::ProviderTransport {
                    provider: Provider::Anthropic,
                    status: None,
                    message: error.message,
                    body: Some(chunk.to_string()),
                });
            }
        };

        Ok(delta)
    }

    fn tool_record(&self, buffer: &ToolBuffer) -> Value {
        json!({
            "type": "tool_use",
            "id": buffer.call_id(),
            "name": buffer.name.clone().unwrap_or_default(),
            "input": StreamState::arguments_value(buffer),
        })
    }

    fn synthesize(&self, state: &StreamState) -> Value {
        let mut content = Vec::with_capacity(state.tools.len() + 1);
        if !state.text.is_empty() {
            content.push(json!({"type": "text", "text": state.text}));
        }
        content.extend(state.tools.values().map(|buffer| self.tool_record(buffer)));

        let usage = state.usage.unwrap_or_default();
        json!({
            "id": state.id.clone().unwrap_or_default(),
            "type": "message",
            "role": "assistant",
            "model": state.model.clone().unwrap_or_default(),
            "content": content,
            "stop_reason": state.finish_reason,
            "usage": {
                "input_tokens": usage.input_tokens,
                "output_tokens": usage.output_tokens,
                "cache_read_input_tokens": usage.cached_tokens,
            },
        })
    }
}
