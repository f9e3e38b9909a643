use serde_json::{Value, json};

use super::state::{ChunkDecoder, ChunkDelta, StreamState, ToolBuffer, ToolDelta};
use crate::error::LlmError;
use crate::protocol::bedrock::BedrockStreamEvent;
use crate::provider::Provider;
use crate::response::bedrock_usage;

pub(super) struct BedrockDecoder;

impl ChunkDecoder for BedrockDecoder {
    fn decode(&mut self, chunk: &Value) -> Result<ChunkDelta, LlmError> {
        let event: BedrockStreamEvent = serde_json::from_value(chunk.clone())
            .map_err(|e| LlmError::transport(Provider::Bedrock, format!("unexpected stream event: {e}")))?;

        let mut delta = ChunkDelta::default();

        if let Some(start) = event.content_block_start
            && let Some(tool_use) = start.start.tool_use
        {
            delta.tool_deltas.push(ToolDelta {
                index: start.content_block_index,
                id: Some(tool_use.tool_use_id),
                name: Some(tool_use.name),
                arguments: String::new(),
            });
        }

        if let Some(block) = event.content_block_delta {
            delta.text = block.delta.text;
            if let Some(tool_use) = block.delta.tool_use {
                delta.tool_deltas.push(ToolDelta {
                    index: block.content_block_index,
                    id: None,
                    name: None,
                    arguments: tool_use.input,
                });
            }
        }

        if let Some(stop) = event.content_block_stop {
            delta.tool_stops.push(stop.content_block_index);
        }
        if let Some(stop) = event.message_stop {
            delta.finish_reason = Some(stop.stop_reason);
        }
        if let Some(metadata) = event.metadata {
            delta.usage = metadata.usage.as_ref().map(bedrock_usage);
        }

        Ok(delta)
    }

    fn tool_record(&self, buffer: &ToolBuffer) -> Value {
        json!({
            "toolUseId": buffer.call_id(),
            "name": buffer.name.clone().unwrap_or_default(),
            "input": StreamState::arguments_value(buffer),
        })
    }

    fn synthesize(&self, state: &StreamState) -> Value {
        let mut content = Vec::with_capacity(state.tools.len() + 1);
        if !state.text.is_empty() {
            content.push(json!({"text": state.text}));
        }
        content.extend(
            state
                .tools
                .values()
                .map(|buffer| json!({"toolUse": self.tool_record(buffer)})),
        );

        let mut response = json!({
            "output": {"message": {"role": "assistant", "content": content}},
            "stopReason": state.finish_reason,
        });
        if let Some(usage) = state.usage {
            response["usage"] = json!({
                "inputTokens": usage.input_tokens,
                "outputTokens": usage.output_tokens,
                "totalTokens": usage.total_tokens(),
            });
        }
        response
    }
}
