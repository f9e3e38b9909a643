use serde_json::{Value, json};

use super::state::{ChunkDecoder, ChunkDelta, StreamState, ToolBuffer, ToolDelta};
use crate::error::LlmError;
use crate::protocol::google::GoogleResponse;
use crate::provider::Provider;
use crate::response::google_usage;

/// Google streams each function call whole, without an index, so calls
/// are numbered in arrival order and completed immediately
pub(super) struct GoogleDecoder {
    pub(super) provider: Provider,
    pub(super) next_index: u32,
}

impl ChunkDecoder for GoogleDecoder {
    fn decode(&mut self, chunk: &Value) -> Result<ChunkDelta, LlmError> {
        let chunk: GoogleResponse = serde_json::from_value(chunk.clone())
            .map_err(|e| LlmError::transport(self.provider, format!("unexpected stream chunk: {e}")))?;

        let mut delta = ChunkDelta {
            usage: chunk.usage_metadata.as_ref().map(google_usage),
            id: chunk.response_id,
            model: chunk.model_version,
            ..ChunkDelta::default()
        };

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Ok(delta);
        };
        delta.finish_reason = candidate.finish_reason;

        let mut text = String::new();
        for part in candidate.content.parts {
            if part.thought == Some(true) {
                continue;
            }
            if let Some(fragment) = part.text {
                text.push_str(&fragment);
            }
            if let Some(call) = part.function_call {
                let index = self.next_index;
                self.next_index += 1;
                delta.tool_deltas.push(ToolDelta {
                    index,
                    id: call.id,
                    name: Some(call.name),
                    arguments: call.args.to_string(),
                });
                delta.tool_stops.push(index);
            }
        }
        delta.text = (!text.is_empty()).then_some(text);

        Ok(delta)
    }

    fn tool_record(&self, buffer: &ToolBuffer) -> Value {
        let mut record = json!({
            "name": buffer.name.clone().unwrap_or_default(),
            "args": StreamState::arguments_value(buffer),
        });
        if let Some(id) = &buffer.id {
            record["id"] = Value::String(id.clone());
        }
        record
    }

    fn synthesize(&self, state: &StreamState) -> Value {
        let mut parts = Vec::with_capacity(state.tools.len() + 1);
        if !state.text.is_empty() {
            parts.push(json!({"text": state.text}));
        }
        parts.extend(
            state
                .tools
                .values()
                .map(|buffer| json!({"functionCall": self.tool_record(buffer)})),
        );

        let mut response = json!({
            "candidates": [{
                "content": {"role": "model", "parts": parts},
                "finishReason": state.finish_reason,
            }],
        });
        if let Some(usage) = state.usage {
            response["usageMetadata"] = json!({
                "promptTokenCount": usage.input_tokens,
                "candidatesTokenCount": usage.output_tokens,
                "totalTokenCount": usage.total_tokens(),
                "cachedContentTokenCount": usage.cached_tokens,
            });
        }
        if let Some(model) = &state.model {
            response["modelVersion"] = Value::String(model.clone());
        }
        if let Some(id) = &state.id {
            response["responseId"] = Value::String(id.clone());
        }
        response
    }
}
