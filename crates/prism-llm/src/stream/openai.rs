use serde_json::{Value, json};

use super::state::{ChunkDecoder, ChunkDelta, StreamState, ToolBuffer, ToolDelta};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiErrorResponse, OpenAiStreamChunk};
use crate::provider::Provider;
use crate::response::openai_usage;

pub(super) struct OpenAiDecoder {
    pub(super) provider: Provider,
}

impl ChunkDecoder for OpenAiDecoder {
    fn decode(&mut self, chunk: &Value) -> Result<ChunkDelta, LlmError> {
        if chunk.get("error").is_some() {
            let message = serde_json::from_value::<OpenAiErrorResponse>(chunk.clone())
                .map_or_else(|_| chunk.to_string(), |e| e.error.message);
            return Err(LlmError::ProviderTransport {
                provider: self.provider,
                status: None,
                message,
                body: Some(chunk.to_string()),
            });
        }

        let chunk: OpenAiStreamChunk = serde_json::from_value(chunk.clone())
            .map_err(|e| LlmError::transport(self.provider, format!("unexpected stream chunk: {e}")))?;

        let mut delta = ChunkDelta {
            usage: chunk.usage.as_ref().map(openai_usage),
            id: (!chunk.id.is_empty()).then(|| chunk.id.clone()),
            model: (!chunk.model.is_empty()).then(|| chunk.model.clone()),
            ..ChunkDelta::default()
        };

        // Only the first choice is tracked
        if let Some(choice) = chunk.choices.into_iter().find(|choice| choice.index == 0) {
            delta.text = choice.delta.content;
            delta.finish_reason = choice.finish_reason;
            delta.tool_deltas = choice
                .delta
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| {
                    let (name, arguments) = call
                        .function
                        .map(|function| (function.name, function.arguments.unwrap_or_default()))
                        .unwrap_or_default();
                    ToolDelta {
                        index: call.index,
                        id: call.id,
                        name,
                        arguments,
                    }
                })
                .collect();
        }

        Ok(delta)
    }

    fn tool_record(&self, buffer: &ToolBuffer) -> Value {
        json!({
            "id": buffer.call_id(),
            "type": "function",
            "function": {
                "name": buffer.name.clone().unwrap_or_default(),
                "arguments": buffer.arguments,
            }
        })
    }

    fn synthesize(&self, state: &StreamState) -> Value {
        let tool_calls: Vec<Value> = state.tools.values().map(|buffer| self.tool_record(buffer)).collect();

        let mut message = json!({
            "role": "assistant",
            "content": (!state.text.is_empty()).then_some(&state.text),
        });
        if !tool_calls.is_empty() {
            message["tool_calls"] = Value::Array(tool_calls);
        }

        let mut response = json!({
            "id": state.id.clone().unwrap_or_default(),
            "object": "chat.completion",
            "created": 0,
            "model": state.model.clone().unwrap_or_default(),
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": state.finish_reason,
            }],
        });
        if let Some(usage) = state.usage {
            response["usage"] = json!({
                "prompt_tokens": usage.input_tokens,
                "completion_tokens": usage.output_tokens,
                "total_tokens": usage.total_tokens(),
                "prompt_tokens_details": {"cached_tokens": usage.cached_tokens},
            });
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_fragments_and_usage_are_decoded() {
        let mut decoder = OpenAiDecoder {
            provider: Provider::OpenAi,
        };

        let first = decoder
            .decode(&json!({
                "id": "chatcmpl-9",
                "model": "gpt-4o",
                "choices": [{"index": 0, "delta": {"tool_calls": [
                    {
                        "index": 0,
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_book_author", "arguments": ""}
                    }
                ]}}]
            }))
            .unwrap();
        assert_eq!(first.tool_deltas[0].id.as_deref(), Some("call_1"));
        assert_eq!(first.model.as_deref(), Some("gpt-4o"));

        let usage = decoder
            .decode(&json!({
                "id": "chatcmpl-9",
                "choices": [],
                "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
            }))
            .unwrap();
        assert_eq!(usage.usage.unwrap().output_tokens, 3);
        assert!(usage.tool_deltas.is_empty());
    }

    #[test]
    fn error_chunk_is_a_transport_error() {
        let mut decoder = OpenAiDecoder {
            provider: Provider::Groq,
        };
        let err = decoder
            .decode(&json!({"error": {"message": "overloaded", "type": "server_error"}}))
            .unwrap_err();
        assert!(matches!(err, LlmError::ProviderTransport { ref message, .. } if message == "overloaded"));
    }
}
