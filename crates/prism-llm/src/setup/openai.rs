//! Chat completions payloads for the `OpenAI` family

use serde_json::{Value, json};

use super::dropped_param;
use crate::convert::openai::{messages_to_wire, tool_to_wire};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiRequest, OpenAiStreamOptions};
use crate::provider::Provider;
use crate::types::{CallRequest, ToolChoice};

pub(super) fn build_payload(request: &CallRequest, provider: Provider) -> Result<Value, LlmError> {
    let params = &request.call_params;
    if params.top_k.is_some() {
        dropped_param(provider, "top_k");
    }

    let tools = (!request.tools.is_empty()).then(|| request.tools.iter().map(|schema| tool_to_wire(schema)).collect());
    let capabilities = provider.capabilities();

    let body = OpenAiRequest {
        model: request.model.clone(),
        messages: messages_to_wire(&request.messages, provider)?,
        temperature: params.temperature,
        top_p: params.top_p,
        max_tokens: params.max_tokens,
        stop: params.stop.clone(),
        seed: params.seed,
        stream: request.stream.then_some(true),
        stream_options: (request.stream && capabilities.stream_usage_option)
            .then_some(OpenAiStreamOptions { include_usage: true }),
        tools,
        tool_choice: request.tool_choice.as_ref().map(tool_choice),
        response_format: (request.json_output && capabilities.json_response_format)
            .then(|| json!({"type": "json_object"})),
        extra: params.extra.clone(),
    };

    serde_json::to_value(body).map_err(|e| LlmError::Internal(e.into()))
}

fn tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
    }
}
