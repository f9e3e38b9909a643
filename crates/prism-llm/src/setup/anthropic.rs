//! Messages API payloads

use serde_json::Value;

use super::{DEFAULT_MAX_TOKENS, dropped_param, hoist_system};
use crate::convert::anthropic::{messages_to_wire, tool_to_wire};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicToolChoice};
use crate::provider::Provider;
use crate::types::{CallRequest, ToolChoice};

pub(super) fn build_payload(request: &CallRequest, provider: Provider) -> Result<Value, LlmError> {
    let params = &request.call_params;
    if params.seed.is_some() {
        dropped_param(provider, "seed");
    }

    let (system, messages) = hoist_system(&request.messages, provider)?;
    let tools = (!request.tools.is_empty()).then(|| request.tools.iter().map(|schema| tool_to_wire(schema)).collect());

    let body = AnthropicRequest {
        model: request.model.clone(),
        max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system,
        messages: messages_to_wire(messages, provider)?,
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.top_k,
        stop_sequences: params.stop.clone(),
        stream: request.stream.then_some(true),
        tools,
        tool_choice: request.tool_choice.as_ref().map(tool_choice),
        extra: params.extra.clone(),
    };

    serde_json::to_value(body).map_err(|e| LlmError::Internal(e.into()))
}

fn tool_choice(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto => ("auto", None),
        ToolChoice::Any => ("any", None),
        ToolChoice::None => ("none", None),
        ToolChoice::Tool(name) => ("tool", Some(name.clone())),
    };
    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}
