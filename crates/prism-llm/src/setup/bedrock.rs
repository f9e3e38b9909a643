//! Converse payloads

use serde_json::{Map, Value};

use super::{dropped_param, hoist_system};
use crate::convert::bedrock::{messages_to_wire, tool_to_wire};
use crate::error::LlmError;
use crate::protocol::bedrock::{
    BedrockEmpty, BedrockInferenceConfig, BedrockRequest, BedrockSpecificTool, BedrockSystemBlock, BedrockToolChoice,
    BedrockToolConfig,
};
use crate::provider::Provider;
use crate::types::{CallRequest, ToolChoice};

pub(super) fn build_payload(request: &CallRequest, provider: Provider) -> Result<Value, LlmError> {
    let params = &request.call_params;
    if params.seed.is_some() {
        dropped_param(provider, "seed");
    }

    let (system, messages) = hoist_system(&request.messages, provider)?;

    let inference = BedrockInferenceConfig {
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        stop_sequences: params.stop.clone(),
    };

    // Model-specific fields, top_k among them, travel outside the common set
    let mut additional = Map::new();
    if let Some(top_k) = params.top_k {
        additional.insert("top_k".to_owned(), Value::from(top_k));
    }
    additional.extend(params.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

    let tool_config = (!request.tools.is_empty()).then(|| BedrockToolConfig {
        tools: request.tools.iter().map(|schema| tool_to_wire(schema)).collect(),
        tool_choice: request.tool_choice.as_ref().and_then(tool_choice),
    });

    let body = BedrockRequest {
        messages: messages_to_wire(messages, provider)?,
        system: system.map(|text| vec![BedrockSystemBlock { text }]),
        inference_config: (inference != BedrockInferenceConfig::default()).then_some(inference),
        tool_config,
        additional_model_request_fields: (!additional.is_empty()).then_some(Value::Object(additional)),
    };

    serde_json::to_value(body).map_err(|e| LlmError::Internal(e.into()))
}

/// Converse has no way to forbid tool use, so `None` leaves the choice to the model
fn tool_choice(choice: &ToolChoice) -> Option<BedrockToolChoice> {
    match choice {
        ToolChoice::Auto => Some(BedrockToolChoice {
            auto: Some(BedrockEmpty {}),
            ..BedrockToolChoice::default()
        }),
        ToolChoice::Any => Some(BedrockToolChoice {
            any: Some(BedrockEmpty {}),
            ..BedrockToolChoice::default()
        }),
        ToolChoice::None => {
            tracing::debug!("bedrock cannot disable tool use, leaving the choice to the model");
            None
        }
        ToolChoice::Tool(name) => Some(BedrockToolChoice {
            tool: Some(BedrockSpecificTool { name: name.clone() }),
            ..BedrockToolChoice::default()
        }),
    }
}
