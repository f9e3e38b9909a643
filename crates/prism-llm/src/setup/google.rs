//! `generateContent` payloads for Google and Vertex

use serde_json::Value;

use super::hoist_system;
use crate::convert::google::{function_to_wire, messages_to_wire};
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleContent, GoogleFunctionCallingConfig, GoogleGenerationConfig, GooglePart, GoogleRequest, GoogleTool,
    GoogleToolConfig,
};
use crate::provider::Provider;
use crate::types::{CallRequest, ToolChoice};

const JSON_MIME_TYPE: &str = "application/json";

pub(super) fn build_payload(request: &CallRequest, provider: Provider) -> Result<Value, LlmError> {
    let params = &request.call_params;
    let (system, messages) = hoist_system(&request.messages, provider)?;

    let generation_config = GoogleGenerationConfig {
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.top_k,
        max_output_tokens: params.max_tokens,
        stop_sequences: params.stop.clone(),
        seed: params.seed,
        response_mime_type: request.json_output.then(|| JSON_MIME_TYPE.to_owned()),
    };

    let tools = (!request.tools.is_empty()).then(|| {
        vec![GoogleTool {
            function_declarations: request.tools.iter().map(|schema| function_to_wire(schema)).collect(),
        }]
    });

    let body = GoogleRequest {
        contents: messages_to_wire(messages, provider)?,
        system_instruction: system.map(|text| GoogleContent {
            role: None,
            parts: vec![GooglePart::text(text)],
        }),
        generation_config: (generation_config != GoogleGenerationConfig::default()).then_some(generation_config),
        tools,
        tool_config: request.tool_choice.as_ref().map(tool_config),
        extra: params.extra.clone(),
    };

    serde_json::to_value(body).map_err(|e| LlmError::Internal(e.into()))
}

fn tool_config(choice: &ToolChoice) -> GoogleToolConfig {
    let (mode, allowed) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::Any => ("ANY", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Tool(name) => ("ANY", Some(vec![name.clone()])),
    };
    GoogleToolConfig {
        function_calling_config: GoogleFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names: allowed,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::tool::ToolSchema;
    use crate::types::{CallParams, Message};

    #[test]
    fn system_becomes_system_instruction_and_params_nest() {
        let request = CallRequest {
            model: "gemini-1.5-flash".to_owned(),
            messages: vec![Message::system("You are a librarian"), Message::user("Hi")],
            tools: vec![Arc::new(ToolSchema {
                name: "lookup".to_owned(),
                description: "Look a book up".to_owned(),
                parameters: Some(json!({"type": "object", "properties": {"title": {"type": "string"}}})),
            })],
            call_params: CallParams {
                max_tokens: Some(100),
                ..CallParams::default()
            },
            tool_choice: Some(ToolChoice::Tool("lookup".to_owned())),
            json_output: false,
            stream: false,
        };

        let payload = build_payload(&request, Provider::Google).unwrap();

        assert_eq!(payload["systemInstruction"], json!({"parts": [{"text": "You are a librarian"}]}));
        assert_eq!(payload["contents"].as_array().unwrap().len(), 1);
        assert_eq!(payload["generationConfig"], json!({"maxOutputTokens": 100}));
        assert_eq!(payload["tools"][0]["functionDeclarations"][0]["name"], "lookup");
        assert_eq!(
            payload["toolConfig"]["functionCallingConfig"],
            json!({"mode": "ANY", "allowedFunctionNames": ["lookup"]})
        );
    }

    #[test]
    fn empty_generation_config_is_omitted() {
        let request = CallRequest {
            model: "gemini-1.5-flash".to_owned(),
            messages: vec![Message::user("Hi")],
            tools: Vec::new(),
            call_params: CallParams::default(),
            tool_choice: None,
            json_output: false,
            stream: true,
        };

        let payload = build_payload(&request, Provider::Vertex).unwrap();
        assert!(payload.get("generationConfig").is_none());
    }
}
