//! Call setup
//!
//! Turns what a prompt function produced, together with the call's static
//! configuration, into a canonical [`CallRequest`], the provider payload
//! and a create handle bound to a client.

mod anthropic;
mod bedrock;
mod google;
mod openai;

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::convert::{check_system_position, system_text};
use crate::error::LlmError;
use crate::provider::{Family, Provider};
use crate::tool::{ToolDefinition, ToolSchema};
use crate::transport::{BoundCreate, Client};
use crate::types::{CallParams, CallRequest, ContentPart, Message, Role, ToolChoice};

/// Default `max_tokens` for providers that require one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Configuration a prompt function computes at call time
///
/// Every field that is set takes precedence over the call's static
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct DynamicConfig {
    /// Replaces the prompt's messages
    pub messages: Option<Vec<Message>>,
    /// Replaces the statically declared tools
    pub tools: Option<Vec<ToolDefinition>>,
    /// Overlaid on the static call params, field by field
    pub call_params: Option<CallParams>,
    /// Caller metadata carried through to the response
    pub metadata: Map<String, Value>,
    /// Values computed while rendering the prompt
    pub computed_fields: Map<String, Value>,
}

impl DynamicConfig {
    #[must_use]
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn call_params(mut self, params: CallParams) -> Self {
        self.call_params = Some(params);
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn computed_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.computed_fields.insert(key.into(), value.into());
        self
    }
}

/// What a prompt function returns: messages plus optional dynamic config
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    /// Rendered messages
    pub messages: Vec<Message>,
    /// Call-time configuration
    pub config: DynamicConfig,
}

impl Prompt {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: DynamicConfig {
                messages: None,
                tools: None,
                call_params: None,
                metadata: Map::new(),
                computed_fields: Map::new(),
            },
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: DynamicConfig) -> Self {
        self.config = config;
        self
    }
}

/// Static configuration of one call
#[derive(Debug, Clone, Copy)]
pub struct CallSetup<'a> {
    pub provider: Provider,
    pub model: &'a str,
    /// Client to use, a default one is built when absent
    pub client: Option<&'a Client>,
    /// Whether the call will be driven synchronously
    pub blocking: bool,
    pub tools: &'a [ToolDefinition],
    pub call_params: &'a CallParams,
    pub json_mode: bool,
    pub extract: bool,
    pub stream: bool,
}

/// Everything needed to issue the call and wrap its result
#[derive(Debug, Clone)]
pub struct SetupOutput {
    /// Create handle bound to the provider and model
    pub create: BoundCreate,
    /// Canonical messages as sent
    pub messages: Vec<Message>,
    /// Tools responses are validated against
    pub tools: Vec<ToolDefinition>,
    /// Canonical request
    pub request: CallRequest,
    /// Native request body
    pub payload: Value,
    /// Caller metadata from the dynamic config
    pub metadata: Map<String, Value>,
    /// Computed fields from the dynamic config
    pub computed_fields: Map<String, Value>,
}

/// Prepare one call
///
/// Fails with [`LlmError::Configuration`] before any transport work when
/// tool names collide or extraction is requested without a tool.
pub fn setup_call(setup: &CallSetup<'_>, prompt: Prompt) -> Result<SetupOutput, LlmError> {
    let Prompt { messages, config } = prompt;

    let mut messages = config.messages.unwrap_or(messages);
    let tools = config.tools.unwrap_or_else(|| setup.tools.to_vec());
    let call_params = config
        .call_params
        .as_ref()
        .map_or_else(|| setup.call_params.clone(), |dynamic| setup.call_params.merged(dynamic));

    check_tool_names(&tools)?;

    let mut tool_choice = None;
    let mut offered: Vec<_> = tools.iter().map(|tool| std::sync::Arc::clone(tool.schema())).collect();

    if setup.json_mode {
        append_json_instruction(&mut messages, tools.first().map(|tool| tool.schema().as_ref()));
        offered.clear();
    } else if setup.extract {
        let first = tools.first().ok_or_else(|| {
            LlmError::Configuration("extraction requires at least one tool or response model".to_owned())
        })?;
        tool_choice = Some(ToolChoice::Tool(first.name().to_owned()));
    }

    let request = CallRequest {
        model: setup.model.to_owned(),
        messages,
        tools: offered,
        call_params,
        tool_choice,
        json_output: setup.json_mode,
        stream: setup.stream,
    };

    let payload = build_payload(&request, setup.provider)?;
    let create = BoundCreate::new(resolve_client(setup)?, setup.provider, setup.model);

    tracing::debug!(
        provider = %setup.provider,
        model = %setup.model,
        tools = request.tools.len(),
        json_mode = setup.json_mode,
        stream = setup.stream,
        "call prepared"
    );

    Ok(SetupOutput {
        create,
        messages: request.messages.clone(),
        tools,
        request,
        payload,
        metadata: config.metadata,
        computed_fields: config.computed_fields,
    })
}

/// Native request body for a canonical request
pub fn build_payload(request: &CallRequest, provider: Provider) -> Result<Value, LlmError> {
    match provider.family() {
        Family::OpenAi => openai::build_payload(request, provider),
        Family::Anthropic => anthropic::build_payload(request, provider),
        Family::Google => google::build_payload(request, provider),
        Family::Bedrock => bedrock::build_payload(request, provider),
    }
}

fn resolve_client(setup: &CallSetup<'_>) -> Result<Client, LlmError> {
    let client = match setup.client {
        Some(client) => client.clone(),
        None => Client::from_env()?,
    };

    if setup.blocking {
        client.into_blocking()
    } else {
        Ok(client)
    }
}

fn check_tool_names(tools: &[ToolDefinition]) -> Result<(), LlmError> {
    let mut seen = HashSet::with_capacity(tools.len());
    for tool in tools {
        if !seen.insert(tool.name()) {
            return Err(LlmError::Configuration(format!(
                "tool name `{}` is declared more than once",
                tool.name()
            )));
        }
    }
    Ok(())
}

/// Instruction appended to the prompt in JSON mode
pub fn json_instruction(schema: Option<&ToolSchema>) -> String {
    match schema {
        Some(schema) => {
            let parameters = serde_json::to_string_pretty(&schema.parameters_or_empty()).unwrap_or_default();
            format!("Extract a valid JSON object instance from the content using this schema:\n{parameters}")
        }
        None => "Respond only with a valid JSON object.".to_owned(),
    }
}

/// Append the JSON instruction to the final user message, or as a new user
/// message when the conversation does not end with one
fn append_json_instruction(messages: &mut Vec<Message>, schema: Option<&ToolSchema>) {
    let instruction = json_instruction(schema);

    match messages.last_mut() {
        Some(last) if last.role == Role::User => match last.content.last_mut() {
            Some(ContentPart::Text { text }) => {
                text.push_str("\n\n");
                text.push_str(&instruction);
            }
            _ => last.content.push(ContentPart::text(instruction)),
        },
        _ => messages.push(Message::user(instruction)),
    }
}

/// Split a leading system message off for providers that take it as a
/// top-level field
pub(crate) fn hoist_system(messages: &[Message], provider: Provider) -> Result<(Option<String>, &[Message]), LlmError> {
    check_system_position(messages, provider)?;

    match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => Ok((Some(system_text(first, provider)?), rest)),
        _ => Ok((None, messages)),
    }
}

/// Log a common parameter the provider has no field for
pub(crate) fn dropped_param(provider: Provider, param: &'static str) {
    tracing::debug!(provider = %provider, param, "parameter not supported by provider, dropped");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::transport::mock::{ScriptedTransport, client};

    /// A book recommendation
    #[derive(Debug, Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Book {
        title: String,
        author: String,
    }

    fn setup<'a>(
        provider: Provider,
        client: &'a Client,
        tools: &'a [ToolDefinition],
        params: &'a CallParams,
    ) -> CallSetup<'a> {
        CallSetup {
            provider,
            model: "model-x",
            client: Some(client),
            blocking: false,
            tools,
            call_params: params,
            json_mode: false,
            extract: false,
            stream: false,
        }
    }

    fn scripted() -> Client {
        client(&ScriptedTransport::with_response(json!({})))
    }

    #[test]
    fn dynamic_config_wins_over_static() {
        let client = scripted();
        let params = CallParams {
            temperature: Some(0.1),
            max_tokens: Some(10),
            ..CallParams::default()
        };
        let prompt = Prompt::new(vec![Message::user("static")]).with_config(
            DynamicConfig::default()
                .messages(vec![Message::user("dynamic")])
                .call_params(CallParams {
                    temperature: Some(0.9),
                    ..CallParams::default()
                })
                .metadata("tags", json!(["books"])),
        );

        let output = setup_call(&setup(Provider::OpenAi, &client, &[], &params), prompt).unwrap();

        assert_eq!(output.messages, vec![Message::user("dynamic")]);
        assert_eq!(output.payload["temperature"], 0.9);
        assert_eq!(output.payload["max_tokens"], 10);
        assert_eq!(output.metadata["tags"], json!(["books"]));
    }

    #[test]
    fn duplicate_tool_names_are_rejected() {
        let client = scripted();
        let params = CallParams::default();
        let tools = [
            ToolDefinition::response_model::<Book>(),
            ToolDefinition::response_model::<Book>(),
        ];

        let err = setup_call(&setup(Provider::OpenAi, &client, &tools, &params), Prompt::default()).unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }

    #[test]
    fn extract_without_tools_is_rejected() {
        let client = scripted();
        let params = CallParams::default();
        let mut call = setup(Provider::Anthropic, &client, &[], &params);
        call.extract = true;

        let err = setup_call(&call, Prompt::new(vec![Message::user("hi")])).unwrap_err();
        assert!(matches!(err, LlmError::Configuration(_)));
    }

    #[test]
    fn extract_forces_the_first_tool() {
        let client = scripted();
        let params = CallParams::default();
        let tools = [ToolDefinition::response_model::<Book>()];
        let mut call = setup(Provider::Anthropic, &client, &tools, &params);
        call.extract = true;

        let output = setup_call(&call, Prompt::new(vec![Message::user("Recommend a book")])).unwrap();
        assert_eq!(output.payload["tool_choice"], json!({"type": "tool", "name": "Book"}));
        assert_eq!(output.request.tool_choice, Some(ToolChoice::Tool("Book".to_owned())));
    }

    #[test]
    fn json_mode_appends_to_the_last_user_message_and_drops_tools() {
        let client = scripted();
        let params = CallParams::default();
        let tools = [ToolDefinition::response_model::<Book>()];
        let mut call = setup(Provider::OpenAi, &client, &tools, &params);
        call.json_mode = true;

        let output = setup_call(&call, Prompt::new(vec![Message::user("Recommend a book")])).unwrap();

        assert_eq!(output.messages.len(), 1);
        let text = output.messages[0].text();
        assert!(text.starts_with("Recommend a book\n\nExtract a valid JSON object"));
        assert!(text.contains("\"author\""));
        assert!(output.payload.get("tools").is_none());
        assert_eq!(output.payload["response_format"], json!({"type": "json_object"}));
        assert_eq!(output.tools.len(), 1);
    }

    #[test]
    fn json_mode_after_an_assistant_turn_adds_a_user_message() {
        let client = scripted();
        let params = CallParams::default();
        let mut call = setup(Provider::Google, &client, &[], &params);
        call.json_mode = true;

        let history = vec![Message::user("Recommend a book"), Message::assistant("Which genre?")];
        let output = setup_call(&call, Prompt::new(history)).unwrap();

        assert_eq!(output.messages.len(), 3);
        assert_eq!(output.messages[2].role, Role::User);
        assert_eq!(output.payload["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn system_message_is_hoisted_for_anthropic() {
        let client = scripted();
        let params = CallParams::default();
        let history = vec![Message::system("You are a librarian"), Message::user("Hi")];

        let output = setup_call(&setup(Provider::Anthropic, &client, &[], &params), Prompt::new(history)).unwrap();

        assert_eq!(output.payload["system"], "You are a librarian");
        assert_eq!(output.payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(output.payload["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn late_system_message_is_unsupported_for_hoisting_providers() {
        let client = scripted();
        let params = CallParams::default();
        let history = vec![Message::user("Hi"), Message::system("late")];

        let err = setup_call(&setup(Provider::Bedrock, &client, &[], &params), Prompt::new(history)).unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedContent { .. }));
    }

    #[test]
    fn blocking_calls_get_a_blocking_client() {
        let client = scripted();
        let params = CallParams::default();
        let mut call = setup(Provider::OpenAi, &client, &[], &params);
        call.blocking = true;

        let output = setup_call(&call, Prompt::new(vec![Message::user("hi")])).unwrap();
        assert!(output.create.client().is_blocking());
        assert!(!client.is_blocking());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unsupported_param_is_dropped_with_a_debug_event() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let request = CallRequest {
            model: "gpt-4o-mini".to_owned(),
            messages: vec![Message::user("hi")],
            tools: Vec::new(),
            call_params: CallParams {
                top_k: Some(40),
                ..CallParams::default()
            },
            tool_choice: None,
            json_output: false,
            stream: false,
        };
        let payload =
            tracing::subscriber::with_default(subscriber, || build_payload(&request, Provider::OpenAi)).unwrap();

        assert!(payload.get("top_k").is_none());
        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = logs.lines().find(|line| line.contains("parameter not supported by provider")).unwrap();
        assert!(line.contains("DEBUG"));
        assert!(line.contains("param=\"top_k\""));
    }
}
