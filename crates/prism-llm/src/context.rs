use serde_json::{Map, Value};

use crate::provider::Provider;
use crate::setup::SetupOutput;
use crate::tool::ToolDefinition;
use crate::types::{CallParams, Message};

/// What one call was set up with
///
/// Shared by the response or stream the call produces and handed to
/// middleware hooks.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Name given to the call's prompt function, if any
    pub call_name: Option<String>,
    /// Arguments the prompt function was invoked with, `null` when unknown
    pub fn_args: Value,
    /// Target provider
    pub provider: Provider,
    /// Requested model
    pub model: String,
    /// Canonical messages as sent
    pub messages: Vec<Message>,
    /// Tools responses are validated against
    pub tools: Vec<ToolDefinition>,
    /// Effective call params
    pub call_params: CallParams,
    /// Caller metadata
    pub metadata: Map<String, Value>,
    /// Values computed while rendering the prompt
    pub computed_fields: Map<String, Value>,
    /// Whether output was requested as JSON text
    pub json_mode: bool,
    /// Whether the call streams
    pub stream: bool,
}

impl CallContext {
    pub(crate) fn from_setup(setup: &SetupOutput) -> Self {
        Self {
            call_name: None,
            fn_args: Value::Null,
            provider: setup.create.provider(),
            model: setup.request.model.clone(),
            messages: setup.messages.clone(),
            tools: setup.tools.clone(),
            call_params: setup.request.call_params.clone(),
            metadata: setup.metadata.clone(),
            computed_fields: setup.computed_fields.clone(),
            json_mode: setup.request.json_output,
            stream: setup.request.stream,
        }
    }

    /// Minimal context for wrapping a response obtained elsewhere
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            call_name: None,
            fn_args: Value::Null,
            provider,
            model: model.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            call_params: CallParams::default(),
            metadata: Map::new(),
            computed_fields: Map::new(),
            json_mode: false,
            stream: false,
        }
    }

    /// Same context tagged with the prompt function that produced it
    #[must_use]
    pub fn with_invocation(mut self, call_name: Option<String>, fn_args: Value) -> Self {
        self.call_name = call_name;
        self.fn_args = fn_args;
        self
    }

    /// Same context with tools to validate calls against
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}
