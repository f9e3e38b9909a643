//! Uniform, read-only view over one provider response
//!
//! Each family implements the capability traits on its native response
//! type; [`CallResponse`] picks the implementation from the provider and
//! exposes the same surface for all of them.

mod anthropic;
mod bedrock;
mod finish;
mod google;
mod openai;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

pub use finish::finish_reason;

pub(crate) use anthropic::usage_from_wire as anthropic_usage;
pub(crate) use bedrock::usage_from_wire as bedrock_usage;
pub(crate) use google::usage_from_wire as google_usage;
pub(crate) use openai::usage_from_wire as openai_usage;

use crate::context::CallContext;
use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicResponse;
use crate::protocol::bedrock::BedrockResponse;
use crate::protocol::google::GoogleResponse;
use crate::protocol::openai::OpenAiResponse;
use crate::provider::{Family, Provider};
use crate::tool::{ToolCall, from_provider_call};
use crate::types::{CallParams, ContentPart, CostMetadata, FinishReason, Message, Role, Usage};

/// A tool call as found in a native response, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawToolCall {
    /// Provider-assigned identifier
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments, a JSON string or an object depending on the family
    pub arguments: Value,
    /// JSON pointer to the call record inside the native response
    pub pointer: String,
}

/// Text content of a response
pub trait ContentExtractable {
    /// Text of the first text part, empty when there is none
    fn content(&self) -> String;

    /// The generated turn as a canonical assistant message
    fn message(&self, provider: Provider) -> Result<Message, LlmError>;
}

/// Tool calls requested by a response
pub trait ToolCallExtractable {
    /// Calls in the order the provider listed them
    fn raw_tool_calls(&self) -> Vec<RawToolCall>;
}

/// Token accounting of a response
pub trait UsageReportable {
    /// Usage, `None` when the provider did not report it
    fn usage(&self) -> Option<Usage>;
}

/// Identity and stop information of a response
pub trait ResponseMetadata {
    /// Native stop reasons, one per choice or candidate that has one
    fn finish_reasons(&self) -> Vec<String>;

    /// Model the provider reports having served
    fn model(&self) -> Option<&str>;

    /// Response identifier
    fn id(&self) -> Option<&str>;
}

/// Every capability a family adapter provides
pub trait ResponseView: ContentExtractable + ToolCallExtractable + UsageReportable + ResponseMetadata {}

impl<T: ContentExtractable + ToolCallExtractable + UsageReportable + ResponseMetadata> ResponseView for T {}

/// Prices a call from its cost metadata
pub trait CostLookup {
    /// Cost in dollars, `None` when the model is not priced
    fn cost(&self, provider: Provider, model: &str, metadata: &CostMetadata) -> Option<f64>;
}

impl<F> CostLookup for F
where
    F: Fn(Provider, &str, &CostMetadata) -> Option<f64>,
{
    fn cost(&self, provider: Provider, model: &str, metadata: &CostMetadata) -> Option<f64> {
        self(provider, model, metadata)
    }
}

#[derive(Debug, Clone)]
enum NativeResponse {
    OpenAi(OpenAiResponse),
    Anthropic(AnthropicResponse),
    Google(GoogleResponse),
    Bedrock(BedrockResponse),
}

impl NativeResponse {
    fn parse(provider: Provider, native: &Value) -> Result<Self, LlmError> {
        fn typed<T: DeserializeOwned>(provider: Provider, native: &Value) -> Result<T, LlmError> {
            T::deserialize(native).map_err(|e| LlmError::ProviderTransport {
                provider,
                status: None,
                message: format!("unexpected response shape: {e}"),
                body: Some(native.to_string()),
            })
        }

        Ok(match provider.family() {
            Family::OpenAi => Self::OpenAi(typed(provider, native)?),
            Family::Anthropic => Self::Anthropic(typed(provider, native)?),
            Family::Google => Self::Google(typed(provider, native)?),
            Family::Bedrock => Self::Bedrock(typed(provider, native)?),
        })
    }

    fn view(&self) -> &dyn ResponseView {
        match self {
            Self::OpenAi(response) => response,
            Self::Anthropic(response) => response,
            Self::Google(response) => response,
            Self::Bedrock(response) => response,
        }
    }
}

/// Unified response for one non-streaming call
///
/// Cloning is cheap: the native response and the call context are shared.
#[derive(Debug, Clone)]
pub struct CallResponse {
    native: Arc<Value>,
    parsed: Arc<NativeResponse>,
    context: Arc<CallContext>,
}

impl CallResponse {
    /// Wrap a native response
    ///
    /// Fails with [`LlmError::ProviderTransport`] when the JSON does not have
    /// the provider's response shape.
    pub fn new(native: Value, context: CallContext) -> Result<Self, LlmError> {
        Self::with_context(native, Arc::new(context))
    }

    pub(crate) fn with_context(native: Value, context: Arc<CallContext>) -> Result<Self, LlmError> {
        let parsed = NativeResponse::parse(context.provider, &native)?;
        Ok(Self {
            native: Arc::new(native),
            parsed: Arc::new(parsed),
            context,
        })
    }

    fn view(&self) -> &dyn ResponseView {
        self.parsed.view()
    }

    pub fn provider(&self) -> Provider {
        self.context.provider
    }

    /// Model reported by the provider, or the requested one
    pub fn model(&self) -> &str {
        self.view()
            .model()
            .filter(|model| !model.is_empty())
            .unwrap_or(self.context.model.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.view().id().filter(|id| !id.is_empty())
    }

    /// Native response JSON, exactly as received
    pub fn response(&self) -> &Value {
        &self.native
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn messages(&self) -> &[Message] {
        &self.context.messages
    }

    pub fn call_params(&self) -> &CallParams {
        &self.context.call_params
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.context.metadata
    }

    pub fn computed_fields(&self) -> &Map<String, Value> {
        &self.context.computed_fields
    }

    /// Text of the first text part
    pub fn content(&self) -> String {
        self.view().content()
    }

    /// Native stop reasons
    pub fn finish_reasons(&self) -> Vec<String> {
        self.view().finish_reasons()
    }

    /// Normalized stop reason of the first choice
    pub fn finish_reason(&self) -> FinishReason {
        self.finish_reasons()
            .first()
            .map_or(FinishReason::Unknown, |raw| finish_reason(self.provider(), raw))
    }

    pub fn usage(&self) -> Option<Usage> {
        self.view().usage()
    }

    pub fn input_tokens(&self) -> Option<u64> {
        self.usage().map(|usage| usage.input_tokens)
    }

    pub fn output_tokens(&self) -> Option<u64> {
        self.usage().map(|usage| usage.output_tokens)
    }

    pub fn cost_metadata(&self) -> CostMetadata {
        CostMetadata::from_usage(self.usage().as_ref())
    }

    /// Price the call through a lookup collaborator
    pub fn cost(&self, lookup: &dyn CostLookup) -> Option<f64> {
        lookup.cost(self.provider(), self.model(), &self.cost_metadata())
    }

    /// Native tool call records, unvalidated
    pub fn raw_tool_calls(&self) -> Vec<(RawToolCall, &Value)> {
        self.view()
            .raw_tool_calls()
            .into_iter()
            .filter_map(|call| {
                let record = self.native.pointer(&call.pointer)?;
                Some((call, record))
            })
            .collect()
    }

    /// Every requested tool call, each validated on its own
    ///
    /// A malformed call yields an error in its slot and leaves its siblings
    /// untouched. Empty when the model called no tools.
    pub fn tool_calls(&self) -> Vec<Result<ToolCall, LlmError>> {
        self.raw_tool_calls()
            .into_iter()
            .map(|(call, record)| {
                from_provider_call(&self.context.tools, call.id, &call.name, &call.arguments, record.clone())
            })
            .collect()
    }

    /// The first tool call, if any
    pub fn tool(&self) -> Result<Option<ToolCall>, LlmError> {
        self.tool_calls().into_iter().next().transpose()
    }

    /// The assistant turn, ready to append to the conversation
    pub fn message_param(&self) -> Result<Message, LlmError> {
        self.view().message(self.provider())
    }

    /// Follow-up messages carrying tool outputs back to the model
    pub fn tool_message_params(&self, outputs: &[(ToolCall, Value)]) -> Vec<Message> {
        tool_message_params(self.provider(), outputs)
    }

    /// Structured output from the forced tool call, or from the JSON text in
    /// JSON mode
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        let tool = self
            .context
            .tools
            .first()
            .map_or("response", |tool| tool.name());

        if self.context.json_mode {
            return parse_json_content(tool, &self.content());
        }

        match self.tool()? {
            Some(call) => call.args(),
            None => Err(LlmError::tool_argument(tool, "the model did not call the tool")),
        }
    }

    /// Serializable snapshot of the call and its result
    pub fn model_dump(&self) -> Value {
        let tool_calls: Vec<Value> = self
            .raw_tool_calls()
            .into_iter()
            .map(|(_, record)| record.clone())
            .collect();

        json!({
            "call_name": self.context.call_name,
            "fn_args": self.context.fn_args,
            "provider": self.provider(),
            "model": self.model(),
            "id": self.id(),
            "content": self.content(),
            "finish_reasons": self.finish_reasons(),
            "finish_reason": self.finish_reason(),
            "usage": self.usage(),
            "cost_metadata": self.cost_metadata(),
            "tool_calls": tool_calls,
            "messages": self.context.messages,
            "message_param": self.message_param().ok(),
            "call_params": self.context.call_params,
            "metadata": self.context.metadata,
            "computed_fields": self.context.computed_fields,
            "response": self.native.as_ref(),
        })
    }
}

/// Tool outputs as history messages, following the provider's convention
///
/// The `OpenAI` family expects one `tool` message per call; every other
/// family takes all results batched into a single message.
pub fn tool_message_params(provider: Provider, outputs: &[(ToolCall, Value)]) -> Vec<Message> {
    let results = outputs.iter().map(|(call, output)| ContentPart::ToolResult {
        id: call.id().to_owned(),
        value: output.clone(),
    });

    match provider.family() {
        Family::OpenAi => results.map(|part| Message::new(Role::Tool, vec![part])).collect(),
        _ if outputs.is_empty() => Vec::new(),
        _ => vec![Message::new(Role::Tool, results.collect())],
    }
}

/// Parse JSON-mode output, tolerating markdown fences and surrounding prose
pub(crate) fn parse_json_content<T: DeserializeOwned>(tool: &str, text: &str) -> Result<T, LlmError> {
    let start = text.find(['{', '[']);
    let end = text.rfind(['}', ']']);
    let candidate = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    };

    serde_json::from_str(candidate).map_err(|e| LlmError::tool_argument(tool, e))
}
