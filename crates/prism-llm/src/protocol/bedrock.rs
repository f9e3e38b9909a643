//! AWS Bedrock Converse API wire format types
//!
//! These mirror the Converse REST JSON shape. The default transport maps
//! them onto the AWS SDK, which keeps setup and response handling free of
//! SDK types and lets custom transports post the JSON directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- Request types --

/// Converse request body, the model id travels outside the body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockRequest {
    /// Conversation messages
    pub messages: Vec<BedrockMessage>,
    /// System prompt blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<BedrockSystemBlock>>,
    /// Common inference parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_config: Option<BedrockInferenceConfig>,
    /// Tool definitions and choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<BedrockToolConfig>,
    /// Model-specific fields outside the common set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_model_request_fields: Option<Value>,
}

/// Converse message
///
/// Before call setup hoists it, a leading system prompt travels in the
/// list with role `system`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockMessage {
    /// Role ("user" or "assistant")
    pub role: String,
    /// Content blocks
    pub content: Vec<BedrockContentBlock>,
}

/// Content block, exactly one field is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockContentBlock {
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Image content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<BedrockImage>,
    /// Tool use request from the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<BedrockToolUse>,
    /// Tool result from the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<BedrockToolResult>,
}

impl BedrockContentBlock {
    /// Text block
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// System prompt block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockSystemBlock {
    /// System text
    pub text: String,
}

/// Image block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockImage {
    /// Image format: "png", "jpeg", "gif" or "webp"
    pub format: String,
    /// Image source
    pub source: BedrockImageSource,
}

/// Image source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockImageSource {
    /// Base64-encoded bytes
    pub bytes: String,
}

/// Tool use block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockToolUse {
    /// Tool use identifier
    pub tool_use_id: String,
    /// Tool name
    pub name: String,
    /// Tool input as JSON
    pub input: Value,
}

/// Tool result block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockToolResult {
    /// Tool use ID this result responds to
    pub tool_use_id: String,
    /// Result content
    pub content: Vec<BedrockToolResultContent>,
    /// "success" or "error"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Tool result content, exactly one field is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockToolResultContent {
    /// Text result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Structured result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

/// Common inference parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockInferenceConfig {
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Tool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockToolConfig {
    /// Tool definitions
    pub tools: Vec<BedrockTool>,
    /// Tool choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<BedrockToolChoice>,
}

/// Tool definition wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockTool {
    /// Tool specification
    pub tool_spec: BedrockToolSpec,
}

/// Tool specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockToolSpec {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input schema
    pub input_schema: BedrockInputSchema,
}

/// Input schema wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockInputSchema {
    /// JSON Schema document
    pub json: Value,
}

/// Tool choice, exactly one field is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockToolChoice {
    /// Model decides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<BedrockEmpty>,
    /// Model must call some tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<BedrockEmpty>,
    /// Model must call the named tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<BedrockSpecificTool>,
}

/// Empty JSON object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockEmpty {}

/// Named tool choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockSpecificTool {
    /// Tool name
    pub name: String,
}

// -- Response types --

/// Converse response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockResponse {
    /// Output message
    #[serde(default)]
    pub output: BedrockOutput,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<BedrockUsage>,
}

/// Converse output wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BedrockOutput {
    /// Generated message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<BedrockMessage>,
}

/// Token usage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u64,
    /// Input tokens read from the prompt cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

// -- Streaming types --

/// One `ConverseStream` event, exactly one field is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockStreamEvent {
    /// Message started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_start: Option<BedrockMessageStart>,
    /// Content block started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_block_start: Option<BedrockBlockStart>,
    /// Incremental block content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_block_delta: Option<BedrockBlockDelta>,
    /// Content block finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_block_stop: Option<BedrockBlockStop>,
    /// Message finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_stop: Option<BedrockMessageStop>,
    /// Usage and metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BedrockStreamMetadata>,
}

/// `messageStart` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockMessageStart {
    /// Role of the generated message
    pub role: String,
}

/// `contentBlockStart` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockBlockStart {
    /// Block index
    pub content_block_index: u32,
    /// Block start details
    #[serde(default)]
    pub start: BedrockStart,
}

/// Block start details
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockStart {
    /// Tool use identity, set for tool blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<BedrockToolUseStart>,
}

/// Tool use identity at block start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockToolUseStart {
    /// Tool use identifier
    pub tool_use_id: String,
    /// Tool name
    pub name: String,
}

/// `contentBlockDelta` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockBlockDelta {
    /// Block index
    pub content_block_index: u32,
    /// Delta content
    pub delta: BedrockDelta,
}

/// Delta content, exactly one field is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockDelta {
    /// Text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Tool input fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<BedrockToolUseDelta>,
}

/// Tool input fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockToolUseDelta {
    /// Raw JSON fragment
    pub input: String,
}

/// `contentBlockStop` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockBlockStop {
    /// Block index
    pub content_block_index: u32,
}

/// `messageStop` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BedrockMessageStop {
    /// Stop reason
    pub stop_reason: String,
}

/// `metadata` payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BedrockStreamMetadata {
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<BedrockUsage>,
}
