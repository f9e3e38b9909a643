use std::sync::Arc;

use super::message::Message;
use super::params::CallParams;
use crate::tool::ToolSchema;

/// How the model should select tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides whether to call tools
    Auto,
    /// Model must call at least one tool
    Any,
    /// Model will not call any tools
    None,
    /// Model must call the named tool
    Tool(String),
}

/// Canonical request, built once per invocation by call setup
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages, system prompt included
    pub messages: Vec<Message>,
    /// Tool schemas offered to the model
    pub tools: Vec<Arc<ToolSchema>>,
    /// Generation parameters
    pub call_params: CallParams,
    /// How the model should select tools
    pub tool_choice: Option<ToolChoice>,
    /// Ask the provider for JSON output where it has a switch for it
    pub json_output: bool,
    /// Whether to stream the response
    pub stream: bool,
}
