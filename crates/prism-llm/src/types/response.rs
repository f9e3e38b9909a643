use serde::{Deserialize, Serialize};
use strum::Display;

/// Reason the model stopped generating, normalized across providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation or a stop sequence
    Stop,
    /// Hit the token limit
    Length,
    /// Model decided to call a tool
    ToolUse,
    /// Output was withheld by safety systems
    ContentFilter,
    /// The provider reported a generation failure
    Error,
    /// Code not recognized for this provider
    Unknown,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub input_tokens: u64,
    /// Tokens generated in the completion
    pub output_tokens: u64,
    /// Prompt tokens served from the provider's cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
}

impl Usage {
    /// Sum of input and output tokens
    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Fold a later report from the same stream into this one
    ///
    /// Providers report running totals, and some split input and output
    /// counts across events, so each counter keeps its largest value.
    pub fn merge(&mut self, later: &Self) {
        self.input_tokens = self.input_tokens.max(later.input_tokens);
        self.output_tokens = self.output_tokens.max(later.output_tokens);
        self.cached_tokens = match (self.cached_tokens, later.cached_tokens) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Inputs a pricing collaborator needs to cost a call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostMetadata {
    /// Prompt tokens, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Completion tokens, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    /// Cached prompt tokens, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    /// Whether the call ran with a batch discount
    #[serde(default)]
    pub batch_mode: bool,
}

impl CostMetadata {
    pub(crate) fn from_usage(usage: Option<&Usage>) -> Self {
        usage.map_or_else(Self::default, |usage| Self {
            input_tokens: Some(usage.input_tokens),
            output_tokens: Some(usage.output_tokens),
            cached_tokens: usage.cached_tokens,
            batch_mode: false,
        })
    }
}
