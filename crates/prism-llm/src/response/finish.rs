//! Native stop reasons mapped onto [`FinishReason`]

use crate::provider::{Family, Provider};
use crate::types::FinishReason;

/// Normalize a provider's stop reason
///
/// Total for every provider: codes outside the table map to
/// [`FinishReason::Unknown`].
pub fn finish_reason(provider: Provider, raw: &str) -> FinishReason {
    match provider.family() {
        Family::OpenAi => match raw {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolUse,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        },
        Family::Anthropic => match raw {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "tool_use" => FinishReason::ToolUse,
            "refusal" => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        },
        Family::Google => match raw {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
                FinishReason::ContentFilter
            }
            "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
            _ => FinishReason::Unknown,
        },
        Family::Bedrock => match raw {
            "end_turn" | "stop_sequence" => FinishReason::Stop,
            "max_tokens" => FinishReason::Length,
            "tool_use" => FinishReason::ToolUse,
            "guardrail_intervened" | "content_filtered" => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        },
    }
}
