use super::{ContentExtractable, RawToolCall, ResponseMetadata, ToolCallExtractable, UsageReportable};
use crate::convert::anthropic::blocks_to_message;
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicResponse, AnthropicUsage};
use crate::provider::Provider;
use crate::types::{Message, Role, Usage};

impl ContentExtractable for AnthropicResponse {
    fn content(&self) -> String {
        self.content
            .iter()
            .find_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn message(&self, provider: Provider) -> Result<Message, LlmError> {
        blocks_to_message(Role::Assistant, &self.content, provider)
    }
}

impl ToolCallExtractable for AnthropicResponse {
    fn raw_tool_calls(&self) -> Vec<RawToolCall> {
        self.content
            .iter()
            .enumerate()
            .filter_map(|(index, block)| match block {
                AnthropicContentBlock::ToolUse { id, name, input } => Some(RawToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                    pointer: format!("/content/{index}"),
                }),
                _ => None,
            })
            .collect()
    }
}

impl UsageReportable for AnthropicResponse {
    fn usage(&self) -> Option<Usage> {
        Some(usage_from_wire(&self.usage))
    }
}

impl ResponseMetadata for AnthropicResponse {
    fn finish_reasons(&self) -> Vec<String> {
        self.stop_reason.iter().cloned().collect()
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

pub(crate) const fn usage_from_wire(usage: &AnthropicUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cached_tokens: usage.cache_read_input_tokens,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response() -> AnthropicResponse {
        serde_json::from_value(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20240620",
            "content": [
                {"type": "thinking", "thinking": "...", "signature": "x"},
                {"type": "text", "text": "Let me look that up."},
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "get_book_author",
                    "input": {"title": "The Name of the Wind"}
                }
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 50, "output_tokens": 20}
        }))
        .unwrap()
    }

    #[test]
    fn content_is_the_first_text_block() {
        assert_eq!(response().content(), "Let me look that up.");
    }

    #[test]
    fn tool_use_blocks_point_at_their_index() {
        let calls = response().raw_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].pointer, "/content/2");
        assert_eq!(calls[0].arguments, json!({"title": "The Name of the Wind"}));
    }

    #[test]
    fn message_param_keeps_text_and_tool_use() {
        let message = response().message(Provider::Anthropic).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content.len(), 2);
        assert_eq!(response().finish_reasons(), vec!["tool_use".to_owned()]);
    }
}
