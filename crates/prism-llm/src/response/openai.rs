use serde_json::Value;

use super::{ContentExtractable, RawToolCall, ResponseMetadata, ToolCallExtractable, UsageReportable};
use crate::convert::openai::message_from_wire;
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiContent, OpenAiContentPart, OpenAiResponse, OpenAiUsage};
use crate::provider::Provider;
use crate::types::{Message, Role, Usage};

impl ContentExtractable for OpenAiResponse {
    fn content(&self) -> String {
        let Some(choice) = self.choices.first() else {
            return String::new();
        };

        match &choice.message.content {
            Some(OpenAiContent::Text(text)) => text.clone(),
            Some(OpenAiContent::Parts(parts)) => parts
                .iter()
                .find_map(|part| match part {
                    OpenAiContentPart::Text { text } => Some(text.clone()),
                    OpenAiContentPart::ImageUrl { .. } => None,
                })
                .unwrap_or_default(),
            None => String::new(),
        }
    }

    fn message(&self, provider: Provider) -> Result<Message, LlmError> {
        match self.choices.first() {
            Some(choice) => message_from_wire(&choice.message, provider),
            None => Ok(Message::new(Role::Assistant, Vec::new())),
        }
    }
}

impl ToolCallExtractable for OpenAiResponse {
    fn raw_tool_calls(&self) -> Vec<RawToolCall> {
        let Some(calls) = self.choices.first().and_then(|choice| choice.message.tool_calls.as_ref()) else {
            return Vec::new();
        };

        calls
            .iter()
            .enumerate()
            .map(|(index, call)| RawToolCall {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: Value::String(call.function.arguments.clone()),
                pointer: format!("/choices/0/message/tool_calls/{index}"),
            })
            .collect()
    }
}

impl UsageReportable for OpenAiResponse {
    fn usage(&self) -> Option<Usage> {
        self.usage.as_ref().map(usage_from_wire)
    }
}

impl ResponseMetadata for OpenAiResponse {
    fn finish_reasons(&self) -> Vec<String> {
        self.choices
            .iter()
            .filter_map(|choice| choice.finish_reason.clone())
            .collect()
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

pub(crate) fn usage_from_wire(usage: &OpenAiUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        cached_tokens: usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|details| details.cached_tokens),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_response_reads_content_and_cached_tokens() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "id": "chatcmpl-2",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Dune"}, "finish_reason": "stop"}],
            "usage": {
                "prompt_tokens": 30,
                "completion_tokens": 2,
                "total_tokens": 32,
                "prompt_tokens_details": {"cached_tokens": 16}
            }
        }))
        .unwrap();

        assert_eq!(response.content(), "Dune");
        assert!(response.raw_tool_calls().is_empty());
        assert_eq!(response.finish_reasons(), vec!["stop".to_owned()]);
        assert_eq!(response.usage().unwrap().cached_tokens, Some(16));
        assert_eq!(response.message(Provider::OpenAi).unwrap(), Message::assistant("Dune"));
    }

    #[test]
    fn empty_choices_yield_empty_content() {
        let response = OpenAiResponse::default();
        assert_eq!(response.content(), "");
        assert!(response.finish_reasons().is_empty());
        assert!(response.usage().is_none());
    }
}
