use super::{ContentExtractable, RawToolCall, ResponseMetadata, ToolCallExtractable, UsageReportable};
use crate::convert::bedrock::message_from_wire;
use crate::error::LlmError;
use crate::protocol::bedrock::{BedrockResponse, BedrockUsage};
use crate::provider::Provider;
use crate::types::{Message, Role, Usage};

impl ContentExtractable for BedrockResponse {
    fn content(&self) -> String {
        self.output
            .message
            .as_ref()
            .and_then(|message| message.content.iter().find_map(|block| block.text.clone()))
            .unwrap_or_default()
    }

    fn message(&self, provider: Provider) -> Result<Message, LlmError> {
        match &self.output.message {
            Some(message) => message_from_wire(message, provider),
            None => Ok(Message::new(Role::Assistant, Vec::new())),
        }
    }
}

impl ToolCallExtractable for BedrockResponse {
    fn raw_tool_calls(&self) -> Vec<RawToolCall> {
        let Some(message) = &self.output.message else {
            return Vec::new();
        };

        message
            .content
            .iter()
            .enumerate()
            .filter_map(|(index, block)| {
                let tool_use = block.tool_use.as_ref()?;
                Some(RawToolCall {
                    id: tool_use.tool_use_id.clone(),
                    name: tool_use.name.clone(),
                    arguments: tool_use.input.clone(),
                    pointer: format!("/output/message/content/{index}/toolUse"),
                })
            })
            .collect()
    }
}

impl UsageReportable for BedrockResponse {
    fn usage(&self) -> Option<Usage> {
        self.usage.as_ref().map(usage_from_wire)
    }
}

impl ResponseMetadata for BedrockResponse {
    fn finish_reasons(&self) -> Vec<String> {
        self.stop_reason.iter().cloned().collect()
    }

    /// Converse responses do not name the model
    fn model(&self) -> Option<&str> {
        None
    }

    fn id(&self) -> Option<&str> {
        None
    }
}

pub(crate) const fn usage_from_wire(usage: &BedrockUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cached_tokens: usage.cache_read_input_tokens,
    }
}
