use super::{ContentExtractable, RawToolCall, ResponseMetadata, ToolCallExtractable, UsageReportable};
use crate::convert::google::content_to_message;
use crate::error::LlmError;
use crate::protocol::google::{GoogleResponse, GoogleUsageMetadata};
use crate::provider::Provider;
use crate::types::{Message, Role, Usage};

impl ContentExtractable for GoogleResponse {
    fn content(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter(|part| part.thought != Some(true))
                    .find_map(|part| part.text.clone())
            })
            .unwrap_or_default()
    }

    fn message(&self, provider: Provider) -> Result<Message, LlmError> {
        match self.candidates.first() {
            Some(candidate) => {
                let mut message = content_to_message(&candidate.content, provider)?;
                message.role = Role::Assistant;
                Ok(message)
            }
            None => Ok(Message::new(Role::Assistant, Vec::new())),
        }
    }
}

impl ToolCallExtractable for GoogleResponse {
    /// Calls without an id use the function name as their id
    fn raw_tool_calls(&self) -> Vec<RawToolCall> {
        let Some(candidate) = self.candidates.first() else {
            return Vec::new();
        };

        candidate
            .content
            .parts
            .iter()
            .enumerate()
            .filter_map(|(index, part)| {
                let call = part.function_call.as_ref()?;
                Some(RawToolCall {
                    id: call.id.clone().unwrap_or_else(|| call.name.clone()),
                    name: call.name.clone(),
                    arguments: call.args.clone(),
                    pointer: format!("/candidates/0/content/parts/{index}/functionCall"),
                })
            })
            .collect()
    }
}

impl UsageReportable for GoogleResponse {
    fn usage(&self) -> Option<Usage> {
        self.usage_metadata.as_ref().map(usage_from_wire)
    }
}

impl ResponseMetadata for GoogleResponse {
    fn finish_reasons(&self) -> Vec<String> {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.finish_reason.clone())
            .collect()
    }

    fn model(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    fn id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }
}

pub(crate) const fn usage_from_wire(usage: &GoogleUsageMetadata) -> Usage {
    Usage {
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
        cached_tokens: usage.cached_content_token_count,
    }
}
