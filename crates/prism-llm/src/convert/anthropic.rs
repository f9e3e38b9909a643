//! Conversion between canonical messages and the Anthropic messages format

use super::{check_system_position, decode_base64, encode_base64, system_text, text_to_value, value_to_text};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicTool,
};
use crate::provider::Provider;
use crate::tool::ToolSchema;
use crate::types::{ContentPart, ImageSource, Message, Role};

/// Media types the messages API accepts for images
const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

// -- Outbound: canonical -> wire --

/// Convert canonical messages to Anthropic messages
///
/// A tool message becomes one `user` message holding a `tool_result` block
/// per result.
pub fn messages_to_wire(messages: &[Message], provider: Provider) -> Result<Vec<AnthropicMessage>, LlmError> {
    check_system_position(messages, provider)?;
    messages
        .iter()
        .map(|message| message_to_wire(message, provider))
        .collect()
}

fn message_to_wire(message: &Message, provider: Provider) -> Result<AnthropicMessage, LlmError> {
    let role = match message.role {
        Role::System => {
            return Ok(AnthropicMessage {
                role: "system".to_owned(),
                content: AnthropicContent::Text(system_text(message, provider)?),
            });
        }
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    };

    if let [ContentPart::Text { text }] = message.content.as_slice() {
        return Ok(AnthropicMessage {
            role: role.to_owned(),
            content: AnthropicContent::Text(text.clone()),
        });
    }

    let blocks = message
        .content
        .iter()
        .map(|part| block_to_wire(part, message.role, provider))
        .collect::<Result<_, _>>()?;

    Ok(AnthropicMessage {
        role: role.to_owned(),
        content: AnthropicContent::Blocks(blocks),
    })
}

fn block_to_wire(part: &ContentPart, role: Role, provider: Provider) -> Result<AnthropicContentBlock, LlmError> {
    match part {
        ContentPart::Text { text } => Ok(AnthropicContentBlock::Text { text: text.clone() }),
        ContentPart::Image { source, mime_type } => {
            if role == Role::Assistant {
                return Err(LlmError::unsupported(provider, "an image in an assistant message"));
            }
            Ok(AnthropicContentBlock::Image {
                source: image_source(source, mime_type.as_deref(), provider)?,
            })
        }
        ContentPart::ToolCall { id, name, arguments } => {
            if role != Role::Assistant {
                return Err(LlmError::unsupported(provider, "a tool call outside an assistant message"));
            }
            Ok(AnthropicContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: arguments.clone(),
            })
        }
        ContentPart::ToolResult { id, value } => {
            if role == Role::Assistant {
                return Err(LlmError::unsupported(provider, "a tool result in an assistant message"));
            }
            Ok(AnthropicContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: Some(AnthropicContent::Text(value_to_text(value))),
                is_error: None,
            })
        }
    }
}

fn image_source(
    source: &ImageSource,
    mime_type: Option<&str>,
    provider: Provider,
) -> Result<AnthropicImageSource, LlmError> {
    match source {
        ImageSource::Bytes(bytes) => {
            let mime = mime_type
                .filter(|mime| SUPPORTED_IMAGE_TYPES.contains(mime))
                .ok_or_else(|| {
                    LlmError::unsupported(
                        provider,
                        format!("images of type {}", mime_type.unwrap_or("unknown")),
                    )
                })?;
            Ok(AnthropicImageSource {
                source_type: "base64".to_owned(),
                media_type: Some(mime.to_owned()),
                data: Some(encode_base64(bytes)),
                url: None,
            })
        }
        ImageSource::Url(url) => Ok(AnthropicImageSource {
            source_type: "url".to_owned(),
            media_type: None,
            data: None,
            url: Some(url.clone()),
        }),
    }
}

/// Anthropic tool descriptor
pub fn tool_to_wire(schema: &ToolSchema) -> AnthropicTool {
    AnthropicTool {
        name: schema.name.clone(),
        description: Some(schema.description.clone()),
        input_schema: schema.parameters_or_empty(),
    }
}

// -- Inbound: wire -> canonical --

/// Convert Anthropic messages to canonical messages
///
/// A `user` message made only of tool results reads back as a tool message.
pub fn messages_from_wire(messages: &[AnthropicMessage], provider: Provider) -> Result<Vec<Message>, LlmError> {
    messages
        .iter()
        .map(|message| {
            let role = match message.role.as_str() {
                "system" => Role::System,
                "assistant" => Role::Assistant,
                _ => Role::User,
            };
            match &message.content {
                AnthropicContent::Text(text) => Ok(Message::new(role, vec![ContentPart::text(text)])),
                AnthropicContent::Blocks(blocks) => blocks_to_message(role, blocks, provider),
            }
        })
        .collect()
}

/// Convert content blocks, as found in a response, into one message
pub fn blocks_to_message(
    role: Role,
    blocks: &[AnthropicContentBlock],
    provider: Provider,
) -> Result<Message, LlmError> {
    let mut content = Vec::with_capacity(blocks.len());

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => content.push(ContentPart::text(text)),
            AnthropicContentBlock::Image { source } => content.push(image_from_wire(source, provider)?),
            AnthropicContentBlock::ToolUse { id, name, input } => content.push(ContentPart::ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: input.clone(),
            }),
            AnthropicContentBlock::ToolResult {
                tool_use_id, content: result, ..
            } => content.push(ContentPart::ToolResult {
                id: tool_use_id.clone(),
                value: text_to_value(&result.as_ref().map(result_text).unwrap_or_default()),
            }),
            AnthropicContentBlock::Other => {
                tracing::debug!("skipping uninterpreted anthropic content block");
            }
        }
    }

    let only_results = !content.is_empty()
        && content
            .iter()
            .all(|part| matches!(part, ContentPart::ToolResult { .. }));
    let role = if role == Role::User && only_results { Role::Tool } else { role };

    Ok(Message::new(role, content))
}

fn image_from_wire(source: &AnthropicImageSource, provider: Provider) -> Result<ContentPart, LlmError> {
    match (&source.data, &source.url) {
        (Some(data), _) => Ok(ContentPart::Image {
            source: ImageSource::Bytes(decode_base64(data, provider)?),
            mime_type: source.media_type.clone(),
        }),
        (None, Some(url)) => Ok(ContentPart::image_url(url)),
        (None, None) => Err(LlmError::unsupported(
            provider,
            format!("an image source of type {}", source.source_type),
        )),
    }
}

fn result_text(content: &AnthropicContent) -> String {
    match content {
        AnthropicContent::Text(text) => text.clone(),
        AnthropicContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect(),
    }
}
