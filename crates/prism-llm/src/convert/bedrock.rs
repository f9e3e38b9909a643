//! Conversion between canonical messages and Bedrock Converse messages

use serde_json::Value;

use super::{check_system_position, decode_base64, encode_base64, image_format, system_text};
use crate::error::LlmError;
use crate::protocol::bedrock::{
    BedrockContentBlock, BedrockImage, BedrockImageSource, BedrockInputSchema, BedrockMessage, BedrockTool,
    BedrockToolResult, BedrockToolResultContent, BedrockToolSpec, BedrockToolUse,
};
use crate::provider::Provider;
use crate::tool::ToolSchema;
use crate::types::{ContentPart, ImageSource, Message, Role};

// -- Outbound: canonical -> wire --

/// Convert canonical messages to Converse messages
pub fn messages_to_wire(messages: &[Message], provider: Provider) -> Result<Vec<BedrockMessage>, LlmError> {
    check_system_position(messages, provider)?;
    messages
        .iter()
        .map(|message| {
            let role = match message.role {
                Role::System => {
                    return Ok(BedrockMessage {
                        role: "system".to_owned(),
                        content: vec![BedrockContentBlock::text(system_text(message, provider)?)],
                    });
                }
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            };

            let content = message
                .content
                .iter()
                .map(|part| block_to_wire(part, message.role, provider))
                .collect::<Result<_, _>>()?;

            Ok(BedrockMessage {
                role: role.to_owned(),
                content,
            })
        })
        .collect()
}

fn block_to_wire(part: &ContentPart, role: Role, provider: Provider) -> Result<BedrockContentBlock, LlmError> {
    let block = match part {
        ContentPart::Text { text } => BedrockContentBlock::text(text.clone()),
        ContentPart::Image { source, mime_type } => {
            let ImageSource::Bytes(bytes) = source else {
                return Err(LlmError::unsupported(provider, "images referenced by URL"));
            };
            let format = mime_type
                .as_deref()
                .and_then(image_format)
                .ok_or_else(|| {
                    LlmError::unsupported(
                        provider,
                        format!("images of type {}", mime_type.as_deref().unwrap_or("unknown")),
                    )
                })?;
            BedrockContentBlock {
                image: Some(BedrockImage {
                    format: format.to_owned(),
                    source: BedrockImageSource {
                        bytes: encode_base64(bytes),
                    },
                }),
                ..BedrockContentBlock::default()
            }
        }
        ContentPart::ToolCall { id, name, arguments } => {
            if role != Role::Assistant {
                return Err(LlmError::unsupported(provider, "a tool call outside an assistant message"));
            }
            BedrockContentBlock {
                tool_use: Some(BedrockToolUse {
                    tool_use_id: id.clone(),
                    name: name.clone(),
                    input: arguments.clone(),
                }),
                ..BedrockContentBlock::default()
            }
        }
        ContentPart::ToolResult { id, value } => {
            if role == Role::Assistant {
                return Err(LlmError::unsupported(provider, "a tool result in an assistant message"));
            }
            let content = match value {
                Value::String(text) => BedrockToolResultContent {
                    text: Some(text.clone()),
                    json: None,
                },
                other => BedrockToolResultContent {
                    text: None,
                    json: Some(other.clone()),
                },
            };
            BedrockContentBlock {
                tool_result: Some(BedrockToolResult {
                    tool_use_id: id.clone(),
                    content: vec![content],
                    status: None,
                }),
                ..BedrockContentBlock::default()
            }
        }
    };
    Ok(block)
}

/// Converse tool descriptor
pub fn tool_to_wire(schema: &ToolSchema) -> BedrockTool {
    BedrockTool {
        tool_spec: BedrockToolSpec {
            name: schema.name.clone(),
            description: Some(schema.description.clone()),
            input_schema: BedrockInputSchema {
                json: schema.parameters_or_empty(),
            },
        },
    }
}

// -- Inbound: wire -> canonical --

/// Convert Converse messages to canonical messages
pub fn messages_from_wire(messages: &[BedrockMessage], provider: Provider) -> Result<Vec<Message>, LlmError> {
    messages
        .iter()
        .map(|message| message_from_wire(message, provider))
        .collect()
}

/// Convert one Converse message, as found in a response
pub fn message_from_wire(message: &BedrockMessage, provider: Provider) -> Result<Message, LlmError> {
    let role = match message.role.as_str() {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        _ => Role::User,
    };

    let mut content = Vec::with_capacity(message.content.len());
    for block in &message.content {
        if let Some(text) = &block.text {
            content.push(ContentPart::text(text));
        } else if let Some(image) = &block.image {
            content.push(ContentPart::Image {
                source: ImageSource::Bytes(decode_base64(&image.source.bytes, provider)?),
                mime_type: Some(format!("image/{}", image.format)),
            });
        } else if let Some(tool_use) = &block.tool_use {
            content.push(ContentPart::ToolCall {
                id: tool_use.tool_use_id.clone(),
                name: tool_use.name.clone(),
                arguments: tool_use.input.clone(),
            });
        } else if let Some(result) = &block.tool_result {
            content.push(ContentPart::ToolResult {
                id: result.tool_use_id.clone(),
                value: result_value(&result.content),
            });
        } else {
            tracing::debug!("skipping uninterpreted bedrock content block");
        }
    }

    let only_results = !content.is_empty()
        && content
            .iter()
            .all(|part| matches!(part, ContentPart::ToolResult { .. }));
    let role = if role == Role::User && only_results { Role::Tool } else { role };

    Ok(Message::new(role, content))
}

fn result_value(content: &[BedrockToolResultContent]) -> Value {
    if let [single] = content
        && let Some(json) = &single.json
    {
        return json.clone();
    }

    let text = content
        .iter()
        .map(|entry| match (&entry.text, &entry.json) {
            (Some(text), _) => text.clone(),
            (None, Some(json)) => json.to_string(),
            (None, None) => String::new(),
        })
        .collect::<String>();
    Value::String(text)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn history() -> Vec<Message> {
        vec![
            Message::system("You are a librarian"),
            Message::new(
                Role::User,
                vec![
                    ContentPart::text("Who wrote this?"),
                    ContentPart::image_bytes(b"gif".to_vec(), "image/gif"),
                ],
            ),
            Message::new(
                Role::Assistant,
                vec![ContentPart::ToolCall {
                    id: "tooluse_1".to_owned(),
                    name: "get_book_author".to_owned(),
                    arguments: json!({"title": "The Name of the Wind"}),
                }],
            ),
            Message::new(
                Role::Tool,
                vec![ContentPart::ToolResult {
                    id: "tooluse_1".to_owned(),
                    value: json!({"author": "Patrick Rothfuss"}),
                }],
            ),
        ]
    }

    #[test]
    fn history_round_trips() {
        let wire = messages_to_wire(&history(), Provider::Bedrock).unwrap();
        assert_eq!(messages_from_wire(&wire, Provider::Bedrock).unwrap(), history());
    }

    #[test]
    fn wire_uses_converse_block_names() {
        let wire = serde_json::to_value(messages_to_wire(&history(), Provider::Bedrock).unwrap()).unwrap();
        assert_eq!(wire[1]["content"][1]["image"]["format"], "gif");
        assert_eq!(wire[2]["content"][0]["toolUse"]["toolUseId"], "tooluse_1");
        assert_eq!(
            wire[3]["content"][0]["toolResult"]["content"][0]["json"],
            json!({"author": "Patrick Rothfuss"})
        );
    }

    #[test]
    fn url_images_are_unsupported() {
        let message = Message::new(Role::User, vec![ContentPart::image_url("https://example.com/a.png")]);
        assert!(matches!(
            messages_to_wire(&[message], Provider::Bedrock),
            Err(LlmError::UnsupportedContent { .. })
        ));
    }
}
