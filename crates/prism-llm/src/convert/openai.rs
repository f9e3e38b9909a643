//! Conversion between canonical messages and the `OpenAI` chat format

use serde_json::Value;

use super::{decode_base64, encode_base64, parse_data_uri, text_to_value, value_to_text};
use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall, OpenAiImageUrl, OpenAiMessage, OpenAiTool,
    OpenAiToolCall,
};
use crate::provider::Provider;
use crate::tool::ToolSchema;
use crate::types::{ContentPart, ImageSource, Message, Role};

// -- Outbound: canonical -> wire --

/// Convert canonical messages to `OpenAI` messages
///
/// Every tool result becomes its own `tool` message, in part order.
pub fn messages_to_wire(messages: &[Message], provider: Provider) -> Result<Vec<OpenAiMessage>, LlmError> {
    let mut wire = Vec::with_capacity(messages.len());
    for message in messages {
        message_to_wire(message, provider, &mut wire)?;
    }
    Ok(wire)
}

fn message_to_wire(message: &Message, provider: Provider, out: &mut Vec<OpenAiMessage>) -> Result<(), LlmError> {
    let role = match message.role {
        Role::System => "system",
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    };

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut emitted_results = false;

    for part in &message.content {
        match part {
            ContentPart::Text { text } => parts.push(OpenAiContentPart::Text { text: text.clone() }),
            ContentPart::Image { source, mime_type } => {
                if message.role != Role::User {
                    return Err(LlmError::unsupported(provider, "an image outside a user message"));
                }
                parts.push(image_to_wire(source, mime_type.as_deref(), provider)?);
            }
            ContentPart::ToolCall { id, name, arguments } => {
                if message.role != Role::Assistant {
                    return Err(LlmError::unsupported(provider, "a tool call outside an assistant message"));
                }
                tool_calls.push(OpenAiToolCall {
                    id: id.clone(),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: name.clone(),
                        arguments: arguments.to_string(),
                    },
                });
            }
            ContentPart::ToolResult { id, value } => {
                // Parts before a result keep their place ahead of it
                if !parts.is_empty() || !tool_calls.is_empty() {
                    out.push(build_message(role, std::mem::take(&mut parts), std::mem::take(&mut tool_calls)));
                }
                out.push(OpenAiMessage {
                    role: "tool".to_owned(),
                    content: Some(OpenAiContent::Text(value_to_text(value))),
                    name: None,
                    tool_calls: None,
                    tool_call_id: Some(id.clone()),
                });
                emitted_results = true;
            }
        }
    }

    if !emitted_results || !parts.is_empty() || !tool_calls.is_empty() {
        out.push(build_message(role, parts, tool_calls));
    }
    Ok(())
}

fn build_message(role: &str, parts: Vec<OpenAiContentPart>, tool_calls: Vec<OpenAiToolCall>) -> OpenAiMessage {
    let content = match parts.as_slice() {
        [] if !tool_calls.is_empty() => None,
        [] => Some(OpenAiContent::Text(String::new())),
        [OpenAiContentPart::Text { text }] => Some(OpenAiContent::Text(text.clone())),
        _ => Some(OpenAiContent::Parts(parts)),
    };

    OpenAiMessage {
        role: role.to_owned(),
        content,
        name: None,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }
}

fn image_to_wire(
    source: &ImageSource,
    mime_type: Option<&str>,
    provider: Provider,
) -> Result<OpenAiContentPart, LlmError> {
    let capabilities = provider.capabilities();
    let url = match source {
        ImageSource::Bytes(bytes) => {
            if !capabilities.images {
                return Err(LlmError::unsupported(provider, "inline images"));
            }
            let mime =
                mime_type.ok_or_else(|| LlmError::unsupported(provider, "an inline image without a media type"))?;
            format!("data:{mime};base64,{}", encode_base64(bytes))
        }
        ImageSource::Url(url) => {
            if !capabilities.image_urls {
                return Err(LlmError::unsupported(provider, "images referenced by URL"));
            }
            url.clone()
        }
    };

    Ok(OpenAiContentPart::ImageUrl {
        image_url: OpenAiImageUrl { url, detail: None },
    })
}

/// `OpenAI` tool descriptor
pub fn tool_to_wire(schema: &ToolSchema) -> OpenAiTool {
    OpenAiTool {
        tool_type: "function".to_owned(),
        function: OpenAiFunction {
            name: schema.name.clone(),
            description: Some(schema.description.clone()),
            parameters: schema.parameters.clone(),
        },
    }
}

// -- Inbound: wire -> canonical --

/// Convert `OpenAI` messages to canonical messages
pub fn messages_from_wire(messages: &[OpenAiMessage], provider: Provider) -> Result<Vec<Message>, LlmError> {
    messages
        .iter()
        .map(|message| message_from_wire(message, provider))
        .collect()
}

/// Convert one `OpenAI` message, as found in a response choice
pub fn message_from_wire(message: &OpenAiMessage, provider: Provider) -> Result<Message, LlmError> {
    let role = match message.role.as_str() {
        "system" | "developer" => Role::System,
        "assistant" => Role::Assistant,
        "tool" | "function" => Role::Tool,
        _ => Role::User,
    };

    if role == Role::Tool {
        let text = message.content.as_ref().map(content_text).unwrap_or_default();
        return Ok(Message::new(
            Role::Tool,
            vec![ContentPart::ToolResult {
                id: message.tool_call_id.clone().unwrap_or_default(),
                value: text_to_value(&text),
            }],
        ));
    }

    let mut content = match &message.content {
        None => Vec::new(),
        Some(OpenAiContent::Text(text)) if text.is_empty() && message.tool_calls.is_some() => Vec::new(),
        Some(OpenAiContent::Text(text)) => vec![ContentPart::text(text)],
        Some(OpenAiContent::Parts(parts)) => parts
            .iter()
            .map(|part| part_from_wire(part, provider))
            .collect::<Result<_, _>>()?,
    };

    for call in message.tool_calls.iter().flatten() {
        content.push(ContentPart::ToolCall {
            id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: decode_arguments(&call.function.arguments),
        });
    }

    Ok(Message::new(role, content))
}

fn part_from_wire(part: &OpenAiContentPart, provider: Provider) -> Result<ContentPart, LlmError> {
    match part {
        OpenAiContentPart::Text { text } => Ok(ContentPart::text(text)),
        OpenAiContentPart::ImageUrl { image_url } => match parse_data_uri(&image_url.url) {
            Some((mime, data)) => Ok(ContentPart::Image {
                source: ImageSource::Bytes(decode_base64(data, provider)?),
                mime_type: Some(mime.to_owned()),
            }),
            None => Ok(ContentPart::image_url(&image_url.url)),
        },
    }
}

/// Arguments as sent, kept as a string when they are not valid JSON
///
/// Validation against the tool happens later and reports the error there.
pub(crate) fn decode_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_owned()))
}

fn content_text(content: &OpenAiContent) -> String {
    match content {
        OpenAiContent::Text(text) => text.clone(),
        OpenAiContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                OpenAiContentPart::Text { text } => Some(text.as_str()),
                OpenAiContentPart::ImageUrl { .. } => None,
            })
            .collect(),
    }
}
