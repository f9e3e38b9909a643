//! Conversion between canonical messages and Google `generateContent` contents

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{check_system_position, decode_base64, encode_base64, system_text};
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleBlob, GoogleContent, GoogleFileData, GoogleFunctionCall, GoogleFunctionDeclaration, GoogleFunctionResponse,
    GooglePart,
};
use crate::provider::Provider;
use crate::tool::ToolSchema;
use crate::types::{ContentPart, ImageSource, Message, Role};

/// Key non-object tool outputs are wrapped under
const RESULT_KEY: &str = "result";

// -- Outbound: canonical -> wire --

/// Convert canonical messages to Google contents
///
/// Function responses must carry the function name, which is taken from the
/// earlier tool call with the same id.
pub fn messages_to_wire(messages: &[Message], provider: Provider) -> Result<Vec<GoogleContent>, LlmError> {
    check_system_position(messages, provider)?;

    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        let role = match message.role {
            Role::System => {
                contents.push(GoogleContent {
                    role: Some("system".to_owned()),
                    parts: vec![GooglePart::text(system_text(message, provider)?)],
                });
                continue;
            }
            Role::User | Role::Tool => "user",
            Role::Assistant => "model",
        };

        let mut parts = Vec::with_capacity(message.content.len());
        for part in &message.content {
            parts.push(part_to_wire(part, message.role, provider, &mut call_names)?);
        }

        contents.push(GoogleContent {
            role: Some(role.to_owned()),
            parts,
        });
    }

    Ok(contents)
}

fn part_to_wire<'a>(
    part: &'a ContentPart,
    role: Role,
    provider: Provider,
    call_names: &mut HashMap<&'a str, &'a str>,
) -> Result<GooglePart, LlmError> {
    let wire = match part {
        ContentPart::Text { text } => GooglePart::text(text.clone()),
        ContentPart::Image { source, mime_type } => {
            if role == Role::Assistant {
                return Err(LlmError::unsupported(provider, "an image in a model message"));
            }
            image_to_wire(source, mime_type.as_deref(), provider)?
        }
        ContentPart::ToolCall { id, name, arguments } => {
            if role != Role::Assistant {
                return Err(LlmError::unsupported(provider, "a tool call outside a model message"));
            }
            call_names.insert(id, name);
            GooglePart {
                function_call: Some(GoogleFunctionCall {
                    id: wire_id(id, name),
                    name: name.clone(),
                    args: arguments.clone(),
                }),
                ..GooglePart::default()
            }
        }
        ContentPart::ToolResult { id, value } => {
            let name = call_names.get(id.as_str()).ok_or_else(|| {
                LlmError::unsupported(provider, format!("a tool result for unknown call `{id}`"))
            })?;
            GooglePart {
                function_response: Some(GoogleFunctionResponse {
                    id: wire_id(id, name),
                    name: (*name).to_owned(),
                    response: wrap_response(value),
                }),
                ..GooglePart::default()
            }
        }
    };
    Ok(wire)
}

fn image_to_wire(source: &ImageSource, mime_type: Option<&str>, provider: Provider) -> Result<GooglePart, LlmError> {
    match source {
        ImageSource::Bytes(bytes) => {
            let mime =
                mime_type.ok_or_else(|| LlmError::unsupported(provider, "an inline image without a media type"))?;
            Ok(GooglePart {
                inline_data: Some(GoogleBlob {
                    mime_type: mime.to_owned(),
                    data: encode_base64(bytes),
                }),
                ..GooglePart::default()
            })
        }
        ImageSource::Url(url) => Ok(GooglePart {
            file_data: Some(GoogleFileData {
                mime_type: mime_type.map(str::to_owned),
                file_uri: url.clone(),
            }),
            ..GooglePart::default()
        }),
    }
}

/// Ids equal to the function name were synthesized on the way in
fn wire_id(id: &str, name: &str) -> Option<String> {
    (id != name).then(|| id.to_owned())
}

/// Function responses must be objects
fn wrap_response(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        other => {
            let mut object = Map::new();
            object.insert(RESULT_KEY.to_owned(), other.clone());
            Value::Object(object)
        }
    }
}

/// Google function declaration
pub fn function_to_wire(schema: &ToolSchema) -> GoogleFunctionDeclaration {
    GoogleFunctionDeclaration {
        name: schema.name.clone(),
        description: Some(schema.description.clone()),
        parameters: schema.parameters.clone(),
    }
}

// -- Inbound: wire -> canonical --

/// Convert Google contents to canonical messages
pub fn messages_from_wire(contents: &[GoogleContent], provider: Provider) -> Result<Vec<Message>, LlmError> {
    contents
        .iter()
        .map(|content| content_to_message(content, provider))
        .collect()
}

/// Convert one content object, as found in a response candidate
///
/// Function calls without an id use the function name as their id.
pub fn content_to_message(content: &GoogleContent, provider: Provider) -> Result<Message, LlmError> {
    let role = match content.role.as_deref() {
        Some("model") => Role::Assistant,
        Some("system") => Role::System,
        _ => Role::User,
    };

    let mut parts = Vec::with_capacity(content.parts.len());
    for part in &content.parts {
        if part.thought == Some(true) {
            continue;
        }

        if let Some(text) = &part.text {
            parts.push(ContentPart::text(text));
        } else if let Some(blob) = &part.inline_data {
            parts.push(ContentPart::Image {
                source: ImageSource::Bytes(decode_base64(&blob.data, provider)?),
                mime_type: Some(blob.mime_type.clone()),
            });
        } else if let Some(file) = &part.file_data {
            parts.push(ContentPart::Image {
                source: ImageSource::Url(file.file_uri.clone()),
                mime_type: file.mime_type.clone(),
            });
        } else if let Some(call) = &part.function_call {
            parts.push(ContentPart::ToolCall {
                id: call.id.clone().unwrap_or_else(|| call.name.clone()),
                name: call.name.clone(),
                arguments: call.args.clone(),
            });
        } else if let Some(response) = &part.function_response {
            parts.push(ContentPart::ToolResult {
                id: response.id.clone().unwrap_or_else(|| response.name.clone()),
                value: unwrap_response(&response.response),
            });
        } else {
            tracing::debug!("skipping empty google content part");
        }
    }

    let only_results = !parts.is_empty()
        && parts
            .iter()
            .all(|part| matches!(part, ContentPart::ToolResult { .. }));
    let role = if role == Role::User && only_results { Role::Tool } else { role };

    Ok(Message::new(role, parts))
}

fn unwrap_response(response: &Value) -> Value {
    match response.as_object() {
        Some(object) if object.len() == 1 => match object.get(RESULT_KEY) {
            Some(inner) if !inner.is_object() => inner.clone(),
            _ => response.clone(),
        },
        _ => response.clone(),
    }
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
                    ContentPart::image_bytes(b"jpg".to_vec(), "image/jpeg"),
                ],
            ),
            Message::new(
                Role::Assistant,
                vec![ContentPart::ToolCall {
                    id: "get_book_author".to_owned(),
                    name: "get_book_author".to_owned(),
                    arguments: json!({"title": "The Name of the Wind"}),
                }],
            ),
            Message::new(
                Role::Tool,
                vec![ContentPart::ToolResult {
                    id: "get_book_author".to_owned(),
                    value: json!("Patrick Rothfuss"),
                }],
            ),
            Message::assistant("Patrick Rothfuss."),
        ]
    }

    #[test]
    fn history_round_trips() {
        let wire = messages_to_wire(&history(), Provider::Google).unwrap();
        assert_eq!(messages_from_wire(&wire, Provider::Google).unwrap(), history());
    }

    #[test]
    fn function_response_carries_the_call_name() {
        let wire = serde_json::to_value(messages_to_wire(&history(), Provider::Google).unwrap()).unwrap();

        assert_eq!(wire[2]["role"], "model");
        assert_eq!(
            wire[3]["parts"][0]["functionResponse"],
            json!({"name": "get_book_author", "response": {"result": "Patrick Rothfuss"}})
        );
        assert_eq!(wire[1]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
    }

    #[test]
    fn provider_ids_are_kept() {
        let messages = vec![
            Message::new(
                Role::Assistant,
                vec![ContentPart::ToolCall {
                    id: "fc_9".to_owned(),
                    name: "lookup".to_owned(),
                    arguments: json!({}),
                }],
            ),
            Message::new(
                Role::Tool,
                vec![ContentPart::ToolResult {
                    id: "fc_9".to_owned(),
                    value: json!({"found": true}),
                }],
            ),
        ];
        let wire = messages_to_wire(&messages, Provider::Vertex).unwrap();
        assert_eq!(wire[1].parts[0].function_response.as_ref().unwrap().id.as_deref(), Some("fc_9"));
        assert_eq!(messages_from_wire(&wire, Provider::Vertex).unwrap(), messages);
    }

    #[test]
    fn result_for_unknown_call_is_unsupported() {
        let messages = vec![Message::new(
            Role::Tool,
            vec![ContentPart::ToolResult {
                id: "missing".to_owned(),
                value: json!(1),
            }],
        )];
        assert!(matches!(
            messages_to_wire(&messages, Provider::Google),
            Err(LlmError::UnsupportedContent { .. })
        ));
    }
}
