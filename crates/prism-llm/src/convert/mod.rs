//! Conversion between canonical messages and provider wire formats
//!
//! Each submodule covers one wire family. Conversions are fallible: a part
//! the target schema cannot carry is an error, never dropped.

pub mod anthropic;
pub mod bedrock;
pub mod google;
pub mod openai;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LlmError;
use crate::provider::{Family, Provider};
use crate::tool::ToolSchema;
use crate::types::{Message, Role};

/// Convert canonical messages into the provider's native message list
///
/// A leading system message stays in the list with role `system`; moving it
/// to a top-level field is done by call setup.
pub fn to_provider_format(messages: &[Message], provider: Provider) -> Result<Value, LlmError> {
    let native = match provider.family() {
        Family::OpenAi => serde_json::to_value(openai::messages_to_wire(messages, provider)?),
        Family::Anthropic => serde_json::to_value(anthropic::messages_to_wire(messages, provider)?),
        Family::Google => serde_json::to_value(google::messages_to_wire(messages, provider)?),
        Family::Bedrock => serde_json::to_value(bedrock::messages_to_wire(messages, provider)?),
    };

    native.map_err(|e| LlmError::Internal(e.into()))
}

/// Convert a provider's native message list into canonical messages
pub fn from_provider_format(native: &Value, provider: Provider) -> Result<Vec<Message>, LlmError> {
    match provider.family() {
        Family::OpenAi => openai::messages_from_wire(&parse_native::<Vec<_>>(native, provider)?, provider),
        Family::Anthropic => anthropic::messages_from_wire(&parse_native::<Vec<_>>(native, provider)?, provider),
        Family::Google => google::messages_from_wire(&parse_native::<Vec<_>>(native, provider)?, provider),
        Family::Bedrock => bedrock::messages_from_wire(&parse_native::<Vec<_>>(native, provider)?, provider),
    }
}

fn parse_native<T: DeserializeOwned>(native: &Value, provider: Provider) -> Result<T, LlmError> {
    T::deserialize(native).map_err(|e| LlmError::unsupported(provider, format!("message list: {e}")))
}

/// Native tool descriptor for a schema
pub fn to_provider_schema(schema: &ToolSchema, provider: Provider) -> Value {
    let native = match provider.family() {
        Family::OpenAi => serde_json::to_value(openai::tool_to_wire(schema)),
        Family::Anthropic => serde_json::to_value(anthropic::tool_to_wire(schema)),
        Family::Google => serde_json::to_value(google::function_to_wire(schema)),
        Family::Bedrock => serde_json::to_value(bedrock::tool_to_wire(schema)),
    };

    // Plain structs of strings and JSON values always serialize
    native.unwrap_or(Value::Null)
}

/// Reject system messages outside the first position
///
/// Providers that take the system prompt as a top-level field have nowhere
/// to put a second one.
pub(crate) fn check_system_position(messages: &[Message], provider: Provider) -> Result<(), LlmError> {
    if !provider.hoists_system() {
        return Ok(());
    }

    match messages.iter().skip(1).position(|m| m.role == Role::System) {
        Some(offset) => Err(LlmError::unsupported(
            provider,
            format!("a system message at position {}", offset + 1),
        )),
        None => Ok(()),
    }
}

/// Text of a system message, which may only hold text
pub(crate) fn system_text(message: &Message, provider: Provider) -> Result<String, LlmError> {
    if let Some(part) = message.content.iter().find(|part| part.as_text().is_none()) {
        return Err(LlmError::unsupported(
            provider,
            format!("a {} part in a system message", part.kind()),
        ));
    }
    Ok(message.text())
}

/// Tool output as text for providers that only accept strings
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Inverse of [`value_to_text`] for structured outputs
pub(crate) fn text_to_value(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(text.to_owned()),
    }
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub(crate) fn decode_base64(data: &str, provider: Provider) -> Result<Vec<u8>, LlmError> {
    STANDARD
        .decode(data)
        .map_err(|e| LlmError::unsupported(provider, format!("image data that is not valid base64: {e}")))
}

/// Split a `data:` URI into media type and payload
pub(crate) fn parse_data_uri(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, data))
}

/// Image subtype for providers that take a format name instead of a MIME type
pub(crate) fn image_format(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpeg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::ContentPart;

    #[test]
    fn data_uris_split_into_parts() {
        assert_eq!(parse_data_uri("data:image/png;base64,AAAA"), Some(("image/png", "AAAA")));
        assert_eq!(parse_data_uri("https://example.com/a.png"), None);
        assert_eq!(parse_data_uri("data:text/plain,hello"), None);
    }

    #[test]
    fn structured_text_parses_back() {
        assert_eq!(text_to_value("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(text_to_value("plain"), json!("plain"));
        assert_eq!(value_to_text(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn late_system_message_is_rejected_for_hoisting_providers() {
        let messages = vec![Message::user("hi"), Message::system("late")];
        assert!(matches!(
            check_system_position(&messages, Provider::Anthropic),
            Err(LlmError::UnsupportedContent { .. })
        ));
        assert!(check_system_position(&messages, Provider::OpenAi).is_ok());
    }

    #[test]
    fn system_message_must_be_text() {
        let message = Message::new(
            Role::System,
            vec![ContentPart::image_url("https://example.com/a.png")],
        );
        assert!(system_text(&message, Provider::Google).is_err());
    }

    #[test]
    fn generic_entry_points_dispatch_by_family() {
        let messages = vec![Message::user("hello")];
        for provider in [Provider::Mistral, Provider::Anthropic, Provider::Vertex, Provider::Bedrock] {
            let native = to_provider_format(&messages, provider).unwrap();
            assert_eq!(from_provider_format(&native, provider).unwrap(), messages);
        }
    }

    #[test]
    fn native_list_must_be_an_array() {
        let err = from_provider_format(&json!({"role": "user", "content": "hi"}), Provider::OpenAi).unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedContent { provider: Provider::OpenAi, .. }));
    }
}
