//! AWS Bedrock transport over the Converse API
//!
//! Call setup produces Converse JSON. This transport maps it onto the SDK
//! builders and maps SDK output back to the same JSON shape, so response
//! and stream handling never see SDK types.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::types::{
    AnyToolChoice, AutoToolChoice, ContentBlock, ContentBlockDelta, ContentBlockStart, ConversationRole,
    ConverseOutput, ConverseStreamOutput, ImageBlock, ImageFormat, ImageSource, InferenceConfiguration, Message,
    SpecificToolChoice, SystemContentBlock, TokenUsage, Tool, ToolChoice, ToolConfiguration, ToolInputSchema,
    ToolResultBlock, ToolResultContentBlock, ToolResultStatus, ToolSpecification, ToolUseBlock,
};
use aws_smithy_types::{Blob, Document, Number};
use futures_util::StreamExt;
use prism_config::BedrockSettings;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use super::{ChunkStream, Transport, TransportRequest};
use crate::convert::{decode_base64, encode_base64};
use crate::error::LlmError;
use crate::protocol::bedrock::{
    BedrockBlockDelta, BedrockBlockStart, BedrockBlockStop, BedrockContentBlock, BedrockDelta, BedrockImage,
    BedrockImageSource, BedrockInferenceConfig, BedrockMessage, BedrockMessageStart, BedrockMessageStop,
    BedrockOutput, BedrockRequest, BedrockResponse, BedrockStart, BedrockStreamEvent, BedrockStreamMetadata,
    BedrockToolChoice, BedrockToolConfig, BedrockToolResult, BedrockToolUse, BedrockToolUseDelta,
    BedrockToolUseStart, BedrockUsage,
};
use crate::provider::Provider;

/// Bedrock runtime transport
pub struct BedrockTransport {
    client: BedrockClient,
}

impl BedrockTransport {
    /// Build a runtime client for the configured region
    ///
    /// Static credentials are used when configured, otherwise the default
    /// AWS credential chain applies.
    pub async fn new(settings: &BedrockSettings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&settings.access_key_id, &settings.secret_access_key) {
            let credentials = aws_credential_types::Credentials::new(
                access_key.expose_secret(),
                secret_key.expose_secret(),
                settings
                    .session_token
                    .as_ref()
                    .map(|token| token.expose_secret().to_owned()),
                None,
                "prism-config",
            );
            loader = loader.credentials_provider(credentials);
        }

        let config = loader.load().await;
        tracing::debug!(region = %settings.region, "bedrock client configured");

        Self {
            client: BedrockClient::new(&config),
        }
    }

    /// Wrap an existing SDK client
    pub const fn from_client(client: BedrockClient) -> Self {
        Self { client }
    }
}

/// SDK-typed pieces of a Converse request
struct ConverseInput {
    system: Vec<SystemContentBlock>,
    messages: Vec<Message>,
    inference: Option<InferenceConfiguration>,
    tools: Option<ToolConfiguration>,
    additional: Option<Document>,
}

#[async_trait]
impl Transport for BedrockTransport {
    async fn create(&self, request: TransportRequest) -> Result<Value, LlmError> {
        let input = converse_input(&request.payload)?;

        let output = self
            .client
            .converse()
            .model_id(&request.model)
            .set_system(Some(input.system))
            .set_messages(Some(input.messages))
            .set_inference_config(input.inference)
            .set_tool_config(input.tools)
            .set_additional_model_request_fields(input.additional)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = %Provider::Bedrock, error = %e, "bedrock converse failed");
                LlmError::transport(Provider::Bedrock, e.to_string())
            })?;

        let message = match output.output() {
            Some(ConverseOutput::Message(message)) => Some(message_from_sdk(message)),
            _ => None,
        };

        let response = BedrockResponse {
            output: BedrockOutput { message },
            stop_reason: Some(output.stop_reason().as_str().to_owned()),
            usage: output.usage().map(usage_from_sdk),
        };

        serde_json::to_value(response).map_err(|e| LlmError::Internal(e.into()))
    }

    async fn stream(&self, request: TransportRequest) -> Result<ChunkStream, LlmError> {
        let input = converse_input(&request.payload)?;

        let output = self
            .client
            .converse_stream()
            .model_id(&request.model)
            .set_system(Some(input.system))
            .set_messages(Some(input.messages))
            .set_inference_config(input.inference)
            .set_tool_config(input.tools)
            .set_additional_model_request_fields(input.additional)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = %Provider::Bedrock, error = %e, "bedrock converse_stream failed");
                LlmError::transport(Provider::Bedrock, e.to_string())
            })?;

        // The receiver is dropped after the first error so the stream ends there
        let events = futures_util::stream::unfold(Some(output.stream), |state| async move {
            let mut receiver = state?;
            match receiver.recv().await {
                Ok(Some(event)) => Some((Ok(event_from_sdk(&event)), Some(receiver))),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(provider = %Provider::Bedrock, error = %e, "bedrock stream interrupted");
                    Some((
                        Err(LlmError::transport(Provider::Bedrock, format!("stream interrupted: {e}"))),
                        None,
                    ))
                }
            }
        });

        let chunks = events.filter_map(|event| async move {
            match event {
                Ok(Some(event)) => Some(serde_json::to_value(event).map_err(|e| LlmError::Internal(e.into()))),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(chunks))
    }
}

// -- Outbound: Converse JSON -> SDK --

fn converse_input(payload: &Value) -> Result<ConverseInput, LlmError> {
    let request: BedrockRequest = serde_json::from_value(payload.clone())
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid converse payload: {e}")))?;

    let system = request
        .system
        .unwrap_or_default()
        .into_iter()
        .map(|block| SystemContentBlock::Text(block.text))
        .collect();

    let messages = request
        .messages
        .iter()
        .map(message_to_sdk)
        .collect::<Result<_, _>>()?;

    Ok(ConverseInput {
        system,
        messages,
        inference: request.inference_config.as_ref().map(inference_to_sdk),
        tools: request.tool_config.as_ref().map(tools_to_sdk).transpose()?,
        additional: request.additional_model_request_fields.as_ref().map(value_to_document),
    })
}

fn message_to_sdk(message: &BedrockMessage) -> Result<Message, LlmError> {
    let role = if message.role == "assistant" {
        ConversationRole::Assistant
    } else {
        ConversationRole::User
    };

    let content = message
        .content
        .iter()
        .map(block_to_sdk)
        .collect::<Result<Vec<_>, _>>()?;

    Message::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(build_error)
}

fn block_to_sdk(block: &BedrockContentBlock) -> Result<ContentBlock, LlmError> {
    if let Some(text) = &block.text {
        return Ok(ContentBlock::Text(text.clone()));
    }

    if let Some(image) = &block.image {
        let bytes = decode_base64(&image.source.bytes, Provider::Bedrock)?;
        let image = ImageBlock::builder()
            .format(ImageFormat::from(image.format.as_str()))
            .source(ImageSource::Bytes(Blob::new(bytes)))
            .build()
            .map_err(build_error)?;
        return Ok(ContentBlock::Image(image));
    }

    if let Some(tool_use) = &block.tool_use {
        let tool_use = ToolUseBlock::builder()
            .tool_use_id(&tool_use.tool_use_id)
            .name(&tool_use.name)
            .input(value_to_document(&tool_use.input))
            .build()
            .map_err(build_error)?;
        return Ok(ContentBlock::ToolUse(tool_use));
    }

    if let Some(result) = &block.tool_result {
        let mut builder = ToolResultBlock::builder().tool_use_id(&result.tool_use_id);
        for entry in &result.content {
            builder = match (&entry.text, &entry.json) {
                (Some(text), _) => builder.content(ToolResultContentBlock::Text(text.clone())),
                (None, Some(json)) => builder.content(ToolResultContentBlock::Json(value_to_document(json))),
                (None, None) => builder,
            };
        }
        if let Some(status) = &result.status {
            builder = builder.status(ToolResultStatus::from(status.as_str()));
        }
        return Ok(ContentBlock::ToolResult(builder.build().map_err(build_error)?));
    }

    Err(LlmError::unsupported(Provider::Bedrock, "an empty content block"))
}

fn inference_to_sdk(config: &BedrockInferenceConfig) -> InferenceConfiguration {
    #[allow(clippy::cast_possible_truncation)]
    let builder = InferenceConfiguration::builder()
        .set_temperature(config.temperature.map(|t| t as f32))
        .set_top_p(config.top_p.map(|p| p as f32))
        .set_stop_sequences(config.stop_sequences.clone());

    #[allow(clippy::cast_possible_wrap)]
    let builder = builder.set_max_tokens(config.max_tokens.map(|n| n as i32));

    builder.build()
}

fn tools_to_sdk(config: &BedrockToolConfig) -> Result<ToolConfiguration, LlmError> {
    let mut builder = ToolConfiguration::builder();

    for tool in &config.tools {
        let spec = ToolSpecification::builder()
            .name(&tool.tool_spec.name)
            .set_description(tool.tool_spec.description.clone())
            .input_schema(ToolInputSchema::Json(value_to_document(&tool.tool_spec.input_schema.json)))
            .build()
            .map_err(build_error)?;
        builder = builder.tools(Tool::ToolSpec(spec));
    }

    if let Some(choice) = &config.tool_choice {
        builder = builder.tool_choice(tool_choice_to_sdk(choice)?);
    }

    builder.build().map_err(build_error)
}

fn tool_choice_to_sdk(choice: &BedrockToolChoice) -> Result<ToolChoice, LlmError> {
    if let Some(tool) = &choice.tool {
        let specific = SpecificToolChoice::builder()
            .name(&tool.name)
            .build()
            .map_err(build_error)?;
        return Ok(ToolChoice::Tool(specific));
    }
    if choice.any.is_some() {
        return Ok(ToolChoice::Any(AnyToolChoice::builder().build()));
    }
    Ok(ToolChoice::Auto(AutoToolChoice::builder().build()))
}

fn build_error(e: impl std::fmt::Display) -> LlmError {
    LlmError::Internal(anyhow::anyhow!("invalid converse request: {e}"))
}

// -- Inbound: SDK -> Converse JSON --

fn message_from_sdk(message: &Message) -> BedrockMessage {
    let content = message
        .content()
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(BedrockContentBlock::text(text.clone())),
            ContentBlock::ToolUse(tool_use) => Some(BedrockContentBlock {
                tool_use: Some(BedrockToolUse {
                    tool_use_id: tool_use.tool_use_id().to_owned(),
                    name: tool_use.name().to_owned(),
                    input: document_to_value(tool_use.input()),
                }),
                ..BedrockContentBlock::default()
            }),
            ContentBlock::Image(image) => match image.source() {
                Some(ImageSource::Bytes(blob)) => Some(BedrockContentBlock {
                    image: Some(BedrockImage {
                        format: image.format().as_str().to_owned(),
                        source: BedrockImageSource {
                            bytes: encode_base64(blob.as_ref()),
                        },
                    }),
                    ..BedrockContentBlock::default()
                }),
                _ => None,
            },
            ContentBlock::ToolResult(result) => Some(BedrockContentBlock {
                tool_result: Some(BedrockToolResult {
                    tool_use_id: result.tool_use_id().to_owned(),
                    content: Vec::new(),
                    status: result.status().map(|s| s.as_str().to_owned()),
                }),
                ..BedrockContentBlock::default()
            }),
            _ => {
                tracing::debug!("skipping uninterpreted bedrock content block");
                None
            }
        })
        .collect();

    BedrockMessage {
        role: message.role().as_str().to_owned(),
        content,
    }
}

#[allow(clippy::cast_sign_loss)]
fn usage_from_sdk(usage: &TokenUsage) -> BedrockUsage {
    BedrockUsage {
        input_tokens: usage.input_tokens().max(0) as u64,
        output_tokens: usage.output_tokens().max(0) as u64,
        total_tokens: usage.total_tokens().max(0) as u64,
        cache_read_input_tokens: None,
    }
}

#[allow(clippy::cast_sign_loss)]
fn event_from_sdk(event: &ConverseStreamOutput) -> Option<BedrockStreamEvent> {
    let index = |i: i32| i.max(0) as u32;

    let converted = match event {
        ConverseStreamOutput::MessageStart(start) => BedrockStreamEvent {
            message_start: Some(BedrockMessageStart {
                role: start.role().as_str().to_owned(),
            }),
            ..BedrockStreamEvent::default()
        },
        ConverseStreamOutput::ContentBlockStart(start) => BedrockStreamEvent {
            content_block_start: Some(BedrockBlockStart {
                content_block_index: index(start.content_block_index()),
                start: BedrockStart {
                    tool_use: match start.start() {
                        Some(ContentBlockStart::ToolUse(tool)) => Some(BedrockToolUseStart {
                            tool_use_id: tool.tool_use_id().to_owned(),
                            name: tool.name().to_owned(),
                        }),
                        _ => None,
                    },
                },
            }),
            ..BedrockStreamEvent::default()
        },
        ConverseStreamOutput::ContentBlockDelta(delta) => {
            let converted = match delta.delta() {
                Some(ContentBlockDelta::Text(text)) => BedrockDelta {
                    text: Some(text.clone()),
                    tool_use: None,
                },
                Some(ContentBlockDelta::ToolUse(tool)) => BedrockDelta {
                    text: None,
                    tool_use: Some(BedrockToolUseDelta {
                        input: tool.input().to_owned(),
                    }),
                },
                _ => return None,
            };
            BedrockStreamEvent {
                content_block_delta: Some(BedrockBlockDelta {
                    content_block_index: index(delta.content_block_index()),
                    delta: converted,
                }),
                ..BedrockStreamEvent::default()
            }
        }
        ConverseStreamOutput::ContentBlockStop(stop) => BedrockStreamEvent {
            content_block_stop: Some(BedrockBlockStop {
                content_block_index: index(stop.content_block_index()),
            }),
            ..BedrockStreamEvent::default()
        },
        ConverseStreamOutput::MessageStop(stop) => BedrockStreamEvent {
            message_stop: Some(BedrockMessageStop {
                stop_reason: stop.stop_reason().as_str().to_owned(),
            }),
            ..BedrockStreamEvent::default()
        },
        ConverseStreamOutput::Metadata(metadata) => BedrockStreamEvent {
            metadata: Some(BedrockStreamMetadata {
                usage: metadata.usage().map(usage_from_sdk),
            }),
            ..BedrockStreamEvent::default()
        },
        _ => return None,
    };

    Some(converted)
}

/// Convert a `serde_json::Value` to an AWS `Document`
fn value_to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                n.as_f64().map_or(Document::Null, |f| Document::Number(Number::Float(f)))
            }
        }
        Value::String(s) => Document::String(s.clone()),
        Value::Array(items) => Document::Array(items.iter().map(value_to_document).collect()),
        Value::Object(map) => Document::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_document(v)))
                .collect::<HashMap<_, _>>(),
        ),
    }
}

/// Convert an AWS `Document` to a `serde_json::Value`
fn document_to_value(document: &Document) -> Value {
    match document {
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), document_to_value(v)))
                .collect::<Map<_, _>>(),
        ),
        Document::Array(items) => Value::Array(items.iter().map(document_to_value).collect()),
        Document::Number(Number::PosInt(u)) => Value::from(*u),
        Document::Number(Number::NegInt(i)) => Value::from(*i),
        Document::Number(Number::Float(f)) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Document::String(s) => Value::String(s.clone()),
        Document::Bool(b) => Value::Bool(*b),
        Document::Null => Value::Null,
    }
}
