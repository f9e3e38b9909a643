//! Supported providers, their wire families and capabilities

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// An LLM vendor API a call can target
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    /// `OpenAI` chat completions
    OpenAi,
    /// Anthropic messages
    Anthropic,
    /// Google Gemini via the generative language API
    Google,
    /// Google Gemini via Vertex AI
    Vertex,
    /// AWS Bedrock Converse
    Bedrock,
    /// Groq, `OpenAI`-compatible
    Groq,
    /// Mistral, `OpenAI`-compatible
    Mistral,
    /// Azure `OpenAI` deployments
    Azure,
    /// `LiteLLM` proxy, `OpenAI`-compatible
    LiteLlm,
}

/// Wire format spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    OpenAi,
    Anthropic,
    Google,
    Bedrock,
}

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProviderCapabilities {
    /// Tool calls can be observed argument fragment by fragment
    pub supports_partial_tool_streaming: bool,
    /// Inline image bytes are accepted in user messages
    pub images: bool,
    /// Images may be referenced by URL
    pub image_urls: bool,
    /// A native switch forces JSON output
    pub json_response_format: bool,
    /// Streams report usage only when asked to
    pub stream_usage_option: bool,
}

impl Provider {
    /// Wire format family used to talk to this provider
    pub const fn family(self) -> Family {
        match self {
            Self::OpenAi | Self::Groq | Self::Mistral | Self::Azure | Self::LiteLlm => Family::OpenAi,
            Self::Anthropic => Family::Anthropic,
            Self::Google | Self::Vertex => Family::Google,
            Self::Bedrock => Family::Bedrock,
        }
    }

    /// Static capability table
    pub const fn capabilities(self) -> ProviderCapabilities {
        match self {
            Self::OpenAi | Self::Azure => ProviderCapabilities {
                supports_partial_tool_streaming: true,
                images: true,
                image_urls: true,
                json_response_format: true,
                stream_usage_option: true,
            },
            Self::LiteLlm => ProviderCapabilities {
                supports_partial_tool_streaming: true,
                images: true,
                image_urls: true,
                json_response_format: true,
                stream_usage_option: false,
            },
            // Groq and Mistral deliver each tool call whole in a single delta
            Self::Groq | Self::Mistral => ProviderCapabilities {
                supports_partial_tool_streaming: false,
                images: true,
                image_urls: true,
                json_response_format: true,
                stream_usage_option: false,
            },
            Self::Anthropic => ProviderCapabilities {
                supports_partial_tool_streaming: true,
                images: true,
                image_urls: true,
                json_response_format: false,
                stream_usage_option: false,
            },
            Self::Google | Self::Vertex => ProviderCapabilities {
                supports_partial_tool_streaming: false,
                images: true,
                image_urls: true,
                json_response_format: true,
                stream_usage_option: false,
            },
            Self::Bedrock => ProviderCapabilities {
                supports_partial_tool_streaming: true,
                images: true,
                image_urls: false,
                json_response_format: false,
                stream_usage_option: false,
            },
        }
    }

    /// Whether a leading system message moves into a top-level request field
    pub const fn hoists_system(self) -> bool {
        !matches!(self.family(), Family::OpenAi)
    }
}
