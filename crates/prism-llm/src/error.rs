use thiserror::Error;

use crate::provider::Provider;

/// Errors surfaced by call setup, response handling and transports
#[derive(Debug, Error)]
pub enum LlmError {
    /// Invalid call configuration, raised before any transport call
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A message part has no representation in the provider's schema
    #[error("{provider} cannot represent {detail}")]
    UnsupportedContent {
        /// Provider whose schema was targeted
        provider: Provider,
        /// What could not be represented
        detail: String,
    },

    /// Tool call arguments failed to parse or validate
    #[error("invalid arguments for tool `{tool}`: {message}")]
    ToolArgument {
        /// Name the provider used for the call
        tool: String,
        /// Parse or validation failure
        message: String,
    },

    /// A stream was iterated more than once
    #[error("stream has already been iterated")]
    StreamReuse,

    /// The final response was requested before the stream was exhausted
    #[error("stream has not been fully consumed")]
    StreamIncomplete,

    /// The transport or provider reported a failure
    #[error("{provider} request failed{}: {message}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    ProviderTransport {
        /// Provider that was called
        provider: Provider,
        /// HTTP status when the provider answered
        status: Option<u16>,
        /// Provider error message, or the transport error
        message: String,
        /// Raw error body as returned by the provider
        body: Option<String>,
    },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    pub(crate) fn unsupported(provider: Provider, detail: impl Into<String>) -> Self {
        Self::UnsupportedContent {
            provider,
            detail: detail.into(),
        }
    }

    pub(crate) fn tool_argument(tool: impl Into<String>, message: impl ToString) -> Self {
        Self::ToolArgument {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn transport(provider: Provider, message: impl Into<String>) -> Self {
        Self::ProviderTransport {
            provider,
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Whether an external retry policy may reasonably retry the call
    ///
    /// Connection failures, timeouts, rate limiting and server-side errors
    /// are transient. Everything else is deterministic for a given request.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderTransport { status: None, .. } => true,
            Self::ProviderTransport {
                status: Some(status), ..
            } => matches!(*status, 408 | 409 | 429) || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: Option<u16>) -> LlmError {
        LlmError::ProviderTransport {
            provider: Provider::OpenAi,
            status: code,
            message: "boom".to_owned(),
            body: None,
        }
    }

    #[test]
    fn transient_transport_failures_are_retryable() {
        assert!(status(None).is_retryable());
        assert!(status(Some(429)).is_retryable());
        assert!(status(Some(503)).is_retryable());
        assert!(!status(Some(400)).is_retryable());
        assert!(!status(Some(401)).is_retryable());
    }

    #[test]
    fn call_side_errors_are_not_retryable() {
        assert!(!LlmError::Configuration("x".to_owned()).is_retryable());
        assert!(!LlmError::StreamReuse.is_retryable());
        assert!(!LlmError::tool_argument("f", "bad").is_retryable());
    }

    #[test]
    fn display_includes_status_when_known() {
        assert_eq!(status(Some(429)).to_string(), "openai request failed with status 429: boom");
        assert_eq!(status(None).to_string(), "openai request failed: boom");
    }
}
