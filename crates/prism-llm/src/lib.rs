//! Provider-agnostic LLM calls for Prism
//!
//! Normalizes requests, responses, tool calling and streaming across
//! `OpenAI`, Anthropic, Google, Vertex, Bedrock, Groq, Mistral, Azure and
//! `LiteLLM` behind one call interface, with structured output extraction
//! and lifecycle middleware on top.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod call;
pub mod context;
pub mod convert;
pub mod error;
pub mod llm;
pub mod middleware;
pub mod protocol;
pub mod provider;
pub mod response;
pub mod setup;
pub mod stream;
pub mod tool;
pub mod transport;
pub mod types;

pub use call::{
    Call, CallBuilder, IntoPrompt, anthropic, azure, bedrock, call, google, groq, litellm, mistral, openai, vertex,
};
pub use context::CallContext;
pub use error::LlmError;
pub use llm::override_call;
pub use middleware::{CallMiddleware, TracingMiddleware};
pub use provider::{Family, Provider, ProviderCapabilities};
pub use response::{CallResponse, CostLookup};
pub use setup::{DynamicConfig, Prompt};
pub use stream::{AsyncStream, CallResponseChunk, PartialToolCall, Stream, StreamItem, StreamedTool};
pub use tool::{AsyncTool, Tool, ToolArgs, ToolCall, ToolDefinition, Toolkit};
pub use transport::{Client, Transport};
pub use types::{CallParams, ContentPart, FinishReason, Message, Role, Usage};
