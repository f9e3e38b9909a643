//! Incremental counterpart of the response wrapper
//!
//! A stream decodes native chunks as they arrive, accumulates text, tool
//! argument fragments and usage, and yields `(chunk, tool)` pairs in arrival
//! order. Once exhausted it can synthesize the equivalent non-streaming
//! response.

mod anthropic;
mod bedrock;
mod google;
mod openai;
mod state;

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::StreamExt as _;
use serde_json::Value;

pub use state::{ChunkDelta, ToolDelta};

use self::state::{ChunkDecoder, StreamState};
use crate::context::CallContext;
use crate::error::LlmError;
use crate::middleware::{self, CallMiddleware};
use crate::provider::{Family, Provider};
use crate::response::{CallResponse, finish_reason};
use crate::tool::{ToolCall, from_provider_call};
use crate::transport::{ChunkStream, Client};
use crate::types::{FinishReason, Usage};

/// View over one native chunk
#[derive(Debug, Clone)]
pub struct CallResponseChunk {
    provider: Provider,
    chunk: Arc<Value>,
    delta: Arc<ChunkDelta>,
}

impl CallResponseChunk {
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    /// Native chunk exactly as received
    pub fn chunk(&self) -> &Value {
        &self.chunk
    }

    /// Normalized contribution of this chunk
    pub fn delta(&self) -> &ChunkDelta {
        &self.delta
    }

    /// Text fragment, empty when the chunk carries none
    pub fn content(&self) -> &str {
        self.delta.text.as_deref().unwrap_or_default()
    }

    pub fn finish_reasons(&self) -> Vec<String> {
        self.delta.finish_reason.iter().cloned().collect()
    }

    /// Normalized stop reason, only on the chunk that reports one
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.delta
            .finish_reason
            .as_deref()
            .map(|raw| finish_reason(self.provider, raw))
    }

    /// Usage reported by this chunk alone
    pub fn usage(&self) -> Option<Usage> {
        self.delta.usage
    }

    pub fn model(&self) -> Option<&str> {
        self.delta.model.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.delta.id.as_deref()
    }
}

/// A tool call still receiving argument fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialToolCall {
    /// Provider call index
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Fragment carried by the current chunk
    pub delta: String,
    /// Arguments accumulated so far, usually not yet valid JSON
    pub arguments: String,
}

/// Tool information attached to a stream item
#[derive(Debug)]
pub enum StreamedTool {
    /// Fragment of an open call, only when partial tools were requested
    Partial(PartialToolCall),
    /// A completed, validated call
    Complete(ToolCall),
    /// A completed call whose arguments failed validation
    Invalid(LlmError),
}

impl StreamedTool {
    /// The validated call, if this is one
    pub const fn complete(&self) -> Option<&ToolCall> {
        match self {
            Self::Complete(call) => Some(call),
            _ => None,
        }
    }
}

/// One stream item: the chunk and the tool it completed or advanced
pub type StreamItem = (CallResponseChunk, Option<StreamedTool>);

fn decoder(provider: Provider) -> Box<dyn ChunkDecoder> {
    match provider.family() {
        Family::OpenAi => Box::new(openai::OpenAiDecoder { provider }),
        Family::Anthropic => Box::new(anthropic::AnthropicDecoder),
        Family::Google => Box::new(google::GoogleDecoder {
            provider,
            next_index: 0,
        }),
        Family::Bedrock => Box::new(bedrock::BedrockDecoder),
    }
}

/// Stream machinery shared by the sync and async wrappers
struct StreamCore {
    chunks: Option<ChunkStream>,
    decoder: Box<dyn ChunkDecoder>,
    state: StreamState,
    pending: VecDeque<StreamItem>,
    context: Arc<CallContext>,
    partial_tools: bool,
    middleware: Vec<Arc<dyn CallMiddleware>>,
    last_chunk: Option<CallResponseChunk>,
    failed: bool,
}

impl StreamCore {
    fn new(
        chunks: ChunkStream,
        context: CallContext,
        partial_tools: bool,
        middleware: Vec<Arc<dyn CallMiddleware>>,
    ) -> Self {
        let provider = context.provider;
        let supported = provider.capabilities().supports_partial_tool_streaming;
        if partial_tools && !supported {
            tracing::debug!(
                provider = %provider,
                "partial tool streaming not supported, tools are yielded once complete"
            );
        }

        Self {
            chunks: Some(chunks),
            decoder: decoder(provider),
            state: StreamState::default(),
            pending: VecDeque::new(),
            context: Arc::new(context),
            partial_tools: partial_tools && supported,
            middleware,
            last_chunk: None,
            failed: false,
        }
    }

    fn exhausted(&self) -> bool {
        self.pending.is_empty() && self.chunks.is_none()
    }

    async fn next_item(&mut self) -> Option<Result<StreamItem, LlmError>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }

            let chunks = self.chunks.as_mut()?;
            match chunks.next().await {
                Some(Ok(native)) => {
                    if let Err(e) = self.ingest(native) {
                        return Some(Err(self.fail(e)));
                    }
                }
                Some(Err(e)) => return Some(Err(self.fail(e))),
                None => self.finish(),
            }
        }
    }

    fn ingest(&mut self, native: Value) -> Result<(), LlmError> {
        let delta = self.decoder.decode(&native)?;
        let completed = self.state.apply(native.clone(), &delta);

        let chunk = CallResponseChunk {
            provider: self.context.provider,
            chunk: Arc::new(native),
            delta: Arc::new(delta),
        };
        let queued = self.pending.len();

        if self.partial_tools {
            for fragment in &chunk.delta.tool_deltas {
                if completed.contains(&fragment.index) {
                    continue;
                }
                if let Some(buffer) = self.state.tools.get(&fragment.index) {
                    let partial = PartialToolCall {
                        index: fragment.index,
                        id: buffer.id.clone(),
                        name: buffer.name.clone(),
                        delta: fragment.arguments.clone(),
                        arguments: buffer.arguments.clone(),
                    };
                    self.pending
                        .push_back((chunk.clone(), Some(StreamedTool::Partial(partial))));
                }
            }
        }

        for index in completed {
            let tool = self.complete_tool(index);
            self.pending.push_back((chunk.clone(), Some(tool)));
        }

        if self.pending.len() == queued {
            self.pending.push_back((chunk.clone(), None));
        }
        self.last_chunk = Some(chunk);

        Ok(())
    }

    fn complete_tool(&self, index: u32) -> StreamedTool {
        let Some(buffer) = self.state.tools.get(&index) else {
            return StreamedTool::Invalid(LlmError::Internal(anyhow::anyhow!(
                "no buffer for streamed tool call {index}"
            )));
        };

        let record = self.decoder.tool_record(buffer);
        let name = buffer.name.as_deref().unwrap_or_default();
        let arguments = Value::String(buffer.arguments.clone());

        match from_provider_call(&self.context.tools, buffer.call_id(), name, &arguments, record) {
            Ok(call) => StreamedTool::Complete(call),
            Err(e) => {
                tracing::debug!(
                    provider = %self.context.provider,
                    tool = name,
                    error = %e,
                    "streamed tool call rejected"
                );
                StreamedTool::Invalid(e)
            }
        }
    }

    /// Transport exhausted: complete open tools and run the after-call hooks
    fn finish(&mut self) {
        self.chunks = None;
        let completed = self.state.close();

        if let Some(last) = self.last_chunk.clone() {
            for index in completed {
                let tool = self.complete_tool(index);
                self.pending.push_back((last.clone(), Some(tool)));
            }
        }

        if self.middleware.is_empty() {
            return;
        }
        match self.response() {
            Ok(response) => middleware::after_call(&self.middleware, &self.context, &response),
            Err(e) => middleware::on_error(&self.middleware, &self.context, &e),
        }
    }

    fn fail(&mut self, error: LlmError) -> LlmError {
        tracing::warn!(provider = %self.context.provider, error = %error, "stream failed");
        self.failed = true;
        self.chunks = None;
        self.pending.clear();
        middleware::on_error(&self.middleware, &self.context, &error);
        error
    }

    fn response(&self) -> Result<CallResponse, LlmError> {
        if self.failed || !self.state.closed {
            return Err(LlmError::StreamIncomplete);
        }
        let native = self.decoder.synthesize(&self.state);
        CallResponse::with_context(native, Arc::clone(&self.context))
    }
}

/// Stream driven by a blocking client
pub struct Stream {
    core: StreamCore,
    client: Client,
    iterated: bool,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("provider", &self.core.context.provider)
            .field("iterated", &self.iterated)
            .finish_non_exhaustive()
    }
}

impl Stream {
    pub(crate) fn new(
        chunks: ChunkStream,
        client: Client,
        context: CallContext,
        partial_tools: bool,
        middleware: Vec<Arc<dyn CallMiddleware>>,
    ) -> Self {
        Self {
            core: StreamCore::new(chunks, context, partial_tools, middleware),
            client,
            iterated: false,
        }
    }

    /// Iterate the stream; only one iteration is allowed
    pub fn iter(&mut self) -> Result<StreamIter<'_>, LlmError> {
        if self.iterated {
            return Err(LlmError::StreamReuse);
        }
        self.iterated = true;
        Ok(StreamIter { stream: self })
    }

    /// The equivalent non-streaming response, once the stream is exhausted
    pub fn construct_call_response(&self) -> Result<CallResponse, LlmError> {
        self.core.response()
    }

    pub fn context(&self) -> &CallContext {
        &self.core.context
    }

    /// Usage aggregated over the chunks received so far
    pub const fn usage(&self) -> Option<Usage> {
        self.core.state.usage
    }

    /// Native chunks received so far
    pub fn chunks(&self) -> &[Value] {
        &self.core.state.chunks
    }
}

/// Blocking iterator over a [`Stream`]
pub struct StreamIter<'a> {
    stream: &'a mut Stream,
}

impl Iterator for StreamIter<'_> {
    type Item = Result<StreamItem, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        let Stream { core, client, .. } = &mut *self.stream;
        if core.exhausted() {
            return None;
        }

        match client.block_on(core.next_item()) {
            Ok(item) => item,
            Err(e) => Some(Err(core.fail(e))),
        }
    }
}

/// Stream driven by the caller's async runtime
pub struct AsyncStream {
    core: StreamCore,
    iterated: bool,
}

impl std::fmt::Debug for AsyncStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStream")
            .field("provider", &self.core.context.provider)
            .field("iterated", &self.iterated)
            .finish_non_exhaustive()
    }
}

impl AsyncStream {
    pub(crate) fn new(
        chunks: ChunkStream,
        context: CallContext,
        partial_tools: bool,
        middleware: Vec<Arc<dyn CallMiddleware>>,
    ) -> Self {
        Self {
            core: StreamCore::new(chunks, context, partial_tools, middleware),
            iterated: false,
        }
    }

    /// Iterate the stream; only one iteration is allowed
    pub fn iter(&mut self) -> Result<impl futures_util::Stream<Item = Result<StreamItem, LlmError>> + '_, LlmError> {
        if self.iterated {
            return Err(LlmError::StreamReuse);
        }
        self.iterated = true;

        Ok(futures_util::stream::unfold(&mut self.core, |core| async move {
            let item = core.next_item().await?;
            Some((item, core))
        }))
    }

    /// The equivalent non-streaming response, once the stream is exhausted
    pub fn construct_call_response(&self) -> Result<CallResponse, LlmError> {
        self.core.response()
    }

    pub fn context(&self) -> &CallContext {
        &self.core.context
    }

    /// Usage aggregated over the chunks received so far
    pub const fn usage(&self) -> Option<Usage> {
        self.core.state.usage
    }

    /// Native chunks received so far
    pub fn chunks(&self) -> &[Value] {
        &self.core.state.chunks
    }
}
