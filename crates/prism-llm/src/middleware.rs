//! Call lifecycle hooks
//!
//! Middleware runs in the order it was registered. Hooks observe the call,
//! they cannot alter the request or the response.

use crate::context::CallContext;
use crate::error::LlmError;
use crate::response::CallResponse;

/// Observer of call lifecycle events
///
/// For streams, `after_call` fires once the stream is exhausted, with the
/// response synthesized from the accumulated chunks.
pub trait CallMiddleware: Send + Sync {
    /// Called after setup, before the transport is invoked
    fn before_call(&self, _context: &CallContext) {}

    /// Called with the unified response on success
    fn after_call(&self, _context: &CallContext, _response: &CallResponse) {}

    /// Called when setup, the transport or the stream fails
    fn on_error(&self, _context: &CallContext, _error: &LlmError) {}
}

/// Shared middleware, so callers can keep a handle on its state
impl<T: CallMiddleware + ?Sized> CallMiddleware for std::sync::Arc<T> {
    fn before_call(&self, context: &CallContext) {
        (**self).before_call(context);
    }

    fn after_call(&self, context: &CallContext, response: &CallResponse) {
        (**self).after_call(context, response);
    }

    fn on_error(&self, context: &CallContext, error: &LlmError) {
        (**self).on_error(context, error);
    }
}

/// Emits one `tracing` event per call start and finish
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

impl CallMiddleware for TracingMiddleware {
    fn before_call(&self, context: &CallContext) {
        tracing::info!(
            provider = %context.provider,
            model = %context.model,
            stream = context.stream,
            messages = context.messages.len(),
            "llm call started"
        );
    }

    fn after_call(&self, context: &CallContext, response: &CallResponse) {
        let usage = response.usage();
        tracing::info!(
            provider = %context.provider,
            model = %response.model(),
            finish_reason = %response.finish_reason(),
            input_tokens = usage.map(|usage| usage.input_tokens),
            output_tokens = usage.map(|usage| usage.output_tokens),
            "llm call finished"
        );
    }

    fn on_error(&self, context: &CallContext, error: &LlmError) {
        tracing::error!(
            provider = %context.provider,
            model = %context.model,
            error = %error,
            "llm call failed"
        );
    }
}

pub(crate) fn before_call(middleware: &[std::sync::Arc<dyn CallMiddleware>], context: &CallContext) {
    for hook in middleware {
        hook.before_call(context);
    }
}

pub(crate) fn after_call(
    middleware: &[std::sync::Arc<dyn CallMiddleware>],
    context: &CallContext,
    response: &CallResponse,
) {
    for hook in middleware {
        hook.after_call(context, response);
    }
}

pub(crate) fn on_error(middleware: &[std::sync::Arc<dyn CallMiddleware>], context: &CallContext, error: &LlmError) {
    for hook in middleware {
        hook.on_error(context, error);
    }
}
