//! Provider-agnostic call builder
//!
//! `call(provider, model)` collects the static configuration of a call and
//! wraps a prompt function into a [`Call`]. Invoking the call renders the
//! prompt, runs setup, issues the transport call and wraps the result.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt as _;
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::CallContext;
use crate::error::LlmError;
use crate::middleware::{self, CallMiddleware};
use crate::provider::Provider;
use crate::response::CallResponse;
use crate::setup::{CallSetup, DynamicConfig, Prompt, SetupOutput, setup_call};
use crate::stream::{AsyncStream, Stream};
use crate::tool::ToolDefinition;
use crate::transport::Client;
use crate::types::{CallParams, Message};

/// Anything a prompt function may return
pub trait IntoPrompt {
    fn into_prompt(self) -> Prompt;
}

impl IntoPrompt for Prompt {
    fn into_prompt(self) -> Prompt {
        self
    }
}

impl IntoPrompt for Vec<Message> {
    fn into_prompt(self) -> Prompt {
        Prompt::new(self)
    }
}

impl IntoPrompt for Message {
    fn into_prompt(self) -> Prompt {
        Prompt::new(vec![self])
    }
}

/// A bare string is a single user message
impl IntoPrompt for String {
    fn into_prompt(self) -> Prompt {
        Message::user(self).into_prompt()
    }
}

impl IntoPrompt for &str {
    fn into_prompt(self) -> Prompt {
        Message::user(self).into_prompt()
    }
}

impl IntoPrompt for (Vec<Message>, DynamicConfig) {
    fn into_prompt(self) -> Prompt {
        Prompt::new(self.0).with_config(self.1)
    }
}

type SyncPrompt<A> = Arc<dyn Fn(A) -> Prompt + Send + Sync>;
type AsyncPrompt<A> = Arc<dyn Fn(A) -> BoxFuture<'static, Prompt> + Send + Sync>;

/// Arguments as recorded on the call context
fn args_to_value<A: Serialize>(args: &A) -> Value {
    serde_json::to_value(args).unwrap_or(Value::Null)
}

enum PromptFn<A> {
    Sync(SyncPrompt<A>),
    Async(AsyncPrompt<A>),
}

impl<A> Clone for PromptFn<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// Static configuration shared by a builder and the calls it produces
#[derive(Clone)]
struct Settings {
    name: Option<String>,
    provider: Provider,
    model: String,
    client: Option<Client>,
    tools: Vec<ToolDefinition>,
    json_mode: bool,
    call_params: CallParams,
    partial_tools: bool,
    middleware: Vec<Arc<dyn CallMiddleware>>,
}

/// Start building a call for a provider and model
pub fn call(provider: Provider, model: impl Into<String>) -> CallBuilder {
    CallBuilder {
        settings: Settings {
            name: None,
            provider,
            model: model.into(),
            client: None,
            tools: Vec::new(),
            json_mode: false,
            call_params: CallParams::default(),
            partial_tools: false,
            middleware: Vec::new(),
        },
    }
}

/// Builder returned by [`call`]
#[derive(Clone)]
#[must_use]
pub struct CallBuilder {
    settings: Settings,
}

impl fmt::Debug for CallBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallBuilder")
            .field("provider", &self.settings.provider)
            .field("model", &self.settings.model)
            .finish_non_exhaustive()
    }
}

impl CallBuilder {
    /// Name reported to middleware and recorded on responses
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.settings.name = Some(name.into());
        self
    }

    /// Client to issue calls through, instead of one built from the
    /// environment on every call
    pub fn client(mut self, client: Client) -> Self {
        self.settings.client = Some(client);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.settings.tools = tools;
        self
    }

    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.settings.tools.push(tool);
        self
    }

    /// Ask for JSON text output instead of a forced tool call
    pub const fn json_mode(mut self, enabled: bool) -> Self {
        self.settings.json_mode = enabled;
        self
    }

    pub fn call_params(mut self, params: CallParams) -> Self {
        self.settings.call_params = params;
        self
    }

    /// Yield tool argument fragments while streaming, where supported
    pub const fn partial_tools(mut self, enabled: bool) -> Self {
        self.settings.partial_tools = enabled;
        self
    }

    /// Append a middleware; hooks run in registration order
    pub fn middleware(mut self, middleware: impl CallMiddleware + 'static) -> Self {
        self.settings.middleware.push(Arc::new(middleware));
        self
    }

    /// Wrap a synchronous prompt function
    pub fn function<A, P, F>(self, prompt: F) -> Call<A>
    where
        A: Serialize + 'static,
        F: Fn(A) -> P + Send + Sync + 'static,
        P: IntoPrompt + 'static,
    {
        Call {
            settings: self.settings,
            prompt: PromptFn::Sync(Arc::new(move |args| prompt(args).into_prompt())),
            args: args_to_value::<A>,
        }
    }

    /// Wrap an asynchronous prompt function
    pub fn async_function<A, P, F, Fut>(self, prompt: F) -> Call<A>
    where
        A: Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = P> + Send + 'static,
        P: IntoPrompt + 'static,
    {
        Call {
            settings: self.settings,
            prompt: PromptFn::Async(Arc::new(move |args| prompt(args).map(IntoPrompt::into_prompt).boxed())),
            args: args_to_value::<A>,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Mode {
    blocking: bool,
    stream: bool,
}

/// A prompt function bound to a provider, model and call configuration
pub struct Call<A> {
    settings: Settings,
    prompt: PromptFn<A>,
    args: fn(&A) -> Value,
}

impl<A> Clone for Call<A> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            prompt: self.prompt.clone(),
            args: self.args,
        }
    }
}

impl<A> fmt::Debug for Call<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("name", &self.settings.name)
            .field("provider", &self.settings.provider)
            .field("model", &self.settings.model)
            .field("tools", &self.settings.tools.len())
            .field("json_mode", &self.settings.json_mode)
            .finish_non_exhaustive()
    }
}

impl<A> Call<A> {
    pub fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }

    pub const fn provider(&self) -> Provider {
        self.settings.provider
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub const fn call_params(&self) -> &CallParams {
        &self.settings.call_params
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.settings.tools
    }

    pub const fn json_mode(&self) -> bool {
        self.settings.json_mode
    }

    pub(crate) fn with_target(
        &self,
        provider: Option<Provider>,
        model: Option<&str>,
        params: Option<CallParams>,
    ) -> Self {
        let mut call = self.clone();
        if let Some(provider) = provider {
            call.settings.provider = provider;
        }
        if let Some(model) = model {
            model.clone_into(&mut call.settings.model);
        }
        if let Some(params) = params {
            call.settings.call_params = params;
        }
        call
    }

    // -- Blocking --

    /// Issue the call and wait for the response
    pub fn invoke(&self, args: A) -> Result<CallResponse, LlmError> {
        let (prompt, fn_args) = self.render(args)?;
        let setup = self.setup(prompt, &fn_args, &[], Mode {
            blocking: true,
            stream: false,
        })?;
        self.complete(&setup, &fn_args, |create, payload| create.create(payload))
    }

    /// Issue a streaming call
    pub fn stream(&self, args: A) -> Result<Stream, LlmError> {
        let (prompt, fn_args) = self.render(args)?;
        let setup = self.setup(prompt, &fn_args, &[], Mode {
            blocking: true,
            stream: true,
        })?;
        let context = self.begin(&setup, &fn_args);

        let SetupOutput { create, payload, .. } = setup;
        let chunks = create.stream(payload).inspect_err(|e| self.failed(&context, e))?;

        Ok(Stream::new(
            chunks,
            create.client().clone(),
            context,
            self.settings.partial_tools,
            self.settings.middleware.clone(),
        ))
    }

    /// Extract structured output of type `T`
    ///
    /// Forces a call to a tool derived from `T`, or asks for JSON text
    /// against `T`'s schema in JSON mode.
    pub fn extract<T: JsonSchema + DeserializeOwned + 'static>(&self, args: A) -> Result<T, LlmError> {
        let (prompt, fn_args) = self.render(args)?;
        let model = [ToolDefinition::response_model::<T>()];
        let setup = self.setup(prompt, &fn_args, &model, Mode {
            blocking: true,
            stream: false,
        })?;
        self.complete(&setup, &fn_args, |create, payload| create.create(payload))?
            .extract()
    }

    /// Render the prompt, keeping the arguments it was rendered from
    fn render(&self, args: A) -> Result<(Prompt, Value), LlmError> {
        let fn_args = (self.args)(&args);
        match &self.prompt {
            PromptFn::Sync(prompt) => Ok((prompt(args), fn_args)),
            PromptFn::Async(_) => Err(LlmError::Configuration(
                "prompt function is asynchronous, use the async call variants".to_owned(),
            )),
        }
    }

    // -- Async --

    /// Issue the call and await the response
    pub async fn invoke_async(&self, args: A) -> Result<CallResponse, LlmError> {
        let (prompt, fn_args) = self.render_async(args).await;
        let setup = self.setup(prompt, &fn_args, &[], Mode::default())?;
        let context = self.begin(&setup, &fn_args);

        let result = match setup.create.create_async(setup.payload.clone()).await {
            Ok(native) => CallResponse::new(native, context.clone()),
            Err(e) => Err(e),
        };
        self.end(&context, result)
    }

    /// Issue a streaming call on the caller's runtime
    pub async fn stream_async(&self, args: A) -> Result<AsyncStream, LlmError> {
        let (prompt, fn_args) = self.render_async(args).await;
        let setup = self.setup(prompt, &fn_args, &[], Mode {
            blocking: false,
            stream: true,
        })?;
        let context = self.begin(&setup, &fn_args);

        let SetupOutput { create, payload, .. } = setup;
        let chunks = create
            .stream_async(payload)
            .await
            .inspect_err(|e| self.failed(&context, e))?;

        Ok(AsyncStream::new(
            chunks,
            context,
            self.settings.partial_tools,
            self.settings.middleware.clone(),
        ))
    }

    /// Async counterpart of [`Call::extract`]
    pub async fn extract_async<T: JsonSchema + DeserializeOwned + 'static>(&self, args: A) -> Result<T, LlmError> {
        let (prompt, fn_args) = self.render_async(args).await;
        let model = [ToolDefinition::response_model::<T>()];
        let setup = self.setup(prompt, &fn_args, &model, Mode::default())?;
        let context = self.begin(&setup, &fn_args);

        let result = match setup.create.create_async(setup.payload.clone()).await {
            Ok(native) => CallResponse::new(native, context.clone()),
            Err(e) => Err(e),
        };
        self.end(&context, result)?.extract()
    }

    async fn render_async(&self, args: A) -> (Prompt, Value) {
        let fn_args = (self.args)(&args);
        let prompt = match &self.prompt {
            PromptFn::Sync(prompt) => prompt(args),
            PromptFn::Async(prompt) => prompt(args).await,
        };
        (prompt, fn_args)
    }

    // -- Shared pipeline --

    /// Run setup; `response_model` replaces the configured tools for
    /// extraction
    fn setup(
        &self,
        prompt: Prompt,
        fn_args: &Value,
        response_model: &[ToolDefinition],
        mode: Mode,
    ) -> Result<SetupOutput, LlmError> {
        let settings = &self.settings;
        let extract = !response_model.is_empty();

        let setup = CallSetup {
            provider: settings.provider,
            model: &settings.model,
            client: settings.client.as_ref(),
            blocking: mode.blocking,
            tools: if extract { response_model } else { &settings.tools },
            call_params: &settings.call_params,
            json_mode: settings.json_mode,
            extract: extract && !settings.json_mode,
            stream: mode.stream,
        };

        setup_call(&setup, prompt).inspect_err(|e| {
            let context = self.tag(CallContext::new(settings.provider, settings.model.clone()), fn_args);
            self.failed(&context, e);
        })
    }

    fn tag(&self, context: CallContext, fn_args: &Value) -> CallContext {
        context.with_invocation(self.settings.name.clone(), fn_args.clone())
    }

    fn begin(&self, setup: &SetupOutput, fn_args: &Value) -> CallContext {
        let context = self.tag(CallContext::from_setup(setup), fn_args);
        middleware::before_call(&self.settings.middleware, &context);
        context
    }

    fn complete(
        &self,
        setup: &SetupOutput,
        fn_args: &Value,
        create: impl FnOnce(&crate::transport::BoundCreate, Value) -> Result<Value, LlmError>,
    ) -> Result<CallResponse, LlmError> {
        let context = self.begin(setup, fn_args);
        let result = create(&setup.create, setup.payload.clone())
            .and_then(|native| CallResponse::new(native, context.clone()));
        self.end(&context, result)
    }

    fn end(&self, context: &CallContext, result: Result<CallResponse, LlmError>) -> Result<CallResponse, LlmError> {
        match &result {
            Ok(response) => middleware::after_call(&self.settings.middleware, context, response),
            Err(e) => self.failed(context, e),
        }
        result
    }

    fn failed(&self, context: &CallContext, error: &LlmError) {
        middleware::on_error(&self.settings.middleware, context, error);
    }
}

macro_rules! provider_shorthands {
    ($($module:ident => $provider:ident),* $(,)?) => {
        $(
            #[doc = concat!("Shorthand for [`call`](crate::call) with [`Provider::", stringify!($provider), "`]")]
            pub mod $module {
                use crate::provider::Provider;

                /// Start building a call for this provider
                pub fn call(model: impl Into<String>) -> super::CallBuilder {
                    super::call(Provider::$provider, model)
                }
            }
        )*
    };
}

provider_shorthands! {
    openai => OpenAi,
    anthropic => Anthropic,
    google => Google,
    vertex => Vertex,
    bedrock => Bedrock,
    groq => Groq,
    mistral => Mistral,
    azure => Azure,
    litellm => LiteLlm,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::tool::Tool;
    use crate::transport::mock::{ScriptedTransport, client};
    use crate::types::FinishReason;

    /// Returns the author of a book
    #[derive(Debug, Deserialize, JsonSchema)]
    struct GetBookAuthor {
        title: String,
    }

    impl Tool for GetBookAuthor {
        type Output = String;

        fn call(&self) -> anyhow::Result<String> {
            Ok(if self.title == "The Name of the Wind" {
                "Patrick Rothfuss".to_owned()
            } else {
                "Unknown".to_owned()
            })
        }
    }

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Book {
        title: String,
        author: String,
    }

    fn openai_text(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    fn recommend(transport: &Arc<ScriptedTransport>) -> Call<&'static str> {
        openai::call("gpt-4o-mini")
            .client(client(transport))
            .function(|genre: &str| format!("Recommend a {genre} book"))
    }

    #[test]
    fn invoke_renders_the_prompt_and_wraps_the_response() {
        let transport = ScriptedTransport::with_response(openai_text("Mistborn"));
        let response = recommend(&transport).invoke("fantasy").unwrap();

        assert_eq!(response.content(), "Mistborn");
        assert_eq!(response.finish_reason(), FinishReason::Stop);
        assert_eq!(
            transport.last_payload()["messages"],
            json!([{"role": "user", "content": "Recommend a fantasy book"}])
        );
    }

    #[test]
    fn tool_call_scenario() {
        let transport = ScriptedTransport::with_response(json!({
            "id": "chatcmpl-2",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": null, "tool_calls": [
                {
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "GetBookAuthor", "arguments": "{\"title\": \"The Name of the Wind\"}"}
                }
            ]}, "finish_reason": "tool_calls"}]
        }));
        let identify = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .tool(ToolDefinition::from_tool::<GetBookAuthor>())
            .function(|title: &'static str| format!("Who wrote {title}?"));

        let response = identify.invoke("The Name of the Wind").unwrap();
        let tool = response.tool().unwrap().unwrap();

        assert_eq!(tool.call().unwrap(), json!("Patrick Rothfuss"));
        assert_eq!(tool.tool_call(), &response.response()["choices"][0]["message"]["tool_calls"][0]);
        assert_eq!(transport.last_payload()["tools"][0]["function"]["name"], "GetBookAuthor");
    }

    #[test]
    fn extract_forces_the_response_model() {
        let transport = ScriptedTransport::with_response(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20240620",
            "content": [{
                "type": "tool_use",
                "id": "toolu_1",
                "name": "Book",
                "input": {"title": "Dune", "author": "Frank Herbert"}
            }],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 12}
        }));
        let book: Book = anthropic::call("claude-3-5-sonnet-20240620")
            .client(client(&transport))
            .function(|text: String| format!("Extract the book: {text}"))
            .extract("Dune by Frank Herbert".to_owned())
            .unwrap();

        assert_eq!(book, Book {
            title: "Dune".to_owned(),
            author: "Frank Herbert".to_owned()
        });
        let payload = transport.last_payload();
        assert_eq!(payload["tool_choice"], json!({"type": "tool", "name": "Book"}));
    }

    #[test]
    fn json_mode_extract_reads_the_text() {
        let transport = ScriptedTransport::with_response(openai_text(
            "```json\n{\"title\": \"Dune\", \"author\": \"Frank Herbert\"}\n```",
        ));
        let book: Book = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .json_mode(true)
            .function(|(): ()| "Name a science fiction book")
            .extract(())
            .unwrap();

        assert_eq!(book.author, "Frank Herbert");
        let payload = transport.last_payload();
        assert_eq!(payload["response_format"], json!({"type": "json_object"}));
        assert!(payload.get("tools").is_none());
    }

    #[test]
    fn dynamic_config_overrides_static_params() {
        let transport = ScriptedTransport::with_response(openai_text("ok"));
        let call = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .call_params(CallParams {
                temperature: Some(0.2),
                ..CallParams::default()
            })
            .function(|genre: &str| {
                let config = DynamicConfig::default()
                    .call_params(CallParams {
                        temperature: Some(0.9),
                        ..CallParams::default()
                    })
                    .metadata("genre", genre);
                (vec![Message::user(format!("Recommend a {genre} book"))], config)
            });

        let response = call.invoke("mystery").unwrap();
        assert_eq!(transport.last_payload()["temperature"], json!(0.9));
        assert_eq!(response.metadata()["genre"], json!("mystery"));
    }

    #[test]
    fn async_prompt_requires_async_invocation() {
        let transport = ScriptedTransport::with_response(openai_text("ok"));
        let call = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .async_function(|genre: String| async move { format!("Recommend a {genre} book") });

        assert!(matches!(call.invoke("fantasy".to_owned()), Err(LlmError::Configuration(_))));
    }

    #[tokio::test]
    async fn async_invocation_and_streaming() {
        let transport = ScriptedTransport::with_response(openai_text("Mistborn"));
        let call = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .async_function(|genre: String| async move { format!("Recommend a {genre} book") });
        assert_eq!(call.invoke_async("fantasy".to_owned()).await.unwrap().content(), "Mistborn");

        let transport = ScriptedTransport::with_stream(vec![
            json!({"id": "c", "model": "gpt-4o-mini", "choices": [{"index": 0, "delta": {"content": "Mist"}}]}),
            json!({"id": "c", "choices": [{"index": 0, "delta": {"content": "born"}, "finish_reason": "stop"}]}),
        ]);
        let call = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .function(|genre: String| format!("Recommend a {genre} book"));

        let mut stream = call.stream_async("fantasy".to_owned()).await.unwrap();
        let text: Vec<String> = futures_util::StreamExt::collect::<Vec<_>>(stream.iter().unwrap())
            .await
            .into_iter()
            .map(|item| item.unwrap().0.content().to_owned())
            .collect();

        assert_eq!(text.concat(), "Mistborn");
        assert_eq!(stream.construct_call_response().unwrap().content(), "Mistborn");
        assert_eq!(transport.last_payload()["stream"], json!(true));
    }

    #[test]
    fn blocking_stream() {
        let transport = ScriptedTransport::with_stream(vec![
            json!({"type": "message_start", "message": {
                "id": "msg_1",
                "model": "claude-3-5-sonnet-20240620",
                "usage": {"input_tokens": 5}
            }}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hello"}}),
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}),
        ]);
        let call = anthropic::call("claude-3-5-sonnet-20240620")
            .client(client(&transport))
            .function(|(): ()| "Say hello");

        let mut stream = call.stream(()).unwrap();
        assert_eq!(stream.iter().unwrap().count(), 3);
        let response = stream.construct_call_response().unwrap();
        assert_eq!(response.content(), "Hello");
        assert_eq!(response.finish_reason(), FinishReason::Stop);
    }

    #[test]
    fn hooks_see_the_call_name_and_arguments() {
        #[derive(Default)]
        struct Seen(Mutex<Vec<(&'static str, Option<String>, Value)>>);

        impl CallMiddleware for Seen {
            fn before_call(&self, context: &CallContext) {
                let entry = ("before", context.call_name.clone(), context.fn_args.clone());
                self.0.lock().unwrap().push(entry);
            }

            fn after_call(&self, context: &CallContext, _response: &CallResponse) {
                let entry = ("after", context.call_name.clone(), context.fn_args.clone());
                self.0.lock().unwrap().push(entry);
            }
        }

        let seen = Arc::new(Seen::default());
        let transport = ScriptedTransport::with_response(openai_text("Mistborn"));
        let call = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .name("recommend_book")
            .middleware(Arc::clone(&seen))
            .function(|genre: &str| format!("Recommend a {genre} book"));

        let response = call.invoke("fantasy").unwrap();

        let expected = Some("recommend_book".to_owned());
        assert_eq!(*seen.0.lock().unwrap(), vec![
            ("before", expected.clone(), json!("fantasy")),
            ("after", expected, json!("fantasy")),
        ]);
        assert_eq!(call.name(), Some("recommend_book"));
        assert_eq!(response.model_dump()["fn_args"], json!("fantasy"));
        assert_eq!(response.model_dump()["call_name"], json!("recommend_book"));
    }

    #[test]
    fn unnamed_call_records_structured_arguments() {
        let transport = ScriptedTransport::with_response(openai_text("ok"));
        let call = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .function(|(genre, count): (String, u32)| format!("Recommend {count} {genre} books"));

        let response = call.invoke(("mystery".to_owned(), 3)).unwrap();
        assert_eq!(response.context().call_name, None);
        assert_eq!(response.context().fn_args, json!(["mystery", 3]));
    }

    #[test]
    fn middleware_sees_setup_failures() {
        struct Errors(Mutex<usize>);

        impl CallMiddleware for Errors {
            fn on_error(&self, _context: &CallContext, _error: &LlmError) {
                *self.0.lock().unwrap() += 1;
            }
        }

        let errors = Arc::new(Errors(Mutex::new(0)));
        let transport = ScriptedTransport::with_response(openai_text("ok"));
        let call = openai::call("gpt-4o-mini")
            .client(client(&transport))
            .tools(vec![
                ToolDefinition::from_tool::<GetBookAuthor>(),
                ToolDefinition::from_tool::<GetBookAuthor>(),
            ])
            .middleware(Arc::clone(&errors))
            .function(|(): ()| "hi");

        assert!(matches!(call.invoke(()), Err(LlmError::Configuration(_))));
        assert_eq!(*errors.0.lock().unwrap(), 1);
        assert!(transport.requests.lock().unwrap().is_empty());
    }
}
