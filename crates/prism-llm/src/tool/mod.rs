//! Tool declarations, schemas and call instances
//!
//! A tool is either a type whose fields are the arguments (`Tool`,
//! `AsyncTool`) or a function with an explicit parameter list
//! (`ToolDefinition::function`). Either way it becomes a `ToolDefinition`:
//! a shared schema, an argument validator and an optional handler.

mod function;
mod schema;
mod toolkit;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt as _;
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub use function::FunctionToolBuilder;
pub use schema::{DEFAULT_TOOL_DESCRIPTION, ToolSchema};
pub use toolkit::Toolkit;

use crate::error::LlmError;

/// A tool whose arguments are the fields of `Self`
///
/// The parameter schema comes from the `JsonSchema` derive and the
/// description from the type's doc comment.
pub trait Tool: JsonSchema + DeserializeOwned + Send + Sync + 'static {
    /// Value returned to the model
    type Output: Serialize;

    /// Name the model calls the tool by
    fn name() -> Cow<'static, str> {
        <Self as JsonSchema>::schema_name()
    }

    /// Overrides the doc comment description
    fn description() -> Option<String> {
        None
    }

    /// Run the tool with the arguments the model supplied
    fn call(&self) -> anyhow::Result<Self::Output>;
}

/// Asynchronous counterpart of [`Tool`]
#[async_trait]
pub trait AsyncTool: JsonSchema + DeserializeOwned + Send + Sync + 'static {
    /// Value returned to the model
    type Output: Serialize;

    /// Name the model calls the tool by
    fn name() -> Cow<'static, str> {
        <Self as JsonSchema>::schema_name()
    }

    /// Overrides the doc comment description
    fn description() -> Option<String> {
        None
    }

    /// Run the tool with the arguments the model supplied
    async fn call(&self) -> anyhow::Result<Self::Output>;
}

/// Decoded arguments of one tool call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    /// Wrap an argument object
    pub const fn new(arguments: Map<String, Value>) -> Self {
        Self(arguments)
    }

    /// Deserialize a single named argument
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let value = self.0.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| anyhow::anyhow!("argument `{name}`: {e}"))
    }

    /// Deserialize every argument into one type
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let object = Value::Object(self.0.clone());
        serde_json::from_value::<T>(object).or_else(|e| {
            // Unit structs only accept null
            if self.0.is_empty() {
                serde_json::from_value(Value::Null).map_err(|_| e)
            } else {
                Err(e)
            }
        })
    }

    /// Raw argument object
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Arguments as a JSON object value
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

type Validator = Arc<dyn Fn(&ToolArgs) -> Result<(), String> + Send + Sync>;
type SyncHandler = Arc<dyn Fn(&ToolArgs) -> anyhow::Result<Value> + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(ToolArgs) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
    None,
}

/// A tool offered to the model: schema, validator and handler
#[derive(Clone)]
pub struct ToolDefinition {
    schema: Arc<ToolSchema>,
    validator: Validator,
    handler: Handler,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handler = match self.handler {
            Handler::Sync(_) => "sync",
            Handler::Async(_) => "async",
            Handler::None => "none",
        };
        f.debug_struct("ToolDefinition")
            .field("schema", &self.schema)
            .field("handler", &handler)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    /// Definition for a synchronous typed tool
    pub fn from_tool<T: Tool>() -> Self {
        let schema = typed_schema::<T>(T::name(), T::description());
        let handler: SyncHandler = Arc::new(|args: &ToolArgs| {
            let tool: T = args.parse()?;
            Ok(serde_json::to_value(tool.call()?)?)
        });

        Self {
            schema,
            validator: typed_validator::<T>(),
            handler: Handler::Sync(handler),
        }
    }

    /// Definition for an asynchronous typed tool
    pub fn from_async_tool<T: AsyncTool>() -> Self {
        let schema = typed_schema::<T>(T::name(), T::description());
        let handler: AsyncHandler = Arc::new(|args: ToolArgs| {
            async move {
                let tool: T = args.parse()?;
                Ok(serde_json::to_value(tool.call().await?)?)
            }
            .boxed()
        });

        Self {
            schema,
            validator: typed_validator::<T>(),
            handler: Handler::Async(handler),
        }
    }

    /// Schema-only definition used to extract structured output into `T`
    pub fn response_model<T: JsonSchema + DeserializeOwned + 'static>() -> Self {
        let schema = typed_schema::<T>(T::schema_name(), None);

        Self {
            schema,
            validator: typed_validator::<T>(),
            handler: Handler::None,
        }
    }

    /// Start a function tool with an explicit parameter list
    pub fn function(name: impl Into<String>) -> FunctionToolBuilder {
        FunctionToolBuilder::new(name)
    }

    /// Same tool under a different name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let mut schema = (*self.schema).clone();
        schema.name = name.into();
        self.schema = Arc::new(schema);
        self
    }

    /// Shared schema
    pub const fn schema(&self) -> &Arc<ToolSchema> {
        &self.schema
    }

    /// Tool name
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Whether invoking the tool requires `call_async`
    pub const fn is_async(&self) -> bool {
        matches!(self.handler, Handler::Async(_))
    }

    /// Validate a provider tool call against this definition
    ///
    /// `arguments` may be a JSON string, as the `OpenAI` family sends them,
    /// or an already decoded object. An empty string or null counts as no
    /// arguments.
    pub fn parse_call(&self, id: impl Into<String>, arguments: &Value, raw: Value) -> Result<ToolCall, LlmError> {
        let arguments = decode_arguments(self.name(), arguments)?;
        (self.validator)(&arguments).map_err(|message| LlmError::tool_argument(self.name(), message))?;

        Ok(ToolCall {
            definition: self.clone(),
            id: id.into(),
            arguments,
            raw,
        })
    }

    pub(crate) fn from_parts(
        schema: ToolSchema,
        validator: Validator,
        sync: Option<SyncHandler>,
        async_handler: Option<AsyncHandler>,
    ) -> Self {
        let handler = match (sync, async_handler) {
            (Some(handler), _) => Handler::Sync(handler),
            (None, Some(handler)) => Handler::Async(handler),
            (None, None) => Handler::None,
        };

        Self {
            schema: Arc::new(schema),
            validator,
            handler,
        }
    }
}

/// Resolve a provider tool call against the declared tools
///
/// Unknown names, malformed JSON and arguments that violate the declared
/// parameters all produce [`LlmError::ToolArgument`] for this call only.
pub fn from_provider_call(
    tools: &[ToolDefinition],
    id: impl Into<String>,
    name: &str,
    arguments: &Value,
    raw: Value,
) -> Result<ToolCall, LlmError> {
    let definition = tools
        .iter()
        .find(|tool| tool.name() == name)
        .ok_or_else(|| LlmError::tool_argument(name, "no tool with this name was offered"))?;

    definition.parse_call(id, arguments, raw)
}

fn decode_arguments(tool: &str, arguments: &Value) -> Result<ToolArgs, LlmError> {
    let decoded = match arguments {
        Value::String(text) if text.trim().is_empty() => return Ok(ToolArgs::default()),
        Value::String(text) => serde_json::from_str(text).map_err(|e| LlmError::tool_argument(tool, e))?,
        Value::Null => return Ok(ToolArgs::default()),
        other => other.clone(),
    };

    match decoded {
        Value::Object(object) => Ok(ToolArgs(object)),
        other => Err(LlmError::tool_argument(
            tool,
            format!("expected a JSON object, got `{other}`"),
        )),
    }
}

fn typed_schema<T: JsonSchema + 'static>(name: Cow<'static, str>, description: Option<String>) -> Arc<ToolSchema> {
    let derived = schema::memoized::<T>();

    Arc::new(ToolSchema {
        name: name.into_owned(),
        description: description
            .or_else(|| derived.description.clone())
            .unwrap_or_else(|| DEFAULT_TOOL_DESCRIPTION.to_owned()),
        parameters: derived.parameters.clone(),
    })
}

fn typed_validator<T: DeserializeOwned + 'static>() -> Validator {
    Arc::new(|args: &ToolArgs| args.parse::<T>().map(drop).map_err(|e| e.to_string()))
}

/// One validated tool call from a response or stream
#[derive(Clone)]
pub struct ToolCall {
    definition: ToolDefinition,
    id: String,
    arguments: ToolArgs,
    raw: Value,
}

impl fmt::Debug for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCall")
            .field("name", &self.name())
            .field("id", &self.id)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

impl ToolCall {
    /// Name of the called tool
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Provider-assigned call identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Validated arguments
    pub const fn arguments(&self) -> &ToolArgs {
        &self.arguments
    }

    /// Arguments deserialized into a typed value
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        self.arguments
            .parse()
            .map_err(|e| LlmError::tool_argument(self.name(), e))
    }

    /// The native tool call record exactly as the provider sent it
    pub const fn tool_call(&self) -> &Value {
        &self.raw
    }

    /// Definition the call was validated against
    pub const fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Invoke a synchronous tool
    ///
    /// Errors returned by the tool itself are passed through as they are.
    pub fn call(&self) -> anyhow::Result<Value> {
        match &self.definition.handler {
            Handler::Sync(handler) => handler(&self.arguments),
            Handler::Async(_) => anyhow::bail!("tool `{}` is asynchronous, use `call_async`", self.name()),
            Handler::None => anyhow::bail!("tool `{}` has no handler", self.name()),
        }
    }

    /// Invoke the tool, awaiting it if it is asynchronous
    pub async fn call_async(&self) -> anyhow::Result<Value> {
        match &self.definition.handler {
            Handler::Sync(handler) => handler(&self.arguments),
            Handler::Async(handler) => handler(self.arguments.clone()).await,
            Handler::None => anyhow::bail!("tool `{}` has no handler", self.name()),
        }
    }
}
