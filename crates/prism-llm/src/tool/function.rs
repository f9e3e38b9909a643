use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt as _;
use schemars::JsonSchema;
use schemars::generate::SchemaGenerator;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::schema::{self, DEFAULT_TOOL_DESCRIPTION, ToolSchema};
use super::{AsyncHandler, SyncHandler, ToolArgs, ToolDefinition, Validator};

type ParamCheck = Box<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

struct Param {
    name: String,
    required: bool,
    check: ParamCheck,
}

/// Builds a tool from an explicit parameter list
///
/// ```ignore
/// let tool = ToolDefinition::function("get_book_author")
///     .description("Returns the author of a book")
///     .param::<String>("title", "Book title")
///     .handler(|args| Ok(json!(lookup(&args.get::<String>("title")?))));
/// ```
pub struct FunctionToolBuilder {
    name: String,
    description: Option<String>,
    generator: SchemaGenerator,
    properties: Map<String, Value>,
    params: Vec<Param>,
}

impl FunctionToolBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            generator: schema::generator(),
            properties: Map::new(),
            params: Vec::new(),
        }
    }

    /// What the tool does
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a required parameter
    #[must_use]
    pub fn param<T: JsonSchema + DeserializeOwned + 'static>(self, name: &str, description: &str) -> Self {
        self.push::<T>(name, Some(description), true)
    }

    /// Declare a parameter the model may omit
    #[must_use]
    pub fn optional_param<T: JsonSchema + DeserializeOwned + 'static>(self, name: &str, description: &str) -> Self {
        self.push::<T>(name, Some(description), false)
    }

    fn push<T: JsonSchema + DeserializeOwned + 'static>(
        mut self,
        name: &str,
        description: Option<&str>,
        required: bool,
    ) -> Self {
        let fragment = schema::parameter_schema::<T>(&mut self.generator, description);
        self.properties.insert(name.to_owned(), fragment);
        self.params.push(Param {
            name: name.to_owned(),
            required,
            check: Box::new(|value: &Value| {
                serde_json::from_value::<T>(value.clone())
                    .map(drop)
                    .map_err(|e| e.to_string())
            }),
        });
        self
    }

    /// Finish with a synchronous handler
    pub fn handler<F>(self, handler: F) -> ToolDefinition
    where
        F: Fn(&ToolArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler: SyncHandler = Arc::new(handler);
        self.finish(Some(handler), None)
    }

    /// Finish with an asynchronous handler
    pub fn async_handler<F, Fut>(self, handler: F) -> ToolDefinition
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |args: ToolArgs| handler(args).boxed());
        self.finish(None, Some(handler))
    }

    /// Finish without a handler, for tools the caller executes itself
    pub fn build(self) -> ToolDefinition {
        self.finish(None, None)
    }

    fn finish(self, sync: Option<SyncHandler>, async_handler: Option<AsyncHandler>) -> ToolDefinition {
        let required = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name.clone())
            .collect();

        let schema = ToolSchema {
            name: self.name,
            description: self
                .description
                .unwrap_or_else(|| DEFAULT_TOOL_DESCRIPTION.to_owned()),
            parameters: schema::object_schema(self.properties, required),
        };

        let params = self.params;
        let validator: Validator = Arc::new(move |args: &ToolArgs| {
            for param in &params {
                match args.as_map().get(&param.name) {
                    Some(Value::Null) | None if param.required => {
                        return Err(format!("missing required argument `{}`", param.name));
                    }
                    Some(Value::Null) | None => {}
                    Some(value) => (param.check)(value).map_err(|e| format!("argument `{}`: {e}", param.name))?,
                }
            }
            Ok(())
        });

        ToolDefinition::from_parts(schema, validator, sync, async_handler)
    }
}
