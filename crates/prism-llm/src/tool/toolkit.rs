use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use super::{FunctionToolBuilder, ToolArgs, ToolDefinition};

/// Related tools sharing one configuration object
///
/// Tool names are prefixed with the namespace (`<namespace>_<tool>`) and
/// descriptions can be rendered from the configuration, so the same toolkit
/// can be offered with different settings in different calls.
pub struct Toolkit<C> {
    namespace: Option<String>,
    config: Arc<C>,
    tools: Vec<ToolDefinition>,
}

impl<C: Send + Sync + 'static> Toolkit<C> {
    /// Toolkit without a namespace
    pub fn new(config: C) -> Self {
        Self {
            namespace: None,
            config: Arc::new(config),
            tools: Vec::new(),
        }
    }

    /// Toolkit whose tool names are prefixed with `namespace`
    pub fn namespaced(namespace: impl Into<String>, config: C) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::new(config)
        }
    }

    /// Shared configuration
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Add a synchronous tool
    ///
    /// `declare` receives the configuration so descriptions can mention it.
    #[must_use]
    pub fn tool<D, H>(mut self, name: &str, declare: D, handler: H) -> Self
    where
        D: FnOnce(FunctionToolBuilder, &C) -> FunctionToolBuilder,
        H: Fn(&C, &ToolArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let builder = declare(ToolDefinition::function(self.qualified(name)), &self.config);
        let config = Arc::clone(&self.config);
        self.tools
            .push(builder.handler(move |args| handler(&config, args)));
        self
    }

    /// Add an asynchronous tool
    #[must_use]
    pub fn async_tool<D, H, Fut>(mut self, name: &str, declare: D, handler: H) -> Self
    where
        D: FnOnce(FunctionToolBuilder, &C) -> FunctionToolBuilder,
        H: Fn(Arc<C>, ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let builder = declare(ToolDefinition::function(self.qualified(name)), &self.config);
        let config = Arc::clone(&self.config);
        self.tools
            .push(builder.async_handler(move |args| handler(Arc::clone(&config), args)));
        self
    }

    /// Definitions for every tool in the kit
    pub fn create_tools(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }

    fn qualified(&self, name: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}_{name}"),
            None => name.to_owned(),
        }
    }
}
