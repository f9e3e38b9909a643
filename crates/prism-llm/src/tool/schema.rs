//! Parameter schema derivation
//!
//! Typed tools derive their parameters from `schemars` once per type; the
//! result is cached process-wide. Names and descriptions are chosen per
//! definition, since one type may back both a tool and a response model.

use std::any::TypeId;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use schemars::JsonSchema;
use schemars::generate::{SchemaGenerator, SchemaSettings};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description used when a tool declares none
pub const DEFAULT_TOOL_DESCRIPTION: &str = "Correctly formatted and typed parameters extracted from the completion. \
     Must include required parameters and may exclude optional parameters unless present in the text.";

/// Provider-neutral description of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Name the model calls the tool by, unique within one call
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON Schema object for the arguments, absent when the tool takes none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolSchema {
    /// Parameters as an object schema, empty for zero-argument tools
    ///
    /// Anthropic and Bedrock require an input schema even when nothing is
    /// accepted.
    pub fn parameters_or_empty(&self) -> Value {
        self.parameters.clone().unwrap_or_else(|| {
            serde_json::json!({
                "type": "object",
                "properties": {},
            })
        })
    }
}

/// What a type's JSON Schema yields: its doc description and parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DerivedParameters {
    pub description: Option<String>,
    pub parameters: Option<Value>,
}

static PARAMETERS: OnceLock<DashMap<TypeId, Arc<DerivedParameters>>> = OnceLock::new();

/// Derived parameters for `T`, computed on first use and cached
pub(crate) fn memoized<T: JsonSchema + 'static>() -> Arc<DerivedParameters> {
    let cache = PARAMETERS.get_or_init(DashMap::new);
    let key = TypeId::of::<T>();

    if let Some(hit) = cache.get(&key) {
        return Arc::clone(hit.value());
    }

    let (description, parameters) = derive_parameters::<T>();
    let derived = Arc::new(DerivedParameters {
        description,
        parameters,
    });
    Arc::clone(cache.entry(key).or_insert(derived).value())
}

pub(crate) fn generator() -> SchemaGenerator {
    SchemaSettings::draft2020_12()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
}

/// Derive `(doc description, parameters)` from a type's JSON Schema
pub(crate) fn derive_parameters<T: JsonSchema>() -> (Option<String>, Option<Value>) {
    let mut root = generator().into_root_schema_for::<T>().to_value();

    let description = root
        .as_object_mut()
        .and_then(|object| object.remove("description"))
        .and_then(|value| value.as_str().map(str::to_owned))
        .filter(|text| !text.trim().is_empty());

    (description, clean_parameters(root))
}

/// Schema fragment for a single declared parameter
pub(crate) fn parameter_schema<T: JsonSchema>(generator: &mut SchemaGenerator, description: Option<&str>) -> Value {
    let mut schema = generator.subschema_for::<T>().to_value();
    if let (Some(object), Some(description)) = (schema.as_object_mut(), description) {
        object.insert("description".to_owned(), Value::String(description.to_owned()));
    }
    schema
}

/// Assemble an object schema from declared parameters
pub(crate) fn object_schema(properties: Map<String, Value>, required: Vec<String>) -> Option<Value> {
    if properties.is_empty() {
        return None;
    }

    let mut object = Map::new();
    object.insert("type".to_owned(), Value::String("object".to_owned()));
    object.insert("properties".to_owned(), Value::Object(properties));
    if !required.is_empty() {
        object.insert(
            "required".to_owned(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }
    Some(Value::Object(object))
}

/// Strip generator metadata and drop schemas without properties
fn clean_parameters(mut schema: Value) -> Option<Value> {
    let object = schema.as_object_mut()?;
    object.remove("title");
    object.remove("$schema");
    object.remove("description");

    let has_properties = object
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| !properties.is_empty());

    has_properties.then_some(schema)
}
