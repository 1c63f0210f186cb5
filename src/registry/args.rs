//! Declarative tool-argument schemas.
//!
//! Every tool declares its arguments as a static [`ArgSchema`] built once at
//! startup. The schema is used twice: walked by a pure converter into the
//! JSON-Schema shape the protocol catalog expects, and applied to raw
//! arguments before a handler runs. Validation rejects unknown keys and
//! type mismatches, fills in declared defaults, and fails on missing
//! required fields, so handlers only ever see arguments the schema produced.

use crate::error::{ServerError, ServerResult};
use serde_json::{Map, Value};

/// Declared type of a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ArgType {
    fn json_type_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub arg_type: ArgType,
    pub description: &'static str,
    pub required: bool,
    /// Filled in when the caller omits the argument. A required argument
    /// never carries a default.
    pub default: Option<Value>,
}

impl ArgSpec {
    pub fn required(name: &'static str, arg_type: ArgType, description: &'static str) -> Self {
        Self {
            name,
            arg_type,
            description,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, arg_type: ArgType, description: &'static str) -> Self {
        Self {
            name,
            arg_type,
            description,
            required: false,
            default: None,
        }
    }

    pub fn with_default(
        name: &'static str,
        arg_type: ArgType,
        description: &'static str,
        default: Value,
    ) -> Self {
        Self {
            name,
            arg_type,
            description,
            required: false,
            default: Some(default),
        }
    }
}

/// The full argument declaration of one tool.
#[derive(Debug, Clone, Default)]
pub struct ArgSchema {
    args: Vec<ArgSpec>,
}

impl ArgSchema {
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }

    /// Schema for a tool taking no arguments.
    pub fn empty() -> Self {
        Self { args: Vec::new() }
    }

    pub fn specs(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Validate raw arguments and produce the map handlers receive.
    ///
    /// Unknown keys, type mismatches and missing required fields fail with
    /// an argument-schema error naming the tool; defaults are applied for
    /// omitted optional arguments. An explicit JSON null is treated as
    /// omitted.
    pub fn validate(&self, tool: &str, raw: &Map<String, Value>) -> ServerResult<Map<String, Value>> {
        for key in raw.keys() {
            if !self.args.iter().any(|a| a.name == key) {
                return Err(ServerError::argument_schema(
                    tool,
                    format!("unknown argument '{}'", key),
                ));
            }
        }

        let mut validated = Map::new();
        for spec in &self.args {
            match raw.get(spec.name) {
                Some(value) if !value.is_null() => {
                    if !spec.arg_type.matches(value) {
                        return Err(ServerError::argument_schema(
                            tool,
                            format!(
                                "argument '{}' must be of type {}",
                                spec.name,
                                spec.arg_type.json_type_name()
                            ),
                        ));
                    }
                    validated.insert(spec.name.to_string(), value.clone());
                }
                _ => {
                    if spec.required {
                        return Err(ServerError::argument_schema(
                            tool,
                            format!("missing required argument '{}'", spec.name),
                        ));
                    }
                    if let Some(default) = &spec.default {
                        validated.insert(spec.name.to_string(), default.clone());
                    }
                }
            }
        }
        Ok(validated)
    }

    /// Pure conversion into the JSON-Schema object shape for the catalog.
    pub fn to_json_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.args {
            let mut prop = Map::new();
            prop.insert(
                "type".to_string(),
                Value::String(spec.arg_type.json_type_name().to_string()),
            );
            prop.insert(
                "description".to_string(),
                Value::String(spec.description.to_string()),
            );
            if let Some(default) = &spec.default {
                prop.insert("default".to_string(), default.clone());
            }
            properties.insert(spec.name.to_string(), Value::Object(prop));
            if spec.required {
                required.push(Value::String(spec.name.to_string()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        schema
    }
}
