//! Settings schema parsing.
//!
//! Widget types store their settings schemas as JSON text, usually shaped as
//! `{"schema": {...json schema...}, "form": [...]}`. Missing or blank text is
//! a normal case and parses to an empty schema object so form rendering
//! always receives an object. Malformed text is an error: it means the
//! stored configuration is corrupted and cannot be defaulted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors that can occur when parsing schema text.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Malformed schema: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Schema must be a JSON object, found {0}")]
    NotAnObject(&'static str),
}

/// A parsed settings schema. Always a JSON object, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Map<String, Value>);

impl Schema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// The JSON schema part: the nested `schema` object when present,
    /// otherwise the whole object.
    fn json_schema(&self) -> &Map<String, Value> {
        match self.0.get("schema") {
            Some(Value::Object(inner)) => inner,
            _ => &self.0,
        }
    }

    /// Default values declared under `properties.*.default`.
    pub fn property_defaults(&self) -> Map<String, Value> {
        let Some(Value::Object(properties)) = self.json_schema().get("properties") else {
            return Map::new();
        };

        properties
            .iter()
            .filter_map(|(name, prop)| prop.get("default").map(|d| (name.clone(), d.clone())))
            .collect()
    }

    /// Property names listed in `required`.
    pub fn required_properties(&self) -> Vec<&str> {
        match self.json_schema().get("required") {
            Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Turns stored schema text into a [`Schema`].
pub trait SchemaParser: Send + Sync {
    /// Parse schema text. Empty or blank input yields an empty schema.
    fn parse(&self, text: &str) -> Result<Schema, SchemaError>;

    /// Parse optional schema text; `None` yields an empty schema.
    fn parse_optional(&self, text: Option<&str>) -> Result<Schema, SchemaError> {
        match text {
            Some(text) => self.parse(text),
            None => Ok(Schema::empty()),
        }
    }
}

/// [`SchemaParser`] for JSON schema text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaParser;

impl SchemaParser for JsonSchemaParser {
    fn parse(&self, text: &str) -> Result<Schema, SchemaError> {
        if text.trim().is_empty() {
            return Ok(Schema::empty());
        }

        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(Schema(map)),
            Value::Null => Err(SchemaError::NotAnObject("null")),
            Value::Bool(_) => Err(SchemaError::NotAnObject("boolean")),
            Value::Number(_) => Err(SchemaError::NotAnObject("number")),
            Value::String(_) => Err(SchemaError::NotAnObject("string")),
            Value::Array(_) => Err(SchemaError::NotAnObject("array")),
        }
    }
}
