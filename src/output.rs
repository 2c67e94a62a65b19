//! Output accumulation and final schema validation
//!
//! Fragments emitted by actions and the payload the reasoner declares when it
//! is done are merged into one [`OutputAccumulator`] per run. At the end the
//! accumulator is checked against the caller's [`OutputSchema`].
//!
//! Keys that only ever came from action fragments and that the schema does
//! not know are dropped: fragments describe progress, not the answer. Unknown
//! keys in the final payload are rejected.

use crate::actions::params::{integral, parse_integer, parse_numeric, scalar_type};
use crate::error::ConfigError;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Boolean,
    Number,
    Integer,
    String,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::String => "string",
        }
    }

    fn from_json_type(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(FieldType::Boolean),
            "number" => Some(FieldType::Number),
            "integer" => Some(FieldType::Integer),
            "string" => Some(FieldType::String),
            _ => None,
        }
    }

    /// Coerce `value` to this type
    fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (FieldType::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (FieldType::Number, Value::Number(_)) => Some(value.clone()),
            (FieldType::Number, Value::String(s)) => parse_numeric(s),
            (FieldType::Integer, Value::Number(n)) => integral(n),
            (FieldType::Integer, Value::String(s)) => parse_integer(s),
            (FieldType::String, Value::String(_)) => Some(value.clone()),
            (FieldType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub ty: FieldType,

    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// Expected shape of the final answer: field name → type and presence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSchema {
    fields: IndexMap<String, FieldSpec>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a required field
    pub fn required(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), FieldSpec { ty, required: true });
        self
    }

    /// Builder method: add an optional field
    pub fn optional(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), FieldSpec { ty, required: false });
        self
    }

    /// Derive the schema from a Rust type, e.g. a `#[derive(JsonSchema)]` struct of scalars
    pub fn for_type<T: JsonSchema>() -> Result<Self, ConfigError> {
        let schema = schemars::schema_for!(T);
        Self::from_json_schema(schema.as_value())
    }

    /// Read a flat JSON Schema object whose properties are scalars
    pub fn from_json_schema(schema: &Value) -> Result<Self, ConfigError> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| ConfigError::Schema("expected an object schema with properties".to_string()))?;

        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut fields = IndexMap::new();
        for (name, property) in properties {
            let (ty, nullable) = property_type(property)
                .ok_or_else(|| ConfigError::Schema(format!("field '{}' is not a scalar", name)))?;
            fields.insert(
                name.clone(),
                FieldSpec {
                    ty,
                    required: required.contains(&name.as_str()) && !nullable,
                },
            );
        }

        Ok(Self { fields })
    }

    /// JSON Schema for the final payload, as advertised to the reasoner
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, spec)| (name.clone(), json!({ "type": spec.ty.as_str() })))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn property_type(property: &Value) -> Option<(FieldType, bool)> {
    let (name, nullable) = scalar_type(property)?;
    FieldType::from_json_type(name).map(|ty| (ty, nullable))
}

/// Where an accumulated value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Emitted by an action at the given step
    Fragment { step: usize },
    /// Declared by the reasoner as the final answer
    Payload,
}

/// Per-run mapping of output fields, merged in step order
#[derive(Debug, Clone, Default)]
pub struct OutputAccumulator {
    fields: IndexMap<String, (Value, Provenance)>,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an action's output fragment. Later fragments overwrite earlier ones.
    pub fn merge_fragment(&mut self, step: usize, fragment: &IndexMap<String, Value>) {
        for (key, value) in fragment {
            self.fields
                .insert(key.clone(), (value.clone(), Provenance::Fragment { step }));
        }
    }

    /// Merge the final payload, which wins over every fragment
    pub fn merge_payload(&mut self, payload: &Map<String, Value>) {
        for (key, value) in payload {
            self.fields.insert(key.clone(), (value.clone(), Provenance::Payload));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).map(|(value, _)| value)
    }

    pub fn provenance(&self, key: &str) -> Option<Provenance> {
        self.fields.get(key).map(|(_, provenance)| *provenance)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Current contents as a plain JSON object
    pub fn snapshot(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(key, (value, _))| (key.clone(), value.clone()))
            .collect()
    }
}

/// One reason a final answer was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaIssue {
    Missing(String),
    Invalid {
        field: String,
        expected: FieldType,
        found: Value,
    },
    Unexpected(String),
    NotAnObject(Value),
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaIssue::Missing(field) => write!(f, "missing required field '{}'", field),
            SchemaIssue::Invalid { field, expected, found } => {
                write!(f, "field '{}' expected {}, found {}", field, expected, found)
            }
            SchemaIssue::Unexpected(field) => write!(f, "unexpected field '{}'", field),
            SchemaIssue::NotAnObject(found) => write!(f, "final answer is not an object: {}", found),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Output does not match the expected schema: {}", join_issues(.issues))]
pub struct SchemaValidationError {
    pub issues: Vec<SchemaIssue>,
}

fn join_issues(issues: &[SchemaIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl SchemaValidationError {
    pub fn missing_fields(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                SchemaIssue::Missing(field) => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn invalid_fields(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                SchemaIssue::Invalid { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn unexpected_fields(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                SchemaIssue::Unexpected(field) => Some(field.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Read-only view of a validated answer, holding exactly the schema's fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedOutput {
    fields: IndexMap<String, Value>,
}

impl ValidatedOutput {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    pub fn f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Deserialize into the caller's output type
    pub fn into_typed<T: DeserializeOwned>(self) -> serde_json::Result<T> {
        serde_json::from_value(self.to_json())
    }
}

/// Check the accumulated output against `schema`
pub fn validate(accumulator: &OutputAccumulator, schema: &OutputSchema) -> Result<ValidatedOutput, SchemaValidationError> {
    let mut issues = Vec::new();
    let mut fields = IndexMap::new();

    for (name, spec) in &schema.fields {
        match accumulator.get(name) {
            None | Some(Value::Null) => {
                if spec.required {
                    issues.push(SchemaIssue::Missing(name.clone()));
                }
            }
            Some(value) => match spec.ty.coerce(value) {
                Some(coerced) => {
                    fields.insert(name.clone(), coerced);
                }
                None => issues.push(SchemaIssue::Invalid {
                    field: name.clone(),
                    expected: spec.ty,
                    found: value.clone(),
                }),
            },
        }
    }

    for (name, (_, provenance)) in &accumulator.fields {
        if schema.fields.contains_key(name) {
            continue;
        }
        match provenance {
            Provenance::Payload => issues.push(SchemaIssue::Unexpected(name.clone())),
            Provenance::Fragment { step } => {
                log::debug!("Dropping fragment field '{}' from step {}: not in the output schema", name, step)
            }
        }
    }

    if issues.is_empty() {
        Ok(ValidatedOutput { fields })
    } else {
        Err(SchemaValidationError { issues })
    }
}
