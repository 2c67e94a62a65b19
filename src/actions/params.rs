//! Parameter schema, binding and coercion
//!
//! Reasoners produce loosely typed JSON. Numbers often arrive as strings
//! (`"10"`), so numeric parameters accept a string made only of digits and at
//! most one decimal point and convert it. Any other string is passed through
//! for lenient parameters and rejected for strict ones.
//!
//! Typed actions do not declare their parameters by hand: the specs are read
//! from the JSON Schema of the `Params` struct.

use crate::error::{ActionError, ParamIssue};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ParamType {
    fn from_json_type(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ParamType::String),
            "number" => Some(ParamType::Number),
            "integer" => Some(ParamType::Integer),
            "boolean" => Some(ParamType::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }
}

/// Declaration of a single action parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: ParamType,

    pub required: bool,

    pub default: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Reject strings that do not look like the declared type instead of passing them through
    #[serde(skip)]
    pub strict: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
            minimum: None,
            description: None,
            strict: true,
        }
    }

    /// Specs for every scalar property of `T`'s JSON Schema
    pub fn for_type<T: JsonSchema>() -> Vec<ParamSpec> {
        let schema = schemars::schema_for!(T);
        Self::from_json_schema(schema.as_value())
    }

    /// Read the properties of an object schema.
    ///
    /// Non-scalar properties are left out. Their values reach the typed
    /// handler unchecked, and it rejects a bad one when reading its parameters.
    pub fn from_json_schema(schema: &Value) -> Vec<ParamSpec> {
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut specs = Vec::with_capacity(properties.len());
        for (name, property) in properties {
            let Some((ty, nullable)) = scalar_type(property).and_then(|(ty, nullable)| {
                ParamType::from_json_type(ty).map(|ty| (ty, nullable))
            }) else {
                log::warn!("Parameter '{}' is not a scalar and is not checked before the call", name);
                continue;
            };
            specs.push(ParamSpec {
                name: name.clone(),
                ty,
                required: required.contains(&name.as_str()) && !nullable,
                default: property.get("default").filter(|v| !v.is_null()).cloned(),
                minimum: property.get("minimum").and_then(Value::as_f64),
                description: property.get("description").and_then(Value::as_str).map(str::to_string),
                strict: true,
            });
        }
        specs
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value used when the parameter is absent. Implies optional.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.required = false;
        self.default = Some(value.into());
        self
    }

    /// Pass non-numeric strings through instead of rejecting them
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn check(&self, value: &Value) -> Result<Value, String> {
        let value = self.coerce(value)?;
        if let (Some(minimum), Some(n)) = (self.minimum, value.as_f64()) {
            if n < minimum {
                return Err(format!("must be at least {}, got {}", minimum, n));
            }
        }
        Ok(value)
    }

    fn coerce(&self, value: &Value) -> Result<Value, String> {
        match self.ty {
            ParamType::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(format!("expected string, got {}", kind(other))),
            },
            ParamType::Number => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => match parse_numeric(s) {
                    Some(n) => Ok(n),
                    None if self.strict => Err(format!("expected number, got \"{}\"", s)),
                    None => Ok(value.clone()),
                },
                other => Err(format!("expected number, got {}", kind(other))),
            },
            ParamType::Integer => match value {
                Value::Number(n) => integral(n).ok_or_else(|| format!("expected integer, got {}", n)),
                Value::String(s) => match parse_integer(s) {
                    Some(n) => Ok(n),
                    None if self.strict => Err(format!("expected integer, got \"{}\"", s)),
                    None => Ok(value.clone()),
                },
                other => Err(format!("expected integer, got {}", kind(other))),
            },
            ParamType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                other => Err(format!("expected boolean, got {}", kind(other))),
            },
        }
    }
}

/// Whether `s` consists solely of digits with at most one decimal point
pub fn is_numeric_literal(s: &str) -> bool {
    let mut digits = 0;
    let mut dots = 0;
    for c in s.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

/// Convert a numeric literal to a JSON number. Digit-only strings become integers.
pub fn parse_numeric(s: &str) -> Option<Value> {
    if !is_numeric_literal(s) {
        return None;
    }
    if !s.contains('.') {
        if let Ok(n) = s.parse::<u64>() {
            return Some(Value::from(n));
        }
    }
    s.parse::<f64>().ok().and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
}

/// `n` as an integer, if it is a whole number that fits in an `i64` or `u64`
pub fn integral(n: &serde_json::Number) -> Option<Value> {
    if n.is_i64() || n.is_u64() {
        return Some(Value::Number(n.clone()));
    }
    let f = n.as_f64()?;
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| Value::from(f as i64))
}

/// Convert a numeric literal holding a whole number, such as `"10"` or `"10.0"`
pub fn parse_integer(s: &str) -> Option<Value> {
    match parse_numeric(s)? {
        Value::Number(n) => integral(&n),
        _ => None,
    }
}

/// JSON type name of a scalar schema property, and whether it admits `null`
pub(crate) fn scalar_type(property: &Value) -> Option<(&str, bool)> {
    match property.get("type")? {
        Value::String(name) => Some((name.as_str(), false)),
        Value::Array(names) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.contains(&"null");
            let mut scalar = names.into_iter().filter(|n| *n != "null");
            match (scalar.next(), scalar.next()) {
                (Some(name), None) => Some((name, nullable)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameters after validation and coercion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionParams {
    values: IndexMap<String, Value>,
}

impl ActionParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Deserialize into a typed parameter struct
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        let map: Map<String, Value> = self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        serde_json::from_value(Value::Object(map))
    }
}

/// Validate `raw` against `specs`, collecting every offending field
pub fn bind_params(action: &str, specs: &[ParamSpec], raw: &Value) -> Result<ActionParams, ActionError> {
    let empty = Map::new();
    let supplied = match raw {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => {
            return Err(ActionError::InvalidParameter {
                action: action.to_string(),
                issues: vec![ParamIssue {
                    field: "params".to_string(),
                    reason: format!("expected an object, got {}", kind(other)),
                }],
            });
        }
    };

    let mut values = IndexMap::new();
    let mut issues = Vec::new();

    for spec in specs {
        match supplied.get(&spec.name) {
            None | Some(Value::Null) => {
                if let Some(default) = &spec.default {
                    values.insert(spec.name.clone(), default.clone());
                } else if spec.required {
                    issues.push(ParamIssue {
                        field: spec.name.clone(),
                        reason: "missing".to_string(),
                    });
                }
            }
            Some(value) => match spec.check(value) {
                Ok(coerced) => {
                    values.insert(spec.name.clone(), coerced);
                }
                Err(reason) => issues.push(ParamIssue {
                    field: spec.name.clone(),
                    reason,
                }),
            },
        }
    }

    for (key, value) in supplied {
        if !specs.iter().any(|s| &s.name == key) {
            log::debug!("Passing undeclared parameter '{}' to action '{}' unchecked", key, action);
            values.insert(key.clone(), value.clone());
        }
    }

    if issues.is_empty() {
        Ok(ActionParams { values })
    } else {
        Err(ActionError::InvalidParameter {
            action: action.to_string(),
            issues,
        })
    }
}
