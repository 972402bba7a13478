//! Typed tool parameters and the JSON schemas advertised for them.
//!
//! Each tool declares a parameter struct deriving `Deserialize` and
//! `JsonSchema`. The schema shown to the reasoning engine and MCP clients is
//! generated from that struct, so the two cannot drift apart.

use std::any::Any;
use std::fmt;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ToolError;

/// Parameters of one tool.
///
/// Deserialization rejects unknown keys and wrong types. `validate` covers
/// what serde cannot express: ranges, orderings and blank text.
pub trait ToolParams: DeserializeOwned + Serialize + JsonSchema + Send + Sync + 'static {
    /// Checks beyond the shape of the arguments.
    fn validate(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Parameters of a tool that takes none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

impl ToolParams for NoParams {}

fn invalid(field: &str, reason: impl Into<String>) -> ToolError {
    ToolError::Validation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// `value`, when present, must lie in `min..=max`.
pub fn check_range(field: &str, value: Option<i64>, min: i64, max: i64) -> Result<(), ToolError> {
    match value {
        Some(v) if v < min => Err(invalid(field, format!("must be >= {}", min))),
        Some(v) if v > max => Err(invalid(field, format!("must be <= {}", max))),
        _ => Ok(()),
    }
}

/// `value`, when present, must be at least `min`.
pub fn check_min(field: &str, value: Option<i64>, min: i64) -> Result<(), ToolError> {
    check_range(field, value, min, i64::MAX)
}

/// `low <= high` whenever both are present.
pub fn check_ordered(
    low: (&str, Option<i64>),
    high: (&str, Option<i64>),
) -> Result<(), ToolError> {
    if let ((low_name, Some(lo)), (high_name, Some(hi))) = (low, high) {
        if lo > hi {
            return Err(invalid(
                low_name,
                format!("{} ({}) must be <= {} ({})", low_name, lo, high_name, hi),
            ));
        }
    }
    Ok(())
}

/// Text must contain something other than whitespace.
pub fn check_not_blank(field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

/// Trimmed text, or `None` when absent or blank.
pub fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// JSON Schema for `P`: subschemas inlined, optional fields not nullable.
pub fn input_schema<P: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = false;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    let root = settings.into_generator().into_root_schema_for::<P>();

    let mut schema = serde_json::to_value(&root.schema).unwrap_or_default();
    if let Value::Object(map) = &mut schema {
        map.remove("title");
        map.entry("properties").or_insert_with(|| json!({}));
        map.entry("required").or_insert_with(|| json!([]));
    }
    schema
}

/// Decode a JSON-encoded argument string into `P` and validate it.
///
/// Blank input and `null` are an empty object. Null members count as absent.
pub fn parse_arguments<P: ToolParams>(raw: &str) -> Result<P, ToolError> {
    let trimmed = raw.trim();
    let value: Value = if trimmed.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(trimmed)
            .map_err(|e| invalid("arguments", format!("not valid JSON: {}", e)))?
    };

    let value = match value {
        Value::Object(mut map) => {
            map.retain(|_, v| !v.is_null());
            Value::Object(map)
        }
        Value::Null => Value::Object(Map::new()),
        other => {
            return Err(invalid(
                "arguments",
                format!("expected a JSON object, got {}", other),
            ))
        }
    };

    let params: P = serde_json::from_value(value).map_err(|e| invalid("arguments", e.to_string()))?;
    params.validate()?;
    Ok(params)
}

/// Schema and decoder of one tool's parameters.
#[derive(Clone)]
pub struct ToolSchema {
    json: Value,
    decode: fn(&str) -> Result<ToolArguments, ToolError>,
}

impl fmt::Debug for ToolSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSchema").field("json", &self.json).finish()
    }
}

fn decode<P: ToolParams>(raw: &str) -> Result<ToolArguments, ToolError> {
    let params: P = parse_arguments(raw)?;
    let mut value = serde_json::to_value(&params).map_err(|e| invalid("arguments", e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    Ok(ToolArguments {
        value,
        params: Box::new(params),
    })
}

impl ToolSchema {
    /// Schema for the parameter struct `P`.
    pub fn of<P: ToolParams>() -> Self {
        Self {
            json: input_schema::<P>(),
            decode: decode::<P>,
        }
    }

    /// Schema for a tool without parameters.
    pub fn empty() -> Self {
        Self::of::<NoParams>()
    }

    /// Parse and validate a JSON-encoded argument string.
    pub fn validate(&self, raw: &str) -> Result<ToolArguments, ToolError> {
        (self.decode)(raw)
    }

    /// JSON Schema for the parameters.
    pub fn to_json_schema(&self) -> Value {
        self.json.clone()
    }
}

/// Arguments that passed validation.
pub struct ToolArguments {
    value: Value,
    params: Box<dyn Any + Send + Sync>,
}

impl fmt::Debug for ToolArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToolArguments").field(&self.value).finish()
    }
}

impl ToolArguments {
    /// The typed parameters the arguments were decoded into.
    pub fn into_params<P: ToolParams>(self) -> Result<P, ToolError> {
        self.params
            .downcast::<P>()
            .map(|params| *params)
            .map_err(|_| ToolError::Execution {
                message: format!(
                    "arguments were not decoded as {}",
                    std::any::type_name::<P>()
                ),
            })
    }

    /// Arguments as a JSON object.
    pub fn to_value(&self) -> Value {
        self.value.clone()
    }
}
