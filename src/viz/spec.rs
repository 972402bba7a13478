use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Vega-Lite schema URL emitted on every chart.
pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

/// A structurally valid declarative chart document.
///
/// Can only be built through [`ChartSpec::validate`], so holding one means
/// mark, encoding and data are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ChartSpec(Value);

impl ChartSpec {
    /// Check the top-level structure and wrap the document.
    pub fn validate(value: Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "chart spec must be a JSON object".to_string())?;

        match obj.get("mark") {
            Some(Value::String(s)) if !s.is_empty() => {}
            Some(Value::Object(m)) if m.get("type").map(Value::is_string).unwrap_or(false) => {}
            Some(_) => return Err("'mark' must be a string or an object with a 'type'".to_string()),
            None => return Err("missing 'mark'".to_string()),
        }

        match obj.get("encoding") {
            Some(Value::Object(_)) => {}
            Some(_) => return Err("'encoding' must be an object".to_string()),
            None => return Err("missing 'encoding'".to_string()),
        }

        match obj.get("data") {
            Some(Value::Object(data)) => {
                if let Some(values) = data.get("values") {
                    if !values.is_array() {
                        return Err("'data.values' must be an array".to_string());
                    }
                }
            }
            Some(_) => return Err("'data' must be an object".to_string()),
            None => return Err("missing 'data'".to_string()),
        }

        Ok(Self(value))
    }

    /// Wrap a document built by an in-crate template.
    pub(crate) fn from_template(value: Value) -> Self {
        debug_assert!(Self::validate(value.clone()).is_ok());
        Self(value)
    }

    /// Mark type, whether given as a string or an object.
    pub fn mark(&self) -> Option<&str> {
        match self.0.get("mark")? {
            Value::String(s) => Some(s),
            Value::Object(m) => m.get("type").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Field bound to an encoding channel.
    pub fn field(&self, channel: &str) -> Option<&str> {
        self.0
            .get("encoding")?
            .get(channel)?
            .get("field")?
            .as_str()
    }

    /// Inline data rows.
    pub fn values(&self) -> &[Value] {
        self.0
            .get("data")
            .and_then(|d| d.get("values"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Names of the interaction parameters.
    pub fn selection_names(&self) -> Vec<String> {
        self.0
            .get("params")
            .and_then(Value::as_array)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|p| p.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rename every interaction parameter onto `token`, keeping the part of
    /// the old name before its first `_`, and repoint `{"param": ...}`
    /// references to the new names.
    pub(crate) fn rename_selections(mut self, token: &str) -> Self {
        let mut renames: HashMap<String, String> = HashMap::new();
        if let Some(params) = self.0.get_mut("params").and_then(Value::as_array_mut) {
            for (i, param) in params.iter_mut().enumerate() {
                let Some(old) = param.get("name").and_then(Value::as_str).map(str::to_string) else {
                    continue;
                };
                let base = old.split('_').next().filter(|b| !b.is_empty()).unwrap_or("param");
                let mut name = format!("{}_{}", base, token);
                if renames.values().any(|taken| *taken == name) {
                    name = format!("{}_{}_{}", base, token, i);
                }
                param["name"] = Value::String(name.clone());
                renames.insert(old, name);
            }
        }

        if !renames.is_empty() {
            if let Some(doc) = self.0.as_object_mut() {
                // Inline rows are data, not references.
                for (key, child) in doc.iter_mut() {
                    if key != "data" && key != "params" {
                        repoint_params(child, &renames);
                    }
                }
            }
        }
        self
    }

    /// The underlying document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwrap into the underlying document.
    pub fn into_value(self) -> Value {
        self.0
    }
}

fn repoint_params(value: &mut Value, renames: &HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "param" {
                    if let Some(name) = child.as_str().and_then(|old| renames.get(old)) {
                        *child = Value::String(name.clone());
                        continue;
                    }
                }
                repoint_params(child, renames);
            }
        }
        Value::Array(items) => {
            for item in items {
                repoint_params(item, renames);
            }
        }
        _ => {}
    }
}

impl TryFrom<Value> for ChartSpec {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::validate(value)
    }
}

impl From<ChartSpec> for Value {
    fn from(spec: ChartSpec) -> Self {
        spec.0
    }
}
