use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::{ChartKind, QueryResult};
use crate::error::ToolError;

/// Why a tool invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Arguments did not match the schema.
    Validation,
    /// No tool with that name.
    UnknownTool,
    /// The handler ran and failed.
    Execution,
    /// The handler exceeded its time limit.
    Timeout,
}

/// Result of one tool invocation, fed back into a reasoning loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Aggregate statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Map<String, Value>>,
    /// Chart family suggested by the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartKind>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set by the clarification tool; ends the loop.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_clarification: bool,
    /// Question for the user when clarification is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Failure category, for the caller only.
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl Observation {
    /// A successful observation carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    /// A failed observation from an execution error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_kind: Some(ErrorKind::Execution),
            ..Default::default()
        }
    }

    /// Terminal observation asking the user a question.
    pub fn clarification(question: impl Into<String>) -> Self {
        Self {
            success: false,
            needs_clarification: true,
            question: Some(question.into()),
            ..Default::default()
        }
    }

    /// Observation for a query result: rows as data, plus stats and hint.
    pub fn from_query(result: &QueryResult) -> Self {
        if !result.success {
            return Self::failure(result.summary.clone());
        }
        Self {
            success: true,
            data: Some(Value::Array(
                result.rows.iter().cloned().map(Value::Object).collect(),
            )),
            stats: Some(result.stats.clone()),
            chart_type: result.chart_type_hint,
            ..Default::default()
        }
    }

    /// Attach stats.
    pub fn with_stats(mut self, stats: Map<String, Value>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Whether the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        self.error_kind == Some(ErrorKind::Timeout)
    }

    /// JSON-encoded form, as returned over the tool invocation protocol.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"error":"Observation could not be encoded: {}"}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

impl From<ToolError> for Observation {
    fn from(err: ToolError) -> Self {
        let kind = match &err {
            ToolError::Validation { .. } => ErrorKind::Validation,
            ToolError::UnknownTool { .. } => ErrorKind::UnknownTool,
            ToolError::Execution { .. } => ErrorKind::Execution,
            ToolError::Timeout { .. } => ErrorKind::Timeout,
        };
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(kind),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_failure_serialization_has_fixed_keys() {
        let obs = Observation::failure("no such field");
        assert_eq!(
            serde_json::to_value(&obs).unwrap(),
            json!({"success": false, "error": "no such field"})
        );
    }

    #[test]
    fn test_clarification_serialization() {
        let obs = Observation::clarification("Which field?");
        assert_eq!(
            serde_json::to_value(&obs).unwrap(),
            json!({"success": false, "needs_clarification": true, "question": "Which field?"})
        );
    }

    #[test]
    fn test_tool_error_kind() {
        let obs: Observation = ToolError::Timeout {
            operation: "query_papers_by_year".to_string(),
            timeout_ms: 10,
        }
        .into();
        assert!(obs.is_timeout());
        assert!(!obs.success);

        let obs: Observation = ToolError::Validation {
            field: "limit".to_string(),
            reason: "must be >= 1".to_string(),
        }
        .into();
        assert_eq!(obs.error_kind, Some(ErrorKind::Validation));
        assert!(!obs.is_timeout());
    }

    #[test]
    fn test_json_string_round_trips() {
        let obs = Observation::ok(json!([{"year": 2020, "count": 3}]));
        let decoded: Observation = serde_json::from_str(&obs.to_json_string()).unwrap();
        assert_eq!(decoded, obs);
    }
}
