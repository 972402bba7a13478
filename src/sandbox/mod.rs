//! Chart-script sandbox.
//!
//! Scripts are parsed and interpreted in-crate. The only names a script can
//! reach are its three bindings and the helpers in [`HELPERS`]; there is no
//! filesystem, network, process or environment access to grant.

mod eval;
mod helpers;
mod script;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::dataset::QueryResult;
use crate::error::{SandboxError, SandboxResult};
use crate::viz::ChartSpec;

use eval::{Interpreter, Meter};
pub use helpers::{title_case, HELPERS};

/// Variable a script must bind to its chart.
pub const OUTPUT_VARIABLE: &str = "vega_spec";

/// Values in scope when a script starts.
#[derive(Debug, Clone, Default)]
pub struct ScriptBindings {
    /// Result rows.
    pub data: Value,
    /// Result statistics.
    pub stats: Value,
    /// The chart being refined, or null.
    pub previous: Value,
}

impl ScriptBindings {
    /// Bindings for `result`, refining `previous` when given.
    pub fn new(result: &QueryResult, previous: Option<&ChartSpec>) -> Self {
        Self {
            data: Value::Array(result.rows.iter().cloned().map(Value::Object).collect()),
            stats: Value::Object(result.stats.clone()),
            previous: previous
                .map(|spec| spec.as_value().clone())
                .unwrap_or(Value::Null),
        }
    }

    fn into_env(self) -> HashMap<String, Value> {
        HashMap::from([
            ("data".to_string(), self.data),
            ("stats".to_string(), self.stats),
            ("previous".to_string(), self.previous),
        ])
    }
}

/// Runs chart scripts under size, fuel and wall-clock limits.
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    /// Create a sandbox with the given limits.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Run `source` and return the chart it binds to `vega_spec`.
    pub async fn run_chart_script(
        &self,
        source: &str,
        bindings: ScriptBindings,
    ) -> SandboxResult<ChartSpec> {
        if source.len() > self.config.max_script_bytes {
            return Err(SandboxError::TooLarge {
                what: "script".to_string(),
                size: source.len(),
                limit: self.config.max_script_bytes,
            });
        }

        let program = script::parse(source)?;
        let cancel = Arc::new(AtomicBool::new(false));
        let meter = Meter::new(self.config.fuel, cancel.clone(), self.config.timeout_ms);
        let env = bindings.into_env();

        let worker = tokio::task::spawn_blocking(move || Interpreter::new(env, meter).exec(&program));
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let mut env = match tokio::time::timeout(timeout, worker).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(SandboxError::InvalidOutput {
                    reason: format!("script worker stopped: {}", join_error),
                })
            }
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                warn!(timeout_ms = self.config.timeout_ms, "Chart script cancelled");
                return Err(SandboxError::Cancelled {
                    timeout_ms: self.config.timeout_ms,
                });
            }
        };

        let output = env
            .remove(OUTPUT_VARIABLE)
            .ok_or_else(|| SandboxError::MissingOutput {
                variable: OUTPUT_VARIABLE.to_string(),
            })?;

        let size = serde_json::to_vec(&output)
            .map_err(|e| SandboxError::InvalidOutput {
                reason: e.to_string(),
            })?
            .len();
        if size > self.config.max_output_bytes {
            return Err(SandboxError::TooLarge {
                what: OUTPUT_VARIABLE.to_string(),
                size,
                limit: self.config.max_output_bytes,
            });
        }

        debug!(output_bytes = size, "Chart script produced a spec");
        ChartSpec::validate(output).map_err(|reason| SandboxError::InvalidOutput { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sandbox() -> Sandbox {
        Sandbox::new(SandboxConfig::default())
    }

    fn bindings() -> ScriptBindings {
        ScriptBindings {
            data: json!([
                {"display_name": "Medicine", "paper_count": 12},
                {"display_name": "Biology", "paper_count": 7}
            ]),
            stats: json!({"total_fields": 2}),
            previous: Value::Null,
        }
    }

    #[tokio::test]
    async fn test_script_builds_chart() {
        let script = r#"
            # sorted bar chart
            let rows = sort_by(data, "paper_count", "asc")
            let spec = chart("bar", rows)
            spec = encode(spec, "x", "display_name", "nominal")
            vega_spec = encode(spec, "y", "paper_count", "quantitative")
        "#;
        let spec = sandbox().run_chart_script(script, bindings()).await.unwrap();

        assert_eq!(spec.mark(), Some("bar"));
        assert_eq!(spec.field("x"), Some("display_name"));
        assert_eq!(spec.values()[0]["display_name"], "Biology");
    }

    #[tokio::test]
    async fn test_refines_previous_chart() {
        let mut b = bindings();
        b.previous = json!({
            "mark": "bar",
            "encoding": {"x": {"field": "display_name"}},
            "data": {"values": []}
        });
        let script = r#"vega_spec = set(previous, "config.range.category", palette("sunset"))"#;

        let spec = sandbox().run_chart_script(script, b).await.unwrap();
        assert_eq!(spec.as_value()["config"]["range"]["category"][0], "#F94144");
    }

    #[tokio::test]
    async fn test_missing_output() {
        let err = sandbox()
            .run_chart_script("let x = 1", bindings())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SandboxError::MissingOutput {
                variable: "vega_spec".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_output() {
        let err = sandbox()
            .run_chart_script("vega_spec = {\"mark\": \"bar\"}", bindings())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn test_namespace_violation() {
        let err = sandbox()
            .run_chart_script("vega_spec = open(\"/etc/passwd\")", bindings())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SandboxError::UnknownHelper {
                name: "open".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_size_limits() {
        let small = Sandbox::new(SandboxConfig {
            max_script_bytes: 10,
            ..Default::default()
        });
        let err = small
            .run_chart_script("vega_spec = auto_chart(data)", bindings())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::TooLarge { .. }));

        let tiny_output = Sandbox::new(SandboxConfig {
            max_output_bytes: 50,
            ..Default::default()
        });
        let err = tiny_output
            .run_chart_script("vega_spec = auto_chart(data)", bindings())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::TooLarge { ref what, .. } if what == "vega_spec"));
    }

    #[tokio::test]
    async fn test_long_field_chain_fails_cleanly() {
        let mut b = bindings();
        b.previous = json!({"mark": "bar", "encoding": {}});
        let script = format!("vega_spec = previous{}", ".a".repeat(8000));
        assert!(script.len() <= SandboxConfig::default().max_script_bytes);

        let err = sandbox().run_chart_script(&script, b).await.unwrap_err();
        assert!(matches!(err, SandboxError::InvalidOutput { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_deeply_nested_output_rejected() {
        let wrap = format!("x = {{\"k\": {}x{}}}", "[".repeat(40), "]".repeat(40));
        let script = format!("let x = 1\n{}\n{}\n{}\n{}\nvega_spec = x", wrap, wrap, wrap, wrap);

        let err = sandbox().run_chart_script(&script, bindings()).await.unwrap_err();
        assert!(matches!(err, SandboxError::TooDeep { ref variable, .. } if variable == "x"));
    }

    #[tokio::test]
    async fn test_fuel_limit() {
        let starved = Sandbox::new(SandboxConfig {
            fuel: 3,
            ..Default::default()
        });
        let err = starved
            .run_chart_script("vega_spec = auto_chart(data)", bindings())
            .await
            .unwrap_err();
        assert_eq!(err, SandboxError::FuelExhausted { limit: 3 });
    }
}
