//! Chart generation: templates, the reasoning engine and chart scripts, tried in order.

mod spec;
pub mod templates;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::agents::{extract_json_from_completion, ReasoningEngine};
use crate::dataset::{ChartKind, QueryResult};
use crate::error::StrategyFailure;
use crate::langbase::Message;
use crate::prompts::{CHART_SCRIPT_GUIDE, VISUALIZATION_PROMPT};
use crate::sandbox::{Sandbox, ScriptBindings};

pub use spec::{ChartSpec, VEGA_LITE_SCHEMA};

/// Sample rows shown to the reasoning engine.
const SAMPLE_ROWS: usize = 5;

/// House style applied when a refinement arrives without its own script.
pub const DEFAULT_POLISH_SCRIPT: &str = r#"# house style
let base = coalesce(previous, auto_chart(data))
let styled = merge(base, {
  "config": {
    "view": {"stroke": null},
    "font": "Helvetica Neue, Arial, sans-serif",
    "axis": {"labelFontSize": 12, "titleFontSize": 14, "gridOpacity": 0.4, "domain": false},
    "title": {"fontSize": 16, "anchor": "start"},
    "range": {"category": palette("ocean")}
  }
})
vega_spec = set(styled, "data.values", data)
"#;

/// Which strategy produced a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Built-in template.
    Template,
    /// Spec written by the reasoning engine.
    ReasoningEngine,
    /// Sandboxed chart script.
    CodeExecution,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Template => write!(f, "template"),
            Strategy::ReasoningEngine => write!(f, "reasoning_engine"),
            Strategy::CodeExecution => write!(f, "code_execution"),
        }
    }
}

/// Input to one visualization attempt.
#[derive(Debug, Clone)]
pub struct VizRequest<'a> {
    /// Data to chart.
    pub result: &'a QueryResult,
    /// Requested chart family.
    pub chart_type: Option<ChartKind>,
    /// Skip templates and ask the reasoning engine.
    pub custom: bool,
    /// Stylistic refinement of `previous`.
    pub refine: bool,
    /// Caller-supplied chart script.
    pub code: Option<&'a str>,
    /// Chart currently shown.
    pub previous: Option<&'a ChartSpec>,
    /// Free-form user instructions.
    pub instructions: Option<&'a str>,
}

impl<'a> VizRequest<'a> {
    /// A plain request for `result`.
    pub fn new(result: &'a QueryResult) -> Self {
        Self {
            result,
            chart_type: None,
            custom: false,
            refine: false,
            code: None,
            previous: None,
            instructions: None,
        }
    }
}

/// Result of the strategy chain.
#[derive(Debug, Clone)]
pub struct VizOutcome {
    /// Whether a chart was produced.
    pub success: bool,
    /// The chart.
    pub spec: Option<ChartSpec>,
    /// Strategy that produced it.
    pub strategy: Option<Strategy>,
    /// Strategies that failed on the way.
    pub failures: Vec<StrategyFailure>,
    /// Combined failure reason when nothing succeeded.
    pub error: Option<String>,
}

impl VizOutcome {
    fn produced(spec: ChartSpec, strategy: Strategy, failures: Vec<StrategyFailure>) -> Self {
        Self {
            success: true,
            spec: Some(spec),
            strategy: Some(strategy),
            failures,
            error: None,
        }
    }

    fn exhausted(failures: Vec<StrategyFailure>) -> Self {
        let error = failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            success: false,
            spec: None,
            strategy: None,
            failures,
            error: Some(format!("Could not generate a chart: {}", error)),
        }
    }

    /// Tool-protocol payload for this outcome.
    pub fn to_json(&self) -> Value {
        let failures: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        match &self.spec {
            Some(spec) => json!({
                "success": true,
                "strategy": self.strategy,
                "mark": spec.mark(),
                "failures": failures,
            }),
            None => json!({
                "success": false,
                "error": self.error,
                "failures": failures,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptReply {
    script: String,
}

/// Turns query results into charts.
pub struct VisualizationAgent {
    engine: Arc<dyn ReasoningEngine>,
    pipe: String,
    sandbox: Sandbox,
}

impl VisualizationAgent {
    /// Create an agent using `pipe` for engine-written charts.
    pub fn new(engine: Arc<dyn ReasoningEngine>, pipe: impl Into<String>, sandbox: Sandbox) -> Self {
        Self {
            engine,
            pipe: pipe.into(),
            sandbox,
        }
    }

    /// Run the strategy chain for `request`.
    ///
    /// Refinements and caller scripts go straight to the sandbox. Otherwise the
    /// template comes first unless `custom` is set, then the reasoning engine,
    /// then the default script.
    pub async fn visualize(&self, request: VizRequest<'_>) -> VizOutcome {
        let mut failures = Vec::new();

        if !request.result.success {
            failures.push(failure(Strategy::Template, "query result is not usable"));
            return VizOutcome::exhausted(failures);
        }

        let scripted = request.refine || request.code.is_some();

        if !scripted {
            if !request.custom {
                match templates::render(request.result, request.chart_type) {
                    Ok(spec) => return self.finish(spec, Strategy::Template, failures),
                    Err(reason) => failures.push(failure(Strategy::Template, reason)),
                }
            }

            match self.engine_chart(&request).await {
                Ok(spec) => return self.finish(spec, Strategy::ReasoningEngine, failures),
                Err(reason) => failures.push(failure(Strategy::ReasoningEngine, reason)),
            }
        }

        let scripts = self.scripts(&request, &mut failures).await;
        for script in scripts {
            let bindings = ScriptBindings::new(request.result, request.previous);
            match self.sandbox.run_chart_script(&script, bindings).await {
                Ok(spec) => return self.finish(spec, Strategy::CodeExecution, failures),
                Err(err) => failures.push(failure(Strategy::CodeExecution, err.to_string())),
            }
        }

        warn!(attempts = failures.len(), "Every visualization strategy failed");
        VizOutcome::exhausted(failures)
    }

    fn finish(&self, spec: ChartSpec, strategy: Strategy, failures: Vec<StrategyFailure>) -> VizOutcome {
        // Templates already carry fresh names; everything else may reuse old ones.
        let spec = match strategy {
            Strategy::Template => spec,
            _ => spec.rename_selections(&templates::selection_token()),
        };
        info!(
            strategy = %strategy,
            mark = spec.mark().unwrap_or("unknown"),
            fallbacks = failures.len(),
            "Chart generated"
        );
        VizOutcome::produced(spec, strategy, failures)
    }

    /// Scripts to try, in order.
    async fn scripts(&self, request: &VizRequest<'_>, failures: &mut Vec<StrategyFailure>) -> Vec<String> {
        if let Some(code) = request.code {
            return vec![code.to_string()];
        }

        let mut scripts = Vec::with_capacity(2);
        if request.refine {
            match self.engine_script(request).await {
                Ok(script) => scripts.push(script),
                Err(reason) => failures.push(failure(Strategy::CodeExecution, reason)),
            }
        }
        scripts.push(DEFAULT_POLISH_SCRIPT.to_string());
        scripts
    }

    async fn engine_chart(&self, request: &VizRequest<'_>) -> Result<ChartSpec, String> {
        let prompt = format!(
            "{}\nReply with the complete chart specification.",
            describe(request)
        );
        let completion = self.ask(prompt).await?;
        let json = extract_json_from_completion(&completion)?;
        let mut value: Value =
            serde_json::from_str(json).map_err(|e| format!("chart spec is not JSON: {}", e))?;

        let obj = value
            .as_object_mut()
            .ok_or_else(|| "chart spec must be a JSON object".to_string())?;
        obj.entry("$schema")
            .or_insert_with(|| Value::String(VEGA_LITE_SCHEMA.to_string()));
        let rows: Vec<Value> = request.result.rows.iter().cloned().map(Value::Object).collect();
        obj.insert("data".to_string(), json!({ "values": rows }));

        ChartSpec::validate(value)
    }

    async fn engine_script(&self, request: &VizRequest<'_>) -> Result<String, String> {
        let previous = request
            .previous
            .map(|spec| spec.as_value().clone())
            .map(|mut v| {
                if let Some(data) = v.get_mut("data") {
                    *data = json!({"values": []});
                }
                v.to_string()
            })
            .unwrap_or_else(|| "none".to_string());

        let prompt = format!(
            "{}\n\n{}\n\nCurrent chart without data: {}\n\nReply with {{\"script\": \"...\"}}.",
            CHART_SCRIPT_GUIDE,
            describe(request),
            previous
        );
        let completion = self.ask(prompt).await?;
        let json = extract_json_from_completion(&completion)?;
        let reply: ScriptReply =
            serde_json::from_str(json).map_err(|e| format!("script reply is malformed: {}", e))?;
        if reply.script.trim().is_empty() {
            return Err("script reply is empty".to_string());
        }
        debug!(bytes = reply.script.len(), "Engine wrote a chart script");
        Ok(reply.script)
    }

    async fn ask(&self, prompt: String) -> Result<String, String> {
        let messages = vec![Message::system(VISUALIZATION_PROMPT), Message::user(prompt)];
        self.engine
            .complete(&self.pipe, messages)
            .await
            .map_err(|e| e.to_string())
    }
}

fn failure(strategy: Strategy, reason: impl Into<String>) -> StrategyFailure {
    StrategyFailure {
        strategy: strategy.to_string(),
        reason: reason.into(),
    }
}

/// Schema, samples and instructions for the engine.
fn describe(request: &VizRequest<'_>) -> String {
    let result = request.result;
    let columns = result
        .columns()
        .into_iter()
        .map(|(name, ty)| format!("{} ({})", name, ty))
        .collect::<Vec<_>>()
        .join(", ");
    let samples: Vec<&serde_json::Map<String, Value>> = result.rows.iter().take(SAMPLE_ROWS).collect();
    let chart_type = request
        .chart_type
        .or(result.chart_type_hint)
        .map(|k| k.to_string())
        .unwrap_or_else(|| "choose the best fit".to_string());

    let mut text = format!(
        "Chart type: {}\nColumns: {}\nRow count: {}\nSample rows: {}",
        chart_type,
        columns,
        result.rows.len(),
        serde_json::to_string(&samples).unwrap_or_default()
    );
    if let Some(instructions) = request.instructions {
        text.push_str("\nInstructions: ");
        text.push_str(instructions);
    }
    text
}

#[cfg(test)]
#[path = "viz_tests.rs"]
mod tests;
