//! Tools the orchestrator loop can call, and the per-turn context they share.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::agents::DataQueryAgent;
use crate::conversation::{ConversationState, Role};
use crate::dataset::{ChartKind, QueryResult};
use crate::error::{RegistryError, ToolError};
use crate::langbase::Message;
use crate::storage::{Invocation, Storage};
use crate::tools::{
    check_not_blank, text, ErrorKind, Observation, ToolArguments, ToolDescriptor, ToolHandler,
    ToolParams, ToolRegistry, ToolSchema,
};
use crate::viz::{ChartSpec, VisualizationAgent, VizOutcome, VizRequest};

/// Orchestrator tool names, in catalogue order.
pub const ORCHESTRATOR_TOOL_NAMES: [&str; 3] = [
    "query_paper_data",
    "generate_visualization",
    "execute_chart_script",
];

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct QueryPaperDataParams {
    /// The data needed, in plain language
    request: String,
}

impl ToolParams for QueryPaperDataParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_not_blank("request", &self.request)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct GenerateVisualizationParams {
    /// Chart family
    chart_type: Option<ChartKind>,
    /// Request a non-standard chart
    #[serde(default)]
    custom: bool,
    /// Layout or styling wishes
    instructions: Option<String>,
}

impl ToolParams for GenerateVisualizationParams {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ExecuteChartScriptParams {
    /// Chart script source
    code: String,
}

impl ToolParams for ExecuteChartScriptParams {
    fn validate(&self) -> Result<(), ToolError> {
        check_not_blank("code", &self.code)
    }
}

/// Working state of one turn.
///
/// Holds a copy of the session state; the orchestrator writes it back only
/// when the turn completes.
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// Session the turn belongs to.
    pub session_id: String,
    /// Working copy of the session state.
    pub state: ConversationState,
    /// Prior messages, as seen by the agents.
    pub history: Vec<Message>,
    /// Data fetched this turn.
    pub result: Option<QueryResult>,
    /// Chart produced this turn.
    pub chart: Option<ChartSpec>,
    /// Narrative from the data agent.
    pub narrative: Option<String>,
    /// Last data failure this turn.
    pub data_error: Option<String>,
    /// Last visualization failure this turn.
    pub viz_error: Option<String>,
}

impl TurnContext {
    /// Context over a copy of `state`.
    pub fn new(session_id: impl Into<String>, state: ConversationState) -> Self {
        let history = state
            .messages()
            .map(|m| match m.role {
                Role::User => Message::user(m.text.clone()),
                Role::System => Message::assistant(m.text.clone()),
            })
            .collect();
        Self {
            session_id: session_id.into(),
            state,
            history,
            result: None,
            chart: None,
            narrative: None,
            data_error: None,
            viz_error: None,
        }
    }

    /// Data to chart: this turn's, else the cached result.
    fn chartable(&self) -> Option<QueryResult> {
        self.result
            .clone()
            .or_else(|| self.state.last_query_result().cloned())
    }

    fn record_chart(&mut self, outcome: VizOutcome, result: QueryResult) -> Observation {
        let payload = outcome.to_json();
        match outcome.spec {
            Some(spec) => {
                self.chart = Some(spec.clone());
                self.viz_error = None;
                self.state.commit_visualization(spec, result.clone());
                self.result = Some(result);
                Observation::ok(payload)
            }
            None => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "Visualization failed".to_string());
                self.viz_error = Some(error.clone());
                Observation::failure(error)
            }
        }
    }
}

fn nothing_to_chart(ctx: &mut TurnContext) -> ToolError {
    let message = "No query result to visualize. Call query_paper_data first.".to_string();
    ctx.viz_error = Some(message.clone());
    ToolError::Execution { message }
}

struct QueryPaperData {
    agent: Arc<DataQueryAgent>,
}

#[async_trait]
impl ToolHandler<TurnContext> for QueryPaperData {
    async fn call(
        &self,
        ctx: &mut TurnContext,
        args: ToolArguments,
    ) -> Result<Observation, ToolError> {
        let params: QueryPaperDataParams = args.into_params()?;
        let report = self.agent.run(params.request.trim(), &ctx.history).await;

        if let Some(question) = report.clarification {
            return Ok(Observation::clarification(question));
        }

        if !report.success {
            let error = report
                .error
                .unwrap_or_else(|| "Data query failed".to_string());
            ctx.data_error = Some(error.clone());
            let mut observation = Observation::failure(error);
            if report.timed_out {
                observation.error_kind = Some(ErrorKind::Timeout);
            }
            return Ok(observation);
        }

        ctx.data_error = None;
        ctx.narrative = Some(report.message.clone());
        match report.result {
            Some(result) => {
                let observation = Observation::from_query(&result);
                ctx.result = Some(result);
                Ok(observation)
            }
            None => Ok(Observation::ok(json!({ "answer": report.message }))),
        }
    }
}

struct GenerateVisualization {
    agent: Arc<VisualizationAgent>,
}

#[async_trait]
impl ToolHandler<TurnContext> for GenerateVisualization {
    async fn call(
        &self,
        ctx: &mut TurnContext,
        args: ToolArguments,
    ) -> Result<Observation, ToolError> {
        let result = match ctx.chartable() {
            Some(result) => result,
            None => return Err(nothing_to_chart(ctx)),
        };
        let params: GenerateVisualizationParams = args.into_params()?;
        let instructions = text(&params.instructions);

        let mut request = VizRequest::new(&result);
        request.chart_type = params.chart_type;
        request.custom = params.custom;
        request.instructions = instructions.as_deref();

        let outcome = self.agent.visualize(request).await;
        Ok(ctx.record_chart(outcome, result))
    }
}

struct ExecuteChartScript {
    agent: Arc<VisualizationAgent>,
}

#[async_trait]
impl ToolHandler<TurnContext> for ExecuteChartScript {
    async fn call(
        &self,
        ctx: &mut TurnContext,
        args: ToolArguments,
    ) -> Result<Observation, ToolError> {
        let result = match ctx.chartable() {
            Some(result) => result,
            None => return Err(nothing_to_chart(ctx)),
        };
        let code = args.into_params::<ExecuteChartScriptParams>()?.code;
        let previous = ctx
            .chart
            .clone()
            .or_else(|| ctx.state.last_chart_spec().cloned());

        let mut request = VizRequest::new(&result);
        request.code = Some(code.as_str());
        request.previous = previous.as_ref();

        let outcome = self.agent.visualize(request).await;
        Ok(ctx.record_chart(outcome, result))
    }
}

/// Records every call of the wrapped tool in the audit log.
struct Audited {
    tool: &'static str,
    pipe: String,
    inner: Arc<dyn ToolHandler<TurnContext>>,
    storage: Option<Arc<dyn Storage>>,
}

#[async_trait]
impl ToolHandler<TurnContext> for Audited {
    async fn call(
        &self,
        ctx: &mut TurnContext,
        args: ToolArguments,
    ) -> Result<Observation, ToolError> {
        let input = args.to_value();
        let start = Instant::now();
        let outcome = self.inner.call(ctx, args).await;

        let Some(storage) = &self.storage else {
            return outcome;
        };

        let latency_ms = start.elapsed().as_millis() as i64;
        let invocation = Invocation::new(self.tool, input)
            .with_session(ctx.session_id.clone())
            .with_pipe(self.pipe.clone());
        let invocation = match &outcome {
            Ok(observation) if observation.success => invocation.success(
                serde_json::to_value(observation).unwrap_or_default(),
                latency_ms,
            ),
            Ok(observation) => invocation.failure(
                observation
                    .error
                    .clone()
                    .or_else(|| observation.question.clone())
                    .unwrap_or_default(),
                latency_ms,
            ),
            Err(e) => invocation.failure(e.to_string(), latency_ms),
        };
        record(storage.as_ref(), &invocation).await;
        outcome
    }
}

/// Write `invocation` to the audit log; failures only warn.
pub(super) async fn record(storage: &dyn Storage, invocation: &Invocation) {
    if let Err(e) = storage.log_invocation(invocation).await {
        warn!(tool = %invocation.tool_name, error = %e, "Failed to log invocation");
    }
}

/// Collaborators the orchestrator tools call into.
pub struct OrchestratorTools {
    /// Data-query agent behind `query_paper_data`.
    pub data_agent: Arc<DataQueryAgent>,
    /// Chart generator behind both chart tools.
    pub viz_agent: Arc<VisualizationAgent>,
    /// Audit log, if any.
    pub storage: Option<Arc<dyn Storage>>,
    /// Pipe name recorded with each invocation.
    pub pipe: String,
}

/// Registry of the three orchestrator tools.
pub fn orchestrator_registry(
    tools: OrchestratorTools,
    timeout: Duration,
) -> Result<ToolRegistry<TurnContext>, RegistryError> {
    let handlers: [(&'static str, &str, ToolSchema, Arc<dyn ToolHandler<TurnContext>>); 3] = [
        (
            ORCHESTRATOR_TOOL_NAMES[0],
            "Answer a data question about the research-paper dataset. Delegates to the data-query agent.",
            ToolSchema::of::<QueryPaperDataParams>(),
            Arc::new(QueryPaperData {
                agent: tools.data_agent.clone(),
            }),
        ),
        (
            ORCHESTRATOR_TOOL_NAMES[1],
            "Chart this turn's query result, or the previous result when there is none.",
            ToolSchema::of::<GenerateVisualizationParams>(),
            Arc::new(GenerateVisualization {
                agent: tools.viz_agent.clone(),
            }),
        ),
        (
            ORCHESTRATOR_TOOL_NAMES[2],
            "Run a chart script against the current data. The script must bind vega_spec.",
            ToolSchema::of::<ExecuteChartScriptParams>(),
            Arc::new(ExecuteChartScript {
                agent: tools.viz_agent.clone(),
            }),
        ),
    ];

    let mut registry = ToolRegistry::new(timeout);
    for (name, description, schema, handler) in handlers {
        registry.register(ToolDescriptor::new(
            name,
            description,
            schema,
            Arc::new(Audited {
                tool: name,
                pipe: tools.pipe.clone(),
                inner: handler,
                storage: tools.storage.clone(),
            }),
        ))?;
    }
    Ok(registry)
}
