use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::{DataContext, LoopExit, ReasoningEngine, ReasoningLoop};
use crate::config::AgentConfig;
use crate::dataset::QueryResult;
use crate::langbase::Message;
use crate::prompts::DATA_AGENT_PROMPT;
use crate::tools::ToolRegistry;

/// What the data-query agent produced for one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataReport {
    /// Whether usable data or an answer came back.
    pub success: bool,
    /// Last successful query result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
    /// Narrative for the user.
    pub message: String,
    /// Question to put to the user instead of data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether a time limit was hit.
    #[serde(skip)]
    pub timed_out: bool,
    /// Data tools called, in order.
    pub tools_called: Vec<String>,
}

impl DataReport {
    fn failure(error: impl Into<String>, timed_out: bool) -> Self {
        let error = error.into();
        Self {
            success: false,
            message: error.clone(),
            error: Some(error),
            timed_out,
            ..Default::default()
        }
    }
}

/// Runs the data tools under their own bounded reasoning loop.
pub struct DataQueryAgent {
    engine: Arc<dyn ReasoningEngine>,
    registry: Arc<ToolRegistry<DataContext>>,
    pipe: String,
    max_steps: usize,
    window: usize,
    timeout: Duration,
}

impl DataQueryAgent {
    /// Create an agent over `registry`.
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        registry: Arc<ToolRegistry<DataContext>>,
        pipe: impl Into<String>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            pipe: pipe.into(),
            max_steps: config.data_agent_max_steps,
            window: config.data_agent_window,
            timeout: Duration::from_millis(config.data_agent_timeout_ms),
        }
    }

    /// The data tools.
    pub fn registry(&self) -> &ToolRegistry<DataContext> {
        &self.registry
    }

    /// Answer `request`, seeing at most the configured number of `history` messages.
    pub async fn run(&self, request: &str, history: &[Message]) -> DataReport {
        let recent = &history[history.len().saturating_sub(self.window)..];
        let react = ReasoningLoop::new(
            self.engine.as_ref(),
            self.registry.as_ref(),
            &self.pipe,
            DATA_AGENT_PROMPT,
            self.max_steps,
        );
        let mut ctx = DataContext::default();

        let outcome =
            match tokio::time::timeout(self.timeout, react.run(&mut ctx, recent, request)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(timeout_ms = self.timeout.as_millis() as u64, "Data query timed out");
                    return DataReport::failure(
                        format!(
                            "Data query timed out after {}ms",
                            self.timeout.as_millis()
                        ),
                        true,
                    );
                }
            };

        let tools_called: Vec<String> =
            outcome.tools_called().into_iter().map(str::to_string).collect();
        info!(
            steps = outcome.steps.len(),
            tools = ?tools_called,
            "Data query finished"
        );

        let summary = ctx
            .last_result
            .as_ref()
            .map(|r| r.summary.clone())
            .unwrap_or_default();

        let mut report = match outcome.exit {
            LoopExit::Answer(answer) => DataReport {
                success: true,
                message: if answer.trim().is_empty() {
                    summary
                } else {
                    answer
                },
                result: ctx.last_result,
                ..Default::default()
            },
            LoopExit::Clarification(question) => DataReport {
                success: false,
                message: format!("I need more information: {}", question),
                clarification: Some(question),
                ..Default::default()
            },
            LoopExit::BudgetExceeded => match ctx.last_result {
                Some(result) => DataReport {
                    success: true,
                    message: summary,
                    result: Some(result),
                    ..Default::default()
                },
                None => {
                    let mut error = format!(
                        "Data query exceeded its step budget of {} steps",
                        self.max_steps
                    );
                    if let Some(last) = outcome.last_error() {
                        error = format!("{}. Last error: {}", error, last);
                    }
                    DataReport::failure(error, false)
                }
            },
            LoopExit::Failed { error, timed_out } => DataReport::failure(error, timed_out),
        };
        report.tools_called = tools_called;
        report
    }
}
