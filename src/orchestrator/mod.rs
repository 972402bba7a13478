//! Top-level chat turn handling.
//!
//! A turn either restyles the session's current chart directly or runs the
//! orchestrator loop over the data, visualization and chart-script tools. Each
//! turn works on a copy of the session state and writes it back only when the
//! turn completes.

mod intent;
mod response;
mod tools;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};

use crate::agents::{DataQueryAgent, LoopExit, ReasoningEngine, ReasoningLoop};
use crate::config::{AgentConfig, PipeConfig};
use crate::conversation::{ConversationState, SessionStore};
use crate::error::RegistryError;
use crate::prompts::ORCHESTRATOR_PROMPT;
use crate::storage::{Invocation, Storage};
use crate::tools::ToolRegistry;
use crate::viz::{VisualizationAgent, VizRequest};

pub use intent::{is_refinement, REFINEMENT_CUES};
pub use response::{ChatResponse, QueryType};
pub use tools::{orchestrator_registry, OrchestratorTools, TurnContext, ORCHESTRATOR_TOOL_NAMES};

const NO_CHART_QUESTION: &str = "There is no chart to improve yet. Which data would you like to \
see first? For example: \"show me the number of papers by field\".";

/// Outcome of a turn: the reply plus the state to commit, if any.
struct Turn {
    response: ChatResponse,
    commit: Option<ConversationState>,
}

impl Turn {
    fn complete(response: ChatResponse, state: ConversationState) -> Self {
        Self {
            response,
            commit: Some(state),
        }
    }

    fn abandoned(response: ChatResponse) -> Self {
        Self {
            response,
            commit: None,
        }
    }
}

/// Drives chat turns for every session.
pub struct Orchestrator {
    engine: Arc<dyn ReasoningEngine>,
    registry: ToolRegistry<TurnContext>,
    viz_agent: Arc<VisualizationAgent>,
    sessions: SessionStore,
    storage: Option<Arc<dyn Storage>>,
    pipe: String,
    max_steps: usize,
    turn_timeout: Duration,
}

impl Orchestrator {
    /// Wire the orchestrator over its two agents.
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        data_agent: Arc<DataQueryAgent>,
        viz_agent: Arc<VisualizationAgent>,
        storage: Option<Arc<dyn Storage>>,
        pipes: &PipeConfig,
        agents: &AgentConfig,
    ) -> Result<Self, RegistryError> {
        let turn_timeout = Duration::from_millis(agents.turn_timeout_ms);
        let registry = orchestrator_registry(
            OrchestratorTools {
                data_agent,
                viz_agent: viz_agent.clone(),
                storage: storage.clone(),
                pipe: pipes.orchestrator.clone(),
            },
            turn_timeout,
        )?;

        Ok(Self {
            engine,
            registry,
            viz_agent,
            sessions: SessionStore::new(agents.conversation_window, agents.max_sessions),
            storage,
            pipe: pipes.orchestrator.clone(),
            max_steps: agents.orchestrator_max_steps,
            turn_timeout,
        })
    }

    /// Orchestrator tools.
    pub fn registry(&self) -> &ToolRegistry<TurnContext> {
        &self.registry
    }

    /// Session states.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer one chat message in `session_id`.
    ///
    /// Turns in the same session run one at a time. A turn that fails, times
    /// out or is dropped leaves the session untouched.
    pub async fn chat(&self, session_id: &str, message: &str) -> ChatResponse {
        let message = message.trim();
        if message.is_empty() {
            return ChatResponse::failure("Empty message");
        }

        let handle = self.sessions.session(session_id).await;
        let mut state = handle.lock().await;
        let working = state.clone();
        let start = Instant::now();

        let turn = match tokio::time::timeout(
            self.turn_timeout,
            self.turn(session_id, working, message),
        )
        .await
        {
            Ok(turn) => turn,
            Err(_) => {
                warn!(
                    session_id,
                    timeout_ms = self.turn_timeout.as_millis() as u64,
                    "Turn timed out"
                );
                return ChatResponse::failure(format!(
                    "Request timed out after {}ms",
                    self.turn_timeout.as_millis()
                ));
            }
        };

        let committed = turn.commit.is_some();
        if let Some(next) = turn.commit {
            *state = next;
        }
        info!(
            session_id,
            success = turn.response.success,
            committed,
            latency_ms = start.elapsed().as_millis() as u64,
            "Turn finished"
        );
        turn.response
    }

    /// Forget the session's chart and cached result.
    pub async fn clear_chart(&self, session_id: &str) -> bool {
        match self.sessions.get(session_id).await {
            Some(handle) => {
                handle.lock().await.clear_chart();
                true
            }
            None => false,
        }
    }

    /// Drop the session entirely.
    pub async fn reset(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).await
    }

    async fn turn(&self, session_id: &str, state: ConversationState, message: &str) -> Turn {
        if is_refinement(message) {
            return self.refine(session_id, state, message).await;
        }

        let mut ctx = TurnContext::new(session_id, state);
        let history = ctx.history.clone();
        let react = ReasoningLoop::new(
            self.engine.as_ref(),
            &self.registry,
            &self.pipe,
            ORCHESTRATOR_PROMPT,
            self.max_steps,
        );
        let outcome = react.run(&mut ctx, &history, message).await;
        info!(
            session_id,
            steps = outcome.steps.len(),
            tools = ?outcome.tools_called(),
            phase = ?outcome.phase,
            "Orchestrator loop finished"
        );
        let last_error = outcome.last_error().map(str::to_string);

        match outcome.exit {
            LoopExit::Answer(answer) => compose(ctx, message, answer),
            LoopExit::Clarification(question) => {
                ctx.state.push_user(message);
                ctx.state.push_system(question.clone());
                Turn::complete(ChatResponse::clarification(question), ctx.state)
            }
            LoopExit::BudgetExceeded => {
                if ctx.result.is_some() || ctx.chart.is_some() {
                    let answer = ctx.narrative.clone().unwrap_or_default();
                    return compose(ctx, message, answer);
                }
                let mut error = format!(
                    "Stopped after {} reasoning steps without an answer",
                    self.max_steps
                );
                if let Some(last) = last_error {
                    error = format!("{}. Last error: {}", error, last);
                }
                ctx.state.push_user(message);
                ctx.state.push_system(error.clone());
                Turn::complete(ChatResponse::failure(error), ctx.state)
            }
            LoopExit::Failed { error, timed_out } => {
                warn!(session_id, timed_out, error = %error, "Turn failed");
                Turn::abandoned(ChatResponse::failure(error))
            }
        }
    }

    /// Restyle the current chart without querying again.
    async fn refine(&self, session_id: &str, mut state: ConversationState, message: &str) -> Turn {
        let (Some(previous), Some(result)) = (
            state.last_chart_spec().cloned(),
            state.last_query_result().cloned(),
        ) else {
            info!(session_id, "Refinement requested without a chart");
            state.push_user(message);
            state.push_system(NO_CHART_QUESTION);
            return Turn::complete(ChatResponse::clarification(NO_CHART_QUESTION), state);
        };

        let mut request = VizRequest::new(&result);
        request.refine = true;
        request.previous = Some(&previous);
        request.instructions = Some(message);

        let start = Instant::now();
        let outcome = self.viz_agent.visualize(request).await;
        let latency_ms = start.elapsed().as_millis() as i64;

        if let Some(storage) = &self.storage {
            let invocation = Invocation::new(
                ORCHESTRATOR_TOOL_NAMES[1],
                json!({"refine": true, "instructions": message}),
            )
            .with_session(session_id);
            let invocation = match &outcome.error {
                None => invocation.success(outcome.to_json(), latency_ms),
                Some(error) => invocation.failure(error.clone(), latency_ms),
            };
            tools::record(storage.as_ref(), &invocation).await;
        }

        match outcome.spec {
            Some(spec) => {
                let text = "Here is the refined chart.";
                state.commit_visualization(spec.clone(), result.clone());
                state.push_user(message);
                state.push_system(text);
                let response = ChatResponse::answer(text, QueryType::Refinement)
                    .with_chart(Some(spec))
                    .with_stats(Some(result.stats));
                Turn::complete(response, state)
            }
            None => Turn::abandoned(ChatResponse::failure(
                outcome
                    .error
                    .unwrap_or_else(|| "Could not refine the chart".to_string()),
            )),
        }
    }
}

/// Combine the loop's answer with this turn's data and chart.
fn compose(mut ctx: TurnContext, message: &str, answer: String) -> Turn {
    if ctx.result.is_none() && ctx.chart.is_none() {
        if let (Some(data), Some(viz)) = (&ctx.data_error, &ctx.viz_error) {
            return Turn::abandoned(ChatResponse::failure(format!(
                "Data query failed: {}. Visualization failed: {}",
                data, viz
            )));
        }
    }

    let text = if answer.trim().is_empty() {
        ctx.narrative
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| ctx.result.as_ref().map(|r| r.summary.clone()))
            .unwrap_or_else(|| "Done.".to_string())
    } else {
        answer
    };

    let query_type = ctx
        .result
        .as_ref()
        .and_then(|r| r.chart_type_hint)
        .map(QueryType::from)
        .unwrap_or(QueryType::Conversation);

    ctx.state.push_user(message);
    ctx.state.push_system(text.clone());

    let response = ChatResponse::answer(text, query_type)
        .with_chart(ctx.chart)
        .with_stats(ctx.result.map(|r| r.stats));
    Turn::complete(response, ctx.state)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
