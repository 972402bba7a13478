use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{extract_json_from_completion, ReasoningEngine};
use crate::error::LangbaseError;
use crate::langbase::Message;
use crate::prompts::DECISION_FORMAT;
use crate::tools::{Observation, ToolRegistry};

/// Rows of an observation shown to the engine; the rest are summarised.
const MAX_PROMPT_ROWS: usize = 20;

/// Phase of a reasoning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// No input yet.
    AwaitingInput,
    /// Waiting on the reasoning engine.
    Thinking,
    /// Running a tool.
    Acting,
    /// Feeding a tool result back.
    Observing,
    /// Finished with an answer.
    Done,
    /// Gave up: engine failure, timeout or exhausted budget.
    Failed,
}

impl TurnPhase {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (AwaitingInput, Thinking)
                | (Thinking, Acting)
                | (Thinking, Done)
                | (Thinking, Observing)
                | (Thinking, Failed)
                | (Acting, Observing)
                | (Observing, Thinking)
                | (Observing, Done)
                | (Observing, Failed)
        )
    }

    fn advance(&mut self, next: TurnPhase) {
        debug_assert!(
            self.can_transition_to(next),
            "invalid phase transition {:?} -> {:?}",
            self,
            next
        );
        *self = next;
    }

    /// Whether the loop has stopped.
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnPhase::Done | TurnPhase::Failed)
    }
}

/// What the engine decided to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentAction {
    /// Invoke a tool.
    ToolCall {
        /// Tool name.
        tool: String,
        /// JSON-encoded argument object.
        #[serde(default = "empty_arguments", deserialize_with = "arguments_string")]
        arguments: String,
    },
    /// Stop and answer.
    FinalAnswer {
        /// Text for the user.
        answer: String,
    },
}

fn empty_arguments() -> String {
    "{}".to_string()
}

/// Accept the argument object either JSON-encoded or inline.
fn arguments_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => empty_arguments(),
        other => other.to_string(),
    })
}

/// One decoded engine decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDecision {
    /// The engine's reasoning.
    #[serde(default)]
    pub thought: String,
    /// Chosen action.
    pub action: AgentAction,
}

impl AgentDecision {
    /// Decode a completion, tolerating code fences.
    pub fn parse(completion: &str) -> Result<Self, String> {
        let json = extract_json_from_completion(completion)?;
        serde_json::from_str(json).map_err(|e| format!("Could not decode decision: {}", e))
    }
}

/// One thought/action/observation triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStep {
    /// The engine's reasoning.
    pub thought: String,
    /// Decoded action; `None` when the completion could not be decoded.
    pub action: Option<AgentAction>,
    /// Tool result, absent for a final answer.
    pub observation: Option<Observation>,
}

impl AgentStep {
    /// Tool called in this step.
    pub fn tool(&self) -> Option<&str> {
        match &self.action {
            Some(AgentAction::ToolCall { tool, .. }) => Some(tool),
            _ => None,
        }
    }
}

/// How a loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// The engine gave a final answer.
    Answer(String),
    /// A tool asked the user a question.
    Clarification(String),
    /// The step budget ran out.
    BudgetExceeded,
    /// The engine failed or a tool timed out.
    Failed {
        /// What went wrong.
        error: String,
        /// Whether a time limit was hit.
        timed_out: bool,
    },
}

/// Result of [`ReasoningLoop::run`].
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Steps taken, in order.
    pub steps: Vec<AgentStep>,
    /// Why the loop stopped.
    pub exit: LoopExit,
    /// Final phase.
    pub phase: TurnPhase,
}

impl LoopOutcome {
    /// Names of the tools called, in order.
    pub fn tools_called(&self) -> Vec<&str> {
        self.steps.iter().filter_map(AgentStep::tool).collect()
    }

    /// Most recent successful observation.
    pub fn last_success(&self) -> Option<&Observation> {
        self.steps
            .iter()
            .rev()
            .filter_map(|s| s.observation.as_ref())
            .find(|o| o.success)
    }

    /// Most recent failure message from any step.
    pub fn last_error(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .filter_map(|s| s.observation.as_ref())
            .find_map(|o| o.error.as_deref())
    }
}

/// A bounded thought/action/observation loop over one tool registry.
pub struct ReasoningLoop<'a, C> {
    engine: &'a dyn ReasoningEngine,
    registry: &'a ToolRegistry<C>,
    pipe: &'a str,
    instructions: &'a str,
    max_steps: usize,
}

impl<'a, C: Send> ReasoningLoop<'a, C> {
    /// Loop over `registry`, asking `engine` through `pipe`.
    pub fn new(
        engine: &'a dyn ReasoningEngine,
        registry: &'a ToolRegistry<C>,
        pipe: &'a str,
        instructions: &'a str,
        max_steps: usize,
    ) -> Self {
        Self {
            engine,
            registry,
            pipe,
            instructions,
            max_steps: max_steps.max(1),
        }
    }

    fn system_prompt(&self) -> String {
        let catalogue = serde_json::to_string_pretty(&self.registry.catalogue())
            .unwrap_or_else(|_| self.registry.names().join(", "));
        format!(
            "{}\n\nTool catalogue:\n{}\n\n{}",
            self.instructions, catalogue, DECISION_FORMAT
        )
    }

    /// Run until a final answer, a terminal observation or the step budget.
    ///
    /// Every engine call counts as one step, including calls whose output
    /// cannot be decoded.
    pub async fn run(&self, ctx: &mut C, history: &[Message], task: &str) -> LoopOutcome {
        let mut phase = TurnPhase::AwaitingInput;
        let mut steps = Vec::new();

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt()));
        messages.extend_from_slice(history);
        messages.push(Message::user(task));

        for step in 1..=self.max_steps {
            phase.advance(TurnPhase::Thinking);
            debug!(pipe = %self.pipe, step, "Requesting decision");

            let completion = match self.engine.complete(self.pipe, messages.clone()).await {
                Ok(completion) => completion,
                Err(e) => {
                    warn!(pipe = %self.pipe, step, error = %e, "Reasoning engine failed");
                    phase.advance(TurnPhase::Failed);
                    return LoopOutcome {
                        steps,
                        exit: LoopExit::Failed {
                            timed_out: matches!(e, LangbaseError::Timeout { .. }),
                            error: e.to_string(),
                        },
                        phase,
                    };
                }
            };
            messages.push(Message::assistant(completion.clone()));

            let decision = match AgentDecision::parse(&completion) {
                Ok(decision) => decision,
                Err(reason) => {
                    warn!(pipe = %self.pipe, step, error = %reason, "Undecodable decision");
                    phase.advance(TurnPhase::Observing);
                    let observation = Observation::failure(reason);
                    messages.push(observation_message(&observation));
                    steps.push(AgentStep {
                        thought: String::new(),
                        action: None,
                        observation: Some(observation),
                    });
                    continue;
                }
            };

            let (tool, arguments) = match decision.action.clone() {
                AgentAction::FinalAnswer { answer } => {
                    info!(pipe = %self.pipe, step, "Final answer");
                    steps.push(AgentStep {
                        thought: decision.thought,
                        action: Some(decision.action),
                        observation: None,
                    });
                    phase.advance(TurnPhase::Done);
                    return LoopOutcome {
                        steps,
                        exit: LoopExit::Answer(answer),
                        phase,
                    };
                }
                AgentAction::ToolCall { tool, arguments } => (tool, arguments),
            };

            phase.advance(TurnPhase::Acting);
            info!(pipe = %self.pipe, step, tool = %tool, "Dispatching tool call");
            let observation = self.registry.dispatch(ctx, &tool, &arguments).await;
            phase.advance(TurnPhase::Observing);

            messages.push(observation_message(&observation));
            let clarification = observation
                .needs_clarification
                .then(|| observation.question.clone().unwrap_or_default());
            let timeout = observation.is_timeout().then(|| {
                observation
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("{} timed out", tool))
            });

            steps.push(AgentStep {
                thought: decision.thought,
                action: Some(decision.action),
                observation: Some(observation),
            });

            if let Some(question) = clarification {
                info!(pipe = %self.pipe, step, "Clarification requested");
                phase.advance(TurnPhase::Done);
                return LoopOutcome {
                    steps,
                    exit: LoopExit::Clarification(question),
                    phase,
                };
            }
            if let Some(error) = timeout {
                phase.advance(TurnPhase::Failed);
                return LoopOutcome {
                    steps,
                    exit: LoopExit::Failed {
                        error,
                        timed_out: true,
                    },
                    phase,
                };
            }
        }

        warn!(pipe = %self.pipe, max_steps = self.max_steps, "Step budget exhausted");
        phase.advance(TurnPhase::Failed);
        LoopOutcome {
            steps,
            exit: LoopExit::BudgetExceeded,
            phase,
        }
    }
}

/// Feedback message for an observation, with long row lists cut down.
fn observation_message(observation: &Observation) -> Message {
    let mut value = serde_json::to_value(observation).unwrap_or(Value::Null);
    if let Some(Value::Array(rows)) = value.get_mut("data") {
        if rows.len() > MAX_PROMPT_ROWS {
            let omitted = rows.len() - MAX_PROMPT_ROWS;
            rows.truncate(MAX_PROMPT_ROWS);
            value["rows_omitted"] = Value::from(omitted);
        }
    }
    Message::user(format!("Observation: {}", value))
}
