use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{info, warn};

use super::SharedState;
use crate::agents::DataContext;
use crate::error::{McpError, McpResult};
use crate::storage::{Invocation, Storage};

/// Session used when a chat call names none.
pub const DEFAULT_SESSION: &str = "default";

/// Parameters of the `chat` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChatParams {
    /// The user's message
    pub message: String,
    /// Conversation to continue (defaults to "default")
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Parameters of the session maintenance tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SessionParams {
    /// Conversation to act on
    pub session_id: String,
}

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "chat" => handle_chat(state, arguments).await,
        "clear_chart" => handle_clear_chart(state, arguments).await,
        "reset_session" => handle_reset_session(state, arguments).await,
        name if state.data_tools.contains(name) => handle_data_tool(state, name, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Handle chat tool call
async fn handle_chat(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ChatParams = parse_arguments("chat", arguments)?;
    let session_id = params
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    let response = state.orchestrator.chat(&session_id, &params.message).await;
    serde_json::to_value(response).map_err(McpError::Json)
}

/// Handle clear_chart tool call
async fn handle_clear_chart(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionParams = parse_arguments("clear_chart", arguments)?;
    let cleared = state.orchestrator.clear_chart(&params.session_id).await;
    Ok(json!({
        "success": cleared,
        "session_id": params.session_id,
    }))
}

/// Handle reset_session tool call
async fn handle_reset_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionParams = parse_arguments("reset_session", arguments)?;
    let removed = state.orchestrator.reset(&params.session_id).await;
    Ok(json!({
        "success": removed,
        "session_id": params.session_id,
    }))
}

/// Run one data tool outside any conversation.
///
/// Argument problems come back as a failed Observation rather than an MCP
/// error, matching what the agents see.
async fn handle_data_tool(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    let input = arguments.unwrap_or_else(|| json!({}));
    let raw = input.to_string();
    let start = Instant::now();

    let mut ctx = DataContext::default();
    let observation = state.data_tools.dispatch(&mut ctx, tool_name, &raw).await;
    let latency_ms = start.elapsed().as_millis() as i64;
    let output = serde_json::to_value(&observation).map_err(McpError::Json)?;

    let invocation = Invocation::new(tool_name, input);
    let invocation = match &observation.error {
        Some(error) if !observation.success => invocation.failure(error.clone(), latency_ms),
        _ => invocation.success(output.clone(), latency_ms),
    };
    if let Err(e) = state.storage.log_invocation(&invocation).await {
        warn!(tool = %tool_name, error = %e, "Failed to log invocation");
    }

    Ok(output)
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}
