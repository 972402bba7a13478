use super::*;
use crate::agents::{data_tool_registry, MockReasoningEngine};
use crate::config::SandboxConfig;
use crate::dataset::{FieldCount, MockQueryEngine, QueryEngine};
use crate::error::{LangbaseError, StorageError};
use crate::sandbox::Sandbox;
use crate::storage::SqliteStorage;
use pretty_assertions::assert_eq;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const ORCH: &str = "orch";
const DATA: &str = "data";
const VIZ: &str = "viz";
const DONE: &str = r#"{"thought": "done", "action": {"type": "final_answer", "answer": ""}}"#;

fn pipes() -> PipeConfig {
    PipeConfig {
        orchestrator: ORCH.to_string(),
        data_agent: DATA.to_string(),
        visualization: VIZ.to_string(),
    }
}

fn tool_call(tool: &str, args: &str) -> String {
    serde_json::json!({
        "thought": format!("use {}", tool),
        "action": {"type": "tool_call", "tool": tool, "arguments": args}
    })
    .to_string()
}

fn answer(text: &str) -> String {
    serde_json::json!({"action": {"type": "final_answer", "answer": text}}).to_string()
}

/// Engine replying from a per-pipe queue; exhausted queues finish.
fn scripted(replies: Vec<(&str, String)>) -> (MockReasoningEngine, Arc<Mutex<Vec<String>>>) {
    let mut queues: HashMap<String, VecDeque<String>> = HashMap::new();
    for (pipe, reply) in replies {
        queues.entry(pipe.to_string()).or_default().push_back(reply);
    }
    let queues = Mutex::new(queues);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = calls.clone();

    let mut engine = MockReasoningEngine::new();
    engine.expect_complete().returning(move |pipe, _| {
        seen.lock().unwrap().push(pipe.to_string());
        let next = queues
            .lock()
            .unwrap()
            .get_mut(pipe)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(|| DONE.to_string()))
    });
    (engine, calls)
}

fn fields(n: usize) -> Vec<FieldCount> {
    ["Medicine", "Biology", "Chemistry", "Physics", "Economics", "Sociology", "Geology"]
        .iter()
        .take(n)
        .enumerate()
        .map(|(i, name)| FieldCount {
            fieldid: format!("F{}", i),
            display_name: name.to_string(),
            paper_count: 100 - i as i64 * 10,
        })
        .collect()
}

fn build(
    engine: MockReasoningEngine,
    query: impl QueryEngine + 'static,
    storage: Option<Arc<dyn Storage>>,
    agents: AgentConfig,
) -> Orchestrator {
    let engine: Arc<dyn ReasoningEngine> = Arc::new(engine);
    let registry = data_tool_registry(Arc::new(query), Duration::from_secs(5)).unwrap();
    let data_agent = Arc::new(DataQueryAgent::new(
        engine.clone(),
        Arc::new(registry),
        DATA,
        &agents,
    ));
    let viz_agent = Arc::new(VisualizationAgent::new(
        engine.clone(),
        VIZ,
        Sandbox::new(SandboxConfig::default()),
    ));
    Orchestrator::new(engine, data_agent, viz_agent, storage, &pipes(), &agents).unwrap()
}

fn orchestrator(engine: MockReasoningEngine, query: MockQueryEngine) -> Orchestrator {
    build(engine, query, None, AgentConfig::default())
}

fn field_query(times: usize) -> MockQueryEngine {
    let mut query = MockQueryEngine::new();
    query
        .expect_papers_by_field()
        .times(times)
        .returning(|_, limit| Ok(fields(limit.unwrap_or(7) as usize)));
    query
}

fn chart_turn() -> Vec<(&'static str, String)> {
    vec![
        (ORCH, tool_call("query_paper_data", r#"{"request": "papers by field"}"#)),
        (DATA, tool_call("query_papers_by_field", "{}")),
        (DATA, answer("")),
        (ORCH, tool_call("generate_visualization", "{}")),
        (ORCH, answer("Medicine leads with 100 papers.")),
    ]
}

#[tokio::test]
async fn test_papers_by_field_produces_bar_chart() {
    let (engine, _) = scripted(chart_turn());
    let orch = orchestrator(engine, field_query(1));

    let response = orch.chat("s1", "show me the number of papers by field").await;

    assert!(response.success);
    assert_eq!(response.message.as_deref(), Some("Medicine leads with 100 papers."));
    assert_eq!(response.query_type, Some(QueryType::Bar));
    let spec = response.chart_spec.unwrap();
    assert_eq!(spec.mark(), Some("bar"));
    assert!(response.stats.unwrap()["total_fields"].as_i64().unwrap() > 0);

    let handle = orch.sessions().get("s1").await.unwrap();
    let state = handle.lock().await;
    assert!(state.can_refine());
    assert_eq!(state.len(), 2);
}

#[tokio::test]
async fn test_top_five_fields_chart_has_five_categories() {
    let (engine, _) = scripted(vec![
        (ORCH, tool_call("query_paper_data", r#"{"request": "top 5 research fields"}"#)),
        (DATA, tool_call("query_papers_by_field", r#"{"limit": 5}"#)),
        (DATA, answer("Five fields.")),
        (ORCH, tool_call("generate_visualization", r#"{"chart_type": "bar"}"#)),
        (ORCH, answer("Here are the top 5 fields.")),
    ]);
    let mut query = MockQueryEngine::new();
    query
        .expect_papers_by_field()
        .withf(|_, limit| *limit == Some(5))
        .times(1)
        .returning(|_, _| Ok(fields(5)));
    let orch = orchestrator(engine, query);

    let response = orch.chat("s1", "top 5 research fields and visualize them").await;

    let spec = response.chart_spec.unwrap();
    assert_eq!(spec.values().len(), 5);
}

#[tokio::test]
async fn test_refinement_without_chart_asks_for_data() {
    let mut engine = MockReasoningEngine::new();
    engine.expect_complete().never();
    let orch = orchestrator(engine, MockQueryEngine::new());

    let response = orch.chat("s1", "make this chart more beautiful").await;

    assert!(response.success);
    assert_eq!(response.query_type, Some(QueryType::Clarification));
    assert!(response.chart_spec.is_none());
    assert!(response.message.unwrap().contains("no chart to improve"));
}

#[tokio::test]
async fn test_refinement_reuses_cached_result() {
    let mut replies = chart_turn();
    replies.push((
        VIZ,
        r#"{"script": "vega_spec = set(previous, \"config.range.category\", palette(\"sunset\"))"}"#
            .to_string(),
    ));
    let (engine, calls) = scripted(replies);
    // One query across both turns.
    let orch = orchestrator(engine, field_query(1));

    let first = orch.chat("s1", "show me the number of papers by field").await;
    let before = calls.lock().unwrap().len();
    let second = orch.chat("s1", "make it prettier").await;

    assert!(second.success);
    assert_eq!(second.query_type, Some(QueryType::Refinement));
    let refined = second.chart_spec.unwrap();
    assert_eq!(refined.field("x"), first.chart_spec.unwrap().field("x"));
    assert_eq!(refined.as_value()["config"]["range"]["category"][0], "#F94144");

    let after: Vec<String> = calls.lock().unwrap()[before..].to_vec();
    assert_eq!(after, vec![VIZ.to_string()]);
}

#[tokio::test]
async fn test_invalid_limit_is_corrected() {
    let (engine, _) = scripted(vec![
        (ORCH, tool_call("query_paper_data", r#"{"request": "top fields"}"#)),
        (DATA, tool_call("query_papers_by_field", r#"{"limit": -3}"#)),
        (DATA, tool_call("query_papers_by_field", r#"{"limit": 3}"#)),
        (DATA, answer("")),
        (ORCH, answer("Top three fields.")),
    ]);
    let mut query = MockQueryEngine::new();
    query
        .expect_papers_by_field()
        .withf(|_, limit| *limit == Some(3))
        .times(1)
        .returning(|_, _| Ok(fields(3)));
    let orch = orchestrator(engine, query);

    let response = orch.chat("s1", "top fields").await;

    assert!(response.success);
    assert_eq!(response.query_type, Some(QueryType::Bar));
    assert!(response.chart_spec.is_none());
}

#[tokio::test]
async fn test_step_budget_degrades_to_error() {
    let mut engine = MockReasoningEngine::new();
    engine
        .expect_complete()
        .times(3)
        .returning(|_, _| Ok("I am thinking about it".to_string()));
    let agents = AgentConfig {
        orchestrator_max_steps: 3,
        ..Default::default()
    };
    let orch = build(engine, MockQueryEngine::new(), None, agents);

    let response = orch.chat("s1", "hello").await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.starts_with("Stopped after 3 reasoning steps"));
    assert!(error.contains("No JSON found"));
}

#[tokio::test]
async fn test_engine_failure_leaves_session_untouched() {
    let (engine, _) = scripted(chart_turn());
    let orch = orchestrator(engine, field_query(1));
    orch.chat("s1", "show me the number of papers by field").await;

    let handle = orch.sessions().get("s1").await.unwrap();
    let before = handle.lock().await.clone();

    let mut failing = MockReasoningEngine::new();
    failing
        .expect_complete()
        .returning(|_, _| Err(LangbaseError::Timeout { timeout_ms: 30000 }));
    let failing_orch = orchestrator(failing, MockQueryEngine::new());
    *failing_orch.sessions().session("s1").await.lock().await = before.clone();

    let response = failing_orch.chat("s1", "papers by year").await;

    assert!(!response.success);
    let after = failing_orch.sessions().get("s1").await.unwrap();
    let after = after.lock().await;
    assert_eq!(after.len(), before.len());
    assert_eq!(after.last_chart_spec(), before.last_chart_spec());
}

#[tokio::test]
async fn test_both_capabilities_failing() {
    let (engine, _) = scripted(vec![
        (ORCH, tool_call("query_paper_data", r#"{"request": "papers by field"}"#)),
        (DATA, tool_call("query_papers_by_field", "{}")),
        (ORCH, tool_call("generate_visualization", "{}")),
        (ORCH, answer("Sorry.")),
    ]);
    let mut query = MockQueryEngine::new();
    query.expect_papers_by_field().returning(|_, _| {
        Err(StorageError::Query {
            message: "database is locked".to_string(),
        })
    });
    let agents = AgentConfig {
        data_agent_max_steps: 1,
        ..Default::default()
    };
    let orch = build(engine, query, None, agents);

    let response = orch.chat("s1", "chart papers by field").await;

    assert!(!response.success);
    let error = response.error.unwrap();
    assert!(error.starts_with("Data query failed:"));
    assert!(error.contains("Visualization failed: No query result to visualize"));
    let handle = orch.sessions().get("s1").await.unwrap();
    assert!(handle.lock().await.is_empty());
}

#[tokio::test]
async fn test_clarification_from_data_agent() {
    let (engine, _) = scripted(vec![
        (ORCH, tool_call("query_paper_data", r#"{"request": "papers"}"#)),
        (
            DATA,
            tool_call("ask_clarification_question", r#"{"question": "Which field?"}"#),
        ),
    ]);
    let orch = orchestrator(engine, MockQueryEngine::new());

    let response = orch.chat("s1", "papers").await;

    assert_eq!(response.query_type, Some(QueryType::Clarification));
    assert_eq!(response.message.as_deref(), Some("Which field?"));
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let mut engine = MockReasoningEngine::new();
    engine.expect_complete().never();
    let orch = orchestrator(engine, MockQueryEngine::new());

    let response = orch.chat("s1", "   ").await;
    assert_eq!(response, ChatResponse::failure("Empty message"));
    assert!(orch.sessions().is_empty().await);
}

#[tokio::test]
async fn test_clear_chart_and_reset() {
    let (engine, _) = scripted(chart_turn());
    let orch = orchestrator(engine, field_query(1));
    orch.chat("s1", "show me the number of papers by field").await;

    assert!(orch.clear_chart("s1").await);
    let handle = orch.sessions().get("s1").await.unwrap();
    assert!(!handle.lock().await.can_refine());

    assert!(orch.reset("s1").await);
    assert!(!orch.reset("s1").await);
    assert!(!orch.clear_chart("missing").await);
}

#[tokio::test]
async fn test_invocations_are_audited() {
    let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
    let (engine, _) = scripted(chart_turn());
    let orch = build(
        engine,
        field_query(1),
        Some(storage.clone() as Arc<dyn Storage>),
        AgentConfig::default(),
    );

    orch.chat("s1", "show me the number of papers by field").await;

    let invocations = storage.get_invocations("s1").await.unwrap();
    let tools: Vec<&str> = invocations.iter().map(|i| i.tool_name.as_str()).collect();
    assert_eq!(tools, vec!["query_paper_data", "generate_visualization"]);
    assert!(invocations.iter().all(|i| i.success));
    assert_eq!(invocations[0].pipe_name.as_deref(), Some(ORCH));
}
