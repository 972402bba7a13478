//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use mcp_langbase_dataviz::agents::ReasoningEngine;
use mcp_langbase_dataviz::config::{
    AgentConfig, Config, DatabaseConfig, LangbaseConfig, LoggingConfig, PipeConfig, RequestConfig,
    SandboxConfig,
};
use mcp_langbase_dataviz::error::{LangbaseError, LangbaseResult};
use mcp_langbase_dataviz::langbase::Message;
use mcp_langbase_dataviz::server::{AppState, SharedState};
use mcp_langbase_dataviz::storage::{
    DatasetBundle, FieldRecord, PaperAuthorRecord, PaperFieldRecord, PaperRecord,
    PatentLinkRecord, SqliteStorage, Storage,
};

fn paper(id: &str, year: i64, cites: i64) -> PaperRecord {
    PaperRecord {
        paperid: id.to_string(),
        year,
        doctype: Some("article".to_string()),
        is_retracted: false,
        cited_by_count: cites,
        patent_count: 0,
    }
}

fn link(paperid: &str, fieldid: &str) -> PaperFieldRecord {
    PaperFieldRecord {
        paperid: paperid.to_string(),
        fieldid: fieldid.to_string(),
    }
}

fn author(paperid: &str, authorid: &str) -> PaperAuthorRecord {
    PaperAuthorRecord {
        paperid: paperid.to_string(),
        authorid: authorid.to_string(),
    }
}

fn patent(paperid: &str, id: &str) -> PatentLinkRecord {
    PatentLinkRecord {
        paperid: paperid.to_string(),
        patent_id: Some(id.to_string()),
    }
}

/// Five papers across three fields.
///
/// - Computer Science: p1, p2, p4; Biology: p3, p5; Physics: p5
/// - years 2019 (p1), 2020 (p2, p3), 2021 (p4, p5)
/// - citations 120, 5, 0, 40, 75
/// - patents: p1 has two, p4 has one
/// - authors: a1 wrote p1, p2, p4; a3 wrote p4, p5; a2 wrote p3
pub fn sample_bundle() -> DatasetBundle {
    DatasetBundle {
        papers: vec![
            paper("p1", 2019, 120),
            paper("p2", 2020, 5),
            paper("p3", 2020, 0),
            paper("p4", 2021, 40),
            paper("p5", 2021, 75),
        ],
        fields: vec![
            FieldRecord {
                fieldid: "f1".to_string(),
                display_name: "Computer Science".to_string(),
            },
            FieldRecord {
                fieldid: "f2".to_string(),
                display_name: "Biology".to_string(),
            },
            FieldRecord {
                fieldid: "f3".to_string(),
                display_name: "Physics".to_string(),
            },
        ],
        paper_fields: vec![
            link("p1", "f1"),
            link("p2", "f1"),
            link("p3", "f2"),
            link("p4", "f1"),
            link("p5", "f2"),
            link("p5", "f3"),
        ],
        paper_authors: vec![
            author("p1", "a1"),
            author("p2", "a1"),
            author("p3", "a2"),
            author("p4", "a1"),
            author("p4", "a3"),
            author("p5", "a3"),
        ],
        patent_links: vec![patent("p1", "US1"), patent("p1", "US2"), patent("p4", "EP1")],
    }
}

/// Write the sample bundle as the JSON files `import` reads.
pub fn write_bundle(dir: &Path) {
    let bundle = sample_bundle();
    let tables = [
        ("papers.json", serde_json::to_string(&bundle.papers)),
        ("fields.json", serde_json::to_string(&bundle.fields)),
        ("paper_fields.json", serde_json::to_string(&bundle.paper_fields)),
        ("paper_authors.json", serde_json::to_string(&bundle.paper_authors)),
        ("patent_links.json", serde_json::to_string(&bundle.patent_links)),
    ];
    for (file, body) in tables {
        std::fs::write(dir.join(file), body.unwrap()).unwrap();
    }
}

/// In-memory storage holding the sample bundle.
pub async fn seeded_storage() -> SqliteStorage {
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    storage.import_dataset(&sample_bundle()).await.unwrap();
    storage
}

/// Configuration with every default and a dummy API key.
pub fn test_config() -> Config {
    Config {
        langbase: LangbaseConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
        },
        database: DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig::default(),
        request: RequestConfig::default(),
        pipes: PipeConfig::default(),
        agents: AgentConfig::default(),
        sandbox: SandboxConfig::default(),
    }
}

/// Application state over the sample dataset and `engine`.
pub async fn app(engine: Arc<ScriptedEngine>) -> SharedState {
    app_with(test_config(), engine).await
}

/// Application state over the sample dataset with a custom configuration.
pub async fn app_with(config: Config, engine: Arc<ScriptedEngine>) -> SharedState {
    let storage = seeded_storage().await;
    let engine: Arc<dyn ReasoningEngine> = engine;
    Arc::new(AppState::with_engine(config, storage, engine).unwrap())
}

/// Decision calling `tool` with `arguments`.
pub fn call(tool: &str, arguments: serde_json::Value) -> String {
    json!({
        "thought": format!("calling {}", tool),
        "action": {"type": "tool_call", "tool": tool, "arguments": arguments.to_string()}
    })
    .to_string()
}

/// Decision ending the loop with `answer`.
pub fn answer(text: &str) -> String {
    json!({
        "thought": "done",
        "action": {"type": "final_answer", "answer": text}
    })
    .to_string()
}

/// Reasoning engine replaying canned completions per pipe.
///
/// An exhausted queue answers with an empty final answer.
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<HashMap<String, VecDeque<LangbaseResult<String>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, pipe: &str, completion: impl Into<String>) -> Self {
        self.push(pipe, Ok(completion.into()));
        self
    }

    pub fn fail(self, pipe: &str, message: &str) -> Self {
        self.push(
            pipe,
            Err(LangbaseError::Api {
                status: 500,
                message: message.to_string(),
            }),
        );
        self
    }

    fn push(&self, pipe: &str, completion: LangbaseResult<String>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(pipe.to_string())
            .or_default()
            .push_back(completion);
    }

    /// Pipes called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn complete(&self, pipe: &str, _messages: Vec<Message>) -> LangbaseResult<String> {
        self.calls.lock().unwrap().push(pipe.to_string());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(pipe)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(answer("")))
    }
}
