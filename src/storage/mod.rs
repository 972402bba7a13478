//! Storage layer: the SQLite database holding the paper dataset and the
//! tool-invocation audit log.

mod sqlite;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use sqlite::SqliteStorage;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Audit record of one orchestrator-level tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Chat session the invocation belongs to.
    pub session_id: Option<String>,
    /// Name of the tool invoked.
    pub tool_name: String,
    /// Input arguments as JSON.
    pub input: serde_json::Value,
    /// Observation as JSON (if successful).
    pub output: Option<serde_json::Value>,
    /// Langbase pipe that chose the call.
    pub pipe_name: Option<String>,
    /// Latency in milliseconds.
    pub latency_ms: Option<i64>,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// When the invocation occurred.
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            tool_name: tool_name.into(),
            input,
            output: None,
            pipe_name: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the pipe name
    pub fn with_pipe(mut self, pipe_name: impl Into<String>) -> Self {
        self.pipe_name = Some(pipe_name.into());
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// A paper row of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Paper identifier.
    pub paperid: String,
    /// Publication year.
    pub year: i64,
    /// Document type (article, review, ...).
    #[serde(default)]
    pub doctype: Option<String>,
    /// Whether the paper was retracted.
    #[serde(default)]
    pub is_retracted: bool,
    /// Citation count.
    #[serde(default)]
    pub cited_by_count: i64,
    /// Patent count reported by the source.
    #[serde(default)]
    pub patent_count: i64,
}

/// A research field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Field identifier.
    pub fieldid: String,
    /// Human-readable field name.
    pub display_name: String,
}

/// Paper-to-field membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperFieldRecord {
    /// Paper identifier.
    pub paperid: String,
    /// Field identifier.
    pub fieldid: String,
}

/// Paper authorship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperAuthorRecord {
    /// Paper identifier.
    pub paperid: String,
    /// Author identifier.
    pub authorid: String,
}

/// A patent citing a paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentLinkRecord {
    /// Paper identifier.
    pub paperid: String,
    /// Patent identifier.
    #[serde(default)]
    pub patent_id: Option<String>,
}

/// All tables of the dataset, as loaded by `import`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetBundle {
    /// Papers.
    pub papers: Vec<PaperRecord>,
    /// Research fields.
    pub fields: Vec<FieldRecord>,
    /// Paper-field links.
    pub paper_fields: Vec<PaperFieldRecord>,
    /// Authorship links.
    pub paper_authors: Vec<PaperAuthorRecord>,
    /// Patent links.
    pub patent_links: Vec<PatentLinkRecord>,
}

/// Row counts written by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Papers written.
    pub papers: usize,
    /// Fields written.
    pub fields: usize,
    /// Paper-field links written.
    pub paper_fields: usize,
    /// Authorship links written.
    pub paper_authors: usize,
    /// Patent links written.
    pub patent_links: usize,
}

impl DatasetBundle {
    /// Load a bundle from a directory of JSON array files.
    ///
    /// `papers.json` is required; the other tables are optional.
    pub fn from_dir(dir: &Path) -> StorageResult<Self> {
        Ok(Self {
            papers: read_table(dir, "papers.json", true)?,
            fields: read_table(dir, "fields.json", false)?,
            paper_fields: read_table(dir, "paper_fields.json", false)?,
            paper_authors: read_table(dir, "paper_authors.json", false)?,
            patent_links: read_table(dir, "patent_links.json", false)?,
        })
    }
}

fn read_table<T: DeserializeOwned>(dir: &Path, file: &str, required: bool) -> StorageResult<Vec<T>> {
    let path = dir.join(file);
    if !path.exists() {
        if required {
            return Err(StorageError::Import {
                file: file.to_string(),
                message: format!("{} not found", path.display()),
            });
        }
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(&path).map_err(|e| StorageError::Import {
        file: file.to_string(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&raw).map_err(|e| StorageError::Import {
        file: file.to_string(),
        message: e.to_string(),
    })
}

/// Persistence operations beyond dataset queries.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Record a tool invocation.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
    /// Invocations of a session, oldest first.
    async fn get_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>>;
    /// Write a dataset bundle in a single transaction.
    async fn import_dataset(&self, bundle: &DatasetBundle) -> StorageResult<ImportSummary>;
}
