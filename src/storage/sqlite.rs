use async_trait::async_trait;
use chrono::DateTime;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{DatasetBundle, ImportSummary, Invocation, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at the configured path
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// In-memory database for tests and one-shot runs.
    ///
    /// Every pooled connection to `:memory:` is a separate database, so the
    /// pool is pinned to one connection.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for dataset queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()> {
        let input = serde_json::to_string(&invocation.input).unwrap_or_default();
        let output = invocation
            .output
            .as_ref()
            .map(|o| serde_json::to_string(o).unwrap_or_default());

        sqlx::query(
            r#"
            INSERT INTO invocations (id, session_id, tool_name, input, output, pipe_name, latency_ms, success, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&invocation.id)
        .bind(&invocation.session_id)
        .bind(&invocation.tool_name)
        .bind(&input)
        .bind(&output)
        .bind(&invocation.pipe_name)
        .bind(invocation.latency_ms)
        .bind(invocation.success)
        .bind(&invocation.error)
        .bind(invocation.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_invocations(&self, session_id: &str) -> StorageResult<Vec<Invocation>> {
        let rows: Vec<InvocationRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, tool_name, input, output, pipe_name, latency_ms, success, error, created_at
            FROM invocations
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn import_dataset(&self, bundle: &DatasetBundle) -> StorageResult<ImportSummary> {
        let mut tx = self.pool.begin().await?;

        for paper in &bundle.papers {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO papers (paperid, year, doctype, is_retracted, cited_by_count, patent_count)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&paper.paperid)
            .bind(paper.year)
            .bind(&paper.doctype)
            .bind(paper.is_retracted)
            .bind(paper.cited_by_count)
            .bind(paper.patent_count)
            .execute(&mut *tx)
            .await?;
        }

        for field in &bundle.fields {
            sqlx::query("INSERT OR REPLACE INTO fields (fieldid, display_name) VALUES (?, ?)")
                .bind(&field.fieldid)
                .bind(&field.display_name)
                .execute(&mut *tx)
                .await?;
        }

        for link in &bundle.paper_fields {
            sqlx::query("INSERT OR IGNORE INTO paper_fields (paperid, fieldid) VALUES (?, ?)")
                .bind(&link.paperid)
                .bind(&link.fieldid)
                .execute(&mut *tx)
                .await?;
        }

        for link in &bundle.paper_authors {
            sqlx::query("INSERT OR IGNORE INTO paper_authors (paperid, authorid) VALUES (?, ?)")
                .bind(&link.paperid)
                .bind(&link.authorid)
                .execute(&mut *tx)
                .await?;
        }

        for link in &bundle.patent_links {
            sqlx::query("INSERT INTO patent_links (paperid, patent_id) VALUES (?, ?)")
                .bind(&link.paperid)
                .bind(&link.patent_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let summary = ImportSummary {
            papers: bundle.papers.len(),
            fields: bundle.fields.len(),
            paper_fields: bundle.paper_fields.len(),
            paper_authors: bundle.paper_authors.len(),
            patent_links: bundle.patent_links.len(),
        };
        info!(
            papers = summary.papers,
            fields = summary.fields,
            paper_fields = summary.paper_fields,
            paper_authors = summary.paper_authors,
            patent_links = summary.patent_links,
            "Dataset imported"
        );

        Ok(summary)
    }
}

#[derive(sqlx::FromRow)]
struct InvocationRow {
    id: String,
    session_id: Option<String>,
    tool_name: String,
    input: String,
    output: Option<String>,
    pipe_name: Option<String>,
    latency_ms: Option<i64>,
    success: bool,
    error: Option<String>,
    created_at: String,
}

impl From<InvocationRow> for Invocation {
    fn from(row: InvocationRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            tool_name: row.tool_name,
            input: serde_json::from_str(&row.input).unwrap_or(serde_json::Value::Null),
            output: row.output.and_then(|o| serde_json::from_str(&o).ok()),
            pipe_name: row.pipe_name,
            latency_ms: row.latency_ms,
            success: row.success,
            error: row.error,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
        }
    }
}
