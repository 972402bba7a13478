//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state wiring the agents together

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{data_tool_registry, DataContext, DataQueryAgent, ReasoningEngine};
use crate::config::Config;
use crate::dataset::{QueryEngine, SqliteQueryEngine};
use crate::error::AppResult;
use crate::langbase::LangbaseClient;
use crate::orchestrator::Orchestrator;
use crate::sandbox::Sandbox;
use crate::storage::{SqliteStorage, Storage};
use crate::tools::ToolRegistry;
use crate::viz::VisualizationAgent;

/// Application state shared across handlers.
///
/// Owns the orchestrator with its sessions, plus the data tool catalogue
/// that is also exposed directly over MCP.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Chat turn driver.
    pub orchestrator: Orchestrator,
    /// The twelve data tools.
    pub data_tools: Arc<ToolRegistry<DataContext>>,
}

impl AppState {
    /// Create new application state backed by Langbase.
    pub fn new(config: Config, storage: SqliteStorage, langbase: LangbaseClient) -> AppResult<Self> {
        let engine: Arc<dyn ReasoningEngine> = Arc::new(langbase);
        Self::with_engine(config, storage, engine)
    }

    /// Create application state over any reasoning engine.
    pub fn with_engine(
        config: Config,
        storage: SqliteStorage,
        engine: Arc<dyn ReasoningEngine>,
    ) -> AppResult<Self> {
        tracing::info!(
            orchestrator_pipe = %config.pipes.orchestrator,
            data_agent_pipe = %config.pipes.data_agent,
            visualization_pipe = %config.pipes.visualization,
            "AppState initializing with pipe configuration"
        );

        let query: Arc<dyn QueryEngine> = Arc::new(SqliteQueryEngine::new(&storage));
        let data_tools = Arc::new(data_tool_registry(
            query,
            Duration::from_millis(config.agents.tool_timeout_ms),
        )?);

        let data_agent = Arc::new(DataQueryAgent::new(
            engine.clone(),
            data_tools.clone(),
            config.pipes.data_agent.clone(),
            &config.agents,
        ));
        let viz_agent = Arc::new(VisualizationAgent::new(
            engine.clone(),
            config.pipes.visualization.clone(),
            Sandbox::new(config.sandbox.clone()),
        ));
        let audit: Arc<dyn Storage> = Arc::new(storage.clone());
        let orchestrator = Orchestrator::new(
            engine,
            data_agent,
            viz_agent,
            Some(audit),
            &config.pipes,
            &config.agents,
        )?;

        Ok(Self {
            config,
            storage,
            orchestrator,
            data_tools,
        })
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::agents::MockReasoningEngine;
    use crate::config::{
        AgentConfig, DatabaseConfig, LangbaseConfig, LogFormat, LoggingConfig, PipeConfig,
        RequestConfig, SandboxConfig,
    };
    use std::path::PathBuf;

    pub fn create_test_config() -> Config {
        Config {
            langbase: LangbaseConfig {
                api_key: "test-key".to_string(),
                base_url: "https://api.langbase.com".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from(":memory:"),
                max_connections: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            pipes: PipeConfig::default(),
            agents: AgentConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }

    /// State over an empty in-memory dataset and the given engine.
    pub async fn state_with(engine: MockReasoningEngine) -> SharedState {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        Arc::new(AppState::with_engine(create_test_config(), storage, Arc::new(engine)).unwrap())
    }
}
