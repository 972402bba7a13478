//! # MCP Langbase Dataviz Server
//!
//! A Model Context Protocol (MCP) server that answers natural-language questions
//! about a research-paper dataset with a narrative answer and, when the data
//! suits one, an interactive Vega-Lite chart. Reasoning is delegated to
//! Langbase Pipes.
//!
//! ## Features
//!
//! - **Orchestrator**: a bounded reason-act loop that decides which capability to call
//! - **Data-Query Agent**: twelve schema-validated query tools over SQLite
//! - **Visualization Agent**: template, reasoning-engine and chart-script strategies
//! - **Chart-Script Sandbox**: an in-crate interpreter with fuel and time limits
//! - **Conversation State**: per-session message window with a sticky last chart
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → Orchestrator ─┬─→ Data-Query Agent → SQLite
//!                                     ↓          └─→ Visualization Agent → Sandbox
//!                              Langbase Pipes (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_langbase_dataviz::{Config, AppState, McpServer};
//! use mcp_langbase_dataviz::langbase::LangbaseClient;
//! use mcp_langbase_dataviz::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let langbase = LangbaseClient::new(&config.langbase, config.request.clone())?;
//!     let state = Arc::new(AppState::new(config, storage, langbase)?);
//!     let server = McpServer::new(state);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Reasoning-engine adapter, the reason-act loop and the data-query agent.
pub mod agents;
/// Configuration management for the MCP server.
pub mod config;
/// Per-session conversation state.
pub mod conversation;
/// Query engine over the research-paper dataset.
pub mod dataset;
/// Error types and result aliases for the application.
pub mod error;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// Chat turn handling across the agents.
pub mod orchestrator;
/// System prompts for Langbase pipes.
pub mod prompts;
/// Sandboxed chart-script interpreter.
pub mod sandbox;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;
/// Tool schemas, observations and the tool registry.
pub mod tools;
/// Chart specifications and the visualization agent.
pub mod viz;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
