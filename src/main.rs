use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_langbase_dataviz::{
    config::{Config, LogFormat},
    langbase::LangbaseClient,
    server::{AppState, McpServer, DEFAULT_SESSION},
    storage::{DatasetBundle, SqliteStorage, Storage},
};

/// Research-paper dataset explorer over MCP.
#[derive(Debug, Parser)]
#[command(name = "mcp-langbase-dataviz", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve MCP over stdio (default).
    Serve,
    /// Answer one message and print the response JSON.
    Chat {
        /// Conversation id.
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
        /// The message to send.
        message: String,
    },
    /// Load the dataset JSON files in DIR into the database.
    Import {
        /// Directory holding papers.json and the link tables.
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "MCP Langbase Dataviz starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Import { dir } => import(&storage, &dir).await,
        Command::Serve => {
            let state = build_state(config, storage).await?;
            let server = McpServer::new(state);

            info!("Server ready, waiting for requests on stdin...");

            if let Err(e) = server.run().await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }

            info!("Server shutdown complete");
            Ok(())
        }
        Command::Chat { session, message } => {
            let state = build_state(config, storage).await?;
            let response = state.orchestrator.chat(&session, &message).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

/// Connect to Langbase, make sure the agent pipes exist and wire the agents.
async fn build_state(config: Config, storage: SqliteStorage) -> anyhow::Result<Arc<AppState>> {
    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    // Ensure required pipes exist (create if needed)
    info!("Ensuring required Langbase pipes exist...");
    if let Err(e) = langbase.ensure_agent_pipes(&config.pipes).await {
        error!(error = %e, "Failed to ensure agent pipes exist");
        return Err(e.into());
    }

    Ok(Arc::new(AppState::new(config, storage, langbase)?))
}

async fn import(storage: &SqliteStorage, dir: &std::path::Path) -> anyhow::Result<()> {
    let bundle = DatasetBundle::from_dir(dir)?;
    let summary = storage.import_dataset(&bundle).await?;
    info!(
        dir = %dir.display(),
        papers = summary.papers,
        fields = summary.fields,
        "Dataset imported"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
