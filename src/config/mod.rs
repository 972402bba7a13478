use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Langbase API access.
    pub langbase: LangbaseConfig,
    /// SQLite database holding the paper dataset and the audit log.
    pub database: DatabaseConfig,
    /// Log level and output format.
    pub logging: LoggingConfig,
    /// HTTP timeouts and transport retries.
    pub request: RequestConfig,
    /// Pipe names for each reasoning role.
    pub pipes: PipeConfig,
    /// Step budgets, windows and timeouts of the reasoning loops.
    pub agents: AgentConfig,
    /// Resource ceilings for chart scripts.
    pub sandbox: SandboxConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    /// Bearer token for the Langbase API.
    pub api_key: String,
    /// API base URL without a trailing slash.
    pub base_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path of the SQLite file.
    pub path: PathBuf,
    /// Connection pool size.
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Transport-level retries for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_delay_ms: u64,
}

/// Langbase pipe name configuration
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Pipe that drives the top-level orchestrator loop.
    pub orchestrator: String,
    /// Pipe that drives the data-query sub-loop.
    pub data_agent: String,
    /// Pipe used for chart specs and chart scripts.
    pub visualization: String,
}

/// Reasoning loop limits.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Step budget of the orchestrator loop.
    pub orchestrator_max_steps: usize,
    /// Step budget of the data-query sub-loop.
    pub data_agent_max_steps: usize,
    /// Capacity of a session's message window.
    pub conversation_window: usize,
    /// Number of recent session messages shown to the data agent.
    pub data_agent_window: usize,
    /// Live sessions kept in memory; the least recently used goes first.
    pub max_sessions: usize,
    /// Wall-clock limit for a whole chat turn.
    pub turn_timeout_ms: u64,
    /// Wall-clock limit for one data-agent run.
    pub data_agent_timeout_ms: u64,
    /// Wall-clock limit for a single tool handler.
    pub tool_timeout_ms: u64,
}

/// Chart-script sandbox limits.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock limit for one script run.
    pub timeout_ms: u64,
    /// Evaluation steps a script may consume.
    pub fuel: u64,
    /// Largest accepted script source.
    pub max_script_bytes: usize,
    /// Largest accepted serialized `vega_spec`.
    pub max_output_bytes: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/papers.db".to_string()),
            ),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request_defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", request_defaults.timeout_ms),
            max_retries: env_or("MAX_RETRIES", request_defaults.max_retries),
            retry_delay_ms: env_or("RETRY_DELAY_MS", request_defaults.retry_delay_ms),
        };

        let pipe_defaults = PipeConfig::default();
        let pipes = PipeConfig {
            orchestrator: env::var("PIPE_ORCHESTRATOR").unwrap_or(pipe_defaults.orchestrator),
            data_agent: env::var("PIPE_DATA_AGENT").unwrap_or(pipe_defaults.data_agent),
            visualization: env::var("PIPE_VIZ_AGENT").unwrap_or(pipe_defaults.visualization),
        };

        let agent_defaults = AgentConfig::default();
        let agents = AgentConfig {
            orchestrator_max_steps: env_or(
                "ORCHESTRATOR_MAX_STEPS",
                agent_defaults.orchestrator_max_steps,
            ),
            data_agent_max_steps: env_or("DATA_AGENT_MAX_STEPS", agent_defaults.data_agent_max_steps),
            conversation_window: env_or("CONVERSATION_WINDOW", agent_defaults.conversation_window),
            data_agent_window: env_or("DATA_AGENT_WINDOW", agent_defaults.data_agent_window),
            max_sessions: env_or("MAX_SESSIONS", agent_defaults.max_sessions).max(1),
            turn_timeout_ms: env_or("TURN_TIMEOUT_MS", agent_defaults.turn_timeout_ms),
            data_agent_timeout_ms: env_or(
                "DATA_AGENT_TIMEOUT_MS",
                agent_defaults.data_agent_timeout_ms,
            ),
            tool_timeout_ms: env_or("TOOL_TIMEOUT_MS", agent_defaults.tool_timeout_ms),
        };

        let sandbox_defaults = SandboxConfig::default();
        let sandbox = SandboxConfig {
            timeout_ms: env_or("SANDBOX_TIMEOUT_MS", sandbox_defaults.timeout_ms),
            fuel: env_or("SANDBOX_FUEL", sandbox_defaults.fuel),
            max_script_bytes: env_or("SANDBOX_MAX_SCRIPT_BYTES", sandbox_defaults.max_script_bytes),
            max_output_bytes: env_or("SANDBOX_MAX_OUTPUT_BYTES", sandbox_defaults.max_output_bytes),
        };

        Ok(Config {
            langbase,
            database,
            logging,
            request,
            pipes,
            agents,
            sandbox,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            orchestrator: "dataviz-orchestrator-v1".to_string(),
            data_agent: "dataviz-data-agent-v1".to_string(),
            visualization: "dataviz-chart-spec-v1".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            orchestrator_max_steps: 20,
            data_agent_max_steps: 15,
            conversation_window: 300,
            data_agent_window: 5,
            max_sessions: 1000,
            turn_timeout_ms: 120_000,
            data_agent_timeout_ms: 60_000,
            tool_timeout_ms: 30_000,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            fuel: 200_000,
            max_script_bytes: 16 * 1024,
            max_output_bytes: 2_000_000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/papers.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_defaults() {
        let agents = AgentConfig::default();
        assert_eq!(agents.orchestrator_max_steps, 20);
        assert_eq!(agents.data_agent_max_steps, 15);
        assert_eq!(agents.conversation_window, 300);
        assert_eq!(agents.data_agent_window, 5);
        assert_eq!(agents.max_sessions, 1000);
    }

    #[test]
    fn test_sandbox_defaults_are_bounded() {
        let sandbox = SandboxConfig::default();
        assert!(sandbox.timeout_ms > 0);
        assert!(sandbox.fuel > 0);
        assert!(sandbox.max_script_bytes < sandbox.max_output_bytes);
    }

    #[test]
    fn test_pipe_defaults() {
        let pipes = PipeConfig::default();
        assert_eq!(pipes.orchestrator, "dataviz-orchestrator-v1");
        assert_eq!(pipes.data_agent, "dataviz-data-agent-v1");
        assert_eq!(pipes.visualization, "dataviz-chart-spec-v1");
    }
}
