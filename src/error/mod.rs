use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Tool registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Import failed for {file}: {message}")]
    Import { file: String, message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while dispatching a tool call.
///
/// These never escape [`crate::tools::ToolRegistry::dispatch`]; they are folded
/// into a failed [`crate::tools::Observation`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Unknown tool '{tool_name}'. Available tools: {available}")]
    UnknownTool { tool_name: String, available: String },

    #[error("Execution failed: {message}")]
    Execution { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

/// Errors raised while building the static tool catalogue.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool '{tool_name}' already exists")]
    DuplicateTool { tool_name: String },

    #[error("Invalid descriptor for '{tool_name}': {reason}")]
    InvalidDescriptor { tool_name: String, reason: String },
}

/// A visualization strategy that could not produce a valid chart.
#[derive(Debug, Clone, Error)]
#[error("{strategy} strategy failed: {reason}")]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

/// Chart-script sandbox errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SandboxError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("'{name}' is not an allowed helper")]
    UnknownHelper { name: String },

    #[error("Unbound variable '{name}'")]
    UnboundVariable { name: String },

    #[error("Type error in {context}: {message}")]
    Type { context: String, message: String },

    #[error("Script exhausted its fuel budget of {limit} steps")]
    FuelExhausted { limit: u64 },

    #[error("Script was cancelled after {timeout_ms}ms")]
    Cancelled { timeout_ms: u64 },

    #[error("{what} is too large: {size} bytes exceeds {limit}")]
    TooLarge {
        what: String,
        size: usize,
        limit: usize,
    },

    #[error("'{variable}' is nested deeper than {limit} levels")]
    TooDeep { variable: String, limit: usize },

    #[error("Script did not bind '{variable}'")]
    MissingOutput { variable: String },

    #[error("Script output is not a valid chart: {reason}")]
    InvalidOutput { reason: String },
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for ToolError {
    fn from(err: StorageError) -> Self {
        ToolError::Execution {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::Execution {
            message: format!("Could not encode result: {}", err),
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Result type alias for chart-script evaluation
pub type SandboxResult<T> = Result<T, SandboxError>;
