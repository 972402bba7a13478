use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{Observation, ToolArguments, ToolSchema};
use crate::error::{RegistryError, ToolError};

/// A callable bound to a tool name.
///
/// `C` is the per-call context the handler may record results into.
#[async_trait]
pub trait ToolHandler<C>: Send + Sync {
    /// Run the tool with validated arguments.
    async fn call(&self, ctx: &mut C, args: ToolArguments) -> Result<Observation, ToolError>;
}

/// A named, schema-validated tool.
pub struct ToolDescriptor<C> {
    /// Unique tool name.
    pub name: String,
    /// Shown to the reasoning engine and MCP clients.
    pub description: String,
    /// Parameter schema.
    pub schema: ToolSchema,
    /// Bound handler.
    pub handler: Arc<dyn ToolHandler<C>>,
}

impl<C> ToolDescriptor<C> {
    /// Create a descriptor.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ToolSchema,
        handler: Arc<dyn ToolHandler<C>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }
}

/// Static catalogue of tools, built once and read-only afterwards.
pub struct ToolRegistry<C> {
    tools: Vec<ToolDescriptor<C>>,
    index: HashMap<String, usize>,
    timeout: Duration,
}

impl<C: Send> ToolRegistry<C> {
    /// Empty registry whose handlers each run under `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            timeout,
        }
    }

    /// Add a descriptor. Fails if the name is taken or malformed.
    pub fn register(&mut self, descriptor: ToolDescriptor<C>) -> Result<(), RegistryError> {
        let name = descriptor.name.clone();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(RegistryError::InvalidDescriptor {
                tool_name: name,
                reason: "name must be non-empty snake_case".to_string(),
            });
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool { tool_name: name });
        }

        debug!(tool = %name, "Registering tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Whether a tool is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Every tool as `{name, description, inputSchema}`.
    pub fn catalogue(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.schema.to_json_schema()
                })
            })
            .collect()
    }

    /// Parse, validate and run a tool call.
    ///
    /// Never fails: unknown names, invalid arguments, handler errors and
    /// timeouts all come back as a failed [`Observation`].
    pub async fn dispatch(&self, ctx: &mut C, name: &str, raw_arguments: &str) -> Observation {
        let start = Instant::now();

        let Some(descriptor) = self.index.get(name).map(|&i| &self.tools[i]) else {
            warn!(tool = %name, "Unknown tool requested");
            return ToolError::UnknownTool {
                tool_name: name.to_string(),
                available: self.names().join(", "),
            }
            .into();
        };

        let args = match descriptor.schema.validate(raw_arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool arguments rejected");
                return e.into();
            }
        };

        let result =
            match tokio::time::timeout(self.timeout, descriptor.handler.call(ctx, args)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout {
                    operation: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

        let latency_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(observation) => {
                info!(
                    tool = %name,
                    latency_ms,
                    success = observation.success,
                    "Tool call completed"
                );
                observation
            }
            Err(e) => {
                warn!(tool = %name, latency_ms, error = %e, "Tool call failed");
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{check_not_blank, ErrorKind, ToolParams};
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct EchoParams {
        /// Text
        text: String,
    }

    impl ToolParams for EchoParams {
        fn validate(&self) -> Result<(), ToolError> {
            check_not_blank("text", &self.text)
        }
    }

    struct Echo;

    #[async_trait]
    impl ToolHandler<Vec<String>> for Echo {
        async fn call(
            &self,
            ctx: &mut Vec<String>,
            args: ToolArguments,
        ) -> Result<Observation, ToolError> {
            let params: EchoParams = args.into_params()?;
            ctx.push(params.text.clone());
            Ok(Observation::ok(json!(params.text)))
        }
    }

    struct Slow;

    #[async_trait]
    impl ToolHandler<Vec<String>> for Slow {
        async fn call(&self, _: &mut Vec<String>, _: ToolArguments) -> Result<Observation, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Observation::ok(json!(null)))
        }
    }

    fn registry(timeout: Duration) -> ToolRegistry<Vec<String>> {
        let mut registry = ToolRegistry::new(timeout);
        registry
            .register(ToolDescriptor::new(
                "echo",
                "Echo text",
                ToolSchema::of::<EchoParams>(),
                Arc::new(Echo),
            ))
            .unwrap();
        registry
            .register(ToolDescriptor::new("slow", "Sleeps", ToolSchema::empty(), Arc::new(Slow)))
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = registry(Duration::from_secs(1));
        let err = registry
            .register(ToolDescriptor::new("echo", "again", ToolSchema::empty(), Arc::new(Echo)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTool { .. }));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_malformed_name_rejected() {
        let mut registry: ToolRegistry<Vec<String>> = ToolRegistry::new(Duration::from_secs(1));
        let err = registry
            .register(ToolDescriptor::new("Drop Table", "", ToolSchema::empty(), Arc::new(Echo)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDescriptor { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_catalogue_shape() {
        let catalogue = registry(Duration::from_secs(1)).catalogue();
        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue[0]["name"], "echo");
        assert_eq!(catalogue[0]["inputSchema"]["required"], json!(["text"]));
        assert_eq!(catalogue[0]["inputSchema"]["properties"]["text"]["type"], "string");
        assert_eq!(catalogue[1]["inputSchema"]["additionalProperties"], json!(false));
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let registry = registry(Duration::from_secs(1));
        let mut ctx = Vec::new();
        let obs = registry.dispatch(&mut ctx, "echo", r#"{"text": "hi"}"#).await;

        assert!(obs.success);
        assert_eq!(obs.data, Some(json!("hi")));
        assert_eq!(ctx, vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_handler() {
        let registry = registry(Duration::from_secs(1));
        let mut ctx = Vec::new();

        for raw in [r#"{"text": 5}"#, r#"{"text": "  "}"#, r#"{"text": "a", "loud": true}"#] {
            let obs = registry.dispatch(&mut ctx, "echo", raw).await;
            assert!(!obs.success, "{}", raw);
            assert_eq!(obs.error_kind, Some(ErrorKind::Validation));
        }
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_names() {
        let registry = registry(Duration::from_secs(1));
        let obs = registry.dispatch(&mut Vec::new(), "drop", "{}").await;

        assert_eq!(obs.error_kind, Some(ErrorKind::UnknownTool));
        assert!(obs.error.unwrap().contains("echo, slow"));
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let registry = registry(Duration::from_millis(20));
        let obs = registry.dispatch(&mut Vec::new(), "slow", "").await;

        assert!(obs.is_timeout());
        assert_eq!(obs.error.as_deref(), Some("slow timed out after 20ms"));
    }
}
