use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, Message, PipeRequest, PipeResponse};
use crate::config::{LangbaseConfig, PipeConfig, RequestConfig};
use crate::error::{LangbaseError, LangbaseResult};
use crate::prompts::{DATA_AGENT_PROMPT, ORCHESTRATOR_PROMPT, VISUALIZATION_PROMPT};

const PIPE_MODEL: &str = "openai:gpt-4o-mini";
const PIPE_TEMPERATURE: f64 = 0.1;
const PIPE_MAX_TOKENS: u32 = 4000;

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(config: &LangbaseConfig, request_config: RequestConfig) -> LangbaseResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LangbaseError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Call a Langbase pipe with the given request.
    ///
    /// Transient failures are retried with exponential backoff. Timeouts and
    /// client errors (4xx) are returned immediately.
    pub async fn call_pipe(&self, request: PipeRequest) -> LangbaseResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();

        let mut last_error = None;
        let mut attempt = 0;

        while attempt <= self.request_config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(attempt - 1)),
                );
                warn!(
                    pipe = %pipe_name,
                    retry = attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %pipe_name,
                        latency_ms = start.elapsed().as_millis(),
                        tokens = response.total_tokens(),
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %pipe_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = attempt,
                        "Langbase pipe call failed"
                    );
                    if !is_retryable(&e) {
                        return Err(e);
                    }
                    last_error = Some(e);
                    attempt += 1;
                }
            }
        }

        Err(LangbaseError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries: attempt,
        })
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> LangbaseResult<PipeResponse> {
        debug!(
            pipe = %request.name,
            messages = request.messages.len(),
            "Calling Langbase pipe"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LangbaseError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LangbaseError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<PipeResponse>()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create or upsert a pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> LangbaseResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating Langbase pipe");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(LangbaseError::Http)?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LangbaseError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<CreatePipeResponse>()
            .await
            .map_err(|e| LangbaseError::InvalidResponse {
                message: format!("Failed to parse create pipe response: {}", e),
            })
    }

    /// Ensure a JSON-mode pipe with the given system prompt exists.
    pub async fn ensure_pipe(
        &self,
        pipe_name: &str,
        description: &str,
        system_prompt: &str,
    ) -> LangbaseResult<()> {
        let request = CreatePipeRequest::new(pipe_name)
            .with_description(description)
            .with_model(PIPE_MODEL)
            .with_upsert(true)
            .with_json_output(true)
            .with_temperature(PIPE_TEMPERATURE)
            .with_max_tokens(PIPE_MAX_TOKENS)
            .with_messages(vec![Message::system(system_prompt)]);

        match self.create_pipe(request).await {
            Ok(created) => {
                info!(pipe = %created.name, url = %created.url, "Pipe ready");
                Ok(())
            }
            Err(LangbaseError::Api { status: 409, .. }) => {
                info!(pipe = %pipe_name, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Ensure the orchestrator, data-agent and visualization pipes exist.
    pub async fn ensure_agent_pipes(&self, pipes: &PipeConfig) -> LangbaseResult<()> {
        self.ensure_pipe(
            &pipes.orchestrator,
            "Routes chat turns between data queries and chart generation",
            ORCHESTRATOR_PROMPT,
        )
        .await?;
        self.ensure_pipe(
            &pipes.data_agent,
            "Answers data questions with the research-paper query catalogue",
            DATA_AGENT_PROMPT,
        )
        .await?;
        self.ensure_pipe(
            &pipes.visualization,
            "Writes Vega-Lite specs and chart scripts",
            VISUALIZATION_PROMPT,
        )
        .await
    }
}

fn is_retryable(err: &LangbaseError) -> bool {
    match err {
        LangbaseError::Timeout { .. } => false,
        LangbaseError::Api { status, .. } => *status >= 500 || *status == 429,
        LangbaseError::InvalidResponse { .. } => false,
        LangbaseError::Unavailable { .. } | LangbaseError::Http(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = LangbaseConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com/".to_string(),
        };

        let client = LangbaseClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://api.langbase.com");
    }

    #[test]
    fn test_timeouts_and_client_errors_are_not_retried() {
        assert!(!is_retryable(&LangbaseError::Timeout { timeout_ms: 10 }));
        assert!(!is_retryable(&LangbaseError::Api {
            status: 401,
            message: String::new(),
        }));
        assert!(is_retryable(&LangbaseError::Api {
            status: 503,
            message: String::new(),
        }));
        assert!(is_retryable(&LangbaseError::Api {
            status: 429,
            message: String::new(),
        }));
    }
}
