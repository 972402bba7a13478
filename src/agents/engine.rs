use async_trait::async_trait;

use crate::error::LangbaseResult;
use crate::langbase::{LangbaseClient, Message, PipeRequest};

/// Prompt in, completion text out.
///
/// The loops only ever see this trait, so the LLM provider can be swapped
/// or scripted in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Run `pipe` over `messages` and return the completion text.
    async fn complete(&self, pipe: &str, messages: Vec<Message>) -> LangbaseResult<String>;
}

#[async_trait]
impl ReasoningEngine for LangbaseClient {
    async fn complete(&self, pipe: &str, messages: Vec<Message>) -> LangbaseResult<String> {
        let response = self.call_pipe(PipeRequest::new(pipe, messages)).await?;
        Ok(response.completion)
    }
}
