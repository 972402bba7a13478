//! Reasoning-engine adapter, the shared tool-calling loop and the data-query agent.

mod catalogue;
mod data;
mod engine;
mod params;
mod react;

pub use catalogue::{data_tool_registry, DataContext, DATA_TOOL_NAMES};
pub use data::{DataQueryAgent, DataReport};
pub use engine::ReasoningEngine;
#[cfg(test)]
pub use engine::MockReasoningEngine;
pub use react::{
    AgentAction, AgentDecision, AgentStep, LoopExit, LoopOutcome, ReasoningLoop, TurnPhase,
};

/// Extract a JSON document from a model completion.
///
/// Accepts raw JSON, a ```json fenced block or a plain ``` fenced block.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw_object() {
        let result = extract_json_from_completion(r#"{"key": "value"}"#);
        assert_eq!(result.unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_with_whitespace() {
        let result = extract_json_from_completion("  \n  {\"key\": \"value\"}  \n  ");
        assert_eq!(result.unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_from_json_code_block() {
        let input = "Here is my decision:\n```json\n{\"thought\": \"done\"}\n```\n";
        let result = extract_json_from_completion(input);
        assert_eq!(result.unwrap(), r#"{"thought": "done"}"#);
    }

    #[test]
    fn test_extract_json_from_plain_code_block() {
        let input = "```\n{\"data\": 123}\n```";
        assert_eq!(extract_json_from_completion(input).unwrap(), r#"{"data": 123}"#);
    }

    #[test]
    fn test_extract_json_empty_block() {
        let result = extract_json_from_completion("```json\n\n```");
        assert!(result.unwrap_err().contains("empty or malformed"));
    }

    #[test]
    fn test_extract_json_no_json_found() {
        let input = "a".repeat(200);
        let err = extract_json_from_completion(&input).unwrap_err();
        assert!(err.contains("No JSON found"));
        assert!(err.len() < 200);
    }
}
