use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::ChartKind;
use crate::viz::ChartSpec;

/// What kind of answer a turn produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Categorical data.
    Bar,
    /// Year series.
    Line,
    /// Distribution.
    Histogram,
    /// Restyled the previous chart.
    Refinement,
    /// Asked the user a question.
    Clarification,
    /// No data was involved.
    Conversation,
}

impl From<ChartKind> for QueryType {
    fn from(kind: ChartKind) -> Self {
        match kind {
            ChartKind::Bar => QueryType::Bar,
            ChartKind::Line => QueryType::Line,
            ChartKind::Histogram => QueryType::Histogram,
        }
    }
}

/// Reply to one chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Whether the turn succeeded.
    pub success: bool,
    /// Narrative answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Chart to render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_spec: Option<ChartSpec>,
    /// Statistics of the data behind the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Map<String, Value>>,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Kind of answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
}

impl ChatResponse {
    /// A successful answer.
    pub fn answer(message: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            query_type: Some(query_type),
            ..Default::default()
        }
    }

    /// A question for the user.
    pub fn clarification(question: impl Into<String>) -> Self {
        Self::answer(question, QueryType::Clarification)
    }

    /// A failed turn.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach a chart.
    pub fn with_chart(mut self, spec: Option<ChartSpec>) -> Self {
        self.chart_spec = spec;
        self
    }

    /// Attach statistics.
    pub fn with_stats(mut self, stats: Option<Map<String, Value>>) -> Self {
        self.stats = stats.filter(|s| !s.is_empty());
        self
    }
}
