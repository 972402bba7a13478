//! Per-session conversation state.
//!
//! A bounded message window plus the sticky "last chart" pair. The pair is
//! stored apart from the window, so evicting old messages never loses it.

mod store;

pub use store::{SessionHandle, SessionStore};

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::QueryResult;
use crate::viz::ChartSpec;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person chatting.
    User,
    /// The assistant's replies.
    System,
}

/// One immutable conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Message text.
    pub text: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// New message stamped now.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// State of one chat session.
#[derive(Debug, Clone)]
pub struct ConversationState {
    window: VecDeque<Message>,
    capacity: usize,
    last_chart_spec: Option<ChartSpec>,
    last_query_result: Option<QueryResult>,
}

impl ConversationState {
    /// Empty state keeping at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            last_chart_spec: None,
            last_query_result: None,
        }
    }

    /// Append a message, evicting the oldest when full.
    pub fn push(&mut self, message: Message) {
        while self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(message);
    }

    /// Append a user message.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Message::new(Role::User, text));
    }

    /// Append a system message.
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.push(Message::new(Role::System, text));
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.window.iter()
    }

    /// The most recent `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Message> {
        self.window.iter().skip(self.window.len().saturating_sub(n))
    }

    /// Messages currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Window capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Last successfully generated chart.
    pub fn last_chart_spec(&self) -> Option<&ChartSpec> {
        self.last_chart_spec.as_ref()
    }

    /// Data behind the last chart, or the last successful query.
    pub fn last_query_result(&self) -> Option<&QueryResult> {
        self.last_query_result.as_ref()
    }

    /// Whether a chart and its data are both available for refinement.
    pub fn can_refine(&self) -> bool {
        self.last_chart_spec.is_some() && self.last_query_result.is_some()
    }

    /// Replace the chart and its data together.
    pub fn commit_visualization(&mut self, spec: ChartSpec, result: QueryResult) {
        self.last_chart_spec = Some(spec);
        self.last_query_result = Some(result);
    }

    /// Drop the chart and its data together.
    pub fn clear_chart(&mut self) {
        self.last_chart_spec = None;
        self.last_query_result = None;
    }
}
