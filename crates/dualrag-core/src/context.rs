//! Conversation context consumed by the router
//!
//! The router never writes conversation history. It reads a
//! [`ConversationContext`] (from the request or from memory) to enrich the
//! Stage-1 prompt, and writes a [`FollowUpRecord`] when an accepted decision
//! asks for context to be preserved.

use crate::decision::Route;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory namespace holding the conversation context
pub const CONVERSATION_NAMESPACE: &str = "conversation";
/// Key of the context within [`CONVERSATION_NAMESPACE`]
pub const CONTEXT_KEY: &str = "context";
/// Memory namespace holding pending follow-up records
pub const FOLLOWUP_NAMESPACE: &str = "followup";

/// Maximum number of turns kept in a context
pub const MAX_HISTORY: usize = 10;

/// One prior exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// User query
    pub query: String,
    /// Assistant response
    pub response: String,
    /// When the turn happened
    pub timestamp: DateTime<Utc>,
    /// Route the turn was served by, if known
    #[serde(default)]
    pub route: Option<Route>,
}

impl ConversationTurn {
    /// Create a turn stamped now
    #[must_use]
    pub fn new(query: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            timestamp: Utc::now(),
            route: None,
        }
    }

    /// Set the route
    #[must_use]
    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }
}

/// Conversation state carried across turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Most recent user query
    #[serde(default)]
    pub last_query: Option<String>,
    /// Prior turns, oldest first
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Total turns seen, including ones dropped from `history`
    #[serde(default)]
    pub turn_count: usize,
}

impl ConversationContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, keeping at most [`MAX_HISTORY`]
    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.last_query = Some(turn.query.clone());
        self.history.push(turn);
        self.turn_count += 1;
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    /// Builder form of [`push_turn`](Self::push_turn)
    #[must_use]
    pub fn with_turn(mut self, turn: ConversationTurn) -> Self {
        self.push_turn(turn);
        self
    }

    /// The last `n` turns, oldest first
    #[must_use]
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Whether there is nothing to summarize
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.last_query.is_none()
    }

    /// Plain-text summary of the last `max_turns` turns for a prompt
    #[must_use]
    pub fn summary(&self, max_turns: usize) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Turns so far: {}", self.turn_count));
        if let Some(last) = &self.last_query {
            lines.push(format!("Last query: {}", last));
        }
        for turn in self.recent(max_turns) {
            let route = turn.route.map(|r| r.as_str()).unwrap_or("unknown");
            lines.push(format!(
                "- [{}] user: {} | assistant: {}",
                route,
                truncate(&turn.query, 200),
                truncate(&turn.response, 200)
            ));
        }
        lines.join("\n")
    }
}

/// Context saved for a pending follow-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpRecord {
    /// Route of the decision that requested the follow-up
    pub route: Route,
    /// Context keys to keep
    pub context_to_preserve: Vec<String>,
    /// Query that produced the decision
    pub query: String,
    /// When the record was written
    pub saved_at: DateTime<Utc>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_capped() {
        let mut ctx = ConversationContext::new();
        for i in 0..(MAX_HISTORY + 3) {
            ctx.push_turn(ConversationTurn::new(format!("q{i}"), format!("a{i}")));
        }
        assert_eq!(ctx.history.len(), MAX_HISTORY);
        assert_eq!(ctx.turn_count, MAX_HISTORY + 3);
        assert_eq!(ctx.history[0].query, "q3");
        assert_eq!(ctx.last_query.as_deref(), Some("q12"));
    }

    #[test]
    fn test_recent_and_summary() {
        let ctx = ConversationContext::new()
            .with_turn(ConversationTurn::new("revenue for march", "42k").with_route(Route::SqlRag))
            .with_turn(ConversationTurn::new("and april?", "51k"));

        assert_eq!(ctx.recent(1).len(), 1);
        assert_eq!(ctx.recent(5).len(), 2);

        let summary = ctx.summary(1);
        assert!(summary.contains("Turns so far: 2"));
        assert!(summary.contains("Last query: and april?"));
        assert!(summary.contains("[unknown] user: and april?"));
        assert!(!summary.contains("revenue for march | "));
    }

    #[test]
    fn test_context_deserializes_with_missing_fields() {
        let ctx: ConversationContext = serde_json::from_str("{}").unwrap();
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé...");
    }
}
