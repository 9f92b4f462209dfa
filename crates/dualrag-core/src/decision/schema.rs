//! Routing decision data model
//!
//! The wire names of every enum are `snake_case` and are the same strings the
//! validator accepts and the routing tool schema advertises.

use chrono::{DateTime, Utc};
use dualrag_llm::ToolDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the function-calling tool the primary source must invoke
pub const ROUTING_TOOL_NAME: &str = "route_request";

/// Downstream handler family a request is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Direct conversational answer
    Chat,
    /// Document retrieval
    StaticRag,
    /// Database query
    SqlRag,
    /// Report generation
    Report,
    /// Conversational follow-up on a previous turn
    Followup,
    /// No route resolved
    None,
}

impl Route {
    /// Routes that have a handler downstream (everything but `none`)
    pub const DECLARED: [Route; 5] = [
        Route::Chat,
        Route::StaticRag,
        Route::SqlRag,
        Route::Report,
        Route::Followup,
    ];

    /// Default tie-break order, highest priority first
    pub const DEFAULT_PRIORITY: [Route; 5] = [
        Route::SqlRag,
        Route::StaticRag,
        Route::Report,
        Route::Chat,
        Route::Followup,
    ];

    /// Wire representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::StaticRag => "static_rag",
            Self::SqlRag => "sql_rag",
            Self::Report => "report",
            Self::Followup => "followup",
            Self::None => "none",
        }
    }

    /// Exact wire-name lookup
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "chat" => Some(Self::Chat),
            "static_rag" => Some(Self::StaticRag),
            "sql_rag" => Some(Self::SqlRag),
            "report" => Some(Self::Report),
            "followup" => Some(Self::Followup),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Whether the route has a downstream handler
    #[must_use]
    pub fn is_declared(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the downstream handler should shape its answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Answer directly
    #[default]
    Direct,
    /// Retrieve first, then answer
    SearchThenAnswer,
    /// Ask the user a clarifying question
    Clarify,
    /// Render a report
    Report,
}

impl ResponseMode {
    /// Wire representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SearchThenAnswer => "search_then_answer",
            Self::Clarify => "clarify",
            Self::Report => "report",
        }
    }

    /// Exact wire-name lookup
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "direct" => Some(Self::Direct),
            "search_then_answer" => Some(Self::SearchThenAnswer),
            "clarify" => Some(Self::Clarify),
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

/// How long context of this turn must be kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRequirement {
    /// Nothing to keep
    #[default]
    None,
    /// Keep for the session TTL
    Session,
    /// Keep without expiry
    Persistent,
}

impl MemoryRequirement {
    /// Wire representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Session => "session",
            Self::Persistent => "persistent",
        }
    }

    /// Exact wire-name lookup
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "session" => Some(Self::Session),
            "persistent" => Some(Self::Persistent),
            _ => None,
        }
    }
}

/// Which stage produced the accepted decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageUsed {
    /// Stage 1, the primary decision source
    Primary,
    /// Stage 2, embedding similarity
    SemanticFallback,
    /// Stage 3, fixed default
    StaticFallback,
}

impl fmt::Display for StageUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::SemanticFallback => "semantic_fallback",
            Self::StaticFallback => "static_fallback",
        })
    }
}

/// A single routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Primary action
    pub route: Route,
    /// Document retrieval is needed
    pub needs_static_rag: bool,
    /// Database query is needed
    pub needs_sql_rag: bool,
    /// Report rendering is needed
    pub needs_report: bool,
    /// Retrieval query, required when `needs_static_rag`
    #[serde(default)]
    pub static_rag_query: Option<String>,
    /// Query intent, required when `needs_sql_rag`
    #[serde(default)]
    pub sql_intent: Option<String>,
    /// Answer shape
    pub response_mode: ResponseMode,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Free-text explanation, audit only
    #[serde(default)]
    pub reasoning: String,
    /// Retention of this turn's context
    #[serde(default)]
    pub memory_requirement: MemoryRequirement,
    /// The conversation expects a follow-up turn
    #[serde(default)]
    pub follow_up_needed: bool,
    /// Opaque context keys to keep for the follow-up
    #[serde(default)]
    pub context_to_preserve: Vec<String>,
}

impl RoutingDecision {
    /// A decision for `route` with every optional field at its default
    #[must_use]
    pub fn new(route: Route, confidence: f64) -> Self {
        Self {
            route,
            needs_static_rag: false,
            needs_sql_rag: false,
            needs_report: false,
            static_rag_query: None,
            sql_intent: None,
            response_mode: ResponseMode::Direct,
            confidence,
            reasoning: String::new(),
            memory_requirement: MemoryRequirement::None,
            follow_up_needed: false,
            context_to_preserve: Vec::new(),
        }
    }

    /// Whether any need-flag is set
    #[must_use]
    pub fn has_need_flag(&self) -> bool {
        self.needs_static_rag || self.needs_sql_rag || self.needs_report
    }
}

/// Final routing outcome handed to downstream handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Validated decision
    pub decision: RoutingDecision,
    /// Stage that produced it
    pub stage_used: StageUsed,
    /// When the plan was produced
    pub timestamp: DateTime<Utc>,
    /// Session the request belongs to
    pub session_id: String,
}

/// Tool definition describing [`RoutingDecision`] as a JSON schema
#[must_use]
pub fn routing_tool() -> ToolDefinition {
    ToolDefinition::new(
        ROUTING_TOOL_NAME,
        "Decide which handler should serve the user's request",
        serde_json::json!({
            "type": "object",
            "properties": {
                "route": {
                    "type": "string",
                    "enum": ["chat", "static_rag", "sql_rag", "report", "followup", "none"],
                    "description": "Primary handler for the request"
                },
                "needs_static_rag": {
                    "type": "boolean",
                    "description": "Document retrieval is needed"
                },
                "needs_sql_rag": {
                    "type": "boolean",
                    "description": "A database query is needed"
                },
                "needs_report": {
                    "type": "boolean",
                    "description": "A report must be rendered"
                },
                "static_rag_query": {
                    "type": "string",
                    "description": "Search query for document retrieval (required if needs_static_rag)"
                },
                "sql_intent": {
                    "type": "string",
                    "description": "What the database query should answer (required if needs_sql_rag)"
                },
                "response_mode": {
                    "type": "string",
                    "enum": ["direct", "search_then_answer", "clarify", "report"]
                },
                "confidence": {
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0
                },
                "reasoning": {
                    "type": "string",
                    "description": "One-sentence justification"
                },
                "memory_requirement": {
                    "type": "string",
                    "enum": ["none", "session", "persistent"]
                },
                "follow_up_needed": {
                    "type": "boolean"
                },
                "context_to_preserve": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "required": [
                "route",
                "needs_static_rag",
                "needs_sql_rag",
                "needs_report",
                "response_mode",
                "confidence"
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_names_round_trip_through_serde() {
        for route in Route::DECLARED.iter().chain(std::iter::once(&Route::None)) {
            let json = serde_json::to_string(route).unwrap();
            assert_eq!(json, format!("\"{}\"", route.as_str()));
            assert_eq!(Route::from_name(route.as_str()), Some(*route));
        }
        assert_eq!(Route::from_name("SQL_RAG"), None);
    }

    #[test]
    fn test_priority_is_a_permutation_of_declared() {
        let mut priority = Route::DEFAULT_PRIORITY.to_vec();
        let mut declared = Route::DECLARED.to_vec();
        priority.sort();
        declared.sort();
        assert_eq!(priority, declared);
    }

    #[test]
    fn test_decision_deserializes_with_optional_defaults() {
        let decision: RoutingDecision = serde_json::from_value(serde_json::json!({
            "route": "chat",
            "needs_static_rag": false,
            "needs_sql_rag": false,
            "needs_report": false,
            "response_mode": "direct",
            "confidence": 0.8
        }))
        .unwrap();

        assert_eq!(decision, RoutingDecision::new(Route::Chat, 0.8));
        assert!(!decision.has_need_flag());
    }

    #[test]
    fn test_routing_tool_schema_lists_required_fields() {
        let tool = routing_tool();
        assert_eq!(tool.name, ROUTING_TOOL_NAME);
        let required = tool.parameters["required"].as_array().unwrap();
        assert_eq!(required.len(), 6);
        assert!(required.iter().any(|f| f == "confidence"));
    }
}
