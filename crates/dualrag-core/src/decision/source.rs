//! Primary decision sources
//!
//! A [`DecisionSource`] is an unreliable oracle: it returns either a raw
//! payload or one of a closed set of failures. Wrong answers are not errors;
//! they are caught later by the parser and validator.

use super::schema::{routing_tool, ROUTING_TOOL_NAME};
use crate::context::ConversationContext;
use async_trait::async_trait;
use dualrag_llm::{
    CompletionRequest, LlmProvider, Message, ToolChoice, ToolCompletionRequest,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// System prompt for the primary router
pub const ROUTING_PROMPT: &str = r#"You are the routing layer of a question-answering assistant.
Decide which single handler must serve the user's request and call the `route_request` tool.

Routes:
- chat: greetings, small talk, general knowledge answerable directly
- static_rag: questions answered from the document library (manuals, policies, reports on file)
- sql_rag: questions about figures, metrics or records stored in the database
- report: requests to produce a formatted report, summary table or export
- followup: the message only makes sense as a continuation of the previous turn
- none: you cannot tell

Rules:
- needs_static_rag, needs_sql_rag and needs_report may be combined for composite requests
- when needs_static_rag is true, static_rag_query must be a standalone search query
- when needs_sql_rag is true, sql_intent must describe what the query must answer
- route none never sets a need flag
- confidence is your certainty in [0, 1]; do not inflate it
- set follow_up_needed and context_to_preserve when the next turn will depend on this one"#;

/// Raw output of a decision source
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionPayload {
    /// Already-structured output (function-calling arguments)
    Structured(serde_json::Value),
    /// Free text that may contain JSON somewhere
    Text(String),
}

/// Closed set of decision-source failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The call did not complete in time
    #[error("decision source timed out after {0}ms")]
    Timeout(u64),

    /// Transport failure
    #[error("decision source network error: {0}")]
    Network(String),

    /// The source answered with something unusable; carries the raw body
    #[error("decision source returned a malformed payload")]
    Malformed(String),

    /// The source refused or is not configured
    #[error("decision source unavailable: {0}")]
    Unavailable(String),

    /// The source answered with nothing at all
    #[error("decision source returned an empty response")]
    Empty,
}

impl SourceError {
    /// Whether a retry may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }
}

impl From<dualrag_llm::Error> for SourceError {
    fn from(e: dualrag_llm::Error) -> Self {
        use dualrag_llm::Error as LlmError;
        match e {
            LlmError::Timeout(ms) => Self::Timeout(ms),
            LlmError::Network(msg) => Self::Network(msg),
            LlmError::RateLimit => Self::Network("rate limit exceeded".to_string()),
            LlmError::InvalidResponse(body) => Self::Malformed(body),
            LlmError::NotConfigured(msg) | LlmError::Api(msg) | LlmError::Provider(msg) => {
                Self::Unavailable(msg)
            }
        }
    }
}

/// Input to a decision source
#[derive(Debug, Clone, Default)]
pub struct DecisionRequest {
    /// User query
    pub query: String,
    /// Session identifier
    pub session_id: String,
    /// Conversation so far
    pub context: Option<ConversationContext>,
    /// Context keys preserved by earlier turns awaiting a follow-up
    pub pending_context: Vec<String>,
}

impl DecisionRequest {
    /// Create a request with no context
    #[must_use]
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// An unreliable producer of routing decisions
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &str;

    /// Produce a raw decision payload
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionPayload, SourceError>;
}

/// Decision source backed by an [`LlmProvider`] with function calling
pub struct LlmDecisionSource {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_turns: usize,
}

impl LlmDecisionSource {
    /// Create a source using the provider's default model
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: String::new(),
            temperature: 0.0,
            max_tokens: 512,
            max_turns: 5,
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the number of history turns included in the prompt
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    fn build_request(&self, request: &DecisionRequest) -> ToolCompletionRequest {
        let mut completion = CompletionRequest::new(self.model.clone())
            .with_message(Message::system(ROUTING_PROMPT))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        if let Some(context) = request.context.as_ref().filter(|c| !c.is_empty()) {
            completion = completion.with_message(Message::system(format!(
                "Conversation context:\n{}",
                context.summary(self.max_turns)
            )));
        }

        if !request.pending_context.is_empty() {
            completion = completion.with_message(Message::system(format!(
                "Context preserved for a follow-up: {}",
                request.pending_context.join(", ")
            )));
        }

        completion = completion.with_message(Message::user(request.query.clone()));

        ToolCompletionRequest::new(completion, vec![routing_tool()])
            .with_tool_choice(ToolChoice::Tool(ROUTING_TOOL_NAME.to_string()))
    }
}

#[async_trait]
impl DecisionSource for LlmDecisionSource {
    fn name(&self) -> &str {
        self.provider.name()
    }

    #[instrument(skip(self, request), fields(provider = %self.provider.name()))]
    async fn decide(&self, request: &DecisionRequest) -> Result<DecisionPayload, SourceError> {
        let response = self
            .provider
            .complete_with_tools(self.build_request(request))
            .await?;

        if let Some(call) = response.tool_call(ROUTING_TOOL_NAME) {
            debug!(model = %response.model, "Routing tool called");
            return Ok(match serde_json::from_str(&call.arguments) {
                Ok(value) => DecisionPayload::Structured(value),
                Err(_) => DecisionPayload::Text(call.arguments.clone()),
            });
        }

        match response.content {
            Some(text) if !text.trim().is_empty() => {
                debug!(model = %response.model, "Routing answered in plain text");
                Ok(DecisionPayload::Text(text))
            }
            _ => Err(SourceError::Empty),
        }
    }
}
