//! Mock LLM Provider for testing
//!
//! Returns scripted responses in order. Each script step can be a response,
//! an error, or a hang (a call that never completes, for timeout tests).

use crate::completion::{
    CompletionRequest, CompletionResponse, ToolCompletionRequest, ToolCompletionResponse,
};
use crate::error::{Error, Result};
use crate::provider::LlmProvider;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum Step {
    Respond(ToolCompletionResponse),
    Fail(Error),
    Hang,
}

/// What the mock does once the script is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WhenEmpty {
    Text,
    Hang,
}

/// A mock LLM provider that replays a queue of scripted steps.
pub struct MockProvider {
    steps: Mutex<VecDeque<Step>>,
    when_empty: WhenEmpty,
    calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create a new mock provider; answers "mock response" once the script runs out.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            when_empty: WhenEmpty::Text,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock whose every unscripted call hangs forever.
    #[must_use]
    pub fn always_hang() -> Self {
        Self {
            when_empty: WhenEmpty::Hang,
            ..Self::new()
        }
    }

    fn push(&self, step: Step) {
        self.steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
    }

    /// Queue a tool-calling response.
    pub fn add_tool_response(&self, response: ToolCompletionResponse) {
        self.push(Step::Respond(response));
    }

    /// Queue an error.
    pub fn add_error(&self, error: Error) {
        self.push(Step::Fail(error));
    }

    /// Queue a call that never completes.
    pub fn add_hang(&self) {
        self.push(Step::Hang);
    }

    /// Number of completion calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next_step(&self) -> Result<ToolCompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        let step = match step {
            Some(step) => step,
            None if self.when_empty == WhenEmpty::Hang => Step::Hang,
            None => Step::Respond(ToolCompletionResponse::from_text("mock response")),
        };

        match step {
            Step::Respond(mut response) => {
                if response.model.is_empty() {
                    response.model = "mock-model".to_string();
                }
                Ok(response)
            }
            Step::Fail(error) => Err(error),
            Step::Hang => loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.next_step().await?;
        Ok(CompletionResponse {
            content: response.content.unwrap_or_default(),
            usage: response.usage,
            model: response.model,
        })
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse> {
        self.next_step().await
    }
}
