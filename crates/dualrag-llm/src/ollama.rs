//! Ollama - Local Ollama API provider
//!
//! Chat completions (with tool calling) go to `/api/chat`; embeddings go to
//! `/api/embed`. Both share one [`OllamaConfig`].

use crate::completion::{
    CompletionRequest, CompletionResponse, Message, TokenUsage, ToolCall, ToolChoice,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};
use crate::embeddings::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::provider::LlmProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Upper bound on an Ollama error passed through unchanged
const MAX_RAW_ERROR_LEN: usize = 120;

/// Rewrite a server error before it reaches logs or callers
///
/// Messages mentioning local paths are replaced outright. Known failure
/// shapes get an actionable hint. Anything else longer than
/// [`MAX_RAW_ERROR_LEN`] is dropped.
fn redact_api_error(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if mentions(&["/home/", "/root/", "/var/", "\\users\\"]) {
        return "Ollama reported an internal error".to_string();
    }
    if mentions(&["connection refused", "failed to connect"]) {
        return "Ollama is not reachable".to_string();
    }
    if lower.contains("model") && mentions(&["not found", "pull"]) {
        return "Model is not installed; run `ollama pull <model>`".to_string();
    }
    if raw.len() <= MAX_RAW_ERROR_LEN {
        raw.to_string()
    } else {
        format!("Ollama error ({} bytes, truncated)", raw.len())
    }
}

/// Default Ollama chat model
pub const DEFAULT_MODEL: &str = "granite3-dense:8b";

/// Default Ollama embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Default Ollama API URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OllamaTool {
    r#type: String,
    function: OllamaFunction,
}

#[derive(Debug, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    /// Usually an object; some models emit a JSON-encoded string instead
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: String,
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL (default: http://localhost:11434)
    pub base_url: String,
    /// Default chat model
    pub default_model: String,
    /// Embedding model
    pub embedding_model: String,
    /// Default max tokens
    pub default_max_tokens: u32,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            default_max_tokens: 512,
            timeout: Duration::from_secs(60),
        }
    }
}

impl OllamaConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .or_else(|_| std::env::var("OLLAMA_HOST"))
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let default_model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let embedding_model = std::env::var("OLLAMA_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        Self {
            base_url,
            default_model,
            embedding_model,
            ..Self::default()
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the embedding model
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set the default max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))
    }
}

fn map_send_error(e: &reqwest::Error, config: &OllamaConfig) -> Error {
    if e.is_connect() {
        Error::Network(format!(
            "Failed to connect to Ollama at {}. Is Ollama running?",
            config.base_url
        ))
    } else if e.is_timeout() {
        Error::Timeout(config.timeout.as_millis() as u64)
    } else {
        Error::Network(e.to_string())
    }
}

async fn post_json<Req: Serialize + ?Sized, Resp: serde::de::DeserializeOwned>(
    client: &Client,
    config: &OllamaConfig,
    path: &str,
    body: &Req,
) -> Result<Resp> {
    let url = format!("{}{}", config.base_url, path);

    let response = client
        .post(&url)
        .json(body)
        .send()
        .await
        .map_err(|e| map_send_error(&e, config))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    if status.as_u16() == 429 {
        return Err(Error::RateLimit);
    }

    if !status.is_success() {
        if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
            return Err(Error::Api(redact_api_error(&error.error)));
        }
        return Err(Error::Api(redact_api_error(&format!(
            "HTTP {}: {}",
            status, body
        ))));
    }

    serde_json::from_str(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
}

/// Ollama local chat provider
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    /// Ollama has no forced tool choice, so forcing is done by offering only
    /// the named tool.
    fn convert_tools(tools: &[ToolDefinition], choice: &ToolChoice) -> Vec<OllamaTool> {
        tools
            .iter()
            .filter(|tool| match choice {
                ToolChoice::Auto => true,
                ToolChoice::Tool(name) => &tool.name == name,
            })
            .map(|tool| OllamaTool {
                r#type: "function".to_string(),
                function: OllamaFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        tools: Option<Vec<OllamaTool>>,
    ) -> OllamaChatRequest {
        let model = if request.model.is_empty() {
            self.config.default_model.clone()
        } else {
            request.model.clone()
        };

        OllamaChatRequest {
            model,
            messages: Self::convert_messages(&request.messages),
            options: Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens.or(Some(self.config.default_max_tokens)),
            }),
            stream: false,
            tools,
        }
    }

    async fn send_request(&self, request: OllamaChatRequest) -> Result<OllamaChatResponse> {
        debug!("Sending request to Ollama: {}", request.model);
        post_json(&self.client, &self.config, "/api/chat", &request).await
    }

    fn usage(response: &OllamaChatResponse) -> Option<TokenUsage> {
        match (response.prompt_eval_count, response.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
            }),
            _ => None,
        }
    }

    fn convert_tool_calls(calls: Vec<OllamaToolCall>) -> Vec<ToolCall> {
        calls
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCall {
                id: format!("call_{}", i),
                name: tc.function.name,
                arguments: match tc.function.arguments {
                    serde_json::Value::String(raw) => raw,
                    other => other.to_string(),
                },
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let ollama_request = self.build_request(&request, None);
        let response = self.send_request(ollama_request).await?;
        let usage = Self::usage(&response);

        Ok(CompletionResponse {
            content: response.message.content,
            usage,
            model: response.model,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.request.model, tools = request.tools.len()))]
    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse> {
        let tools = Self::convert_tools(&request.tools, &request.tool_choice);
        if tools.is_empty() {
            warn!("No tools left after applying tool choice; sending plain chat request");
        }
        let tools = (!tools.is_empty()).then_some(tools);

        let ollama_request = self.build_request(&request.request, tools);
        let response = self.send_request(ollama_request).await?;
        let usage = Self::usage(&response);

        let tool_calls = response
            .message
            .tool_calls
            .map(Self::convert_tool_calls)
            .unwrap_or_default();

        let content = if response.message.content.is_empty() {
            None
        } else {
            Some(response.message.content)
        };

        Ok(ToolCompletionResponse {
            content,
            tool_calls,
            usage,
            model: response.model,
        })
    }
}

/// Ollama embedding provider
///
/// The vector size is fixed by the model and is learned from the first
/// successful response; [`dimensions`](EmbeddingProvider::dimensions) returns
/// 0 until then.
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaConfig,
    dimensions: std::sync::atomic::AtomicUsize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self {
            client,
            config,
            dimensions: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    /// Model used for embeddings
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.embedding_model
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| Error::InvalidResponse("empty embedding response".to_string()))
    }

    #[instrument(skip(self, texts), fields(model = %self.config.embedding_model, count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OllamaEmbedRequest {
            model: &self.config.embedding_model,
            input: texts,
        };
        let response: OllamaEmbedResponse =
            post_json(&self.client, &self.config, "/api/embed", &request).await?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        if let Some(first) = response.embeddings.first() {
            self.dimensions
                .store(first.len(), std::sync::atomic::Ordering::Relaxed);
        }
        debug!("Received {} embeddings from Ollama", response.embeddings.len());

        Ok(response.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = OllamaConfig::new()
            .with_model("mistral")
            .with_embedding_model("nomic-embed-text")
            .with_base_url("http://192.168.1.100:11434")
            .with_max_tokens(2048)
            .with_timeout(Duration::from_secs(120));

        assert_eq!(config.default_model, "mistral");
        assert_eq!(config.embedding_model, "nomic-embed-text");
        assert_eq!(config.base_url, "http://192.168.1.100:11434");
        assert_eq!(config.default_max_tokens, 2048);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_default_config() {
        let config = OllamaConfig::default();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_message_conversion() {
        let messages = vec![
            Message::system("You are a router"),
            Message::user("Hello"),
            Message::assistant("Hi there!"),
        ];

        let converted = OllamaProvider::convert_messages(&messages);

        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].role, "assistant");
    }

    #[test]
    fn test_forced_tool_choice_filters_tools() {
        let tools = vec![
            ToolDefinition::new("route_request", "route", serde_json::json!({})),
            ToolDefinition::new("other", "other", serde_json::json!({})),
        ];

        let auto = OllamaProvider::convert_tools(&tools, &ToolChoice::Auto);
        assert_eq!(auto.len(), 2);

        let forced =
            OllamaProvider::convert_tools(&tools, &ToolChoice::Tool("route_request".to_string()));
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].function.name, "route_request");
    }

    #[test]
    fn test_tool_call_arguments_accept_object_or_string() {
        let calls: Vec<OllamaToolCall> = serde_json::from_str(
            r#"[
                {"function": {"name": "route_request", "arguments": {"route": "chat"}}},
                {"function": {"name": "route_request", "arguments": "{\"route\": \"sql_rag\"}"}}
            ]"#,
        )
        .unwrap();

        let converted = OllamaProvider::convert_tool_calls(calls);
        assert_eq!(converted[0].id, "call_0");
        assert_eq!(converted[0].arguments, r#"{"route":"chat"}"#);
        assert_eq!(converted[1].arguments, r#"{"route": "sql_rag"}"#);
    }

    #[test]
    fn test_redact_api_error() {
        let redacted = redact_api_error("Error loading model from /home/user/.ollama/models");
        assert_eq!(redacted, "Ollama reported an internal error");

        assert_eq!(redact_api_error("dial tcp: connection refused"), "Ollama is not reachable");
        assert!(redact_api_error("model 'granite3-dense:8b' not found").contains("ollama pull"));
        assert_eq!(redact_api_error("bad request"), "bad request");

        let long = "x".repeat(MAX_RAW_ERROR_LEN + 1);
        assert!(redact_api_error(&long).contains("truncated"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let config = OllamaConfig::new()
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2));
        let embedder = OllamaEmbedder::new(config).unwrap();

        let result = embedder.embed("hello").await;
        assert!(matches!(
            result,
            Err(Error::Network(_)) | Err(Error::Timeout(_))
        ));
        assert_eq!(embedder.dimensions(), 0);
    }
}
