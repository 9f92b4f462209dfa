//! DualRAG LLM - Provider Abstraction
//!
//! This crate provides the generative and embedding backends consumed by the
//! routing engine in `dualrag-core`:
//! - Provider: the `LlmProvider` trait (text and tool-calling completions)
//! - Ollama: local Ollama chat + embedding API
//! - Embeddings: `EmbeddingProvider` trait and a deterministic hashing embedder
//! - Mock: scripted provider for tests and offline runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod completion;
pub mod embeddings;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod provider;

pub use completion::{
    CompletionRequest, CompletionResponse, Message, MessageRole, TokenUsage, ToolCall, ToolChoice,
    ToolCompletionRequest, ToolCompletionResponse, ToolDefinition,
};
pub use embeddings::{
    cosine_similarity, normalize, EmbeddingProvider, HashingEmbedder, SharedEmbeddingProvider,
};
pub use error::{Error, Result};
pub use mock::MockProvider;
pub use ollama::{OllamaConfig, OllamaEmbedder, OllamaProvider};
pub use provider::LlmProvider;
