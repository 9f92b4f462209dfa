//! Provider and store resolution

use super::config::{LlmConfig, MemoryBackend, MemoryConfig};
use anyhow::{bail, Context, Result};
use dualrag_core::{DecisionSource, InMemoryStore, LlmDecisionSource, RedisMemoryStore, SharedMemory};
use dualrag_llm::{HashingEmbedder, OllamaConfig, OllamaEmbedder, OllamaProvider, SharedEmbeddingProvider};
use std::sync::Arc;
use tracing::info;

fn ollama_config(llm: &LlmConfig) -> OllamaConfig {
    OllamaConfig::new()
        .with_base_url(&llm.base_url)
        .with_model(&llm.model)
        .with_embedding_model(&llm.embedding_model)
        .with_timeout(llm.timeout())
}

/// Primary decision source for `llm.provider`
pub fn resolve_decision_source(llm: &LlmConfig, max_turns: usize) -> Result<Arc<dyn DecisionSource>> {
    match llm.provider.as_str() {
        "ollama" => {
            let provider = OllamaProvider::new(ollama_config(llm))
                .context("Failed to create Ollama provider")?;
            info!(base_url = %llm.base_url, model = %llm.model, "Registered Ollama decision source");
            Ok(Arc::new(
                LlmDecisionSource::new(Arc::new(provider))
                    .with_model(&llm.model)
                    .with_temperature(llm.temperature)
                    .with_max_turns(max_turns),
            ))
        }
        other => bail!("Unknown LLM provider `{other}`"),
    }
}

/// Embedding backend for `llm.embedding_provider`
pub fn resolve_embedder(llm: &LlmConfig) -> Result<SharedEmbeddingProvider> {
    match llm.embedding_provider.as_str() {
        "ollama" => {
            let embedder = OllamaEmbedder::new(ollama_config(llm))
                .context("Failed to create Ollama embedder")?;
            info!(model = %embedder.model(), "Registered Ollama embeddings");
            Ok(Arc::new(embedder))
        }
        "hashing" => {
            info!("Using local hashing embeddings");
            Ok(Arc::new(HashingEmbedder::default()))
        }
        other => bail!("Unknown embedding provider `{other}`"),
    }
}

/// Session memory for `memory.backend`
pub fn resolve_memory(memory: &MemoryConfig) -> Result<SharedMemory> {
    match memory.backend {
        MemoryBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        MemoryBackend::Redis => {
            let store = RedisMemoryStore::new(&memory.redis_url)
                .context("Failed to create Redis memory store")?
                .with_prefix(&memory.key_prefix);
            info!(url = %memory.redis_url, "Using Redis session memory");
            Ok(Arc::new(store))
        }
    }
}
