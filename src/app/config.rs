//! Application configuration types

use dualrag_core::RoutingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub routing: RoutingConfig,
}

/// Primary decision source and embedding backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Decision source provider (`ollama`)
    pub provider: String,
    /// Embedding backend (`ollama` or `hashing`)
    pub embedding_provider: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            embedding_provider: "ollama".to_string(),
            base_url: dualrag_llm::ollama::DEFAULT_BASE_URL.to_string(),
            model: dualrag_llm::ollama::DEFAULT_MODEL.to_string(),
            embedding_model: dualrag_llm::ollama::DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: 60,
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session memory backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    #[default]
    Memory,
    Redis,
}

/// Session memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: MemoryBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "dualrag:memory:".to_string(),
        }
    }
}
