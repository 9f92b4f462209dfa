//! Embedding providers for similarity routing
//!
//! This module provides embedding generation:
//! - `EmbeddingProvider` trait for abstraction
//! - `HashingEmbedder`, a deterministic local embedder (feature hashing over
//!   word tokens and character trigrams) that needs no model download
//!
//! The networked Ollama embedder lives in [`crate::ollama`].
//!
//! # Example
//!
//! ```
//! # tokio_test::block_on(async {
//! use dualrag_llm::embeddings::{EmbeddingProvider, HashingEmbedder};
//!
//! let embedder = HashingEmbedder::new(128);
//! let a = embedder.embed("top customers by revenue").await.unwrap();
//! let b = embedder.embed("top customers by revenue").await.unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.len(), 128);
//! # });
//! ```

use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Trait for embedding providers
///
/// Implementations must be deterministic: identical input yields an
/// identical vector of length [`dimensions`](EmbeddingProvider::dimensions).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the embedding dimension
    fn dimensions(&self) -> usize;

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Wrapper for thread-safe embedding provider access
pub type SharedEmbeddingProvider = Arc<dyn EmbeddingProvider>;

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero norm. Callers are responsible for
/// checking that the lengths match.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Scale a vector to unit length in place (zero vectors are left untouched).
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Deterministic feature-hashing embedder
///
/// Every lowercase word token and every character trigram of each token is
/// hashed with SHA-256 into a bucket and a sign. Words weigh twice as much as
/// trigrams so shared vocabulary dominates shared spelling. Output vectors are
/// unit length; text with no alphanumeric content embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    /// Default vector size
    pub const DEFAULT_DIMENSIONS: usize = 256;

    /// Create an embedder producing vectors of `dimensions` entries (minimum 1)
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(idx) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    /// Embed synchronously
    #[must_use]
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let (bucket, sign) = self.bucket(&format!("w:{token}"));
            vector[bucket] += 2.0 * sign;

            let chars: Vec<char> = format!("^{token}$").chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let (bucket, sign) = self.bucket(&format!("t:{trigram}"));
                vector[bucket] += sign;
            }
        }

        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embed_sync(text);
        debug!("Generated hashed embedding with {} dimensions", vector.len());
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
