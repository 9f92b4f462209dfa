//! Embedding similarity router

use super::prototypes::PrototypeCache;
use crate::decision::{ResponseMode, Route, RoutingDecision};
use crate::error::{Error, Result};
use dualrag_llm::SharedEmbeddingProvider;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Reasoning recorded on decisions built by [`SemanticRouter::synthesize`]
pub const SEMANTIC_REASONING: &str = "semantic_fallback";

/// Classifies text by its nearest route prototype
#[derive(Clone)]
pub struct SemanticRouter {
    embedder: SharedEmbeddingProvider,
    prototypes: Arc<PrototypeCache>,
}

impl SemanticRouter {
    /// Create a router over a shared prototype cache
    #[must_use]
    pub fn new(embedder: SharedEmbeddingProvider, prototypes: Arc<PrototypeCache>) -> Self {
        Self {
            embedder,
            prototypes,
        }
    }

    /// The shared prototype cache
    #[must_use]
    pub fn prototypes(&self) -> &Arc<PrototypeCache> {
        &self.prototypes
    }

    /// Embed `text` and return the most similar route with its score
    #[instrument(skip(self, text), fields(embedder = %self.embedder.name()))]
    pub async fn classify(&self, text: &str) -> Result<(Route, f64)> {
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;
        let (route, score) = self.prototypes.nearest(&vector)?;
        debug!(route = %route, score, "Nearest prototype");
        Ok((route, score))
    }

    /// Build the decision Stage 2 proposes for a classification
    #[must_use]
    pub fn synthesize(route: Route, score: f64, text: &str) -> RoutingDecision {
        let confidence = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut decision = RoutingDecision::new(route, confidence);
        decision.reasoning = SEMANTIC_REASONING.to_string();

        match route {
            Route::StaticRag => {
                decision.needs_static_rag = true;
                decision.static_rag_query = Some(text.to_string());
                decision.response_mode = ResponseMode::SearchThenAnswer;
            }
            Route::SqlRag => {
                decision.needs_sql_rag = true;
                decision.sql_intent = Some(text.to_string());
                decision.response_mode = ResponseMode::SearchThenAnswer;
            }
            Route::Report => {
                decision.needs_report = true;
                decision.response_mode = ResponseMode::Report;
            }
            Route::Chat | Route::Followup | Route::None => {}
        }

        decision
    }
}

impl std::fmt::Debug for SemanticRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticRouter")
            .field("embedder", &self.embedder.name())
            .field("dimensions", &self.prototypes.dimensions())
            .finish()
    }
}
