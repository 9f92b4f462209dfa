//! Application wiring
//!
//! Turns an [`AppConfig`] into a ready [`StageOrchestrator`]. Only
//! configuration errors are fatal; an unreachable embedding service only
//! disables the semantic fallback.

mod config;
mod loader;
mod providers;

pub use config::AppConfig;
pub use loader::load_config;
pub use providers::{resolve_decision_source, resolve_embedder, resolve_memory};

use anyhow::{Context, Result};
use dualrag_core::{PrototypeCache, SemanticRouter, StageOrchestrator};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the prototype cache with the configured embedder
pub async fn build_semantic_router(config: &AppConfig) -> Result<SemanticRouter> {
    let embedder = resolve_embedder(&config.llm)?;
    let phrases = config.routing.prototype_phrases()?;
    let priority = config.routing.priority_order()?;
    let cache = PrototypeCache::build(embedder.as_ref(), &phrases, priority)
        .await
        .context("Failed to build route prototypes")?;
    Ok(SemanticRouter::new(embedder, Arc::new(cache)))
}

/// Build the orchestrator
pub async fn build_orchestrator(config: &AppConfig) -> Result<StageOrchestrator> {
    let source = resolve_decision_source(&config.llm, config.routing.context.max_turns)?;
    let memory = resolve_memory(&config.memory)?;

    let mut orchestrator = StageOrchestrator::new(&config.routing, source)
        .context("Invalid routing configuration")?
        .with_memory(memory);

    match build_semantic_router(config).await {
        Ok(router) => {
            info!(
                dimensions = router.prototypes().dimensions(),
                "Semantic fallback enabled"
            );
            orchestrator = orchestrator.with_semantic_router(router);
        }
        Err(e) => warn!(error = %e, "Semantic fallback disabled"),
    }

    Ok(orchestrator)
}
