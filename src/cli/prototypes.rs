//! `dualrag prototypes`

use crate::app;
use anyhow::{Context, Result};

pub async fn run(query: Option<&str>) -> Result<()> {
    let config = app::load_config()?;
    let router = app::build_semantic_router(&config).await?;
    let cache = router.prototypes();

    println!(
        "{} prototypes, {} dimensions",
        cache.priority().len(),
        cache.dimensions()
    );

    let Some(query) = query else {
        return Ok(());
    };

    let embedder = app::resolve_embedder(&config.llm)?;
    let vector = embedder
        .embed(query)
        .await
        .context("Failed to embed query")?;
    for (route, score) in cache.scores(&vector)? {
        println!("  {:<12} {:.4}", route.as_str(), score);
    }

    let (route, score) = router.classify(query).await?;
    let accepted = score >= config.routing.semantic_floor;
    println!(
        "nearest: {route} ({score:.4}), {} the semantic floor {}",
        if accepted { "meets" } else { "below" },
        config.routing.semantic_floor
    );
    Ok(())
}
