//! `dualrag check-config`

use crate::app;
use anyhow::Result;

pub fn run() -> Result<()> {
    let config = app::load_config()?;
    let thresholds = config.routing.threshold_table()?;
    let priority = config.routing.priority_order()?;

    println!("Configuration OK");
    println!("  provider:        {} ({})", config.llm.provider, config.llm.model);
    println!(
        "  embeddings:      {} ({})",
        config.llm.embedding_provider, config.llm.embedding_model
    );
    println!("  memory:          {:?}", config.memory.backend);
    println!("  semantic floor:  {}", config.routing.semantic_floor);
    println!(
        "  stage 1:         {} attempt(s), {}ms timeout",
        config.routing.stage1.max_attempts, config.routing.stage1.timeout_ms
    );
    println!("  thresholds:");
    for route in &priority {
        if let Some(t) = thresholds.get(route) {
            println!("    {:<12} {}", route.as_str(), t);
        }
    }
    Ok(())
}
