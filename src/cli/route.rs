//! `dualrag route`

use crate::app;
use anyhow::{Context, Result};
use dualrag_core::RoutingRequest;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(query: &str, session: &str) -> Result<()> {
    let config = app::load_config()?;
    let orchestrator = app::build_orchestrator(&config).await?;

    // Ctrl-C abandons the primary source and lets the fallbacks answer
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling primary decision source");
            trigger.cancel();
        }
    });

    let plan = orchestrator
        .route(&RoutingRequest::new(query, session), &cancel)
        .await;

    let out = serde_json::to_string_pretty(&plan).context("Failed to encode execution plan")?;
    println!("{out}");
    Ok(())
}
