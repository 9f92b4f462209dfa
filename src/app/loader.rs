//! Configuration loading
//!
//! Embedded defaults, then optional files, then `DUALRAG_*` environment
//! variables, each layer overriding the previous one.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use tracing::debug;

/// Embedded default configuration
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load and validate configuration
pub fn load_config() -> Result<AppConfig> {
    let env = std::env::var("DUALRAG_ENV").unwrap_or_else(|_| "development".to_string());
    debug!(env = %env, "Loading configuration");

    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{env}")).required(false))
        .add_source(File::with_name("config/local").required(false))
        // Single `_` after the prefix so DUALRAG_ROUTING__SEMANTIC_FLOOR works
        .add_source(
            Environment::with_prefix("DUALRAG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let app: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    app.routing
        .validate()
        .context("Invalid routing configuration")?;
    Ok(app)
}
