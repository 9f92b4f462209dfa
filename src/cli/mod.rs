//! CLI module for DualRAG
//!
//! - `route`: route one query and print the execution plan
//! - `check-config`: load and validate configuration
//! - `prototypes`: build route prototypes and score a query against them

use clap::{Parser, Subcommand};

pub mod check;
pub mod prototypes;
pub mod route;

/// DualRAG request router
#[derive(Parser, Debug)]
#[command(name = "dualrag")]
#[command(about = "Multi-stage request router with validated fallbacks")]
#[command(version)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route a query and print the execution plan
    Route {
        /// Query text
        query: String,
        /// Session identifier
        #[arg(long, default_value = "cli")]
        session: String,
    },
    /// Load and validate configuration
    CheckConfig,
    /// Build route prototypes and optionally score a query
    Prototypes {
        /// Query to score against every prototype
        #[arg(long)]
        query: Option<String>,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Route { query, session }) => route::run(&query, &session).await,
        Some(Commands::CheckConfig) => check::run(),
        Some(Commands::Prototypes { query }) => prototypes::run(query.as_deref()).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
