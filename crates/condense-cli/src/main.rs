//! Condense CLI
//!
//! Front-end for the compaction engine, running on the offline extractive
//! model.
//!
//! # Usage
//! ```bash
//! condense scenarios
//! condense compare support-ticket [--json]
//! condense chat [--policy cumulative] [--interval 3] [--max-summaries 2]
//! condense config [--file condense.toml]
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use condense_core::{EngineConfig, ExtractiveModel, Session};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod chat;
mod report;

/// Condense - incremental dialog-history compaction
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in comparison scenarios
    Scenarios,

    /// Replay a scenario with and without compaction and compare prompt sizes
    Compare {
        /// Scenario id, see `condense scenarios`
        scenario: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Chat with the offline model, one message per line
    Chat {
        /// Compaction policy: independent or cumulative
        #[arg(long)]
        policy: Option<String>,

        /// Compact every N user turns
        #[arg(long, allow_negative_numbers = true)]
        interval: Option<i64>,

        /// Independent summaries shown in the context window
        #[arg(long, allow_negative_numbers = true)]
        max_summaries: Option<i64>,

        /// Print full response metrics as JSON after each reply
        #[arg(long)]
        json: bool,
    },

    /// Print the effective engine configuration as JSON
    Config {
        /// Configuration file to resolve, instead of --config
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match &cli.command {
        Commands::Config { file: Some(file) } => Some(file.clone()),
        _ => cli.config.clone(),
    };
    let config = load_config(config_path.as_deref())?;

    match cli.command {
        Commands::Scenarios => report::print_catalog(),
        Commands::Compare { scenario, json } => {
            let session = Session::new(config, Arc::new(ExtractiveModel::new()));
            let comparison = session
                .run_comparison_scenario(&scenario)
                .await
                .with_context(|| format!("comparison '{scenario}' failed"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&comparison)?);
            } else {
                report::print_comparison(&comparison);
            }
        }
        Commands::Chat {
            policy,
            interval,
            max_summaries,
            json,
        } => {
            let options = chat::ChatOptions {
                policy,
                interval,
                max_summaries,
                json,
            };
            chat::run(config, options).await?;
        }
        Commands::Config { .. } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let config = config
        .apply_env()
        .context("invalid CONDENSE_* environment override")?;
    tracing::debug!(
        interval = config.summary_interval,
        raw_history_limit = config.raw_history_limit,
        policy = %config.default_policy,
        "Configuration loaded"
    );
    Ok(config)
}
