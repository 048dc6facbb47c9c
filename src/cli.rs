use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::aggregator::NewsAggregator;
use crate::config::Config;
use crate::error::Result;

/// Thin frontend over the aggregation engine; all rendering lives here,
/// none of it in the engine.
#[derive(Debug, Parser)]
#[command(name = "newsdeck", version, about = "Aggregate RSS/Atom news feeds into one deduplicated list")]
pub struct Cli {
    /// Path to a TOML config file; built-in defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one refresh cycle and print the merged result
    Refresh {
        /// Keyword filter; "all" matches everything
        #[arg(long, default_value = "all")]
        keyword: String,

        /// Source-name filter; "all" matches everything
        #[arg(long, default_value = "all")]
        source: String,

        /// Maximum number of items to print
        #[arg(long, default_value_t = 18)]
        limit: usize,
    },
    /// List the configured feed sources
    Sources,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load_with_env(path)?,
            None => Config::default(),
        };

        init_logging(&config);

        match self.command {
            Command::Refresh {
                keyword,
                source,
                limit,
            } => refresh(&config, &keyword, &source, limit).await,
            Command::Sources => {
                for source in &config.sources {
                    println!("{:<16} {}", source.name, source.url);
                }
                Ok(())
            }
        }
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn refresh(config: &Config, keyword: &str, source: &str, limit: usize) -> Result<()> {
    let aggregator = Arc::new(NewsAggregator::from_config(config)?);

    // Relay the progressive status stream while the fan-out runs.
    let mut updates = aggregator.subscribe();
    let status_relay = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().status.clone();
            eprintln!("{}", status);
        }
    });

    aggregator.refresh().await;
    status_relay.abort();

    for item in aggregator.filtered_items(keyword, source).iter().take(limit) {
        println!("[{}] {}", item.source_name, item.title);
        println!("    {}  {}", item.published_at.to_rfc3339(), item.url);
    }

    Ok(())
}
