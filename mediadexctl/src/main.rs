//! # mediadexctl
//!
//! Runs and inspects scans of a mediadex content tree.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use mediadex_config::{ConfigLoader, StoreConfig};
use mediadex_core::{FsContentStore, HttpContentStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "mediadexctl", version)]
#[command(about = "Scan a content tree and maintain its media asset index")]
struct Cli {
    /// Env file to read instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run a scan in the foreground. Ctrl-C stops it and keeps the queue.
    Scan(ScanArgs),
    /// Print current and persisted scan statistics as JSON
    Stats,
    /// Print the scan lease as JSON
    Status,
    /// Inspect or repair the scan lease
    #[command(subcommand)]
    Lease(LeaseCommand),
}

#[derive(ClapArgs, Debug, Clone, Copy)]
struct ScanArgs {
    /// Rescan every document, ignoring earlier results
    #[arg(long, conflicts_with = "full")]
    force: bool,

    /// Discard the index and results, then rebuild them from scratch
    #[arg(long)]
    full: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum LeaseCommand {
    /// Clear an abandoned lease so another session can scan
    Clear {
        /// Also clear a lease that is still heartbeating
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Logs go to stderr; stdout carries the JSON reports.
                "warn,mediadexctl=info,scan::queue=info,scan::lease=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.env_file.as_ref() {
        loader = loader.with_env_file(path);
    }
    let load = loader.load().context("failed to load configuration")?;
    if let Some(path) = load.env_file.as_ref() {
        info!(target: "mediadexctl", path = %path.display(), "loaded env file");
    }
    let config = load.config;

    match config.store {
        StoreConfig::Http { url, token } => {
            let base = Url::parse(&url)
                .with_context(|| format!("invalid store url {url}"))?;
            let store = HttpContentStore::new(base, token)
                .context("failed to build HTTP client")?;
            commands::run(cli.command, Arc::new(store), config.scan).await
        }
        StoreConfig::Local { root } => {
            let store = FsContentStore::new(root);
            commands::run(cli.command, Arc::new(store), config.scan).await
        }
    }
}
