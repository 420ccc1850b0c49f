//! Feed Collector - command line entry point
//!
//! Attaches to a running Chrome (started with `--remote-debugging-port`),
//! collects the bookmarks feed and forwards it to the remote store.

use clap::{Parser, Subcommand};
use feed_collector::{ChromePage, Config, FeedService, Reply};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "feed-collector", version, about = "Collect a virtualized bookmarks feed")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, env = "FEED_COLLECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// DevTools endpoint of the browser, overriding the config file
    #[arg(long, global = true, env = "FEED_COLLECTOR_DEBUGGER_URL")]
    debugger_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scroll the feed, collect items and send them to the store
    Collect {
        /// Maximum number of items to collect
        #[arg(long)]
        batch_limit: Option<usize>,

        /// Ask the store to skip items it already has
        #[arg(long)]
        skip_duplicates: bool,

        /// Collect only; do not contact the store
        #[arg(long)]
        dry_run: bool,

        /// Also write the collected batch to this file as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Inspect the currently rendered feed and store the snapshot
    Snapshot,

    /// Collect while tracking every item seen, and report items that were lost
    Reconcile {
        #[arg(long)]
        batch_limit: Option<usize>,

        /// Also write the full report to this file as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    info!("Wrote {:?}", path);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);
    let (config, config_source) = Config::read(config_path);

    // Initialize logging; RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Feed Collector");
    config_source.log();

    let service = FeedService::from_config(&config)?;
    let debugger_url = cli
        .debugger_url
        .as_deref()
        .unwrap_or(&config.browser.debugger_url);

    let mut page = match ChromePage::attach(
        debugger_url,
        &config.browser.feed_url,
        &config.browser.feed_url_markers,
    )
    .await
    {
        Ok(page) => page,
        Err(e) => {
            error!("Cannot attach to browser: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let reply = match cli.command {
        Command::Collect {
            batch_limit,
            dry_run: true,
            out,
            ..
        } => match service.collect(&mut page, batch_limit).await {
            Ok(run) => {
                info!(
                    "Dry run collected {} items in {} cycles ({:?})",
                    run.items.len(),
                    run.cycles,
                    run.stop_reason
                );
                if let Some(path) = out {
                    write_json(&path, &run.items)?;
                } else {
                    println!("{}", serde_json::to_string_pretty(&run.items)?);
                }
                return Ok(ExitCode::SUCCESS);
            }
            Err(e) => Reply::failed(e.to_string()),
        },

        Command::Collect {
            batch_limit,
            skip_duplicates,
            out,
            ..
        } => {
            let outcome = service
                .scrape_and_sync(&mut page, batch_limit, skip_duplicates)
                .await;
            if let Some(path) = out {
                write_json(&path, &outcome.batch)?;
            }
            outcome.reply
        }

        Command::Snapshot => service.debug_snapshot(&mut page).await,

        Command::Reconcile { batch_limit, out } => {
            let outcome = service.debug_mode_sync(&mut page, batch_limit).await;
            if let (Some(path), Some(report)) = (out, &outcome.report) {
                write_json(&path, report)?;
            }
            outcome.reply
        }
    };

    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{}", reply.error().unwrap_or("failed"));
        Ok(ExitCode::FAILURE)
    }
}
