//! tmcrawl
//!
//! Crawls a Tendermint-based P2P network, records every reachable node with
//! its metadata and geolocation, and serves the results over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          TMCRAWL                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Crawl loop      ←── drains the node pool, probes nodes    │
//! │  Recheck loop    ←── re-admits stale nodes into the pool   │
//! │  Node store      ←── RocksDB, nodes and cached locations   │
//! │  HTTP API        ←── node listing, health and metrics      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod crawl;
mod store;
mod types;

use api::Metrics;
use config::CrawlerConfig;
use crawl::{Crawler, IpStackClient, TendermintProbe};
use store::{RocksStore, Store};

/// Database directory name under the data directory
const DB_NAME: &str = "tmcrawl.db";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

/// tmcrawl - Tendermint P2P network crawler
#[derive(Parser, Debug)]
#[command(name = "tmcrawl")]
#[command(version)]
#[command(about = "Crawl a Tendermint P2P network and serve the node map", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tmcrawl.toml")]
    config: PathBuf,

    /// Data directory for the node database (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// HTTP API listen address (overrides the config file)
    #[arg(long)]
    listen_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.log_format)?;

    info!("🌐 tmcrawl v{}", env!("CARGO_PKG_VERSION"));

    let config = CrawlerConfig::load(&args.config)?
        .with_data_dir(args.data_dir)
        .with_listen_addr(args.listen_addr);

    config.validate()?;

    info!("⚙️  Configuration:");
    info!("   Data dir: {:?}", config.data_dir);
    info!("   Listen address: {}", config.listen_addr);
    info!("   Seeds: {}", config.seeds.len());
    info!("   Crawl interval: {}s", config.crawl_interval);
    info!("   Recheck interval: {}s", config.recheck_interval);
    info!("   Reseed size: {}", config.reseed_size);

    let config = Arc::new(config);

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let db_path = config.data_dir.join(DB_NAME);
    let store = Arc::new(RocksStore::open(&db_path)?);
    info!("📦 Node store opened at {:?}", db_path);

    let metrics = Arc::new(Metrics::new());

    let probe = Arc::new(TendermintProbe::new(config.rpc_timeout())?);
    let geolocator = Arc::new(IpStackClient::new(
        &config.geolocation_endpoint,
        &config.ipstack_key,
        config.geolocation_timeout(),
    )?);

    let crawler = Arc::new(Crawler::new(
        config.clone(),
        store.clone(),
        probe,
        geolocator,
        metrics.clone(),
    ));

    let crawl_handle = tokio::spawn(crawler.crawl());

    let api_handle = tokio::spawn(api::run_api_server(
        config.listen_addr.clone(),
        store.clone(),
        metrics,
    ));

    info!("✅ Crawler and API started");
    info!("   Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
        result = crawl_handle => {
            error!("Crawler exited: {:?}", result);
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    store.flush()?;
    info!("📦 Node store flushed to disk");

    info!("👋 tmcrawl shutting down");
    Ok(())
}

/// Install the global tracing subscriber
fn init_logging(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow::anyhow!("invalid log level {:?}: {}", level, e))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}
