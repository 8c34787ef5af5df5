//! Crawler Configuration
//!
//! Loaded from a TOML file and overridden from the command line.
//! Zero or empty values in the file fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:27758";
const DEFAULT_CRAWL_INTERVAL_SECS: u64 = 15;
const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 3600;
const DEFAULT_RESEED_SIZE: usize = 100;
const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 2;
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 2;
const DEFAULT_GEOLOCATION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_GEOLOCATION_ENDPOINT: &str = "http://api.ipstack.com";

/// Main configuration for the crawler and its API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    // === Storage & API ===

    /// Directory holding the node database
    pub data_dir: PathBuf,

    /// Address the HTTP API binds to
    pub listen_addr: String,

    // === Crawl ===

    /// RPC addresses the frontier is seeded with, e.g. `http://1.2.3.4:26657`
    pub seeds: Vec<String>,

    /// Number of persisted nodes re-admitted when the frontier runs dry
    pub reseed_size: usize,

    /// Pause between drain cycles (seconds)
    pub crawl_interval: u64,

    /// Interval between stale node rechecks (seconds)
    pub recheck_interval: u64,

    // === Probing ===

    /// Timeout for the P2P handshake and raw TCP probe (seconds)
    pub dial_timeout_secs: u64,

    /// Timeout for each RPC request (seconds)
    pub rpc_timeout_secs: u64,

    // === Geolocation ===

    /// ipstack access key
    pub ipstack_key: String,

    /// Base URL of the geolocation service
    pub geolocation_endpoint: String,

    /// Timeout for each geolocation request (seconds)
    pub geolocation_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),

            seeds: vec![],
            reseed_size: DEFAULT_RESEED_SIZE,
            crawl_interval: DEFAULT_CRAWL_INTERVAL_SECS,
            recheck_interval: DEFAULT_RECHECK_INTERVAL_SECS,

            dial_timeout_secs: DEFAULT_DIAL_TIMEOUT_SECS,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,

            ipstack_key: String::new(),
            geolocation_endpoint: DEFAULT_GEOLOCATION_ENDPOINT.to_string(),
            geolocation_timeout_secs: DEFAULT_GEOLOCATION_TIMEOUT_SECS,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tmcrawl")
}

impl CrawlerConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {:?}: {}", path, e))?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, filling in defaults
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("failed to decode config: {}", e))?;
        Ok(config.with_defaults())
    }

    /// Replace zero and empty values with defaults
    fn with_defaults(mut self) -> Self {
        let defaults = Self::default();

        if self.listen_addr.is_empty() {
            self.listen_addr = defaults.listen_addr;
        }
        if self.data_dir.as_os_str().is_empty() {
            self.data_dir = defaults.data_dir;
        }
        if self.reseed_size == 0 {
            self.reseed_size = defaults.reseed_size;
        }
        if self.crawl_interval == 0 {
            self.crawl_interval = defaults.crawl_interval;
        }
        if self.recheck_interval == 0 {
            self.recheck_interval = defaults.recheck_interval;
        }
        if self.dial_timeout_secs == 0 {
            self.dial_timeout_secs = defaults.dial_timeout_secs;
        }
        if self.rpc_timeout_secs == 0 {
            self.rpc_timeout_secs = defaults.rpc_timeout_secs;
        }
        if self.geolocation_timeout_secs == 0 {
            self.geolocation_timeout_secs = defaults.geolocation_timeout_secs;
        }
        if self.geolocation_endpoint.is_empty() {
            self.geolocation_endpoint = defaults.geolocation_endpoint;
        }

        self
    }

    // Builder-style methods for CLI overrides

    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn with_listen_addr(mut self, listen_addr: Option<String>) -> Self {
        if let Some(addr) = listen_addr {
            self.listen_addr = addr;
        }
        self
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.seeds.is_empty() {
            anyhow::bail!("at least one seed is required");
        }

        if self.seeds.iter().any(|s| s.trim().is_empty()) {
            anyhow::bail!("seeds must not be empty strings");
        }

        if self.ipstack_key.trim().is_empty() {
            anyhow::bail!("ipstack_key is required");
        }

        if self.crawl_interval == 0 || self.recheck_interval == 0 {
            anyhow::bail!(
                "crawl_interval ({}) and recheck_interval ({}) must be positive",
                self.crawl_interval,
                self.recheck_interval
            );
        }

        if self.reseed_size == 0 {
            anyhow::bail!("reseed_size must be positive");
        }

        Ok(())
    }
}
