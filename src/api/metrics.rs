//! Crawl Metrics
//!
//! Counters updated by the crawler and exposed by the HTTP API.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for the crawler
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Crawl attempts made
    pub crawls: AtomicU64,

    /// Node records written
    pub nodes_persisted: AtomicU64,

    /// Nodes that failed both reachability checks
    pub nodes_unreachable: AtomicU64,

    /// New peers queued from net info responses
    pub peers_discovered: AtomicU64,

    /// Geolocations served from the store
    pub geolocation_cache_hits: AtomicU64,

    /// Geolocations fetched from the geolocation service
    pub geolocation_lookups: AtomicU64,

    /// Pool reseeds after exhaustion
    pub reseeds: AtomicU64,

    /// Stale nodes re-added by the recheck loop
    pub nodes_rechecked: AtomicU64,

    /// Addresses pending in the node pool
    pub frontier_size: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_crawls(&self) {
        self.crawls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_persisted(&self) {
        self.nodes_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unreachable(&self) {
        self.nodes_unreachable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_peers_discovered(&self, count: u64) {
        self.peers_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_geolocation_cache_hits(&self) {
        self.geolocation_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_geolocation_lookups(&self) {
        self.geolocation_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reseeds(&self) {
        self.reseeds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rechecked(&self, count: u64) {
        self.nodes_rechecked.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_frontier_size(&self, size: u64) {
        self.frontier_size.store(size, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let entries = [
            ("uptime_seconds", "gauge", "Crawler uptime in seconds", self.uptime_secs()),
            ("crawls_total", "counter", "Crawl attempts", load(&self.crawls)),
            ("nodes_persisted_total", "counter", "Node records written", load(&self.nodes_persisted)),
            ("nodes_unreachable_total", "counter", "Unreachable nodes", load(&self.nodes_unreachable)),
            ("peers_discovered_total", "counter", "Peers added to the node pool", load(&self.peers_discovered)),
            ("geolocation_cache_hits_total", "counter", "Geolocations served from the store", load(&self.geolocation_cache_hits)),
            ("geolocation_lookups_total", "counter", "Geolocation service queries", load(&self.geolocation_lookups)),
            ("reseeds_total", "counter", "Node pool reseeds", load(&self.reseeds)),
            ("nodes_rechecked_total", "counter", "Stale nodes re-added to the node pool", load(&self.nodes_rechecked)),
            ("frontier_size", "gauge", "Addresses pending in the node pool", load(&self.frontier_size)),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in entries {
            let _ = write!(
                output,
                "# HELP tmcrawl_{name} {help}\n# TYPE tmcrawl_{name} {kind}\ntmcrawl_{name} {value}\n\n"
            );
        }

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "crawls": self.crawls.load(Ordering::Relaxed),
            "nodes": {
                "persisted": self.nodes_persisted.load(Ordering::Relaxed),
                "unreachable": self.nodes_unreachable.load(Ordering::Relaxed),
                "rechecked": self.nodes_rechecked.load(Ordering::Relaxed),
            },
            "peers_discovered": self.peers_discovered.load(Ordering::Relaxed),
            "geolocation": {
                "cache_hits": self.geolocation_cache_hits.load(Ordering::Relaxed),
                "lookups": self.geolocation_lookups.load(Ordering::Relaxed),
            },
            "pool": {
                "size": self.frontier_size.load(Ordering::Relaxed),
                "reseeds": self.reseeds.load(Ordering::Relaxed),
            },
        })
    }
}
