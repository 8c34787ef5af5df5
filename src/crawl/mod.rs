//! Tendermint P2P Network Crawler
//!
//! Starting from a set of seed RPC addresses, the crawler repeatedly draws a
//! random address from the node pool, probes it, records what it learned and
//! feeds newly discovered peers back into the pool.
//!
//! ## Loops
//!
//! ```text
//!   ┌──────────── crawl loop ─────────────┐
//!   │ pool ─► probe ─► store ─► new peers ─┼─► pool
//!   │ (pool empty: sleep, reseed from store)
//!   └──────────────────────────────────────┘
//!   recheck loop: store ─► stale nodes ─► pool
//! ```
//!
//! Both loops run for the lifetime of the process. Nodes are probed one at a
//! time, so a single crawler never has more than one probe in flight.

mod geo;
mod pool;
mod probe;
mod util;


pub use geo::{GeoError, Geolocator, IpStackClient};
pub use pool::NodePool;
pub use probe::{ProbeClient, TendermintProbe};

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::Metrics;
use crate::config::CrawlerConfig;
use crate::store::{Store, StoreError};
use crate::types::{
    location_key, node_key, CodecError, Location, NetInfoResponse, Node, Record,
    DEFAULT_P2P_PORT, NODE_KEY_PREFIX,
};

use util::{p2p_address, parse_ip, parse_port, rpc_address, rpc_endpoint};

/// Errors surfaced by crawler persistence and geolocation steps
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Geo(#[from] GeoError),
}

/// How a single crawl attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Neither the handshake nor the TCP probe succeeded
    Unreachable,

    /// Node record written; `metadata` tells whether the status query succeeded
    Persisted { metadata: bool },

    /// Node was reachable but its record could not be written
    PersistFailed,
}

/// Orchestrates the crawl and recheck loops over a shared node pool
pub struct Crawler {
    config: Arc<CrawlerConfig>,
    store: Arc<dyn Store>,
    pool: NodePool,
    probe: Arc<dyn ProbeClient>,
    geolocator: Arc<dyn Geolocator>,
    metrics: Arc<Metrics>,
}

impl Crawler {
    pub fn new(
        config: Arc<CrawlerConfig>,
        store: Arc<dyn Store>,
        probe: Arc<dyn ProbeClient>,
        geolocator: Arc<dyn Geolocator>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let pool = NodePool::new(config.reseed_size, store.clone());

        Self {
            config,
            store,
            pool,
            probe,
            geolocator,
            metrics,
        }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Seed the pool, start the recheck loop, and crawl forever.
    ///
    /// Whenever the pool is exhausted the crawler waits `crawl_interval`
    /// seconds and reseeds the pool from previously discovered nodes.
    pub async fn crawl(self: Arc<Self>) {
        self.pool.seed(&self.config.seeds).await;
        self.record_frontier_size().await;
        info!(seeds = self.config.seeds.len(), "🌱 Seeded node pool");

        tokio::spawn(self.clone().recheck_nodes());

        let pause = Duration::from_secs(self.config.crawl_interval);
        loop {
            let crawled = self.drain().await;
            debug!(crawled, "node pool exhausted");

            info!(duration = self.config.crawl_interval, "waiting until next crawl attempt...");
            tokio::time::sleep(pause).await;

            self.pool.reseed().await;
            self.metrics.inc_reseeds();
            self.record_frontier_size().await;
        }
    }

    /// Crawl pool entries until the pool is empty. Returns the number of
    /// crawl attempts made.
    pub async fn drain(&self) -> usize {
        let mut crawled = 0;

        while let Some(node_rpc_addr) = self.pool.random_node().await {
            self.crawl_node(&node_rpc_addr).await;
            self.pool.delete_node(&node_rpc_addr).await;
            crawled += 1;

            self.record_frontier_size().await;
        }

        crawled
    }

    /// Probe one node by RPC address and record the result.
    ///
    /// The node must answer the P2P handshake or at least accept a TCP
    /// connection on its P2P port; otherwise any stored record for it is
    /// removed. Once reachable, the node is always persisted, with metadata
    /// and peers added only when the RPC queries succeed.
    pub async fn crawl_node(&self, node_rpc_addr: &str) -> CrawlOutcome {
        self.metrics.inc_crawls();

        let ip = parse_ip(node_rpc_addr);
        let p2p_addr = p2p_address(&ip);
        let endpoint = rpc_endpoint(&ip);

        debug!(p2p_address = %p2p_addr, rpc_address = %node_rpc_addr, "pinging node...");

        if !self.is_reachable(&p2p_addr).await {
            info!(p2p_address = %p2p_addr, rpc_address = %node_rpc_addr, "node unreachable, deleting");
            self.metrics.inc_unreachable();

            if let Err(e) = self.delete_node_if_exists(&ip) {
                warn!(error = %e, p2p_address = %p2p_addr, rpc_address = %node_rpc_addr, "failed to delete node");
            }
            return CrawlOutcome::Unreachable;
        }

        let mut node = Node {
            ip: ip.clone(),
            rpc_port: parse_port(node_rpc_addr),
            p2p_port: DEFAULT_P2P_PORT.to_string(),
            last_sync: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ..Default::default()
        };

        match self.get_geolocation(&ip).await {
            Ok(location) => node.location = location,
            Err(e) => {
                info!(error = %e, p2p_address = %p2p_addr, rpc_address = %node_rpc_addr, "failed to get node geolocation")
            }
        }

        let metadata = match self.probe.status(&endpoint).await {
            Ok(status) => {
                node.apply_status(&status);

                match self.probe.net_info(&endpoint).await {
                    Ok(net_info) => {
                        let added = self.discover_peers(&net_info).await;
                        debug!(peers = net_info.peer_count, added, rpc_address = %node_rpc_addr, "parsed node peers");
                    }
                    Err(e) => {
                        info!(error = %e, p2p_address = %p2p_addr, rpc_address = %node_rpc_addr, "failed to get node net info")
                    }
                }
                true
            }
            Err(e) => {
                info!(error = %e, rpc_address = %node_rpc_addr, "failed to get node status");
                false
            }
        };

        match self.save_node(&node) {
            Ok(()) => {
                self.metrics.inc_persisted();
                info!(p2p_address = %p2p_addr, rpc_address = %node_rpc_addr, "successfully crawled and persisted node");
                CrawlOutcome::Persisted { metadata }
            }
            Err(e) => {
                warn!(error = %e, p2p_address = %p2p_addr, rpc_address = %node_rpc_addr, "failed to persist node");
                CrawlOutcome::PersistFailed
            }
        }
    }

    /// Handshake first, raw TCP connect as fallback
    async fn is_reachable(&self, p2p_addr: &str) -> bool {
        let dial_timeout = self.config.dial_timeout();

        match self.probe.handshake(p2p_addr, dial_timeout).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, p2p_address = %p2p_addr, "handshake failed, falling back to tcp probe");
                match self.probe.tcp_probe(p2p_addr, dial_timeout).await {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(error = %e, p2p_address = %p2p_addr, "tcp probe failed");
                        false
                    }
                }
            }
        }
    }

    /// Queue every reported peer that has no stored record yet. Peers that
    /// are already known are left to the recheck loop.
    async fn discover_peers(&self, net_info: &NetInfoResponse) -> usize {
        let mut added = 0;

        for peer in &net_info.peers {
            if peer.remote_ip.is_empty() || self.store.has(&node_key(&peer.remote_ip)) {
                continue;
            }

            // Queued in RPC form like every other pool entry, so the stored
            // rpc_port of a discovered peer is the RPC port.
            let peer_addr = rpc_address(&peer.remote_ip, "");
            debug!(peer_address = %peer_addr, "adding peer to node pool");
            self.pool.add_node(&peer_addr).await;
            added += 1;
        }

        self.metrics.add_peers_discovered(added as u64);
        self.record_frontier_size().await;
        added
    }

    /// Re-admit stale nodes into the pool every `recheck_interval` seconds
    pub async fn recheck_nodes(self: Arc<Self>) {
        let period = Duration::from_secs(self.config.recheck_interval);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let now = Utc::now();
            info!(time = %now.to_rfc3339_opts(SecondsFormat::Secs, true), "rechecking nodes...");

            match self.recheck(now).await {
                Ok(count) => info!(count, "re-added stale nodes to node pool"),
                Err(e) => warn!(error = %e, "failed to get all stale nodes"),
            }
        }
    }

    /// Add every node that last synced before `t` back into the pool
    pub async fn recheck(&self, t: DateTime<Utc>) -> Result<usize, CrawlError> {
        let nodes = self.stale_nodes(t)?;

        for node in &nodes {
            let node_rpc_addr = rpc_address(&node.ip, &node.rpc_port);
            debug!(p2p_address = %p2p_address(&node.ip), rpc_address = %node_rpc_addr, "adding node to node pool");
            self.pool.add_node(&node_rpc_addr).await;
        }

        self.metrics.add_rechecked(nodes.len() as u64);
        self.record_frontier_size().await;
        Ok(nodes.len())
    }

    async fn record_frontier_size(&self) {
        self.metrics.set_frontier_size(self.pool.size().await as u64);
    }

    /// All stored nodes whose `last_sync` is before `t`.
    ///
    /// Nodes with an unparsable `last_sync` are never considered stale. This
    /// scans every stored node.
    pub fn stale_nodes(&self, t: DateTime<Utc>) -> Result<Vec<Node>, CrawlError> {
        let mut nodes = Vec::new();
        let mut decode_error = None;

        self.store.iterate_prefix(NODE_KEY_PREFIX, &mut |_, value| {
            let node = match Node::decode(value) {
                Ok(node) => node,
                Err(e) => {
                    decode_error = Some(e);
                    return true;
                }
            };

            if let Ok(last_sync) = DateTime::parse_from_rfc3339(&node.last_sync) {
                if last_sync.with_timezone(&Utc) < t {
                    nodes.push(node);
                }
            }
            false
        })?;

        match decode_error {
            Some(e) => Err(e.into()),
            None => Ok(nodes),
        }
    }

    /// Write a node under its addressable key, replacing any previous record
    pub fn save_node(&self, node: &Node) -> Result<(), CrawlError> {
        let bytes = node.encode()?;
        self.store.set(&node.key(), &bytes)?;
        Ok(())
    }

    /// Remove the stored node for `ip`, if any. Returns whether a record was
    /// removed.
    pub fn delete_node_if_exists(&self, ip: &str) -> Result<bool, CrawlError> {
        let key = node_key(ip);
        if !self.store.has(&key) {
            return Ok(false);
        }

        self.store.delete(&key)?;
        Ok(true)
    }

    /// Location of `ip`, served from the store when cached and otherwise
    /// looked up and cached. Cached locations never expire.
    pub async fn get_geolocation(&self, ip: &str) -> Result<Location, CrawlError> {
        let key = location_key(ip);

        if let Some(bytes) = self.store.get(&key)? {
            self.metrics.inc_geolocation_cache_hits();
            return Ok(Location::decode(&bytes)?);
        }

        self.metrics.inc_geolocation_lookups();
        let location = self.geolocator.check(ip).await?;
        self.store.set(&key, &location.encode()?)?;

        Ok(location)
    }
}
