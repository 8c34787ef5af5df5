//! Node Pool (crawl frontier)
//!
//! The set of RPC addresses waiting for a crawl attempt. Shared between the
//! crawl loop and the recheck loop; every operation takes the same exclusive
//! lock, so membership changes are never observed half-applied.

use rand::seq::{IteratorRandom, SliceRandom};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::Store;
use crate::types::{Node, Record, NODE_KEY_PREFIX};

use super::util::rpc_address;

/// Concurrency-safe set of addresses pending a crawl
pub struct NodePool {
    nodes: Mutex<HashSet<String>>,

    /// Maximum addresses re-admitted by a reseed
    reseed_size: usize,

    store: Arc<dyn Store>,
}

impl NodePool {
    pub fn new(reseed_size: usize, store: Arc<dyn Store>) -> Self {
        Self {
            nodes: Mutex::new(HashSet::new()),
            reseed_size,
            store,
        }
    }

    /// Add the initial set of seed addresses
    pub async fn seed(&self, seeds: &[String]) {
        let mut nodes = self.nodes.lock().await;
        for seed in seeds {
            nodes.insert(seed.clone());
        }
    }

    /// Add an address if it is not already pending
    pub async fn add_node(&self, node_rpc_addr: &str) {
        let mut nodes = self.nodes.lock().await;
        if !nodes.contains(node_rpc_addr) {
            nodes.insert(node_rpc_addr.to_string());
        }
    }

    /// Remove an address if present
    pub async fn delete_node(&self, node_rpc_addr: &str) {
        self.nodes.lock().await.remove(node_rpc_addr);
    }

    /// Pick a random pending address without removing it.
    ///
    /// Returns `None` when the pool is empty. Callers remove the address with
    /// [`NodePool::delete_node`] once the crawl attempt is finished.
    pub async fn random_node(&self) -> Option<String> {
        let nodes = self.nodes.lock().await;
        nodes.iter().choose(&mut rand::thread_rng()).cloned()
    }

    pub async fn size(&self) -> usize {
        self.nodes.lock().await.len()
    }

    #[cfg(test)]
    pub async fn contains(&self, node_rpc_addr: &str) -> bool {
        self.nodes.lock().await.contains(node_rpc_addr)
    }

    /// Re-admit a random sample of at most `reseed_size` persisted nodes.
    ///
    /// Returns the number of addresses added. Store failures leave the pool
    /// untouched.
    pub async fn reseed(&self) -> usize {
        let mut addresses = Vec::new();
        let result = self.store.iterate_prefix(NODE_KEY_PREFIX, &mut |_, value| {
            match Node::decode(value) {
                Ok(node) => addresses.push(rpc_address(&node.ip, &node.rpc_port)),
                Err(e) => debug!("Skipping undecodable node during reseed: {}", e),
            }
            false
        });

        if let Err(e) = result {
            warn!("Failed to read nodes for reseed: {}", e);
            return 0;
        }

        // ThreadRng is !Send and must not be held across the lock below
        let known = addresses.len();
        let sample: Vec<String> = addresses
            .choose_multiple(&mut rand::thread_rng(), self.reseed_size)
            .cloned()
            .collect();

        let mut nodes = self.nodes.lock().await;
        let before = nodes.len();
        nodes.extend(sample);
        let added = nodes.len() - before;

        info!(known, added, "reseeded node pool");
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn empty_pool(reseed_size: usize) -> NodePool {
        NodePool::new(reseed_size, Arc::new(MemStore::new()))
    }

    fn persist_nodes(store: &MemStore, count: usize) {
        for i in 0..count {
            let node = Node {
                ip: format!("10.0.0.{}", i),
                rpc_port: "26657".to_string(),
                ..Default::default()
            };
            store.set(&node.key(), &node.encode().unwrap()).unwrap();
        }
    }

    #[tokio::test]
    async fn test_seed_dedup() {
        let pool = empty_pool(10);
        let seeds = vec![
            "http://1.1.1.1:26657".to_string(),
            "http://1.1.1.1:26657".to_string(),
            "http://2.2.2.2:26657".to_string(),
        ];

        pool.seed(&seeds).await;
        pool.seed(&seeds).await;
        assert_eq!(pool.size().await, 2);
    }

    #[tokio::test]
    async fn test_add_and_delete_idempotent() {
        let pool = empty_pool(10);

        pool.add_node("http://1.1.1.1:26657").await;
        pool.add_node("http://1.1.1.1:26657").await;
        assert_eq!(pool.size().await, 1);

        pool.delete_node("http://1.1.1.1:26657").await;
        pool.delete_node("http://1.1.1.1:26657").await;
        assert_eq!(pool.size().await, 0);
    }

    #[tokio::test]
    async fn test_random_node_empty() {
        let pool = empty_pool(10);
        assert!(pool.random_node().await.is_none());

        pool.add_node("http://1.1.1.1:26657").await;
        assert_eq!(pool.random_node().await.as_deref(), Some("http://1.1.1.1:26657"));

        // Peeking does not remove
        assert_eq!(pool.size().await, 1);

        pool.delete_node("http://1.1.1.1:26657").await;
        assert!(pool.random_node().await.is_none());
    }

    #[tokio::test]
    async fn test_random_node_is_member() {
        let pool = empty_pool(10);
        for i in 0..20 {
            pool.add_node(&format!("http://10.0.0.{}:26657", i)).await;
        }

        for _ in 0..50 {
            let node = pool.random_node().await.unwrap();
            assert!(pool.contains(&node).await);
        }
    }

    #[tokio::test]
    async fn test_drain_pattern() {
        let pool = empty_pool(10);
        for i in 0..5 {
            pool.add_node(&format!("http://10.0.0.{}:26657", i)).await;
        }

        let mut drained = HashSet::new();
        while let Some(node) = pool.random_node().await {
            pool.delete_node(&node).await;
            assert!(drained.insert(node));
        }
        assert_eq!(drained.len(), 5);
    }

    #[tokio::test]
    async fn test_reseed_bounded_by_size() {
        let store = Arc::new(MemStore::new());
        persist_nodes(&store, 25);

        let pool = NodePool::new(10, store);
        assert_eq!(pool.reseed().await, 10);
        assert_eq!(pool.size().await, 10);
    }

    #[tokio::test]
    async fn test_reseed_bounded_by_known_nodes() {
        let store = Arc::new(MemStore::new());
        persist_nodes(&store, 3);

        let pool = NodePool::new(10, store);
        pool.reseed().await;
        assert_eq!(pool.size().await, 3);
        assert!(pool.contains("http://10.0.0.1:26657").await);
    }

    #[tokio::test]
    async fn test_reseed_empty_store() {
        let pool = empty_pool(10);
        assert_eq!(pool.reseed().await, 0);
        assert!(pool.random_node().await.is_none());
    }

    #[tokio::test]
    async fn test_reseed_on_spawned_task() {
        let store = Arc::new(MemStore::new());
        persist_nodes(&store, 4);
        let pool = Arc::new(NodePool::new(10, store));

        let task_pool = pool.clone();
        let added = tokio::spawn(async move { task_pool.reseed().await })
            .await
            .unwrap();

        assert_eq!(added, 4);
        assert_eq!(pool.size().await, 4);
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let pool = Arc::new(empty_pool(10));
        let mut handles = Vec::new();

        for worker in 0..4 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    // Overlapping address ranges across workers
                    pool.add_node(&format!("http://10.0.{}.{}:26657", worker % 2, i)).await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(pool.size().await, 100);
    }
}
