//! Node Store Module
//!
//! Ordered key-value persistence for crawled nodes and cached locations.
//! The crawler only depends on the [`Store`] capability; RocksDB backs it in
//! production and [`MemStore`] backs it in tests.

#[cfg(test)]
mod memory;
mod storage;

#[cfg(test)]
pub use memory::MemStore;
pub use storage::RocksStore;

/// Errors raised by a store operation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    OpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Capability interface over an ordered key-value store.
///
/// Every call is an independent operation; callers do not get multi-step
/// transactions.
pub trait Store: Send + Sync {
    /// Value for `key`, or `None` when absent
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Whether `key` is present. Read errors count as absent.
    fn has(&self, key: &[u8]) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Visit every pair whose key starts with `prefix`, in key order.
    /// Iteration stops early when `visit` returns `true`.
    fn iterate_prefix(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError>;

    /// Flush pending writes to durable storage
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
