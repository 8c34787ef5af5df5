//! In-memory store used by tests

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{Store, StoreError};

/// Ordered in-memory store with the same semantics as [`super::RocksStore`]
#[derive(Default)]
pub struct MemStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::ReadFailed("store lock poisoned".to_string())
}

impl Store for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        // Snapshot first so `visit` may call back into the store
        let matching: Vec<(Vec<u8>, Vec<u8>)> = {
            let entries = self.entries.read().map_err(poisoned)?;
            entries
                .range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };

        for (key, value) in &matching {
            if visit(key, value) {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_isolation() {
        let store = MemStore::new();
        store.set(b"node/1", b"n").unwrap();
        store.set(b"location/1", b"l").unwrap();
        store.set(b"nodes", b"x").unwrap();

        let mut keys = Vec::new();
        store
            .iterate_prefix(b"node/", &mut |k, _| {
                keys.push(k.to_vec());
                false
            })
            .unwrap();

        assert_eq!(keys, vec![b"node/1".to_vec()]);
        assert_eq!(store.len(), 3);
    }
}
