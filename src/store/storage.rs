//! RocksDB-backed store

use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;

use super::{Store, StoreError};

/// Node store backed by RocksDB
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(100);
        opts.set_keep_log_file_num(3);

        let db = DB::open(&opts, path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;

        Ok(Self { db })
    }
}

impl Store for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map_err(|e| StoreError::ReadFailed(e.to_string()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put(key, value)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.db
            .delete(key)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
    }

    fn iterate_prefix(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::ReadFailed(e.to_string()))?;

            if !key.starts_with(prefix) {
                break;
            }

            if visit(&key, &value) {
                break;
            }
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
    }
}
