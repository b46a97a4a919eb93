//! Unit of work: staged writes over a read-through overlay
//!
//! A unit reads committed state from [`Storage`] but sees its own staged
//! writes first. Nothing reaches the database until [`UnitOfWork::commit`],
//! which writes every staged mutation in one `WriteBatch`. Dropping a unit
//! without committing discards it.
//!
//! Units are only created by the writer actor, so at most one is open at a
//! time and every read inside a unit observes the latest committed state.

use crate::{
    error::Result,
    storage::{cf, StagedWrite, Storage},
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

/// Staged mutations for one atomic commit
pub struct UnitOfWork<'a> {
    storage: &'a Storage,
    staged: BTreeMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("staged", &self.staged.len())
            .finish()
    }
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn begin(storage: &'a Storage) -> Self {
        Self {
            storage,
            staged: BTreeMap::new(),
        }
    }

    /// Typed lookup, staged writes first
    pub fn get<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        match self.staged.get(&(cf, key.to_vec())) {
            Some(Some(bytes)) => Ok(Some(bincode::deserialize(bytes)?)),
            Some(None) => Ok(None),
            None => self.storage.get(cf, key),
        }
    }

    /// Whether a key is present, staged writes first
    pub fn contains(&self, cf: &'static str, key: &[u8]) -> Result<bool> {
        match self.staged.get(&(cf, key.to_vec())) {
            Some(staged) => Ok(staged.is_some()),
            None => Ok(self.storage.get_raw(cf, key)?.is_some()),
        }
    }

    /// Stage a value
    pub fn put<T: Serialize>(&mut self, cf: &'static str, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.staged.insert((cf, key.to_vec()), Some(bytes));
        Ok(())
    }

    /// Stage an index entry (key only)
    pub fn put_index(&mut self, key: Vec<u8>) {
        self.staged.insert((cf::INDICES, key), Some(Vec::new()));
    }

    /// Stage a deletion
    pub fn delete(&mut self, cf: &'static str, key: &[u8]) {
        self.staged.insert((cf, key.to_vec()), None);
    }

    /// Number of staged mutations
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// No mutations staged
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Write all staged mutations atomically
    pub(crate) fn commit(self) -> Result<usize> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        let writes: Vec<StagedWrite> = self
            .staged
            .into_iter()
            .map(|((cf, key), value)| (cf, key, value))
            .collect();
        self.storage.write_staged(writes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{index, index_key, ScanOrder};
    use crate::Config;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Storage::open(&config).unwrap(), temp_dir)
    }

    #[test]
    fn test_reads_see_staged_writes() {
        let (storage, _temp) = test_storage();
        let mut uow = UnitOfWork::begin(&storage);

        uow.put(cf::WALLETS, b"k", &42u64).unwrap();
        assert_eq!(uow.get::<u64>(cf::WALLETS, b"k").unwrap(), Some(42));
        assert!(uow.contains(cf::WALLETS, b"k").unwrap());

        // Not visible outside the unit until commit
        assert_eq!(storage.get::<u64>(cf::WALLETS, b"k").unwrap(), None);

        uow.delete(cf::WALLETS, b"k");
        assert_eq!(uow.get::<u64>(cf::WALLETS, b"k").unwrap(), None);
        assert!(!uow.contains(cf::WALLETS, b"k").unwrap());
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let (storage, _temp) = test_storage();

        {
            let mut uow = UnitOfWork::begin(&storage);
            uow.put(cf::WALLETS, b"dropped", &1u64).unwrap();
            // dropped without commit
        }
        assert_eq!(storage.get::<u64>(cf::WALLETS, b"dropped").unwrap(), None);

        let mut uow = UnitOfWork::begin(&storage);
        uow.put(cf::WALLETS, b"a", &1u64).unwrap();
        uow.put(cf::MOVEMENTS, b"b", &2u64).unwrap();
        uow.put_index(index_key(index::USER_MOVEMENTS, &[b"a", b"b"]));
        assert_eq!(uow.len(), 3);
        assert_eq!(uow.commit().unwrap(), 3);

        assert_eq!(storage.get::<u64>(cf::WALLETS, b"a").unwrap(), Some(1));
        assert_eq!(storage.get::<u64>(cf::MOVEMENTS, b"b").unwrap(), Some(2));
        let prefix = index_key(index::USER_MOVEMENTS, &[b"a"]);
        assert_eq!(storage.scan_index(&prefix, ScanOrder::Oldest).unwrap().len(), 1);
    }
}
