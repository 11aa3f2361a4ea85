//! An in-memory store.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StorePrefix, WritableStorageTraits,
};

/// An in-memory store.
///
/// Values are kept in key order, and can be overwritten and erased.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<StoreKey, Bytes>>,
}

fn poisoned<T>(_: PoisonError<T>) -> StorageError {
    StorageError::Other("memory store lock poisoned".to_string())
}

impl MemoryStore {
    /// Create an empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of keys with a value.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.values.read().map_err(poisoned)?.len())
    }

    /// Returns true if no key has a value.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        Ok(self.values.read().map_err(poisoned)?.get(key).cloned())
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let values = self.values.read().map_err(poisoned)?;
        Ok(values.get(key).map(|value| value.len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.values
            .write()
            .map_err(poisoned)?
            .insert(key.clone(), value);
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.values.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

impl ListableStorageTraits for MemoryStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        Ok(self.values.read().map_err(poisoned)?.keys().cloned().collect())
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError> {
        let values = self.values.read().map_err(poisoned)?;
        Ok(values
            .iter()
            .filter_map(|(key, value)| key.has_prefix(prefix).then_some(value.len() as u64))
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn memory_store_set_get_erase() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        assert!(store.is_empty()?);
        let zarray = StoreKey::new("cell_id/.zarray")?;
        let chunk = StoreKey::new("cell_id/0.0")?;
        let zgroup = StoreKey::new(".zgroup")?;
        store.set(&zarray, Bytes::from_static(b"{}"))?;
        store.set(&chunk, Bytes::from_static(&[1, 0, 0, 0]))?;
        store.set(&zgroup, Bytes::from_static(b"{}"))?;
        store.set(&chunk, Bytes::from_static(&[2, 0, 0, 0, 1, 0, 0, 0]))?;

        assert_eq!(store.len()?, 3);
        assert_eq!(store.size_key(&chunk)?, Some(8));
        assert_eq!(store.size_prefix(&StorePrefix::new("cell_id/")?)?, 10);
        assert_eq!(store.size_prefix(&StorePrefix::root())?, 12);
        assert_eq!(
            store.list_prefix(&StorePrefix::new("cell_id/")?)?,
            vec![chunk.clone(), zarray.clone()]
        );
        assert_eq!(store.list()?, vec![zgroup.clone(), chunk.clone(), zarray.clone()]);

        store.erase(&chunk)?;
        store.erase(&chunk)?;
        assert_eq!(store.get(&chunk)?, None);
        assert_eq!(store.get(&zgroup)?, Some(Bytes::from_static(b"{}")));
        Ok(())
    }

    #[test]
    fn memory_store_shared() -> Result<(), Box<dyn Error>> {
        fn write(store: impl WritableStorageTraits) -> Result<(), StorageError> {
            store.set(&StoreKey::new(".zgroup")?, Bytes::from_static(b"{}"))
        }
        let store = Arc::new(MemoryStore::new());
        write(store.clone())?;
        write(&*store)?;
        assert_eq!(store.len()?, 1);
        Ok(())
    }
}
