use auto_impl::auto_impl;

use super::{Bytes, MaybeBytes, StorageError, StoreKey, StoreKeys, StorePrefix};

/// A store whose values can be read by key.
#[auto_impl(Arc, &)]
pub trait ReadableStorageTraits: Send + Sync {
    /// Read the value at `key`, or [`None`] if the key has no value.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError>;

    /// The size in bytes of the value at `key`, or [`None`] if the key has no value.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError>;
}

/// A store whose keys can be enumerated.
#[auto_impl(Arc, &)]
pub trait ListableStorageTraits: Send + Sync {
    /// Every key of the store, in ascending order.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn list(&self) -> Result<StoreKeys, StorageError>;

    /// The keys under `prefix`, in ascending order.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        let mut keys = self.list()?;
        keys.retain(|key| key.has_prefix(prefix));
        Ok(keys)
    }

    /// The total size in bytes of the values under `prefix`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store cannot be read.
    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError>;
}

/// A store that values can be written to.
#[auto_impl(Arc, &)]
pub trait WritableStorageTraits: Send + Sync {
    /// Write `value` at `key`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the value cannot be written, or the store does not permit
    /// writing `key` again.
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError>;

    /// Remove the value at `key`. Removing a key without a value succeeds.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the store does not support removal or the value cannot be removed.
    fn erase(&self, key: &StoreKey) -> Result<(), StorageError>;
}
