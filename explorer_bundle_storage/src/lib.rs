//! Stores for the chunked containers of an explorer bundle.
//!
//! Every Zarr hierarchy of a bundle is written as a set of key/value pairs through
//! [`WritableStorageTraits`]. Keys are validated [`StoreKey`]s and grouped by [`StorePrefix`]es.
//!
//! Two stores are provided in the [`store`] module:
//!  - [`MemoryStore`](store::MemoryStore), for inspection and tests, and
//!  - [`ZipStoreWriter`](store::ZipStoreWriter) and [`ZipStore`](store::ZipStore), which write and read
//!    the ZIP packaged hierarchies opened by the viewer.

mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;

use thiserror::Error;

pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError};

pub use self::storage_sync::{ListableStorageTraits, ReadableStorageTraits, WritableStorageTraits};

/// The value of a key, an alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// The value of a key, or [`None`] if the key has no value.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A malformed ZIP archive or an archive that cannot be written.
    #[error(transparent)]
    ZipError(#[from] zip::result::ZipError),
    /// A key was written twice to a write-once store.
    #[error("store key {0} has already been written")]
    DuplicateKey(StoreKey),
    /// An invalid store key.
    #[error(transparent)]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid store prefix.
    #[error(transparent)]
    InvalidStorePrefix(#[from] StorePrefixError),
    /// The store does not support the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}
