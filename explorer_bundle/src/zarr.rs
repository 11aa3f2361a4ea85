//! A minimal Zarr V2 hierarchy writer.
//!
//! The viewer reads its cell, feature, and group containers as Zarr V2 hierarchies packaged in ZIP
//! files. This module writes such hierarchies to any [`WritableStorageTraits`](crate::storage::WritableStorageTraits) store:
//!  - [`GroupBuilder`] writes `.zgroup` and `.zattrs`,
//!  - [`ArrayBuilder`] creates an [`Array`] whose metadata and chunks are written with
//!    [`Array::store_metadata`] and [`Array::store_array_ndarray`].
//!
//! Chunks are C-ordered, little-endian, padded with zeros at the array edges, and keyed with the `.`
//! dimension separator (e.g. `0.1`). Arrays can be read back with [`Array::open`] and
//! [`Array::retrieve_array_ndarray`].

mod array;
mod compressor;
mod data_type;
mod group;
mod metadata;
mod node_path;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

pub use array::{Array, ArrayBuilder};
pub use compressor::ChunkCompressor;
pub use data_type::{DataType, Element};
pub use group::{Group, GroupBuilder};
pub use metadata::{ArrayMetadataV2, GroupMetadataV2, ZARR_FORMAT_V2};
pub use node_path::{NodePath, NodePathError};

use crate::storage::store::ZipStoreWriter;
use crate::storage::{StorageError, StoreKeyError, StorePrefixError};

/// The metadata key of a group.
pub const ZGROUP: &str = ".zgroup";

/// The metadata key of an array.
pub const ZARRAY: &str = ".zarray";

/// The attributes key of a node.
pub const ZATTRS: &str = ".zattrs";

/// The shape of an array or chunk.
pub type ArrayShape = Vec<u64>;

/// JSON attributes of a node.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A Zarr hierarchy error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ZarrError {
    /// A storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// An IO error raised by a compressor.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// Invalid metadata JSON.
    #[error(transparent)]
    JSONError(#[from] serde_json::Error),
    /// An invalid node path.
    #[error(transparent)]
    NodePathError(#[from] NodePathError),
    /// The chunk shape is incompatible with the array shape.
    #[error("chunk shape {chunk_shape:?} is invalid for an array of shape {shape:?}")]
    InvalidChunkShape {
        /// The array shape.
        shape: ArrayShape,
        /// The chunk shape.
        chunk_shape: ArrayShape,
    },
    /// Data with an unexpected shape.
    #[error("got data of shape {got:?}, expected {expected:?}")]
    IncompatibleShape {
        /// The expected shape.
        expected: ArrayShape,
        /// The shape of the data.
        got: ArrayShape,
    },
    /// Data with an unexpected data type.
    #[error("got elements of data type {got}, expected {expected}")]
    IncompatibleDataType {
        /// The data type of the array.
        expected: String,
        /// The data type of the elements.
        got: String,
    },
    /// An invalid compressor configuration.
    #[error("invalid compressor: {0}")]
    InvalidCompressor(String),
    /// A node has no metadata.
    #[error("missing metadata at {0}")]
    MissingMetadata(NodePath),
    /// A decoded chunk has an unexpected size.
    #[error("chunk {key} has {got} bytes, expected {expected}")]
    UnexpectedChunkSize {
        /// The chunk key.
        key: String,
        /// The expected number of bytes.
        expected: usize,
        /// The decoded number of bytes.
        got: usize,
    },
}

impl From<StoreKeyError> for ZarrError {
    fn from(err: StoreKeyError) -> Self {
        Self::StorageError(err.into())
    }
}

impl From<StorePrefixError> for ZarrError {
    fn from(err: StorePrefixError) -> Self {
        Self::StorageError(err.into())
    }
}

/// The extent of a chunk that splits `len` elements into roughly `parts` chunks.
///
/// Zero-length dimensions get a chunk extent of one.
#[must_use]
pub fn chunk_extent(len: usize, parts: usize) -> u64 {
    len.div_ceil(parts.max(1)).max(1) as u64
}

/// Write a hierarchy into a new ZIP file at `path`.
///
/// The ZIP file is only published if `write` succeeds and the archive is finalised.
///
/// # Errors
/// Returns the error of `write`, or a [`StorageError`] if the archive cannot be created or finalised.
pub fn write_zip_store<P, F, E>(path: P, write: F) -> Result<(), E>
where
    P: AsRef<Path>,
    F: FnOnce(Arc<ZipStoreWriter>) -> Result<(), E>,
    E: From<StorageError>,
{
    let store = Arc::new(ZipStoreWriter::create(path).map_err(StorageError::from)?);
    write(store.clone())?;
    let store = Arc::into_inner(store)
        .ok_or_else(|| StorageError::Other("zip store is still referenced".to_string()))?;
    store.finish()?;
    Ok(())
}
