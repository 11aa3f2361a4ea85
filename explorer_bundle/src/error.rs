use thiserror::Error;

use crate::cell_id::CellIdError;
use crate::image::SampleType;
use crate::storage::StorageError;
use crate::zarr::ZarrError;

/// An explorer bundle error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExplorerError {
    /// An image level holds samples that cannot be rescaled to 8-bit.
    #[error("unsupported sample type {data_type}, expected an unsigned integer type")]
    UnsupportedSampleType {
        /// The sample type of the offending level.
        data_type: SampleType,
    },
    /// A pyramid level disagrees with the base level.
    #[error("pyramid level {level} has shape {shape:?}, expected {expected_channels} channels")]
    PyramidShapeMismatch {
        /// The index of the offending level.
        level: usize,
        /// The number of channels of the base level.
        expected_channels: usize,
        /// The shape of the offending level, as `(c, y, x)`.
        shape: [usize; 3],
    },
    /// A geometry collection is mixed or holds an unsupported geometry.
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometryType(String),
    /// Inconsistent or invalid configuration or inputs.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
    /// A storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// A Zarr hierarchy error.
    #[error(transparent)]
    ZarrError(#[from] ZarrError),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A JSON (de)serialisation error.
    #[error(transparent)]
    JSONError(#[from] serde_json::Error),
    /// An invalid cell identifier.
    #[error(transparent)]
    CellIdError(#[from] CellIdError),
}

impl ExplorerError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }
}

impl From<crate::storage::StoreKeyError> for ExplorerError {
    fn from(err: crate::storage::StoreKeyError) -> Self {
        Self::StorageError(err.into())
    }
}

impl From<crate::storage::StorePrefixError> for ExplorerError {
    fn from(err: crate::storage::StorePrefixError) -> Self {
        Self::StorageError(err.into())
    }
}

impl From<crate::storage::store::ZipStoreCreateError> for ExplorerError {
    fn from(err: crate::storage::store::ZipStoreCreateError) -> Self {
        Self::StorageError(err.into())
    }
}
