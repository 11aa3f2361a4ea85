//! Cell table encoding.
//!
//! [`write_gene_counts`] stores a cell by feature count matrix as per-feature compressed sparse
//! columns, with a synthetic `Total transcripts` feature appended. [`write_cell_categories`]
//! stores categorical cell annotations as per-category index partitions.
//!
//! Both hierarchies address cells by their ordinal, which must match the cell ordinal of the
//! boundaries written by [`write_polygons`](crate::shapes::write_polygons).

mod cell_categories;
mod gene_counts;

use serde::{Deserialize, Serialize};

use crate::zarr::ChunkCompressor;
use crate::ExplorerError;

pub use cell_categories::{
    partition_categories, write_cell_categories, write_cell_categories_zip, CategoricalColumn,
    CategoryPartition,
};
pub use gene_counts::{
    compress_features, write_gene_counts, write_gene_counts_zip, CountMatrix, CsrMatrix,
    FeatureCsr, TOTAL_TRANSCRIPTS,
};

/// Table write options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableWriteOptions {
    compressor: Option<ChunkCompressor>,
}

impl TableWriteOptions {
    /// Return the chunk compressor.
    #[must_use]
    pub fn compressor(&self) -> Option<ChunkCompressor> {
        self.compressor
    }

    /// Set the chunk compressor.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Option<ChunkCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Set the chunk compressor.
    pub fn set_compressor(&mut self, compressor: Option<ChunkCompressor>) -> &mut Self {
        self.compressor = compressor;
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if the compressor is invalid.
    pub fn validate(&self) -> Result<(), ExplorerError> {
        if let Some(compressor) = &self.compressor {
            compressor.validate()?;
        }
        Ok(())
    }
}

/// Convert a count or offset to `u32`.
pub(crate) fn to_u32(value: usize, what: &str) -> Result<u32, ExplorerError> {
    u32::try_from(value)
        .map_err(|_| ExplorerError::configuration(format!("{what} {value} exceeds the uint32 range")))
}
