use serde::{Deserialize, Serialize};

use super::{ArrayShape, ChunkCompressor, DataType};

/// The Zarr format version written by this crate.
pub const ZARR_FORMAT_V2: u8 = 2;

/// Zarr V2 group metadata (`.zgroup`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GroupMetadataV2 {
    /// Always 2.
    pub zarr_format: u8,
}

impl Default for GroupMetadataV2 {
    fn default() -> Self {
        Self {
            zarr_format: ZARR_FORMAT_V2,
        }
    }
}

/// Zarr V2 array metadata (`.zarray`).
///
/// For example:
/// ```json
/// {
///     "zarr_format": 2,
///     "shape": [5, 2],
///     "chunks": [3, 1],
///     "dtype": "<u4",
///     "compressor": null,
///     "fill_value": 0,
///     "order": "C",
///     "filters": null,
///     "dimension_separator": "."
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ArrayMetadataV2 {
    /// Always 2.
    pub zarr_format: u8,
    /// The array shape.
    pub shape: ArrayShape,
    /// The regular chunk shape.
    pub chunks: ArrayShape,
    /// The little-endian `numpy` data type.
    pub dtype: String,
    /// The chunk compressor, or [`None`] for uncompressed chunks.
    pub compressor: Option<ChunkCompressor>,
    /// The fill value.
    pub fill_value: serde_json::Value,
    /// The memory layout of a chunk, always `C`.
    pub order: String,
    /// Filters, always [`None`].
    pub filters: Option<Vec<serde_json::Value>>,
    /// The chunk key dimension separator.
    #[serde(default = "default_dimension_separator")]
    pub dimension_separator: String,
}

fn default_dimension_separator() -> String {
    ".".to_string()
}

impl ArrayMetadataV2 {
    /// Create array metadata with a zero fill value and `C` order.
    #[must_use]
    pub fn new(
        shape: ArrayShape,
        chunks: ArrayShape,
        data_type: DataType,
        compressor: Option<ChunkCompressor>,
    ) -> Self {
        Self {
            zarr_format: ZARR_FORMAT_V2,
            shape,
            chunks,
            dtype: data_type.dtype().to_string(),
            compressor,
            fill_value: serde_json::Value::from(0),
            order: "C".to_string(),
            filters: None,
            dimension_separator: default_dimension_separator(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn array_metadata_json() -> Result<(), Box<dyn Error>> {
        let metadata = ArrayMetadataV2::new(vec![5, 2], vec![3, 1], DataType::UInt32, None);
        let json = serde_json::to_value(&metadata)?;
        assert_eq!(
            json,
            serde_json::json!({
                "zarr_format": 2,
                "shape": [5, 2],
                "chunks": [3, 1],
                "dtype": "<u4",
                "compressor": null,
                "fill_value": 0,
                "order": "C",
                "filters": null,
                "dimension_separator": "."
            })
        );
        let metadata_de: ArrayMetadataV2 = serde_json::from_value(json)?;
        assert_eq!(metadata_de, metadata);
        Ok(())
    }

    #[test]
    fn array_metadata_default_separator() -> Result<(), Box<dyn Error>> {
        let metadata: ArrayMetadataV2 = serde_json::from_str(
            r#"{"zarr_format":2,"shape":[4],"chunks":[2],"dtype":"<f8","compressor":{"id":"zlib","level":1},"fill_value":0.0,"order":"C","filters":null}"#,
        )?;
        assert_eq!(metadata.dimension_separator, ".");
        assert_eq!(metadata.compressor, Some(ChunkCompressor::Zlib { level: 1 }));
        Ok(())
    }
}
