use std::ops::Range;
use std::sync::Arc;

use itertools::Itertools;
use ndarray::{ArrayD, ArrayView, ArrayViewD, Dimension, IxDyn, Slice};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use super::{
    ArrayMetadataV2, ArrayShape, Attributes, ChunkCompressor, DataType, Element, NodePath,
    ZarrError, ZARRAY, ZATTRS, ZARR_FORMAT_V2,
};
use crate::storage::{Bytes, ReadableStorageTraits, StoreKey, WritableStorageTraits};

/// An [`Array`] builder.
///
/// The chunk compressor is [`None`] and the attributes are empty by default.
/// [`build`](ArrayBuilder::build) does not modify the store! Array metadata has to be explicitly
/// written with [`Array::store_metadata`].
#[derive(Debug, Clone)]
pub struct ArrayBuilder {
    /// Array shape.
    pub shape: ArrayShape,
    /// Data type.
    pub data_type: DataType,
    /// Regular chunk shape.
    pub chunk_shape: ArrayShape,
    /// Chunk compressor.
    pub compressor: Option<ChunkCompressor>,
    /// Attributes.
    pub attributes: Attributes,
}

impl ArrayBuilder {
    /// Create a new array builder.
    #[must_use]
    pub fn new(
        shape: impl Into<ArrayShape>,
        data_type: DataType,
        chunk_shape: impl Into<ArrayShape>,
    ) -> Self {
        Self {
            shape: shape.into(),
            data_type,
            chunk_shape: chunk_shape.into(),
            compressor: None,
            attributes: Attributes::default(),
        }
    }

    /// Set the chunk compressor.
    pub fn compressor(&mut self, compressor: Option<ChunkCompressor>) -> &mut Self {
        self.compressor = compressor;
        self
    }

    /// Set the attributes.
    pub fn attributes(&mut self, attributes: Attributes) -> &mut Self {
        self.attributes = attributes;
        self
    }

    /// Build into an [`Array`] at `path` of `storage`.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the path is invalid or the chunk shape is incompatible with the shape.
    pub fn build<TStorage: ?Sized>(
        &self,
        storage: Arc<TStorage>,
        path: &str,
    ) -> Result<Array<TStorage>, ZarrError> {
        let metadata = ArrayMetadataV2::new(
            self.shape.clone(),
            self.chunk_shape.clone(),
            self.data_type,
            self.compressor,
        );
        Array::new_with_metadata(
            storage,
            NodePath::new(path)?,
            metadata,
            self.attributes.clone(),
        )
    }
}

/// A Zarr V2 array.
#[derive(Debug)]
pub struct Array<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    path: NodePath,
    data_type: DataType,
    shape: Vec<usize>,
    chunk_shape: Vec<usize>,
    metadata: ArrayMetadataV2,
    attributes: Attributes,
}

impl<TStorage: ?Sized> Array<TStorage> {
    fn new_with_metadata(
        storage: Arc<TStorage>,
        path: NodePath,
        metadata: ArrayMetadataV2,
        attributes: Attributes,
    ) -> Result<Self, ZarrError> {
        let data_type =
            DataType::from_dtype(&metadata.dtype).ok_or_else(|| ZarrError::IncompatibleDataType {
                expected: "a little-endian fixed-size data type".to_string(),
                got: metadata.dtype.clone(),
            })?;
        let invalid_chunk_shape = || ZarrError::InvalidChunkShape {
            shape: metadata.shape.clone(),
            chunk_shape: metadata.chunks.clone(),
        };
        if metadata.zarr_format != ZARR_FORMAT_V2
            || metadata.shape.len() != metadata.chunks.len()
            || metadata.chunks.contains(&0)
        {
            return Err(invalid_chunk_shape());
        }
        let to_usize = |values: &[u64]| {
            values
                .iter()
                .map(|&value| usize::try_from(value))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid_chunk_shape())
        };
        let shape = to_usize(&metadata.shape)?;
        let chunk_shape = to_usize(&metadata.chunks)?;
        Ok(Self {
            storage,
            path,
            data_type,
            shape,
            chunk_shape,
            metadata,
            attributes,
        })
    }

    /// The node path of the array.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.metadata.shape
    }

    /// The chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.metadata.chunks
    }

    /// The data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The chunk compressor.
    #[must_use]
    pub fn compressor(&self) -> Option<&ChunkCompressor> {
        self.metadata.compressor.as_ref()
    }

    /// The array metadata.
    #[must_use]
    pub fn metadata(&self) -> &ArrayMetadataV2 {
        &self.metadata
    }

    /// The array attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The number of chunks along each dimension.
    #[must_use]
    pub fn chunk_grid_shape(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&len, &chunk)| len.div_ceil(chunk))
            .collect()
    }

    /// The indices of every chunk in C order.
    #[must_use]
    pub fn chunk_indices(&self) -> Vec<Vec<usize>> {
        if self.shape.is_empty() {
            return vec![Vec::new()];
        }
        self.chunk_grid_shape()
            .into_iter()
            .map(|chunks| 0..chunks)
            .multi_cartesian_product()
            .collect()
    }

    /// The store key of the chunk at `chunk_indices`, e.g. `1.0` for a two-dimensional array.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the key is invalid.
    pub fn chunk_key(&self, chunk_indices: &[usize]) -> Result<StoreKey, ZarrError> {
        let name = if chunk_indices.is_empty() {
            "0".to_string()
        } else {
            chunk_indices
                .iter()
                .join(&self.metadata.dimension_separator)
        };
        Ok(self.path.key(&name)?)
    }

    /// The element ranges of the chunk at `chunk_indices`, clipped to the array shape.
    fn chunk_ranges(&self, chunk_indices: &[usize]) -> Vec<Range<usize>> {
        chunk_indices
            .iter()
            .zip(&self.chunk_shape)
            .zip(&self.shape)
            .map(|((&index, &chunk), &len)| {
                let start = index * chunk;
                start..(start + chunk).min(len)
            })
            .collect()
    }

    fn chunk_num_elements(&self) -> usize {
        self.chunk_shape.iter().product()
    }

    fn check_element<T: Element>(&self) -> Result<(), ZarrError> {
        if T::DATA_TYPE == self.data_type {
            Ok(())
        } else {
            Err(ZarrError::IncompatibleDataType {
                expected: self.data_type.to_string(),
                got: T::DATA_TYPE.to_string(),
            })
        }
    }

    fn encode_chunk<T: Element>(
        &self,
        array: &ArrayViewD<'_, T>,
        chunk_indices: &[usize],
    ) -> Result<Bytes, ZarrError> {
        let ranges = self.chunk_ranges(chunk_indices);
        let subset =
            array.slice_each_axis(|axis| Slice::from(ranges[axis.axis.index()].clone()));
        let mut bytes = Vec::with_capacity(self.chunk_num_elements() * self.data_type.size());
        if subset.shape() == self.chunk_shape.as_slice() {
            subset
                .iter()
                .for_each(|element| element.extend_le_bytes(&mut bytes));
        } else {
            let mut padded = ArrayD::from_elem(IxDyn(&self.chunk_shape), T::default());
            padded
                .slice_each_axis_mut(|axis| Slice::from(0..ranges[axis.axis.index()].len()))
                .assign(&subset);
            padded
                .iter()
                .for_each(|element| element.extend_le_bytes(&mut bytes));
        }
        let bytes = match &self.metadata.compressor {
            Some(compressor) => compressor.compress(&bytes)?,
            None => bytes,
        };
        Ok(Bytes::from(bytes))
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> Array<TStorage> {
    /// Store the array metadata, and the attributes if there are any.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if there is an underlying store error.
    pub fn store_metadata(&self) -> Result<(), ZarrError> {
        let metadata = serde_json::to_vec_pretty(&self.metadata)?;
        self.storage
            .set(&self.path.key(ZARRAY)?, Bytes::from(metadata))?;
        if !self.attributes.is_empty() {
            let attributes = serde_json::to_vec_pretty(&self.attributes)?;
            self.storage
                .set(&self.path.key(ZATTRS)?, Bytes::from(attributes))?;
        }
        Ok(())
    }

    /// Encode and store every chunk of `array`.
    ///
    /// Chunks are encoded in parallel and stored in C order.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if
    ///  - the element type or shape of `array` does not match the array,
    ///  - a chunk cannot be compressed, or
    ///  - there is an underlying store error.
    pub fn store_array_ndarray<T: Element, D: Dimension>(
        &self,
        array: ArrayView<'_, T, D>,
    ) -> Result<(), ZarrError> {
        self.check_element::<T>()?;
        if array.shape() != self.shape.as_slice() {
            return Err(ZarrError::IncompatibleShape {
                expected: self.metadata.shape.clone(),
                got: array.shape().iter().map(|&len| len as u64).collect(),
            });
        }
        let array = array.into_dyn();
        let chunks = self
            .chunk_indices()
            .into_par_iter()
            .map(|chunk_indices| -> Result<(StoreKey, Bytes), ZarrError> {
                Ok((
                    self.chunk_key(&chunk_indices)?,
                    self.encode_chunk(&array, &chunk_indices)?,
                ))
            })
            .collect::<Result<Vec<_>, ZarrError>>()?;
        for (key, bytes) in chunks {
            self.storage.set(&key, bytes)?;
        }
        Ok(())
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> Array<TStorage> {
    /// Open the array at `path` of `storage`.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the metadata is missing or invalid.
    pub fn open(storage: Arc<TStorage>, path: &str) -> Result<Self, ZarrError> {
        let path = NodePath::new(path)?;
        let metadata = storage
            .get(&path.key(ZARRAY)?)?
            .ok_or_else(|| ZarrError::MissingMetadata(path.clone()))?;
        let metadata: ArrayMetadataV2 = serde_json::from_slice(&metadata)?;
        let attributes = match storage.get(&path.key(ZATTRS)?)? {
            Some(attributes) => serde_json::from_slice(&attributes)?,
            None => Attributes::default(),
        };
        Self::new_with_metadata(storage, path, metadata, attributes)
    }

    /// Read and decode every chunk of the array.
    ///
    /// Missing chunks are filled with zeros.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the element type does not match or a chunk cannot be decoded.
    pub fn retrieve_array_ndarray<T: Element>(&self) -> Result<ArrayD<T>, ZarrError> {
        self.check_element::<T>()?;
        let mut array = ArrayD::from_elem(IxDyn(&self.shape), T::default());
        let element_size = self.data_type.size();
        let expected = self.chunk_num_elements() * element_size;
        for chunk_indices in self.chunk_indices() {
            let key = self.chunk_key(&chunk_indices)?;
            let Some(encoded) = self.storage.get(&key)? else {
                continue;
            };
            let decoded = match &self.metadata.compressor {
                Some(compressor) => compressor.decompress(&encoded)?,
                None => encoded.to_vec(),
            };
            if decoded.len() != expected {
                return Err(ZarrError::UnexpectedChunkSize {
                    key: key.to_string(),
                    expected,
                    got: decoded.len(),
                });
            }
            let elements = decoded
                .chunks_exact(element_size)
                .map(T::from_le_slice)
                .collect::<Vec<_>>();
            let chunk = ArrayD::from_shape_vec(IxDyn(&self.chunk_shape), elements).map_err(
                |_| ZarrError::IncompatibleShape {
                    expected: self.metadata.chunks.clone(),
                    got: vec![expected as u64],
                },
            )?;
            let ranges = self.chunk_ranges(&chunk_indices);
            array
                .slice_each_axis_mut(|axis| Slice::from(ranges[axis.axis.index()].clone()))
                .assign(
                    &chunk.slice_each_axis(|axis| {
                        Slice::from(0..ranges[axis.axis.index()].len())
                    }),
                );
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use ndarray::{array, Array2};

    use super::*;
    use crate::storage::store::MemoryStore;
    use crate::storage::ListableStorageTraits;

    #[test]
    fn array_chunk_keys_and_padding() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        let data: Array2<u32> = array![[1, 2, 3], [4, 5, 6], [7, 8, 9]];
        let array = ArrayBuilder::new([3, 3], DataType::UInt32, [2, 2]).build(store.clone(), "/a")?;
        array.store_metadata()?;
        array.store_array_ndarray(data.view())?;

        let keys = store.list()?;
        let keys = keys.iter().map(StoreKey::as_str).collect::<Vec<_>>();
        assert_eq!(keys, ["a/.zarray", "a/0.0", "a/0.1", "a/1.0", "a/1.1"]);

        let edge = store.get(&StoreKey::new("a/1.1")?)?.unwrap();
        assert_eq!(edge.as_ref(), [9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        let array = Array::open(store, "/a")?;
        assert_eq!(array.retrieve_array_ndarray::<u32>()?, data.into_dyn());
        Ok(())
    }

    #[test]
    fn array_compressed_with_attributes() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        let data = array![[0.5f64, 1.5], [2.5, 3.5], [4.5, 5.5]];
        let mut attributes = Attributes::new();
        attributes.insert("columns".to_string(), serde_json::json!(["x", "y"]));
        let array = ArrayBuilder::new([3, 2], DataType::Float64, [3, 1])
            .compressor(Some(ChunkCompressor::Zlib { level: 5 }))
            .attributes(attributes.clone())
            .build(store.clone(), "/summary")?;
        array.store_metadata()?;
        array.store_array_ndarray(data.view())?;

        let array = Array::open(store, "/summary")?;
        assert_eq!(array.attributes(), &attributes);
        assert_eq!(array.chunk_grid_shape(), [1, 2]);
        assert_eq!(array.retrieve_array_ndarray::<f64>()?, data.into_dyn());
        assert!(array.retrieve_array_ndarray::<f32>().is_err());
        Ok(())
    }

    #[test]
    fn array_invalid() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        assert!(ArrayBuilder::new([3], DataType::UInt8, [0])
            .build(store.clone(), "/a")
            .is_err());
        assert!(ArrayBuilder::new([3], DataType::UInt8, [1, 1])
            .build(store.clone(), "/a")
            .is_err());
        assert!(ArrayBuilder::new([3], DataType::UInt8, [1])
            .build(store.clone(), "a")
            .is_err());
        let array = ArrayBuilder::new([3], DataType::UInt8, [2]).build(store.clone(), "/a")?;
        assert!(array.store_array_ndarray(array![1i32, 2, 3].view()).is_err());
        assert!(array.store_array_ndarray(array![1u8, 2].view()).is_err());
        assert!(Array::open(store, "/a").is_err());
        Ok(())
    }

    #[test]
    fn array_empty() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        let array = ArrayBuilder::new([0, 2], DataType::Int32, [1, 1]).build(store.clone(), "/")?;
        array.store_metadata()?;
        array.store_array_ndarray(Array2::<i32>::zeros((0, 2)).view())?;
        assert_eq!(store.list()?.len(), 1);
        Ok(())
    }
}
