use std::ops::Range;

use ndarray::{s, Array3, ArrayView3};

use super::{scale_dtype, Sample, SampleType};
use crate::ExplorerError;

/// A `(c, y, x)` image level held in memory, in any supported sample type.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleArray {
    /// `u8` samples.
    UInt8(Array3<u8>),
    /// `u16` samples.
    UInt16(Array3<u16>),
    /// `u32` samples.
    UInt32(Array3<u32>),
    /// `u64` samples.
    UInt64(Array3<u64>),
    /// `i8` samples.
    Int8(Array3<i8>),
    /// `i16` samples.
    Int16(Array3<i16>),
    /// `i32` samples.
    Int32(Array3<i32>),
    /// `i64` samples.
    Int64(Array3<i64>),
    /// `f32` samples.
    Float32(Array3<f32>),
    /// `f64` samples.
    Float64(Array3<f64>),
}

macro_rules! sample_array_apply {
    ($self:expr, $array:ident => $body:expr) => {
        match $self {
            SampleArray::UInt8($array) => $body,
            SampleArray::UInt16($array) => $body,
            SampleArray::UInt32($array) => $body,
            SampleArray::UInt64($array) => $body,
            SampleArray::Int8($array) => $body,
            SampleArray::Int16($array) => $body,
            SampleArray::Int32($array) => $body,
            SampleArray::Int64($array) => $body,
            SampleArray::Float32($array) => $body,
            SampleArray::Float64($array) => $body,
        }
    };
}

macro_rules! sample_array_map {
    ($self:expr, $array:ident => $body:expr) => {
        match $self {
            SampleArray::UInt8($array) => SampleArray::UInt8($body),
            SampleArray::UInt16($array) => SampleArray::UInt16($body),
            SampleArray::UInt32($array) => SampleArray::UInt32($body),
            SampleArray::UInt64($array) => SampleArray::UInt64($body),
            SampleArray::Int8($array) => SampleArray::Int8($body),
            SampleArray::Int16($array) => SampleArray::Int16($body),
            SampleArray::Int32($array) => SampleArray::Int32($body),
            SampleArray::Int64($array) => SampleArray::Int64($body),
            SampleArray::Float32($array) => SampleArray::Float32($body),
            SampleArray::Float64($array) => SampleArray::Float64($body),
        }
    };
}

macro_rules! impl_from_array {
    ($type:ty, $variant:ident) => {
        impl From<Array3<$type>> for SampleArray {
            fn from(array: Array3<$type>) -> Self {
                Self::$variant(array)
            }
        }
    };
}

impl_from_array!(u8, UInt8);
impl_from_array!(u16, UInt16);
impl_from_array!(u32, UInt32);
impl_from_array!(u64, UInt64);
impl_from_array!(i8, Int8);
impl_from_array!(i16, Int16);
impl_from_array!(i32, Int32);
impl_from_array!(i64, Int64);
impl_from_array!(f32, Float32);
impl_from_array!(f64, Float64);

impl SampleArray {
    /// The sample type.
    #[must_use]
    pub fn data_type(&self) -> SampleType {
        match self {
            Self::UInt8(_) => SampleType::UInt8,
            Self::UInt16(_) => SampleType::UInt16,
            Self::UInt32(_) => SampleType::UInt32,
            Self::UInt64(_) => SampleType::UInt64,
            Self::Int8(_) => SampleType::Int8,
            Self::Int16(_) => SampleType::Int16,
            Self::Int32(_) => SampleType::Int32,
            Self::Int64(_) => SampleType::Int64,
            Self::Float32(_) => SampleType::Float32,
            Self::Float64(_) => SampleType::Float64,
        }
    }

    /// The shape as `(c, y, x)`.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        sample_array_apply!(self, array => {
            let (c, y, x) = array.dim();
            [c, y, x]
        })
    }

    /// Copy the `rows` and `cols` of `channel`, as a single-channel array.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if the region is out of bounds.
    pub fn region(
        &self,
        channel: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<Self, ExplorerError> {
        let [c, y, x] = self.shape();
        if channel >= c || rows.start > rows.end || rows.end > y || cols.start > cols.end || cols.end > x
        {
            return Err(ExplorerError::configuration(format!(
                "region ({channel}, {rows:?}, {cols:?}) is out of bounds of an image of shape {:?}",
                [c, y, x]
            )));
        }
        Ok(sample_array_map!(self, array => {
            array.slice(s![channel..=channel, rows.clone(), cols.clone()]).to_owned()
        }))
    }

    /// Rescale to 8-bit samples with [`scale_dtype`].
    ///
    /// # Errors
    /// Returns [`ExplorerError::UnsupportedSampleType`] if the samples are not unsigned integers.
    pub fn to_u8(&self) -> Result<Array3<u8>, ExplorerError> {
        match self {
            Self::UInt8(array) => Ok(array.clone()),
            Self::UInt16(array) => Ok(scale_dtype(array.view())),
            Self::UInt32(array) => Ok(scale_dtype(array.view())),
            Self::UInt64(array) => Ok(scale_dtype(array.view())),
            _ => Err(ExplorerError::UnsupportedSampleType {
                data_type: self.data_type(),
            }),
        }
    }

    /// Halve the spatial extents by averaging 2x2 blocks.
    #[must_use]
    pub fn downsample(&self) -> Self {
        sample_array_map!(self, array => downsample_mean(array.view()))
    }
}

/// Halve the spatial extents of `array` by averaging 2x2 blocks.
///
/// Odd extents are rounded up, the trailing row and column averaging fewer samples.
/// Integer means are rounded.
#[must_use]
pub fn downsample_mean<T: Sample>(array: ArrayView3<'_, T>) -> Array3<T> {
    let (c, h, w) = array.dim();
    Array3::from_shape_fn((c, h.div_ceil(2), w.div_ceil(2)), |(c, y, x)| {
        let block = array.slice(s![c, 2 * y..(2 * y + 2).min(h), 2 * x..(2 * x + 2).min(w)]);
        #[allow(clippy::cast_precision_loss)]
        let count = block.len() as f64;
        T::from_f64(block.iter().map(|value| value.to_f64()).sum::<f64>() / count)
    })
}

/// The source of one pyramid level.
///
/// A level is a `(c, y, x)` image. Implementations may read lazily, so the tile streamer only
/// requests a region at a time unless it chooses to hold the whole level in memory.
pub trait LevelSource: Send + Sync {
    /// The shape as `(c, y, x)`.
    fn shape(&self) -> [usize; 3];

    /// The sample type.
    fn data_type(&self) -> SampleType;

    /// Read the `rows` and `cols` of `channel`, as a single-channel array.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if the region cannot be read.
    fn read_region(
        &self,
        channel: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<SampleArray, ExplorerError>;

    /// Read the whole level.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if the level cannot be read.
    fn read_level(&self) -> Result<SampleArray, ExplorerError>;

    /// Read the whole level, rescaled to 8 bits.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if the level cannot be read or its samples are not unsigned integers.
    fn read_level_u8(&self) -> Result<Array3<u8>, ExplorerError> {
        self.read_level()?.to_u8()
    }
}

impl LevelSource for SampleArray {
    fn shape(&self) -> [usize; 3] {
        SampleArray::shape(self)
    }

    fn data_type(&self) -> SampleType {
        SampleArray::data_type(self)
    }

    fn read_region(
        &self,
        channel: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<SampleArray, ExplorerError> {
        self.region(channel, rows, cols)
    }

    fn read_level(&self) -> Result<SampleArray, ExplorerError> {
        Ok(self.clone())
    }

    fn read_level_u8(&self) -> Result<Array3<u8>, ExplorerError> {
        self.to_u8()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn sample_array_region() -> Result<(), ExplorerError> {
        let image = SampleArray::from(Array3::from_shape_fn((2, 3, 4), |(c, y, x)| {
            u16::try_from(100 * c + 10 * y + x).unwrap()
        }));
        assert_eq!(image.shape(), [2, 3, 4]);
        assert_eq!(image.data_type(), SampleType::UInt16);
        let region = image.region(1, 1..3, 2..4)?;
        assert_eq!(region, SampleArray::UInt16(array![[[112, 113], [122, 123]]]));
        assert!(image.region(2, 0..1, 0..1).is_err());
        assert!(image.region(0, 0..4, 0..1).is_err());
        Ok(())
    }

    #[test]
    fn sample_array_to_u8() {
        let image = SampleArray::from(Array3::<u16>::from_elem((1, 1, 2), u16::MAX));
        assert_eq!(image.to_u8().unwrap(), Array3::from_elem((1, 1, 2), 255u8));
        let image = SampleArray::from(Array3::<f32>::zeros((1, 1, 2)));
        assert!(matches!(
            image.to_u8(),
            Err(ExplorerError::UnsupportedSampleType {
                data_type: SampleType::Float32
            })
        ));
        let image = SampleArray::from(Array3::<i16>::zeros((1, 1, 2)));
        assert!(image.read_level_u8().is_err());
    }

    #[test]
    fn sample_array_downsample() {
        let image: Array3<u8> = array![[[0, 2, 4], [2, 4, 9], [10, 10, 1]]];
        let downsampled = downsample_mean(image.view());
        assert_eq!(downsampled, array![[[2, 7], [10, 1]]]);
        let image = SampleArray::from(Array3::<u32>::zeros((3, 5, 1)));
        assert_eq!(image.downsample().shape(), [3, 3, 1]);
    }
}
