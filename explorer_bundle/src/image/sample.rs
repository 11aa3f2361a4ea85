use derive_more::Display;
use ndarray::{Array, ArrayView, Dimension};

/// The sample type of an image level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum SampleType {
    /// `u8`
    #[display("uint8")]
    UInt8,
    /// `u16`
    #[display("uint16")]
    UInt16,
    /// `u32`
    #[display("uint32")]
    UInt32,
    /// `u64`
    #[display("uint64")]
    UInt64,
    /// `i8`
    #[display("int8")]
    Int8,
    /// `i16`
    #[display("int16")]
    Int16,
    /// `i32`
    #[display("int32")]
    Int32,
    /// `i64`
    #[display("int64")]
    Int64,
    /// `f32`
    #[display("float32")]
    Float32,
    /// `f64`
    #[display("float64")]
    Float64,
}

impl SampleType {
    /// The size of a sample in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::UInt64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Returns true if samples of this type can be rescaled to 8 bits.
    #[must_use]
    pub const fn is_unsigned_integer(self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64
        )
    }
}

/// An image sample.
pub trait Sample: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// The sample type.
    const SAMPLE_TYPE: SampleType;

    /// Convert to [`f64`].
    fn to_f64(self) -> f64;

    /// Convert from [`f64`], rounding and saturating for integer samples.
    fn from_f64(value: f64) -> Self;
}

/// An unsigned integer image sample.
pub trait UnsignedSample: Sample {
    /// The maximum value of the sample type.
    const MAX: Self;

    /// Widen to [`u64`].
    fn to_u64(self) -> u64;

    /// Narrow from [`u64`], saturating at [`UnsignedSample::MAX`].
    fn from_u64_saturating(value: u64) -> Self;
}

macro_rules! impl_sample_integer {
    ($type:ty, $sample_type:expr) => {
        impl Sample for $type {
            const SAMPLE_TYPE: SampleType = $sample_type;

            #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn from_f64(value: f64) -> Self {
                value.round() as $type
            }
        }
    };
}

macro_rules! impl_sample_unsigned {
    ($type:ty, $sample_type:expr) => {
        impl_sample_integer!($type, $sample_type);

        impl UnsignedSample for $type {
            const MAX: Self = <$type>::MAX;

            #[allow(clippy::cast_lossless)]
            fn to_u64(self) -> u64 {
                self as u64
            }

            fn from_u64_saturating(value: u64) -> Self {
                <$type>::try_from(value).unwrap_or(<$type>::MAX)
            }
        }
    };
}

macro_rules! impl_sample_float {
    ($type:ty, $sample_type:expr) => {
        impl Sample for $type {
            const SAMPLE_TYPE: SampleType = $sample_type;

            #[allow(clippy::cast_lossless)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[allow(clippy::cast_possible_truncation)]
            fn from_f64(value: f64) -> Self {
                value as $type
            }
        }
    };
}

impl_sample_unsigned!(u8, SampleType::UInt8);
impl_sample_unsigned!(u16, SampleType::UInt16);
impl_sample_unsigned!(u32, SampleType::UInt32);
impl_sample_unsigned!(u64, SampleType::UInt64);
impl_sample_integer!(i8, SampleType::Int8);
impl_sample_integer!(i16, SampleType::Int16);
impl_sample_integer!(i32, SampleType::Int32);
impl_sample_integer!(i64, SampleType::Int64);
impl_sample_float!(f32, SampleType::Float32);
impl_sample_float!(f64, SampleType::Float64);

/// Rescale unsigned samples from the range of `S` to the range of `T`.
///
/// Each sample `v` becomes `round(v * max(T) / max(S))`, saturated to the range of `T`.
/// Scaling to the same type is the identity, so scaling is idempotent.
#[must_use]
pub fn scale_dtype<S: UnsignedSample, T: UnsignedSample, D: Dimension>(
    array: ArrayView<'_, S, D>,
) -> Array<T, D> {
    if S::SAMPLE_TYPE == T::SAMPLE_TYPE {
        return array.mapv(|value| T::from_u64_saturating(value.to_u64()));
    }
    let factor = T::MAX.to_f64() / S::MAX.to_f64();
    array.mapv(|value| T::from_f64(value.to_f64() * factor))
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array1};

    use super::*;

    #[test]
    fn scale_dtype_u16_to_u8() {
        let values: Array1<u16> = array![0, 128, 257, 32_767, 65_535];
        let scaled = scale_dtype::<u16, u8, _>(values.view());
        assert_eq!(scaled, array![0u8, 0, 1, 127, 255]);
    }

    #[test]
    fn scale_dtype_wide_types() {
        let values: Array1<u32> = array![0, u32::MAX / 2, u32::MAX];
        assert_eq!(scale_dtype::<u32, u8, _>(values.view()), array![0u8, 127, 255]);
        let values: Array1<u64> = array![u64::MAX];
        assert_eq!(scale_dtype::<u64, u8, _>(values.view()), array![255u8]);
        let values: Array1<u8> = array![1, 255];
        assert_eq!(scale_dtype::<u8, u16, _>(values.view()), array![257u16, 65_535]);
    }

    #[test]
    fn scale_dtype_idempotent() {
        let values: Array1<u16> = (0..=u16::MAX).step_by(97).collect();
        let once = scale_dtype::<u16, u8, _>(values.view());
        let twice = scale_dtype::<u8, u8, _>(once.view());
        assert_eq!(once, twice);

        let values: Array1<u64> = array![0, 1, u64::MAX - 1, u64::MAX];
        assert_eq!(scale_dtype::<u64, u64, _>(values.view()), values);
    }

    #[test]
    fn sample_from_f64_rounds_and_saturates() {
        assert_eq!(u8::from_f64(254.5), 255);
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-3.0), 0);
        assert_eq!(i16::from_f64(-2.6), -3);
        assert!((f32::from_f64(0.25) - 0.25).abs() < f32::EPSILON);
        assert_eq!(SampleType::UInt16.size(), 2);
        assert!(!SampleType::Float32.is_unsigned_integer());
    }
}
