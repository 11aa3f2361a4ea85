use derive_more::Display;

/// A fixed-size little-endian Zarr V2 data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum DataType {
    /// `|u1`
    #[display("uint8")]
    UInt8,
    /// `<u4`
    #[display("uint32")]
    UInt32,
    /// `<u8`
    #[display("uint64")]
    UInt64,
    /// `<i4`
    #[display("int32")]
    Int32,
    /// `<f4`
    #[display("float32")]
    Float32,
    /// `<f8`
    #[display("float64")]
    Float64,
}

impl DataType {
    /// The `dtype` of the data type in Zarr V2 array metadata.
    #[must_use]
    pub const fn dtype(self) -> &'static str {
        match self {
            Self::UInt8 => "|u1",
            Self::UInt32 => "<u4",
            Self::UInt64 => "<u8",
            Self::Int32 => "<i4",
            Self::Float32 => "<f4",
            Self::Float64 => "<f8",
        }
    }

    /// Parse a Zarr V2 `dtype`.
    #[must_use]
    pub fn from_dtype(dtype: &str) -> Option<Self> {
        match dtype {
            "|u1" | "<u1" => Some(Self::UInt8),
            "<u4" => Some(Self::UInt32),
            "<u8" => Some(Self::UInt64),
            "<i4" => Some(Self::Int32),
            "<f4" => Some(Self::Float32),
            "<f8" => Some(Self::Float64),
            _ => None,
        }
    }

    /// The size of an element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::UInt64 | Self::Float64 => 8,
        }
    }
}

/// A trait representing an array element type.
pub trait Element: Copy + Default + Send + Sync + 'static {
    /// The data type of the element.
    const DATA_TYPE: DataType;

    /// Append the little-endian bytes of the element to `bytes`.
    fn extend_le_bytes(self, bytes: &mut Vec<u8>);

    /// Read an element from exactly [`DataType::size`] little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($type:ty, $data_type:expr) => {
        impl Element for $type {
            const DATA_TYPE: DataType = $data_type;

            fn extend_le_bytes(self, bytes: &mut Vec<u8>) {
                bytes.extend_from_slice(&self.to_le_bytes());
            }

            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut le_bytes = [0; size_of::<$type>()];
                le_bytes.copy_from_slice(bytes);
                <$type>::from_le_bytes(le_bytes)
            }
        }
    };
}

impl_element!(u8, DataType::UInt8);
impl_element!(u32, DataType::UInt32);
impl_element!(u64, DataType::UInt64);
impl_element!(i32, DataType::Int32);
impl_element!(f32, DataType::Float32);
impl_element!(f64, DataType::Float64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_dtype() {
        for data_type in [
            DataType::UInt8,
            DataType::UInt32,
            DataType::UInt64,
            DataType::Int32,
            DataType::Float32,
            DataType::Float64,
        ] {
            assert_eq!(DataType::from_dtype(data_type.dtype()), Some(data_type));
        }
        assert_eq!(DataType::from_dtype(">u4"), None);
    }

    #[test]
    fn element_bytes() {
        let mut bytes = Vec::new();
        7u32.extend_le_bytes(&mut bytes);
        (-2i32).extend_le_bytes(&mut bytes);
        assert_eq!(bytes, [7, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(u32::from_le_slice(&bytes[..4]), 7);
        assert_eq!(i32::from_le_slice(&bytes[4..]), -2);
        assert_eq!(<f32 as Element>::DATA_TYPE.size(), 4);
    }
}
