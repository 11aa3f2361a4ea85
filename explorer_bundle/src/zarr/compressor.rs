use std::io::{Cursor, Read};

use flate2::bufread::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use serde::{Deserialize, Serialize};

use super::ZarrError;

/// A Zarr V2 chunk compressor.
///
/// Serialises to the `numcodecs` form used in `.zarray`, e.g. `{"id":"zlib","level":5}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum ChunkCompressor {
    /// The `zlib` compressor.
    Zlib {
        /// The compression level, `0..=9`.
        level: u32,
    },
    /// The `gzip` compressor.
    Gzip {
        /// The compression level, `0..=9`.
        level: u32,
    },
    /// The `zstd` compressor.
    Zstd {
        /// The compression level, `-7..=22`.
        level: i32,
    },
}

impl ChunkCompressor {
    /// Validate the compression level.
    ///
    /// # Errors
    /// Returns [`ZarrError::InvalidCompressor`] if the level is out of range.
    pub fn validate(&self) -> Result<(), ZarrError> {
        match *self {
            Self::Zlib { level } | Self::Gzip { level } if level > 9 => Err(
                ZarrError::InvalidCompressor(format!("{self:?} level must be in 0..=9")),
            ),
            Self::Zstd { level } if !(-7..=22).contains(&level) => Err(
                ZarrError::InvalidCompressor(format!("{self:?} level must be in -7..=22")),
            ),
            _ => Ok(()),
        }
    }

    /// Compress `decoded`.
    ///
    /// # Errors
    /// Returns an IO error if compression fails.
    pub fn compress(&self, decoded: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut out: Vec<u8> = Vec::new();
        match *self {
            Self::Zlib { level } => {
                let mut encoder =
                    ZlibEncoder::new(Cursor::new(decoded), flate2::Compression::new(level));
                encoder.read_to_end(&mut out)?;
            }
            Self::Gzip { level } => {
                let mut encoder =
                    GzEncoder::new(Cursor::new(decoded), flate2::Compression::new(level));
                encoder.read_to_end(&mut out)?;
            }
            Self::Zstd { level } => {
                out = zstd::encode_all(Cursor::new(decoded), level)?;
            }
        }
        Ok(out)
    }

    /// Decompress `encoded`.
    ///
    /// # Errors
    /// Returns an IO error if `encoded` is not a valid compressed stream.
    pub fn decompress(&self, encoded: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        let mut out: Vec<u8> = Vec::new();
        match self {
            Self::Zlib { .. } => {
                ZlibDecoder::new(Cursor::new(encoded)).read_to_end(&mut out)?;
            }
            Self::Gzip { .. } => {
                GzDecoder::new(Cursor::new(encoded)).read_to_end(&mut out)?;
            }
            Self::Zstd { .. } => {
                out = zstd::decode_all(Cursor::new(encoded))?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    const BYTES: &[u8] = b"cell_features cell_features cell_features 0123456789";

    #[test]
    fn compressor_json() -> Result<(), Box<dyn Error>> {
        let compressor = ChunkCompressor::Zlib { level: 5 };
        assert_eq!(
            serde_json::to_string(&compressor)?,
            r#"{"id":"zlib","level":5}"#
        );
        let compressor: ChunkCompressor = serde_json::from_str(r#"{"id":"gzip","level":1}"#)?;
        assert_eq!(compressor, ChunkCompressor::Gzip { level: 1 });
        Ok(())
    }

    #[test]
    fn compressor_validate() {
        assert!(ChunkCompressor::Zlib { level: 9 }.validate().is_ok());
        assert!(ChunkCompressor::Gzip { level: 10 }.validate().is_err());
        assert!(ChunkCompressor::Zstd { level: 23 }.validate().is_err());
    }

    #[test]
    fn compressor_decompress_inverts_compress() -> Result<(), Box<dyn Error>> {
        for compressor in [
            ChunkCompressor::Zlib { level: 5 },
            ChunkCompressor::Gzip { level: 5 },
            ChunkCompressor::Zstd { level: 3 },
        ] {
            let encoded = compressor.compress(BYTES)?;
            assert_eq!(compressor.decompress(&encoded)?, BYTES);
        }
        Ok(())
    }
}
