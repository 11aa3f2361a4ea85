//! A little-endian BigTIFF writer.
//!
//! Tiles are appended as they are produced and each image file directory (IFD) is written after
//! its tiles. Offsets that are only known later (the next IFD of a chain, `SubIFDs` values) are
//! patched in place once the pages they point to are written.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use flate2::bufread::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::ExplorerError;

/// TIFF tags written by [`BigTiffWriter`] users.
pub mod tags {
    /// `NewSubfileType`
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    /// `ImageWidth`
    pub const IMAGE_WIDTH: u16 = 256;
    /// `ImageLength`
    pub const IMAGE_LENGTH: u16 = 257;
    /// `BitsPerSample`
    pub const BITS_PER_SAMPLE: u16 = 258;
    /// `Compression`
    pub const COMPRESSION: u16 = 259;
    /// `PhotometricInterpretation`
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
    /// `ImageDescription`
    pub const IMAGE_DESCRIPTION: u16 = 270;
    /// `SamplesPerPixel`
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    /// `XResolution`
    pub const X_RESOLUTION: u16 = 282;
    /// `YResolution`
    pub const Y_RESOLUTION: u16 = 283;
    /// `PlanarConfiguration`
    pub const PLANAR_CONFIGURATION: u16 = 284;
    /// `ResolutionUnit`
    pub const RESOLUTION_UNIT: u16 = 296;
    /// `Software`
    pub const SOFTWARE: u16 = 305;
    /// `TileWidth`
    pub const TILE_WIDTH: u16 = 322;
    /// `TileLength`
    pub const TILE_LENGTH: u16 = 323;
    /// `TileOffsets`
    pub const TILE_OFFSETS: u16 = 324;
    /// `TileByteCounts`
    pub const TILE_BYTE_COUNTS: u16 = 325;
    /// `SubIFDs`
    pub const SUB_IFDS: u16 = 330;
    /// `SampleFormat`
    pub const SAMPLE_FORMAT: u16 = 339;
}

/// The `NewSubfileType` of a reduced resolution page.
pub const SUBFILE_REDUCED_IMAGE: u32 = 1;

/// The `ResolutionUnit` for centimeters.
pub const RESOLUTION_UNIT_CENTIMETER: u16 = 3;

const BIGTIFF_VERSION: u16 = 43;
const BIGTIFF_HEADER_LEN: u64 = 16;
const FIRST_IFD_POINTER: u64 = 8;
const IFD_ENTRY_LEN: u64 = 20;

/// The compression of image tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum TileCompression {
    /// Uncompressed tiles.
    None,
    /// Adobe deflate (zlib) compressed tiles.
    Deflate {
        /// The compression level, `0..=9`.
        level: u32,
    },
    /// Zstandard compressed tiles.
    Zstd {
        /// The compression level, `-7..=22`.
        level: i32,
    },
    /// JPEG 2000 compressed tiles.
    #[cfg(feature = "jpeg2000")]
    Jpeg2000 {
        /// The target compression ratio, `1..=1000`. A ratio of 1 is lossless.
        ratio: u16,
    },
}

/// The JPEG 2000 compression ratio used by default.
pub const DEFAULT_JPEG2000_RATIO: u16 = 10;

impl Default for TileCompression {
    #[cfg(feature = "jpeg2000")]
    fn default() -> Self {
        Self::Jpeg2000 {
            ratio: DEFAULT_JPEG2000_RATIO,
        }
    }

    #[cfg(not(feature = "jpeg2000"))]
    fn default() -> Self {
        Self::Deflate { level: 6 }
    }
}

impl TileCompression {
    /// The value of the `Compression` tag.
    #[must_use]
    pub const fn tag_value(&self) -> u16 {
        match self {
            Self::None => 1,
            Self::Deflate { .. } => 8,
            Self::Zstd { .. } => 50000,
            #[cfg(feature = "jpeg2000")]
            Self::Jpeg2000 { .. } => 34712,
        }
    }

    /// Validate the compression level.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if the level is out of range.
    pub fn validate(&self) -> Result<(), ExplorerError> {
        match *self {
            Self::Deflate { level } if level > 9 => Err(ExplorerError::configuration(format!(
                "deflate tile compression level {level} is not in 0..=9"
            ))),
            Self::Zstd { level } if !(-7..=22).contains(&level) => {
                Err(ExplorerError::configuration(format!(
                    "zstd tile compression level {level} is not in -7..=22"
                )))
            }
            #[cfg(feature = "jpeg2000")]
            Self::Jpeg2000 { ratio } if !(1..=1000).contains(&ratio) => {
                Err(ExplorerError::configuration(format!(
                    "jpeg2000 tile compression ratio {ratio} is not in 1..=1000"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Compress a square tile of `tile_width` rows of `tile_width` samples.
    ///
    /// # Errors
    /// Returns an IO error if compression fails.
    pub fn compress(&self, tile: &[u8], tile_width: usize) -> Result<Vec<u8>, std::io::Error> {
        match *self {
            Self::None => Ok(tile.to_vec()),
            Self::Deflate { level } => {
                let mut encoder = ZlibEncoder::new(Cursor::new(tile), flate2::Compression::new(level));
                let mut out: Vec<u8> = Vec::new();
                encoder.read_to_end(&mut out)?;
                Ok(out)
            }
            Self::Zstd { level } => zstd::encode_all(Cursor::new(tile), level),
            #[cfg(feature = "jpeg2000")]
            Self::Jpeg2000 { ratio } => {
                super::jpeg2000::encode_j2k(tile, tile_width, tile_width, ratio)
            }
        }
    }
}

/// The value of an IFD entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagValue {
    /// `SHORT` values.
    Short(Vec<u16>),
    /// `LONG` values.
    Long(Vec<u32>),
    /// `RATIONAL` values, as `(numerator, denominator)`.
    Rational(Vec<(u32, u32)>),
    /// An `ASCII` string, written NUL-terminated.
    Ascii(String),
    /// `LONG8` values.
    Long8(Vec<u64>),
    /// `IFD8` values.
    Ifd8(Vec<u64>),
}

impl TagValue {
    /// The TIFF field type.
    #[must_use]
    pub const fn field_type(&self) -> u16 {
        match self {
            Self::Ascii(_) => 2,
            Self::Short(_) => 3,
            Self::Long(_) => 4,
            Self::Rational(_) => 5,
            Self::Long8(_) => 16,
            Self::Ifd8(_) => 18,
        }
    }

    /// The number of values.
    #[must_use]
    pub fn count(&self) -> u64 {
        let count = match self {
            Self::Ascii(value) => value.len() + 1,
            Self::Short(values) => values.len(),
            Self::Long(values) => values.len(),
            Self::Rational(values) => values.len(),
            Self::Long8(values) | Self::Ifd8(values) => values.len(),
        };
        count as u64
    }

    /// The little-endian encoded values.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ascii(value) => value.bytes().chain(std::iter::once(0)).collect(),
            Self::Short(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            Self::Long(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            Self::Rational(values) => values
                .iter()
                .flat_map(|(numerator, denominator)| {
                    numerator.to_le_bytes().into_iter().chain(denominator.to_le_bytes())
                })
                .collect(),
            Self::Long8(values) | Self::Ifd8(values) => {
                values.iter().flat_map(|v| v.to_le_bytes()).collect()
            }
        }
    }
}

/// Where an IFD was written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IfdLocation {
    offset: u64,
    next_ifd_pointer: u64,
    value_positions: Vec<(u16, u64)>,
}

impl IfdLocation {
    /// The offset of the IFD.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The position of the next IFD offset of this IFD.
    #[must_use]
    pub fn next_ifd_pointer(&self) -> u64 {
        self.next_ifd_pointer
    }

    /// The position of the values of `tag`, inline or out of line.
    #[must_use]
    pub fn value_position(&self, tag: u16) -> Option<u64> {
        self.value_positions
            .iter()
            .find(|(entry_tag, _)| *entry_tag == tag)
            .map(|(_, position)| *position)
    }
}

/// A sequential little-endian BigTIFF writer.
#[derive(Debug)]
pub struct BigTiffWriter<W: Write + Seek> {
    writer: W,
    position: u64,
    chain_pointer: u64,
}

impl<W: Write + Seek> BigTiffWriter<W> {
    /// Write the BigTIFF header to `writer`, which must be empty.
    ///
    /// # Errors
    /// Returns an IO error if the header cannot be written.
    pub fn new(mut writer: W) -> Result<Self, std::io::Error> {
        writer.write_all(b"II")?;
        writer.write_all(&BIGTIFF_VERSION.to_le_bytes())?;
        writer.write_all(&8u16.to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;
        Ok(Self {
            writer,
            position: BIGTIFF_HEADER_LEN,
            chain_pointer: FIRST_IFD_POINTER,
        })
    }

    /// The number of bytes written.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), std::io::Error> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn align(&mut self, alignment: u64) -> Result<(), std::io::Error> {
        let padding = self.position.next_multiple_of(alignment) - self.position;
        if padding > 0 {
            self.write_all(&vec![0; usize::try_from(padding).unwrap_or_default()])?;
        }
        Ok(())
    }

    /// Append encoded tile bytes, returning their offset.
    ///
    /// # Errors
    /// Returns an IO error if the bytes cannot be written.
    pub fn write_tile(&mut self, bytes: &[u8]) -> Result<u64, std::io::Error> {
        let offset = self.position;
        self.write_all(bytes)?;
        Ok(offset)
    }

    /// Write an IFD with `entries`, which are sorted by tag.
    ///
    /// Values that do not fit in an entry are written before the IFD.
    /// The IFD is not linked to any chain, see [`link`](BigTiffWriter::link).
    ///
    /// # Errors
    /// Returns an IO error if the IFD cannot be written.
    pub fn write_ifd(
        &mut self,
        mut entries: Vec<(u16, TagValue)>,
    ) -> Result<IfdLocation, std::io::Error> {
        entries.sort_by_key(|(tag, _)| *tag);

        let mut encoded = Vec::with_capacity(entries.len());
        for (tag, value) in &entries {
            let bytes = value.to_le_bytes();
            let out_of_line = if bytes.len() > 8 {
                self.align(2)?;
                let offset = self.position;
                self.write_all(&bytes)?;
                Some(offset)
            } else {
                None
            };
            encoded.push((*tag, value, bytes, out_of_line));
        }

        self.align(8)?;
        let offset = self.position;
        let mut ifd = Vec::with_capacity(16 + encoded.len() * 20);
        ifd.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
        let mut value_positions = Vec::with_capacity(encoded.len());
        for (index, (tag, value, bytes, out_of_line)) in encoded.into_iter().enumerate() {
            ifd.extend_from_slice(&tag.to_le_bytes());
            ifd.extend_from_slice(&value.field_type().to_le_bytes());
            ifd.extend_from_slice(&value.count().to_le_bytes());
            if let Some(value_offset) = out_of_line {
                ifd.extend_from_slice(&value_offset.to_le_bytes());
                value_positions.push((tag, value_offset));
            } else {
                let mut inline = [0u8; 8];
                inline[..bytes.len()].copy_from_slice(&bytes);
                ifd.extend_from_slice(&inline);
                value_positions.push((tag, offset + 8 + index as u64 * IFD_ENTRY_LEN + 12));
            }
        }
        let next_ifd_pointer = offset + ifd.len() as u64;
        ifd.extend_from_slice(&0u64.to_le_bytes());
        self.write_all(&ifd)?;

        Ok(IfdLocation {
            offset,
            next_ifd_pointer,
            value_positions,
        })
    }

    /// Append the IFD at `location` to the main IFD chain.
    ///
    /// # Errors
    /// Returns an IO error if the previous link cannot be patched.
    pub fn link(&mut self, location: &IfdLocation) -> Result<(), std::io::Error> {
        self.patch_u64s(self.chain_pointer, &[location.offset])?;
        self.chain_pointer = location.next_ifd_pointer;
        Ok(())
    }

    /// Overwrite the values at `position` with `values`.
    ///
    /// # Errors
    /// Returns an IO error if seeking or writing fails.
    pub fn patch_u64s(&mut self, position: u64, values: &[u64]) -> Result<(), std::io::Error> {
        self.writer.seek(SeekFrom::Start(position))?;
        for value in values {
            self.writer.write_all(&value.to_le_bytes())?;
        }
        self.writer.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    ///
    /// # Errors
    /// Returns an IO error if flushing fails.
    pub fn finish(mut self) -> Result<W, std::io::Error> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// The best rational approximation of `value` with bounded numerator and denominator.
///
/// Returns [`None`] if `value` is not positive and finite or no bounded approximation exists.
#[must_use]
pub fn rational_approximation(
    value: f64,
    max_numerator: u64,
    max_denominator: u64,
) -> Option<(u64, u64)> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
    let mut x = value;
    for _ in 0..64 {
        let a = x.floor();
        #[allow(clippy::cast_precision_loss)]
        let limit = u64::MAX as f64;
        if a >= limit {
            break;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let a_int = a as u64;
        let p2 = a_int.checked_mul(p1).and_then(|v| v.checked_add(p0));
        let q2 = a_int.checked_mul(q1).and_then(|v| v.checked_add(q0));
        match (p2, q2) {
            (Some(p2), Some(q2)) if p2 <= max_numerator && q2 <= max_denominator => {
                (p0, q0, p1, q1) = (p1, q1, p2, q2);
            }
            _ => break,
        }
        let fraction = x - a;
        if fraction < 1e-9 {
            break;
        }
        x = 1.0 / fraction;
    }
    (p1 > 0 && q1 > 0).then_some((p1, q1))
}

/// The `XResolution`/`YResolution` of the base level, in pixels per centimeter.
///
/// The denominator leaves room for `n_subscales` doublings, so level `k` can use the same
/// numerator with the denominator shifted left by `k`.
///
/// # Errors
/// Returns [`ExplorerError::ConfigurationError`] if the resolution cannot be represented.
pub fn resolution_rational(pixel_size: f64, n_subscales: usize) -> Result<(u32, u32), ExplorerError> {
    let shift = u32::try_from(n_subscales)
        .ok()
        .filter(|shift| *shift < 32)
        .ok_or_else(|| ExplorerError::configuration(format!("{n_subscales} subscales is too many")))?;
    let max_denominator = u64::from(u32::MAX >> shift);
    rational_approximation(1e4 / pixel_size, u64::from(u32::MAX), max_denominator)
        .and_then(|(numerator, denominator)| {
            Some((u32::try_from(numerator).ok()?, u32::try_from(denominator).ok()?))
        })
        .ok_or_else(|| {
            ExplorerError::configuration(format!(
                "pixel size {pixel_size} cannot be stored as a TIFF resolution"
            ))
        })
}
