use std::ffi::OsString;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::tiff_writer::{
    resolution_rational, tags, BigTiffWriter, TagValue, TileCompression,
    RESOLUTION_UNIT_CENTIMETER, SUBFILE_REDUCED_IMAGE,
};
use super::{assign_channel_colors, ome_xml, ImagePyramid, StreamingPolicy, TileStreamer};
use crate::ExplorerError;

/// The granularity of the tile width.
pub const TILE_WIDTH_MULTIPLE: usize = 16;

/// Image write options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageWriteOptions {
    tile_width: usize,
    pixel_size: f64,
    streaming_policy: StreamingPolicy,
    compression: TileCompression,
}

impl Default for ImageWriteOptions {
    fn default() -> Self {
        Self {
            tile_width: 1024,
            pixel_size: 0.2125,
            streaming_policy: StreamingPolicy::default(),
            compression: TileCompression::default(),
        }
    }
}

impl ImageWriteOptions {
    /// Return the tile width.
    #[must_use]
    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    /// Set the tile width, a positive multiple of 16.
    #[must_use]
    pub fn with_tile_width(mut self, tile_width: usize) -> Self {
        self.tile_width = tile_width;
        self
    }

    /// Set the tile width, a positive multiple of 16.
    pub fn set_tile_width(&mut self, tile_width: usize) -> &mut Self {
        self.tile_width = tile_width;
        self
    }

    /// Return the physical size of a base level pixel in microns.
    #[must_use]
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size
    }

    /// Set the physical size of a base level pixel in microns.
    #[must_use]
    pub fn with_pixel_size(mut self, pixel_size: f64) -> Self {
        self.pixel_size = pixel_size;
        self
    }

    /// Set the physical size of a base level pixel in microns.
    pub fn set_pixel_size(&mut self, pixel_size: f64) -> &mut Self {
        self.pixel_size = pixel_size;
        self
    }

    /// Return the streaming policy.
    #[must_use]
    pub fn streaming_policy(&self) -> &StreamingPolicy {
        &self.streaming_policy
    }

    /// Set the streaming policy.
    #[must_use]
    pub fn with_streaming_policy(mut self, streaming_policy: StreamingPolicy) -> Self {
        self.streaming_policy = streaming_policy;
        self
    }

    /// Set the streaming policy.
    pub fn set_streaming_policy(&mut self, streaming_policy: StreamingPolicy) -> &mut Self {
        self.streaming_policy = streaming_policy;
        self
    }

    /// Return the tile compression.
    #[must_use]
    pub fn compression(&self) -> TileCompression {
        self.compression
    }

    /// Set the tile compression.
    #[must_use]
    pub fn with_compression(mut self, compression: TileCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the tile compression.
    pub fn set_compression(&mut self, compression: TileCompression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if
    ///  - the tile width is not a positive multiple of 16,
    ///  - the pixel size is not positive and finite, or
    ///  - the compression level is out of range.
    pub fn validate(&self) -> Result<(), ExplorerError> {
        if self.tile_width == 0 || self.tile_width % TILE_WIDTH_MULTIPLE != 0 {
            return Err(ExplorerError::configuration(format!(
                "tile width {} is not a positive multiple of {TILE_WIDTH_MULTIPLE}",
                self.tile_width
            )));
        }
        if !self.pixel_size.is_finite() || self.pixel_size <= 0.0 {
            return Err(ExplorerError::configuration(format!(
                "pixel size {} is not positive",
                self.pixel_size
            )));
        }
        self.compression.validate()
    }
}

/// Removes a partially written file unless it is committed.
struct PartialFile {
    partial: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(destination: &Path) -> Result<Self, ExplorerError> {
        let file_name = destination.file_name().ok_or_else(|| {
            ExplorerError::configuration(format!("{} is not a file path", destination.display()))
        })?;
        let mut partial = OsString::from(".");
        partial.push(file_name);
        partial.push(".partial");
        Ok(Self {
            partial: destination.with_file_name(partial),
            destination: destination.to_path_buf(),
            committed: false,
        })
    }

    fn commit(mut self) -> Result<(), std::io::Error> {
        std::fs::rename(&self.partial, &self.destination)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed && self.partial.exists() {
            log::warn!("Discarding unfinished image {}", self.destination.display());
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32, ExplorerError> {
    u32::try_from(value)
        .map_err(|_| ExplorerError::configuration(format!("{what} {value} does not fit a TIFF field")))
}

/// Copy `tile` into the top left of a zeroed `tile_width` square.
fn pad_tile(tile: &Array2<u8>, tile_width: usize) -> Vec<u8> {
    let (rows, cols) = tile.dim();
    if rows == tile_width && cols == tile_width {
        return tile.iter().copied().collect();
    }
    let mut padded = vec![0; tile_width * tile_width];
    for (row, samples) in tile.outer_iter().enumerate() {
        let start = row * tile_width;
        padded[start..start + cols]
            .iter_mut()
            .zip(samples)
            .for_each(|(padded, sample)| *padded = *sample);
    }
    padded
}

/// Write `pyramid` as a tiled, pyramidal, OME-described BigTIFF at `path`.
///
/// The main page chain holds one full resolution page per channel. Each of those pages lists the
/// reduced resolution pages of its channel in `SubIFDs`, largest first. Every page is tiled with
/// `tile_width` square tiles, zero padded at the right and bottom edges.
///
/// The file is written next to `path` and renamed into place once complete.
///
/// # Errors
/// Returns an [`ExplorerError`] if
///  - the options are invalid,
///  - a level has samples that are not unsigned integers ([`ExplorerError::UnsupportedSampleType`]),
///  - more channels need a color than the palette provides, or
///  - there is an IO error.
///
/// Validation happens before the file is created.
pub fn write_image<P: AsRef<Path>>(
    path: P,
    pyramid: &ImagePyramid,
    options: &ImageWriteOptions,
) -> Result<(), ExplorerError> {
    options.validate()?;
    for level in pyramid.levels() {
        let data_type = level.data_type();
        if !data_type.is_unsigned_integer() {
            return Err(ExplorerError::UnsupportedSampleType { data_type });
        }
    }
    let tile_width = options.tile_width();
    let n_subscales = pyramid.n_subscales();
    let (numerator, denominator) = resolution_rational(options.pixel_size(), n_subscales)?;
    let labels = assign_channel_colors(pyramid.channel_names())?;
    let description = ome_xml(&labels, pyramid.shape(), options.pixel_size());
    let compression = options.compression();
    let channels = pyramid.shape()[0];

    let partial = PartialFile::new(path.as_ref())?;
    let mut tiff = BigTiffWriter::new(BufWriter::new(File::create(&partial.partial)?))?;
    let mut streamer = TileStreamer::new(*options.streaming_policy(), tile_width)?;
    let mut sub_ifd_positions = Vec::with_capacity(channels);
    let mut sub_ifd_offsets = vec![Vec::with_capacity(n_subscales); channels];

    log::info!(
        "Writing multiscale image with procedure={}",
        options.streaming_policy().procedure()
    );
    for (level_index, level) in pyramid.levels().iter().enumerate() {
        let [_, height, width] = level.shape();
        log::info!("   > Image of shape {:?}", level.shape());
        let mut tiles = streamer.begin_level(level.as_ref())?;
        let tiles_per_channel = tiles.grid().tiles_per_channel();
        for channel in 0..channels {
            let mut offsets = Vec::with_capacity(tiles_per_channel);
            let mut byte_counts = Vec::with_capacity(tiles_per_channel);
            for _ in 0..tiles_per_channel {
                let tile = tiles.next().ok_or_else(|| {
                    ExplorerError::configuration(format!("level {level_index} ended early"))
                })??;
                let encoded = compression.compress(&pad_tile(&tile.data, tile_width), tile_width)?;
                offsets.push(tiff.write_tile(&encoded)?);
                byte_counts.push(encoded.len() as u64);
            }

            let mut entries = vec![
                (
                    tags::NEW_SUBFILE_TYPE,
                    TagValue::Long(vec![if level_index == 0 { 0 } else { SUBFILE_REDUCED_IMAGE }]),
                ),
                (tags::IMAGE_WIDTH, TagValue::Long(vec![to_u32(width, "image width")?])),
                (tags::IMAGE_LENGTH, TagValue::Long(vec![to_u32(height, "image height")?])),
                (tags::BITS_PER_SAMPLE, TagValue::Short(vec![8])),
                (tags::COMPRESSION, TagValue::Short(vec![compression.tag_value()])),
                (tags::PHOTOMETRIC_INTERPRETATION, TagValue::Short(vec![1])),
                (tags::SAMPLES_PER_PIXEL, TagValue::Short(vec![1])),
                (
                    tags::X_RESOLUTION,
                    TagValue::Rational(vec![(numerator, denominator << level_index)]),
                ),
                (
                    tags::Y_RESOLUTION,
                    TagValue::Rational(vec![(numerator, denominator << level_index)]),
                ),
                (tags::PLANAR_CONFIGURATION, TagValue::Short(vec![1])),
                (tags::RESOLUTION_UNIT, TagValue::Short(vec![RESOLUTION_UNIT_CENTIMETER])),
                (
                    tags::SOFTWARE,
                    TagValue::Ascii(env!("CARGO_PKG_NAME").to_string()),
                ),
                (tags::TILE_WIDTH, TagValue::Long(vec![to_u32(tile_width, "tile width")?])),
                (tags::TILE_LENGTH, TagValue::Long(vec![to_u32(tile_width, "tile width")?])),
                (tags::TILE_OFFSETS, TagValue::Long8(offsets)),
                (tags::TILE_BYTE_COUNTS, TagValue::Long8(byte_counts)),
                (tags::SAMPLE_FORMAT, TagValue::Short(vec![1])),
            ];
            if level_index == 0 && channel == 0 {
                entries.push((tags::IMAGE_DESCRIPTION, TagValue::Ascii(description.clone())));
            }
            if level_index == 0 && n_subscales > 0 {
                entries.push((tags::SUB_IFDS, TagValue::Ifd8(vec![0; n_subscales])));
            }

            let location = tiff.write_ifd(entries)?;
            if level_index == 0 {
                tiff.link(&location)?;
                sub_ifd_positions.push(location.value_position(tags::SUB_IFDS));
            } else {
                sub_ifd_offsets[channel].push(location.offset());
            }
        }
        drop(tiles);
        streamer.finish_level();
    }

    for (position, offsets) in sub_ifd_positions.into_iter().zip(&sub_ifd_offsets) {
        if let Some(position) = position {
            tiff.patch_u64s(position, offsets)?;
        }
    }
    tiff.finish()?.into_inner().map_err(std::io::IntoInnerError::into_error)?.sync_all()?;
    partial.commit()?;
    log::info!("Wrote image {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn image_write_options_validate() {
        assert!(ImageWriteOptions::default().validate().is_ok());
        assert!(ImageWriteOptions::default().with_tile_width(0).validate().is_err());
        assert!(ImageWriteOptions::default().with_tile_width(100).validate().is_err());
        assert!(ImageWriteOptions::default().with_pixel_size(0.0).validate().is_err());
        assert!(ImageWriteOptions::default()
            .with_compression(TileCompression::Zstd { level: 30 })
            .validate()
            .is_err());
    }

    #[test]
    fn image_write_options_serde() {
        let options: ImageWriteOptions =
            serde_json::from_str(r#"{"tile_width": 512, "compression": {"codec": "none"}}"#).unwrap();
        assert_eq!(options.tile_width(), 512);
        assert_eq!(options.compression(), TileCompression::None);
        assert!((options.pixel_size() - 0.2125).abs() < f64::EPSILON);
    }

    #[test]
    fn pad_tile_edges() {
        let tile = array![[1u8, 2], [3, 4], [5, 6]];
        let padded = pad_tile(&tile, 4);
        assert_eq!(
            padded,
            [1, 2, 0, 0, 3, 4, 0, 0, 5, 6, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(pad_tile(&array![[9u8]], 1), [9]);
    }

    #[test]
    fn partial_file_discarded() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let destination = dir.path().join("morphology.ome.tif");
        {
            let partial = PartialFile::new(&destination)?;
            std::fs::write(&partial.partial, b"II")?;
        }
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        let partial = PartialFile::new(&destination)?;
        std::fs::write(&partial.partial, b"II")?;
        partial.commit()?;
        assert!(destination.exists());
        Ok(())
    }
}
