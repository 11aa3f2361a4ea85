//! Bundle configuration.
//!
//! An [`ExplorerConfig`] gathers every option of [`ExplorerBundle::write`](crate::explorer::ExplorerBundle::write)
//! and can be deserialised from JSON. Missing fields take their defaults:
//!
//! ```
//! # use explorer_bundle::config::ExplorerConfig;
//! let config: ExplorerConfig = serde_json::from_str(r#"{"pixel_size": 0.5, "mode": "-i"}"#)?;
//! assert_eq!(config.tile_width(), 1024);
//! assert!(config.validate().is_ok());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::image::{ImageWriteOptions, StreamingPolicy, TileCompression, GIB};
use crate::shapes::{PolygonWriteOptions, PIXEL_SCALE};
use crate::table::TableWriteOptions;
use crate::zarr::ChunkCompressor;
use crate::ExplorerError;

/// The files of an explorer bundle, selectable with a mode string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum BundleFile {
    /// The pyramid image, `i`.
    #[display("image")]
    Image,
    /// The cell boundaries, `b`.
    #[display("boundaries")]
    Boundaries,
    /// The cell by feature counts, `c`.
    #[display("counts")]
    Counts,
    /// The cell categories, `o`.
    #[display("observations")]
    Observations,
    /// The experiment descriptor, `m`.
    #[display("metadata")]
    Metadata,
}

impl BundleFile {
    /// The mode letter of the file.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::Image => 'i',
            Self::Boundaries => 'b',
            Self::Counts => 'c',
            Self::Observations => 'o',
            Self::Metadata => 'm',
        }
    }
}

/// Parsed file selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FileSelection {
    /// Write every file.
    #[default]
    All,
    /// Write only the files with these letters.
    Include(String),
    /// Write every file except those with these letters.
    Exclude(String),
}

impl FileSelection {
    /// Parse a mode string.
    ///
    /// `None` selects every file, `"+cm"` only the counts and metadata, `"-ib"` everything but the
    /// image and boundaries.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if the mode does not start with `+` or `-`.
    pub fn parse(mode: Option<&str>) -> Result<Self, ExplorerError> {
        let Some(mode) = mode else {
            return Ok(Self::All);
        };
        let mut chars = mode.chars();
        match chars.next() {
            Some('+') => Ok(Self::Include(chars.as_str().to_string())),
            Some('-') => Ok(Self::Exclude(chars.as_str().to_string())),
            _ => Err(ExplorerError::configuration(format!(
                "mode {mode:?} should start with '+' or '-'"
            ))),
        }
    }

    /// Returns true if `file` is selected.
    #[must_use]
    pub fn selects(&self, file: BundleFile) -> bool {
        match self {
            Self::All => true,
            Self::Include(letters) => letters.contains(file.letter()),
            Self::Exclude(letters) => !letters.contains(file.letter()),
        }
    }
}

/// Explorer bundle configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pixel_size: f64,
    tile_width: usize,
    n_subscales: usize,
    polygon_max_vertices: usize,
    always_stream: bool,
    ram_threshold_gb: Option<u64>,
    compressor: Option<ChunkCompressor>,
    tile_compression: TileCompression,
    mode: Option<String>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            pixel_size: 0.2125,
            tile_width: 1024,
            n_subscales: 5,
            polygon_max_vertices: 13,
            always_stream: false,
            ram_threshold_gb: Some(4),
            compressor: None,
            tile_compression: TileCompression::default(),
            mode: None,
        }
    }
}

macro_rules! config_option {
    ($field:ident, $with:ident, $set:ident, $ty:ty, $doc:literal) => {
        #[doc = concat!("Return ", $doc, ".")]
        #[must_use]
        pub fn $field(&self) -> $ty {
            self.$field
        }

        #[doc = concat!("Set ", $doc, ".")]
        #[must_use]
        pub fn $with(mut self, $field: $ty) -> Self {
            self.$field = $field;
            self
        }

        #[doc = concat!("Set ", $doc, ".")]
        pub fn $set(&mut self, $field: $ty) -> &mut Self {
            self.$field = $field;
            self
        }
    };
}

impl ExplorerConfig {
    config_option!(
        pixel_size,
        with_pixel_size,
        set_pixel_size,
        f64,
        "the physical size of a base level pixel in microns"
    );
    config_option!(
        tile_width,
        with_tile_width,
        set_tile_width,
        usize,
        "the pyramid tile width"
    );
    config_option!(
        n_subscales,
        with_n_subscales,
        set_n_subscales,
        usize,
        "the number of reduced levels built from a full resolution image"
    );
    config_option!(
        polygon_max_vertices,
        with_polygon_max_vertices,
        set_polygon_max_vertices,
        usize,
        "the number of vertices of every cell polygon"
    );
    config_option!(
        always_stream,
        with_always_stream,
        set_always_stream,
        bool,
        "whether every pyramid level is streamed"
    );
    config_option!(
        ram_threshold_gb,
        with_ram_threshold_gb,
        set_ram_threshold_gb,
        Option<u64>,
        "the memory budget in GiB for holding a pyramid level in memory"
    );
    config_option!(
        compressor,
        with_compressor,
        set_compressor,
        Option<ChunkCompressor>,
        "the chunk compressor of the Zarr containers"
    );
    config_option!(
        tile_compression,
        with_tile_compression,
        set_tile_compression,
        TileCompression,
        "the pyramid tile compression"
    );

    /// Return the file selection mode.
    #[must_use]
    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    /// Set the file selection mode, see [`FileSelection::parse`].
    #[must_use]
    pub fn with_mode(mut self, mode: Option<String>) -> Self {
        self.mode = mode;
        self
    }

    /// Set the file selection mode, see [`FileSelection::parse`].
    pub fn set_mode(&mut self, mode: Option<String>) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Parse the file selection mode.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if the mode is invalid.
    pub fn file_selection(&self) -> Result<FileSelection, ExplorerError> {
        FileSelection::parse(self.mode.as_deref())
    }

    /// Image write options derived from the configuration.
    #[must_use]
    pub fn image_write_options(&self) -> ImageWriteOptions {
        let policy = StreamingPolicy::new(
            self.ram_threshold_gb
                .map(|gb| gb.saturating_mul(GIB)),
        )
        .with_always_stream(self.always_stream);
        ImageWriteOptions::default()
            .with_tile_width(self.tile_width)
            .with_pixel_size(self.pixel_size)
            .with_streaming_policy(policy)
            .with_compression(self.tile_compression)
    }

    /// Polygon write options derived from the configuration.
    #[must_use]
    pub fn polygon_write_options(&self) -> PolygonWriteOptions {
        PolygonWriteOptions::default()
            .with_n_vertices(self.polygon_max_vertices)
            .with_pixel_scale(PIXEL_SCALE)
            .with_compressor(self.compressor)
    }

    /// Table write options derived from the configuration.
    #[must_use]
    pub fn table_write_options(&self) -> TableWriteOptions {
        TableWriteOptions::default().with_compressor(self.compressor)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if any option is invalid.
    pub fn validate(&self) -> Result<(), ExplorerError> {
        self.file_selection()?;
        self.image_write_options().validate()?;
        self.polygon_write_options().validate()?;
        self.table_write_options().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_selection_parse() {
        let all = FileSelection::parse(None).unwrap();
        assert!(all.selects(BundleFile::Image));

        let include = FileSelection::parse(Some("+cm")).unwrap();
        assert!(include.selects(BundleFile::Counts));
        assert!(include.selects(BundleFile::Metadata));
        assert!(!include.selects(BundleFile::Image));

        let exclude = FileSelection::parse(Some("-ib")).unwrap();
        assert!(!exclude.selects(BundleFile::Image));
        assert!(!exclude.selects(BundleFile::Boundaries));
        assert!(exclude.selects(BundleFile::Observations));

        assert!(FileSelection::parse(Some("ib")).is_err());
        assert!(FileSelection::parse(Some("")).is_err());
    }

    #[test]
    fn config_defaults() {
        let config = ExplorerConfig::default();
        assert!(config.validate().is_ok());
        let image = config.image_write_options();
        assert_eq!(image.tile_width(), 1024);
        assert_eq!(image.streaming_policy().memory_budget(), Some(4 * GIB));
        assert!(!image.streaming_policy().always_stream());
        assert_eq!(config.polygon_write_options().n_vertices(), 13);
    }

    #[test]
    fn config_json() {
        let config: ExplorerConfig = serde_json::from_str(
            r#"{
                "tile_width": 512,
                "ram_threshold_gb": null,
                "compressor": {"id": "zlib", "level": 5},
                "tile_compression": {"codec": "none"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.tile_width(), 512);
        assert_eq!(config.image_write_options().streaming_policy().memory_budget(), None);
        assert_eq!(config.compressor(), Some(ChunkCompressor::Zlib { level: 5 }));
        assert_eq!(config.tile_compression(), TileCompression::None);
        assert_eq!(config.n_subscales(), 5);
    }

    #[test]
    fn config_invalid() {
        assert!(ExplorerConfig::default().with_tile_width(1000).validate().is_err());
        assert!(ExplorerConfig::default().with_pixel_size(-1.0).validate().is_err());
        assert!(ExplorerConfig::default()
            .with_polygon_max_vertices(2)
            .validate()
            .is_err());
        assert!(ExplorerConfig::default()
            .with_mode(Some("ib".to_string()))
            .validate()
            .is_err());
        assert!(ExplorerConfig::default()
            .with_compressor(Some(ChunkCompressor::Zlib { level: 12 }))
            .validate()
            .is_err());
    }
}
