//! Multiscale image writing.
//!
//! An [`ImagePyramid`] of `(c, y, x)` levels is written to a tiled, pyramidal BigTIFF with an
//! OME-XML description by [`write_image`]. Samples are rescaled to 8 bits with [`scale_dtype`];
//! only unsigned integer samples are supported.
//!
//! Levels are read through the [`LevelSource`] trait, implemented by the in-memory
//! [`SampleArray`]. The [`TileStreamer`] decides per level whether tiles are read one at a time
//! or sliced from a level held in memory, following a [`StreamingPolicy`].

mod channel_colors;
mod image_writer;
#[cfg(feature = "jpeg2000")]
mod jpeg2000;
mod ome_metadata;
mod pyramid;
mod sample;
mod sample_array;
pub mod tiff_writer;
mod tile_streamer;

pub use channel_colors::{
    assign_channel_colors, is_wavelength_name, known_channel_color, ChannelLabel, PaletteCursor,
    COLOR_PALETTE, KNOWN_CHANNELS, NUCLEUS_COLOR,
};
pub use image_writer::{write_image, ImageWriteOptions, TILE_WIDTH_MULTIPLE};
pub use ome_metadata::{escape_xml, ome_xml};
pub use pyramid::ImagePyramid;
pub use sample::{scale_dtype, Sample, SampleType, UnsignedSample};
pub use sample_array::{downsample_mean, LevelSource, SampleArray};
pub use tiff_writer::TileCompression;
pub use tile_streamer::{
    level_size_bytes, LevelResidency, LevelTiles, MaterializedTiles, StreamedTiles,
    StreamerState, StreamingPolicy, Tile, TileGrid, TileStreamer, GIB,
};
