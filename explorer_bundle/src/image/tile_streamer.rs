//! Tile streaming.
//!
//! Pyramid levels are emitted as square tiles in raster order: channel, then tile row, then
//! tile column. A level is either streamed (each tile read from its [`LevelSource`] on demand) or
//! materialized (the whole level rescaled to 8 bits once, then sliced into tiles). The
//! [`StreamingPolicy`] decides which from the level size and a memory budget.
//!
//! When a level is materialized and the previous level was too, the previous buffer can be
//! resized by picking every second sample instead of reading the source again.

use std::ops::Range;

use ndarray::{s, Array2, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use super::LevelSource;
use crate::ExplorerError;

/// One gibibyte.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// How a level is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelResidency {
    /// Tiles are read from the source one at a time.
    Stream,
    /// The whole level is held in memory.
    Materialize,
}

/// Decides whether a level is streamed or materialized.
///
/// With [`reuse_materialized`](Self::reuse_materialized) enabled (the default), a materialized
/// level whose predecessor was also materialized at twice its size is built by nearest-neighbour
/// resizing of that predecessor. The [`LevelSource`] supplied for such a level is not read, so
/// sub-levels computed by the caller are ignored. Disable reuse to read every level from its own
/// source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingPolicy {
    always_stream: bool,
    memory_budget: Option<u64>,
    reuse_materialized: bool,
}

impl Default for StreamingPolicy {
    fn default() -> Self {
        Self {
            always_stream: false,
            memory_budget: Some(4 * GIB),
            reuse_materialized: true,
        }
    }
}

impl StreamingPolicy {
    /// Create a policy that materializes levels that fit within `memory_budget` bytes.
    ///
    /// A [`None`] budget streams every level.
    #[must_use]
    pub fn new(memory_budget: Option<u64>) -> Self {
        Self {
            memory_budget,
            ..Self::default()
        }
    }

    /// Return whether every level is streamed regardless of the budget.
    #[must_use]
    pub fn always_stream(&self) -> bool {
        self.always_stream
    }

    /// Set whether every level is streamed regardless of the budget.
    #[must_use]
    pub fn with_always_stream(mut self, always_stream: bool) -> Self {
        self.always_stream = always_stream;
        self
    }

    /// Set whether every level is streamed regardless of the budget.
    pub fn set_always_stream(&mut self, always_stream: bool) -> &mut Self {
        self.always_stream = always_stream;
        self
    }

    /// Return the memory budget in bytes.
    #[must_use]
    pub fn memory_budget(&self) -> Option<u64> {
        self.memory_budget
    }

    /// Set the memory budget in bytes.
    #[must_use]
    pub fn with_memory_budget(mut self, memory_budget: Option<u64>) -> Self {
        self.memory_budget = memory_budget;
        self
    }

    /// Set the memory budget in bytes.
    pub fn set_memory_budget(&mut self, memory_budget: Option<u64>) -> &mut Self {
        self.memory_budget = memory_budget;
        self
    }

    /// Return whether a materialized level is resized to build the next one.
    #[must_use]
    pub fn reuse_materialized(&self) -> bool {
        self.reuse_materialized
    }

    /// Set whether a materialized level is resized to build the next one.
    #[must_use]
    pub fn with_reuse_materialized(mut self, reuse_materialized: bool) -> Self {
        self.reuse_materialized = reuse_materialized;
        self
    }

    /// Decide how a level of `shape` with samples of `sample_size` bytes is read.
    ///
    /// A level is materialized only if it is not forced to stream, a budget is set, and
    /// `c * y * x * sample_size` does not exceed the budget.
    #[must_use]
    pub fn residency(&self, shape: [usize; 3], sample_size: usize) -> LevelResidency {
        match self.memory_budget {
            Some(budget) if !self.always_stream && level_size_bytes(shape, sample_size) <= budget => {
                LevelResidency::Materialize
            }
            _ => LevelResidency::Stream,
        }
    }

    /// A short description of the policy for logging.
    #[must_use]
    pub fn procedure(&self) -> &'static str {
        match (self.always_stream, self.memory_budget) {
            (true, _) | (false, None) => "tile-by-tile",
            (false, Some(_)) => "in-memory when the level fits the memory budget",
        }
    }
}

/// The size in bytes of a level of `shape` with samples of `sample_size` bytes.
#[must_use]
pub fn level_size_bytes(shape: [usize; 3], sample_size: usize) -> u64 {
    shape
        .iter()
        .chain(std::iter::once(&sample_size.max(1)))
        .fold(1u64, |size, &len| size.saturating_mul(len as u64))
}

/// The square tiles covering a `(c, y, x)` level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    shape: [usize; 3],
    tile_width: usize,
}

impl TileGrid {
    /// Create a tile grid.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if `tile_width` is zero.
    pub fn new(shape: [usize; 3], tile_width: usize) -> Result<Self, ExplorerError> {
        if tile_width == 0 {
            return Err(ExplorerError::configuration("tile width must be positive"));
        }
        Ok(Self { shape, tile_width })
    }

    /// The level shape.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// The tile width.
    #[must_use]
    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    /// The number of tile rows.
    #[must_use]
    pub fn tiles_y(&self) -> usize {
        self.shape[1].div_ceil(self.tile_width)
    }

    /// The number of tile columns.
    #[must_use]
    pub fn tiles_x(&self) -> usize {
        self.shape[2].div_ceil(self.tile_width)
    }

    /// The number of tiles of one channel.
    #[must_use]
    pub fn tiles_per_channel(&self) -> usize {
        self.tiles_y() * self.tiles_x()
    }

    /// The number of tiles of the level.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.shape[0] * self.tiles_per_channel()
    }

    /// The `(channel, tile_row, tile_col)` of the tile at raster position `index`.
    #[must_use]
    pub fn tile_position(&self, index: usize) -> (usize, usize, usize) {
        let per_channel = self.tiles_per_channel().max(1);
        let tiles_x = self.tiles_x().max(1);
        let within = index % per_channel;
        (index / per_channel, within / tiles_x, within % tiles_x)
    }

    /// The rows and columns covered by a tile, clipped to the level.
    #[must_use]
    pub fn tile_ranges(&self, tile_row: usize, tile_col: usize) -> (Range<usize>, Range<usize>) {
        let y = tile_row * self.tile_width;
        let x = tile_col * self.tile_width;
        (
            y..(y + self.tile_width).min(self.shape[1]),
            x..(x + self.tile_width).min(self.shape[2]),
        )
    }
}

/// An 8-bit tile clipped to the level extents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    /// The channel index.
    pub channel: usize,
    /// The tile row.
    pub tile_row: usize,
    /// The tile column.
    pub tile_col: usize,
    /// The samples, at most `tile_width` by `tile_width`.
    pub data: Array2<u8>,
}

/// Tiles read from a [`LevelSource`] one at a time.
pub struct StreamedTiles<'a> {
    source: &'a dyn LevelSource,
    grid: TileGrid,
    next: usize,
}

impl Iterator for StreamedTiles<'_> {
    type Item = Result<Tile, ExplorerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.grid.tile_count() {
            return None;
        }
        let (channel, tile_row, tile_col) = self.grid.tile_position(self.next);
        let (rows, cols) = self.grid.tile_ranges(tile_row, tile_col);
        self.next += 1;
        let tile = self
            .source
            .read_region(channel, rows, cols)
            .and_then(|region| region.to_u8())
            .map(|region| Tile {
                channel,
                tile_row,
                tile_col,
                data: region.index_axis_move(Axis(0), 0),
            });
        if tile.is_err() {
            self.next = self.grid.tile_count();
        }
        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.tile_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Tiles sliced from a materialized level.
pub struct MaterializedTiles<'a> {
    level: ArrayView3<'a, u8>,
    grid: TileGrid,
    next: usize,
}

impl Iterator for MaterializedTiles<'_> {
    type Item = Result<Tile, ExplorerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.grid.tile_count() {
            return None;
        }
        let (channel, tile_row, tile_col) = self.grid.tile_position(self.next);
        let (rows, cols) = self.grid.tile_ranges(tile_row, tile_col);
        self.next += 1;
        Some(Ok(Tile {
            channel,
            tile_row,
            tile_col,
            data: self.level.slice(s![channel, rows, cols]).to_owned(),
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.tile_count().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// The tiles of one level, in raster order.
pub enum LevelTiles<'a> {
    /// Tiles read on demand.
    Streamed(StreamedTiles<'a>),
    /// Tiles sliced from memory.
    Materialized(MaterializedTiles<'a>),
}

impl LevelTiles<'_> {
    /// How the level is read.
    #[must_use]
    pub fn residency(&self) -> LevelResidency {
        match self {
            Self::Streamed(_) => LevelResidency::Stream,
            Self::Materialized(_) => LevelResidency::Materialize,
        }
    }

    /// The tile grid of the level.
    #[must_use]
    pub fn grid(&self) -> &TileGrid {
        match self {
            Self::Streamed(tiles) => &tiles.grid,
            Self::Materialized(tiles) => &tiles.grid,
        }
    }
}

impl Iterator for LevelTiles<'_> {
    type Item = Result<Tile, ExplorerError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Streamed(tiles) => tiles.next(),
            Self::Materialized(tiles) => tiles.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Streamed(tiles) => tiles.size_hint(),
            Self::Materialized(tiles) => tiles.size_hint(),
        }
    }
}

/// The state of a [`TileStreamer`].
#[derive(Debug, Default)]
pub enum StreamerState {
    /// No level has been started.
    #[default]
    NotStarted,
    /// The current level is streamed.
    Streaming,
    /// The current level is held in memory.
    Materialized(Array3<u8>),
    /// The previous level is finished, and its buffer is kept if it was materialized.
    Done(Option<Array3<u8>>),
}

/// Emits the tiles of successive pyramid levels.
///
/// Call [`begin_level`](TileStreamer::begin_level) then [`finish_level`](TileStreamer::finish_level)
/// for every level, from the base level down.
#[derive(Debug)]
pub struct TileStreamer {
    policy: StreamingPolicy,
    tile_width: usize,
    state: StreamerState,
}

impl TileStreamer {
    /// Create a new tile streamer.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if `tile_width` is zero.
    pub fn new(policy: StreamingPolicy, tile_width: usize) -> Result<Self, ExplorerError> {
        if tile_width == 0 {
            return Err(ExplorerError::configuration("tile width must be positive"));
        }
        Ok(Self {
            policy,
            tile_width,
            state: StreamerState::NotStarted,
        })
    }

    /// The streamer state.
    #[must_use]
    pub fn state(&self) -> &StreamerState {
        &self.state
    }

    /// Start emitting the tiles of `source`.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if
    ///  - the samples of `source` are not unsigned integers,
    ///  - a level is already in progress, or
    ///  - the level is materialized and cannot be read.
    pub fn begin_level<'a>(
        &'a mut self,
        source: &'a dyn LevelSource,
    ) -> Result<LevelTiles<'a>, ExplorerError> {
        let data_type = source.data_type();
        if !data_type.is_unsigned_integer() {
            return Err(ExplorerError::UnsupportedSampleType { data_type });
        }
        let previous = match std::mem::take(&mut self.state) {
            StreamerState::NotStarted => None,
            StreamerState::Done(previous) => previous,
            state @ (StreamerState::Streaming | StreamerState::Materialized(_)) => {
                self.state = state;
                return Err(ExplorerError::configuration(
                    "the previous level has not been finished",
                ));
            }
        };
        let shape = source.shape();
        let grid = TileGrid::new(shape, self.tile_width)?;

        match self.policy.residency(shape, data_type.size()) {
            LevelResidency::Stream => {
                self.state = StreamerState::Streaming;
                Ok(LevelTiles::Streamed(StreamedTiles {
                    source,
                    grid,
                    next: 0,
                }))
            }
            LevelResidency::Materialize => {
                let previous = previous.filter(|previous| {
                    self.policy.reuse_materialized && is_half_of(previous.dim(), shape)
                });
                let level = if let Some(previous) = previous {
                    log::debug!("Resizing the previous level to shape {shape:?}");
                    resize_half_nearest(previous.view(), shape)
                } else {
                    log::info!("Loading image of shape {shape:?} in memory");
                    source.read_level_u8()?
                };
                let (c, y, x) = level.dim();
                if [c, y, x] != shape {
                    return Err(ExplorerError::configuration(format!(
                        "level source read {:?}, expected shape {shape:?}",
                        [c, y, x]
                    )));
                }
                self.state = StreamerState::Materialized(level);
                match &self.state {
                    StreamerState::Materialized(level) => {
                        Ok(LevelTiles::Materialized(MaterializedTiles {
                            level: level.view(),
                            grid,
                            next: 0,
                        }))
                    }
                    _ => Err(ExplorerError::configuration("level was not materialized")),
                }
            }
        }
    }

    /// Finish the current level, keeping its buffer if it was materialized.
    pub fn finish_level(&mut self) {
        self.state = match std::mem::take(&mut self.state) {
            StreamerState::Materialized(level) => StreamerState::Done(Some(level)),
            _ => StreamerState::Done(None),
        };
    }
}

/// Returns true if each spatial extent of `target` is half that of `previous`, rounded either way.
fn is_half_of(previous: (usize, usize, usize), target: [usize; 3]) -> bool {
    let (c, y, x) = previous;
    c == target[0]
        && (y / 2..=y.div_ceil(2)).contains(&target[1])
        && (x / 2..=x.div_ceil(2)).contains(&target[2])
}

/// Resize `previous` to `shape` by picking every second sample.
fn resize_half_nearest(previous: ArrayView3<'_, u8>, shape: [usize; 3]) -> Array3<u8> {
    let (_, h, w) = previous.dim();
    Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(c, y, x)| {
        previous[[c, (2 * y).min(h - 1), (2 * x).min(w - 1)]]
    })
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;
    use crate::image::SampleArray;

    fn image(shape: (usize, usize, usize)) -> SampleArray {
        SampleArray::from(Array3::from_shape_fn(shape, |(c, y, x)| {
            u16::try_from((c * 7_919 + y * 131 + x * 17) % 65_536).unwrap()
        }))
    }

    fn collect(streamer: &mut TileStreamer, source: &SampleArray) -> (LevelResidency, Vec<Tile>) {
        let tiles = streamer.begin_level(source).unwrap();
        let residency = tiles.residency();
        let tiles = tiles.collect::<Result<Vec<_>, _>>().unwrap();
        streamer.finish_level();
        (residency, tiles)
    }

    #[test]
    fn policy_residency() {
        let policy = StreamingPolicy::new(Some(24));
        assert_eq!(policy.residency([2, 3, 4], 1), LevelResidency::Materialize);
        assert_eq!(policy.residency([2, 3, 4], 2), LevelResidency::Stream);
        assert_eq!(
            policy.with_always_stream(true).residency([1, 1, 1], 1),
            LevelResidency::Stream
        );
        assert_eq!(
            StreamingPolicy::new(None).residency([1, 1, 1], 1),
            LevelResidency::Stream
        );
        assert_eq!(level_size_bytes([2, 3, 4], 0), 24);
    }

    #[test]
    fn tile_grid_raster_order() {
        let grid = TileGrid::new([2, 5, 3], 2).unwrap();
        assert_eq!((grid.tiles_y(), grid.tiles_x(), grid.tile_count()), (3, 2, 12));
        assert_eq!(grid.tile_position(0), (0, 0, 0));
        assert_eq!(grid.tile_position(1), (0, 0, 1));
        assert_eq!(grid.tile_position(2), (0, 1, 0));
        assert_eq!(grid.tile_position(7), (1, 0, 1));
        assert_eq!(grid.tile_ranges(2, 1), (4..5, 2..3));
        assert!(TileGrid::new([1, 1, 1], 0).is_err());
    }

    #[test]
    fn streamed_equals_materialized() {
        let source = image((2, 37, 21));
        let mut streaming =
            TileStreamer::new(StreamingPolicy::default().with_always_stream(true), 16).unwrap();
        let mut materializing = TileStreamer::new(StreamingPolicy::default(), 16).unwrap();

        let (residency, streamed) = collect(&mut streaming, &source);
        assert_eq!(residency, LevelResidency::Stream);
        let (residency, materialized) = collect(&mut materializing, &source);
        assert_eq!(residency, LevelResidency::Materialize);

        assert_eq!(streamed.len(), 2 * 3 * 2);
        assert_eq!(streamed, materialized);
        assert_eq!(streamed[5].data.dim(), (5, 5));
        assert_eq!(
            streamed[0].data,
            source.to_u8().unwrap().slice(s![0, 0..16, 0..16])
        );
    }

    #[test]
    fn materialized_reuse_resizes_previous() {
        let base = image((1, 9, 8));
        let base_u8 = base.to_u8().unwrap();
        let next = SampleArray::from(Array3::<u16>::zeros((1, 5, 4)));
        assert!(StreamingPolicy::default().reuse_materialized());
        let mut streamer = TileStreamer::new(StreamingPolicy::default(), 4).unwrap();
        collect(&mut streamer, &base);
        assert!(matches!(streamer.state(), StreamerState::Done(Some(_))));

        let (residency, tiles) = collect(&mut streamer, &next);
        assert_eq!(residency, LevelResidency::Materialize);
        // the zero source is never read
        assert_eq!(tiles[0].data[[1, 1]], base_u8[[0, 2, 2]]);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].data[[0, 0]], base_u8[[0, 8, 0]]);

        let mut streamer = TileStreamer::new(
            StreamingPolicy::default().with_reuse_materialized(false),
            4,
        )
        .unwrap();
        collect(&mut streamer, &base);
        let (_, tiles) = collect(&mut streamer, &next);
        assert!(tiles.iter().all(|tile| tile.data.iter().all(|&v| v == 0)));
    }

    #[test]
    fn streamer_rejects_signed_samples_and_unfinished_levels() {
        let mut streamer = TileStreamer::new(StreamingPolicy::default(), 4).unwrap();
        let signed = SampleArray::from(Array3::<i32>::zeros((1, 2, 2)));
        assert!(matches!(
            streamer.begin_level(&signed),
            Err(ExplorerError::UnsupportedSampleType { .. })
        ));
        let source = image((1, 2, 2));
        assert!(streamer.begin_level(&source).is_ok());
        assert!(streamer.begin_level(&source).is_err());
        streamer.finish_level();
        assert!(streamer.begin_level(&source).is_ok());
    }
}
