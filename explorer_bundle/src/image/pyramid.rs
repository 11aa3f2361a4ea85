use std::fmt;

use super::{LevelSource, SampleArray};
use crate::ExplorerError;

/// A multiscale `(c, y, x)` image.
///
/// Level 0 is the full resolution image; each following level is expected to halve the spatial
/// extents of the previous one. Every level has the same channels.
pub struct ImagePyramid {
    channel_names: Vec<String>,
    levels: Vec<Box<dyn LevelSource>>,
}

impl fmt::Debug for ImagePyramid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePyramid")
            .field("channel_names", &self.channel_names)
            .field(
                "levels",
                &self.levels.iter().map(|level| level.shape()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ImagePyramid {
    /// Create a pyramid from its levels, the full resolution level first.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if
    ///  - there are no levels,
    ///  - the number of channel names differs from the number of channels, or
    ///  - a level has a different number of channels than the base level ([`ExplorerError::PyramidShapeMismatch`]).
    pub fn new(
        channel_names: Vec<String>,
        levels: Vec<Box<dyn LevelSource>>,
    ) -> Result<Self, ExplorerError> {
        let Some(base) = levels.first() else {
            return Err(ExplorerError::configuration("an image pyramid needs at least one level"));
        };
        let expected_channels = base.shape()[0];
        if channel_names.len() != expected_channels {
            return Err(ExplorerError::configuration(format!(
                "{} channel names given for an image with {expected_channels} channels",
                channel_names.len()
            )));
        }
        for (level, source) in levels.iter().enumerate() {
            let shape = source.shape();
            if shape[0] != expected_channels {
                return Err(ExplorerError::PyramidShapeMismatch {
                    level,
                    expected_channels,
                    shape,
                });
            }
        }
        for (level, pair) in levels.windows(2).enumerate() {
            let (previous, shape) = (pair[0].shape(), pair[1].shape());
            let halves = |axis: usize| {
                (previous[axis] / 2..=previous[axis].div_ceil(2)).contains(&shape[axis])
            };
            if !halves(1) || !halves(2) {
                log::warn!(
                    "Pyramid level {} of shape {shape:?} does not halve level {level} of shape {previous:?}",
                    level + 1
                );
            }
        }
        Ok(Self {
            channel_names,
            levels,
        })
    }

    /// Build a pyramid with `n_subscales` levels below `image` by 2x2 mean downsampling.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if the channel names do not match the channels of `image`.
    pub fn from_image(
        image: SampleArray,
        channel_names: Vec<String>,
        n_subscales: usize,
    ) -> Result<Self, ExplorerError> {
        let mut levels: Vec<SampleArray> = Vec::with_capacity(n_subscales + 1);
        levels.push(image);
        for _ in 0..n_subscales {
            let next = levels
                .last()
                .map(SampleArray::downsample)
                .ok_or_else(|| ExplorerError::configuration("empty pyramid"))?;
            levels.push(next);
        }
        Self::new(
            channel_names,
            levels
                .into_iter()
                .map(|level| Box::new(level) as Box<dyn LevelSource>)
                .collect(),
        )
    }

    /// The channel names.
    #[must_use]
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// The levels, full resolution first.
    #[must_use]
    pub fn levels(&self) -> &[Box<dyn LevelSource>] {
        &self.levels
    }

    /// The number of levels below the full resolution level.
    #[must_use]
    pub fn n_subscales(&self) -> usize {
        self.levels.len() - 1
    }

    /// The shape of the full resolution level.
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        self.levels[0].shape()
    }
}
