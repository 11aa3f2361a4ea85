//! Channel display colors.
//!
//! The viewer colors a channel from a wavelength hint in its name, e.g. `DAPI (color=405)`.
//! Channels whose names already encode a wavelength (a run of exactly three digits) and known
//! nuclear stains are left as they are. Every other channel is assigned a color from
//! [`COLOR_PALETTE`] that no other channel uses, spread evenly across the remaining palette.

use std::fmt;

use itertools::Itertools;

use crate::ExplorerError;

/// The color of known nuclear stains.
pub const NUCLEUS_COLOR: &str = "405";

/// Channels with a conventional color.
pub const KNOWN_CHANNELS: &[(&str, &str)] = &[
    ("DAPI", NUCLEUS_COLOR),
    ("DNA1", NUCLEUS_COLOR),
    ("DNA2", NUCLEUS_COLOR),
    ("Hoechst", NUCLEUS_COLOR),
];

/// Wavelength colors, in assignment order.
pub const COLOR_PALETTE: &[&str] = &["488", "560", "650", "750", "405", "525", "600", "690"];

/// A channel name and its assigned color.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelLabel {
    name: String,
    color: Option<String>,
}

impl ChannelLabel {
    /// The original channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The assigned color, if the channel needed one.
    #[must_use]
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.color {
            Some(color) => write!(f, "{} (color={color})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Returns true if `name` holds a run of exactly three digits.
#[must_use]
pub fn is_wavelength_name(name: &str) -> bool {
    name.chars()
        .chunk_by(char::is_ascii_digit)
        .into_iter()
        .any(|(is_digit, run)| is_digit && run.count() == 3)
}

/// The conventional color of a known channel.
#[must_use]
pub fn known_channel_color(name: &str) -> Option<&'static str> {
    KNOWN_CHANNELS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, color)| *color)
}

/// Picks `picks` distinct colors spread evenly over a palette.
///
/// The `j`-th pick is palette entry `floor(j * m / picks)` of the `m` available colors.
#[derive(Clone, Debug)]
pub struct PaletteCursor<'p> {
    colors: Vec<&'p str>,
    picks: usize,
    next: usize,
}

impl<'p> PaletteCursor<'p> {
    /// Create a cursor over `palette` without the `reserved` colors.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if fewer than `picks` colors are available.
    pub fn new(palette: &[&'p str], reserved: &[&str], picks: usize) -> Result<Self, ExplorerError> {
        let colors = palette
            .iter()
            .copied()
            .filter(|color| !reserved.contains(color))
            .unique()
            .collect::<Vec<_>>();
        if picks > colors.len() {
            return Err(ExplorerError::configuration(format!(
                "{picks} channels need a color but only {} palette colors are available",
                colors.len()
            )));
        }
        Ok(Self {
            colors,
            picks,
            next: 0,
        })
    }

    /// The next color, or [`None`] once every pick is taken.
    pub fn next_color(&mut self) -> Option<&'p str> {
        if self.next >= self.picks {
            return None;
        }
        let color = self.colors[self.next * self.colors.len() / self.picks];
        self.next += 1;
        Some(color)
    }
}

/// Assign display colors to `channel_names`.
///
/// # Errors
/// Returns [`ExplorerError::ConfigurationError`] if more channels need a color than the palette can provide.
pub fn assign_channel_colors<S: AsRef<str>>(
    channel_names: &[S],
) -> Result<Vec<ChannelLabel>, ExplorerError> {
    let reserved = channel_names
        .iter()
        .filter_map(|name| known_channel_color(name.as_ref()))
        .collect::<Vec<_>>();
    let needs_color = |name: &str| !is_wavelength_name(name) && known_channel_color(name).is_none();
    let picks = channel_names
        .iter()
        .filter(|name| needs_color(name.as_ref()))
        .count();
    let mut cursor = PaletteCursor::new(COLOR_PALETTE, &reserved, picks)?;

    Ok(channel_names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let color = if needs_color(name) {
                cursor.next_color().map(str::to_string)
            } else {
                None
            };
            ChannelLabel {
                name: name.to_string(),
                color,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wavelength_names() {
        assert!(is_wavelength_name("550"));
        assert!(is_wavelength_name("Cy5_647nm"));
        assert!(!is_wavelength_name("CD4"));
        assert!(!is_wavelength_name("1234"));
        assert!(!is_wavelength_name("custom"));
    }

    #[test]
    fn channel_colors_known_wavelength_custom() {
        let labels = assign_channel_colors(&["DAPI", "550", "custom"]).unwrap();
        let names = labels.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(names, ["DAPI", "550", "custom (color=488)"]);
        assert_eq!(labels[2].color(), Some("488"));
        assert_eq!(labels[2].name(), "custom");
    }

    #[test]
    fn channel_colors_distinct_and_spread() {
        let channels = ["DAPI", "CD3", "CD4", "CD8", "CD20"];
        let labels = assign_channel_colors(&channels).unwrap();
        let colors = labels.iter().filter_map(ChannelLabel::color).collect::<Vec<_>>();
        // 7 colors remain after reserving 405
        assert_eq!(colors, ["488", "560", "750", "600"]);
        assert!(colors.iter().all_unique());
    }

    #[test]
    fn channel_colors_exhausted() {
        let channels = (0..9).map(|i| format!("marker{i}")).collect::<Vec<_>>();
        assert!(matches!(
            assign_channel_colors(&channels),
            Err(ExplorerError::ConfigurationError(_))
        ));
        let channels = (0..8).map(|i| format!("marker{i}")).collect::<Vec<_>>();
        let labels = assign_channel_colors(&channels).unwrap();
        assert_eq!(labels[7].color(), Some("690"));
    }
}
