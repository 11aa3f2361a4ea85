//! Explorer bundle orchestration.
//!
//! An [`ExplorerBundle`] collects the inputs of an explorer bundle and writes the selected files
//! into a directory:
//!
//! | File                          | Mode letter | Input                                         |
//! |-------------------------------|-------------|-----------------------------------------------|
//! | `morphology.ome.tif`          | `i`         | [`ImagePyramid`] or a full resolution image   |
//! | `cells.zarr.zip`              | `b`         | [`CellGeometry`] per cell                     |
//! | `cell_feature_matrix.zarr.zip`| `c`         | [`CountMatrix`] and feature names             |
//! | `analysis.zarr.zip`           | `o`         | [`CategoricalColumn`]s                        |
//! | `experiment.xenium`           | `m`         | the cell count and configuration              |
//!
//! Files whose input is missing are skipped. Cell ordinals must denote the same cell across the
//! boundaries, counts, and categories.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::config::{BundleFile, ExplorerConfig, FileSelection};
use crate::constants::{
    experiment_descriptor, ANALYSIS_FILE, CELLS_FILE, CELL_FEATURES_FILE, EXPERIMENT_FILE,
    MORPHOLOGY_FILE,
};
use crate::image::{assign_channel_colors, write_image, ImagePyramid, SampleArray};
use crate::shapes::{standardize_geometries, write_polygons_zip, CellGeometry};
use crate::table::{write_cell_categories_zip, write_gene_counts_zip, CategoricalColumn, CountMatrix};
use crate::ExplorerError;

/// The key recorded in the experiment descriptor when none is given.
const NOT_AVAILABLE_KEY: &str = "NA";

#[derive(Debug)]
enum ImageInput {
    Pyramid(ImagePyramid),
    Image {
        image: SampleArray,
        channel_names: Vec<String>,
    },
}

impl ImageInput {
    fn channel_names(&self) -> &[String] {
        match self {
            Self::Pyramid(pyramid) => pyramid.channel_names(),
            Self::Image { channel_names, .. } => channel_names,
        }
    }

    fn into_pyramid(self, n_subscales: usize) -> Result<ImagePyramid, ExplorerError> {
        match self {
            Self::Pyramid(pyramid) => Ok(pyramid),
            Self::Image {
                image,
                channel_names,
            } => ImagePyramid::from_image(image, channel_names, n_subscales),
        }
    }
}

/// An explorer bundle writer.
///
/// ```no_run
/// # use explorer_bundle::explorer::ExplorerBundle;
/// # use explorer_bundle::config::ExplorerConfig;
/// # use explorer_bundle::image::SampleArray;
/// # use explorer_bundle::table::CountMatrix;
/// let image = SampleArray::from(ndarray::Array3::<u16>::zeros((1, 2048, 2048)));
/// let counts = CountMatrix::Dense(ndarray::array![[1, 0], [0, 2]]);
/// ExplorerBundle::new()
///     .with_image(image, vec!["DAPI".to_string()])
///     .with_gene_counts(counts, vec!["EPCAM".to_string(), "CD3E".to_string()])
///     .write("sample.explorer", &ExplorerConfig::default())?;
/// # Ok::<(), explorer_bundle::ExplorerError>(())
/// ```
#[derive(Debug, Default)]
pub struct ExplorerBundle {
    image: Option<ImageInput>,
    geometries: Option<Vec<CellGeometry>>,
    gene_counts: Option<(CountMatrix, Vec<String>)>,
    categories: Option<Vec<CategoricalColumn>>,
    n_cells: Option<usize>,
    image_key: Option<String>,
    shapes_key: Option<String>,
}

impl ExplorerBundle {
    /// Create an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the image pyramid.
    #[must_use]
    pub fn with_pyramid(mut self, pyramid: ImagePyramid) -> Self {
        self.image = Some(ImageInput::Pyramid(pyramid));
        self
    }

    /// Set a full resolution `(c, y, x)` image, downsampled into a pyramid on write.
    #[must_use]
    pub fn with_image(mut self, image: SampleArray, channel_names: Vec<String>) -> Self {
        self.image = Some(ImageInput::Image {
            image,
            channel_names,
        });
        self
    }

    /// Set the cell geometries, one per cell.
    #[must_use]
    pub fn with_geometries(mut self, geometries: Vec<CellGeometry>) -> Self {
        self.geometries = Some(geometries);
        self
    }

    /// Set the cell by feature counts and the feature names.
    #[must_use]
    pub fn with_gene_counts(mut self, counts: CountMatrix, feature_names: Vec<String>) -> Self {
        self.gene_counts = Some((counts, feature_names));
        self
    }

    /// Set the categorical cell annotations.
    #[must_use]
    pub fn with_categories(mut self, columns: Vec<CategoricalColumn>) -> Self {
        self.categories = Some(columns);
        self
    }

    /// Set the number of cells recorded in the experiment descriptor.
    ///
    /// By default, the number of cells is derived from the other inputs.
    #[must_use]
    pub fn with_n_cells(mut self, n_cells: usize) -> Self {
        self.n_cells = Some(n_cells);
        self
    }

    /// Set the name of the image recorded in the experiment descriptor.
    #[must_use]
    pub fn with_image_key(mut self, image_key: impl Into<String>) -> Self {
        self.image_key = Some(image_key.into());
        self
    }

    /// Set the name of the cell boundaries recorded in the experiment descriptor.
    #[must_use]
    pub fn with_shapes_key(mut self, shapes_key: impl Into<String>) -> Self {
        self.shapes_key = Some(shapes_key.into());
        self
    }

    /// The number of cells all inputs agree on, if any input has cells.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if the inputs disagree.
    pub fn n_cells(&self) -> Result<Option<usize>, ExplorerError> {
        let mut counts = Vec::new();
        if let Some(n_cells) = self.n_cells {
            counts.push(("given", n_cells));
        }
        if let Some(geometries) = &self.geometries {
            counts.push(("geometries", geometries.len()));
        }
        if let Some((matrix, _)) = &self.gene_counts {
            counts.push(("counts", matrix.n_cells()));
        }
        for column in self.categories.iter().flatten() {
            counts.push((column.name(), column.len()));
        }
        let Some(&(first_source, first)) = counts.first() else {
            return Ok(None);
        };
        if let Some((source, n_cells)) = counts.iter().find(|(_, n_cells)| *n_cells != first) {
            return Err(ExplorerError::configuration(format!(
                "{source} has {n_cells} cells but {first_source} has {first}"
            )));
        }
        Ok(Some(first))
    }

    /// Check every selected input before any file is written.
    fn preflight(&self, selection: &FileSelection) -> Result<(), ExplorerError> {
        let image = self
            .image
            .as_ref()
            .filter(|_| selection.selects(BundleFile::Image));
        if let Some(image) = image {
            let data_types: Vec<_> = match image {
                ImageInput::Pyramid(pyramid) => pyramid
                    .levels()
                    .iter()
                    .map(|level| level.data_type())
                    .collect(),
                ImageInput::Image { image, .. } => vec![image.data_type()],
            };
            if let Some(data_type) = data_types
                .into_iter()
                .find(|data_type| !data_type.is_unsigned_integer())
            {
                return Err(ExplorerError::UnsupportedSampleType { data_type });
            }
            assign_channel_colors(image.channel_names())?;
        }
        let gene_counts = self
            .gene_counts
            .as_ref()
            .filter(|_| selection.selects(BundleFile::Counts));
        match gene_counts {
            Some((matrix, feature_names)) if feature_names.len() != matrix.n_features() => {
                Err(ExplorerError::configuration(format!(
                    "got {} feature names for {} features",
                    feature_names.len(),
                    matrix.n_features()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Write the selected files of the bundle into the directory `dir`.
    ///
    /// The directory is created if it does not exist. The configuration, the cell counts of the
    /// inputs, and the geometries are validated before any file is written.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if
    ///  - the configuration is invalid,
    ///  - `dir` exists and is not a directory,
    ///  - the inputs disagree on the number of cells,
    ///  - an input is invalid, or
    ///  - a file cannot be written.
    pub fn write<P: AsRef<Path>>(self, dir: P, config: &ExplorerConfig) -> Result<(), ExplorerError> {
        let dir = dir.as_ref();
        config.validate()?;
        let selection = config.file_selection()?;
        let n_cells = self.n_cells()?;
        self.preflight(&selection)?;
        let polygons = match &self.geometries {
            Some(geometries) if selection.selects(BundleFile::Boundaries) => {
                Some(standardize_geometries(geometries)?)
            }
            _ => None,
        };
        prepare_directory(dir)?;

        if let (Some((matrix, feature_names)), true) =
            (&self.gene_counts, selection.selects(BundleFile::Counts))
        {
            write_gene_counts_zip(
                dir.join(CELL_FEATURES_FILE),
                matrix,
                feature_names.as_slice(),
                &config.table_write_options(),
            )?;
        }
        if let (Some(columns), true) =
            (&self.categories, selection.selects(BundleFile::Observations))
        {
            write_cell_categories_zip(
                dir.join(ANALYSIS_FILE),
                columns,
                &config.table_write_options(),
            )?;
        }
        if let Some(polygons) = &polygons {
            write_polygons_zip(
                dir.join(CELLS_FILE),
                polygons,
                &config.polygon_write_options(),
            )?;
        }
        if let (Some(image), true) = (self.image, selection.selects(BundleFile::Image)) {
            let pyramid = image.into_pyramid(config.n_subscales())?;
            write_image(
                dir.join(MORPHOLOGY_FILE),
                &pyramid,
                &config.image_write_options(),
            )?;
        }
        if selection.selects(BundleFile::Metadata) {
            write_experiment(
                &dir.join(EXPERIMENT_FILE),
                self.image_key.as_deref().unwrap_or(NOT_AVAILABLE_KEY),
                self.shapes_key.as_deref().unwrap_or(NOT_AVAILABLE_KEY),
                n_cells.unwrap_or_default(),
                config.pixel_size(),
            )?;
        }

        log::info!("Saved files in the following directory: {}", dir.display());
        log::info!(
            "You can open the experiment with 'open {}'",
            dir.join(EXPERIMENT_FILE).display()
        );
        Ok(())
    }
}

fn prepare_directory(dir: &Path) -> Result<(), ExplorerError> {
    if dir.exists() && !dir.is_dir() {
        return Err(ExplorerError::configuration(format!(
            "{} exists and is not a directory",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Write the experiment descriptor to `path` as JSON indented by four spaces.
///
/// # Errors
/// Returns an [`ExplorerError`] if the file cannot be written.
pub fn write_experiment(
    path: &Path,
    image_key: &str,
    shapes_key: &str,
    n_cells: usize,
    pixel_size: f64,
) -> Result<(), ExplorerError> {
    let descriptor = experiment_descriptor(image_key, shapes_key, n_cells, pixel_size);
    let mut json = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut json, PrettyFormatter::with_indent(b"    "));
    descriptor.serialize(&mut serializer)?;
    std::fs::write(path, json)?;
    log::info!("Wrote experiment descriptor {}", path.display());
    Ok(())
}

/// The path of `file` in the bundle directory `dir`.
#[must_use]
pub fn bundle_path(dir: &Path, file: BundleFile) -> PathBuf {
    dir.join(match file {
        BundleFile::Image => MORPHOLOGY_FILE,
        BundleFile::Boundaries => CELLS_FILE,
        BundleFile::Counts => CELL_FEATURES_FILE,
        BundleFile::Observations => ANALYSIS_FILE,
        BundleFile::Metadata => EXPERIMENT_FILE,
    })
}
