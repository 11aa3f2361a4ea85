use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{resample_polygon, Polygon, MIN_POLYGON_VERTICES};
use crate::storage::WritableStorageTraits;
use crate::zarr::{
    chunk_extent, write_zip_store, ArrayBuilder, Attributes, ChunkCompressor, DataType,
    GroupBuilder,
};
use crate::ExplorerError;

/// The number of pyramid pixels per micron of the viewer's default coordinate space.
pub const PIXEL_SCALE: f64 = 4.705_882;

/// The columns of the `cell_summary` array.
pub const CELL_SUMMARY_COLUMNS: [&str; 7] = [
    "cell_centroid_x",
    "cell_centroid_y",
    "cell_area",
    "nucleus_centroid_x",
    "nucleus_centroid_y",
    "nucleus_area",
    "z_level",
];

const CELL_SUMMARY_DESCRIPTIONS: [&str; 7] = [
    "Cell centroid in X",
    "Cell centroid in Y",
    "Cell area",
    "Nucleus centroid in X",
    "Nucleus centroid in Y",
    "Nucleus area",
    "Z level",
];

/// The column of `cell_summary` holding the cell area.
pub const CELL_AREA_COLUMN: usize = 2;

/// The number of polygon sets, the nucleus and the cell boundaries.
const POLYGON_SETS: usize = 2;

/// Polygon write options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolygonWriteOptions {
    n_vertices: usize,
    pixel_scale: f64,
    compressor: Option<ChunkCompressor>,
}

impl Default for PolygonWriteOptions {
    fn default() -> Self {
        Self {
            n_vertices: 13,
            pixel_scale: PIXEL_SCALE,
            compressor: None,
        }
    }
}

impl PolygonWriteOptions {
    /// Return the number of vertices of every resampled polygon, including the closing vertex.
    #[must_use]
    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    /// Set the number of vertices of every resampled polygon.
    #[must_use]
    pub fn with_n_vertices(mut self, n_vertices: usize) -> Self {
        self.n_vertices = n_vertices;
        self
    }

    /// Set the number of vertices of every resampled polygon.
    pub fn set_n_vertices(&mut self, n_vertices: usize) -> &mut Self {
        self.n_vertices = n_vertices;
        self
    }

    /// Return the factor coordinates are divided by.
    #[must_use]
    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    /// Set the factor coordinates are divided by.
    #[must_use]
    pub fn with_pixel_scale(mut self, pixel_scale: f64) -> Self {
        self.pixel_scale = pixel_scale;
        self
    }

    /// Set the factor coordinates are divided by.
    pub fn set_pixel_scale(&mut self, pixel_scale: f64) -> &mut Self {
        self.pixel_scale = pixel_scale;
        self
    }

    /// Return the chunk compressor.
    #[must_use]
    pub fn compressor(&self) -> Option<ChunkCompressor> {
        self.compressor
    }

    /// Set the chunk compressor.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Option<ChunkCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Set the chunk compressor.
    pub fn set_compressor(&mut self, compressor: Option<ChunkCompressor>) -> &mut Self {
        self.compressor = compressor;
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if the vertex count is below [`MIN_POLYGON_VERTICES`],
    /// the pixel scale is not positive, or the compressor is invalid.
    pub fn validate(&self) -> Result<(), ExplorerError> {
        if self.n_vertices < MIN_POLYGON_VERTICES {
            return Err(ExplorerError::configuration(format!(
                "polygons need at least {MIN_POLYGON_VERTICES} vertices, got {}",
                self.n_vertices
            )));
        }
        if !self.pixel_scale.is_finite() || self.pixel_scale <= 0.0 {
            return Err(ExplorerError::configuration(format!(
                "pixel scale {} is not positive",
                self.pixel_scale
            )));
        }
        if let Some(compressor) = &self.compressor {
            compressor.validate()?;
        }
        Ok(())
    }
}

/// Cell boundaries resampled to a common vertex count.
#[derive(Clone, Debug, PartialEq)]
pub struct CellPolygons {
    /// `(n_cells, 2 * n_vertices)` coordinates, alternating x and y.
    pub coordinates: Array2<f32>,
    /// Per-cell area.
    pub areas: Array1<f64>,
    /// The number of vertices of every polygon.
    pub n_vertices: usize,
}

impl CellPolygons {
    /// Resample and rescale `polygons`.
    ///
    /// Coordinates are divided by the pixel scale; areas are those of the original polygons,
    /// divided by the squared pixel scale.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if the options are invalid.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(polygons: &[Polygon], options: &PolygonWriteOptions) -> Result<Self, ExplorerError> {
        options.validate()?;
        let n_vertices = options.n_vertices();
        let scale = options.pixel_scale();
        let mut coordinates = Array2::<f32>::zeros((polygons.len(), 2 * n_vertices));
        for (mut row, polygon) in coordinates.outer_iter_mut().zip(polygons) {
            let resampled = resample_polygon(polygon, n_vertices)?;
            for (value, coordinate) in row.iter_mut().zip(resampled.iter().flatten()) {
                *value = (coordinate / scale) as f32;
            }
        }
        let areas = polygons
            .iter()
            .map(|polygon| polygon.area() / (scale * scale))
            .collect();
        Ok(Self {
            coordinates,
            areas,
            n_vertices,
        })
    }

    /// The number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.areas.len()
    }

    /// Returns true if there are no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Store the cell boundaries hierarchy.
    ///
    /// # Errors
    /// Returns an [`ExplorerError`] if there is a storage error.
    pub fn store<TStorage: ?Sized + WritableStorageTraits>(
        &self,
        storage: &Arc<TStorage>,
        compressor: Option<ChunkCompressor>,
    ) -> Result<(), ExplorerError> {
        let n_cells = self.len();
        let n_values = 2 * self.n_vertices;

        GroupBuilder::new()
            .attributes(cells_attributes(n_cells))
            .build(storage.clone(), "/")?
            .store_metadata()?;

        let polygon_vertices: Array3<f32> = ndarray::stack(
            Axis(0),
            &[self.coordinates.view(); POLYGON_SETS],
        )
        .map_err(|err| ExplorerError::configuration(err.to_string()))?;
        let array = ArrayBuilder::new(
            [POLYGON_SETS as u64, n_cells as u64, n_values as u64],
            DataType::Float32,
            [1, chunk_extent(n_cells, 4), chunk_extent(n_values, 4)],
        )
        .compressor(compressor)
        .build(storage.clone(), "/polygon_vertices")?;
        array.store_metadata()?;
        array.store_array_ndarray(polygon_vertices.view())?;

        let cell_id = Array2::from_shape_fn((n_cells, 2), |(cell, column)| {
            if column == 0 { cell as u32 + 1 } else { 1 }
        });
        let array = ArrayBuilder::new(
            [n_cells as u64, 2],
            DataType::UInt32,
            [chunk_extent(n_cells, 2), 1],
        )
        .compressor(compressor)
        .build(storage.clone(), "/cell_id")?;
        array.store_metadata()?;
        array.store_array_ndarray(cell_id.view())?;

        let mut cell_summary = Array2::<f64>::zeros((n_cells, CELL_SUMMARY_COLUMNS.len()));
        cell_summary
            .column_mut(CELL_AREA_COLUMN)
            .assign(&self.areas);
        let array = ArrayBuilder::new(
            [n_cells as u64, CELL_SUMMARY_COLUMNS.len() as u64],
            DataType::Float64,
            [chunk_extent(n_cells, 1), 1],
        )
        .compressor(compressor)
        .attributes(cell_summary_attributes())
        .build(storage.clone(), "/cell_summary")?;
        array.store_metadata()?;
        array.store_array_ndarray(cell_summary.view())?;

        let n_vertices = i32::try_from(self.n_vertices).map_err(|_| {
            ExplorerError::configuration(format!("{} vertices is too many", self.n_vertices))
        })?;
        let num_vertices = Array2::<i32>::from_elem((POLYGON_SETS, n_cells), n_vertices);
        let array = ArrayBuilder::new(
            [POLYGON_SETS as u64, n_cells as u64],
            DataType::Int32,
            [1, chunk_extent(n_cells, 2)],
        )
        .compressor(compressor)
        .build(storage.clone(), "/polygon_num_vertices")?;
        array.store_metadata()?;
        array.store_array_ndarray(num_vertices.view())?;

        let seg_mask_value = (1..=n_cells).map(|cell| cell as u32).collect::<Array1<u32>>();
        let array = ArrayBuilder::new([n_cells as u64], DataType::UInt32, [chunk_extent(n_cells, 2)])
            .compressor(compressor)
            .build(storage.clone(), "/seg_mask_value")?;
        array.store_metadata()?;
        array.store_array_ndarray(seg_mask_value.view())?;
        Ok(())
    }
}

fn cells_attributes(n_cells: usize) -> Attributes {
    attributes_from(json!({
        "major_version": 5,
        "minor_version": 0,
        "number_cells": n_cells,
        "polygon_set_names": ["nucleus", "cell"],
        "polygon_set_display_names": ["Nuclei", "Cells"],
        "polygon_set_descriptions": ["NA", "NA"],
        "spatial_units": "microns",
        "name": "CellSegmentationDataset",
    }))
}

fn cell_summary_attributes() -> Attributes {
    attributes_from(json!({
        "columns": CELL_SUMMARY_COLUMNS,
        "column_descriptions": CELL_SUMMARY_DESCRIPTIONS,
    }))
}

pub(crate) fn attributes_from(value: serde_json::Value) -> Attributes {
    match value {
        serde_json::Value::Object(attributes) => attributes,
        _ => Attributes::default(),
    }
}

/// Resample `polygons` and store the cell boundaries hierarchy in `storage`.
///
/// # Errors
/// Returns an [`ExplorerError`] if the options are invalid or there is a storage error.
pub fn write_polygons<TStorage: ?Sized + WritableStorageTraits>(
    storage: &Arc<TStorage>,
    polygons: &[Polygon],
    options: &PolygonWriteOptions,
) -> Result<(), ExplorerError> {
    let polygons = CellPolygons::new(polygons, options)?;
    polygons.store(storage, options.compressor())?;
    log::info!("Wrote {} cell polygons", polygons.len());
    Ok(())
}

/// Resample `polygons` and store the cell boundaries hierarchy in a new ZIP file at `path`.
///
/// # Errors
/// Returns an [`ExplorerError`] if the options are invalid or the file cannot be written.
pub fn write_polygons_zip<P: AsRef<Path>>(
    path: P,
    polygons: &[Polygon],
    options: &PolygonWriteOptions,
) -> Result<(), ExplorerError> {
    let polygons = CellPolygons::new(polygons, options)?;
    write_zip_store(path, |store| polygons.store(&store, options.compressor()))
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use ndarray::Ix1;

    use super::*;
    use crate::storage::store::MemoryStore;
    use crate::zarr::{Array, Group};

    fn squares() -> Result<Vec<Polygon>, ExplorerError> {
        (0..3)
            .map(|i| {
                let x = f64::from(i) * 10.0;
                Polygon::new(vec![[x, 0.0], [x + 4.0, 0.0], [x + 4.0, 4.0], [x, 4.0]])
            })
            .collect()
    }

    #[test]
    fn polygon_options_validate() {
        assert!(PolygonWriteOptions::default().validate().is_ok());
        assert!(PolygonWriteOptions::default()
            .with_n_vertices(2)
            .validate()
            .is_err());
        assert!(PolygonWriteOptions::default()
            .with_pixel_scale(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn cell_polygons_scaled() -> Result<(), Box<dyn Error>> {
        let options = PolygonWriteOptions::default().with_pixel_scale(2.0);
        let polygons = CellPolygons::new(&squares()?, &options)?;
        assert_eq!(polygons.len(), 3);
        assert_eq!(polygons.coordinates.shape(), &[3, 26]);
        assert_eq!(polygons.coordinates[[1, 0]], 5.0);
        assert_eq!(polygons.coordinates[[1, 1]], 0.0);
        // closed
        assert_eq!(polygons.coordinates[[1, 24]], polygons.coordinates[[1, 0]]);
        assert_eq!(polygons.coordinates[[1, 25]], polygons.coordinates[[1, 1]]);
        assert!((polygons.areas[0] - 4.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn cell_polygons_store() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        write_polygons(&store, &squares()?, &PolygonWriteOptions::default())?;

        let group = Group::open(store.clone(), "/")?;
        assert_eq!(group.attributes()["number_cells"], 3);
        assert_eq!(group.attributes()["major_version"], 5);

        let vertices = Array::open(store.clone(), "/polygon_vertices")?;
        assert_eq!(vertices.shape(), &[2, 3, 26]);
        assert_eq!(vertices.chunk_shape(), &[1, 1, 7]);
        let vertices = vertices.retrieve_array_ndarray::<f32>()?;
        assert_eq!(
            vertices.index_axis(Axis(0), 0),
            vertices.index_axis(Axis(0), 1)
        );

        let cell_id = Array::open(store.clone(), "/cell_id")?.retrieve_array_ndarray::<u32>()?;
        assert_eq!(cell_id.as_slice(), Some(&[1, 1, 2, 1, 3, 1][..]));

        let summary = Array::open(store.clone(), "/cell_summary")?;
        assert_eq!(summary.attributes()["columns"][2], "cell_area");
        let summary = summary.retrieve_array_ndarray::<f64>()?;
        let scale = PIXEL_SCALE * PIXEL_SCALE;
        assert!((summary[[2, CELL_AREA_COLUMN]] - 16.0 / scale).abs() < 1e-9);
        assert_eq!(summary[[2, 0]], 0.0);

        let num_vertices =
            Array::open(store.clone(), "/polygon_num_vertices")?.retrieve_array_ndarray::<i32>()?;
        assert!(num_vertices.iter().all(|&n| n == 13));

        let seg_mask_value = Array::open(store, "/seg_mask_value")?
            .retrieve_array_ndarray::<u32>()?
            .into_dimensionality::<Ix1>()?;
        assert_eq!(seg_mask_value.to_vec(), vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn cell_polygons_empty() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        write_polygons(&store, &[], &PolygonWriteOptions::default())?;
        let vertices = Array::open(store, "/polygon_vertices")?;
        assert_eq!(vertices.shape(), &[2, 0, 26]);
        Ok(())
    }

    #[test]
    fn cell_polygons_zip() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cells.zarr.zip");
        write_polygons_zip(&path, &squares()?, &PolygonWriteOptions::default())?;
        assert!(path.exists());
        Ok(())
    }
}
