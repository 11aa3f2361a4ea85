//! Cell boundary encoding.
//!
//! Cell geometries are normalised to one [`Polygon`] per cell by [`standardize_geometries`],
//! resampled to a fixed vertex count by [`resample_polygon`], and written to a Zarr hierarchy by
//! [`write_polygons`].

mod cell_polygons;
mod geometry;
mod resample;

pub use cell_polygons::{
    write_polygons, write_polygons_zip, CellPolygons, PolygonWriteOptions, CELL_AREA_COLUMN,
    CELL_SUMMARY_COLUMNS, PIXEL_SCALE,
};
pub(crate) use cell_polygons::attributes_from;
pub use geometry::{
    buffer_point, largest_polygon, ring_area, standardize_geometries, CellGeometry, GeometryKind,
    Polygon, DEFAULT_POINT_RADIUS, POINT_BUFFER_SEGMENTS,
};
pub use resample::{resample_polygon, MIN_POLYGON_VERTICES};
