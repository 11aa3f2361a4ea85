//! `explorer_bundle` writes the files a spatial biology explorer reads to display one experiment:
//! a multiscale morphology image, cell boundaries, a cell by feature count matrix, categorical
//! cell annotations, and an experiment descriptor.
//!
//! ## Files
//! - [`image::write_image`] writes an [`ImagePyramid`](image::ImagePyramid) to a tiled, pyramidal
//!   BigTIFF (`morphology.ome.tif`) with OME-XML metadata. Each level is either streamed tile by
//!   tile or held in memory, as decided by a [`StreamingPolicy`](image::StreamingPolicy).
//! - [`shapes::write_polygons`] resamples cell polygons to a fixed vertex count (`cells.zarr.zip`).
//! - [`table::write_gene_counts`] compresses a count matrix by feature (`cell_feature_matrix.zarr.zip`).
//! - [`table::write_cell_categories`] partitions cells by category (`analysis.zarr.zip`).
//! - [`explorer::write_experiment`] writes the experiment descriptor (`experiment.xenium`).
//!
//! [`ExplorerBundle`](explorer::ExplorerBundle) writes all of them at once into a directory,
//! configured by an [`ExplorerConfig`](config::ExplorerConfig).
//!
//! The Zarr containers are Zarr V2 hierarchies written by the [`zarr`] module through the
//! [`storage`] abstraction and packaged in ZIP files.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use explorer_bundle::storage::store::MemoryStore;
//! use explorer_bundle::table::{write_cell_categories, CategoricalColumn, TableWriteOptions};
//!
//! let store = Arc::new(MemoryStore::new());
//! let leiden = CategoricalColumn::from_labels(
//!     "leiden",
//!     vec!["A".to_string(), "B".to_string()],
//!     &[Some("A"), Some("B"), Some("A")],
//! )?;
//! write_cell_categories(&store, &[leiden], &TableWriteOptions::default())?;
//! # Ok::<(), explorer_bundle::ExplorerError>(())
//! ```
//!
//! ## Logging
//! Progress is reported through the [`log`] facade. Installing a logger is left to the caller.

pub mod cell_id;
pub mod config;
pub mod constants;
pub mod explorer;
pub mod image;
pub mod shapes;
pub mod table;
pub mod zarr;

mod error;

pub use explorer_bundle_storage as storage;

pub use cell_id::{decode_cell_id, encode_cell_id, CellIdError};
pub use config::ExplorerConfig;
pub use error::ExplorerError;
pub use explorer::ExplorerBundle;
