//! File names and the experiment descriptor of an explorer bundle.

use serde_json::{json, Value};

/// The pyramid image file.
pub const MORPHOLOGY_FILE: &str = "morphology.ome.tif";

/// The cell boundaries container.
pub const CELLS_FILE: &str = "cells.zarr.zip";

/// The cell by feature count container.
pub const CELL_FEATURES_FILE: &str = "cell_feature_matrix.zarr.zip";

/// The cell categories container.
pub const ANALYSIS_FILE: &str = "analysis.zarr.zip";

/// The experiment descriptor.
pub const EXPERIMENT_FILE: &str = "experiment.xenium";

/// The `(major, minor)` version of the experiment descriptor format.
pub const EXPERIMENT_VERSION: (u32, u32) = (2, 0);

/// The placeholder for unknown run metadata.
const NOT_AVAILABLE: &str = "N/A";

/// Build the experiment descriptor.
///
/// `image_key` and `shapes_key` name the image and cell boundaries the bundle was written from.
/// Only files a bundle can hold are listed, so there is no transcripts entry.
#[must_use]
pub fn experiment_descriptor(
    image_key: &str,
    shapes_key: &str,
    num_cells: usize,
    pixel_size: f64,
) -> Value {
    json!({
        "major_version": EXPERIMENT_VERSION.0,
        "minor_version": EXPERIMENT_VERSION.1,
        "run_name": image_key,
        "region_name": shapes_key,
        "run_start_time": NOT_AVAILABLE,
        "preservation_method": NOT_AVAILABLE,
        "num_cells": num_cells,
        "transcripts_per_cell": 0,
        "transcripts_per_100um": 0,
        "cassette_name": NOT_AVAILABLE,
        "slide_id": NOT_AVAILABLE,
        "panel_design_id": NOT_AVAILABLE,
        "panel_name": NOT_AVAILABLE,
        "panel_organism": "Human",
        "panel_num_targets_predesigned": 0,
        "panel_num_targets_custom": 0,
        "pixel_size": pixel_size,
        "instrument_sn": NOT_AVAILABLE,
        "instrument_sw_version": NOT_AVAILABLE,
        "analysis_sw_version": "xenium-1.3.0.5",
        "experiment_uuid": "",
        "cassette_uuid": "",
        "roi_uuid": "",
        "z_step_size": 3.0,
        "well_uuid": "",
        "calibration_uuid": NOT_AVAILABLE,
        "images": {
            "morphology_filepath": MORPHOLOGY_FILE,
            "morphology_mip_filepath": "morphology_mip.ome.tif",
            "morphology_focus_filepath": "morphology_focus.ome.tif",
        },
        "xenium_explorer_files": {
            "cells_zarr_filepath": CELLS_FILE,
            "cell_features_zarr_filepath": CELL_FEATURES_FILE,
            "analysis_zarr_filepath": ANALYSIS_FILE,
            "analysis_summary_filepath": "analysis_summary.html",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experiment_descriptor_fields() {
        let descriptor = experiment_descriptor("morphology", "cells", 42, 0.5);
        assert_eq!(descriptor["major_version"], 2);
        assert_eq!(descriptor["num_cells"], 42);
        assert_eq!(descriptor["pixel_size"], 0.5);
        assert_eq!(descriptor["run_name"], "morphology");
        assert_eq!(descriptor["images"]["morphology_filepath"], MORPHOLOGY_FILE);
        assert_eq!(
            descriptor["xenium_explorer_files"]["cells_zarr_filepath"],
            CELLS_FILE
        );
        assert!(descriptor["xenium_explorer_files"]
            .get("transcripts_zarr_filepath")
            .is_none());
        // preserve_order keeps the documented key order
        let keys = descriptor
            .as_object()
            .map(|object| object.keys().take(3).cloned().collect::<Vec<_>>());
        assert_eq!(
            keys,
            Some(vec![
                "major_version".to_string(),
                "minor_version".to_string(),
                "run_name".to_string()
            ])
        );
    }
}
