#![allow(missing_docs)]

use std::error::Error;
use std::sync::Arc;

use explorer_bundle::config::{BundleFile, ExplorerConfig};
use explorer_bundle::explorer::bundle_path;
use explorer_bundle::image::SampleArray;
use explorer_bundle::shapes::{CellGeometry, Polygon};
use explorer_bundle::storage::store::ZipStore;
use explorer_bundle::table::{CategoricalColumn, CountMatrix};
use explorer_bundle::zarr::{Array, ChunkCompressor, Group};
use explorer_bundle::{encode_cell_id, ExplorerBundle};
use ndarray::{array, Array3, Ix1, Ix2};

fn geometries() -> Result<Vec<CellGeometry>, Box<dyn Error>> {
    Ok(vec![
        Polygon::new(vec![[0.0, 0.0], [20.0, 0.0], [20.0, 20.0], [0.0, 20.0], [0.0, 0.0]])?
            .into(),
        CellGeometry::Point {
            center: [50.0, 50.0],
            radius: Some(8.0),
        },
        Polygon::new(vec![[60.0, 0.0], [90.0, 0.0], [75.0, 30.0]])?.into(),
    ])
}

fn bundle() -> Result<ExplorerBundle, Box<dyn Error>> {
    let image = Array3::<u16>::from_shape_fn((2, 64, 48), |(c, y, x)| {
        ((c + 1) * (y * 48 + x)) as u16
    });
    let leiden = CategoricalColumn::from_labels(
        "leiden",
        vec!["1".to_string(), "2".to_string()],
        &[Some("2"), Some("1"), Some("2")],
    )?;
    Ok(ExplorerBundle::new()
        .with_image(SampleArray::from(image), vec!["DAPI".to_string(), "CD45".to_string()])
        .with_geometries(geometries()?)
        .with_gene_counts(
            CountMatrix::Dense(array![[3, 0], [0, 0], [1, 4]]),
            vec!["EPCAM".to_string(), "PTPRC".to_string()],
        )
        .with_categories(vec![leiden])
        .with_image_key("morphology")
        .with_shapes_key("cellpose_boundaries"))
}

#[test]
fn explorer_bundle_write() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = ExplorerConfig::default()
        .with_tile_width(32)
        .with_n_subscales(2)
        .with_compressor(Some(ChunkCompressor::Zlib { level: 5 }));
    bundle()?.write(dir.path(), &config)?;

    for file in [
        BundleFile::Image,
        BundleFile::Boundaries,
        BundleFile::Counts,
        BundleFile::Observations,
        BundleFile::Metadata,
    ] {
        assert!(bundle_path(dir.path(), file).exists(), "{file} is missing");
    }
    // no partial files are left behind
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 5);

    let cells = Arc::new(ZipStore::open(bundle_path(dir.path(), BundleFile::Boundaries))?);
    let root = Group::open(cells.clone(), "/")?;
    assert_eq!(root.attributes()["number_cells"], 3);
    assert_eq!(root.attributes()["name"], "CellSegmentationDataset");
    let vertices = Array::open(cells.clone(), "/polygon_vertices")?;
    assert_eq!(vertices.shape(), &[2, 3, 26]);
    assert_eq!(
        vertices.compressor(),
        Some(&ChunkCompressor::Zlib { level: 5 })
    );
    let cell_id = Array::open(cells.clone(), "/cell_id")?
        .retrieve_array_ndarray::<u32>()?
        .into_dimensionality::<Ix2>()?;
    assert_eq!(cell_id.column(0).to_vec(), vec![1, 2, 3]);

    let features = Arc::new(ZipStore::open(bundle_path(dir.path(), BundleFile::Counts))?);
    let group = Group::open(features.clone(), "/cell_features")?;
    assert_eq!(group.attributes()["number_features"], 3);
    let read = |name: &str| -> Result<Vec<u32>, Box<dyn Error>> {
        Ok(Array::open(features.clone(), &format!("/cell_features/{name}"))?
            .retrieve_array_ndarray::<u32>()?
            .into_dimensionality::<Ix1>()?
            .to_vec())
    };
    assert_eq!(read("data")?, vec![3, 1, 4, 3, 5]);
    assert_eq!(read("indices")?, vec![0, 2, 2, 0, 2]);
    assert_eq!(read("indptr")?, vec![0, 2, 3, 5]);

    let analysis = Arc::new(ZipStore::open(bundle_path(dir.path(), BundleFile::Observations))?);
    let groups = Group::open(analysis.clone(), "/cell_groups")?;
    assert_eq!(groups.attributes()["number_groupings"], 1);
    let indices = Array::open(analysis.clone(), "/cell_groups/0/indices")?
        .retrieve_array_ndarray::<u32>()?
        .into_dimensionality::<Ix1>()?;
    assert_eq!(indices.to_vec(), vec![1, 0, 2]);

    let descriptor: serde_json::Value =
        serde_json::from_slice(&std::fs::read(bundle_path(dir.path(), BundleFile::Metadata))?)?;
    assert_eq!(descriptor["num_cells"], 3);
    assert_eq!(descriptor["pixel_size"], 0.2125);
    assert_eq!(descriptor["run_name"], "morphology");
    assert_eq!(
        descriptor["xenium_explorer_files"]["cell_features_zarr_filepath"],
        "cell_feature_matrix.zarr.zip"
    );

    // cell ordinals map onto identifiers used by the viewer
    assert_eq!(encode_cell_id(cell_id[[2, 0]] - 1), "aaaaaaac-1");
    Ok(())
}

#[test]
fn explorer_bundle_exclude_mode() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = ExplorerConfig::default()
        .with_tile_width(32)
        .with_mode(Some("-ib".to_string()));
    bundle()?.write(dir.path(), &config)?;
    assert!(!bundle_path(dir.path(), BundleFile::Image).exists());
    assert!(!bundle_path(dir.path(), BundleFile::Boundaries).exists());
    assert!(bundle_path(dir.path(), BundleFile::Counts).exists());
    assert!(bundle_path(dir.path(), BundleFile::Observations).exists());
    assert!(bundle_path(dir.path(), BundleFile::Metadata).exists());
    Ok(())
}

#[test]
fn explorer_bundle_invalid_mode() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("bundle");
    let config = ExplorerConfig::default().with_mode(Some("ib".to_string()));
    assert!(bundle()?.write(&out, &config).is_err());
    assert!(!out.exists());
    Ok(())
}
