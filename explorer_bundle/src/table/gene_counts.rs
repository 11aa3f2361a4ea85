use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use serde_json::json;

use super::{to_u32, TableWriteOptions};
use crate::shapes::attributes_from;
use crate::storage::WritableStorageTraits;
use crate::zarr::{chunk_extent, write_zip_store, ArrayBuilder, ChunkCompressor, DataType, GroupBuilder};
use crate::ExplorerError;

/// The name of the synthetic feature holding per-cell totals.
pub const TOTAL_TRANSCRIPTS: &str = "Total transcripts";

const FEATURE_TYPE: &str = "gene";
const TOTAL_FEATURE_TYPE: &str = "aggregate_gene";

/// A cell by feature matrix in compressed sparse row form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrMatrix {
    shape: (usize, usize),
    data: Vec<u32>,
    indices: Vec<usize>,
    indptr: Vec<usize>,
}

impl CsrMatrix {
    /// Create a CSR matrix of `shape` `(n_cells, n_features)`.
    ///
    /// Row `i` holds `data[indptr[i]..indptr[i + 1]]` at columns `indices[indptr[i]..indptr[i + 1]]`.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if
    ///  - `indptr` does not have `n_cells + 1` non-decreasing entries starting at zero,
    ///  - `data` and `indices` do not have `indptr[n_cells]` entries, or
    ///  - a column index is out of bounds, or
    ///  - a row stores the same column more than once.
    pub fn new(
        shape: (usize, usize),
        data: Vec<u32>,
        indices: Vec<usize>,
        indptr: Vec<usize>,
    ) -> Result<Self, ExplorerError> {
        let (n_cells, n_features) = shape;
        if indptr.len() != n_cells + 1 || indptr[0] != 0 {
            return Err(ExplorerError::configuration(format!(
                "indptr must have {} entries starting at 0",
                n_cells + 1
            )));
        }
        if indptr.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ExplorerError::configuration("indptr is decreasing"));
        }
        let nnz = indptr[n_cells];
        if data.len() != nnz || indices.len() != nnz {
            return Err(ExplorerError::configuration(format!(
                "expected {nnz} stored entries, got {} values and {} indices",
                data.len(),
                indices.len()
            )));
        }
        if let Some(column) = indices.iter().find(|&&column| column >= n_features) {
            return Err(ExplorerError::configuration(format!(
                "column index {column} is out of bounds for {n_features} features"
            )));
        }
        for (row, bounds) in indptr.windows(2).enumerate() {
            let mut columns = indices[bounds[0]..bounds[1]].to_vec();
            columns.sort_unstable();
            if let Some(pair) = columns.windows(2).find(|pair| pair[0] == pair[1]) {
                return Err(ExplorerError::configuration(format!(
                    "row {row} stores column {} more than once",
                    pair[0]
                )));
            }
        }
        Ok(Self {
            shape,
            data,
            indices,
            indptr,
        })
    }

    /// The shape `(n_cells, n_features)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Iterate over the stored `(column, value)` entries of `row`.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, u32)> + '_ {
        let range = self.indptr[row]..self.indptr[row + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.data[range].iter().copied())
    }
}

/// A non-negative cell by feature count matrix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CountMatrix {
    /// A dense `(n_cells, n_features)` matrix.
    Dense(Array2<u32>),
    /// A sparse matrix.
    Csr(CsrMatrix),
}

impl From<Array2<u32>> for CountMatrix {
    fn from(matrix: Array2<u32>) -> Self {
        Self::Dense(matrix)
    }
}

impl From<CsrMatrix> for CountMatrix {
    fn from(matrix: CsrMatrix) -> Self {
        Self::Csr(matrix)
    }
}

impl CountMatrix {
    /// The number of cells (rows).
    #[must_use]
    pub fn n_cells(&self) -> usize {
        match self {
            Self::Dense(matrix) => matrix.nrows(),
            Self::Csr(matrix) => matrix.shape.0,
        }
    }

    /// The number of features (columns).
    #[must_use]
    pub fn n_features(&self) -> usize {
        match self {
            Self::Dense(matrix) => matrix.ncols(),
            Self::Csr(matrix) => matrix.shape.1,
        }
    }

    /// Visit the non-zero entries as `(row, column, value)` in row-major order.
    fn for_each_nonzero(&self, mut f: impl FnMut(usize, usize, u32)) {
        match self {
            Self::Dense(matrix) => {
                for ((row, column), &value) in matrix.indexed_iter() {
                    if value != 0 {
                        f(row, column, value);
                    }
                }
            }
            Self::Csr(matrix) => {
                for row in 0..matrix.shape.0 {
                    for (column, value) in matrix.row(row) {
                        if value != 0 {
                            f(row, column, value);
                        }
                    }
                }
            }
        }
    }
}

/// A count matrix compressed by feature.
///
/// Feature `j` holds the cells `indices[indptr[j]..indptr[j + 1]]` with counts
/// `data[indptr[j]..indptr[j + 1]]`. The last feature is [`TOTAL_TRANSCRIPTS`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureCsr {
    /// Non-zero counts.
    pub data: Vec<u32>,
    /// Cell indices of the counts.
    pub indices: Vec<u32>,
    /// Feature boundaries, `n_features + 2` entries.
    pub indptr: Vec<u32>,
}

impl FeatureCsr {
    /// The number of features, including the totals.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    /// The `(cell, count)` entries of `feature`.
    ///
    /// # Panics
    /// Panics if `feature` is out of bounds.
    pub fn feature(&self, feature: usize) -> impl Iterator<Item = (u32, u32)> + '_ {
        let range = self.indptr[feature] as usize..self.indptr[feature + 1] as usize;
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.data[range].iter().copied())
    }
}

/// Compress `matrix` by feature and append the per-cell totals as a final feature.
///
/// Within a feature, cells are in ascending order. Cells with a zero total are omitted from the
/// totals feature.
///
/// # Errors
/// Returns [`ExplorerError::ConfigurationError`] if a cell total, cell index, or entry count
/// exceeds the uint32 range.
pub fn compress_features(matrix: &CountMatrix) -> Result<FeatureCsr, ExplorerError> {
    let n_cells = matrix.n_cells();
    to_u32(n_cells, "cell count")?;

    let mut buckets = vec![Vec::<(u32, u32)>::new(); matrix.n_features()];
    let mut totals = vec![0u64; n_cells];
    matrix.for_each_nonzero(|row, column, value| {
        // row < n_cells, which fits in u32
        buckets[column].push((row as u32, value));
        totals[row] += u64::from(value);
    });

    let mut csr = FeatureCsr::default();
    csr.indptr.push(0);
    for bucket in buckets {
        for (row, value) in bucket {
            csr.indices.push(row);
            csr.data.push(value);
        }
        csr.indptr.push(to_u32(csr.data.len(), "entry count")?);
    }
    for (row, total) in totals.into_iter().enumerate() {
        if total > 0 {
            let total = u32::try_from(total).map_err(|_| {
                ExplorerError::configuration(format!(
                    "total count {total} of cell {row} exceeds the uint32 range"
                ))
            })?;
            csr.indices.push(row as u32);
            csr.data.push(total);
        }
    }
    csr.indptr.push(to_u32(csr.data.len(), "entry count")?);
    Ok(csr)
}

fn store_feature_csr<TStorage: ?Sized + WritableStorageTraits>(
    storage: &Arc<TStorage>,
    csr: &FeatureCsr,
    n_cells: usize,
    feature_names: &[String],
    compressor: Option<ChunkCompressor>,
) -> Result<(), ExplorerError> {
    let feature_keys = feature_names
        .iter()
        .map(String::as_str)
        .chain([TOTAL_TRANSCRIPTS])
        .collect::<Vec<_>>();
    let feature_types = std::iter::repeat_n(FEATURE_TYPE, feature_names.len())
        .chain([TOTAL_FEATURE_TYPE])
        .collect::<Vec<_>>();

    GroupBuilder::new().build(storage.clone(), "/")?.store_metadata()?;
    GroupBuilder::new()
        .attributes(attributes_from(json!({
            "major_version": 3,
            "minor_version": 0,
            "number_cells": n_cells,
            "number_features": feature_keys.len(),
            "feature_keys": feature_keys,
            "feature_ids": feature_keys,
            "feature_types": feature_types,
        })))
        .build(storage.clone(), "/cell_features")?
        .store_metadata()?;

    let n_cells_u32 = to_u32(n_cells, "cell count")?;
    let cell_id = Array2::from_shape_fn((n_cells, 2), |(cell, column)| {
        if column == 0 { cell as u32 + 1 } else { 1 }
    });
    let array = ArrayBuilder::new(
        [u64::from(n_cells_u32), 2],
        DataType::UInt32,
        [chunk_extent(n_cells, 1), 2],
    )
    .compressor(compressor)
    .build(storage.clone(), "/cell_features/cell_id")?;
    array.store_metadata()?;
    array.store_array_ndarray(cell_id.view())?;

    for (name, values) in [
        ("data", &csr.data),
        ("indices", &csr.indices),
        ("indptr", &csr.indptr),
    ] {
        let array = ArrayBuilder::new(
            [values.len() as u64],
            DataType::UInt32,
            [chunk_extent(values.len(), 1)],
        )
        .compressor(compressor)
        .build(storage.clone(), &format!("/cell_features/{name}"))?;
        array.store_metadata()?;
        array.store_array_ndarray(Array1::from(values.clone()).view())?;
    }
    Ok(())
}

fn feature_names<S: AsRef<str>>(
    matrix: &CountMatrix,
    feature_names: &[S],
) -> Result<Vec<String>, ExplorerError> {
    if feature_names.len() != matrix.n_features() {
        return Err(ExplorerError::configuration(format!(
            "got {} feature names for {} features",
            feature_names.len(),
            matrix.n_features()
        )));
    }
    Ok(feature_names
        .iter()
        .map(|name| name.as_ref().to_string())
        .collect())
}

/// Store the `cell_features` hierarchy of `matrix` in `storage`.
///
/// # Errors
/// Returns an [`ExplorerError`] if
///  - the number of feature names does not match the matrix,
///  - counts exceed the uint32 range, or
///  - there is a storage error.
pub fn write_gene_counts<TStorage: ?Sized + WritableStorageTraits, S: AsRef<str>>(
    storage: &Arc<TStorage>,
    matrix: &CountMatrix,
    feature_names: &[S],
    options: &TableWriteOptions,
) -> Result<(), ExplorerError> {
    options.validate()?;
    let names = self::feature_names(matrix, feature_names)?;
    let csr = compress_features(matrix)?;
    store_feature_csr(storage, &csr, matrix.n_cells(), &names, options.compressor())?;
    log::info!(
        "Wrote {} cells by {} features ({} stored counts)",
        matrix.n_cells(),
        csr.n_features(),
        csr.data.len()
    );
    Ok(())
}

/// Store the `cell_features` hierarchy of `matrix` in a new ZIP file at `path`.
///
/// Inputs are validated before the file is created.
///
/// # Errors
/// See [`write_gene_counts`]. Also returns an error if the file cannot be written.
pub fn write_gene_counts_zip<P: AsRef<Path>, S: AsRef<str>>(
    path: P,
    matrix: &CountMatrix,
    feature_names: &[S],
    options: &TableWriteOptions,
) -> Result<(), ExplorerError> {
    options.validate()?;
    let names = self::feature_names(matrix, feature_names)?;
    let csr = compress_features(matrix)?;
    write_zip_store(path, |store| {
        store_feature_csr(&store, &csr, matrix.n_cells(), &names, options.compressor())
    })?;
    log::info!(
        "Wrote {} cells by {} features",
        matrix.n_cells(),
        csr.n_features()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use ndarray::{array, Ix1};

    use super::*;
    use crate::storage::store::MemoryStore;
    use crate::zarr::{Array, Group};

    fn counts() -> Array2<u32> {
        // cell 2 is empty, gene 1 is never detected
        array![[1, 0, 3], [0, 0, 2], [0, 0, 0], [5, 0, 0], [2, 0, 7]]
    }

    fn reconstruct(csr: &FeatureCsr, n_cells: usize, n_features: usize) -> Array2<u32> {
        let mut dense = Array2::zeros((n_cells, n_features));
        for feature in 0..n_features {
            for (cell, count) in csr.feature(feature) {
                dense[[cell as usize, feature]] = count;
            }
        }
        dense
    }

    #[test]
    fn compress_features_dense() -> Result<(), Box<dyn Error>> {
        let counts = counts();
        let csr = compress_features(&CountMatrix::Dense(counts.clone()))?;
        assert_eq!(csr.indptr, vec![0, 3, 3, 6, 10]);
        assert_eq!(csr.n_features(), 4);
        assert_eq!(reconstruct(&csr, 5, 3), counts);
        assert_eq!(csr.feature(0).collect::<Vec<_>>(), vec![(0, 1), (3, 5), (4, 2)]);
        assert_eq!(
            csr.feature(3).collect::<Vec<_>>(),
            vec![(0, 4), (1, 2), (3, 5), (4, 9)]
        );
        Ok(())
    }

    #[test]
    fn compress_features_csr_matches_dense() -> Result<(), Box<dyn Error>> {
        let sparse = CsrMatrix::new(
            (5, 3),
            vec![1, 3, 2, 5, 2, 7],
            vec![0, 2, 2, 0, 0, 2],
            vec![0, 2, 3, 3, 4, 6],
        )?;
        assert_eq!(
            compress_features(&sparse.into())?,
            compress_features(&counts().into())?
        );
        Ok(())
    }

    #[test]
    fn csr_matrix_invalid() {
        assert!(CsrMatrix::new((2, 2), vec![1], vec![0], vec![0, 1]).is_err());
        assert!(CsrMatrix::new((1, 2), vec![1], vec![2], vec![0, 1]).is_err());
        assert!(CsrMatrix::new((1, 2), vec![1, 2], vec![0], vec![0, 1]).is_err());
        assert!(CsrMatrix::new((2, 2), vec![1], vec![0], vec![0, 1, 0]).is_err());
    }

    #[test]
    fn csr_matrix_repeated_column() {
        assert!(matches!(
            CsrMatrix::new((1, 2), vec![1, 2], vec![0, 0], vec![0, 2]),
            Err(ExplorerError::ConfigurationError(_))
        ));
        assert!(CsrMatrix::new((2, 3), vec![1, 2, 3], vec![2, 0, 2], vec![0, 2, 3]).is_ok());
        assert!(CsrMatrix::new((1, 3), vec![1, 2, 3], vec![2, 0, 2], vec![0, 3]).is_err());
    }

    #[test]
    fn compress_features_total_overflow() {
        let counts = array![[u32::MAX, 1]];
        assert!(matches!(
            compress_features(&counts.into()),
            Err(ExplorerError::ConfigurationError(_))
        ));
    }

    #[test]
    fn gene_counts_store() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        write_gene_counts(
            &store,
            &counts().into(),
            &["A", "B", "C"],
            &TableWriteOptions::default(),
        )?;

        let group = Group::open(store.clone(), "/cell_features")?;
        assert_eq!(group.attributes()["number_cells"], 5);
        assert_eq!(group.attributes()["number_features"], 4);
        assert_eq!(
            group.attributes()["feature_keys"],
            json!(["A", "B", "C", "Total transcripts"])
        );
        assert_eq!(
            group.attributes()["feature_types"],
            json!(["gene", "gene", "gene", "aggregate_gene"])
        );

        let indptr = Array::open(store.clone(), "/cell_features/indptr")?
            .retrieve_array_ndarray::<u32>()?
            .into_dimensionality::<Ix1>()?;
        assert_eq!(indptr.to_vec(), vec![0, 3, 3, 6, 10]);
        let cell_id = Array::open(store, "/cell_features/cell_id")?;
        assert_eq!(cell_id.chunk_shape(), &[5, 2]);
        Ok(())
    }

    #[test]
    fn gene_counts_feature_names_mismatch() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cell_feature_matrix.zarr.zip");
        let result = write_gene_counts_zip(
            &path,
            &counts().into(),
            &["A", "B"],
            &TableWriteOptions::default(),
        );
        assert!(matches!(result, Err(ExplorerError::ConfigurationError(_))));
        assert!(!path.exists());
        Ok(())
    }
}
