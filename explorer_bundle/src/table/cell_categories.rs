use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use itertools::Itertools;
use ndarray::Array1;
use serde_json::json;

use super::{to_u32, TableWriteOptions};
use crate::shapes::attributes_from;
use crate::storage::WritableStorageTraits;
use crate::zarr::{chunk_extent, write_zip_store, ArrayBuilder, ChunkCompressor, DataType, GroupBuilder};
use crate::ExplorerError;

/// A categorical cell annotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoricalColumn {
    name: String,
    categories: Vec<String>,
    codes: Vec<Option<u32>>,
}

impl CategoricalColumn {
    /// Create a column from its ordered `categories` and per-cell category `codes`.
    ///
    /// A [`None`] code marks a cell without a category.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if a category is repeated or a code is out
    /// of range of `categories`.
    pub fn new(
        name: impl Into<String>,
        categories: Vec<String>,
        codes: Vec<Option<u32>>,
    ) -> Result<Self, ExplorerError> {
        let name = name.into();
        if let Some(category) = categories.iter().duplicates().next() {
            return Err(ExplorerError::configuration(format!(
                "column {name} repeats category {category}"
            )));
        }
        if let Some(code) = codes
            .iter()
            .flatten()
            .find(|&&code| code as usize >= categories.len())
        {
            return Err(ExplorerError::configuration(format!(
                "column {name} has code {code} but {} categories",
                categories.len()
            )));
        }
        Ok(Self {
            name,
            categories,
            codes,
        })
    }

    /// Create a column from per-cell `labels`, each of which must be one of `categories`.
    ///
    /// # Errors
    /// Returns [`ExplorerError::ConfigurationError`] if a category is repeated or a label is not
    /// a category.
    pub fn from_labels<S: AsRef<str>>(
        name: impl Into<String>,
        categories: Vec<String>,
        labels: &[Option<S>],
    ) -> Result<Self, ExplorerError> {
        let name = name.into();
        let lookup = categories
            .iter()
            .enumerate()
            .map(|(code, category)| (category.as_str(), code))
            .collect::<HashMap<_, _>>();
        let codes = labels
            .iter()
            .map(|label| {
                label
                    .as_ref()
                    .map(|label| {
                        let label: &str = label.as_ref();
                        let code = lookup.get(label).ok_or_else(|| {
                            ExplorerError::configuration(format!(
                                "column {name} has label {label} which is not a category"
                            ))
                        })?;
                        to_u32(*code, "category code")
                    })
                    .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, categories, codes)
    }

    /// The column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered category labels.
    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// The number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true if the column has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// The cells of a column partitioned by category.
///
/// Category `k` holds the ascending cell indices `indices[indptr[k]..indptr[k + 1]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryPartition {
    /// Cell indices grouped by category.
    pub indices: Vec<u32>,
    /// Category boundaries, one more than the number of categories.
    pub indptr: Vec<u32>,
}

/// Partition the cells of `column` by category, in category order.
///
/// Cells without a category are in no partition.
///
/// # Errors
/// Returns [`ExplorerError::ConfigurationError`] if the cell count exceeds the uint32 range.
pub fn partition_categories(column: &CategoricalColumn) -> Result<CategoryPartition, ExplorerError> {
    to_u32(column.len(), "cell count")?;
    let mut counts = vec![0u32; column.categories.len()];
    for code in column.codes.iter().flatten() {
        counts[*code as usize] += 1;
    }

    let mut indptr = Vec::with_capacity(counts.len() + 1);
    indptr.push(0);
    for count in &counts {
        indptr.push(indptr[indptr.len() - 1] + count);
    }

    let mut next = indptr[..counts.len()].to_vec();
    let mut indices = vec![0u32; indptr[counts.len()] as usize];
    for (cell, code) in column.codes.iter().enumerate() {
        if let Some(code) = code {
            let slot = &mut next[*code as usize];
            indices[*slot as usize] = cell as u32;
            *slot += 1;
        }
    }
    Ok(CategoryPartition { indices, indptr })
}

fn store_partitions<TStorage: ?Sized + WritableStorageTraits>(
    storage: &Arc<TStorage>,
    columns: &[CategoricalColumn],
    partitions: &[CategoryPartition],
    compressor: Option<ChunkCompressor>,
) -> Result<(), ExplorerError> {
    GroupBuilder::new().build(storage.clone(), "/")?.store_metadata()?;
    GroupBuilder::new()
        .attributes(attributes_from(json!({
            "major_version": 1,
            "minor_version": 0,
            "number_groupings": columns.len(),
            "grouping_names": columns.iter().map(CategoricalColumn::name).collect::<Vec<_>>(),
            "group_names": columns.iter().map(CategoricalColumn::categories).collect::<Vec<_>>(),
        })))
        .build(storage.clone(), "/cell_groups")?
        .store_metadata()?;

    for (index, partition) in partitions.iter().enumerate() {
        let path = format!("/cell_groups/{index}");
        GroupBuilder::new()
            .build(storage.clone(), &path)?
            .store_metadata()?;
        for (name, values) in [("indices", &partition.indices), ("indptr", &partition.indptr)] {
            let array = ArrayBuilder::new(
                [values.len() as u64],
                DataType::UInt32,
                [chunk_extent(values.len(), 1)],
            )
            .compressor(compressor)
            .build(storage.clone(), &format!("{path}/{name}"))?;
            array.store_metadata()?;
            array.store_array_ndarray(Array1::from(values.clone()).view())?;
        }
    }
    Ok(())
}

fn partition_columns(columns: &[CategoricalColumn]) -> Result<Vec<CategoryPartition>, ExplorerError> {
    if let Some(column) = columns.iter().find(|column| column.len() != columns[0].len()) {
        return Err(ExplorerError::configuration(format!(
            "column {} has {} cells, expected {}",
            column.name(),
            column.len(),
            columns[0].len()
        )));
    }
    columns.iter().map(partition_categories).collect()
}

/// Store the `cell_groups` hierarchy of `columns` in `storage`.
///
/// Column `i` is stored in the group `cell_groups/i`.
///
/// # Errors
/// Returns an [`ExplorerError`] if the columns have different lengths or there is a storage error.
pub fn write_cell_categories<TStorage: ?Sized + WritableStorageTraits>(
    storage: &Arc<TStorage>,
    columns: &[CategoricalColumn],
    options: &TableWriteOptions,
) -> Result<(), ExplorerError> {
    options.validate()?;
    let partitions = partition_columns(columns)?;
    store_partitions(storage, columns, &partitions, options.compressor())?;
    log::info!("Wrote {} cell groupings", columns.len());
    Ok(())
}

/// Store the `cell_groups` hierarchy of `columns` in a new ZIP file at `path`.
///
/// Inputs are validated before the file is created.
///
/// # Errors
/// See [`write_cell_categories`]. Also returns an error if the file cannot be written.
pub fn write_cell_categories_zip<P: AsRef<Path>>(
    path: P,
    columns: &[CategoricalColumn],
    options: &TableWriteOptions,
) -> Result<(), ExplorerError> {
    options.validate()?;
    let partitions = partition_columns(columns)?;
    write_zip_store(path, |store| {
        store_partitions(&store, columns, &partitions, options.compressor())
    })?;
    log::info!("Wrote {} cell groupings", columns.len());
    Ok(())
}
