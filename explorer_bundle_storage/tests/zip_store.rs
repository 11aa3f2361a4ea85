#![allow(missing_docs)]

use std::error::Error;

use explorer_bundle_storage::store::{ZipStore, ZipStoreWriter};
use explorer_bundle_storage::{
    Bytes, ListableStorageTraits, ReadableStorageTraits, StoreKey, StorePrefix,
    WritableStorageTraits,
};

#[test]
fn zip_store_write_read() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("analysis.zarr.zip");

    let store = ZipStoreWriter::create(&path)?;
    store.set(&StoreKey::new(".zgroup")?, Bytes::from_static(br#"{"zarr_format":2}"#))?;
    store.set(&StoreKey::new("cell_groups/.zgroup")?, Bytes::from_static(br#"{"zarr_format":2}"#))?;
    store.set(&StoreKey::new("cell_groups/0/indices/0")?, Bytes::from_static(&[1, 0, 0, 0]))?;
    assert!(!path.exists());
    store.finish()?;
    assert!(path.exists());

    let store = ZipStore::open(&path)?;
    assert_eq!(
        store.get(&StoreKey::new("cell_groups/0/indices/0")?)?,
        Some(Bytes::from_static(&[1, 0, 0, 0]))
    );
    assert_eq!(store.get(&StoreKey::new("missing")?)?, None);
    assert_eq!(store.size_key(&StoreKey::new(".zgroup")?)?, Some(17));
    assert_eq!(store.size_key(&StoreKey::new("missing")?)?, None);
    assert_eq!(store.size_prefix(&StorePrefix::new("cell_groups/")?)?, 21);
    assert_eq!(
        store.list_prefix(&StorePrefix::new("cell_groups/")?)?,
        vec![
            StoreKey::new("cell_groups/.zgroup")?,
            StoreKey::new("cell_groups/0/indices/0")?
        ]
    );
    assert_eq!(store.list()?.len(), 3);
    Ok(())
}

#[test]
fn zip_store_unfinished_is_discarded() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cells.zarr.zip");
    {
        let store = ZipStoreWriter::create(&path)?;
        store.set(&StoreKey::new(".zgroup")?, Bytes::from_static(b"{}"))?;
    }
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}
