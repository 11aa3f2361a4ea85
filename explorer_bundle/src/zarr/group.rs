use std::sync::Arc;

use super::{Attributes, GroupMetadataV2, NodePath, ZarrError, ZATTRS, ZGROUP};
use crate::storage::{Bytes, ReadableStorageTraits, WritableStorageTraits};

/// A [`Group`] builder.
#[derive(Debug, Clone, Default)]
pub struct GroupBuilder {
    attributes: Attributes,
}

impl GroupBuilder {
    /// Create a new group builder with empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attributes.
    pub fn attributes(&mut self, attributes: Attributes) -> &mut Self {
        self.attributes = attributes;
        self
    }

    /// Build into a [`Group`] at `path` of `storage`.
    ///
    /// # Errors
    /// Returns [`ZarrError::NodePathError`] if `path` is invalid.
    pub fn build<TStorage: ?Sized>(
        &self,
        storage: Arc<TStorage>,
        path: &str,
    ) -> Result<Group<TStorage>, ZarrError> {
        Ok(Group {
            storage,
            path: NodePath::new(path)?,
            attributes: self.attributes.clone(),
        })
    }
}

/// A Zarr V2 group.
#[derive(Debug)]
pub struct Group<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    path: NodePath,
    attributes: Attributes,
}

impl<TStorage: ?Sized> Group<TStorage> {
    /// The node path of the group.
    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// The group attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> Group<TStorage> {
    /// Store the group metadata, and the attributes if there are any.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if there is an underlying store error.
    pub fn store_metadata(&self) -> Result<(), ZarrError> {
        let metadata = serde_json::to_vec_pretty(&GroupMetadataV2::default())?;
        self.storage
            .set(&self.path.key(ZGROUP)?, Bytes::from(metadata))?;
        if !self.attributes.is_empty() {
            let attributes = serde_json::to_vec_pretty(&self.attributes)?;
            self.storage
                .set(&self.path.key(ZATTRS)?, Bytes::from(attributes))?;
        }
        Ok(())
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> Group<TStorage> {
    /// Open the group at `path` of `storage`.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if the group metadata is missing or invalid.
    pub fn open(storage: Arc<TStorage>, path: &str) -> Result<Self, ZarrError> {
        let path = NodePath::new(path)?;
        let metadata = storage
            .get(&path.key(ZGROUP)?)?
            .ok_or_else(|| ZarrError::MissingMetadata(path.clone()))?;
        let _metadata: GroupMetadataV2 = serde_json::from_slice(&metadata)?;
        let attributes = match storage.get(&path.key(ZATTRS)?)? {
            Some(attributes) => serde_json::from_slice(&attributes)?,
            None => Attributes::default(),
        };
        Ok(Self {
            storage,
            path,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::storage::store::MemoryStore;
    use crate::storage::StoreKey;

    #[test]
    fn group_metadata_and_attributes() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        let mut attributes = Attributes::new();
        attributes.insert("number_cells".to_string(), 3.into());
        GroupBuilder::new()
            .attributes(attributes.clone())
            .build(store.clone(), "/cell_features")?
            .store_metadata()?;
        GroupBuilder::new().build(store.clone(), "/")?.store_metadata()?;

        let zgroup = store.get(&StoreKey::new(".zgroup")?)?.unwrap();
        let zgroup: serde_json::Value = serde_json::from_slice(&zgroup)?;
        assert_eq!(zgroup, serde_json::json!({"zarr_format": 2}));
        assert!(store.get(&StoreKey::new(".zattrs")?)?.is_none());

        let group = Group::open(store.clone(), "/cell_features")?;
        assert_eq!(group.attributes(), &attributes);
        assert_eq!(group.path().as_str(), "/cell_features");
        assert!(Group::open(store, "/missing").is_err());
        Ok(())
    }
}
