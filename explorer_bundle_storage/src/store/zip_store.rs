//! ZIP stores.
//!
//! [`ZipStoreWriter`] packages a hierarchy into a single ZIP file. Entries are stored without
//! ZIP-level compression, as chunk values are compressed by the array codecs already.
//! The archive is written to a hidden sibling of the destination and only renamed into place by
//! [`ZipStoreWriter::finish`], so an interrupted or failed write never leaves a complete-looking
//! file at the destination.
//!
//! [`ZipStore`] opens an existing archive for reading and listing.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StorePrefix, WritableStorageTraits,
};

/// A ZIP store creation error.
#[derive(Debug, Error)]
pub enum ZipStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A ZIP error.
    #[error(transparent)]
    ZipError(#[from] ZipError),
    /// The path does not name a file.
    #[error("invalid zip store path {0}")]
    InvalidPath(PathBuf),
}

impl From<ZipStoreCreateError> for StorageError {
    fn from(err: ZipStoreCreateError) -> Self {
        match err {
            ZipStoreCreateError::IOError(err) => err.into(),
            ZipStoreCreateError::ZipError(err) => err.into(),
            ZipStoreCreateError::InvalidPath(path) => {
                Self::Other(format!("invalid zip store path {}", path.display()))
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|_| StorageError::Other("zip store lock poisoned".to_string()))
}

/// A write-once ZIP store.
///
/// Every key can be set exactly once. Erasing is unsupported.
pub struct ZipStoreWriter {
    destination: PathBuf,
    partial: PathBuf,
    writer: Mutex<Option<ZipWriter<BufWriter<File>>>>,
    keys: Mutex<BTreeSet<StoreKey>>,
}

impl std::fmt::Debug for ZipStoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipStoreWriter")
            .field("destination", &self.destination)
            .field("partial", &self.partial)
            .finish_non_exhaustive()
    }
}

impl ZipStoreWriter {
    /// Create a new ZIP store that will be published at `path` on [`finish`](Self::finish).
    ///
    /// # Errors
    /// Returns a [`ZipStoreCreateError`] if `path` has no file name or the partial file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ZipStoreCreateError> {
        let destination = path.as_ref().to_path_buf();
        let partial = partial_path(&destination)?;
        let file = File::create(&partial)?;
        Ok(Self {
            destination,
            partial,
            writer: Mutex::new(Some(ZipWriter::new(BufWriter::new(file)))),
            keys: Mutex::default(),
        })
    }

    /// The path the archive is published at.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Finalise the archive and move it to its destination.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the central directory cannot be written or the file cannot be renamed.
    /// The partial file is removed on failure.
    pub fn finish(self) -> Result<(), StorageError> {
        let writer = lock(&self.writer)?.take();
        let Some(writer) = writer else {
            return Err(StorageError::Other("zip store is already finished".to_string()));
        };
        let result = writer
            .finish()
            .map_err(StorageError::from)
            .and_then(|mut file| file.flush().map_err(StorageError::from))
            .and_then(|()| std::fs::rename(&self.partial, &self.destination).map_err(StorageError::from));
        if result.is_err() {
            let _ = std::fs::remove_file(&self.partial);
        }
        result
    }
}

impl Drop for ZipStoreWriter {
    fn drop(&mut self) {
        let unfinished = self
            .writer
            .get_mut()
            .map_or(true, |writer| writer.take().is_some());
        if unfinished && self.partial.exists() {
            log::warn!(
                "Discarding unfinished zip store {}",
                self.destination.display()
            );
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

fn partial_path(destination: &Path) -> Result<PathBuf, ZipStoreCreateError> {
    let file_name = destination
        .file_name()
        .ok_or_else(|| ZipStoreCreateError::InvalidPath(destination.to_path_buf()))?;
    let mut partial = OsString::from(".");
    partial.push(file_name);
    partial.push(".partial");
    Ok(destination.with_file_name(partial))
}

impl WritableStorageTraits for ZipStoreWriter {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        if !lock(&self.keys)?.insert(key.clone()) {
            return Err(StorageError::DuplicateKey(key.clone()));
        }
        let mut writer = lock(&self.writer)?;
        let writer = writer
            .as_mut()
            .ok_or_else(|| StorageError::Other("zip store is already finished".to_string()))?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(value.len() as u64 >= u64::from(u32::MAX));
        writer.start_file(key.as_str(), options)?;
        writer.write_all(&value)?;
        Ok(())
    }

    fn erase(&self, _key: &StoreKey) -> Result<(), StorageError> {
        Err(StorageError::Unsupported(
            "a zip store writer cannot erase keys".to_string(),
        ))
    }
}

/// A read-only ZIP store.
pub struct ZipStore {
    archive: Mutex<ZipArchive<BufReader<File>>>,
}

impl std::fmt::Debug for ZipStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipStore").finish_non_exhaustive()
    }
}

impl ZipStore {
    /// Open the ZIP file at `path`.
    ///
    /// # Errors
    /// Returns a [`ZipStoreCreateError`] if the file cannot be opened or is not a ZIP archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ZipStoreCreateError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file))?;
        Ok(Self {
            archive: Mutex::new(archive),
        })
    }
}

impl ReadableStorageTraits for ZipStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let mut archive = lock(&self.archive)?;
        let mut file = match archive.by_name(key.as_str()) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
        file.read_to_end(&mut bytes)?;
        Ok(Some(Bytes::from(bytes)))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        let mut archive = lock(&self.archive)?;
        let size = match archive.by_name(key.as_str()) {
            Ok(file) => Some(file.size()),
            Err(ZipError::FileNotFound) => None,
            Err(err) => return Err(err.into()),
        };
        Ok(size)
    }
}

impl ListableStorageTraits for ZipStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        let archive = lock(&self.archive)?;
        let mut keys = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(StoreKey::new)
            .collect::<Result<StoreKeys, _>>()?;
        keys.sort();
        Ok(keys)
    }

    fn size_prefix(&self, prefix: &StorePrefix) -> Result<u64, StorageError> {
        let mut size = 0;
        for key in self.list_prefix(prefix)? {
            size += self.size_key(&key)?.unwrap_or_default();
        }
        Ok(size)
    }
}
