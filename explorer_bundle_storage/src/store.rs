//! Stores.

mod memory_store;
mod zip_store;

pub use memory_store::MemoryStore;
pub use zip_store::{ZipStore, ZipStoreCreateError, ZipStoreWriter};
