use derive_more::Display;
use thiserror::Error;

use crate::StorePrefix;

/// A store key.
///
/// A key is a `/` separated sequence of non-empty components without a leading or trailing `/`,
/// for example `cell_features/indptr/.zarray` or `polygon_vertices/0.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct StoreKey(String);

/// An invalid store key.
#[derive(Debug, Clone, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

impl From<String> for StoreKeyError {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A list of [`StoreKey`].
pub type StoreKeys = Vec<StoreKey>;

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Create a new store key from `key` without validation.
    ///
    /// # Safety
    /// `key` is not validated, so this can result in an invalid store key.
    #[must_use]
    pub unsafe fn new_unchecked(key: impl Into<String>) -> Self {
        let key = key.into();
        debug_assert!(Self::validate(&key));
        Self(key)
    }

    /// Extracts a string slice of the underlying key [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    ///
    /// A key is valid if it is non-empty and every `/` separated component is non-empty.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty() && key.split('/').all(|component| !component.is_empty())
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }

    /// Returns the parent of this key.
    #[must_use]
    pub fn parent(&self) -> StorePrefix {
        let parent = self
            .0
            .rsplit_once('/')
            .map_or(String::new(), |(parent, _)| format!("{parent}/"));
        // SAFETY: the parent of a valid key is empty or ends with a separator
        unsafe { StorePrefix::new_unchecked(parent) }
    }

    /// Create a key for `name` within `prefix`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if the resulting key is invalid.
    pub fn from_prefix(prefix: &StorePrefix, name: &str) -> Result<Self, StoreKeyError> {
        Self::new(format!("{}{name}", prefix.as_str()))
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}
