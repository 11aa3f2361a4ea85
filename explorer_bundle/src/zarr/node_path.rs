use derive_more::Display;
use thiserror::Error;

use crate::storage::{StoreKey, StoreKeyError, StorePrefix};

/// A Zarr hierarchy node path.
///
/// The root is `/`; other paths start with `/` and have non-empty components, e.g. `/cell_groups/0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{_0}")]
pub struct NodePath(String);

/// An invalid node path.
#[derive(Debug, Clone, Error)]
#[error("invalid node path {0}")]
pub struct NodePathError(String);

impl NodePath {
    /// Create a new node path from `path`.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if `path` is not valid according to [`NodePath::validate`].
    pub fn new(path: &str) -> Result<Self, NodePathError> {
        if Self::validate(path) {
            Ok(Self(path.to_string()))
        } else {
            Err(NodePathError(path.to_string()))
        }
    }

    /// The root node path.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Extracts a string slice of the node path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a node path.
    #[must_use]
    pub fn validate(path: &str) -> bool {
        path == "/"
            || path
                .strip_prefix('/')
                .is_some_and(|path| path.split('/').all(|component| !component.is_empty()))
    }

    /// Return the path of the child node `name`.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if `name` is empty or contains a `/`.
    pub fn child(&self, name: &str) -> Result<Self, NodePathError> {
        let path = if self.0 == "/" {
            format!("/{name}")
        } else {
            format!("{}/{name}", self.0)
        };
        if name.contains('/') {
            Err(NodePathError(path))
        } else {
            Self::new(&path)
        }
    }

    /// The store prefix of the node, e.g. `cell_groups/0/` for `/cell_groups/0`.
    #[must_use]
    pub fn prefix(&self) -> StorePrefix {
        if self.0 == "/" {
            StorePrefix::root()
        } else {
            // SAFETY: validated paths have non-empty components
            unsafe { StorePrefix::new_unchecked(format!("{}/", &self.0[1..])) }
        }
    }

    /// The store key of `name` within the node.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `name` is not a valid key component.
    pub fn key(&self, name: &str) -> Result<StoreKey, StoreKeyError> {
        StoreKey::from_prefix(&self.prefix(), name)
    }
}

impl TryFrom<&str> for NodePath {
    type Error = NodePathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}
