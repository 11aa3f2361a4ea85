use derive_more::Display;
use thiserror::Error;

/// A store prefix.
///
/// A prefix is either empty (the root) or a sequence of `/` terminated non-empty components,
/// for example `cell_groups/0/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{_0}")]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Debug, Clone, Error)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate`].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    /// Create a new store prefix from `prefix` without validation.
    ///
    /// # Safety
    /// `prefix` is not validated, so this can result in an invalid store prefix.
    #[must_use]
    pub unsafe fn new_unchecked(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug_assert!(Self::validate(&prefix));
        Self(prefix)
    }

    /// The root prefix.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Extracts a string slice of the underlying prefix [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the prefix of a child node named `name`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `name` is empty or contains a `/`.
    pub fn child(&self, name: &str) -> Result<Self, StorePrefixError> {
        if name.is_empty() || name.contains('/') {
            Err(StorePrefixError(format!("{}{name}", self.0)))
        } else {
            Ok(Self(format!("{}{name}/", self.0)))
        }
    }

    /// Validates a prefix.
    ///
    /// A prefix is valid if it is empty, or it ends with `/` and every component is non-empty.
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty()
            || prefix
                .strip_suffix('/')
                .is_some_and(|prefix| prefix.split('/').all(|component| !component.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_prefix() {
        assert!(StorePrefix::new("").is_ok());
        assert!(StorePrefix::new("a/").is_ok());
        assert!(StorePrefix::new("a/b/").is_ok());
        assert!(StorePrefix::new("a").is_err());
        assert!(StorePrefix::new("/a/").is_err());
        assert!(StorePrefix::new("a//").is_err());
    }

    #[test]
    fn store_prefix_child() {
        let prefix = StorePrefix::root().child("cell_groups").unwrap();
        assert_eq!(prefix.as_str(), "cell_groups/");
        assert_eq!(prefix.child("0").unwrap().as_str(), "cell_groups/0/");
        assert!(prefix.child("a/b").is_err());
        assert!(prefix.child("").is_err());
    }
}
