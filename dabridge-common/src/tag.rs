use serde::{Deserialize, Serialize};

/// A hierarchical path naming a tag on the DA source.
///
/// Paths are opaque strings; classic DA servers use dot-separated segments
/// (`COM1.Device.Temp`) while gateway-style servers use slashes
/// (`line1/temp`). The bridge never interprets the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagPath(String);

impl TagPath {
    /// Create a tag path, rejecting the empty string.
    pub fn new(path: impl Into<String>) -> Result<Self, InvalidTagPath> {
        let path = path.into();
        if path.is_empty() {
            return Err(InvalidTagPath);
        }
        Ok(Self(path))
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the outbound key for this tag under a prefix.
    pub fn topic(&self, prefix: &str) -> String {
        format!("{}/{}", prefix, self.0)
    }
}

/// Error returned when constructing a [`TagPath`] from an empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Tag path cannot be empty")]
pub struct InvalidTagPath;

impl TryFrom<String> for TagPath {
    type Error = InvalidTagPath;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TagPath> for String {
    fn from(path: TagPath) -> Self {
        path.0
    }
}

impl std::fmt::Display for TagPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
