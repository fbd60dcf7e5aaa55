//! The DA source capability interface.

use async_trait::async_trait;

use dabridge_common::{Reading, TagPath, TagValue};

use crate::error::{ReadError, WriteError};

/// Capability interface over a classic tag/value/quality data source.
///
/// The wire protocol behind it is deliberately opaque: the engine only
/// needs timestamped value+quality reads, namespace discovery, and an
/// optional write path. Implementations are expected to bound each call
/// internally; the engine additionally wraps reads in its own timeout.
#[async_trait]
pub trait DaSource: Send + Sync {
    /// Enumerate the tags below a namespace prefix.
    ///
    /// An empty prefix lists the whole namespace.
    async fn discover(&self, prefix: &str) -> Result<Vec<TagPath>, ReadError>;

    /// Read the current value of a tag.
    async fn read(&self, tag: &TagPath) -> Result<Reading, ReadError>;

    /// Whether [`DaSource::write`] can ever succeed.
    fn supports_write(&self) -> bool {
        false
    }

    /// Write a value to a tag on the source.
    ///
    /// Only meaningful when [`DaSource::supports_write`] is true; the
    /// default refuses everything.
    async fn write(&self, tag: &TagPath, value: &TagValue) -> Result<(), WriteError> {
        let _ = (tag, value);
        Err(WriteError::Unsupported)
    }
}
