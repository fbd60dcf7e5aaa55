//! The sink capability interface.

use async_trait::async_trait;

use dabridge_common::Reading;

use crate::error::SinkError;

/// Capability interface over a downstream target for readings.
///
/// One implementation publishes each reading as a message; another keeps a
/// served attribute table that clients query. Either way the engine hands
/// over every reading exactly once, in completion order, with no cross-tag
/// ordering guarantee. Failed polls arrive as null-value/bad-quality
/// readings so the sink can make staleness observable.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one reading downstream.
    async fn deliver(&self, reading: &Reading) -> Result<(), SinkError>;

    /// Release transport resources. Called once, after the last delivery.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
