//! Console sink for dry runs: logs readings instead of shipping them.

use async_trait::async_trait;

use dabridge_common::Reading;
use dabridge_engine::{Sink, SinkError};

use crate::publish::{WireMessage, reading_key};

/// Sink that prints the would-be message for every reading.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    key_prefix: String,
}

impl ConsoleSink {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn deliver(&self, reading: &Reading) -> Result<(), SinkError> {
        let message = serde_json::to_string(&WireMessage::from(reading))
            .map_err(|e| SinkError::Serialization(e.to_string()))?;
        tracing::info!(
            key = %reading_key(&self.key_prefix, reading),
            payload = %message,
            "Would publish"
        );
        Ok(())
    }
}
