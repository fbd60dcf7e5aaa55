//! Publisher sink: one message per reading on the Zenoh fabric.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dabridge_common::serialization::{Format, encode};
use dabridge_common::{Quality, Reading, TagValue};
use dabridge_engine::{HealthSnapshot, Sink, SinkError};

/// Outbound message payload.
///
/// Deliberately tag-free: the tag rides in the key expression, the payload
/// carries the bare value, its quality string and the sample time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub value: TagValue,
    pub quality: Quality,
    pub timestamp: i64,
}

impl From<&Reading> for WireMessage {
    fn from(reading: &Reading) -> Self {
        Self {
            value: reading.value.clone(),
            quality: reading.quality,
            timestamp: reading.timestamp,
        }
    }
}

/// Build the key expression for a reading under a prefix.
pub fn reading_key(prefix: &str, reading: &Reading) -> String {
    reading.tag.topic(prefix)
}

/// Sink that publishes every reading to `{key_prefix}/{tag}`.
///
/// Failed polls arrive as null/bad readings and are published like any
/// other sample, so consumers observe staleness instead of silence.
/// Transport-level retry is Zenoh's business; a put that errors here is
/// counted against health and polling carries on.
#[derive(Clone)]
pub struct ZenohPublisher {
    session: Arc<zenoh::Session>,
    key_prefix: String,
    format: Format,
}

impl ZenohPublisher {
    pub fn new(session: Arc<zenoh::Session>, key_prefix: impl Into<String>, format: Format) -> Self {
        Self {
            session,
            key_prefix: key_prefix.into(),
            format,
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Publish a bridge status message to `{key_prefix}/@/status`.
    pub async fn publish_status(&self, status: &str) -> Result<(), SinkError> {
        let key = format!("{}/@/status", self.key_prefix);
        let body = serde_json::json!({
            "bridge": "opcda",
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
        });
        self.put_raw(&key, body.to_string().into_bytes()).await
    }

    /// Publish a health snapshot to `{key_prefix}/@/health`.
    pub async fn publish_health(&self, snapshot: &HealthSnapshot) -> Result<(), SinkError> {
        let key = format!("{}/@/health", self.key_prefix);
        let payload =
            serde_json::to_vec(snapshot).map_err(|e| SinkError::Serialization(e.to_string()))?;
        self.put_raw(&key, payload).await
    }

    async fn put_raw(&self, key: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| SinkError::Delivery {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Sink for ZenohPublisher {
    async fn deliver(&self, reading: &Reading) -> Result<(), SinkError> {
        let key = reading_key(&self.key_prefix, reading);
        let message = WireMessage::from(reading);
        let payload =
            encode(&message, self.format).map_err(|e| SinkError::Serialization(e.to_string()))?;

        self.put_raw(&key, payload).await?;
        tracing::debug!(key = %key, quality = %message.quality, "Published reading");
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.publish_status("offline").await
    }
}
