//! Served-target sink: an attribute table answered over Zenoh queries.
//!
//! Each catalog tag becomes one addressable attribute under the configured
//! namespace. Any client can `get {key_prefix}/{tag}`; when write-back is
//! enabled, `get {key_prefix}/@/write/{tag}` with a JSON value payload
//! forwards the write to the DA source and only a source-confirmed write
//! reaches the served table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use zenoh::key_expr::KeyExpr;
use zenoh::query::Query;

use dabridge_common::{Quality, Reading, TagPath, TagValue, current_timestamp_millis};
use dabridge_engine::{BridgeHealth, DaSource, Sink, SinkError};

/// One served attribute: the latest value, its quality and sample time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServedValue {
    pub value: TagValue,
    pub quality: Quality,
    pub timestamp: i64,
}

/// The attribute table.
///
/// Scheduler updates and client write-backs both mutate it through the
/// same lock, so the two paths are mutually exclusive per tag.
#[derive(Debug, Default)]
pub struct ServedStore {
    attrs: Mutex<HashMap<TagPath, ServedValue>>,
}

impl ServedStore {
    /// Pre-create one attribute per catalog tag: null value, uncertain
    /// quality until the first poll lands.
    pub fn mirror(&self, tags: &[TagPath]) {
        let mut attrs = self.attrs.lock().unwrap();
        let now = current_timestamp_millis();
        for tag in tags {
            attrs.entry(tag.clone()).or_insert(ServedValue {
                value: TagValue::Null,
                quality: Quality::Uncertain,
                timestamp: now,
            });
        }
    }

    /// Apply a poll result.
    ///
    /// A failed poll (null value, bad quality) keeps the last known value
    /// and flips only quality and timestamp: clients see `bad` instead of
    /// a stale `good`, but the final value is not erased.
    pub fn apply(&self, reading: &Reading) {
        let mut attrs = self.attrs.lock().unwrap();
        let entry = attrs.entry(reading.tag.clone()).or_insert(ServedValue {
            value: TagValue::Null,
            quality: Quality::Uncertain,
            timestamp: reading.timestamp,
        });

        if reading.quality == Quality::Bad && reading.value.is_null() {
            entry.quality = Quality::Bad;
            entry.timestamp = reading.timestamp;
        } else {
            *entry = ServedValue {
                value: reading.value.clone(),
                quality: reading.quality,
                timestamp: reading.timestamp,
            };
        }
    }

    /// Apply a source-confirmed client write.
    pub fn apply_write(&self, tag: &TagPath, value: &TagValue) {
        let mut attrs = self.attrs.lock().unwrap();
        attrs.insert(
            tag.clone(),
            ServedValue {
                value: value.clone(),
                quality: Quality::Good,
                timestamp: current_timestamp_millis(),
            },
        );
    }

    pub fn get(&self, tag: &TagPath) -> Option<ServedValue> {
        self.attrs
            .lock()
            .unwrap()
            .get(tag)
            .cloned()
    }

    pub fn contains(&self, tag: &TagPath) -> bool {
        self.attrs
            .lock()
            .unwrap()
            .contains_key(tag)
    }

    fn snapshot(&self) -> Vec<(TagPath, ServedValue)> {
        self.attrs
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Sink that serves the attribute table over Zenoh queryables.
pub struct ServedTarget {
    store: Arc<ServedStore>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServedTarget {
    /// Declare the queryables and start answering.
    ///
    /// The write endpoint is declared only when `readonly` is false **and**
    /// the source can write at all; with `readonly` set the capability is
    /// structurally absent, not rejected at runtime.
    pub async fn serve(
        session: Arc<zenoh::Session>,
        key_prefix: &str,
        tags: &[TagPath],
        source: Arc<dyn DaSource>,
        readonly: bool,
        health: Arc<BridgeHealth>,
    ) -> Result<Self, dabridge_common::Error> {
        let store = Arc::new(ServedStore::default());
        store.mirror(tags);

        let mut tasks = Vec::new();

        let read_expr = format!("{}/**", key_prefix);
        let read_queryable = session.declare_queryable(&read_expr).await?;
        tracing::info!(keyexpr = %read_expr, tags = tags.len(), "Serving attribute table");
        {
            let store = store.clone();
            let key_prefix = key_prefix.to_string();
            tasks.push(tokio::spawn(async move {
                while let Ok(query) = read_queryable.recv_async().await {
                    answer_read(&query, &store, &key_prefix).await;
                }
            }));
        }

        if readonly {
            tracing::info!("Write-back disabled (readonly)");
        } else if !source.supports_write() {
            tracing::warn!("Source does not support writes, write-back not exposed");
        } else {
            let write_expr = format!("{}/@/write/**", key_prefix);
            let write_queryable = session.declare_queryable(&write_expr).await?;
            tracing::info!(keyexpr = %write_expr, "Write-back enabled");
            let store = store.clone();
            let key_prefix = key_prefix.to_string();
            tasks.push(tokio::spawn(async move {
                let write_prefix = format!("{}/@/write/", key_prefix);
                while let Ok(query) = write_queryable.recv_async().await {
                    handle_write(&query, &store, source.as_ref(), &write_prefix, &health).await;
                }
            }));
        }

        Ok(Self { store, tasks })
    }

    /// The underlying table (shared with the queryable loops).
    pub fn store(&self) -> Arc<ServedStore> {
        self.store.clone()
    }
}

#[async_trait]
impl Sink for ServedTarget {
    async fn deliver(&self, reading: &Reading) -> Result<(), SinkError> {
        self.store.apply(reading);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        // Undeclares the queryables by dropping them with their loops.
        for task in &self.tasks {
            task.abort();
        }
        Ok(())
    }
}

/// Answer one client read: reply with every served attribute whose key
/// the query matches.
async fn answer_read(query: &Query, store: &ServedStore, key_prefix: &str) {
    // The table wildcard also covers the `@` namespace; those queries
    // belong to the write handler.
    let meta_prefix = format!("{}/@/", key_prefix);
    if query.key_expr().as_str().starts_with(&meta_prefix) {
        return;
    }

    for (tag, served) in store.snapshot() {
        let key = tag.topic(key_prefix);
        let Ok(key_expr) = KeyExpr::try_from(key.as_str()) else {
            continue;
        };
        if !query.key_expr().intersects(&key_expr) {
            continue;
        }

        match serde_json::to_vec(&served) {
            Ok(payload) => {
                if let Err(e) = query.reply(key_expr, payload).await {
                    tracing::warn!(key = %key, error = %e, "Failed to reply to read query");
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode served value");
            }
        }
    }
}

/// Handle one client write request.
async fn handle_write(
    query: &Query,
    store: &ServedStore,
    source: &dyn DaSource,
    write_prefix: &str,
    health: &BridgeHealth,
) {
    let key = query.key_expr().as_str().to_string();
    let Some(tag_str) = key.strip_prefix(write_prefix) else {
        return;
    };
    let Ok(tag) = TagPath::new(tag_str) else {
        reject(query, "empty tag path").await;
        return;
    };

    if !store.contains(&tag) {
        health.record_write(false);
        reject(query, &format!("tag '{}' is not served by this bridge", tag)).await;
        return;
    }

    let Some(payload) = query.payload() else {
        health.record_write(false);
        reject(query, "missing value payload").await;
        return;
    };

    let value: TagValue = match serde_json::from_slice(&payload.to_bytes()) {
        Ok(value) => value,
        Err(e) => {
            health.record_write(false);
            reject(query, &format!("invalid value payload: {}", e)).await;
            return;
        }
    };

    // Forward to the source first; the served table must never show a
    // value the physical system has not accepted.
    match source.write(&tag, &value).await {
        Ok(()) => {
            store.apply_write(&tag, &value);
            health.record_write(true);
            tracing::info!(tag = %tag, "Write-back accepted");

            let body = serde_json::json!({ "status": "accepted" });
            if let Err(e) = query
                .reply(query.key_expr().clone(), body.to_string().into_bytes())
                .await
            {
                tracing::warn!(tag = %tag, error = %e, "Failed to acknowledge write");
            }
        }
        Err(e) => {
            health.record_write(false);
            tracing::warn!(tag = %tag, error = %e, "Write-back rejected");
            reject(query, &e.to_string()).await;
        }
    }
}

async fn reject(query: &Query, message: &str) {
    if let Err(e) = query.reply_err(message.as_bytes().to_vec()).await {
        tracing::warn!(error = %e, "Failed to send rejection reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> TagPath {
        TagPath::new(name).unwrap()
    }

    fn good(name: &str, value: f64) -> Reading {
        Reading::new(tag(name), TagValue::Number(value), Quality::Good)
    }

    #[test]
    fn test_mirror_creates_uncertain_attributes() {
        let store = ServedStore::default();
        store.mirror(&[tag("a"), tag("b")]);

        let served = store.get(&tag("a")).unwrap();
        assert!(served.value.is_null());
        assert_eq!(served.quality, Quality::Uncertain);
    }

    #[test]
    fn test_apply_replaces_value() {
        let store = ServedStore::default();
        store.mirror(&[tag("a")]);
        store.apply(&good("a", 42.0));

        let served = store.get(&tag("a")).unwrap();
        assert_eq!(served.value, TagValue::Number(42.0));
        assert_eq!(served.quality, Quality::Good);
    }

    #[test]
    fn test_failed_poll_keeps_value_flips_quality() {
        let store = ServedStore::default();
        store.apply(&good("a", 42.0));
        store.apply(&Reading::failed(tag("a")));

        let served = store.get(&tag("a")).unwrap();
        assert_eq!(served.value, TagValue::Number(42.0));
        assert_eq!(served.quality, Quality::Bad);
    }

    #[test]
    fn test_recovery_after_failure() {
        let store = ServedStore::default();
        store.apply(&good("a", 42.0));
        store.apply(&Reading::failed(tag("a")));
        store.apply(&good("a", 43.0));

        let served = store.get(&tag("a")).unwrap();
        assert_eq!(served.value, TagValue::Number(43.0));
        assert_eq!(served.quality, Quality::Good);
    }

    #[test]
    fn test_apply_write_sets_good_quality() {
        let store = ServedStore::default();
        store.mirror(&[tag("sp")]);
        store.apply_write(&tag("sp"), &TagValue::Number(25.0));

        let served = store.get(&tag("sp")).unwrap();
        assert_eq!(served.value, TagValue::Number(25.0));
        assert_eq!(served.quality, Quality::Good);
    }

    #[test]
    fn test_served_value_wire_shape() {
        let served = ServedValue {
            value: TagValue::Number(123.45),
            quality: Quality::Uncertain,
            timestamp: 1700000000000,
        };

        let json = serde_json::to_value(&served).unwrap();
        assert_eq!(json["value"], serde_json::json!(123.45));
        assert_eq!(json["quality"], serde_json::json!("uncertain"));
        assert_eq!(json["timestamp"], serde_json::json!(1700000000000i64));
    }
}
