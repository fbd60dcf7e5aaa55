//! Bridge health counters and per-tag liveness.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use dabridge_common::{TagPath, current_timestamp_millis};

/// Consecutive failures after which a tag counts as failed.
const FAILED_THRESHOLD: u32 = 3;

/// Health metrics for one running bridge.
///
/// All counters are updated from the scheduler and the sinks; reads take a
/// cheap snapshot for publishing or logging.
#[derive(Debug)]
pub struct BridgeHealth {
    start_time: Instant,
    tags_total: AtomicU64,
    reads_ok: AtomicU64,
    reads_failed: AtomicU64,
    writes_accepted: AtomicU64,
    writes_rejected: AtomicU64,
    sink_failures: AtomicU64,
    last_tick_duration_ms: AtomicU64,
    tag_states: RwLock<HashMap<TagPath, TagState>>,
}

#[derive(Debug, Clone, Default)]
struct TagState {
    last_seen: i64,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl BridgeHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            tags_total: AtomicU64::new(0),
            reads_ok: AtomicU64::new(0),
            reads_failed: AtomicU64::new(0),
            writes_accepted: AtomicU64::new(0),
            writes_rejected: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            last_tick_duration_ms: AtomicU64::new(0),
            tag_states: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_tags_total(&self, total: usize) {
        self.tags_total.store(total as u64, Ordering::Relaxed);
    }

    pub fn record_read_ok(&self, tag: &TagPath) {
        self.reads_ok.fetch_add(1, Ordering::Relaxed);
        let mut states = self.tag_states.write().unwrap();
        let state = states.entry(tag.clone()).or_default();
        state.last_seen = current_timestamp_millis();
        state.consecutive_failures = 0;
        state.last_error = None;
    }

    pub fn record_read_failure(&self, tag: &TagPath, error: impl Into<String>) {
        self.reads_failed.fetch_add(1, Ordering::Relaxed);
        let mut states = self.tag_states.write().unwrap();
        let state = states.entry(tag.clone()).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(error.into());
    }

    pub fn record_write(&self, accepted: bool) {
        if accepted {
            self.writes_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.writes_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_tick_duration(&self, millis: u64) {
        self.last_tick_duration_ms.store(millis, Ordering::Relaxed);
    }

    /// Number of tags currently past the consecutive-failure threshold.
    pub fn tags_failing(&self) -> u64 {
        let states = self.tag_states.read().unwrap();
        states
            .values()
            .filter(|s| s.consecutive_failures >= FAILED_THRESHOLD)
            .count() as u64
    }

    /// Take a serializable snapshot of the counters.
    pub fn snapshot(&self) -> HealthSnapshot {
        let tags_failing = self.tags_failing();
        HealthSnapshot {
            status: if tags_failing == 0 && self.sink_failures.load(Ordering::Relaxed) == 0 {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            uptime_secs: self.start_time.elapsed().as_secs(),
            tags_total: self.tags_total.load(Ordering::Relaxed),
            tags_failing,
            reads_ok: self.reads_ok.load(Ordering::Relaxed),
            reads_failed: self.reads_failed.load(Ordering::Relaxed),
            writes_accepted: self.writes_accepted.load(Ordering::Relaxed),
            writes_rejected: self.writes_rejected.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            last_tick_duration_ms: self.last_tick_duration_ms.load(Ordering::Relaxed),
        }
    }

    /// Per-tag liveness rows, catalog-order-independent.
    pub fn liveness(&self) -> Vec<TagLiveness> {
        let states = self.tag_states.read().unwrap();
        states
            .iter()
            .map(|(tag, state)| TagLiveness {
                tag: tag.clone(),
                last_seen: state.last_seen,
                consecutive_failures: state.consecutive_failures,
                last_error: state.last_error.clone(),
            })
            .collect()
    }
}

impl Default for BridgeHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Health snapshot for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: String,
    pub uptime_secs: u64,
    pub tags_total: u64,
    pub tags_failing: u64,
    pub reads_ok: u64,
    pub reads_failed: u64,
    pub writes_accepted: u64,
    pub writes_rejected: u64,
    pub sink_failures: u64,
    pub last_tick_duration_ms: u64,
}

/// Per-tag liveness for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagLiveness {
    pub tag: TagPath,
    pub last_seen: i64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
