//! The poll scheduler: tick loop, in-flight tracking, dispatch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use dabridge_common::{Reading, TagPath};

use crate::catalog::TagCatalog;
use crate::health::BridgeHealth;
use crate::pool::{PollOutcome, PollTask, WorkerPool};
use crate::sink::Sink;
use crate::source::DaSource;

/// Timing and sizing knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Poll tick interval.
    pub interval: Duration,

    /// Worker pool size.
    pub workers: usize,

    /// Per-read timeout. Must stay below `interval` so a stalled read
    /// cannot hold its tag across a whole tick.
    pub read_timeout: Duration,

    /// Bound on the shutdown drain.
    pub grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            workers: 50,
            read_timeout: Duration::from_millis(400),
            grace: Duration::from_secs(5),
        }
    }
}

/// Handle used to request a graceful stop. Cloneable and idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the scheduler to drain and stop. Safe to call repeatedly.
    pub fn signal(&self) {
        let _ = self.tx.send(true);
    }
}

/// Handle used to swap in a freshly discovered catalog between ticks.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    tx: Arc<watch::Sender<Arc<TagCatalog>>>,
}

impl CatalogHandle {
    /// Replace the catalog; takes effect on the next tick.
    pub fn update(&self, catalog: TagCatalog) {
        let _ = self.tx.send(Arc::new(catalog));
    }
}

/// Drives the poll cycle: on every tick, submits one task per catalog tag
/// not already in flight, forwards completions to the sink as they land,
/// and drains within a bounded grace period on shutdown.
pub struct PollScheduler {
    source: Arc<dyn DaSource>,
    sink: Arc<dyn Sink>,
    health: Arc<BridgeHealth>,
    config: SchedulerConfig,
    catalog_tx: Arc<watch::Sender<Arc<TagCatalog>>>,
    catalog_rx: watch::Receiver<Arc<TagCatalog>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PollScheduler {
    pub fn new(
        catalog: TagCatalog,
        source: Arc<dyn DaSource>,
        sink: Arc<dyn Sink>,
        health: Arc<BridgeHealth>,
        config: SchedulerConfig,
    ) -> Self {
        let (catalog_tx, catalog_rx) = watch::channel(Arc::new(catalog));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            source,
            sink,
            health,
            config,
            catalog_tx: Arc::new(catalog_tx),
            catalog_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Handle for requesting shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Handle for catalog refresh.
    pub fn catalog_handle(&self) -> CatalogHandle {
        CatalogHandle {
            tx: self.catalog_tx.clone(),
        }
    }

    /// Run until shutdown is signalled, then drain and release the pool.
    pub async fn run(mut self) {
        let catalog = self.catalog_rx.borrow().clone();
        self.health.set_tags_total(catalog.len());

        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<PollOutcome>();
        let pool = WorkerPool::start(
            self.source.clone(),
            self.config.workers,
            self.config.read_timeout,
            catalog.len().max(self.config.workers),
            results_tx,
        );

        tracing::info!(
            tags = catalog.len(),
            workers = pool.workers(),
            interval_ms = self.config.interval.as_millis() as u64,
            "Scheduler running"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Tags owned by a pending task; checked before submission, cleared
        // on completion. This is what keeps slow sources from compounding
        // backlog: a tag still in flight is simply skipped this tick.
        let mut in_flight: HashSet<TagPath> = HashSet::new();
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let catalog = self.catalog_rx.borrow_and_update().clone();
                    self.health.set_tags_total(catalog.len());

                    let started = Instant::now();
                    let mut submitted = 0usize;
                    for tag in catalog.tags() {
                        if in_flight.contains(tag) {
                            continue;
                        }
                        if pool.submit(PollTask { tag: tag.clone() }).await.is_err() {
                            tracing::error!("Worker pool closed unexpectedly");
                            break;
                        }
                        in_flight.insert(tag.clone());
                        submitted += 1;
                    }
                    self.health
                        .set_last_tick_duration(started.elapsed().as_millis() as u64);
                    tracing::debug!(submitted, in_flight = in_flight.len(), "Tick");
                }
                Some(outcome) = results_rx.recv() => {
                    self.complete(outcome, &mut in_flight).await;
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }

        // Draining: nothing new is submitted; in-flight reads get a bounded
        // window to land and be delivered.
        tracing::info!(in_flight = in_flight.len(), "Draining scheduler");
        let deadline = tokio::time::Instant::now() + self.config.grace;
        while !in_flight.is_empty() {
            match tokio::time::timeout_at(deadline, results_rx.recv()).await {
                Ok(Some(outcome)) => self.complete(outcome, &mut in_flight).await,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        abandoned = in_flight.len(),
                        "Grace period elapsed, abandoning in-flight polls"
                    );
                    break;
                }
            }
        }

        // Dropping the receiver makes any straggler outcome a dead letter;
        // nothing reaches the sink past this point.
        drop(results_rx);

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        pool.shutdown(remaining.max(Duration::from_millis(50))).await;

        if let Err(e) = self.sink.close().await {
            tracing::warn!(error = %e, "Error closing sink");
        }

        let snapshot = self.health.snapshot();
        tracing::info!(
            reads_ok = snapshot.reads_ok,
            reads_failed = snapshot.reads_failed,
            "Scheduler stopped"
        );
    }

    async fn complete(&self, outcome: PollOutcome, in_flight: &mut HashSet<TagPath>) {
        in_flight.remove(&outcome.tag);

        let reading = match outcome.result {
            Ok(reading) => {
                self.health.record_read_ok(&outcome.tag);
                reading
            }
            Err(e) => {
                tracing::warn!(tag = %outcome.tag, error = %e, "Read failed");
                self.health.record_read_failure(&outcome.tag, e.to_string());
                Reading::failed(outcome.tag)
            }
        };

        if let Err(e) = self.sink.deliver(&reading).await {
            self.health.record_sink_failure();
            tracing::warn!(tag = %reading.tag, error = %e, "Sink delivery failed");
        }
    }
}
