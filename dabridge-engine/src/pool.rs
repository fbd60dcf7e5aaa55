//! Fixed-size worker pool for concurrent source reads.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use dabridge_common::{Reading, TagPath};

use crate::error::{EngineError, ReadError};
use crate::source::DaSource;

/// One pending poll of one tag. Created per tag per tick, consumed by
/// exactly one worker, discarded after its outcome is forwarded.
#[derive(Debug, Clone)]
pub struct PollTask {
    pub tag: TagPath,
}

/// The result of one executed [`PollTask`].
#[derive(Debug)]
pub struct PollOutcome {
    pub tag: TagPath,
    pub result: Result<Reading, ReadError>,
}

/// A fixed pool of executors bounding how many source reads run at once.
///
/// Tasks are served first-submitted-first-served from a shared queue; a
/// worker stalled on a slow read does not affect the others. Outcomes flow
/// back on an unbounded channel in completion order; boundedness comes
/// from the scheduler's one-in-flight-per-tag invariant, not the channel.
pub struct WorkerPool {
    queue: mpsc::Sender<PollTask>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` executors reading from `source`.
    ///
    /// Every read is wrapped in `read_timeout`; a read that exceeds it
    /// completes as [`ReadError::Timeout`]. `queue_capacity` should cover
    /// the largest tag set a single tick can submit.
    pub fn start(
        source: Arc<dyn DaSource>,
        workers: usize,
        read_timeout: Duration,
        queue_capacity: usize,
        results: mpsc::UnboundedSender<PollOutcome>,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::channel::<PollTask>(queue_capacity.max(1));
        let task_rx = Arc::new(Mutex::new(task_rx));

        let handles = (0..workers.max(1))
            .map(|id| {
                let source = source.clone();
                let queue = task_rx.clone();
                let results = results.clone();
                tokio::spawn(worker_loop(id, source, queue, read_timeout, results))
            })
            .collect();

        Self {
            queue: task_tx,
            handles,
        }
    }

    /// Submit a task for execution.
    ///
    /// Waits when all workers are busy and the queue is full; fails only
    /// once the pool has shut down.
    pub async fn submit(&self, task: PollTask) -> Result<(), EngineError> {
        self.queue
            .send(task)
            .await
            .map_err(|_| EngineError::PoolClosed)
    }

    /// Number of worker tasks.
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Shut the pool down, bounding the wait for in-flight reads.
    ///
    /// Closes the queue so idle workers exit, then waits up to `grace` for
    /// the rest. Workers still running past the deadline are aborted and
    /// their outcomes discarded.
    pub async fn shutdown(mut self, grace: Duration) {
        drop(self.queue);

        let drain = async {
            for handle in &mut self.handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(grace, drain).await.is_err() {
            let stragglers = self.handles.iter().filter(|h| !h.is_finished()).count();
            tracing::warn!(stragglers, "Grace period elapsed, aborting workers");
            for handle in &self.handles {
                handle.abort();
            }
        }
    }
}

async fn worker_loop(
    id: usize,
    source: Arc<dyn DaSource>,
    queue: Arc<Mutex<mpsc::Receiver<PollTask>>>,
    read_timeout: Duration,
    results: mpsc::UnboundedSender<PollOutcome>,
) {
    tracing::debug!(worker = id, "Worker started");

    loop {
        // The lock is held only while dequeuing, never across a read.
        let task = { queue.lock().await.recv().await };
        let Some(task) = task else {
            break;
        };

        let result = match tokio::time::timeout(read_timeout, source.read(&task.tag)).await {
            Ok(result) => result,
            Err(_) => Err(ReadError::Timeout),
        };

        let outcome = PollOutcome {
            tag: task.tag,
            result,
        };

        // The scheduler dropping its receiver means shutdown; stop pulling.
        if results.send(outcome).is_err() {
            break;
        }
    }

    tracing::debug!(worker = id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dabridge_common::{Quality, TagValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source that records its own concurrency high-water mark.
    struct SlowSource {
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowSource {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DaSource for SlowSource {
        async fn discover(&self, _prefix: &str) -> Result<Vec<TagPath>, ReadError> {
            Ok(vec![])
        }

        async fn read(&self, tag: &TagPath) -> Result<Reading, ReadError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Reading::new(tag.clone(), TagValue::Integer(1), Quality::Good))
        }
    }

    /// Source that fails reads for one specific tag.
    struct FlakySource {
        failing: &'static str,
    }

    #[async_trait]
    impl DaSource for FlakySource {
        async fn discover(&self, _prefix: &str) -> Result<Vec<TagPath>, ReadError> {
            Ok(vec![])
        }

        async fn read(&self, tag: &TagPath) -> Result<Reading, ReadError> {
            if tag.as_str() == self.failing {
                Err(ReadError::TagNotFound(tag.clone()))
            } else {
                Ok(Reading::new(tag.clone(), TagValue::Boolean(true), Quality::Good))
            }
        }
    }

    fn tag(name: &str) -> TagPath {
        TagPath::new(name).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bounded_by_worker_count() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(30)));
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(
            source.clone(),
            3,
            Duration::from_secs(1),
            16,
            results_tx,
        );

        for i in 0..12 {
            pool.submit(PollTask { tag: tag(&format!("t{}", i)) })
                .await
                .unwrap();
        }

        for _ in 0..12 {
            let outcome = results_rx.recv().await.unwrap();
            assert!(outcome.result.is_ok());
        }

        assert!(source.peak.load(Ordering::SeqCst) <= 3);
        pool.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_read_times_out() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(200)));
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(source, 1, Duration::from_millis(20), 4, results_tx);

        pool.submit(PollTask { tag: tag("stuck") }).await.unwrap();

        let outcome = results_rx.recv().await.unwrap();
        assert!(matches!(outcome.result, Err(ReadError::Timeout)));
        pool.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_does_not_affect_other_tags() {
        let source = Arc::new(FlakySource { failing: "bad" });
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(source, 2, Duration::from_secs(1), 8, results_tx);

        for name in ["good1", "bad", "good2"] {
            pool.submit(PollTask { tag: tag(name) }).await.unwrap();
        }

        let mut ok = 0;
        let mut failed = 0;
        for _ in 0..3 {
            let outcome = results_rx.recv().await.unwrap();
            match outcome.result {
                Ok(_) => ok += 1,
                Err(_) => {
                    assert_eq!(outcome.tag.as_str(), "bad");
                    failed += 1;
                }
            }
        }
        assert_eq!((ok, failed), (2, 1));
        pool.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_pool_shuts_down_promptly() {
        let source = Arc::new(SlowSource::new(Duration::from_millis(1)));
        let (results_tx, _results_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(source, 4, Duration::from_secs(1), 4, results_tx);

        let started = std::time::Instant::now();
        pool.shutdown(Duration::from_secs(10)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_completes_within_grace_with_stalled_reads() {
        // Reads stall well past the grace period; shutdown must not wait
        // for them.
        let source = Arc::new(SlowSource::new(Duration::from_secs(30)));
        let (results_tx, _results_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(source, 2, Duration::from_secs(60), 4, results_tx);

        pool.submit(PollTask { tag: tag("a") }).await.unwrap();
        pool.submit(PollTask { tag: tag("b") }).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        pool.shutdown(Duration::from_millis(100)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
