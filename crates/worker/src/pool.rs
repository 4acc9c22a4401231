//! Fixed-size conversion pool with a FIFO scheduler.
//!
//! The pool spawns its workers once, at construction, and never grows or
//! shrinks. The scheduler owns a free-worker list and a pending queue:
//!
//! 1. [`ConversionPool::submit`] appends the task to the pending queue and
//!    dispatches.
//! 2. Dispatch pairs free workers with pending tasks, oldest task first, and
//!    hands each task to its worker over that worker's channel.
//! 3. When a worker finishes (success, error or panic) it replies on the
//!    task's result channel, rejoins the free list and dispatches again.
//!
//! The pending queue is unbounded; callers that need a deadline put their own
//! timeout around `submit`.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::converter::Converter;
use crate::task::{ConversionError, ConversionTask};

type TaskResult = Result<(), ConversionError>;

/// A task waiting for, or assigned to, a worker.
struct QueuedTask {
    task: ConversionTask,
    reply: oneshot::Sender<TaskResult>,
}

#[derive(Default)]
struct SchedulerState {
    free: Vec<usize>,
    pending: VecDeque<QueuedTask>,
    /// Worker id -> cache key being produced.
    busy: HashMap<usize, String>,
}

struct PoolInner {
    state: Mutex<SchedulerState>,
    workers: Vec<mpsc::UnboundedSender<QueuedTask>>,
}

/// Point-in-time view of the pool, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub busy: usize,
    pub queued: usize,
}

/// Handle to the worker pool. Cheap to clone; workers stop once the last
/// handle is dropped and their current task finishes.
#[derive(Clone)]
pub struct ConversionPool {
    inner: Arc<PoolInner>,
}

impl ConversionPool {
    /// Spawn `size` workers (at least one) running `converter`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(size: usize, converter: Arc<dyn Converter>) -> Self {
        let size = size.max(1);
        let mut senders = Vec::with_capacity(size);
        let mut receivers = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(rx);
        }

        let inner = Arc::new(PoolInner {
            state: Mutex::new(SchedulerState {
                free: (0..size).rev().collect(),
                ..Default::default()
            }),
            workers: senders,
        });

        for (id, rx) in receivers.into_iter().enumerate() {
            tokio::spawn(worker_loop(
                id,
                rx,
                Arc::clone(&converter),
                Arc::downgrade(&inner),
            ));
        }

        tracing::info!(workers = size, "Conversion pool started");
        Self { inner }
    }

    /// Default pool size: one worker per available core.
    pub fn default_size() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .max(1)
    }

    pub fn size(&self) -> usize {
        self.inner.workers.len()
    }

    /// Queue a task and wait for its result.
    pub async fn submit(&self, task: ConversionTask) -> TaskResult {
        let (reply, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock().await;
            tracing::debug!(
                cache_key = %task.cache_key,
                queued = state.pending.len(),
                "Conversion task submitted"
            );
            state.pending.push_back(QueuedTask { task, reply });
        }
        self.inner.dispatch().await;
        rx.await.unwrap_or(Err(ConversionError::PoolClosed))
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock().await;
        PoolStats {
            workers: self.inner.workers.len(),
            busy: state.busy.len(),
            queued: state.pending.len(),
        }
    }
}

impl PoolInner {
    /// Pair free workers with pending tasks until one side runs out.
    async fn dispatch(&self) {
        let mut state = self.state.lock().await;
        while !state.free.is_empty() && !state.pending.is_empty() {
            let (Some(worker), Some(queued)) = (state.free.pop(), state.pending.pop_front()) else {
                break;
            };
            let cache_key = queued.task.cache_key.clone();
            match self.workers[worker].send(queued) {
                Ok(()) => {
                    state.busy.insert(worker, cache_key);
                }
                Err(mpsc::error::SendError(queued)) => {
                    // The worker loop is gone; keep the task for the others.
                    tracing::error!(worker, "Conversion worker unavailable");
                    state.pending.push_front(queued);
                }
            }
        }
    }

    async fn release(&self, worker: usize) {
        {
            let mut state = self.state.lock().await;
            state.busy.remove(&worker);
            state.free.push(worker);
        }
        self.dispatch().await;
    }
}

async fn worker_loop(
    id: usize,
    mut rx: mpsc::UnboundedReceiver<QueuedTask>,
    converter: Arc<dyn Converter>,
    pool: Weak<PoolInner>,
) {
    while let Some(QueuedTask { task, reply }) = rx.recv().await {
        tracing::debug!(worker = id, cache_key = %task.cache_key, kind = ?task.kind, "Converting");

        let outcome = AssertUnwindSafe(converter.convert(&task))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ConversionError::WorkerPanicked(task.cache_key.clone())));

        if let Err(e) = &outcome {
            tracing::warn!(worker = id, cache_key = %task.cache_key, error = %e, "Conversion failed");
        }

        // The submitter may have given up waiting; the worker is freed regardless.
        let _ = reply.send(outcome);
        drop(task);

        match pool.upgrade() {
            Some(inner) => inner.release(id).await,
            None => break,
        }
    }
    tracing::debug!(worker = id, "Conversion worker stopped");
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::task::{ConversionInput, ConversionKind};

    /// Records peak concurrency and execution order.
    #[derive(Default)]
    struct RecordingConverter {
        running: AtomicUsize,
        peak: AtomicUsize,
        order: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Converter for RecordingConverter {
        async fn convert(&self, task: &ConversionTask) -> Result<(), ConversionError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(task.cache_key.clone());

            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            match task.cache_key.as_str() {
                k if k.starts_with("panic") => panic!("converter blew up"),
                k if k.starts_with("fail") => Err(ConversionError::Timeout(Duration::from_secs(1))),
                _ => Ok(()),
            }
        }
    }

    fn task(key: &str) -> ConversionTask {
        ConversionTask {
            kind: ConversionKind::ImageResize,
            input: ConversionInput::Buffer(Vec::new()),
            cache_key: key.to_string(),
            output: PathBuf::from("/dev/null"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_pool_size_and_saturates_it() {
        let recorder = Arc::new(RecordingConverter::default());
        let pool = ConversionPool::new(3, recorder.clone());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.submit(task(&format!("t{i}"))).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(recorder.peak.load(Ordering::SeqCst), 3);
        assert_eq!(recorder.order.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn single_worker_runs_tasks_in_submission_order() {
        let recorder = Arc::new(RecordingConverter::default());
        let pool = ConversionPool::new(1, recorder.clone());

        let mut handles = Vec::new();
        for i in 0..5 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.submit(task(&format!("t{i}"))).await
            }));
            // Let each submit land in the queue before the next one.
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let order = recorder.order.lock().unwrap().clone();
        assert_eq!(order, vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[tokio::test]
    async fn failing_task_reports_error_and_frees_worker() {
        let recorder = Arc::new(RecordingConverter::default());
        let pool = ConversionPool::new(1, recorder);

        assert_matches!(pool.submit(task("fail-1")).await, Err(ConversionError::Timeout(_)));
        assert!(pool.submit(task("ok-1")).await.is_ok());
    }

    #[tokio::test]
    async fn panicking_task_does_not_shrink_pool() {
        let recorder = Arc::new(RecordingConverter::default());
        let pool = ConversionPool::new(2, recorder);

        for i in 0..3 {
            assert_matches!(
                pool.submit(task(&format!("panic-{i}"))).await,
                Err(ConversionError::WorkerPanicked(_))
            );
        }
        assert!(pool.submit(task("after")).await.is_ok());

        let stats = pool.stats().await;
        assert_eq!(stats.workers, 2);
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn zero_size_is_clamped_to_one_worker() {
        let pool = ConversionPool::new(0, Arc::new(RecordingConverter::default()));
        assert_eq!(pool.size(), 1);
        assert!(pool.submit(task("x")).await.is_ok());
    }
}
