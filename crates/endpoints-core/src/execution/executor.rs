//! Bounded concurrent executor with synchronization points.
//!
//! Every unit of work is spawned onto the tokio runtime immediately, waits for
//! its predecessors, then takes a permit from the executor's semaphore before
//! running. `run()` is the join barrier: it waits for every unit (including
//! units scheduled by running units) and returns the first failure.
//!
//! A unit whose predecessor failed, or that has not started when another unit
//! fails, completes as failed without running. Units already running are left
//! to finish.

use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Pending,
    Succeeded,
    Failed,
}

/// Handle to the eventual completion of one scheduled unit.
///
/// Identity (not state) determines equality, so handles can key maps.
#[derive(Debug, Clone)]
pub struct SyncPoint {
    id: u64,
    state: watch::Receiver<Completion>,
}

impl SyncPoint {
    fn completed(id: u64, completion: Completion) -> Self {
        let (_tx, state) = watch::channel(completion);
        Self { id, state }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait until the unit has finished. Returns `true` if it succeeded.
    pub async fn wait(&self) -> bool {
        let mut state = self.state.clone();
        state
            .wait_for(|c| *c != Completion::Pending)
            .await
            .map(|c| *c == Completion::Succeeded)
            .unwrap_or(false)
    }

    pub fn is_finished(&self) -> bool {
        *self.state.borrow() != Completion::Pending
    }
}

impl PartialEq for SyncPoint {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SyncPoint {}

impl Hash for SyncPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

struct ExecutorInner {
    label: String,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    aborted: AtomicBool,
    first_error: Mutex<Option<EngineError>>,
    handles_tx: mpsc::UnboundedSender<JoinHandle<()>>,
    handles_rx: Mutex<Option<mpsc::UnboundedReceiver<JoinHandle<()>>>>,
}

/// Per-attempt worker pool. Cloning shares the pool.
#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<ExecutorInner>,
}

impl TaskExecutor {
    /// Create an executor running at most `pool_size` units at once.
    pub fn new(label: impl Into<String>, pool_size: usize) -> Self {
        let (handles_tx, handles_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ExecutorInner {
                label: label.into(),
                permits: Arc::new(Semaphore::new(pool_size.max(1))),
                next_id: AtomicU64::new(1),
                aborted: AtomicBool::new(false),
                first_error: Mutex::new(None),
                handles_tx,
                handles_rx: Mutex::new(Some(handles_rx)),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Schedule `work` to run once every handle in `after` has succeeded.
    ///
    /// May be called from inside a running unit; the new unit joins the
    /// same `run()` barrier.
    pub fn schedule<F>(&self, name: impl Into<String>, after: Vec<SyncPoint>, work: F) -> SyncPoint
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        if self.inner.aborted.load(Ordering::Acquire) {
            tracing::debug!(executor = %self.inner.label, unit = %name, "executor aborted, unit not scheduled");
            return SyncPoint::completed(id, Completion::Failed);
        }

        let (tx, state) = watch::channel(Completion::Pending);
        let executor = self.clone();
        let unit = name.clone();

        let handle = tokio::spawn(async move {
            let completion = executor.run_unit(&unit, after, work).await;
            let _ = tx.send(completion);
        });

        if self.inner.handles_tx.send(handle).is_err() {
            // The receiver lives as long as the executor; only reachable after run() returned.
            tracing::warn!(executor = %self.inner.label, unit = %name, "unit scheduled after run() finished");
        }

        SyncPoint { id, state }
    }

    async fn run_unit<F>(&self, name: &str, after: Vec<SyncPoint>, work: F) -> Completion
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        for predecessor in &after {
            if !predecessor.wait().await {
                tracing::debug!(executor = %self.inner.label, unit = %name, "predecessor failed, unit skipped");
                return Completion::Failed;
            }
        }

        let _permit = match self.inner.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.record_failure(EngineError::Internal("worker pool closed".to_string()))
                    .await;
                return Completion::Failed;
            }
        };

        if self.inner.aborted.load(Ordering::Acquire) {
            tracing::debug!(executor = %self.inner.label, unit = %name, "executor aborted, unit skipped");
            return Completion::Failed;
        }

        tracing::debug!(executor = %self.inner.label, unit = %name, "unit started");
        match work.await {
            Ok(()) => {
                tracing::debug!(executor = %self.inner.label, unit = %name, "unit succeeded");
                Completion::Succeeded
            }
            Err(e) => {
                tracing::debug!(executor = %self.inner.label, unit = %name, error = %e, "unit failed");
                self.record_failure(e).await;
                Completion::Failed
            }
        }
    }

    async fn record_failure(&self, error: EngineError) {
        self.inner.aborted.store(true, Ordering::Release);
        let mut first = self.inner.first_error.lock().await;
        if first.is_none() {
            *first = Some(error);
        }
    }

    /// Wait for every scheduled unit and return the first failure.
    ///
    /// Can be called once per executor.
    pub async fn run(&self) -> Result<(), EngineError> {
        let Some(mut handles_rx) = self.inner.handles_rx.lock().await.take() else {
            return Err(EngineError::Internal(format!(
                "executor '{}' is already running",
                self.inner.label
            )));
        };

        let mut running = FuturesUnordered::new();
        loop {
            while let Ok(handle) = handles_rx.try_recv() {
                running.push(handle);
            }

            match running.next().await {
                Some(Ok(())) => {}
                Some(Err(join_error)) => {
                    tracing::error!(executor = %self.inner.label, error = %join_error, "unit panicked");
                    self.record_failure(EngineError::Internal(format!(
                        "work unit panicked: {join_error}"
                    )))
                    .await;
                }
                None => {
                    // Nothing running: anything still queued was scheduled by the last unit.
                    match handles_rx.try_recv() {
                        Ok(handle) => running.push(handle),
                        Err(_) => break,
                    }
                }
            }
        }

        match self.inner.first_error.lock().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
