//! Keyed FIFO request queue with a single serial worker.
//!
//! Every [`RequestCoordinator::queue_request`] call enqueues its own
//! operation; nothing is coalesced. One worker task drains the queue, runs
//! one operation at a time (of any key) and pauses for the configured
//! inter-request delay after each one. Enqueueing is a single channel send,
//! so two callers with the same key always run in the order they called.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::CoordinatorConfig;
use crate::error::ClientError;

/// Delivers an operation's result to its caller once the worker has
/// cleared the active key.
type Settle = Box<dyn FnOnce() + Send>;

/// Type-erased operation: runs the caller's future and yields its settler.
type Job = Box<dyn FnOnce() -> BoxFuture<'static, Settle> + Send>;

/// One entry of the FIFO queue. Dropped once its execution settles.
struct QueuedOperation {
    key: String,
    job: Job,
}

/// Serializes keyed asynchronous operations (typically REST calls keyed by
/// endpoint and parameters).
///
/// # Guarantees
///
/// - Operations complete in enqueue order and never run concurrently within
///   one coordinator, whatever their keys.
/// - A failing operation rejects only its own caller; the queue keeps
///   draining.
/// - Dropping a caller's future does not cancel the queued operation.
#[derive(Debug)]
pub struct RequestCoordinator {
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedOperation>>>,
    active: watch::Receiver<Option<String>>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RequestCoordinator {
    /// Creates a coordinator and spawns its worker on the current Tokio
    /// runtime.
    #[must_use]
    pub fn new(config: CoordinatorConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (active_tx, active_rx) = watch::channel(None);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = tokio::spawn(run_worker(
            receiver,
            active_tx,
            Arc::clone(&pending),
            config.inter_request_delay,
        ));

        Self {
            sender: Mutex::new(Some(sender)),
            active: active_rx,
            pending,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueues `op` under `key` and waits for its result.
    ///
    /// `op` is invoked exactly once, after every operation enqueued before
    /// it has settled and the inter-request delay has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `op`'s own error, [`ClientError::CoordinatorClosed`] if the
    /// coordinator was shut down, or [`ClientError::OperationAborted`] if
    /// `op` panicked.
    pub async fn queue_request<T, E, F, Fut>(&self, key: impl Into<String>, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<ClientError> + Send + 'static,
    {
        let key = key.into();
        let (result_tx, result_rx) = oneshot::channel();

        let job: Job = Box::new(move || -> BoxFuture<'static, Settle> {
            Box::pin(async move {
                let result = op().await;
                let settle: Settle = Box::new(move || {
                    // The caller may have stopped waiting.
                    let _ = result_tx.send(result);
                });
                settle
            })
        });

        self.enqueue(QueuedOperation {
            key: key.clone(),
            job,
        })?;

        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::OperationAborted(key).into()),
        }
    }

    /// Returns `true` while `key`'s operation is the one executing.
    #[must_use]
    pub fn is_request_active(&self, key: &str) -> bool {
        self.active.borrow().as_deref() == Some(key)
    }

    /// Resolves once `key` is not executing.
    ///
    /// Returns immediately if it is not executing now. Woken by the worker
    /// when the active key changes, never by polling.
    pub async fn wait_until_idle(&self, key: &str) {
        let mut active = self.active.clone();
        // An error means the worker is gone, so nothing is executing.
        let _ = active.wait_for(|current| current.as_deref() != Some(key)).await;
    }

    /// Returns the number of operations waiting to start.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stops accepting operations, lets the worker drain what is already
    /// queued, and waits for it to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker
            && let Err(err) = worker.await
        {
            tracing::warn!(error = %err, "request coordinator worker failed");
        }
    }

    fn enqueue(&self, operation: QueuedOperation) -> Result<(), ClientError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(ClientError::CoordinatorClosed)?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        sender.send(operation).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            ClientError::CoordinatorClosed
        })
    }
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<QueuedOperation>,
    active: watch::Sender<Option<String>>,
    pending: Arc<AtomicUsize>,
    delay: Duration,
) {
    while let Some(QueuedOperation { key, job }) = receiver.recv().await {
        pending.fetch_sub(1, Ordering::SeqCst);
        active.send_replace(Some(key.clone()));
        tracing::debug!(%key, "executing queued request");

        // Spawned so a panicking operation cannot take the worker down.
        let outcome = tokio::spawn(job()).await;
        active.send_replace(None);

        match outcome {
            Ok(settle) => settle(),
            Err(err) => tracing::warn!(%key, error = %err, "queued request aborted"),
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    tracing::debug!("request coordinator drained");
}
