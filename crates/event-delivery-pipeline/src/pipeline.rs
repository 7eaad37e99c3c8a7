//! Dispatch retry orchestrator.

use crate::{
    BatchFormatter, BatchQueue, BufferedEvent, ConnectivityMonitor, ConnectivityState, Dispatcher,
    FlushSink, FormattedBatch, NotificationSink, PipelineConfig, PipelineResult, RequestTracker,
    TrackedEvent,
};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use keyed_blob_store::{KeyedStore, StorageMedium};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Medium key of the not-yet-batched event store.
pub const BUFFER_STORE_KEY: &str = "telemetry-event-buffer";

/// Medium key of the formatted-but-undelivered batch store.
pub const PENDING_STORE_KEY: &str = "telemetry-pending-batches";

/// The central coordinator of the delivery pipeline.
///
/// Accepts produced events, persists them to the buffer store, feeds them
/// to the batching queue, formats flushed runs into batches, persists those
/// to the pending store, dispatches them, and retries everything still
/// pending whenever a flush occurs, connectivity returns, or the pipeline
/// starts.
///
/// Cheap to clone; all clones drive the same pipeline.
#[derive(Clone)]
pub struct DeliveryPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    queue: BatchQueue,
    buffer: KeyedStore<TrackedEvent>,
    pending: KeyedStore<FormattedBatch>,
    formatter: Arc<dyn BatchFormatter>,
    dispatcher: Arc<dyn Dispatcher>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    notifier: StdMutex<Option<Arc<dyn NotificationSink>>>,
    tracker: RequestTracker,
    /// Last reachability observation; `None` until the first one arrives.
    reachable: StdMutex<Option<bool>>,
    /// The in-flight retry pass, shared so concurrent callers await one pass.
    retry_pass: StdMutex<Option<Shared<BoxFuture<'static, ()>>>>,
    /// Connectivity listener task, held so `stop` can unsubscribe.
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryPipeline {
    /// Create a stopped pipeline.
    ///
    /// Both durable stores live on `medium` under fixed keys
    /// ([`BUFFER_STORE_KEY`], [`PENDING_STORE_KEY`]), so a pipeline built on
    /// the same medium in a later lifetime picks up undelivered data.
    /// Invalid configuration values are replaced by defaults; construction
    /// never fails.
    pub fn new(
        config: PipelineConfig,
        medium: Arc<dyn StorageMedium>,
        formatter: Arc<dyn BatchFormatter>,
        dispatcher: Arc<dyn Dispatcher>,
        connectivity: Arc<dyn ConnectivityMonitor>,
    ) -> Self {
        let config = config.sanitized();
        Self {
            inner: Arc::new(Inner {
                queue: BatchQueue::new(&config),
                buffer: KeyedStore::new(BUFFER_STORE_KEY, config.store_capacity, medium.clone()),
                pending: KeyedStore::new(PENDING_STORE_KEY, config.store_capacity, medium),
                formatter,
                dispatcher,
                connectivity,
                notifier: StdMutex::new(None),
                tracker: RequestTracker::new(),
                reachable: StdMutex::new(None),
                retry_pass: StdMutex::new(None),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Attach a sink notified once per dispatch attempt.
    pub fn set_notification_sink(&self, sink: Arc<dyn NotificationSink>) {
        *self.inner.notifier.lock().expect("lock poisoned") = Some(sink);
    }

    /// Start the pipeline: arm the batching queue, subscribe to
    /// connectivity, retry anything already pending, and re-enqueue events
    /// left in the buffer store by a prior, incomplete lifetime.
    pub async fn start(&self) {
        self.inner.queue.start(Arc::new(self.clone())).await;

        let mut observations = self.inner.connectivity.subscribe();
        let pipeline = self.clone();
        let listener = tokio::spawn(async move {
            while let Some(state) = observations.recv().await {
                pipeline.on_connectivity(state).await;
            }
        });
        *self.inner.listener.lock().await = Some(listener);

        self.retry_pending().await;
        self.recover_buffered().await;
        info!("Delivery pipeline started");
    }

    /// Stop the pipeline: unsubscribe from connectivity, flush and stop the
    /// queue, then wait until no dispatches remain in flight.
    ///
    /// Internal shutdown errors are logged and swallowed; this always
    /// resolves and never errors.
    pub async fn stop(&self) {
        if let Some(listener) = self.inner.listener.lock().await.take() {
            listener.abort();
        }

        self.inner.queue.stop().await;
        self.inner.tracker.wait_for_idle().await;
        info!("Delivery pipeline stopped");
    }

    /// Accept a produced event: persist it to the buffer store under a
    /// fresh key and hand it to the batching queue.
    ///
    /// Side effect only; the caller is never failed. A capacity-rejected
    /// event is dropped (logged), a persistence error still queues the
    /// event for best-effort delivery within this lifetime.
    pub async fn process(&self, event: TrackedEvent) {
        let key = Uuid::new_v4().to_string();
        match self.inner.buffer.set(&key, &event).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(name = %event.name, "Buffer store at capacity, event dropped");
                return;
            }
            Err(err) => {
                warn!(name = %event.name, error = %err, "Failed to persist event, queueing unbuffered");
            }
        }
        self.inner.queue.enqueue(BufferedEvent { key, event });
    }

    /// Sweep every pending batch once, dispatching strictly sequentially.
    ///
    /// At most one pass is logically in flight: a caller arriving while a
    /// pass runs awaits that same pass instead of starting another.
    /// Individual dispatch failures do not abort the pass.
    pub async fn retry_pending(&self) {
        let pass = {
            let mut slot = self.inner.retry_pass.lock().expect("lock poisoned");
            if let Some(pass) = slot.as_ref() {
                pass.clone()
            } else {
                let (done_tx, done_rx) = oneshot::channel::<()>();
                let pipeline = self.clone();
                let permit = self.inner.tracker.begin();
                // The pass runs in its own task so it makes progress even
                // if every awaiting caller is cancelled.
                tokio::spawn(async move {
                    let _permit = permit;
                    pipeline.run_retry_pass().await;
                    pipeline
                        .inner
                        .retry_pass
                        .lock()
                        .expect("lock poisoned")
                        .take();
                    let _ = done_tx.send(());
                });
                let pass: Shared<BoxFuture<'static, ()>> = async move {
                    let _ = done_rx.await;
                }
                .boxed()
                .shared();
                *slot = Some(pass.clone());
                pass
            }
        };
        pass.await;
    }

    /// Number of events persisted but not yet part of any batch.
    pub async fn buffered_count(&self) -> PipelineResult<usize> {
        Ok(self.inner.buffer.len().await?)
    }

    /// Number of batches persisted but not yet delivered.
    pub async fn pending_count(&self) -> PipelineResult<usize> {
        Ok(self.inner.pending.len().await?)
    }

    async fn run_retry_pass(&self) {
        let entries = match self.inner.pending.get_all().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "Failed to read pending store for retry");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }

        debug!(count = entries.len(), "Retrying pending batches");
        for (key, batch) in entries {
            // Strictly sequential: each dispatch completes before the next
            // begins.
            self.dispatch_entry(&key, &batch).await;
        }
    }

    /// One dispatch attempt for a persisted batch. Success removes the
    /// entry; failure leaves it for the next retry trigger, never an
    /// immediate re-send.
    async fn dispatch_entry(&self, key: &str, batch: &FormattedBatch) {
        let notifier = self.inner.notifier.lock().expect("lock poisoned").clone();
        if let Some(notifier) = notifier {
            notifier.notify(key, batch);
        }

        let result = self
            .inner
            .tracker
            .track(self.inner.dispatcher.dispatch(batch))
            .await;

        match result {
            Ok(response) if response.is_delivered() => {
                if let Err(err) = self.inner.pending.remove(key).await {
                    warn!(key = %key, error = %err, "Delivered batch could not be removed");
                } else {
                    info!(key = %key, status = response.status_code, "Batch delivered");
                }
            }
            Ok(response) => {
                warn!(
                    key = %key,
                    status = response.status_code,
                    "Collector rejected batch, retained for retry"
                );
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Dispatch failed, batch retained for retry");
            }
        }
    }

    async fn on_connectivity(&self, state: ConnectivityState) {
        let became_reachable = {
            let mut last = self.inner.reachable.lock().expect("lock poisoned");
            let previous = last.replace(state.is_internet_reachable);
            state.is_internet_reachable && previous != Some(true)
        };

        if became_reachable {
            debug!("Connectivity restored, retrying pending batches");
            self.retry_pending().await;
        }
    }

    /// Re-enqueue events a prior lifetime buffered but never flushed.
    ///
    /// Keys are preserved and nothing is re-persisted, so an event already
    /// represented by a pending batch cannot be duplicated: the buffer only
    /// ever holds events that made it into no batch.
    async fn recover_buffered(&self) {
        let leftover = match self.inner.buffer.get_all().await {
            Ok(leftover) => leftover,
            Err(err) => {
                warn!(error = %err, "Failed to read buffer store for recovery");
                return;
            }
        };
        if leftover.is_empty() {
            return;
        }

        info!(count = leftover.len(), "Recovering buffered events");
        for (key, event) in leftover {
            self.inner.queue.enqueue(BufferedEvent { key, event });
        }
    }
}

#[async_trait]
impl FlushSink for DeliveryPipeline {
    /// The queue's flush callback: retry everything pending, then format,
    /// persist, and dispatch the freshly flushed run.
    async fn on_flush(&self, events: Vec<BufferedEvent>) {
        self.retry_pending().await;
        if events.is_empty() {
            return;
        }

        let flushed_keys: Vec<String> = events.iter().map(|e| e.key.clone()).collect();

        // Group context-equal events; each group becomes one batch.
        let mut groups: Vec<Vec<BufferedEvent>> = Vec::new();
        for buffered in events {
            match groups
                .iter_mut()
                .find(|group| group[0].event.context_eq(&buffered.event))
            {
                Some(group) => group.push(buffered),
                None => groups.push(vec![buffered]),
            }
        }

        let mut persisted: Vec<(String, FormattedBatch)> = Vec::new();
        for group in groups {
            let run: Vec<TrackedEvent> = group.iter().map(|b| b.event.clone()).collect();
            let batch = match self.inner.formatter.format(&run) {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(events = run.len(), error = %err, "Formatter rejected run, events dropped");
                    continue;
                }
            };

            let key = Uuid::new_v4().to_string();
            match self.inner.pending.set(&key, &batch).await {
                Ok(true) => persisted.push((key, batch)),
                Ok(false) => {
                    warn!(events = run.len(), "Pending store at capacity, batch dropped");
                }
                Err(err) => {
                    warn!(error = %err, "Failed to persist batch");
                }
            }
        }

        // Remove exactly the flushed events. Events processed after this
        // flush's snapshot keep their buffer entries, closing the
        // lost-update window a bulk clear would open.
        if let Err(err) = self.inner.buffer.remove_many(&flushed_keys).await {
            warn!(error = %err, "Failed to remove flushed events from buffer store");
        }

        // A connectivity-triggered retry pass that snapshotted the pending
        // store after the inserts above may dispatch one of these keys
        // concurrently. Delivery is at-least-once and `remove` on an
        // already-removed key is a no-op, so the overlap is tolerated.
        for (key, batch) in &persisted {
            self.dispatch_entry(key, batch).await;
        }
    }
}
