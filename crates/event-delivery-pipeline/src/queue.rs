//! In-memory batching queue.
//!
//! Channel-fed worker loop: events arrive over an mpsc channel and are
//! flushed to a [`FlushSink`] when the batch size is reached, the periodic
//! timer fires, or the queue is stopped. The flush callback is awaited to
//! completion inside the loop, so flush cycles never overlap.

use crate::{BufferedEvent, PipelineConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

/// Receives each flushed run of events.
///
/// The queue awaits `on_flush` before taking the next event, which keeps
/// the single-flush-in-flight invariant true by construction.
#[async_trait]
pub trait FlushSink: Send + Sync {
    async fn on_flush(&self, events: Vec<BufferedEvent>);
}

/// Accumulates produced events and flushes them on size, time, or stop.
pub struct BatchQueue {
    batch_size: usize,
    flush_interval: Duration,
    sender: mpsc::UnboundedSender<BufferedEvent>,
    receiver: StdMutex<Option<mpsc::UnboundedReceiver<BufferedEvent>>>,
    worker: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl BatchQueue {
    /// Create a stopped queue with the given batching parameters.
    ///
    /// Out-of-bounds batch size or flush interval values are replaced by
    /// the documented defaults; construction never fails.
    pub fn new(config: &PipelineConfig) -> Self {
        let config = config.sanitized();
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            sender,
            receiver: StdMutex::new(Some(receiver)),
            worker: Mutex::new(None),
        }
    }

    /// Append an event. Never fails the caller; the channel is unbounded,
    /// so a send only fails once the worker has exited.
    pub fn enqueue(&self, event: BufferedEvent) {
        if let Err(err) = self.sender.send(event) {
            warn!(error = %err, "Batch queue stopped, event not queued");
        }
    }

    /// Arm the periodic timer and start consuming events.
    ///
    /// # Panics
    ///
    /// Panics if called more than once (the queue can only be started once).
    pub async fn start(&self, sink: Arc<dyn FlushSink>) {
        let mut receiver = self
            .receiver
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("BatchQueue already started");

        let batch_size = self.batch_size;
        let flush_interval = self.flush_interval;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(flush_interval);
            // The first tick of `interval` fires immediately; consume it so
            // the timer measures a full interval from start.
            ticker.tick().await;

            let mut buffer: Vec<BufferedEvent> = Vec::new();

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    maybe_event = receiver.recv() => {
                        match maybe_event {
                            Some(event) => {
                                buffer.push(event);
                                if buffer.len() >= batch_size {
                                    flush(&mut buffer, &sink).await;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        if !buffer.is_empty() {
                            flush(&mut buffer, &sink).await;
                        }
                    }
                }
            }

            // Drain anything still sitting in the channel, then flush once
            // more so stop() never strands events in memory.
            while let Ok(event) = receiver.try_recv() {
                buffer.push(event);
            }
            if !buffer.is_empty() {
                flush(&mut buffer, &sink).await;
            }
            debug!("Batch queue worker exited");
        });

        *self.worker.lock().await = Some((shutdown_tx, handle));
    }

    /// Disarm the timer, flush remaining events, and join the worker.
    ///
    /// Safe to call when never started or already stopped.
    pub async fn stop(&self) {
        let Some((shutdown_tx, handle)) = self.worker.lock().await.take() else {
            return;
        };

        // The worker only drops its receiver by exiting, so a send failure
        // just means it is already gone.
        let _ = shutdown_tx.send(());
        if let Err(err) = handle.await {
            warn!(error = %err, "Batch queue worker join failed");
        }
    }
}

/// Take ownership of the buffered run and hand it to the sink.
async fn flush(buffer: &mut Vec<BufferedEvent>, sink: &Arc<dyn FlushSink>) {
    let events = std::mem::take(buffer);
    debug!(count = events.len(), "Flushing batch queue");
    sink.on_flush(events).await;
}
