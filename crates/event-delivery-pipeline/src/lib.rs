//! Offline-resilient batching and delivery for tracked events.
//!
//! This crate provides:
//! - `DeliveryPipeline`: orchestrator tying buffering, batching,
//!   persistence, connectivity, and dispatch retries together
//! - `BatchQueue`: in-memory batching with size- and timer-driven flushes
//! - `RequestTracker`: in-flight dispatch accounting for clean shutdown
//! - Collaborator traits (`Dispatcher`, `BatchFormatter`,
//!   `ConnectivityMonitor`, `NotificationSink`) with HTTP and JSON
//!   implementations
//!
//! Durable state lives in two `keyed-blob-store` stores: a buffer of
//! not-yet-batched events and a store of formatted-but-undelivered batches.
//! Every produced event is either eventually dispatched with a success
//! response or remains retrievable from one of the two stores, as long as
//! neither store is at capacity.

mod config;
mod connectivity;
mod dispatch;
mod error;
mod event;
mod format;
mod pipeline;
mod queue;
mod tracker;

pub use config::{
    PipelineConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_STORE_CAPACITY,
    MIN_FLUSH_INTERVAL,
};
pub use connectivity::{ConnectivityMonitor, ConnectivityState, ManualConnectivity};
pub use dispatch::{
    DispatchResponse, Dispatcher, HttpDispatcher, HttpDispatcherConfig, NotificationSink,
};
pub use error::{PipelineError, PipelineResult};
pub use event::{BufferedEvent, EventContext, FormattedBatch, TrackedEvent};
pub use format::{BatchFormatter, JsonBatchFormatter};
pub use pipeline::{DeliveryPipeline, BUFFER_STORE_KEY, PENDING_STORE_KEY};
pub use queue::{BatchQueue, FlushSink};
pub use tracker::{InFlightGuard, RequestTracker};
