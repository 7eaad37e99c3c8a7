//! Event and batch data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifies the project/session an event belongs to.
///
/// Deep equality on the context is the merge key: only context-equal events
/// may share one formatted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Owning project/application identifier.
    pub app_id: String,
    /// Session the event was produced in.
    pub session_id: String,
    /// Free-form context fields (device, locale, SDK version, ...).
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl EventContext {
    pub fn new(app_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            session_id: session_id.into(),
            fields: Map::new(),
        }
    }
}

/// One unit of tracked activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    /// Context used for batch mergeability.
    pub context: EventContext,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Event name.
    pub name: String,
    /// Event-specific payload fields.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl TrackedEvent {
    /// Create an event named `name` under `context`, timestamped now.
    pub fn new(context: EventContext, name: impl Into<String>) -> Self {
        Self {
            context,
            timestamp: Utc::now(),
            name: name.into(),
            properties: Map::new(),
        }
    }

    /// Whether this event may be merged into the same batch as `other`.
    pub fn context_eq(&self, other: &TrackedEvent) -> bool {
        self.context == other.context
    }
}

/// An event together with its buffer-store key.
///
/// The key is generated when the event is persisted and carried through the
/// batching queue, so the flush path can remove exactly the events it
/// snapshotted instead of bulk-clearing the buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedEvent {
    /// Buffer-store key of this event.
    pub key: String,
    /// The buffered event itself.
    pub event: TrackedEvent,
}

/// The transmittable payload produced by merging context-equal events.
///
/// Opaque to the pipeline beyond being the thing dispatched; its shape is
/// the formatter's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedBatch {
    /// Wire payload handed to the dispatcher.
    pub payload: Value,
}

impl FormattedBatch {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}
