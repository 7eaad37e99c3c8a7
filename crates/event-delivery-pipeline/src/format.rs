//! Batch formatting collaborator.

use crate::{FormattedBatch, PipelineError, PipelineResult, TrackedEvent};
use serde_json::json;

/// Turns a run of context-equal events into one transmittable batch.
///
/// The pipeline imposes no wire format; embedders supply their own
/// formatter when the collector expects a different shape.
pub trait BatchFormatter: Send + Sync {
    /// Format `events` into a single batch payload.
    ///
    /// Callers guarantee the slice is non-empty and context-equal
    /// throughout; a formatter may still reject input it cannot express.
    fn format(&self, events: &[TrackedEvent]) -> PipelineResult<FormattedBatch>;
}

/// Default formatter: shared context once, events as a JSON array.
#[derive(Debug, Default)]
pub struct JsonBatchFormatter;

impl BatchFormatter for JsonBatchFormatter {
    fn format(&self, events: &[TrackedEvent]) -> PipelineResult<FormattedBatch> {
        let first = events
            .first()
            .ok_or_else(|| PipelineError::Format("cannot format an empty batch".to_string()))?;

        let entries = events
            .iter()
            .map(|event| {
                json!({
                    "name": event.name,
                    "timestamp": event.timestamp,
                    "properties": event.properties,
                })
            })
            .collect::<Vec<_>>();

        Ok(FormattedBatch::new(json!({
            "context": first.context,
            "events": entries,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventContext;
    use serde_json::json;

    #[test]
    fn merges_events_under_one_context() {
        let context = EventContext::new("app-1", "session-1");
        let a = TrackedEvent::new(context.clone(), "screen_view");
        let b = TrackedEvent::new(context.clone(), "button_click");

        let batch = JsonBatchFormatter.format(&[a, b]).unwrap();

        assert_eq!(batch.payload["context"]["app_id"], json!("app-1"));
        assert_eq!(batch.payload["events"].as_array().unwrap().len(), 2);
        assert_eq!(batch.payload["events"][0]["name"], json!("screen_view"));
        assert_eq!(batch.payload["events"][1]["name"], json!("button_click"));
    }

    #[test]
    fn includes_event_properties() {
        let mut event = TrackedEvent::new(EventContext::new("app-1", "s-1"), "purchase");
        event.properties.insert("amount".to_string(), json!(9.99));

        let batch = JsonBatchFormatter.format(&[event]).unwrap();
        assert_eq!(batch.payload["events"][0]["properties"]["amount"], json!(9.99));
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = JsonBatchFormatter.format(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }
}
