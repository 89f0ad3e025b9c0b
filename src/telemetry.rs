//! Write side of the query telemetry store.

use serde_json::{json, Value};

/// Destination for telemetry events.
///
/// Implementations must be cheap to call from the query path. A failing sink
/// never fails the query that produced the event.
pub trait TelemetrySink: Send + Sync {
    /// Record one event of `event_type` with a JSON object payload.
    fn record_event(&self, event_type: &str, payload: &Value) -> anyhow::Result<()>;
}

/// Default sink: one `event={json}` line per event through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn record_event(&self, event_type: &str, payload: &Value) -> anyhow::Result<()> {
        let mut event = json!({ "type": event_type });
        if let (Some(target), Some(fields)) = (event.as_object_mut(), payload.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        let line = serde_json::to_string(&event)?;
        if event_type.ends_with("_rejected") {
            log::warn!(target: "coauthors::telemetry", "event={}", line);
        } else {
            log::info!(target: "coauthors::telemetry", "event={}", line);
        }
        Ok(())
    }
}

/// Record an event, logging instead of propagating sink failures.
pub(crate) fn emit(sink: &dyn TelemetrySink, event_type: &str, payload: &Value) {
    if let Err(e) = sink.record_event(event_type, payload) {
        log::warn!("Failed to record telemetry event {}: {:#}", event_type, e);
    }
}
