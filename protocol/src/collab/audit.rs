//! Audit collaborator.
//!
//! Append-only and fire-and-forget: `record` returns nothing, and a sink
//! that cannot store an event deals with that itself. Event payloads never
//! carry key material or reconstructed secrets.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

pub trait AuditSink: Send + Sync {
    fn record(&self, event_type: &str, data: serde_json::Value, at: DateTime<Utc>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub data: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn events_of(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, event_type: &str, data: serde_json::Value, at: DateTime<Utc>) {
        self.events.lock().push(AuditEvent {
            event_type: event_type.to_string(),
            data,
            at,
        });
    }
}

/// Writes events to the `shroud::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event_type: &str, data: serde_json::Value, at: DateTime<Utc>) {
        info!(
            target: "shroud::audit",
            event = event_type,
            at = %at.to_rfc3339(),
            data = %data,
            "audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_log_filters_by_type() {
        let log = MemoryAuditLog::new();
        log.record("a", json!({"n": 1}), Utc::now());
        log.record("b", json!({}), Utc::now());
        log.record("a", json!({"n": 2}), Utc::now());
        assert_eq!(log.len(), 3);
        let a = log.events_of("a");
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].data["n"], 2);
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        TracingAuditSink.record("x", json!({"k": "v"}), Utc::now());
    }
}
