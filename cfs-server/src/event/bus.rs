use std::sync::Arc;

use tracing::warn;

use super::transport::{EventEnvelope, EventKind, EventTransport, TOPIC};

/// Best-effort typed event publisher. Failures do not roll back the
/// preceding store write — delivery is explicitly at-most-once, per
/// spec.md §4.10 and §7.
pub struct EventBus {
    transport: Arc<dyn EventTransport>,
}

impl EventBus {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }

    pub fn produce(&self, kind: EventKind, payload: serde_json::Value) {
        let envelope = EventEnvelope { kind, data: payload };
        if let Err(err) = self.transport.publish(TOPIC, &envelope) {
            warn!(error = %err, "event bus publish failed; one retry already exhausted, dropping");
        }
    }

    /// Read-only connectivity check for `/healthz` — must never publish, since
    /// liveness probes poll this continuously and a real subscriber would see
    /// a spurious event on every poll.
    pub fn reachable(&self) -> bool {
        self.transport.ping().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::transport::InMemoryEventTransport;

    #[test]
    fn produce_records_envelope_on_transport() {
        let transport = Arc::new(InMemoryEventTransport::new());
        let bus = EventBus::new(transport.clone());
        bus.produce(EventKind::Create, serde_json::json!({"name": "s1"}));
        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "cfs-session-events");
        assert_eq!(published[0].1.kind, EventKind::Create);
    }

    #[test]
    fn reachable_check_does_not_publish() {
        let transport = Arc::new(InMemoryEventTransport::new());
        let bus = EventBus::new(transport.clone());
        assert!(bus.reachable());
        assert!(transport.published().is_empty());
    }
}
