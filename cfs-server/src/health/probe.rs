use std::sync::Arc;

use serde::Serialize;

use crate::event::EventBus;
use crate::kv::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentHealth {
    Ok,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthDocument {
    pub db: ComponentHealth,
    pub event_bus: ComponentHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_error: Option<String>,
}

impl HealthDocument {
    pub fn is_healthy(&self) -> bool {
        self.db == ComponentHealth::Ok && self.event_bus == ComponentHealth::Ok
    }
}

/// Aggregates store and event-bus reachability into the composite document
/// the `/healthz` handler renders as 200 or 503, per spec.md §4.11. Deliberately
/// bypasses the options-refresh decorator so a store outage is reported, not masked.
pub struct HealthProbe {
    store: Arc<KvStore>,
    event_bus: Arc<EventBus>,
}

impl HealthProbe {
    pub fn new(store: Arc<KvStore>, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }

    pub fn check(&self) -> HealthDocument {
        let (db, db_error) = match self.store.ping() {
            Ok(()) => (ComponentHealth::Ok, None),
            Err(e) => (ComponentHealth::Unhealthy, Some(e.to_string())),
        };
        let event_bus = if self.event_bus.reachable() {
            ComponentHealth::Ok
        } else {
            ComponentHealth::Unhealthy
        };
        HealthDocument { db, event_bus, db_error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::transport::InMemoryEventTransport;
    use crate::kv::backend::InMemoryKvBackend;

    fn probe() -> HealthProbe {
        let store = Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10));
        let bus = Arc::new(EventBus::new(Arc::new(InMemoryEventTransport::new())));
        HealthProbe::new(store, bus)
    }

    #[test]
    fn healthy_store_and_bus_report_ok() {
        let document = probe().check();
        assert!(document.is_healthy());
        assert_eq!(document.db, ComponentHealth::Ok);
        assert_eq!(document.event_bus, ComponentHealth::Ok);
    }

    #[test]
    fn store_ping_failure_is_reported_without_masking() {
        use crate::kv::backend::MockKvBackend;
        use crate::kv::KvError;

        let mut backend = MockKvBackend::new();
        backend
            .expect_ping()
            .returning(|| Err(KvError::Unreachable("connection refused".into())));
        let store = Arc::new(KvStore::new(Arc::new(backend), 5, 10));
        let bus = Arc::new(EventBus::new(Arc::new(InMemoryEventTransport::new())));
        let document = HealthProbe::new(store, bus).check();

        assert!(!document.is_healthy());
        assert_eq!(document.db, ComponentHealth::Unhealthy);
        assert!(document.db_error.is_some());
    }
}
