use actix_web::{web, HttpResponse};

use super::state::AppState;

/// Composite health, per spec.md §4.11: must not go through the
/// options-refresh decorator, so a store outage is reported rather than
/// masked by a failed refresh elsewhere in the request path.
pub async fn healthz(state: web::Data<AppState>) -> HttpResponse {
    let document = web::block(move || state.health.check())
        .await
        .unwrap_or_else(|_| crate::health::HealthDocument {
            db: crate::health::ComponentHealth::Unhealthy,
            event_bus: crate::health::ComponentHealth::Unhealthy,
            db_error: Some("health check task panicked".to_string()),
        });

    if document.is_healthy() {
        HttpResponse::Ok().json(document)
    } else {
        HttpResponse::ServiceUnavailable().json(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::configuration::ConfigurationRegistry;
    use crate::event::{EventBus, InMemoryEventTransport};
    use crate::kv::backend::InMemoryKvBackend;
    use crate::kv::KvStore;
    use crate::options::OptionsCache;
    use crate::session::SessionFSM;
    use crate::source::SourceRegistry;
    use crate::collab::configmap::MockConfigMapStore;
    use crate::collab::secret_store::MockSecretStore;
    use crate::collab::tenant_service::MockTenantService;
    use crate::tenancy::TenancyGate;
    use actix_web::body::MessageBody;
    use std::sync::Arc;

    fn state() -> web::Data<AppState> {
        let store = || Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10));
        let options = Arc::new(OptionsCache::new(store(), None).unwrap());
        let bus = Arc::new(EventBus::new(Arc::new(InMemoryEventTransport::new())));
        web::Data::new(AppState {
            options: options.clone(),
            components: Arc::new(ComponentRegistry::new(store(), store(), "https://ara.cfs.svc.cluster.local".into())),
            configurations: Arc::new(ConfigurationRegistry::new(
                store(),
                store(),
                store(),
                Arc::new(crate::source_resolver::SourceResolver::new("/ca.pem".into())),
                Arc::new(MockSecretStore::new()),
                Arc::new(MockConfigMapStore::new()),
                crate::configuration::VcsDefaults {
                    username: "u".into(),
                    password: "p".into(),
                },
            )),
            sources: Arc::new(SourceRegistry::new(
                store(),
                store(),
                Arc::new(MockSecretStore::new()),
                options,
            )),
            sessions: Arc::new(SessionFSM::new(store(), bus.clone())),
            health: Arc::new(crate::health::HealthProbe::new(store(), bus)),
            tenancy: Arc::new(TenancyGate::new(Arc::new(MockTenantService::new()))),
        })
    }

    #[actix_web::test]
    async fn healthy_store_reports_200() {
        let response = healthz(state()).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
        let body = response.into_body().try_into_bytes().unwrap();
        assert!(String::from_utf8_lossy(&body).contains("\"ok\""));
    }
}
