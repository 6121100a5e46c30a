use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use super::cache::OptionsCache;

/// Refreshes [`OptionsCache`] once per request, per spec.md §4.3's "runs a
/// refresh before every HTTP handler invocation via a decorator" rule.
pub struct OptionsRefresh {
    pub cache: Arc<OptionsCache>,
}

impl<S, B> Transform<S, ServiceRequest> for OptionsRefresh
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = OptionsRefreshMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(OptionsRefreshMiddleware {
            service: Rc::new(service),
            cache: self.cache.clone(),
        }))
    }
}

pub struct OptionsRefreshMiddleware<S> {
    service: Rc<S>,
    cache: Arc<OptionsCache>,
}

impl<S, B> Service<ServiceRequest> for OptionsRefreshMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let cache = self.cache.clone();
        let service = self.service.clone();
        Box::pin(async move {
            if let Err(err) = cache.refresh() {
                warn!(error = %err, "options refresh failed; serving with stale snapshot");
            }
            service.call(req).await
        })
    }
}
