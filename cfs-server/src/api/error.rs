use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::collab::CollabError;
use crate::component::ComponentError;
use crate::configuration::ConfigurationError;
use crate::kv::KvError;
use crate::session::SessionError;
use crate::source::SourceError;
use crate::source_resolver::SourceResolverError;
use crate::tenancy::TenancyError;

/// Aggregates every component error type at the HTTP boundary, the way the
/// teacher's `agent_control::error::AgentError` rolls up its subsystem
/// errors via `thiserror`'s `#[from]`, per spec.md §7's propagation policy.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Collab(#[from] CollabError),

    #[error(transparent)]
    Resolve(#[from] SourceResolverError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ProblemDocument {
    title: &'static str,
    detail: String,
}

impl ApiError {
    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "validation error",
            StatusCode::FORBIDDEN => "tenancy denied",
            StatusCode::NOT_FOUND => "not found",
            StatusCode::CONFLICT => "name conflict",
            StatusCode::SERVICE_UNAVAILABLE => "upstream unavailable",
            _ => "internal error",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,

            ApiError::Component(ComponentError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Component(ComponentError::Kv(e)) => kv_status(e),
            ApiError::Component(ComponentError::Serde(_)) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::Configuration(ConfigurationError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Configuration(ConfigurationError::TenantMismatch { .. }) => StatusCode::FORBIDDEN,
            ApiError::Configuration(
                ConfigurationError::AmbiguousRevision
                | ConfigurationError::AmbiguousOrigin
                | ConfigurationError::UnknownSource(_)
                | ConfigurationError::DuplicateLayerPair(_)
                | ConfigurationError::ForeignTenantAssignment,
            ) => StatusCode::BAD_REQUEST,
            ApiError::Configuration(ConfigurationError::InUse(_)) => StatusCode::BAD_REQUEST,
            ApiError::Configuration(ConfigurationError::Resolve(e)) => resolve_status(e),
            ApiError::Configuration(ConfigurationError::Kv(e)) => kv_status(e),
            ApiError::Configuration(ConfigurationError::Collab(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Configuration(ConfigurationError::Serde(_)) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::Source(SourceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Source(SourceError::MissingCredentials) => StatusCode::BAD_REQUEST,
            ApiError::Source(SourceError::InUse(_)) => StatusCode::BAD_REQUEST,
            ApiError::Source(SourceError::Kv(e)) => kv_status(e),
            ApiError::Source(SourceError::Collab(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Source(SourceError::Serde(_)) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::Session(SessionError::NameConflict(_)) => StatusCode::CONFLICT,
            ApiError::Session(SessionError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Session(
                SessionError::UnknownConfiguration(_)
                | SessionError::InvalidTarget(_)
                | SessionError::InvalidPassthrough(_)
                | SessionError::InvalidAge(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Session(SessionError::Kv(e)) => kv_status(e),
            ApiError::Session(SessionError::EventBus(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Session(SessionError::Serde(_)) => StatusCode::INTERNAL_SERVER_ERROR,

            ApiError::Tenancy(TenancyError::UnknownTenant(_)) => StatusCode::BAD_REQUEST,
            ApiError::Tenancy(TenancyError::Collab(_)) => StatusCode::SERVICE_UNAVAILABLE,

            ApiError::Kv(e) => kv_status(e),
            ApiError::Collab(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Resolve(e) => resolve_status(e),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal error handling request");
        }
        HttpResponse::build(status).json(ProblemDocument {
            title: self.title(),
            detail: self.to_string(),
        })
    }
}

fn kv_status(e: &KvError) -> StatusCode {
    match e {
        KvError::NoEntry(_) => StatusCode::NOT_FOUND,
        KvError::TooBusy(_) | KvError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        KvError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// SourceResolver git failures are surfaced as 400 quoting the upstream
/// message; scratch-directory I/O failures are our own fault, 500.
fn resolve_status(e: &SourceResolverError) -> StatusCode {
    match e {
        SourceResolverError::BranchConversion(_) | SourceResolverError::MissingCredentials => {
            StatusCode::BAD_REQUEST
        }
        SourceResolverError::Scratch(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::Component(ComponentError::NotFound("n1".into()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_busy_maps_to_503() {
        let err = ApiError::Kv(KvError::TooBusy(60));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn tenant_mismatch_maps_to_403() {
        let err = ApiError::Configuration(ConfigurationError::TenantMismatch {
            owner: "a".into(),
            actual: "b".into(),
        });
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn name_conflict_maps_to_409() {
        let err = ApiError::Session(SessionError::NameConflict("s1".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
