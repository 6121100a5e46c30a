use std::sync::Arc;

use thiserror::Error;

use crate::collab::{CollabError, TenantService};

pub const TENANT_HEADER: &str = "Cray-Tenant-Name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenancyContext {
    Admin,
    Tenant(String),
}

impl TenancyContext {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Admin => None,
            Self::Tenant(name) => Some(name.as_str()),
        }
    }
}

#[derive(Error, Debug)]
pub enum TenancyError {
    #[error("tenant `{0}` does not exist")]
    UnknownTenant(String),

    #[error(transparent)]
    Collab(#[from] CollabError),
}

/// Header extraction and existence check described in spec.md §4.9.
/// Ownership enforcement on configurations lives in the registries
/// themselves, since it needs the stored record's `tenant_name`.
pub struct TenancyGate {
    tenant_service: Arc<dyn TenantService>,
}

impl TenancyGate {
    pub fn new(tenant_service: Arc<dyn TenantService>) -> Self {
        Self { tenant_service }
    }

    /// Absent or empty header value resolves to the admin context.
    pub fn extract(header_value: Option<&str>) -> TenancyContext {
        match header_value.map(str::trim) {
            Some(name) if !name.is_empty() => TenancyContext::Tenant(name.to_string()),
            _ => TenancyContext::Admin,
        }
    }

    pub fn reject_invalid_tenant(&self, context: &TenancyContext) -> Result<(), TenancyError> {
        let TenancyContext::Tenant(name) = context else {
            return Ok(());
        };
        if self.tenant_service.tenant_exists(name)? {
            Ok(())
        } else {
            Err(TenancyError::UnknownTenant(name.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::tenant_service::MockTenantService;

    #[test]
    fn absent_header_is_admin() {
        assert_eq!(TenancyGate::extract(None), TenancyContext::Admin);
        assert_eq!(TenancyGate::extract(Some("")), TenancyContext::Admin);
        assert_eq!(TenancyGate::extract(Some("  ")), TenancyContext::Admin);
    }

    #[test]
    fn named_header_is_tenant_context() {
        assert_eq!(
            TenancyGate::extract(Some("tenant-a")),
            TenancyContext::Tenant("tenant-a".to_string())
        );
    }

    #[test]
    fn unknown_tenant_is_rejected() {
        let mut service = MockTenantService::new();
        service.expect_tenant_exists().returning(|_| Ok(false));
        let gate = TenancyGate::new(Arc::new(service));
        let err = gate
            .reject_invalid_tenant(&TenancyContext::Tenant("ghost".to_string()))
            .unwrap_err();
        assert!(matches!(err, TenancyError::UnknownTenant(_)));
    }

    #[test]
    fn admin_context_skips_tenant_service_call() {
        let gate = TenancyGate::new(Arc::new(MockTenantService::new()));
        gate.reject_invalid_tenant(&TenancyContext::Admin).unwrap();
    }
}
