//! Narrow clients for the three external collaborators named in spec.md §6:
//! SecretStore, ConfigMapStore, TenantService. Each is a small trait so the
//! registries/gates that call them can be exercised against mocks.

pub mod configmap;
pub mod error;
pub mod secret_store;
pub mod tenant_service;

pub use configmap::ConfigMapStore;
pub use error::CollabError;
pub use secret_store::{SecretStore, SecretValue};
pub use tenant_service::TenantService;
