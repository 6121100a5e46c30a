use std::sync::Arc;

use tracing::instrument;

use super::error::ConfigurationError;
use crate::collab::{ConfigMapStore, SecretStore};
use crate::kv::KvStore;
use crate::model::configuration::{Configuration, Layer};
use crate::model::now_stamp;
use crate::model::source::Source;
use crate::source_resolver::{ResolveCredentials, SourceResolver};

/// Default VCS credentials used when a layer names no `source`, per
/// spec.md §4.4's `VCS_USERNAME`/`VCS_PASSWORD` fallback.
#[derive(Clone)]
pub struct VcsDefaults {
    pub username: String,
    pub password: String,
}

/// Namespace assumed for a `ca_cert` reference that doesn't name one.
const DEFAULT_CONFIGMAP_NAMESPACE: &str = "default";

pub struct ConfigurationRegistry {
    configurations: Arc<KvStore>,
    sources: Arc<KvStore>,
    components: Arc<KvStore>,
    resolver: Arc<SourceResolver>,
    secrets: Arc<dyn SecretStore>,
    configmaps: Arc<dyn ConfigMapStore>,
    vcs_defaults: VcsDefaults,
}

impl ConfigurationRegistry {
    pub fn new(
        configurations: Arc<KvStore>,
        sources: Arc<KvStore>,
        components: Arc<KvStore>,
        resolver: Arc<SourceResolver>,
        secrets: Arc<dyn SecretStore>,
        configmaps: Arc<dyn ConfigMapStore>,
        vcs_defaults: VcsDefaults,
    ) -> Self {
        Self {
            configurations,
            sources,
            components,
            resolver,
            secrets,
            configmaps,
            vcs_defaults,
        }
    }

    /// Validates layer shape, resolves branches to commits, stamps
    /// `last_updated`, and persists, per spec.md §4.7's Put algorithm.
    #[instrument(skip(self, configuration))]
    pub fn put(
        &self,
        mut configuration: Configuration,
        drop_branches: bool,
        tenant_name: Option<&str>,
        is_admin: bool,
    ) -> Result<Configuration, ConfigurationError> {
        self.validate_layer_shapes(&configuration)?;
        self.reject_duplicate_pairs(&configuration)?;

        let existing_owner = self
            .configurations
            .get(&configuration.name)
            .ok()
            .and_then(|raw| serde_json::from_value::<Configuration>(raw).ok())
            .and_then(|c| c.tenant_name);
        self.enforce_tenancy(tenant_name, is_admin, existing_owner.as_deref())?;

        if !is_admin {
            match (&configuration.tenant_name, tenant_name) {
                (Some(claimed), Some(actual)) if claimed != actual => {
                    return Err(ConfigurationError::ForeignTenantAssignment);
                }
                (Some(_), None) => return Err(ConfigurationError::ForeignTenantAssignment),
                _ => {}
            }
            // tenant_name is immutable once set; keep the existing value rather
            // than letting a later PUT silently drop it.
            configuration.tenant_name = existing_owner.or(tenant_name.map(str::to_string));
        }

        for layer in &mut configuration.layers {
            self.resolve_layer(layer)?;
        }
        if let Some(layer) = &mut configuration.additional_inventory {
            self.resolve_layer(layer)?;
        }

        if drop_branches {
            for layer in &mut configuration.layers {
                layer.branch = None;
            }
            if let Some(layer) = &mut configuration.additional_inventory {
                layer.branch = None;
            }
        }

        configuration.last_updated = Some(now_stamp());

        let value = serde_json::to_value(&configuration)?;
        self.configurations.put(&configuration.name, value)?;
        Ok(configuration)
    }

    /// v2 and v3 share the same semantics: re-resolve branches and bump
    /// `last_updated`. No other field-level updates are supported.
    pub fn patch(&self, name: &str, tenant_name: Option<&str>, is_admin: bool) -> Result<Configuration, ConfigurationError> {
        let raw = self
            .configurations
            .get(name)
            .map_err(|_| ConfigurationError::NotFound(name.to_string()))?;
        let mut configuration: Configuration = serde_json::from_value(raw)?;
        self.enforce_tenancy(tenant_name, is_admin, configuration.tenant_name.as_deref())?;

        for layer in &mut configuration.layers {
            self.resolve_layer(layer)?;
        }
        if let Some(layer) = &mut configuration.additional_inventory {
            self.resolve_layer(layer)?;
        }
        configuration.last_updated = Some(now_stamp());

        let value = serde_json::to_value(&configuration)?;
        self.configurations.put(name, value)?;
        Ok(configuration)
    }

    /// Refuses with [`ConfigurationError::InUse`] if any component's
    /// `desired_config` still names this configuration.
    pub fn delete(&self, name: &str, tenant_name: Option<&str>, is_admin: bool) -> Result<(), ConfigurationError> {
        let raw = self
            .configurations
            .get(name)
            .map_err(|_| ConfigurationError::NotFound(name.to_string()))?;
        let configuration: Configuration = serde_json::from_value(raw)?;
        self.enforce_tenancy(tenant_name, is_admin, configuration.tenant_name.as_deref())?;

        let in_use = self
            .components
            .iter_values(None)?
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_value::<crate::model::component::Component>(v).ok())
            .any(|c| c.desired_config.as_deref() == Some(name));
        if in_use {
            return Err(ConfigurationError::InUse(name.to_string()));
        }

        self.configurations.delete(name)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Configuration, ConfigurationError> {
        let raw = self
            .configurations
            .get(name)
            .map_err(|_| ConfigurationError::NotFound(name.to_string()))?;
        Ok(serde_json::from_value(raw)?)
    }

    /// `in_use` filters on whether any component's `desired_config` names
    /// the configuration; `None` returns every configuration unfiltered.
    ///
    /// The membership test needs the whole `referenced` set up front, so it
    /// can't ride along as a raw [`DataFilter`] inside a single `get_all`
    /// call. Instead this keeps pulling raw pages (cursoring on the last raw
    /// key seen) until `limit` matches are collected or the store is
    /// exhausted, so a sparse `in_use` filter doesn't silently truncate the
    /// page to whatever the first raw batch happened to contain.
    pub fn list(
        &self,
        in_use: Option<bool>,
        limit: usize,
        after_id: Option<&str>,
    ) -> Result<(Vec<Configuration>, bool), ConfigurationError> {
        let referenced: std::collections::HashSet<String> = match in_use {
            Some(_) => self
                .components
                .iter_values(None)?
                .into_iter()
                .filter_map(|(_, v)| serde_json::from_value::<crate::model::component::Component>(v).ok())
                .filter_map(|c| c.desired_config)
                .collect(),
            None => std::collections::HashSet::new(),
        };

        let mut out = Vec::new();
        let mut cursor = after_id.map(str::to_string);

        loop {
            let page = self.configurations.get_all(limit.max(1), cursor.as_deref(), &[])?;
            if page.entries.is_empty() {
                return Ok((out, false));
            }

            for (name, raw) in &page.entries {
                cursor = Some(name.clone());
                let Ok(configuration) = serde_json::from_value::<Configuration>(raw.clone()) else {
                    continue;
                };
                if let Some(want_in_use) = in_use {
                    if referenced.contains(name) != want_in_use {
                        continue;
                    }
                }
                if out.len() < limit {
                    out.push(configuration);
                } else {
                    return Ok((out, true));
                }
            }

            if !page.next_page_exists {
                return Ok((out, false));
            }
        }
    }

    fn enforce_tenancy(
        &self,
        requesting_tenant: Option<&str>,
        is_admin: bool,
        owner: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        if is_admin {
            return Ok(());
        }
        if let Some(owner) = owner {
            if Some(owner) != requesting_tenant {
                return Err(ConfigurationError::TenantMismatch {
                    owner: owner.to_string(),
                    actual: requesting_tenant.unwrap_or_default().to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_layer_shapes(&self, configuration: &Configuration) -> Result<(), ConfigurationError> {
        for layer in configuration.layers.iter().chain(configuration.additional_inventory.iter()) {
            if layer.branch.is_some() == layer.commit.is_some() {
                return Err(ConfigurationError::AmbiguousRevision);
            }
            if layer.clone_url.is_some() == layer.source.is_some() {
                return Err(ConfigurationError::AmbiguousOrigin);
            }
            if let Some(source_name) = &layer.source {
                if self.sources.get(source_name).is_err() {
                    return Err(ConfigurationError::UnknownSource(source_name.clone()));
                }
            }
        }
        Ok(())
    }

    fn reject_duplicate_pairs(&self, configuration: &Configuration) -> Result<(), ConfigurationError> {
        let mut seen = std::collections::HashSet::new();
        for layer in &configuration.layers {
            if let Some(pair) = layer.pair_key() {
                if !seen.insert(pair.clone()) {
                    return Err(ConfigurationError::DuplicateLayerPair(pair));
                }
            }
        }
        Ok(())
    }

    /// Resolves `branch` to `commit` in place; leaves layers that already
    /// carry a `commit` untouched.
    fn resolve_layer(&self, layer: &mut Layer) -> Result<(), ConfigurationError> {
        let Some(branch) = layer.branch.clone() else {
            return Ok(());
        };
        let clone_url = self.effective_clone_url(layer)?;
        let credentials = self.resolve_credentials(layer)?;
        let commit = self.resolver.resolve_commit(&clone_url, &branch, &credentials)?;
        layer.commit = Some(commit);
        Ok(())
    }

    fn effective_clone_url(&self, layer: &Layer) -> Result<String, ConfigurationError> {
        if let Some(clone_url) = &layer.clone_url {
            return Ok(clone_url.clone());
        }
        let source_name = layer.source.as_deref().expect("validated exactly one of clone_url/source");
        let source = self.load_source(source_name)?;
        Ok(source.clone_url)
    }

    fn resolve_credentials(&self, layer: &Layer) -> Result<ResolveCredentials, ConfigurationError> {
        if let Some(source_name) = &layer.source {
            let source = self.load_source(source_name)?;
            let secret_name = source
                .credentials
                .secret_name
                .clone()
                .ok_or_else(|| ConfigurationError::UnknownSource(source_name.clone()))?;
            let secret = self.secrets.get_secret(&secret_name)?;
            let ca_cert_pem = self.resolve_ca_cert(&source)?;
            return Ok(ResolveCredentials {
                username: secret.username,
                password: secret.password,
                ca_cert_pem,
            });
        }
        Ok(ResolveCredentials {
            username: self.vcs_defaults.username.clone(),
            password: self.vcs_defaults.password.clone(),
            ca_cert_pem: None,
        })
    }

    /// Fetches the single-file CA bundle named by a source's `ca_cert`
    /// ConfigMap reference, per spec.md §6. `None` leaves the resolver to
    /// fall back to its process-default CA path.
    fn resolve_ca_cert(&self, source: &Source) -> Result<Option<String>, ConfigurationError> {
        let Some(ca_cert) = &source.ca_cert else {
            return Ok(None);
        };
        let namespace = ca_cert.namespace.as_deref().unwrap_or(DEFAULT_CONFIGMAP_NAMESPACE);
        let data = self.configmaps.get_configmap(&ca_cert.name, namespace)?;
        let pem = data
            .into_values()
            .next()
            .ok_or_else(|| crate::collab::CollabError::ConfigMapNotFound(ca_cert.name.clone(), namespace.to_string()))?;
        Ok(Some(pem))
    }

    fn load_source(&self, name: &str) -> Result<Source, ConfigurationError> {
        let raw = self
            .sources
            .get(name)
            .map_err(|_| ConfigurationError::UnknownSource(name.to_string()))?;
        Ok(serde_json::from_value(raw)?)
    }
}
