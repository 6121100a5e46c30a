use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use super::error::SourceError;
use crate::collab::secret_store::SecretValue;
use crate::collab::SecretStore;
use crate::kv::KvStore;
use crate::model::configuration::Configuration;
use crate::model::now_stamp;
use crate::model::source::{AuthenticationMethod, Source};
use crate::options::OptionsCache;

pub struct SourceRegistry {
    sources: Arc<KvStore>,
    configurations: Arc<KvStore>,
    secrets: Arc<dyn SecretStore>,
    options: Arc<OptionsCache>,
}

impl SourceRegistry {
    pub fn new(
        sources: Arc<KvStore>,
        configurations: Arc<KvStore>,
        secrets: Arc<dyn SecretStore>,
        options: Arc<OptionsCache>,
    ) -> Self {
        Self {
            sources,
            configurations,
            secrets,
            options,
        }
    }

    /// Writes the username/password to the SecretStore and persists only
    /// `authentication_method`/`secret_name`, per spec.md §4.8's Create rule.
    #[instrument(skip(self, source))]
    pub fn create(&self, mut source: Source) -> Result<Source, SourceError> {
        if source.credentials.authentication_method == AuthenticationMethod::Password {
            let username = source
                .credentials
                .username
                .take()
                .ok_or(SourceError::MissingCredentials)?;
            let password = source
                .credentials
                .password
                .take()
                .ok_or(SourceError::MissingCredentials)?;

            let secret_name = source
                .credentials
                .secret_name
                .clone()
                .unwrap_or_else(|| format!("cfs-source-{}-{}", source.name, Uuid::new_v4()));

            self.secrets.put_secret(&secret_name, &SecretValue { username, password })?;
            source.credentials.secret_name = Some(secret_name);
        }

        source.credentials = source.credentials.scrubbed();
        source.last_updated = Some(now_stamp());

        let value = serde_json::to_value(&source)?;
        self.sources.put(&source.name, value)?;
        Ok(source)
    }

    pub fn get(&self, name: &str) -> Result<Source, SourceError> {
        let raw = self.sources.get(name).map_err(|_| SourceError::NotFound(name.to_string()))?;
        Ok(serde_json::from_value(raw)?)
    }

    pub fn list(&self, limit: usize, after_id: Option<&str>) -> Result<(Vec<Source>, bool), SourceError> {
        let page = self.sources.get_all(limit, after_id, &[])?;
        let out = page
            .entries
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_value(v).ok())
            .collect();
        Ok((out, page.next_page_exists))
    }

    /// Merges `patch` over the stored record; a fresh `username`/`password`
    /// pair rotates the secret the same way `create` writes one.
    #[instrument(skip(self, patch))]
    pub fn patch(&self, name: &str, patch: serde_json::Value) -> Result<Source, SourceError> {
        let raw = self.sources.get(name).map_err(|_| SourceError::NotFound(name.to_string()))?;
        let mut merged: Source = serde_json::from_value(crate::kv::merge::merge(&raw, &patch))?;

        if merged.credentials.authentication_method == AuthenticationMethod::Password {
            if let (Some(username), Some(password)) =
                (merged.credentials.username.take(), merged.credentials.password.take())
            {
                let secret_name = merged
                    .credentials
                    .secret_name
                    .clone()
                    .unwrap_or_else(|| format!("cfs-source-{}-{}", merged.name, Uuid::new_v4()));
                self.secrets.put_secret(&secret_name, &SecretValue { username, password })?;
                merged.credentials.secret_name = Some(secret_name);
            }
        }
        merged.credentials = merged.credentials.scrubbed();
        merged.last_updated = Some(now_stamp());

        let value = serde_json::to_value(&merged)?;
        self.sources.put(name, value)?;
        Ok(merged)
    }

    /// Refuses deletion while any configuration layer/additional_inventory
    /// references this source, or it backs the global
    /// `additional_inventory_source` option. Removes the secret on success.
    pub fn delete(&self, name: &str) -> Result<(), SourceError> {
        let raw = self.sources.get(name).map_err(|_| SourceError::NotFound(name.to_string()))?;
        let source: Source = serde_json::from_value(raw)?;

        if self.options.current().additional_inventory_source == name {
            return Err(SourceError::InUse(name.to_string()));
        }

        let referenced = self
            .configurations
            .iter_values(None)?
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_value::<Configuration>(v).ok())
            .any(|c| {
                c.layers.iter().any(|l| l.source.as_deref() == Some(name))
                    || c.additional_inventory.as_ref().and_then(|l| l.source.as_deref()) == Some(name)
            });
        if referenced {
            return Err(SourceError::InUse(name.to_string()));
        }

        if let Some(secret_name) = &source.credentials.secret_name {
            self.secrets.delete_secret(secret_name)?;
        }
        self.sources.delete(name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::secret_store::MockSecretStore;
    use crate::kv::backend::InMemoryKvBackend;
    use crate::model::source::Credentials;

    fn registry(secrets: MockSecretStore) -> SourceRegistry {
        let store = Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10));
        let options = Arc::new(OptionsCache::new(store.clone(), None).unwrap());
        SourceRegistry::new(
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
            Arc::new(secrets),
            options,
        )
    }

    #[test]
    fn create_scrubs_credentials_and_persists_secret_name() {
        let mut secrets = MockSecretStore::new();
        secrets.expect_put_secret().returning(|_, _| Ok(()));
        let registry = registry(secrets);

        let source = Source {
            name: "s1".into(),
            clone_url: "https://example.com/repo.git".into(),
            credentials: Credentials {
                username: Some("u".into()),
                password: Some("p".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let saved = registry.create(source).unwrap();
        assert!(saved.credentials.username.is_none());
        assert!(saved.credentials.password.is_none());
        assert!(saved.credentials.secret_name.is_some());
    }

    #[test]
    fn create_rejects_password_method_missing_credentials() {
        let registry = registry(MockSecretStore::new());
        let source = Source {
            name: "s1".into(),
            clone_url: "https://example.com/repo.git".into(),
            ..Default::default()
        };
        let err = registry.create(source).unwrap_err();
        assert!(matches!(err, SourceError::MissingCredentials));
    }

    #[test]
    fn delete_refuses_while_in_use_by_configuration() {
        let mut secrets = MockSecretStore::new();
        secrets.expect_put_secret().returning(|_, _| Ok(()));
        let registry = registry(secrets);

        let source = Source {
            name: "s1".into(),
            clone_url: "https://example.com/repo.git".into(),
            credentials: Credentials {
                username: Some("u".into()),
                password: Some("p".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        registry.create(source).unwrap();

        registry
            .configurations
            .put(
                "c1",
                serde_json::json!({"name": "c1", "layers": [{"source": "s1", "commit": "abc"}]}),
            )
            .unwrap();

        let err = registry.delete("s1").unwrap_err();
        assert!(matches!(err, SourceError::InUse(_)));
    }
}
