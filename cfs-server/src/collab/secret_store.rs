use serde::{Deserialize, Serialize};

use super::error::CollabError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretValue {
    pub username: String,
    pub password: String,
}

/// Client for the external secret store addressed by `VAULT_ADDR`, per
/// spec.md §6's collaborator table.
#[cfg_attr(test, mockall::automock)]
pub trait SecretStore: Send + Sync {
    fn put_secret(&self, path: &str, value: &SecretValue) -> Result<(), CollabError>;
    fn get_secret(&self, path: &str) -> Result<SecretValue, CollabError>;
    fn delete_secret(&self, path: &str) -> Result<(), CollabError>;
}

/// Blocking reqwest-backed implementation, grounded on the teacher's
/// `http::client::HttpClient` rustls-blocking construction.
pub struct VaultSecretStore {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl VaultSecretStore {
    pub fn new(base_url: String) -> Result<Self, CollabError> {
        let client = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .build()?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/secret/{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl SecretStore for VaultSecretStore {
    fn put_secret(&self, path: &str, value: &SecretValue) -> Result<(), CollabError> {
        let response = self.client.put(self.url(path)).json(value).send()?;
        if !response.status().is_success() {
            return Err(CollabError::SecretStore(format!(
                "put_secret `{path}` returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn get_secret(&self, path: &str) -> Result<SecretValue, CollabError> {
        let response = self.client.get(self.url(path)).send()?;
        if !response.status().is_success() {
            return Err(CollabError::SecretStore(format!(
                "get_secret `{path}` returned {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    fn delete_secret(&self, path: &str) -> Result<(), CollabError> {
        let response = self.client.delete(self.url(path)).send()?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(CollabError::SecretStore(format!(
                "delete_secret `{path}` returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_strips_trailing_slash_from_base() {
        let store = VaultSecretStore::new("https://vault.example:8200/".to_string()).unwrap();
        assert_eq!(store.url("cfs/sources/s1"), "https://vault.example:8200/secret/cfs/sources/s1");
    }
}
