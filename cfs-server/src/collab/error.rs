use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollabError {
    #[error("secret store request failed: {0}")]
    SecretStore(String),

    #[error("configmap `{0}` not found in namespace `{1}`")]
    ConfigMapNotFound(String, String),

    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("tenant service request failed: {0}")]
    TenantService(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
