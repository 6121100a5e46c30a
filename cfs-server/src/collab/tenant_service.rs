use super::error::CollabError;

/// Client for the tenant-existence check named in spec.md §4.9/§6.
#[cfg_attr(test, mockall::automock)]
pub trait TenantService: Send + Sync {
    fn tenant_exists(&self, name: &str) -> Result<bool, CollabError>;
}

pub struct HttpTenantService {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTenantService {
    pub fn new(base_url: String) -> Result<Self, CollabError> {
        let client = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .build()?;
        Ok(Self { client, base_url })
    }
}

impl TenantService for HttpTenantService {
    fn tenant_exists(&self, name: &str) -> Result<bool, CollabError> {
        let url = format!("{}/tenants/{}", self.base_url.trim_end_matches('/'), name);
        let response = self.client.get(url).send()?;
        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(CollabError::TenantService(format!(
                "tenant lookup for `{name}` returned {}",
                response.status()
            )));
        }
        Ok(true)
    }
}
