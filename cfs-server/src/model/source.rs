use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationMethod {
    Password,
}

impl Default for AuthenticationMethod {
    fn default() -> Self {
        Self::Password
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub authentication_method: AuthenticationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    /// Write-only: present on the incoming request, scrubbed before persist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Credentials {
    pub fn scrubbed(&self) -> Self {
        Self {
            authentication_method: self.authentication_method.clone(),
            secret_name: self.secret_name.clone(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaCertRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub clone_url: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<CaCertRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubbed_drops_username_and_password() {
        let c = Credentials {
            authentication_method: AuthenticationMethod::Password,
            secret_name: Some("s1".into()),
            username: Some("u".into()),
            password: Some("p".into()),
        };
        let s = c.scrubbed();
        assert!(s.username.is_none());
        assert!(s.password.is_none());
        assert_eq!(s.secret_name, Some("s1".to_string()));
    }
}
