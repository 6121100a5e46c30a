use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl Layer {
    /// The effective origin discriminator used for layer-pair uniqueness: the
    /// resolved `source` name if present, else the raw `clone_url`.
    pub fn origin_key(&self) -> Option<&str> {
        self.source.as_deref().or(self.clone_url.as_deref())
    }

    pub fn pair_key(&self) -> Option<(String, String)> {
        let origin = self.origin_key()?;
        let playbook = self.playbook.as_deref().unwrap_or_default();
        Some((origin.to_string(), playbook.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_inventory: Option<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_prefers_source_over_clone_url() {
        let l = Layer {
            clone_url: Some("u1".into()),
            source: Some("src1".into()),
            playbook: Some("site.yml".into()),
            ..Default::default()
        };
        assert_eq!(
            l.pair_key(),
            Some(("src1".to_string(), "site.yml".to_string()))
        );
    }
}
