use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default = "Options::default_playbook")]
    pub default_playbook: String,
    #[serde(default = "Options::default_ansible_config")]
    pub default_ansible_config: String,
    #[serde(default = "Options::default_batcher_retry_policy")]
    pub default_batcher_retry_policy: i64,
    #[serde(default)]
    pub batcher_check_interval: i64,
    #[serde(default)]
    pub batch_size: i64,
    #[serde(default)]
    pub batch_window: i64,
    #[serde(default = "Options::default_page_size")]
    pub default_page_size: i64,
    #[serde(default = "Options::default_logging_level")]
    pub logging_level: String,
    #[serde(default = "Options::default_include_ara_links")]
    pub include_ara_links: bool,
    #[serde(default)]
    pub additional_inventory_source: String,
}

impl Options {
    pub fn default_playbook() -> String {
        "site.yml".to_string()
    }
    pub fn default_ansible_config() -> String {
        "cfs-default-ansible-cfg".to_string()
    }
    pub fn default_batcher_retry_policy() -> i64 {
        1
    }
    pub fn default_page_size() -> i64 {
        1000
    }
    pub fn default_logging_level() -> String {
        "INFO".to_string()
    }
    pub fn default_include_ara_links() -> bool {
        true
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_playbook: Self::default_playbook(),
            default_ansible_config: Self::default_ansible_config(),
            default_batcher_retry_policy: Self::default_batcher_retry_policy(),
            batcher_check_interval: 0,
            batch_size: 0,
            batch_window: 0,
            default_page_size: Self::default_page_size(),
            logging_level: Self::default_logging_level(),
            include_ara_links: Self::default_include_ara_links(),
            additional_inventory_source: String::new(),
        }
    }
}

/// Merges `value` over the serialized defaults, injecting any key the stored
/// record is missing. Used as `KvStore::patch`'s identity patch handler by
/// `OptionsCache::refresh`.
pub fn inject_defaults(stored: serde_json::Value) -> serde_json::Value {
    let defaults = serde_json::to_value(Options::default()).expect("Options always serializes");
    crate::kv::merge::merge(&defaults, &stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_get_defaults_injected() {
        let stored = serde_json::json!({"logging_level": "DEBUG"});
        let merged = inject_defaults(stored);
        assert_eq!(merged["logging_level"], "DEBUG");
        assert_eq!(merged["default_playbook"], "site.yml");
    }
}
