use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::now_stamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    Applied,
    Failed,
    Incomplete,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    pub clone_url: String,
    pub playbook: String,
    pub commit: String,
    pub status: LayerStatus,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl LayerState {
    pub fn key(&self) -> (String, String) {
        (self.clone_url.clone(), self.playbook.clone())
    }

    pub fn stamp_if_absent(&mut self) {
        if self.last_updated.is_none() {
            self.last_updated = Some(now_stamp());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_config: Option<String>,
    #[serde(default)]
    pub state: Vec<LayerState>,
    /// Patch-only field: merged into `state` and removed by the registry layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_append: Option<LayerState>,
    /// Populated on GET when `config_details=true`; never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<i64>,
    #[serde(default)]
    pub error_count: i64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Derived on read, never authoritative in storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

impl Component {
    /// Removes tags whose value is empty, per the data model's write-time invariant.
    pub fn scrub_empty_tags(&mut self) {
        self.tags.retain(|_, v| !v.is_empty());
    }

    /// Merges `state_append` into `state`, replacing any entry keyed by
    /// (`clone_url`, `playbook`) and stamping `last_updated` when absent.
    pub fn apply_state_append(&mut self) {
        let Some(mut appended) = self.state_append.take() else {
            return;
        };
        appended.stamp_if_absent();
        let key = appended.key();
        if let Some(existing) = self.state.iter_mut().find(|s| s.key() == key) {
            *existing = appended;
        } else {
            self.state.push(appended);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_replaces_existing_layer_by_key() {
        let mut c = Component {
            id: "n1".into(),
            state: vec![LayerState {
                clone_url: "u1".into(),
                playbook: "site.yml".into(),
                commit: "A".into(),
                status: LayerStatus::Pending,
                last_updated: Some("2026-01-01T00:00:00Z".into()),
            }],
            state_append: Some(LayerState {
                clone_url: "u1".into(),
                playbook: "site.yml".into(),
                commit: "B".into(),
                status: LayerStatus::Applied,
                last_updated: None,
            }),
            ..Default::default()
        };
        c.apply_state_append();
        assert_eq!(c.state.len(), 1);
        assert_eq!(c.state[0].commit, "B");
        assert!(c.state[0].last_updated.is_some());
        assert!(c.state_append.is_none());
    }

    #[test]
    fn empty_tag_values_are_scrubbed() {
        let mut c = Component {
            id: "n1".into(),
            tags: BTreeMap::from([("a".to_string(), "".to_string()), ("b".to_string(), "x".to_string())]),
            ..Default::default()
        };
        c.scrub_empty_tags();
        assert_eq!(c.tags.len(), 1);
        assert!(c.tags.contains_key("b"));
    }
}
