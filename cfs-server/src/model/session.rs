use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusValue {
    Pending,
    Running,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Succeeded {
    None,
    Unknown,
    False,
    True,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfiguration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnsiblePassthrough {
    #[serde(default, rename = "extra-vars", skip_serializing_if = "Option::is_none")]
    pub extra_vars: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forks: Option<i64>,
    #[serde(default, rename = "skip-tags", skip_serializing_if = "Option::is_none")]
    pub skip_tags: Option<String>,
    #[serde(default, rename = "start-at-task", skip_serializing_if = "Option::is_none")]
    pub start_at_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnsibleOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passthrough: Option<AnsiblePassthrough>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "target_type", rename_all = "snake_case")]
pub enum Target {
    Repo,
    Dynamic,
    Spec { groups: Vec<TargetGroup> },
    Image { groups: Vec<TargetGroup> },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetGroup {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusSession {
    pub status: SessionStatusValue,
    pub succeeded: Succeeded,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl Default for SessionStatusSession {
    fn default() -> Self {
        Self {
            status: SessionStatusValue::Pending,
            succeeded: Succeeded::None,
            start_time: None,
            other: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session: SessionStatusSession,
    #[serde(default)]
    pub artifacts: Vec<serde_json::Value>,
}

impl SessionStatus {
    /// Dedup by exact object equality, matching the set-keyed-by-whole-object rule.
    pub fn add_artifact(&mut self, artifact: serde_json::Value) {
        if !self.artifacts.contains(&artifact) {
            self.artifacts.push(artifact);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<SessionConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible: Option<AnsibleOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub debug_on_failure: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orderings_match_spec() {
        assert!(SessionStatusValue::Pending < SessionStatusValue::Running);
        assert!(SessionStatusValue::Running < SessionStatusValue::Complete);
        assert!(Succeeded::None < Succeeded::Unknown);
        assert!(Succeeded::Unknown < Succeeded::False);
        assert!(Succeeded::False < Succeeded::True);
    }

    #[test]
    fn artifact_dedup_by_exact_match() {
        let mut s = SessionStatus::default();
        s.add_artifact(serde_json::json!({"a": 1}));
        s.add_artifact(serde_json::json!({"a": 1}));
        s.add_artifact(serde_json::json!({"a": 2}));
        assert_eq!(s.artifacts.len(), 2);
    }
}
