use crate::model::component::{Component, LayerStatus};
use crate::model::configuration::Configuration;
use crate::model::options::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigurationStatus {
    Unconfigured,
    Failed,
    Pending,
    Configured,
}

impl ConfigurationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Failed => "failed",
            Self::Pending => "pending",
            Self::Configured => "configured",
        }
    }
}

/// Looks up a named configuration, caching results for the lifetime of one
/// reconciliation pass, per spec.md §4.5's "Configurations accessor".
pub trait ConfigurationLookup {
    fn get(&mut self, name: &str) -> Option<Configuration>;
}

pub struct ReconcileOutcome {
    /// `None` only for the two terminal cases that bypass layer evaluation
    /// entirely (`config_deprecated` has no ConfigurationStatus counterpart).
    pub status: &'static str,
    pub desired_state: Option<serde_json::Value>,
}

/// Pure status derivation: (component, referenced configuration, options) ->
/// configuration status, per-layer status, retry verdict. See spec.md §4.5.
pub fn reconcile(
    component: &Component,
    configurations: &mut dyn ConfigurationLookup,
    options: &Options,
    config_details: bool,
) -> ReconcileOutcome {
    let Some(desired_config_name) = component.desired_config.as_deref().filter(|s| !s.is_empty())
    else {
        return ReconcileOutcome {
            status: "config_deprecated",
            desired_state: None,
        };
    };

    let retries = component.retry_policy.unwrap_or(options.default_batcher_retry_policy);
    let max_retries = retries != -1 && component.error_count >= retries;

    let Some(desired) = configurations.get(desired_config_name) else {
        let status = if component.state.is_empty() {
            "unconfigured"
        } else {
            "configured"
        };
        return ReconcileOutcome {
            status,
            desired_state: None,
        };
    };

    if desired.layers.is_empty() {
        let status = if component.state.is_empty() {
            "unconfigured"
        } else {
            "configured"
        };
        return ReconcileOutcome {
            status,
            desired_state: None,
        };
    }

    let mut combined = ConfigurationStatus::Configured;
    let mut annotated_layers = Vec::with_capacity(desired.layers.len());

    for layer in &desired.layers {
        let effective_playbook = layer
            .playbook
            .clone()
            .unwrap_or_else(|| options.default_playbook.clone());
        let origin = layer.clone_url.clone().or_else(|| layer.source.clone());

        let layer_status = match (&layer.commit, &origin) {
            (Some(commit), Some(clone_url)) => {
                let matched = component.state.iter().find(|s| {
                    &s.clone_url == clone_url && s.playbook == effective_playbook && &s.commit == commit
                });
                match matched {
                    Some(entry) => match entry.status {
                        LayerStatus::Failed => {
                            if max_retries {
                                ConfigurationStatus::Failed
                            } else {
                                ConfigurationStatus::Pending
                            }
                        }
                        LayerStatus::Incomplete => ConfigurationStatus::Pending,
                        LayerStatus::Applied | LayerStatus::Pending => ConfigurationStatus::Configured,
                    },
                    None => ConfigurationStatus::Pending,
                }
            }
            _ => ConfigurationStatus::Unconfigured,
        };

        combined = combined.min(layer_status);

        if config_details {
            let mut entry = serde_json::to_value(layer).unwrap_or_default();
            if let serde_json::Value::Object(obj) = &mut entry {
                obj.insert(
                    "computed_status".to_string(),
                    serde_json::Value::String(layer_status.as_str().to_string()),
                );
            }
            annotated_layers.push(entry);
        }
    }

    if combined == ConfigurationStatus::Pending && max_retries {
        combined = ConfigurationStatus::Failed;
    }

    let desired_state = config_details.then(|| serde_json::Value::Array(annotated_layers));

    ReconcileOutcome {
        status: combined.as_str(),
        desired_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::component::LayerState;
    use crate::model::configuration::Layer;
    use std::collections::HashMap;

    struct FakeLookup(HashMap<String, Configuration>);
    impl ConfigurationLookup for FakeLookup {
        fn get(&mut self, name: &str) -> Option<Configuration> {
            self.0.get(name).cloned()
        }
    }

    fn options_with_retry(retries: i64) -> Options {
        Options {
            default_batcher_retry_policy: retries,
            ..Default::default()
        }
    }

    #[test]
    fn unconfigured_new_component_is_config_deprecated_without_desired_config() {
        let component = Component {
            id: "n1".into(),
            enabled: true,
            ..Default::default()
        };
        let mut lookup = FakeLookup(HashMap::new());
        let outcome = reconcile(&component, &mut lookup, &Options::default(), false);
        assert_eq!(outcome.status, "config_deprecated");
    }

    #[test]
    fn configured_component_all_layers_applied() {
        let configuration = Configuration {
            name: "c1".into(),
            layers: vec![Layer {
                clone_url: Some("u1".into()),
                playbook: Some("site.yml".into()),
                commit: Some("C1".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let component = Component {
            id: "n1".into(),
            desired_config: Some("c1".into()),
            state: vec![LayerState {
                clone_url: "u1".into(),
                playbook: "site.yml".into(),
                commit: "C1".into(),
                status: LayerStatus::Applied,
                last_updated: None,
            }],
            ..Default::default()
        };
        let mut lookup = FakeLookup(HashMap::from([("c1".to_string(), configuration)]));
        let outcome = reconcile(&component, &mut lookup, &Options::default(), false);
        assert_eq!(outcome.status, "configured");
    }

    #[test]
    fn failed_with_retries_exhausted() {
        let configuration = Configuration {
            name: "c1".into(),
            layers: vec![Layer {
                clone_url: Some("u1".into()),
                playbook: Some("site.yml".into()),
                commit: Some("C1".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let component = Component {
            id: "n1".into(),
            desired_config: Some("c1".into()),
            error_count: 1,
            state: vec![LayerState {
                clone_url: "u1".into(),
                playbook: "site.yml".into(),
                commit: "C1".into(),
                status: LayerStatus::Failed,
                last_updated: None,
            }],
            ..Default::default()
        };
        let mut lookup = FakeLookup(HashMap::from([("c1".to_string(), configuration)]));
        let outcome = reconcile(&component, &mut lookup, &options_with_retry(0), false);
        assert_eq!(outcome.status, "failed");
    }

    #[test]
    fn retries_minus_one_never_trips_max_retries() {
        let configuration = Configuration {
            name: "c1".into(),
            layers: vec![Layer {
                clone_url: Some("u1".into()),
                playbook: Some("site.yml".into()),
                commit: Some("C1".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let component = Component {
            id: "n1".into(),
            desired_config: Some("c1".into()),
            error_count: 1000,
            state: vec![LayerState {
                clone_url: "u1".into(),
                playbook: "site.yml".into(),
                commit: "C1".into(),
                status: LayerStatus::Failed,
                last_updated: None,
            }],
            ..Default::default()
        };
        let mut lookup = FakeLookup(HashMap::from([("c1".to_string(), configuration)]));
        let outcome = reconcile(&component, &mut lookup, &options_with_retry(-1), false);
        assert_eq!(outcome.status, "pending");
    }

    #[test]
    fn missing_layer_fields_yield_unconfigured() {
        let configuration = Configuration {
            name: "c1".into(),
            layers: vec![Layer {
                playbook: Some("site.yml".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let component = Component {
            id: "n1".into(),
            desired_config: Some("c1".into()),
            ..Default::default()
        };
        let mut lookup = FakeLookup(HashMap::from([("c1".to_string(), configuration)]));
        let outcome = reconcile(&component, &mut lookup, &Options::default(), false);
        assert_eq!(outcome.status, "unconfigured");
    }
}
