use std::collections::BTreeMap;

use crate::model::component::Component;

/// GET-time filters over a component plus its reconciler-computed status,
/// per spec.md §6's `ids`/`status`/`enabled`/`config_name`/`tags` query params.
#[derive(Debug, Clone, Default)]
pub struct ComponentFilters {
    pub ids: Vec<String>,
    pub status: Option<String>,
    pub enabled: Option<bool>,
    pub config_name: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl ComponentFilters {
    pub fn matches(&self, component: &Component, computed_status: &str) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&component.id) {
            return false;
        }
        if let Some(status) = &self.status {
            if status != computed_status {
                return false;
            }
        }
        if let Some(enabled) = self.enabled {
            if component.enabled != enabled {
                return false;
            }
        }
        if let Some(config_name) = &self.config_name {
            if component.desired_config.as_deref() != Some(config_name.as_str()) {
                return false;
            }
        }
        for (k, v) in &self.tags {
            if component.tags.get(k) != Some(v) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_filter_restricts_to_listed_components() {
        let component = Component {
            id: "n1".into(),
            ..Default::default()
        };
        let filters = ComponentFilters {
            ids: vec!["n2".into()],
            ..Default::default()
        };
        assert!(!filters.matches(&component, "unconfigured"));
    }

    #[test]
    fn tag_filter_requires_exact_value_match() {
        let component = Component {
            id: "n1".into(),
            tags: BTreeMap::from([("env".to_string(), "prod".to_string())]),
            ..Default::default()
        };
        let filters = ComponentFilters {
            tags: BTreeMap::from([("env".to_string(), "dev".to_string())]),
            ..Default::default()
        };
        assert!(!filters.matches(&component, "unconfigured"));
    }
}
