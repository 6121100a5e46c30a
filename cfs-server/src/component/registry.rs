use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use super::error::ComponentError;
use super::filters::ComponentFilters;
use crate::kv::merge::merge;
use crate::kv::{DataFilter, KvStore};
use crate::model::component::{Component, LayerState};
use crate::model::options::Options;
use crate::reconciler::{reconcile, ConfigurationLookup};

/// Looks up configurations by name against the store, caching hits and
/// misses for the lifetime of one call — spec.md §4.5's "Configurations
/// accessor" that memoizes across the layers of a single reconcile.
struct KvConfigurationLookup<'a> {
    store: &'a KvStore,
    cache: HashMap<String, Option<crate::model::configuration::Configuration>>,
}

impl<'a> KvConfigurationLookup<'a> {
    fn new(store: &'a KvStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }
}

impl ConfigurationLookup for KvConfigurationLookup<'_> {
    fn get(&mut self, name: &str) -> Option<crate::model::configuration::Configuration> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }
        let found = self
            .store
            .get(name)
            .ok()
            .and_then(|v| serde_json::from_value(v).ok());
        self.cache.insert(name.to_string(), found.clone());
        found
    }
}

pub struct ComponentRegistry {
    components: Arc<KvStore>,
    configurations: Arc<KvStore>,
    ara_url: String,
}

impl ComponentRegistry {
    pub fn new(components: Arc<KvStore>, configurations: Arc<KvStore>, ara_url: String) -> Self {
        Self {
            components,
            configurations,
            ara_url,
        }
    }

    #[instrument(skip(self, component))]
    pub fn put(&self, mut component: Component) -> Result<Component, ComponentError> {
        component.scrub_empty_tags();
        dedup_state(&mut component.state);
        let value = serde_json::to_value(&component)?;
        self.components.put(&component.id, value)?;
        Ok(component)
    }

    /// Merges `patch` over the stored record, folding `state_append` into
    /// `state` by (`clone_url`, `playbook`) and scrubbing empty tag values —
    /// the same invariants `put` enforces, reapplied since a patch can
    /// reintroduce them.
    pub fn patch(&self, id: &str, patch: Value) -> Result<Component, ComponentError> {
        let patch_handler = |base: &Value, patch: &Value| apply_component_patch(merge(base, patch));
        let updated = self
            .components
            .patch(id, &patch, Some(&patch_handler), None, None)
            .map_err(|e| match e {
                crate::kv::KvError::NoEntry(_) => ComponentError::NotFound(id.to_string()),
                other => ComponentError::Kv(other),
            })?;
        Ok(serde_json::from_value(updated)?)
    }

    /// Bulk `{filters, patch}` form: patches every component matching
    /// `filters` against its *stored* fields (pre-reconcile; `status` here
    /// means the raw `configuration_status`, not the computed one).
    pub fn patch_bulk(&self, filters: ComponentFilters, patch: Value) -> Result<Vec<String>, ComponentError> {
        let filter: DataFilter = Arc::new(move |v: &Value| {
            serde_json::from_value::<Component>(v.clone())
                .map(|c| filters.matches(&c, c.configuration_status.as_deref().unwrap_or("")))
                .unwrap_or(false)
        });
        let update_handler = |v: Value| apply_component_patch(v);
        Ok(self.components.patch_all(&filter, &patch, Some(&update_handler))?)
    }

    pub fn delete(&self, id: &str) -> Result<(), ComponentError> {
        self.components.delete(id).map_err(|e| match e {
            crate::kv::KvError::NoEntry(_) => ComponentError::NotFound(id.to_string()),
            other => ComponentError::Kv(other),
        })
    }

    /// Reads the stored record and overlays the reconciler's computed
    /// `configuration_status`/`desired_state` — derived fields, never
    /// persisted (model/component.rs's `Component::configuration_status` doc).
    pub fn get(&self, id: &str, options: &Options, config_details: bool) -> Result<Component, ComponentError> {
        let raw = self.components.get(id).map_err(|e| match e {
            crate::kv::KvError::NoEntry(_) => ComponentError::NotFound(id.to_string()),
            other => ComponentError::Kv(other),
        })?;
        let mut component: Component = serde_json::from_value(raw)?;
        self.annotate(&mut component, options, config_details);
        Ok(component)
    }

    /// `filters` matches against the reconciled `configuration_status`, which
    /// only exists after `annotate` — so the match can't be pushed down as a
    /// raw [`DataFilter`] into a single `get_all` call. Instead this keeps
    /// pulling raw pages (cursoring on the last raw key seen) and annotating
    /// each candidate until `limit` matches are collected or the store is
    /// exhausted, so a sparse filter doesn't silently truncate the page.
    pub fn list(
        &self,
        filters: &ComponentFilters,
        limit: usize,
        after_id: Option<&str>,
        options: &Options,
        config_details: bool,
    ) -> Result<(Vec<Component>, bool), ComponentError> {
        let mut out = Vec::new();
        let mut cursor = after_id.map(str::to_string);

        loop {
            let page = self.components.get_all(limit.max(1), cursor.as_deref(), &[])?;
            if page.entries.is_empty() {
                return Ok((out, false));
            }

            for (key, raw) in &page.entries {
                cursor = Some(key.clone());
                let Ok(mut component) = serde_json::from_value::<Component>(raw.clone()) else {
                    continue;
                };
                self.annotate(&mut component, options, config_details);
                if !filters.matches(&component, component.configuration_status.as_deref().unwrap_or("")) {
                    continue;
                }
                if out.len() < limit {
                    out.push(component);
                } else {
                    return Ok((out, true));
                }
            }

            if !page.next_page_exists {
                return Ok((out, false));
            }
        }
    }

    fn annotate(&self, component: &mut Component, options: &Options, config_details: bool) {
        let mut lookup = KvConfigurationLookup::new(&self.configurations);
        let outcome = reconcile(component, &mut lookup, options, config_details);
        component.configuration_status = Some(outcome.status.to_string());
        component.desired_state = outcome.desired_state;
        component.logs = options.include_ara_links.then(|| self.ara_playbooks_url(&component.id));
    }

    /// ARA's `/api/v1/playbooks` endpoint filters runs by `label`, which CFS
    /// sets to the component ID on every playbook it launches.
    fn ara_playbooks_url(&self, component_id: &str) -> String {
        format!("{}/api/v1/playbooks?label={}", self.ara_url.trim_end_matches('/'), component_id)
    }
}

/// Folds `state_append` into `state` and scrubs empty tag values on an
/// already-merged component document. Shared by the single-patch and
/// bulk-patch paths, both of which hand this a raw JSON value rather than a
/// typed [`Component`] since `KvStore::patch`/`patch_all` are infallible.
fn apply_component_patch(mut merged: Value) -> Value {
    let Value::Object(obj) = &mut merged else {
        return merged;
    };

    if let Some(append_raw) = obj.remove("state_append") {
        if let Ok(mut appended) = serde_json::from_value::<LayerState>(append_raw) {
            appended.stamp_if_absent();
            let key = appended.key();
            let appended_value = serde_json::to_value(&appended).unwrap_or(Value::Null);
            let state = obj.entry("state").or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(entries) = state {
                let existing = entries.iter_mut().find(|entry| {
                    serde_json::from_value::<LayerState>((*entry).clone())
                        .map(|l| l.key() == key)
                        .unwrap_or(false)
                });
                match existing {
                    Some(slot) => *slot = appended_value,
                    None => entries.push(appended_value),
                }
            }
        }
    }

    if let Some(Value::Object(tags)) = obj.get_mut("tags") {
        tags.retain(|_, v| v.as_str().map(|s| !s.is_empty()).unwrap_or(true));
    }

    merged
}

/// Keeps only the last entry for any (`clone_url`, `playbook`) pair, the
/// invariant spec.md §8 states must hold after any sequence of writes.
fn dedup_state(state: &mut Vec<LayerState>) {
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut deduped: Vec<LayerState> = Vec::with_capacity(state.len());
    for entry in state.drain(..) {
        let key = entry.key();
        if let Some(&idx) = seen.get(&key) {
            deduped[idx] = entry;
        } else {
            seen.insert(key, deduped.len());
            deduped.push(entry);
        }
    }
    *state = deduped;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::backend::InMemoryKvBackend;
    use crate::model::component::LayerStatus;
    use serde_json::json;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new(
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
            "https://ara.cfs.svc.cluster.local".to_string(),
        )
    }

    #[test]
    fn put_dedups_state_by_clone_url_and_playbook() {
        let registry = registry();
        let component = Component {
            id: "n1".into(),
            state: vec![
                LayerState {
                    clone_url: "u1".into(),
                    playbook: "site.yml".into(),
                    commit: "A".into(),
                    status: LayerStatus::Pending,
                    last_updated: None,
                },
                LayerState {
                    clone_url: "u1".into(),
                    playbook: "site.yml".into(),
                    commit: "B".into(),
                    status: LayerStatus::Applied,
                    last_updated: None,
                },
            ],
            ..Default::default()
        };
        let saved = registry.put(component).unwrap();
        assert_eq!(saved.state.len(), 1);
        assert_eq!(saved.state[0].commit, "B");
    }

    #[test]
    fn unconfigured_new_component_reports_config_deprecated() {
        let registry = registry();
        registry
            .put(Component {
                id: "n1".into(),
                enabled: true,
                ..Default::default()
            })
            .unwrap();
        let component = registry.get("n1", &Options::default(), false).unwrap();
        assert_eq!(component.configuration_status.as_deref(), Some("config_deprecated"));
    }

    #[test]
    fn logs_link_follows_include_ara_links_option() {
        let registry = registry();
        registry.put(Component { id: "n1".into(), ..Default::default() }).unwrap();

        let with_links = registry.get("n1", &Options::default(), false).unwrap();
        assert_eq!(
            with_links.logs.as_deref(),
            Some("https://ara.cfs.svc.cluster.local/api/v1/playbooks?label=n1")
        );

        let without_links = registry
            .get("n1", &Options { include_ara_links: false, ..Options::default() }, false)
            .unwrap();
        assert!(without_links.logs.is_none());
    }

    #[test]
    fn list_keeps_scanning_past_non_matching_raw_pages() {
        let registry = registry();
        for (id, enabled) in [
            ("n1", false),
            ("n2", false),
            ("n3", true),
            ("n4", false),
            ("n5", true),
        ] {
            registry
                .put(Component {
                    id: id.into(),
                    enabled,
                    ..Default::default()
                })
                .unwrap();
        }

        let filters = ComponentFilters {
            enabled: Some(true),
            ..Default::default()
        };
        let (matched, next_page_exists) = registry.list(&filters, 2, None, &Options::default(), false).unwrap();
        assert_eq!(matched.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["n3", "n5"]);
        assert!(!next_page_exists);
    }

    #[test]
    fn patch_merges_state_append_and_reports_configured() {
        let registry = registry();
        registry
            .components
            .put(
                "c1",
                json!({"name": "c1", "layers": [{"clone_url": "u1", "playbook": "site.yml", "commit": "C1"}]}),
            )
            .unwrap();
        registry
            .put(Component {
                id: "n1".into(),
                ..Default::default()
            })
            .unwrap();

        registry
            .patch(
                "n1",
                json!({
                    "desired_config": "c1",
                    "state_append": {"clone_url": "u1", "playbook": "site.yml", "commit": "C1", "status": "applied"},
                }),
            )
            .unwrap();

        let component = registry.get("n1", &Options::default(), false).unwrap();
        assert_eq!(component.state.len(), 1);
        assert_eq!(component.configuration_status.as_deref(), Some("configured"));
    }
}
