use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;
use tracing_subscriber::{reload, EnvFilter};

use crate::kv::{KvError, KvStore};
use crate::model::options::{inject_defaults, Options};

const OPTIONS_KEY: &str = "options";

pub type OptionsSnapshot = Options;

/// Process-wide singleton: an immutable snapshot swapped atomically on each
/// refresh, per Design Notes §9's instruction against a singleton guarded
/// only by a lock. Readers see the old or new snapshot, never a partial one.
pub struct OptionsCache {
    store: Arc<KvStore>,
    snapshot: ArcSwap<OptionsSnapshot>,
    log_reload: Option<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}

/// Accessor keys for [`OptionsCache::or_default`] — the systems-language
/// stand-in for the `@defaults(limit="default_page_size")` decorator.
#[derive(Debug, Clone, Copy)]
pub enum OptionKey {
    DefaultPageSize,
    DefaultPlaybook,
    DefaultBatcherRetryPolicy,
}

impl OptionsCache {
    pub fn new(
        store: Arc<KvStore>,
        log_reload: Option<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    ) -> Result<Self, KvError> {
        let snapshot = ArcSwap::from_pointee(Options::default());
        let cache = Self {
            store,
            snapshot,
            log_reload,
        };
        cache.refresh()?;
        Ok(cache)
    }

    /// Reads the whole options record via `KvStore::patch` with an identity
    /// patch and the defaults-injection patch handler, guaranteeing missing
    /// defaults are written back in the same transaction — exactly spec.md
    /// §4.3's "on first access, and on every refresh" rule.
    pub fn refresh(&self) -> Result<(), KvError> {
        let identity_patch = serde_json::json!({});
        let patch_handler = |base: &serde_json::Value, patch: &serde_json::Value| {
            let merged = inject_defaults(base.clone());
            crate::kv::merge::merge(&merged, patch)
        };
        let default_entry = serde_json::to_value(Options::default()).expect("Options serializes");
        let raw = self.store.patch(
            OPTIONS_KEY,
            &identity_patch,
            Some(&patch_handler),
            None,
            Some(&default_entry),
        )?;
        let options: Options = serde_json::from_value(raw)?;

        let previous = self.snapshot.load();
        if previous.logging_level != options.logging_level {
            self.apply_log_level(&options.logging_level);
        }

        self.snapshot.store(Arc::new(options));
        Ok(())
    }

    /// Merges `patch` over the stored options record, injecting defaults for
    /// any key still missing, and refreshes the snapshot from the result.
    pub fn patch(&self, patch: serde_json::Value) -> Result<Arc<OptionsSnapshot>, KvError> {
        let patch_handler = |base: &serde_json::Value, patch: &serde_json::Value| {
            let merged = inject_defaults(base.clone());
            crate::kv::merge::merge(&merged, patch)
        };
        let default_entry = serde_json::to_value(Options::default()).expect("Options serializes");
        self.store
            .patch(OPTIONS_KEY, &patch, Some(&patch_handler), None, Some(&default_entry))?;
        self.refresh()?;
        Ok(self.current())
    }

    pub fn current(&self) -> Arc<OptionsSnapshot> {
        self.snapshot.load_full()
    }

    fn apply_log_level(&self, level: &str) {
        let Some(handle) = &self.log_reload else { return };
        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        if handle.reload(filter).is_ok() {
            info!(new_level = level, "applied stored logging_level");
        }
    }

    /// Stand-in for the `@defaults(...)` decorator: returns `value` if set,
    /// else the int-valued option named by `key` from the current snapshot.
    pub fn or_default_i64(&self, value: Option<i64>, key: OptionKey) -> i64 {
        if let Some(v) = value {
            return v;
        }
        let snapshot = self.current();
        match key {
            OptionKey::DefaultPageSize => snapshot.default_page_size,
            OptionKey::DefaultBatcherRetryPolicy => snapshot.default_batcher_retry_policy,
            OptionKey::DefaultPlaybook => {
                unreachable!("default_playbook is string-valued; use or_default_string")
            }
        }
    }

    /// String-valued counterpart of [`Self::or_default_i64`].
    pub fn or_default_string(&self, value: Option<String>, key: OptionKey) -> String {
        if let Some(v) = value {
            return v;
        }
        let snapshot = self.current();
        match key {
            OptionKey::DefaultPlaybook => snapshot.default_playbook.clone(),
            _ => unreachable!("{key:?} is int-valued; use or_default_i64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::backend::InMemoryKvBackend;

    fn cache() -> OptionsCache {
        let store = Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10));
        OptionsCache::new(store, None).unwrap()
    }

    #[test]
    fn refresh_injects_defaults_on_first_access() {
        let cache = cache();
        assert_eq!(cache.current().default_playbook, "site.yml");
        assert_eq!(cache.current().default_page_size, 1000);
    }

    #[test]
    fn stored_overrides_survive_refresh() {
        let store = Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10));
        let cache = OptionsCache::new(store.clone(), None).unwrap();
        store
            .patch(
                "options",
                &serde_json::json!({"default_page_size": 50}),
                None,
                None,
                None,
            )
            .unwrap();
        cache.refresh().unwrap();
        assert_eq!(cache.current().default_page_size, 50);
    }

    #[test]
    fn or_default_prefers_explicit_value() {
        let cache = cache();
        let limit = cache.or_default_i64(Some(7), OptionKey::DefaultPageSize);
        assert_eq!(limit, 7);
        let limit = cache.or_default_i64(None, OptionKey::DefaultPageSize);
        assert_eq!(limit, 1000);
    }
}
