use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::kv::{KvError, KvStore};
use crate::model::options::Options;
use crate::schema::descriptor::{CONFIGURATION_FIELDS, COMPONENT_FIELDS};
use crate::schema::{has_legacy_markers, translate, Direction};

const OPTIONS_KEY: &str = "options";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub options_rewritten: bool,
    pub components_rewritten: usize,
    pub configurations_rewritten: usize,
    pub sessions_rewritten: usize,
}

/// One-shot startup pass rewriting legacy camelCase records to the current
/// snake_case schema and dropping unknown option keys, per spec.md §4.12.
/// Idempotent: a record already in the current shape is left untouched.
pub struct MigrationPass {
    options: Arc<KvStore>,
    components: Arc<KvStore>,
    configurations: Arc<KvStore>,
    sessions: Arc<KvStore>,
}

impl MigrationPass {
    pub fn new(
        options: Arc<KvStore>,
        components: Arc<KvStore>,
        configurations: Arc<KvStore>,
        sessions: Arc<KvStore>,
    ) -> Self {
        Self {
            options,
            components,
            configurations,
            sessions,
        }
    }

    pub fn run(&self) -> Result<MigrationReport, KvError> {
        let options_rewritten = self.migrate_options()?;
        let components_rewritten = self.migrate_keyspace(&self.components, COMPONENT_FIELDS)?;
        let configurations_rewritten = self.migrate_keyspace(&self.configurations, CONFIGURATION_FIELDS)?;
        // Sessions have never had a camelCase wire dialect; scanned anyway so
        // a future legacy field doesn't silently skip migration.
        let sessions_rewritten = self.migrate_keyspace(&self.sessions, &[])?;

        info!(
            options_rewritten,
            components_rewritten, configurations_rewritten, sessions_rewritten, "migration pass complete"
        );
        Ok(MigrationReport {
            options_rewritten,
            components_rewritten,
            configurations_rewritten,
            sessions_rewritten,
        })
    }

    fn migrate_keyspace(
        &self,
        store: &Arc<KvStore>,
        fields: &'static [crate::schema::FieldDescriptor],
    ) -> Result<usize, KvError> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut rewritten = 0;
        for (key, value) in store.iter_values(None)? {
            if !has_legacy_markers(&value, fields) {
                continue;
            }
            let converted = translate(&value, fields, Direction::V2ToV3);
            store.put(&key, converted)?;
            rewritten += 1;
        }
        Ok(rewritten)
    }

    /// Options is a singleton record, not a keyspace, and additionally needs
    /// unknown keys purged — a rule with no counterpart for the other
    /// collections, which keep whatever extra fields callers send.
    fn migrate_options(&self) -> Result<bool, KvError> {
        let raw = match self.options.get(OPTIONS_KEY) {
            Ok(value) => value,
            Err(KvError::NoEntry(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let converted = if has_legacy_markers(&raw, crate::schema::descriptor::OPTIONS_FIELDS) {
            translate(&raw, crate::schema::descriptor::OPTIONS_FIELDS, Direction::V2ToV3)
        } else {
            raw.clone()
        };

        let pruned = prune_unknown_keys(&converted);
        if pruned == raw {
            return Ok(false);
        }
        self.options.put(OPTIONS_KEY, pruned)?;
        Ok(true)
    }
}

fn prune_unknown_keys(value: &Value) -> Value {
    let Value::Object(obj) = value else {
        return value.clone();
    };
    let allowed = serde_json::to_value(Options::default())
        .expect("Options always serializes")
        .as_object()
        .expect("Options serializes to an object")
        .keys()
        .cloned()
        .collect::<std::collections::HashSet<_>>();
    let pruned = obj
        .iter()
        .filter(|(k, _)| allowed.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::backend::InMemoryKvBackend;
    use serde_json::json;

    fn stores() -> (Arc<KvStore>, Arc<KvStore>, Arc<KvStore>, Arc<KvStore>) {
        (
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
            Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)),
        )
    }

    #[test]
    fn rewrites_legacy_configuration_and_purges_unknown_option_keys() {
        let (options, components, configurations, sessions) = stores();
        options
            .put(
                OPTIONS_KEY,
                json!({"defaultPlaybook": "other.yml", "someRemovedOption": "gone"}),
            )
            .unwrap();
        configurations
            .put(
                "c1",
                json!({"name": "c1", "layers": [{"cloneUrl": "u1", "playbook": "site.yml"}]}),
            )
            .unwrap();

        let pass = MigrationPass::new(options.clone(), components, configurations.clone(), sessions);
        let report = pass.run().unwrap();

        assert!(report.options_rewritten);
        assert_eq!(report.configurations_rewritten, 1);
        let migrated_options = options.get(OPTIONS_KEY).unwrap();
        assert_eq!(migrated_options["default_playbook"], json!("other.yml"));
        assert!(migrated_options.get("someRemovedOption").is_none());
        assert!(migrated_options.get("defaultPlaybook").is_none());

        let migrated_config = configurations.get("c1").unwrap();
        assert_eq!(migrated_config["layers"][0]["clone_url"], json!("u1"));
    }

    #[test]
    fn idempotent_on_already_migrated_records() {
        let (options, components, configurations, sessions) = stores();
        configurations
            .put("c1", json!({"name": "c1", "layers": [{"clone_url": "u1", "playbook": "site.yml"}]}))
            .unwrap();

        let pass = MigrationPass::new(options, components, configurations, sessions);
        let first = pass.run().unwrap();
        let second = pass.run().unwrap();
        assert_eq!(first.configurations_rewritten, 1);
        assert_eq!(second.configurations_rewritten, 0);
    }

    #[test]
    fn missing_options_record_is_a_no_op() {
        let (options, components, configurations, sessions) = stores();
        let pass = MigrationPass::new(options, components, configurations, sessions);
        let report = pass.run().unwrap();
        assert!(!report.options_rewritten);
    }
}
