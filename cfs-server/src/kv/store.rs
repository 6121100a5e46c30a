use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use super::backend::{KvBackend, TransactError, Write};
use super::error::KvError;
use super::merge::merge;

/// A filter applied during a scan. Must be a pure function of the record, since
/// filters are re-applied on every retry of a batched mutation.
pub type DataFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub struct Page {
    pub entries: Vec<(String, Value)>,
    pub next_page_exists: bool,
}

pub struct PatchOutcome {
    pub key: String,
    pub entry: Value,
}

/// Typed wrapper over a [`KvBackend`] implementing the optimistic-concurrency
/// primitives spec'd in §4.1: get/put/patch/patch_list/patch_all/delete/
/// delete_all/conditional_delete/get_all/iter_values/get_keys.
pub struct KvStore {
    backend: Arc<dyn KvBackend>,
    busy_budget: Duration,
    batch_size: usize,
}

impl KvStore {
    pub fn new(backend: Arc<dyn KvBackend>, busy_budget_seconds: u64, batch_size: usize) -> Self {
        Self {
            backend,
            busy_budget: Duration::from_secs(busy_budget_seconds),
            batch_size,
        }
    }

    pub fn ping(&self) -> Result<(), KvError> {
        self.backend.ping()
    }

    pub fn get(&self, key: &str) -> Result<Value, KvError> {
        let keys = [key.to_string()];
        let mut entries = self.backend.read_many(&keys)?;
        entries
            .pop()
            .flatten()
            .map(|e| e.value)
            .ok_or_else(|| KvError::NoEntry(key.to_string()))
    }

    pub fn get_delete(&self, key: &str) -> Result<Value, KvError> {
        self.retrying(|| {
            let keys = [key.to_string()];
            let entries = self.backend.read_many(&keys)?;
            let Some(entry) = entries.into_iter().next().flatten() else {
                return Ok(Err(KvError::NoEntry(key.to_string())));
            };
            let expected = [(key.to_string(), Some(entry.version))];
            let writes = vec![Write {
                key: key.to_string(),
                value: None,
            }];
            match self.backend.transact(&expected, writes) {
                Ok(()) => Ok(Ok(entry.value)),
                Err(TransactError::Conflict(_)) => Err(()),
                Err(TransactError::Kv(e)) => Ok(Err(e)),
            }
        })
    }

    pub fn put(&self, key: &str, value: Value) -> Result<Value, KvError> {
        self.retrying(|| {
            let keys = [key.to_string()];
            let current_version = self.backend.read_many(&keys)?.pop().flatten().map(|e| e.version);
            let expected = [(key.to_string(), current_version)];
            let writes = vec![Write {
                key: key.to_string(),
                value: Some(value.clone()),
            }];
            match self.backend.transact(&expected, writes) {
                Ok(()) => Ok(Ok(value.clone())),
                Err(TransactError::Conflict(_)) => Err(()),
                Err(TransactError::Kv(e)) => Ok(Err(e)),
            }
        })
    }

    pub fn put_if_not_set(&self, key: &str, value: Value) -> Result<bool, KvError> {
        self.retrying(|| {
            let keys = [key.to_string()];
            let existing = self.backend.read_many(&keys)?.pop().flatten();
            if existing.is_some() {
                return Ok(Ok(false));
            }
            let expected = [(key.to_string(), None)];
            let writes = vec![Write {
                key: key.to_string(),
                value: Some(value.clone()),
            }];
            match self.backend.transact(&expected, writes) {
                Ok(()) => Ok(Ok(true)),
                Err(TransactError::Conflict(_)) => Err(()),
                Err(TransactError::Kv(e)) => Ok(Err(e)),
            }
        })
    }

    /// Reads `key` (or `default_entry` if absent), applies `patch_handler`
    /// (falling back to the recursive dict merge) then `update_handler`, and
    /// writes back only if the result differs from what was read.
    pub fn patch(
        &self,
        key: &str,
        patch: &Value,
        patch_handler: Option<&dyn Fn(&Value, &Value) -> Value>,
        update_handler: Option<&dyn Fn(Value) -> Value>,
        default_entry: Option<&Value>,
    ) -> Result<Value, KvError> {
        self.retrying(|| {
            let keys = [key.to_string()];
            let read = self.backend.read_many(&keys)?.pop().flatten();
            let (original, expected_version) = match (&read, default_entry) {
                (Some(entry), _) => (entry.value.clone(), Some(entry.version)),
                (None, Some(default)) => (default.clone(), None),
                (None, None) => return Ok(Err(KvError::NoEntry(key.to_string()))),
            };

            let mut next = match patch_handler {
                Some(f) => f(&original, patch),
                None => merge(&original, patch),
            };
            if let Some(f) = update_handler {
                next = f(next);
            }

            if next == original && read.is_some() {
                return Ok(Ok(original));
            }

            let expected = [(key.to_string(), expected_version)];
            let writes = vec![Write {
                key: key.to_string(),
                value: Some(next.clone()),
            }];
            match self.backend.transact(&expected, writes) {
                Ok(()) => Ok(Ok(next)),
                Err(TransactError::Conflict(_)) => Err(()),
                Err(TransactError::Kv(e)) => Ok(Err(e)),
            }
        })
    }

    /// Applies a sequence of (key, patch) tuples as a single transaction over
    /// the set of distinct keys; returns one outcome per input tuple, each
    /// reflecting the entry's value *after that patch in sequence order*.
    pub fn patch_list(&self, patches: &[(String, Value)]) -> Result<Vec<PatchOutcome>, KvError> {
        self.retrying(|| {
            let distinct_keys: Vec<String> = {
                let mut keys: Vec<String> = patches.iter().map(|(k, _)| k.clone()).collect();
                keys.sort();
                keys.dedup();
                keys
            };
            let read = self.backend.read_many(&distinct_keys)?;
            let mut current: std::collections::HashMap<String, Value> =
                std::collections::HashMap::new();
            let mut expected_versions = Vec::with_capacity(distinct_keys.len());
            for (key, entry) in distinct_keys.iter().zip(read.iter()) {
                match entry {
                    Some(e) => {
                        current.insert(key.clone(), e.value.clone());
                        expected_versions.push((key.clone(), Some(e.version)));
                    }
                    None => return Ok(Err(KvError::NoEntry(key.clone()))),
                }
            }

            let originals = current.clone();
            let mut outcomes = Vec::with_capacity(patches.len());
            for (key, patch) in patches {
                let base = current.get(key).cloned().unwrap_or(Value::Null);
                let next = merge(&base, patch);
                current.insert(key.clone(), next.clone());
                outcomes.push(PatchOutcome {
                    key: key.clone(),
                    entry: next,
                });
            }

            let writes: Vec<Write> = distinct_keys
                .iter()
                .filter(|k| current.get(*k) != originals.get(*k))
                .map(|k| Write {
                    key: k.clone(),
                    value: current.get(k).cloned(),
                })
                .collect();

            if writes.is_empty() {
                return Ok(Ok(outcomes));
            }

            match self.backend.transact(&expected_versions, writes) {
                Ok(()) => Ok(Ok(outcomes)),
                Err(TransactError::Conflict(_)) => Err(()),
                Err(TransactError::Kv(e)) => Ok(Err(e)),
            }
        })
    }

    /// Scans all keys in sorted-order batches; per batch, reads, filters,
    /// patches, and writes back in a single transactional mset. A batch that
    /// sees concurrent change retries that batch. Returns the keys that were
    /// classified (patched or already filtered out).
    pub fn patch_all(
        &self,
        filter: &DataFilter,
        patch: &Value,
        update_handler: Option<&dyn Fn(Value) -> Value>,
    ) -> Result<Vec<String>, KvError> {
        let deadline = Instant::now() + self.busy_budget;
        let mut all_keys = self.backend.all_keys()?;
        all_keys.sort();

        let mut classified = Vec::new();
        for batch in all_keys.chunks(self.batch_size) {
            loop {
                if Instant::now() > deadline {
                    return Err(KvError::TooBusy(self.busy_budget.as_secs()));
                }
                match self.patch_batch(batch, filter, patch, update_handler) {
                    Ok(keys) => {
                        classified.extend(keys);
                        break;
                    }
                    Err(()) => {
                        warn!("patch_all batch retry after watch conflict");
                        continue;
                    }
                }
            }
        }
        Ok(classified)
    }

    fn patch_batch(
        &self,
        batch: &[String],
        filter: &DataFilter,
        patch: &Value,
        update_handler: Option<&dyn Fn(Value) -> Value>,
    ) -> Result<Vec<String>, ()> {
        let batch_vec = batch.to_vec();
        let entries = self.backend.read_many(&batch_vec).map_err(|_| ())?;

        let mut expected = Vec::new();
        let mut writes = Vec::new();
        let mut classified = Vec::new();

        for (key, entry) in batch_vec.iter().zip(entries.iter()) {
            let Some(entry) = entry else { continue };
            if !filter(&entry.value) {
                continue;
            }
            let mut next = merge(&entry.value, patch);
            if let Some(f) = update_handler {
                next = f(next);
            }
            classified.push(key.clone());
            if next != entry.value {
                expected.push((key.clone(), Some(entry.version)));
                writes.push(Write {
                    key: key.clone(),
                    value: Some(next),
                });
            }
        }

        if writes.is_empty() {
            return Ok(classified);
        }

        match self.backend.transact(&expected, writes) {
            Ok(()) => Ok(classified),
            Err(TransactError::Conflict(_)) => Err(()),
            Err(TransactError::Kv(_)) => Err(()),
        }
    }

    pub fn delete(&self, key: &str) -> Result<(), KvError> {
        self.retrying(|| {
            let keys = [key.to_string()];
            let entry = self.backend.read_many(&keys)?.pop().flatten();
            let Some(entry) = entry else {
                return Ok(Err(KvError::NoEntry(key.to_string())));
            };
            let expected = [(key.to_string(), Some(entry.version))];
            let writes = vec![Write {
                key: key.to_string(),
                value: None,
            }];
            match self.backend.transact(&expected, writes) {
                Ok(()) => Ok(Ok(())),
                Err(TransactError::Conflict(_)) => Err(()),
                Err(TransactError::Kv(e)) => Ok(Err(e)),
            }
        })
    }

    pub fn delete_all(&self, filter: &DataFilter) -> Result<Vec<String>, KvError> {
        let deadline = Instant::now() + self.busy_budget;
        let mut all_keys = self.backend.all_keys()?;
        all_keys.sort();

        let mut deleted = Vec::new();
        for batch in all_keys.chunks(self.batch_size) {
            loop {
                if Instant::now() > deadline {
                    return Err(KvError::TooBusy(self.busy_budget.as_secs()));
                }
                match self.delete_batch(batch, filter) {
                    Ok(keys) => {
                        deleted.extend(keys);
                        break;
                    }
                    Err(()) => continue,
                }
            }
        }
        Ok(deleted)
    }

    fn delete_batch(&self, batch: &[String], filter: &DataFilter) -> Result<Vec<String>, ()> {
        let batch_vec = batch.to_vec();
        let entries = self.backend.read_many(&batch_vec).map_err(|_| ())?;

        let mut expected = Vec::new();
        let mut writes = Vec::new();
        let mut deleted = Vec::new();

        for (key, entry) in batch_vec.iter().zip(entries.iter()) {
            let Some(entry) = entry else { continue };
            if !filter(&entry.value) {
                continue;
            }
            deleted.push(key.clone());
            expected.push((key.clone(), Some(entry.version)));
            writes.push(Write {
                key: key.clone(),
                value: None,
            });
        }

        if writes.is_empty() {
            return Ok(deleted);
        }

        match self.backend.transact(&expected, writes) {
            Ok(()) => Ok(deleted),
            Err(TransactError::Conflict(_)) => Err(()),
            Err(TransactError::Kv(_)) => Err(()),
        }
    }

    pub fn conditional_delete(
        &self,
        key: &str,
        checker: &dyn Fn(&Value) -> bool,
    ) -> Result<bool, KvError> {
        self.retrying(|| {
            let keys = [key.to_string()];
            let entry = self.backend.read_many(&keys)?.pop().flatten();
            let Some(entry) = entry else {
                return Ok(Err(KvError::NoEntry(key.to_string())));
            };
            if !checker(&entry.value) {
                return Ok(Ok(false));
            }
            let expected = [(key.to_string(), Some(entry.version))];
            let writes = vec![Write {
                key: key.to_string(),
                value: None,
            }];
            match self.backend.transact(&expected, writes) {
                Ok(()) => Ok(Ok(true)),
                Err(TransactError::Conflict(_)) => Err(()),
                Err(TransactError::Kv(e)) => Ok(Err(e)),
            }
        })
    }

    pub fn get_all(
        &self,
        limit: usize,
        after_id: Option<&str>,
        data_filters: &[DataFilter],
    ) -> Result<Page, KvError> {
        let mut keys = self.backend.all_keys()?;
        keys.sort();
        if let Some(after) = after_id {
            keys.retain(|k| k.as_str() > after);
        }

        let mut entries = Vec::new();
        let mut next_page_exists = false;

        'scan: for batch in keys.chunks(self.batch_size) {
            let batch_vec = batch.to_vec();
            let read = self.backend.read_many(&batch_vec)?;
            for (key, entry) in batch_vec.into_iter().zip(read.into_iter()) {
                let Some(entry) = entry else { continue };
                if !data_filters.iter().all(|f| f(&entry.value)) {
                    continue;
                }
                if entries.len() >= limit {
                    // Found a matching entry beyond the page; no need to keep
                    // scanning just to confirm existence.
                    next_page_exists = true;
                    break 'scan;
                }
                entries.push((key, entry.value));
            }
        }

        Ok(Page {
            entries,
            next_page_exists,
        })
    }

    pub fn iter_values(&self, start_after_key: Option<&str>) -> Result<Vec<(String, Value)>, KvError> {
        let page = self.get_all(usize::MAX, start_after_key, &[])?;
        Ok(page.entries)
    }

    pub fn get_keys(&self, start_after_key: Option<&str>) -> Result<Vec<String>, KvError> {
        let mut keys = self.backend.all_keys()?;
        keys.sort();
        keys.dedup();
        if let Some(after) = start_after_key {
            keys.retain(|k| k.as_str() > after);
        }
        Ok(keys)
    }

    /// Runs `attempt` until it returns `Ok(result)` (propagated verbatim) or
    /// the retry budget is exhausted, retrying on `Err(())` — the watch-
    /// conflict sentinel every mutator above maps its backend conflicts to.
    fn retrying<T>(&self, mut attempt: impl FnMut() -> Result<Result<T, KvError>, ()>) -> Result<T, KvError> {
        let deadline = Instant::now() + self.busy_budget;
        loop {
            match attempt() {
                Ok(result) => return result,
                Err(()) => {
                    if Instant::now() > deadline {
                        return Err(KvError::TooBusy(self.busy_budget.as_secs()));
                    }
                    debug!("retrying after watch conflict");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::backend::InMemoryKvBackend;
    use serde_json::json;

    fn store() -> KvStore {
        KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10)
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = store();
        store.put("k1", json!({"a": 1})).unwrap();
        assert_eq!(store.get("k1").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn get_missing_key_is_no_entry() {
        let store = store();
        assert!(matches!(store.get("missing"), Err(KvError::NoEntry(_))));
    }

    #[test]
    fn patch_merges_and_is_idempotent_on_empty_patch() {
        let store = store();
        store.put("k1", json!({"a": 1, "b": 2})).unwrap();
        let patched = store.patch("k1", &json!({"b": 3}), None, None, None).unwrap();
        assert_eq!(patched, json!({"a": 1, "b": 3}));

        let unchanged = store.patch("k1", &json!({}), None, None, None).unwrap();
        assert_eq!(unchanged, json!({"a": 1, "b": 3}));
    }

    #[test]
    fn patch_missing_key_without_default_fails() {
        let store = store();
        assert!(matches!(
            store.patch("missing", &json!({}), None, None, None),
            Err(KvError::NoEntry(_))
        ));
    }

    #[test]
    fn patch_missing_key_with_default_entry_succeeds() {
        let store = store();
        let result = store
            .patch("k1", &json!({"a": 1}), None, None, Some(&json!({})))
            .unwrap();
        assert_eq!(result, json!({"a": 1}));
    }

    #[test]
    fn put_if_not_set_only_writes_once() {
        let store = store();
        assert!(store.put_if_not_set("k1", json!(1)).unwrap());
        assert!(!store.put_if_not_set("k1", json!(2)).unwrap());
        assert_eq!(store.get("k1").unwrap(), json!(1));
    }

    #[test]
    fn conditional_delete_respects_checker() {
        let store = store();
        store.put("k1", json!({"locked": true})).unwrap();
        let deleted = store
            .conditional_delete("k1", &|v| v["locked"] == json!(false))
            .unwrap();
        assert!(!deleted);
        assert!(store.get("k1").is_ok());

        let deleted = store
            .conditional_delete("k1", &|v| v["locked"] == json!(true))
            .unwrap();
        assert!(deleted);
        assert!(store.get("k1").is_err());
    }

    #[test]
    fn get_delete_removes_and_returns() {
        let store = store();
        store.put("k1", json!({"a": 1})).unwrap();
        let value = store.get_delete("k1").unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert!(store.get("k1").is_err());
    }

    #[test]
    fn get_all_paginates_and_reports_next_page() {
        let store = store();
        store.put("a", json!(1)).unwrap();
        store.put("b", json!(2)).unwrap();

        let page1 = store.get_all(1, None, &[]).unwrap();
        assert_eq!(page1.entries.len(), 1);
        assert_eq!(page1.entries[0].0, "a");
        assert!(page1.next_page_exists);

        let page2 = store.get_all(1, Some("a"), &[]).unwrap();
        assert_eq!(page2.entries.len(), 1);
        assert_eq!(page2.entries[0].0, "b");
        assert!(!page2.next_page_exists);
    }

    #[test]
    fn get_all_applies_filters_during_scan() {
        let store = store();
        store.put("a", json!({"enabled": true})).unwrap();
        store.put("b", json!({"enabled": false})).unwrap();

        let filter: DataFilter = Arc::new(|v: &Value| v["enabled"] == json!(true));
        let page = store.get_all(10, None, &[filter]).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].0, "a");
    }

    #[test]
    fn get_all_keeps_scanning_batches_to_confirm_next_page() {
        // batch_size=1, limit=1: "a" matches, "b" doesn't and is last. The
        // pre-fix code flagged next_page_exists as soon as one more raw key
        // existed, without checking whether "b" actually matched.
        let store = KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 1);
        store.put("a", json!({"enabled": true})).unwrap();
        store.put("b", json!({"enabled": false})).unwrap();

        let filter: DataFilter = Arc::new(|v: &Value| v["enabled"] == json!(true));
        let page = store.get_all(1, None, &[filter]).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].0, "a");
        assert!(!page.next_page_exists);
    }

    #[test]
    fn patch_all_only_touches_filtered_keys() {
        let store = store();
        store.put("a", json!({"enabled": true, "n": 1})).unwrap();
        store.put("b", json!({"enabled": false, "n": 1})).unwrap();

        let filter: DataFilter = Arc::new(|v: &Value| v["enabled"] == json!(true));
        let classified = store.patch_all(&filter, &json!({"n": 2}), None).unwrap();
        assert_eq!(classified, vec!["a".to_string()]);
        assert_eq!(store.get("a").unwrap()["n"], json!(2));
        assert_eq!(store.get("b").unwrap()["n"], json!(1));
    }

    #[test]
    fn patch_list_applies_in_sequence_and_skips_unchanged_keys() {
        let store = store();
        store.put("a", json!({"n": 1})).unwrap();
        store.put("b", json!({"n": 1})).unwrap();

        let outcomes = store
            .patch_list(&[
                ("a".to_string(), json!({"n": 2})),
                ("b".to_string(), json!({})),
            ])
            .unwrap();
        assert_eq!(outcomes[0].entry, json!({"n": 2}));
        assert_eq!(outcomes[1].entry, json!({"n": 1}));
        assert_eq!(store.get("a").unwrap()["n"], json!(2));
    }

    #[test]
    fn delete_all_respects_filter() {
        let store = store();
        store.put("a", json!({"keep": false})).unwrap();
        store.put("b", json!({"keep": true})).unwrap();

        let filter: DataFilter = Arc::new(|v: &Value| v["keep"] == json!(false));
        let deleted = store.delete_all(&filter).unwrap();
        assert_eq!(deleted, vec!["a".to_string()]);
        assert!(store.get("a").is_err());
        assert!(store.get("b").is_ok());
    }
}
