use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use super::error::SessionError;
use super::filters::SessionFilters;
use crate::event::{EventBus, EventKind};
use crate::kv::{DataFilter, KvStore};
use crate::model::now_stamp;
use crate::model::session::{AnsibleOptions, Session, SessionStatusValue, Succeeded, Target, TargetGroup};

pub struct SessionFSM {
    store: Arc<KvStore>,
    event_bus: Arc<EventBus>,
}

impl SessionFSM {
    pub fn new(store: Arc<KvStore>, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }

    /// Validates name uniqueness, configuration existence (skipped for v3
    /// `debug_`-prefixed sessions), target shape, and ansible_passthrough;
    /// initializes status and emits a `CREATE` event before persisting,
    /// per spec.md §4.6.
    pub fn create(
        &self,
        mut session: Session,
        configuration_exists: impl Fn(&str) -> bool,
        is_v3: bool,
        default_ansible_config: &str,
    ) -> Result<Session, SessionError> {
        let key = session.name.clone();
        if self.store.get(&key).is_ok() {
            return Err(SessionError::NameConflict(key));
        }

        if let Some(config) = &session.configuration {
            let is_debug = is_v3 && session.name.starts_with("debug_");
            if !is_debug && !configuration_exists(&config.name) {
                return Err(SessionError::UnknownConfiguration(config.name.clone()));
            }
        }

        if let Some(target) = &session.target {
            validate_target(target)?;
        }

        if let Some(ansible) = &mut session.ansible {
            if ansible.config.is_none() {
                ansible.config = Some(default_ansible_config.to_string());
            }
        } else {
            session.ansible = Some(AnsibleOptions {
                config: Some(default_ansible_config.to_string()),
                ..Default::default()
            });
        }

        session.status.session.status = SessionStatusValue::Pending;
        session.status.session.succeeded = Succeeded::None;
        session.status.session.start_time = Some(now_stamp());
        session.status.artifacts.clear();

        self.event_bus.produce(
            EventKind::Create,
            serde_json::to_value(&session).unwrap_or(Value::Null),
        );

        let value = serde_json::to_value(&session)?;
        self.store.put(&key, value)?;
        Ok(session)
    }

    /// Only `status` may be modified after creation. Artifacts merge
    /// set-like by exact object equality; `status` and `succeeded` progress
    /// only along their fixed orderings, other status fields are replaced.
    pub fn patch_status(&self, name: &str, status_patch: Value) -> Result<Session, SessionError> {
        let patch = json!({ "status": status_patch });
        let patch_handler = |base: &Value, patch: &Value| merge_status_patch(base, patch);
        let updated = self
            .store
            .patch(name, &patch, Some(&patch_handler), None, None)
            .map_err(|e| match e {
                crate::kv::KvError::NoEntry(_) => SessionError::NotFound(name.to_string()),
                other => SessionError::Kv(other),
            })?;
        Ok(serde_json::from_value(updated)?)
    }

    pub fn get(&self, name: &str) -> Result<Session, SessionError> {
        let raw = self.store.get(name).map_err(|e| match e {
            crate::kv::KvError::NoEntry(_) => SessionError::NotFound(name.to_string()),
            other => SessionError::Kv(other),
        })?;
        Ok(serde_json::from_value(raw)?)
    }

    pub fn delete(&self, name: &str) -> Result<Session, SessionError> {
        let value = self
            .store
            .get_delete(name)
            .map_err(|e| match e {
                crate::kv::KvError::NoEntry(_) => SessionError::NotFound(name.to_string()),
                other => SessionError::Kv(other),
            })?;
        let session: Session = serde_json::from_value(value)?;
        self.event_bus.produce(
            EventKind::Delete,
            serde_json::to_value(&session).unwrap_or(Value::Null),
        );
        Ok(session)
    }

    pub fn list(&self, filters: &SessionFilters, limit: usize, after_id: Option<&str>) -> Result<Vec<Session>, SessionError> {
        let now = Utc::now();
        let filters_owned = filters.clone();
        let filter: DataFilter = Arc::new(move |v: &Value| {
            serde_json::from_value::<Session>(v.clone())
                .ok()
                .map(|s| filters_owned.matches(&s, now).unwrap_or(false))
                .unwrap_or(false)
        });
        let page = self.store.get_all(limit, after_id, &[filter])?;
        page.entries
            .into_iter()
            .map(|(_, v)| Ok(serde_json::from_value(v)?))
            .collect()
    }

    pub fn bulk_delete(&self, filters: &SessionFilters) -> Result<Vec<String>, SessionError> {
        let now = Utc::now();
        let filters_owned = filters.clone();
        let filter: DataFilter = Arc::new(move |v: &Value| {
            serde_json::from_value::<Session>(v.clone())
                .ok()
                .map(|s| filters_owned.matches(&s, now).unwrap_or(false))
                .unwrap_or(false)
        });
        Ok(self.store.delete_all(&filter)?)
    }
}

fn validate_target(target: &Target) -> Result<(), SessionError> {
    match target {
        Target::Repo | Target::Dynamic => Ok(()),
        Target::Spec { groups } | Target::Image { groups } => {
            if groups.is_empty() {
                return Err(SessionError::InvalidTarget("groups must be non-empty".into()));
            }
            for group in groups {
                validate_group(group, matches!(target, Target::Image { .. }))?;
            }
            Ok(())
        }
    }
}

fn validate_group(group: &TargetGroup, is_image: bool) -> Result<(), SessionError> {
    if group.members.is_empty() {
        return Err(SessionError::InvalidTarget(format!(
            "group `{}` must have non-empty members",
            group.name
        )));
    }
    for member in &group.members {
        if member.trim().is_empty() {
            return Err(SessionError::InvalidTarget("blank member name".into()));
        }
        if is_image && uuid::Uuid::parse_str(member).is_err() {
            return Err(SessionError::InvalidTarget(format!(
                "image target member `{member}` is not a UUIDv4"
            )));
        }
    }
    Ok(())
}

/// Merges a `{"status": {...}}` patch honoring the monotonic scalar
/// orderings for `status` and `succeeded`, the set-like artifact merge, and
/// wholesale replacement for every other `status.session` field.
fn merge_status_patch(base: &Value, patch: &Value) -> Value {
    let mut base = base.clone();
    let Some(patch_status) = patch.get("status") else {
        return base;
    };

    let session_patch = patch_status.get("session");
    if let Some(session_patch) = session_patch {
        let base_session = base
            .get_mut("status")
            .and_then(|s| s.get_mut("session"))
            .expect("session records always carry status.session");

        if let Some(new_status) = session_patch.get("status").and_then(|v| v.as_str()) {
            if let Some(current) = base_session.get("status").and_then(|v| v.as_str()) {
                if rank_status(new_status) > rank_status(current) {
                    base_session["status"] = Value::String(new_status.to_string());
                }
            } else {
                base_session["status"] = Value::String(new_status.to_string());
            }
        }

        if let Some(new_succeeded) = session_patch.get("succeeded").and_then(|v| v.as_str()) {
            if let Some(current) = base_session.get("succeeded").and_then(|v| v.as_str()) {
                if rank_succeeded(new_succeeded) > rank_succeeded(current) {
                    base_session["succeeded"] = Value::String(new_succeeded.to_string());
                }
            } else {
                base_session["succeeded"] = Value::String(new_succeeded.to_string());
            }
        }

        if let Value::Object(obj) = session_patch {
            for (k, v) in obj {
                if k == "status" || k == "succeeded" {
                    continue;
                }
                if !v.is_null() {
                    base_session[k.as_str()] = v.clone();
                }
            }
        }
    }

    if let Some(new_artifacts) = patch_status.get("artifacts").and_then(|v| v.as_array()) {
        let existing = base["status"]["artifacts"].as_array().cloned().unwrap_or_default();
        let mut merged = existing;
        for artifact in new_artifacts {
            if !merged.contains(artifact) {
                merged.push(artifact.clone());
            }
        }
        base["status"]["artifacts"] = Value::Array(merged);
    }

    base
}

fn rank_status(s: &str) -> u8 {
    match s {
        "pending" => 0,
        "running" => 1,
        "complete" => 2,
        _ => 0,
    }
}

fn rank_succeeded(s: &str) -> u8 {
    match s {
        "none" => 0,
        "unknown" => 1,
        "false" => 2,
        "true" => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InMemoryEventTransport;
    use crate::kv::backend::InMemoryKvBackend;

    fn fsm() -> SessionFSM {
        let store = Arc::new(KvStore::new(Arc::new(InMemoryKvBackend::new()), 5, 10));
        let bus = Arc::new(EventBus::new(Arc::new(InMemoryEventTransport::new())));
        SessionFSM::new(store, bus)
    }

    #[test]
    fn create_rejects_duplicate_name() {
        let fsm = fsm();
        let session = Session {
            name: "s1".into(),
            ..Default::default()
        };
        fsm.create(session.clone(), |_| true, true, "cfg").unwrap();
        let err = fsm.create(session, |_| true, true, "cfg").unwrap_err();
        assert!(matches!(err, SessionError::NameConflict(_)));
    }

    #[test]
    fn status_monotonicity_discards_regression() {
        let fsm = fsm();
        fsm.create(
            Session {
                name: "s1".into(),
                ..Default::default()
            },
            |_| true,
            true,
            "cfg",
        )
        .unwrap();

        fsm.patch_status("s1", json!({"session": {"status": "complete"}}))
            .unwrap();
        let after = fsm
            .patch_status("s1", json!({"session": {"status": "running"}}))
            .unwrap();
        assert_eq!(after.status.session.status, SessionStatusValue::Complete);
    }

    #[test]
    fn ansible_passthrough_rejects_unknown_flag_at_deserialization() {
        let err = serde_json::from_value::<AnsibleOptions>(json!({"passthrough": {"unknown-flag": "x"}}))
            .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn image_target_requires_uuid_members() {
        let target = Target::Image {
            groups: vec![TargetGroup {
                name: "g1".into(),
                members: vec!["not-a-uuid".into()],
            }],
        };
        assert!(validate_target(&target).is_err());
    }

    #[test]
    fn delete_emits_event_and_removes_entry() {
        let fsm = fsm();
        fsm.create(
            Session {
                name: "s1".into(),
                ..Default::default()
            },
            |_| true,
            true,
            "cfg",
        )
        .unwrap();
        fsm.delete("s1").unwrap();
        assert!(matches!(fsm.delete("s1"), Err(SessionError::NotFound(_))));
    }
}
