use serde_json::{Map, Value};

use super::descriptor::{Direction, FieldDescriptor, FieldKind};

/// Generic walker over (list, map, object, scalar) driven entirely by the
/// descriptor table — per Design Notes §9, there are no hand-rolled
/// per-field converters anywhere in this module.
pub fn translate(value: &Value, fields: &'static [FieldDescriptor], direction: Direction) -> Value {
    let Value::Object(obj) = value else {
        return value.clone();
    };

    let mut out = Map::new();
    for field in fields {
        let (from_name, to_name) = match direction {
            Direction::V3ToV2 => (field.v3, field.v2),
            Direction::V2ToV3 => (field.v2, field.v3),
        };
        let Some(raw) = obj.get(from_name) else {
            continue;
        };
        let translated = match field.kind {
            FieldKind::Scalar => raw.clone(),
            FieldKind::Object(nested) => translate(raw, nested, direction),
            FieldKind::List(nested) => match raw {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| translate(item, nested, direction))
                        .collect(),
                ),
                other => other.clone(),
            },
        };
        out.insert(to_name.to_string(), translated);
    }
    Value::Object(out)
}

/// True if `value` still carries any v2-only (camelCase) key, at this level
/// or nested under an object/list field — the trigger MigrationPass uses to
/// decide a record needs a read-convert-write-back pass.
pub fn has_legacy_markers(value: &Value, fields: &'static [FieldDescriptor]) -> bool {
    let Value::Object(obj) = value else {
        return false;
    };
    for field in fields {
        if field.v2 != field.v3 && obj.contains_key(field.v2) {
            return true;
        }
        let Some(nested) = obj.get(field.v3).or_else(|| obj.get(field.v2)) else {
            continue;
        };
        let found = match field.kind {
            FieldKind::Scalar => false,
            FieldKind::Object(nested_fields) => has_legacy_markers(nested, nested_fields),
            FieldKind::List(nested_fields) => match nested {
                Value::Array(items) => items.iter().any(|item| has_legacy_markers(item, nested_fields)),
                _ => false,
            },
        };
        if found {
            return true;
        }
    }
    false
}

/// Component-specific pre/post pass for the layer-status flattening rule:
/// v2 bakes a non-`applied` status into the commit string
/// (`"<commit>_<status>"`); v3 carries `status` as an explicit field.
pub fn flatten_component_status_for_v2(state_entry: &mut Value) {
    let Value::Object(obj) = state_entry else { return };
    let Some(Value::String(status)) = obj.remove("status") else {
        return;
    };
    if status == "applied" {
        return;
    }
    if let Some(Value::String(commit)) = obj.get_mut("commit") {
        *commit = format!("{commit}_{status}");
    }
}

pub fn unflatten_component_status_from_v2(state_entry: &mut Value) {
    let Value::Object(obj) = state_entry else { return };
    let Some(Value::String(commit)) = obj.get("commit").cloned() else {
        return;
    };
    if let Some((base, status)) = commit.rsplit_once('_') {
        if matches!(status, "failed" | "incomplete" | "pending") {
            obj.insert("commit".to_string(), Value::String(base.to_string()));
            obj.insert("status".to_string(), Value::String(status.to_string()));
            return;
        }
    }
    obj.insert("status".to_string(), Value::String("applied".to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::{COMPONENT_LAYER_FIELDS, CONFIGURATION_FIELDS};
    use serde_json::json;

    #[test]
    fn v3_to_v2_renames_nested_layer_fields() {
        let v3 = json!({
            "name": "c1",
            "layers": [{"clone_url": "u1", "playbook": "site.yml", "branch": null, "commit": "C1"}],
        });
        let v2 = translate(&v3, CONFIGURATION_FIELDS, Direction::V3ToV2);
        assert_eq!(v2["layers"][0]["cloneUrl"], json!("u1"));
        assert_eq!(v2["layers"][0]["commit"], json!("C1"));
    }

    #[test]
    fn round_trip_v3_v2_v3_is_identity_for_known_fields() {
        let v3 = json!({
            "name": "c1",
            "layers": [{"clone_url": "u1", "playbook": "site.yml", "commit": "C1"}],
            "last_updated": "2026-01-01T00:00:00Z",
        });
        let v2 = translate(&v3, CONFIGURATION_FIELDS, Direction::V3ToV2);
        let back = translate(&v2, CONFIGURATION_FIELDS, Direction::V2ToV3);
        assert_eq!(back, v3);
    }

    #[test]
    fn flatten_bakes_non_applied_status_into_commit() {
        let mut entry = json!({"clone_url": "u1", "playbook": "site.yml", "commit": "C1", "status": "failed"});
        flatten_component_status_for_v2(&mut entry);
        assert_eq!(entry["commit"], json!("C1_failed"));
        assert!(entry.get("status").is_none());
    }

    #[test]
    fn flatten_leaves_applied_commit_untouched() {
        let mut entry = json!({"clone_url": "u1", "playbook": "site.yml", "commit": "C1", "status": "applied"});
        flatten_component_status_for_v2(&mut entry);
        assert_eq!(entry["commit"], json!("C1"));
    }

    #[test]
    fn unflatten_splits_suffix_back_into_status() {
        let mut entry = json!({"clone_url": "u1", "playbook": "site.yml", "commit": "C1_failed"});
        unflatten_component_status_from_v2(&mut entry);
        assert_eq!(entry["commit"], json!("C1"));
        assert_eq!(entry["status"], json!("failed"));
    }

    #[test]
    fn unflatten_assumes_applied_when_no_suffix() {
        let mut entry = json!({"clone_url": "u1", "playbook": "site.yml", "commit": "C1"});
        unflatten_component_status_from_v2(&mut entry);
        assert_eq!(entry["status"], json!("applied"));
    }

    #[test]
    fn legacy_markers_detected_in_nested_layer() {
        let v2 = json!({"name": "c1", "layers": [{"cloneUrl": "u1", "playbook": "site.yml"}]});
        assert!(has_legacy_markers(&v2, CONFIGURATION_FIELDS));

        let v3 = json!({"name": "c1", "layers": [{"clone_url": "u1", "playbook": "site.yml"}]});
        assert!(!has_legacy_markers(&v3, CONFIGURATION_FIELDS));
    }

    #[test]
    fn layer_fields_constant_is_reachable_for_object_translation() {
        let v3 = json!({"clone_url": "u1", "playbook": "site.yml", "commit": "C1"});
        let v2 = translate(&v3, COMPONENT_LAYER_FIELDS, Direction::V3ToV2);
        assert_eq!(v2["cloneUrl"], json!("u1"));
    }
}
