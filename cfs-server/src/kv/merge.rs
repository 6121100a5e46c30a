use serde_json::Value;

/// Pure, copy-on-write recursive dict merge. Objects merge key-by-key;
/// lists and scalars are replaced wholesale by the patch value.
pub fn merge(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in patch_map {
                let next = match merged.get(k) {
                    Some(existing) => merge(existing, v),
                    None => v.clone(),
                };
                merged.insert(k.clone(), next);
            }
            Value::Object(merged)
        }
        (_, patch) => patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_objects_merge_recursively() {
        let base = json!({"a": {"x": 1, "y": 2}, "b": 5});
        let patch = json!({"a": {"y": 99}});
        assert_eq!(merge(&base, &patch), json!({"a": {"x": 1, "y": 99}, "b": 5}));
    }

    #[test]
    fn lists_replace_wholesale() {
        let base = json!({"a": [1, 2, 3]});
        let patch = json!({"a": [9]});
        assert_eq!(merge(&base, &patch), json!({"a": [9]}));
    }

    #[test]
    fn empty_patch_is_identity() {
        let base = json!({"a": 1, "b": {"c": 2}});
        assert_eq!(merge(&base, &json!({})), base);
    }
}
