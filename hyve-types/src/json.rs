//! A deep-mutation-tracked JSON container.
//!
//! The original service keeps its `info`/`data` columns as ORM-mapped JSON
//! blobs that are mutated in place and flushed when dirty. The equivalent
//! here: clone, mutate the clone, compare by deep equality against the
//! original, and only report a change (so callers only write back, and
//! only produce history rows, when something actually moved).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque JSON payload with helpers for the "compare-then-write" pattern
/// used throughout the ingestion pipeline (`Address.info`, `User.info`,
/// `UserAddr.info`/`data`, `Event.data`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct JsonPatch(pub Value);

impl JsonPatch {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn null() -> Self {
        Self(Value::Null)
    }

    /// Returns a clone of `self` with `patch` applied, leaving `self`
    /// untouched. `overwrite = true` replaces the value wholesale;
    /// `overwrite = false` shallow-merges object keys from `patch` into
    /// `self`, matching the `over` flag on `PUT /u/{pk}/info`.
    #[must_use]
    pub fn with_patch(&self, patch: &Value, overwrite: bool) -> Self {
        if overwrite {
            return Self(patch.clone());
        }

        let mut merged = self.0.clone();
        merge_in_place(&mut merged, patch);
        Self(merged)
    }

    /// Applies `patch` to a clone of `self`, returning the new value only
    /// if it differs from `self` by deep equality — the "write back only
    /// on difference" rule.
    pub fn apply_if_changed(&self, patch: &Value, overwrite: bool) -> Option<Self> {
        let candidate = self.with_patch(patch, overwrite);
        (candidate != *self).then_some(candidate)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

fn merge_in_place(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => merge_in_place(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_preserves_untouched_keys() {
        let base = JsonPatch::new(json!({"a": 1, "b": {"c": 2}}));
        let merged = base.with_patch(&json!({"b": {"d": 3}}), false);
        assert_eq!(merged.0, json!({"a": 1, "b": {"c": 2, "d": 3}}));
    }

    #[test]
    fn overwrite_replaces_wholesale() {
        let base = JsonPatch::new(json!({"a": 1}));
        let replaced = base.with_patch(&json!({"b": 2}), true);
        assert_eq!(replaced.0, json!({"b": 2}));
    }

    #[test]
    fn apply_if_changed_is_none_for_noop_patch() {
        let base = JsonPatch::new(json!({"a": 1}));
        assert!(base.apply_if_changed(&json!({"a": 1}), false).is_none());
        assert!(base.apply_if_changed(&json!({"a": 2}), false).is_some());
    }
}
