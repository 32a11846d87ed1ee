//! Recursive merge over JSON values.
//!
//! Semantics:
//! - map ⊕ map merges key by key, recursing into nested maps
//! - every other pairing (list ⊕ list, scalar ⊕ map, anything ⊕ null) takes
//!   the right-hand value
//! - keys keep the left map's order; keys only on the right are appended

use serde_json::Value;

use crate::Attributes;

/// Merge `overlay` into `base`. Right-hand values win on scalar leaves.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            deep_merge_maps(base_map, overlay_map);
        }
        (slot, overlay) => *slot = overlay,
    }
}

/// Map-level entry point for [`deep_merge`].
pub fn deep_merge_maps(base: &mut Attributes, overlay: Attributes) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Walk nested maps by key. Returns `None` when any segment is missing or a
/// non-map value is hit before the path ends.
pub fn dig<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.as_object()?.get(*key))
}

/// Presence test used for `trigger` / `bridge_needs` detection.
///
/// `null`, `false`, `""`, `[]` and `{}` are absent; everything else is present.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}
