//! Field-by-field merging of configuration tiers.
//!
//! Each tier is parsed from YAML into a `serde_json::Value` and folded over the
//! previous ones. Mappings merge key by key; everything else (scalars, lists)
//! is replaced by the higher tier. A `null` in a higher tier means "not set"
//! and keeps the lower value.

use serde_json::Value;

/// Merge `overlay` on top of `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge tiers lowest-priority first.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}
