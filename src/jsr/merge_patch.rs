//! RFC 7386 JSON Merge Patch, applied at a JSON Pointer path.
//!
//! Grounded on `iwjsreg.c`'s `jbn_merge_patch_path` calls in `merge`/
//! `iwjsreg_replace`: every mutating registry operation (`set_*`, `merge`,
//! `remove`) is expressed in the source as "build a small patch document,
//! merge it in at a path." This module is that primitive.

use crate::jsr::pointer;
use serde_json::Value;

/// Applies `patch` as an RFC 7386 merge patch against whatever currently
/// lives at `value`. `null` values in the patch delete the corresponding key;
/// non-object patches replace `value` outright; object patches merge
/// key-by-key, recursing into existing object values.
pub fn apply(value: &mut Value, patch: &Value) {
    match (value.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch_obj)) => {
            for (key, patch_val) in patch_obj {
                if patch_val.is_null() {
                    target.remove(key);
                } else {
                    let entry = target.entry(key.clone()).or_insert(Value::Null);
                    apply(entry, patch_val);
                }
            }
        }
        _ => {
            *value = patch.clone();
        }
    }
}

/// Applies `patch` at `path` within `root`, creating intermediate objects as
/// needed (the pointer-qualified counterpart of [`apply`]).
pub fn apply_at(root: &mut Value, path: &str, patch: &Value) -> crate::error::Result<()> {
    let target = pointer::resolve_mut(root, path)?;
    apply(target, patch);
    Ok(())
}
