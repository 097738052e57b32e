//! Owned-field diffing for merge-apply
//!
//! The API server fills in defaults on every object it stores (probe timeouts,
//! port protocols, termination message paths...). Comparing desired and live
//! objects for equality would therefore report drift on every pass. Instead a
//! live object is considered up to date when it *contains* the desired value:
//! every key the operator sets has the same value, extra live keys are ignored.

use serde_json::{Map, Value};

/// A JSON path into an object, e.g. `["spec", "replicas"]`
pub type FieldPath<'a> = &'a [&'a str];

/// Returns true if `live` semantically contains `desired`
///
/// Objects are compared over the desired keys only, arrays must have the same
/// length and contain each other pairwise, scalars must be equal. A desired
/// `null` is satisfied by an absent key.
pub fn contains(live: &Value, desired: &Value) -> bool {
    match (live, desired) {
        (Value::Object(live), Value::Object(desired)) => desired.iter().all(|(key, want)| {
            match live.get(key) {
                Some(have) => contains(have, want),
                None => want.is_null(),
            }
        }),
        (Value::Array(live), Value::Array(desired)) => {
            live.len() == desired.len()
                && live.iter().zip(desired).all(|(have, want)| contains(have, want))
        }
        _ => live == desired,
    }
}

/// RFC 7386 merge patch carrying only the owned fields of `desired`
///
/// Owned paths that are absent from `desired` are left out of the patch, so
/// values another actor set there are preserved.
pub fn owned_patch(desired: &Value, owned: &[FieldPath<'_>]) -> Value {
    let mut patch = Value::Object(Map::new());
    for path in owned {
        if let Some(value) = lookup(desired, path) {
            insert(&mut patch, path, value.clone());
        }
    }
    patch
}

fn lookup<'v>(value: &'v Value, path: FieldPath<'_>) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, segment| current.get(segment))
}

fn insert(target: &mut Value, path: FieldPath<'_>, value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = target;
    for segment in parents {
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), value);
    }
}
