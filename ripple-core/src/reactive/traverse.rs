//! Deep Traversal
//!
//! Deep watchers must react to a change anywhere inside the watched value.
//! [`traverse`] force-reads every nested field so the evaluating computation
//! depends on all of them.

use std::collections::HashSet;

use super::dep::DepId;
use super::value::Value;

/// Containers already visited during one traversal.
#[derive(Default)]
struct Seen {
    observed: HashSet<DepId>,
    plain: HashSet<*const ()>,
}

impl Seen {
    /// Record `value`, returning false if it was visited before.
    fn insert(&mut self, value: &Value) -> bool {
        if let Some(observer) = value.observer() {
            return self.observed.insert(observer.dep().id());
        }
        match value {
            Value::Object(object) => self.plain.insert(object.addr()),
            Value::Array(array) => self.plain.insert(array.addr()),
            _ => true,
        }
    }
}

/// Touch every nested reactive field of `value`.
///
/// Each container is visited once per call: observed ones keyed by their
/// observer's dep id, unobserved ones by address. Frozen containers and
/// opaque values are skipped.
pub fn traverse(value: &Value) {
    walk(value, &mut Seen::default());
}

fn walk(value: &Value, seen: &mut Seen) {
    let frozen = match value {
        Value::Object(object) => object.is_frozen(),
        Value::Array(array) => array.is_frozen(),
        _ => return,
    };
    if frozen || !seen.insert(value) {
        return;
    }

    match value {
        Value::Object(object) => {
            for key in object.keys() {
                walk(&object.get(&key), seen);
            }
        }
        Value::Array(array) => {
            for item in array.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
