//! User Watchers
//!
//! `watch` observes an expression (a dotted path or a function of the
//! owning context) and calls back with `(new, old)` whenever it changes.
//! Callbacks are deferred to the next flush unless `sync` is set.

use std::rc::Rc;

use super::value::Value;
use crate::error::{BoxError, ReactiveError};
use crate::graph::{Callback, Computation, GetterSource, NodeKind, NodeOptions};

#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Also react to changes nested anywhere inside the value.
    pub deep: bool,

    /// Call back inline on every change instead of once per flush.
    pub sync: bool,

    /// Call back right away with the initial value and `Undefined`.
    pub immediate: bool,
}

/// Handle to a running watcher. Dropping it stops the watcher.
#[must_use = "dropping a Watcher stops it"]
pub struct Watcher {
    node: Computation,
}

impl Watcher {
    /// The last value seen by the watcher.
    pub fn value(&self) -> Value {
        self.node.value()
    }

    pub fn node(&self) -> &Computation {
        &self.node
    }

    pub fn is_active(&self) -> bool {
        self.node.is_active()
    }

    /// Stop watching.
    pub fn unwatch(self) {}
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.node.teardown();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Watcher").field(&self.node).finish()
    }
}

/// Watch `source` evaluated against `context`.
///
/// Getter and callback errors are reported through
/// [`handle_error`](crate::error::handle_error) and never stop the watcher.
pub fn watch<S, F>(
    context: &Value,
    source: S,
    callback: F,
    options: WatchOptions,
) -> Result<Watcher, ReactiveError>
where
    S: Into<GetterSource>,
    F: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
{
    let callback: Callback = Rc::new(callback);
    let node = Computation::new(
        NodeKind::User,
        context.clone(),
        source.into(),
        Some(callback.clone()),
        NodeOptions {
            deep: options.deep,
            sync: options.sync,
            ..NodeOptions::default()
        },
    )?;

    if options.immediate {
        let value = node.value();
        node.invoke_callback(|new, old| callback(new, old), &value, &Value::Undefined)?;
    }
    Ok(Watcher { node })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::observe;
    use crate::tick;
    use serde_json::json;
    use std::cell::RefCell;

    type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recording() -> (Calls, impl Fn(&Value, &Value) -> Result<(), BoxError> + 'static) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        })
    }

    #[test]
    fn immediate_watchers_fire_at_creation() {
        let data = Value::from(json!({ "a": 1 }));
        observe(&data);
        let (calls, callback) = recording();

        let options = WatchOptions {
            immediate: true,
            ..WatchOptions::default()
        };
        let _watcher = watch(&data, "a", callback, options).unwrap();
        assert_eq!(calls.borrow().as_slice(), [(Value::from(1), Value::Undefined)]);
    }

    #[test]
    fn writes_in_one_tick_fire_once_with_the_final_value() {
        let data = Value::from(json!({ "a": 1 }));
        observe(&data);
        let (calls, callback) = recording();
        let _watcher = watch(&data, "a", callback, WatchOptions::default()).unwrap();

        let object = data.as_object().cloned().unwrap_or_default();
        object.set("a", 2);
        object.set("a", 3);
        object.set("a", 4);
        assert!(calls.borrow().is_empty());

        tick::run_until_idle();
        assert_eq!(calls.borrow().as_slice(), [(Value::from(4), Value::from(1))]);
    }

    #[test]
    fn deep_watchers_see_nested_writes() {
        let data = Value::from(json!({ "nested": { "list": [ { "v": 1 } ] } }));
        observe(&data);
        let (calls, callback) = recording();
        let options = WatchOptions {
            deep: true,
            sync: true,
            ..WatchOptions::default()
        };
        let _watcher = watch(&data, "nested", callback, options).unwrap();

        let item = data.get("nested").get("list").get(0usize);
        if let Some(item) = item.as_object() {
            item.set("v", 2);
        }
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn dropped_watchers_stop() {
        let data = Value::from(json!({ "a": 1 }));
        observe(&data);
        let (calls, callback) = recording();
        let options = WatchOptions {
            sync: true,
            ..WatchOptions::default()
        };
        let watcher = watch(&data, "a", callback, options).unwrap();
        let node = watcher.node().clone();

        watcher.unwatch();
        assert!(!node.is_active());
        if let Some(object) = data.as_object() {
            object.set("a", 2);
        }
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn sets_on_watched_arrays_notify() {
        let data = Value::from(json!({ "list": [1, 2] }));
        observe(&data);
        let (calls, callback) = recording();
        let options = WatchOptions {
            sync: true,
            ..WatchOptions::default()
        };
        let _watcher = watch(&data, "list", callback, options).unwrap();

        crate::reactive::set(&data.get("list"), 0usize, 9);
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(data.get("list").get(0usize), Value::from(9));
    }
}
