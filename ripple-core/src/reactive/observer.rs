//! Deep Observer
//!
//! [`observe`] attaches an [`Observer`] to a container and instruments it:
//! every existing field of an object is converted by the property installer,
//! every element of an array is observed in turn. Arrays report their own
//! mutations (see [`Array`]), so only their elements need walking.
//!
//! Wrapping is idempotent: the observer is stored on the container itself
//! and returned as-is on later calls.
//!
//! Additions and deletions cannot be seen by pre-installed accessors, so
//! they go through the imperative [`set`] and [`delete`] functions.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::array::{Array, ArrayData};
use super::dep::Dep;
use super::object::{Object, ObjectData};
use super::property::{define_reactive, define_reactive_with};
use super::value::{Key, Value};
use crate::error::{warn, Warning};

/// Largest index [`set`] will grow an array to.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

enum Owner {
    Object(Weak<ObjectData>),
    Array(Weak<ArrayData>),
}

/// Marker attached to every observed container.
///
/// Holds the container's own dep, notified on additions, deletions and
/// array mutations.
pub struct Observer {
    owner: Owner,
    dep: Dep,
    root_count: Cell<usize>,
}

impl Observer {
    /// The container's own dep.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// The observed container, while it is alive.
    pub fn value(&self) -> Option<Value> {
        match &self.owner {
            Owner::Object(weak) => weak.upgrade().map(|d| Value::Object(Object::from_data(d))),
            Owner::Array(weak) => weak.upgrade().map(|d| Value::Array(Array::from_data(d))),
        }
    }

    /// Number of owning contexts using this container as root data.
    pub fn root_count(&self) -> usize {
        self.root_count.get()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Observe `value` if it is an eligible container.
///
/// Returns the existing observer if already wrapped. Scalars, opaque values,
/// frozen or non-extensible containers and internal objects are never
/// wrapped, and nothing new is wrapped while observation is switched off.
pub fn observe(value: &Value) -> Option<Rc<Observer>> {
    if let Some(existing) = value.observer() {
        return Some(existing);
    }
    if !is_observing() {
        return None;
    }

    match value {
        Value::Object(object) => {
            if !object.is_extensible() || object.is_internal() {
                return None;
            }
            let observer = Rc::new(Observer {
                owner: Owner::Object(object.downgrade()),
                dep: Dep::new(),
                root_count: Cell::new(0),
            });
            // Marker goes on first so cycles terminate.
            object.attach_observer(observer.clone());
            debug!(dep = %observer.dep.id(), keys = object.len(), "observing object");
            for key in object.keys() {
                define_reactive(object, &key, false);
            }
            Some(observer)
        }
        Value::Array(array) => {
            if !array.is_extensible() {
                return None;
            }
            let observer = Rc::new(Observer {
                owner: Owner::Array(array.downgrade()),
                dep: Dep::new(),
                root_count: Cell::new(0),
            });
            array.attach_observer(observer.clone());
            debug!(dep = %observer.dep.id(), len = array.len(), "observing array");
            for item in array.to_vec() {
                observe(&item);
            }
            Some(observer)
        }
        _ => None,
    }
}

/// Observe `value` as the root data of an owning context.
///
/// Root data refuses `set`/`delete` of new keys at runtime.
pub fn observe_root(value: &Value) -> Option<Rc<Observer>> {
    let observer = observe(value)?;
    observer.root_count.set(observer.root_count.get() + 1);
    Some(observer)
}

/// Switch wrapping of new containers on or off for this thread.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|flag| flag.set(enabled));
}

pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Run `f` with observation switched off, restoring the previous setting.
pub fn without_observing<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            toggle_observing(self.0);
        }
    }

    let _restore = Restore(is_observing());
    toggle_observing(false);
    f()
}

/// Set `key` on `target`, adding a reactive field if it is new.
///
/// Arrays route index writes through `splice` so the write notifies.
/// Returns the value written.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::Array(array) => match key.as_index() {
            Some(index) if index < array.len() => {
                array.splice(index, 1, vec![value.clone()]);
                value
            }
            Some(index) => {
                let len = array.len();
                let tail = if index > MAX_ARRAY_INDEX {
                    None
                } else {
                    padded_tail(index - len, &value)
                };
                match tail {
                    Some(tail) => {
                        array.splice(len, 0, tail);
                    }
                    None => warn(Warning::ArrayIndexOutOfRange { index }),
                }
                value
            }
            None => {
                warn(Warning::NotReactive {
                    action: "set",
                    target: format!("array key \"{key}\""),
                });
                value
            }
        },
        Value::Object(object) => {
            let name = key.to_name();
            if object.contains_key(&name) {
                object.set(&name, value.clone());
                return value;
            }
            let observer = object.observer();
            if object.is_internal() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn(Warning::RootDataMutation { action: "adding" });
                return value;
            }
            match observer {
                None => {
                    object.insert_plain(&name, value.clone());
                }
                Some(observer) => {
                    define_reactive_with(object, &name, value.clone());
                    observer.dep().notify();
                }
            }
            value
        }
        other => {
            warn(Warning::NotReactive {
                action: "set",
                target: other.describe(),
            });
            value
        }
    }
}

/// `padding` undefined slots followed by `value`, or `None` if the storage
/// cannot be allocated.
fn padded_tail(padding: usize, value: &Value) -> Option<Vec<Value>> {
    let mut tail = Vec::new();
    tail.try_reserve_exact(padding + 1).ok()?;
    tail.resize(padding, Value::Undefined);
    tail.push(value.clone());
    Some(tail)
}

/// Delete `key` from `target`, notifying if the container is observed.
pub fn delete(target: &Value, key: impl Into<Key>) {
    let key = key.into();

    match target {
        Value::Array(array) => {
            if let Some(index) = key.as_index() {
                if index < array.len() {
                    array.splice(index, 1, Vec::new());
                }
            }
        }
        Value::Object(object) => {
            let observer = object.observer();
            if object.is_internal() || observer.as_ref().is_some_and(|ob| ob.root_count() > 0) {
                warn(Warning::RootDataMutation { action: "deleting" });
                return;
            }
            if !object.remove_field(&key.to_name()) {
                return;
            }
            if let Some(observer) = observer {
                observer.dep().notify();
            }
        }
        other => warn(Warning::NotReactive {
            action: "delete",
            target: other.describe(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn observe_is_idempotent() {
        let value = Value::from(json!({ "a": 1 }));
        let first = observe(&value);
        let second = observe(&value);

        assert!(first.is_some());
        assert!(Rc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[test]
    fn scalars_and_frozen_containers_are_not_observed() {
        assert!(observe(&Value::from(1)).is_none());
        assert!(observe(&Value::opaque(5u8)).is_none());

        let frozen = Object::from_entries([("a", 1)]);
        frozen.freeze();
        assert!(observe(&Value::Object(frozen)).is_none());

        assert!(observe(&Value::Object(Object::internal())).is_none());
    }

    #[test]
    fn cycles_terminate() {
        let a = Object::new();
        let b = Object::new();
        a.set("b", b.clone());
        b.set("a", a.clone());

        let value = Value::Object(a);
        assert!(observe(&value).is_some());
        assert!(value.get("b").observer().is_some());
        assert!(value.get("b").get("a").same(&value));
    }

    #[test]
    fn toggle_suspends_wrapping() {
        let value = Value::from(json!({ "a": 1 }));
        let inside = without_observing(|| {
            assert!(!is_observing());
            observe(&value)
        });
        assert!(inside.is_none());
        assert!(is_observing());
        assert!(observe(&value).is_some());
    }

    #[test]
    fn set_adds_reactive_fields_to_observed_objects() {
        let value = Value::from(json!({ "a": 1 }));
        observe(&value);

        set(&value, "b", 2);
        let object = value.as_object().cloned().unwrap_or_default();
        assert!(object.is_reactive("b"));
        assert_eq!(object.get("b"), Value::from(2));
    }

    #[test]
    fn set_on_array_index_pads_and_writes() {
        let value = Value::from(json!([1]));
        observe(&value);

        set(&value, 3usize, "x");
        let array = value.as_array().cloned().unwrap_or_default();
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(1), Value::Undefined);
        assert_eq!(array.get(3), Value::from("x"));
    }

    #[test]
    fn set_past_the_maximum_index_warns_and_leaves_the_array() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::set_warn_handler(move |w| sink.borrow_mut().push(w.clone()));

        let value = Value::from(json!([1, 2]));
        observe(&value);

        let index = usize::MAX / 2;
        assert_eq!(set(&value, index, 9), Value::from(9));
        set(&value, MAX_ARRAY_INDEX + 2, 9);

        assert_eq!(value.as_array().map(Array::len), Some(2));
        assert_eq!(
            warnings.borrow().as_slice(),
            [
                Warning::ArrayIndexOutOfRange { index },
                Warning::ArrayIndexOutOfRange {
                    index: MAX_ARRAY_INDEX + 2
                },
            ]
        );
        config::reset();
    }

    #[test]
    fn root_data_refuses_new_keys() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::set_warn_handler(move |w| sink.borrow_mut().push(w.clone()));

        let value = Value::from(json!({ "a": 1 }));
        let observer = observe_root(&value);
        assert_eq!(observer.map(|ob| ob.root_count()), Some(1));

        set(&value, "b", 2);
        delete(&value, "a");
        assert_eq!(
            warnings.borrow().as_slice(),
            [
                Warning::RootDataMutation { action: "adding" },
                Warning::RootDataMutation { action: "deleting" },
            ]
        );
        assert!(!value.as_object().is_some_and(|o| o.contains_key("b")));
        config::reset();
    }

    #[test]
    fn set_on_scalar_warns() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        config::set_warn_handler(move |w| sink.borrow_mut().push(w.clone()));

        set(&Value::from(1), "a", 2);
        assert!(matches!(
            warnings.borrow().first(),
            Some(Warning::NotReactive { action: "set", .. })
        ));
        config::reset();
    }

    #[test]
    fn delete_removes_field() {
        let value = Value::from(json!({ "a": 1, "b": 2 }));
        observe(&value);
        delete(&value, "a");
        delete(&value, "missing");
        assert_eq!(value.as_object().map(Object::keys), Some(vec!["b".to_string()]));
    }
}
