//! Reactive Property Installer
//!
//! Turns a plain field into an accessor pair wired to a [`Dep`]:
//!
//! - Reading calls `dep.depend()`. If the stored value is itself an observed
//!   container, the reader also depends on that container's own dep, and for
//!   arrays on the dep of every nested container element. That is how an
//!   in-place `push` on `state.list` reaches whoever read `state.list`.
//!
//! - Writing compares old and new with [`Value::same`] (identity, NaN equals
//!   NaN). An unchanged write is a no-op; otherwise the new value is observed
//!   if eligible and the dep notifies.
//!
//! Slot contents are always cloned out before depending, observing or
//! notifying so that re-entrant reads and writes never hit a `RefCell`
//! borrow.

use std::rc::Rc;

use tracing::trace;

use super::array::Array;
use super::context::EvaluationContext;
use super::dep::Dep;
use super::object::{Object, ReactiveSlot, Slot};
use super::observer::{observe, Observer};
use super::value::Value;
use crate::error::{warn, Warning};

/// What a read found in the slot, detached from the borrow.
enum Read {
    Plain(Value),
    Reactive(Value, Dep, Option<Rc<Observer>>),
    Accessor(Rc<dyn Fn() -> Value>),
}

/// What a write has to do, detached from the borrow.
enum Write {
    Plain,
    Reactive { dep: Dep, shallow: bool },
    Setter(Rc<dyn Fn(Value)>),
    GetOnly,
    Missing,
}

/// Convert an existing plain field of `object` into a reactive one.
///
/// Already-reactive and accessor fields are left alone, as is anything on a
/// frozen object. A `shallow` field neither observes nor tracks the
/// containers stored in it.
pub fn define_reactive(object: &Object, key: &str, shallow: bool) {
    if object.is_frozen() {
        return;
    }
    let value = match object.data().fields.borrow().get(key) {
        Some(Slot::Plain(value)) => value.clone(),
        _ => return,
    };
    let child = if shallow { None } else { observe(&value) };

    let mut fields = object.data().fields.borrow_mut();
    if let Some(slot) = fields.get_mut(key) {
        if let Slot::Plain(_) = slot {
            let dep = Dep::new();
            trace!(key, dep = %dep.id(), "installed reactive property");
            *slot = Slot::Reactive(ReactiveSlot {
                value,
                dep,
                child,
                shallow,
            });
        }
    }
}

/// Add a brand-new reactive field (or reinstall an existing plain one) with
/// `value`. Used by the imperative `set` API.
pub(crate) fn define_reactive_with(object: &Object, key: &str, value: Value) {
    if object.insert_plain(key, value) {
        define_reactive(object, key, false);
    }
}

pub(crate) fn get(object: &Object, key: &str) -> Value {
    let read = match object.data().fields.borrow().get(key) {
        None => return Value::Undefined,
        Some(Slot::Plain(value)) => Read::Plain(value.clone()),
        Some(Slot::Reactive(slot)) => {
            Read::Reactive(slot.value.clone(), slot.dep.clone(), slot.child.clone())
        }
        Some(Slot::Accessor(accessor)) => Read::Accessor(accessor.get.clone()),
    };

    match read {
        Read::Plain(value) => value,
        Read::Accessor(get) => get(),
        Read::Reactive(value, dep, child) => {
            if EvaluationContext::is_active() {
                dep.depend();
                if let Some(child) = child {
                    child.dep().depend();
                    if let Value::Array(items) = &value {
                        depend_array(items);
                    }
                }
            }
            value
        }
    }
}

pub(crate) fn set(object: &Object, key: &str, value: Value) {
    if object.is_frozen() {
        return;
    }
    let write = match object.data().fields.borrow().get(key) {
        None => Write::Missing,
        Some(Slot::Plain(_)) => Write::Plain,
        Some(Slot::Reactive(slot)) => {
            if slot.value.same(&value) {
                return;
            }
            Write::Reactive {
                dep: slot.dep.clone(),
                shallow: slot.shallow,
            }
        }
        Some(Slot::Accessor(accessor)) => match &accessor.set {
            Some(set) => Write::Setter(set.clone()),
            None => Write::GetOnly,
        },
    };

    match write {
        Write::Missing | Write::Plain => {
            object.insert_plain(key, value);
        }
        Write::Setter(set) => set(value),
        Write::GetOnly => warn(Warning::ComputedAssignment {
            key: key.to_string(),
        }),
        Write::Reactive { dep, shallow } => {
            let child = if shallow { None } else { observe(&value) };
            if let Some(Slot::Reactive(slot)) = object.data().fields.borrow_mut().get_mut(key) {
                slot.value = value;
                slot.child = child;
            }
            dep.notify();
        }
    }
}

/// Depend on every observed container nested in `array`.
///
/// Element reads cannot be intercepted, so whoever reads an array depends on
/// all of its elements' container deps up front.
fn depend_array(array: &Array) {
    for item in array.to_vec() {
        if let Some(observer) = item.observer() {
            observer.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Accessor;
    use serde_json::json;

    #[test]
    fn installer_converts_plain_fields() {
        let object = Object::from_entries([("a", 1)]);
        assert!(!object.is_reactive("a"));

        define_reactive(&object, "a", false);
        assert!(object.is_reactive("a"));
        assert_eq!(object.get("a"), Value::from(1));
    }

    #[test]
    fn installer_skips_accessors_and_frozen_objects() {
        let object = Object::from_entries([("a", 1)]);
        object.define_accessor("b", Accessor::getter(|| Value::Null));
        define_reactive(&object, "b", false);
        assert!(!object.is_reactive("b"));

        object.freeze();
        define_reactive(&object, "a", false);
        assert!(!object.is_reactive("a"));
    }

    #[test]
    fn nested_values_are_observed_on_install() {
        let value = Value::from(json!({ "inner": { "x": 1 } }));
        observe(&value);

        let inner = value.get("inner");
        assert!(inner.observer().is_some());
        assert!(inner.as_object().is_some_and(|o| o.is_reactive("x")));
    }

    #[test]
    fn shallow_fields_do_not_observe_new_values() {
        let object = Object::from_entries([("a", 1)]);
        define_reactive(&object, "a", true);

        object.set("a", Value::from(json!({ "x": 1 })));
        assert!(object.get("a").observer().is_none());
    }

    #[test]
    fn writes_reobserve_new_containers() {
        let value = Value::from(json!({ "a": 1 }));
        observe(&value);
        let object = value.as_object().cloned().unwrap_or_default();

        object.set("a", Value::from(json!({ "b": 2 })));
        assert!(object.get("a").observer().is_some());
    }
}
