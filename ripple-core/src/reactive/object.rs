//! Keyed Containers
//!
//! An [`Object`] is an insertion-ordered map from field names to slots.
//! A slot is one of:
//!
//! - `Plain`: raw storage, not tracked. Fields of unobserved objects and
//!   fields added without going through [`set`](super::set) live here.
//! - `Reactive`: raw storage behind an accessor pair wired to a [`Dep`].
//!   The installer in `property.rs` converts plain slots into reactive ones.
//! - `Accessor`: custom get (and optional set) semantics supplied by the
//!   owner, e.g. a computed property. The installer never touches these.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context::untracked;
use super::dep::Dep;
use super::observer::Observer;
use super::property;
use super::value::Value;

/// Custom field semantics: a getter and an optional setter.
#[derive(Clone)]
pub struct Accessor {
    pub(crate) get: Rc<dyn Fn() -> Value>,
    pub(crate) set: Option<Rc<dyn Fn(Value)>>,
}

impl Accessor {
    /// A get-only accessor.
    pub fn getter<F>(get: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        Self {
            get: Rc::new(get),
            set: None,
        }
    }

    /// Add a setter.
    pub fn with_setter<F>(mut self, set: F) -> Self
    where
        F: Fn(Value) + 'static,
    {
        self.set = Some(Rc::new(set));
        self
    }
}

/// Storage for one reactive field.
pub(crate) struct ReactiveSlot {
    pub(crate) value: Value,
    pub(crate) dep: Dep,
    /// Observer of `value` at the time it was stored.
    pub(crate) child: Option<Rc<Observer>>,
    pub(crate) shallow: bool,
}

pub(crate) enum Slot {
    Plain(Value),
    Reactive(ReactiveSlot),
    Accessor(Accessor),
}

pub(crate) struct ObjectData {
    pub(crate) fields: RefCell<IndexMap<String, Slot>>,
    pub(crate) observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
    internal: bool,
}

/// A reference-counted keyed container.
///
/// Cloning the handle does not copy the fields; both handles see the same
/// storage.
#[derive(Clone)]
pub struct Object(Rc<ObjectData>);

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::with_internal(false)
    }

    /// Create an internal bookkeeping object. Internal objects are never
    /// observed and refuse `set`/`delete` through the imperative API.
    pub fn internal() -> Self {
        Self::with_internal(true)
    }

    fn with_internal(internal: bool) -> Self {
        Self(Rc::new(ObjectData {
            fields: RefCell::new(IndexMap::new()),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
            internal,
        }))
    }

    /// Build an object from key/value pairs.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let object = Self::new();
        for (key, value) in entries {
            object.insert_plain(&key.into(), value.into());
        }
        object
    }

    /// True if both handles point at the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Read a field, registering dependencies if a computation is evaluating.
    pub fn get(&self, key: &str) -> Value {
        property::get(self, key)
    }

    /// Write a field, notifying subscribers if the field is reactive and
    /// the value changed.
    ///
    /// Writing a missing key adds a plain field; use
    /// [`set`](crate::reactive::set) to add a reactive one.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        property::set(self, key, value.into());
    }

    /// Read a field without registering any dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        untracked(|| self.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.fields.borrow().contains_key(key)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.0.fields.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.fields.borrow().is_empty()
    }

    /// True if `key` is backed by a reactive accessor pair.
    pub fn is_reactive(&self, key: &str) -> bool {
        matches!(self.0.fields.borrow().get(key), Some(Slot::Reactive(_)))
    }

    /// Snapshot of every field, read without tracking.
    pub fn entries_untracked(&self) -> Vec<(String, Value)> {
        untracked(|| {
            self.keys()
                .into_iter()
                .map(|key| {
                    let value = self.get(&key);
                    (key, value)
                })
                .collect()
        })
    }

    /// Install custom accessor semantics on `key`.
    ///
    /// Returns `false` (and does nothing) if the object is frozen, or if the
    /// key is new and the object is not extensible.
    pub fn define_accessor(&self, key: &str, accessor: Accessor) -> bool {
        if self.is_frozen() {
            return false;
        }
        let mut fields = self.0.fields.borrow_mut();
        if !fields.contains_key(key) && !self.is_extensible() {
            return false;
        }
        fields.insert(key.to_string(), Slot::Accessor(accessor));
        true
    }

    /// Make the object immutable: writes, additions and deletions are
    /// silently ignored, and it can no longer be observed.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
        self.0.extensible.set(false);
    }

    /// Forbid new keys. Existing fields stay writable.
    pub fn prevent_extensions(&self) {
        self.0.extensible.set(false);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    pub fn is_internal(&self) -> bool {
        self.0.internal
    }

    /// The observer attached to this object, if any.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    pub(crate) fn data(&self) -> &ObjectData {
        &self.0
    }

    /// Address of the shared storage, stable for the container's lifetime.
    pub(crate) fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0).cast()
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectData> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_data(data: Rc<ObjectData>) -> Self {
        Self(data)
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    /// Insert or overwrite a plain slot. Respects frozen/extensible.
    pub(crate) fn insert_plain(&self, key: &str, value: Value) -> bool {
        if self.is_frozen() {
            return false;
        }
        let mut fields = self.0.fields.borrow_mut();
        if !fields.contains_key(key) && !self.is_extensible() {
            return false;
        }
        fields.insert(key.to_string(), Slot::Plain(value));
        true
    }

    /// Remove a field, keeping the order of the rest.
    pub(crate) fn remove_field(&self, key: &str) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.0.fields.borrow_mut().shift_remove(key).is_some()
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .field("observed", &self.observer().is_some())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_keep_insertion_order() {
        let object = Object::from_entries([("b", 1), ("a", 2), ("c", 3)]);
        assert_eq!(object.keys(), ["b", "a", "c"]);

        object.remove_field("a");
        assert_eq!(object.keys(), ["b", "c"]);
    }

    #[test]
    fn frozen_objects_ignore_writes() {
        let object = Object::from_entries([("a", 1)]);
        object.freeze();

        object.set("a", 2);
        object.set("b", 3);

        assert_eq!(object.get("a"), Value::from(1));
        assert!(!object.contains_key("b"));
        assert!(!object.remove_field("a"));
    }

    #[test]
    fn non_extensible_objects_reject_new_keys() {
        let object = Object::from_entries([("a", 1)]);
        object.prevent_extensions();

        object.set("a", 2);
        object.set("b", 3);

        assert_eq!(object.get("a"), Value::from(2));
        assert!(!object.contains_key("b"));
    }

    #[test]
    fn accessor_fields_call_their_getter() {
        let object = Object::new();
        object.define_accessor("answer", Accessor::getter(|| Value::from(42)));

        assert_eq!(object.get("answer"), Value::from(42));
        assert!(!object.is_reactive("answer"));
    }

    #[test]
    fn accessor_setter_receives_writes() {
        let store = Object::from_entries([("raw", 0)]);
        let target = store.clone();
        let reader = store.clone();
        store.define_accessor(
            "proxy",
            Accessor::getter(move || reader.get("raw")).with_setter(move |v| target.set("raw", v)),
        );

        store.set("proxy", 7);
        assert_eq!(store.get("raw"), Value::from(7));
        assert_eq!(store.get("proxy"), Value::from(7));
    }
}
