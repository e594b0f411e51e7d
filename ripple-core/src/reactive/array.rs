//! Observed Sequences
//!
//! Element reads and index writes cannot be intercepted, so an [`Array`]
//! exposes its mutations as methods instead. Each mutating method changes
//! the underlying storage, observes any inserted elements and then notifies
//! the dep of the array's observer (if it has one).
//!
//! Reading an array through a reactive field already depends on that dep,
//! so `state.list.push(x)` re-runs whoever read `state.list`.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::observer::{observe, Observer};
use super::value::Value;

pub(crate) struct ArrayData {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    extensible: Cell<bool>,
    frozen: Cell<bool>,
}

/// A reference-counted sequence container.
#[derive(Clone)]
pub struct Array(Rc<ArrayData>);

impl Array {
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    pub fn from_values(items: Vec<Value>) -> Self {
        Self(Rc::new(ArrayData {
            items: RefCell::new(items),
            observer: RefCell::new(None),
            extensible: Cell::new(true),
            frozen: Cell::new(false),
        }))
    }

    /// True if both handles point at the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    /// Element at `index`, or `Undefined` past the end.
    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.0.observer.borrow().clone()
    }

    pub fn freeze(&self) {
        self.0.frozen.set(true);
        self.0.extensible.set(false);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn is_extensible(&self) -> bool {
        self.0.extensible.get()
    }

    // ---- Mutations ----

    pub fn push(&self, value: impl Into<Value>) -> usize {
        if self.is_frozen() {
            return self.len();
        }
        let value = value.into();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.push(value.clone());
            items.len()
        };
        self.after_mutation("push", vec![value]);
        len
    }

    pub fn pop(&self) -> Value {
        if self.is_frozen() {
            return Value::Undefined;
        }
        let popped = self.0.items.borrow_mut().pop();
        match popped {
            Some(value) => {
                self.after_mutation("pop", Vec::new());
                value
            }
            None => Value::Undefined,
        }
    }

    pub fn shift(&self) -> Value {
        if self.is_frozen() {
            return Value::Undefined;
        }
        let shifted = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        match shifted {
            Some(value) => {
                self.after_mutation("shift", Vec::new());
                value
            }
            None => Value::Undefined,
        }
    }

    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        if self.is_frozen() {
            return self.len();
        }
        let value = value.into();
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.insert(0, value.clone());
            items.len()
        };
        self.after_mutation("unshift", vec![value]);
        len
    }

    /// Remove `delete_count` elements starting at `start` and insert `items`
    /// in their place. Out-of-range arguments are clamped. Returns the
    /// removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        if self.is_frozen() {
            return Vec::new();
        }
        let removed: Vec<Value> = {
            let mut storage = self.0.items.borrow_mut();
            let start = start.min(storage.len());
            let end = start.saturating_add(delete_count).min(storage.len());
            storage.splice(start..end, items.iter().cloned()).collect()
        };
        self.after_mutation("splice", items);
        removed
    }

    /// Sort in place with `compare`.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        if self.is_frozen() {
            return;
        }
        self.0.items.borrow_mut().sort_by(compare);
        self.after_mutation("sort", Vec::new());
    }

    pub fn reverse(&self) {
        if self.is_frozen() {
            return;
        }
        self.0.items.borrow_mut().reverse();
        self.after_mutation("reverse", Vec::new());
    }

    // ---- Internal ----

    /// Address of the shared storage, stable for the container's lifetime.
    pub(crate) fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0).cast()
    }

    pub(crate) fn downgrade(&self) -> Weak<ArrayData> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_data(data: Rc<ArrayData>) -> Self {
        Self(data)
    }

    pub(crate) fn attach_observer(&self, observer: Rc<Observer>) {
        *self.0.observer.borrow_mut() = Some(observer);
    }

    fn after_mutation(&self, method: &'static str, inserted: Vec<Value>) {
        let Some(observer) = self.observer() else {
            return;
        };
        for value in &inserted {
            observe(value);
        }
        trace!(method, dep = %observer.dep().id(), "array mutated");
        observer.dep().notify();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}
