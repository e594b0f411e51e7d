//! Computed Values
//!
//! A [`Computed`] is a cached derived value backed by a lazy computation
//! node.
//!
//! # How Computed Values Work
//!
//! 1. Nothing runs at creation. The node starts dirty.
//! 2. The first read evaluates the getter and caches the result.
//! 3. While nobody depends on the computed value, a change to one of its
//!    inputs only marks it dirty again. Unread values never recompute.
//! 4. Once another computation has read it, an input change re-evaluates it
//!    eagerly and notifies the readers only if the result changed.
//!
//! Reading a computed value from inside another evaluation subscribes the
//! outer computation to the computed node's own dep, so a render that reads
//! `total` re-runs whenever `total` changes.

use tracing::debug;

use super::object::{Accessor, Object};
use super::value::Value;
use crate::error::{handle_error, warn, BoxError, ReactiveError, Warning};
use crate::graph::{Computation, GetterSource, NodeOptions};

/// A lazily evaluated, cached derived value.
#[derive(Clone)]
pub struct Computed {
    node: Computation,
}

impl Computed {
    /// Create a computed value from a getter over `context`.
    pub fn new<F>(context: &Value, getter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, BoxError> + 'static,
    {
        Self::from_source(context, GetterSource::func(getter), NodeOptions::default())
    }

    pub fn from_source(context: &Value, source: GetterSource, options: NodeOptions) -> Self {
        Self {
            node: Computation::computed(context.clone(), source, options),
        }
    }

    /// Read the value, recomputing it first if dirty.
    pub fn get(&self) -> Result<Value, ReactiveError> {
        self.node.depend();
        self.node.evaluate_if_dirty()
    }

    pub fn is_dirty(&self) -> bool {
        self.node.is_dirty()
    }

    /// The underlying computation node.
    pub fn node(&self) -> &Computation {
        &self.node
    }

    /// Tear the node down and release its context.
    pub fn dispose(&self) {
        self.node.teardown();
    }

    fn accessor(&self) -> Accessor {
        let node = self.node.clone();
        Accessor::getter(move || {
            node.depend();
            match node.evaluate_if_dirty() {
                Ok(value) => value,
                Err(err) => {
                    handle_error(err, "computed getter");
                    Value::Undefined
                }
            }
        })
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Computed").field(&self.node).finish()
    }
}

/// Define `key` on `owner` as a computed property evaluated against the
/// owner itself.
///
/// Returns `None` with a [`Warning::ComputedConflict`] if `owner` already
/// has `key`. The owner and the node reference each other until
/// [`Computed::dispose`] is called.
pub fn define_computed<F>(owner: &Object, key: &str, getter: F) -> Option<Computed>
where
    F: Fn(&Value) -> Result<Value, BoxError> + 'static,
{
    install(owner, key, getter, None)
}

/// Like [`define_computed`], with writes to `key` routed to `setter`.
pub fn define_writable_computed<F, S>(
    owner: &Object,
    key: &str,
    getter: F,
    setter: S,
) -> Option<Computed>
where
    F: Fn(&Value) -> Result<Value, BoxError> + 'static,
    S: Fn(Value) + 'static,
{
    install(owner, key, getter, Some(Box::new(setter)))
}

fn install<F>(
    owner: &Object,
    key: &str,
    getter: F,
    setter: Option<Box<dyn Fn(Value)>>,
) -> Option<Computed>
where
    F: Fn(&Value) -> Result<Value, BoxError> + 'static,
{
    if owner.contains_key(key) {
        warn(Warning::ComputedConflict {
            key: key.to_string(),
        });
        return None;
    }

    let options = NodeOptions {
        label: Some(key.to_string()),
        ..NodeOptions::default()
    };
    let computed = Computed::from_source(
        &Value::Object(owner.clone()),
        GetterSource::func(getter),
        options,
    );

    let mut accessor = computed.accessor();
    if let Some(setter) = setter {
        accessor = accessor.with_setter(setter);
    }
    if !owner.define_accessor(key, accessor) {
        computed.dispose();
        return None;
    }
    debug!(key, id = %computed.node.id(), "defined computed property");
    Some(computed)
}
