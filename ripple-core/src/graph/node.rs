//! Computation Nodes
//!
//! A [`Computation`] is a unit of derived work that tracks its own
//! dependencies and reacts when they change. Three kinds exist:
//!
//! - `Render`: evaluated eagerly, re-run through the scheduler. Its getter
//!   produces an opaque tree that the callback applies.
//! - `Computed`: lazy. Starts dirty, evaluates on first read, and owns a
//!   [`Dep`] so readers of the computed value subscribe to it.
//! - `User`: a watcher. Getter errors are reported and recovered from so
//!   that one broken watcher never stops the rest of a flush.
//!
//! # Dependency Reconciliation
//!
//! Every evaluation collects a fresh dep set. When the evaluation scope
//! closes, deps that were not read this time are unsubscribed and the fresh
//! set becomes current, so after `evaluate()` the active set is exactly the
//! set of deps read.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::scheduler::Scheduler;
use crate::error::{handle_error, warn, BoxError, ReactiveError, Warning};
use crate::reactive::{traverse, Dep, DepId, EvaluationContext, Value};

/// Unique identifier for a computation. Strictly increasing in creation
/// order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The kind of computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Rebuilds a view of its owner. Scheduled, eager.
    Render,

    /// A cached derived value. Lazy, owns a dep.
    Computed,

    /// A user watcher with a reaction callback.
    User,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Render => "render function",
            NodeKind::Computed => "computed property",
            NodeKind::User => "watcher",
        })
    }
}

/// Computes a value from the owning context.
pub type Getter = Rc<dyn Fn(&Value) -> Result<Value, BoxError>>;

/// Reaction callback, invoked with `(new, old)`.
pub type Callback = Rc<dyn Fn(&Value, &Value) -> Result<(), BoxError>>;

/// Lifecycle hook.
pub type Hook = Rc<dyn Fn()>;

/// Decides whether a re-evaluation counts as a change: `(new, old, deep)`.
pub type ChangePolicy = fn(&Value, &Value, bool) -> bool;

/// Changed if the value is not the same, or is a container (which may have
/// been mutated in place), or the node is deep.
pub fn default_change_policy(new: &Value, old: &Value, deep: bool) -> bool {
    !new.same(old) || new.is_object() || deep
}

/// Strict identity: only a different value counts as a change.
pub fn identity_change_policy(new: &Value, old: &Value, _deep: bool) -> bool {
    !new.same(old)
}

/// Flags and hooks for a new computation.
#[derive(Clone, Default)]
pub struct NodeOptions {
    /// Force-read every nested field of the result.
    pub deep: bool,

    /// React inline instead of going through the scheduler.
    pub sync: bool,

    /// Called by the scheduler right before the node runs.
    pub before: Option<Hook>,

    /// Called after a flush in which this render node ran.
    pub updated: Option<Hook>,

    /// Overrides [`default_change_policy`].
    pub change: Option<ChangePolicy>,

    /// Expression used in diagnostics for function getters.
    pub label: Option<String>,
}

/// Where a computation gets its value from.
#[derive(Clone)]
pub enum GetterSource {
    /// A dotted path resolved against the owning context, e.g. `"a.b.0"`.
    Path(String),

    /// An arbitrary function of the owning context.
    Func(Getter),
}

impl GetterSource {
    pub fn path(path: impl Into<String>) -> Self {
        GetterSource::Path(path.into())
    }

    pub fn func<F>(getter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, BoxError> + 'static,
    {
        GetterSource::Func(Rc::new(getter))
    }
}

impl From<&str> for GetterSource {
    fn from(path: &str) -> Self {
        GetterSource::path(path)
    }
}

impl From<String> for GetterSource {
    fn from(path: String) -> Self {
        GetterSource::Path(path)
    }
}

impl From<Getter> for GetterSource {
    fn from(getter: Getter) -> Self {
        GetterSource::Func(getter)
    }
}

/// Compile a dotted path into a getter.
///
/// Only `[A-Za-z0-9_.$]` is accepted; anything else returns `None`.
pub fn parse_path(path: &str) -> Option<Getter> {
    let valid = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$');
    if !valid {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    let getter: Getter = Rc::new(move |root: &Value| {
        let mut value = root.clone();
        for segment in &segments {
            if value.is_undefined() {
                break;
            }
            value = value.get(segment.as_str());
        }
        Ok(value)
    });
    Some(getter)
}

fn undefined_getter(_: &Value) -> Result<Value, BoxError> {
    Ok(Value::Undefined)
}

pub(crate) struct NodeInner {
    id: NodeId,
    kind: NodeKind,
    deep: bool,
    sync: bool,
    expression: String,
    context: RefCell<Value>,
    getter: Getter,
    callback: Option<Callback>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    deps: RefCell<IndexMap<DepId, Dep>>,
    new_deps: RefCell<IndexMap<DepId, Dep>>,
    own_dep: Option<Dep>,
    before: Option<Hook>,
    updated: Option<Hook>,
    change: ChangePolicy,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().values() {
            dep.remove_subscriber_id(self.id);
        }
        for dep in self.new_deps.get_mut().values() {
            dep.remove_subscriber_id(self.id);
        }
    }
}

/// Handle to a computation node. Clones share the node.
#[derive(Clone)]
pub struct Computation {
    inner: Rc<NodeInner>,
}

impl Computation {
    /// Create a computation.
    ///
    /// Computed nodes stay lazy and dirty; every other kind evaluates
    /// immediately to capture its initial value and dependencies. A failing
    /// initial evaluation of a render node is returned as an error.
    pub fn new(
        kind: NodeKind,
        context: Value,
        source: GetterSource,
        callback: Option<Callback>,
        options: NodeOptions,
    ) -> Result<Self, ReactiveError> {
        let node = Self::build(kind, context, source, callback, options);
        if kind != NodeKind::Computed {
            let value = node.evaluate()?;
            *node.inner.value.borrow_mut() = value;
        }
        Ok(node)
    }

    /// Create a lazy computed node. Nothing is evaluated until first read.
    pub fn computed(context: Value, source: GetterSource, options: NodeOptions) -> Self {
        Self::build(NodeKind::Computed, context, source, None, options)
    }

    fn build(
        kind: NodeKind,
        context: Value,
        source: GetterSource,
        callback: Option<Callback>,
        options: NodeOptions,
    ) -> Self {
        let (expression, getter) = match source {
            GetterSource::Path(path) => {
                let getter = match parse_path(&path) {
                    Some(getter) => getter,
                    None => {
                        warn(Warning::InvalidWatchPath { path: path.clone() });
                        Rc::new(undefined_getter) as Getter
                    }
                };
                (path, getter)
            }
            GetterSource::Func(getter) => {
                let label = options.label.clone().unwrap_or_else(|| "<function>".into());
                (label, getter)
            }
        };

        let lazy = kind == NodeKind::Computed;
        let node = Self {
            inner: Rc::new(NodeInner {
                id: NodeId::new(),
                kind,
                deep: options.deep,
                sync: options.sync,
                expression,
                context: RefCell::new(context),
                getter,
                callback,
                value: RefCell::new(Value::Undefined),
                dirty: Cell::new(lazy),
                active: Cell::new(true),
                deps: RefCell::new(IndexMap::new()),
                new_deps: RefCell::new(IndexMap::new()),
                own_dep: lazy.then(Dep::new),
                before: options.before,
                updated: options.updated,
                change: options.change.unwrap_or(default_change_policy),
            }),
        };

        debug!(
            id = %node.id(),
            kind = %kind,
            expression = node.expression(),
            "created computation"
        );
        node
    }

    // ---- Evaluation ----

    /// Run the getter with this node as the evaluation target and reconcile
    /// the dep set. Does not touch the cached value.
    pub fn evaluate(&self) -> Result<Value, ReactiveError> {
        let context = self.inner.context.borrow().clone();
        trace!(id = %self.id(), "evaluate");

        let outcome = {
            let _scope = EvaluationScope::enter(self);
            let outcome = (self.inner.getter)(&context);
            if let (Ok(value), true) = (&outcome, self.inner.deep) {
                traverse(value);
            }
            outcome
        };

        match outcome {
            Ok(value) => Ok(value),
            Err(source) => {
                let err = ReactiveError::Getter {
                    kind: self.kind(),
                    expression: self.inner.expression.clone(),
                    source,
                };
                if self.kind() == NodeKind::User {
                    handle_error(err, "watcher getter");
                    Ok(Value::Undefined)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Record `dep` as read during the current evaluation.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        {
            let mut new_deps = self.inner.new_deps.borrow_mut();
            if new_deps.contains_key(&id) {
                return;
            }
            new_deps.insert(id, dep.clone());
        }
        if !self.inner.deps.borrow().contains_key(&id) {
            dep.add_subscriber(self);
        }
    }

    /// Swap in the freshly collected deps and drop the stale ones.
    fn cleanup_deps(&self) {
        let id = self.id();
        let fresh = self.inner.new_deps.take();
        let stale = self.inner.deps.replace(fresh);
        {
            let current = self.inner.deps.borrow();
            for (dep_id, dep) in stale {
                if !current.contains_key(&dep_id) {
                    dep.remove_subscriber_id(id);
                }
            }
        }
        // Torn down mid-evaluation: nothing should stay subscribed.
        if !self.is_active() {
            for dep in self.inner.deps.take().into_values() {
                dep.remove_subscriber_id(id);
            }
        }
    }

    /// Invalidation hook, called by a dep this node subscribes to.
    pub(crate) fn on_dependency_changed(&self) -> Result<(), ReactiveError> {
        if !self.is_active() {
            return Ok(());
        }
        match self.kind() {
            NodeKind::Computed => {
                let unread = self
                    .inner
                    .own_dep
                    .as_ref()
                    .map_or(true, |dep| dep.subscriber_count() == 0);
                if unread {
                    self.inner.dirty.set(true);
                    Ok(())
                } else {
                    self.run()
                }
            }
            _ if self.inner.sync => self.run(),
            _ => {
                Scheduler::enqueue(self);
                Ok(())
            }
        }
    }

    /// Re-evaluate and react if the value changed.
    ///
    /// No-op on a torn-down node. Computed nodes notify their own dep
    /// instead of calling a callback.
    pub fn run(&self) -> Result<(), ReactiveError> {
        if !self.is_active() {
            return Ok(());
        }
        if let Some(own) = &self.inner.own_dep {
            return self.get_and_invoke(|_, _| {
                own.notify();
                Ok(())
            });
        }
        let callback = self.inner.callback.clone();
        self.get_and_invoke(|new, old| match &callback {
            Some(callback) => callback(new, old),
            None => Ok(()),
        })
    }

    fn get_and_invoke<F>(&self, invoke: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&Value, &Value) -> Result<(), BoxError>,
    {
        let value = self.evaluate()?;
        self.inner.dirty.set(false);
        let old = self.inner.value.borrow().clone();
        if !(self.inner.change)(&value, &old, self.inner.deep) {
            return Ok(());
        }
        *self.inner.value.borrow_mut() = value.clone();
        self.invoke_callback(invoke, &value, &old)
    }

    /// Call `invoke` with `(new, old)`. User watchers report callback
    /// errors; other kinds propagate them.
    pub(crate) fn invoke_callback<F>(
        &self,
        invoke: F,
        new: &Value,
        old: &Value,
    ) -> Result<(), ReactiveError>
    where
        F: FnOnce(&Value, &Value) -> Result<(), BoxError>,
    {
        match invoke(new, old) {
            Ok(()) => Ok(()),
            Err(source) => {
                let err = ReactiveError::Callback {
                    kind: self.kind(),
                    expression: self.inner.expression.clone(),
                    source,
                };
                if self.kind() == NodeKind::User {
                    handle_error(err, "callback for watcher");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Computed access path: evaluate if dirty, then return the cached value.
    pub fn evaluate_if_dirty(&self) -> Result<Value, ReactiveError> {
        if self.inner.dirty.get() {
            let value = self.evaluate()?;
            *self.inner.value.borrow_mut() = value;
            self.inner.dirty.set(false);
        }
        Ok(self.value())
    }

    /// Subscribe the currently evaluating node to this node's own dep.
    pub fn depend(&self) {
        if let Some(dep) = &self.inner.own_dep {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep and deactivate. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        let id = self.id();
        for dep in self.inner.deps.take().into_values() {
            dep.remove_subscriber_id(id);
        }
        for dep in self.inner.new_deps.take().into_values() {
            dep.remove_subscriber_id(id);
        }
        *self.inner.context.borrow_mut() = Value::Undefined;
        debug!(id = %id, kind = %self.kind(), "teardown");
    }

    // ---- Hooks ----

    pub(crate) fn run_before_hook(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    pub(crate) fn run_updated_hook(&self) {
        if let Some(updated) = &self.inner.updated {
            updated();
        }
    }

    // ---- Introspection ----

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    pub fn is_sync(&self) -> bool {
        self.inner.sync
    }

    /// The cached value from the last evaluation that counted as a change.
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// Number of deps currently subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub fn dependency_ids(&self) -> Vec<DepId> {
        self.inner.deps.borrow().keys().copied().collect()
    }

    /// The dep readers of a computed node subscribe to.
    pub fn own_dep(&self) -> Option<&Dep> {
        self.inner.own_dep.as_ref()
    }

    pub(crate) fn downgrade(&self) -> Weak<NodeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<NodeInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("expression", &self.expression())
            .field("active", &self.is_active())
            .field("dirty", &self.is_dirty())
            .field("deps", &self.dependency_count())
            .finish()
    }
}

/// Pushes a node as the evaluation target; on drop pops it, then
/// reconciles the node's deps.
struct EvaluationScope<'a> {
    node: &'a Computation,
    context: Option<EvaluationContext>,
}

impl<'a> EvaluationScope<'a> {
    fn enter(node: &'a Computation) -> Self {
        Self {
            node,
            context: Some(EvaluationContext::enter(Some(node.clone()))),
        }
    }
}

impl Drop for EvaluationScope<'_> {
    fn drop(&mut self) {
        drop(self.context.take());
        self.node.cleanup_deps();
    }
}
