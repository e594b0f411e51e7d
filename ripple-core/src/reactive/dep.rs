//! Dependency Ledger
//!
//! A [`Dep`] is the subscriber list of one piece of state: a reactive field,
//! an observed container, or a computed node's own value.
//!
//! # Ownership
//!
//! Deps hold their subscribers weakly. A computation holds strong handles to
//! every dep it currently depends on, so the ledger never keeps a dropped
//! computation alive, and a dropped computation removes itself from every
//! ledger on the way out.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tracing::trace;

use super::context::EvaluationContext;
use crate::error::handle_error;
use crate::graph::{Computation, NodeId, NodeInner};

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

struct DepInner {
    id: DepId,
    subscribers: RefCell<IndexMap<NodeId, Weak<NodeInner>>>,
}

/// Subscriber ledger for one piece of state.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

impl Dep {
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            id: DepId::new(),
            subscribers: RefCell::new(IndexMap::new()),
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// Append `node` if it is not already subscribed.
    pub fn add_subscriber(&self, node: &Computation) {
        self.0
            .subscribers
            .borrow_mut()
            .entry(node.id())
            .or_insert_with(|| node.downgrade());
    }

    pub fn remove_subscriber(&self, node: &Computation) {
        self.remove_subscriber_id(node.id());
    }

    pub(crate) fn remove_subscriber_id(&self, id: NodeId) {
        self.0.subscribers.borrow_mut().shift_remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    /// Ids of the current subscribers in registration order.
    pub fn subscriber_ids(&self) -> Vec<NodeId> {
        self.0.subscribers.borrow().keys().copied().collect()
    }

    /// Register the currently evaluating computation, if any, as a subscriber.
    pub fn depend(&self) {
        if let Some(target) = EvaluationContext::current() {
            target.add_dep(self);
        }
    }

    /// Invalidate every subscriber in registration order.
    ///
    /// The subscriber list is snapshotted first; nodes added or removed by
    /// the invalidation hooks do not affect this round.
    pub fn notify(&self) {
        let snapshot: Vec<Computation> = self
            .0
            .subscribers
            .borrow()
            .values()
            .filter_map(Computation::upgrade)
            .collect();

        trace!(dep = %self.id(), subscribers = snapshot.len(), "notify");

        for node in snapshot {
            if let Err(err) = node.on_dependency_changed() {
                handle_error(err, "dep notify");
            }
        }
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscribers", &self.subscriber_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Callback, GetterSource, NodeKind, NodeOptions};
    use crate::reactive::{Object, Value};
    use std::cell::Cell;

    fn node_counting(runs: Rc<Cell<usize>>) -> Computation {
        let options = NodeOptions {
            sync: true,
            ..NodeOptions::default()
        };
        // A fresh object every run always counts as a change.
        Computation::new(
            NodeKind::User,
            Value::Undefined,
            GetterSource::func(|_| Ok(Value::Object(Object::new()))),
            Some(Rc::new(move |_: &Value, _: &Value| {
                runs.set(runs.get() + 1);
                Ok(())
            })),
            options,
        )
        .unwrap()
    }

    #[test]
    fn dep_ids_are_unique() {
        let a = Dep::new();
        let b = Dep::new();
        assert_ne!(a.id(), b.id());
        assert!(b.id() > a.id());
    }

    #[test]
    fn subscribers_are_deduplicated() {
        let dep = Dep::new();
        let node = node_counting(Rc::new(Cell::new(0)));

        dep.add_subscriber(&node);
        dep.add_subscriber(&node);
        assert_eq!(dep.subscriber_count(), 1);

        dep.remove_subscriber(&node);
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn depend_outside_evaluation_is_noop() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_reaches_every_subscriber_in_order() {
        let runs = Rc::new(Cell::new(0));
        let dep = Dep::new();
        let first = node_counting(runs.clone());
        let second = node_counting(runs.clone());
        dep.add_subscriber(&second);
        dep.add_subscriber(&first);

        assert_eq!(dep.subscriber_ids(), vec![second.id(), first.id()]);
        dep.notify();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn subscribers_changed_during_notify_wait_for_the_next_round() {
        let dep = Dep::new();
        let victim_runs = Rc::new(Cell::new(0));
        let newcomer_runs = Rc::new(Cell::new(0));
        let victim = node_counting(victim_runs.clone());
        let newcomer = node_counting(newcomer_runs.clone());

        let (ledger, doomed, joining) = (dep.clone(), victim.clone(), newcomer.clone());
        let callback: Callback = Rc::new(move |_: &Value, _: &Value| {
            doomed.teardown();
            ledger.remove_subscriber(&doomed);
            ledger.add_subscriber(&joining);
            Ok(())
        });
        let first = Computation::new(
            NodeKind::User,
            Value::Undefined,
            GetterSource::func(|_| Ok(Value::Object(Object::new()))),
            Some(callback),
            NodeOptions {
                sync: true,
                ..NodeOptions::default()
            },
        )
        .unwrap();
        dep.add_subscriber(&first);
        dep.add_subscriber(&victim);

        dep.notify();
        assert_eq!(victim_runs.get(), 0);
        assert_eq!(newcomer_runs.get(), 0);
        assert_eq!(dep.subscriber_ids(), vec![first.id(), newcomer.id()]);

        dep.notify();
        assert_eq!(victim_runs.get(), 0);
        assert_eq!(newcomer_runs.get(), 1);
        first.teardown();
    }

    #[test]
    fn dropped_nodes_leave_the_ledger() {
        let dep = Dep::new();
        {
            let source = dep.clone();
            let node = Computation::new(
                NodeKind::User,
                Value::Undefined,
                GetterSource::func(move |_| {
                    source.depend();
                    Ok(Value::Undefined)
                }),
                None,
                NodeOptions::default(),
            )
            .unwrap();
            assert_eq!(dep.subscriber_ids(), vec![node.id()]);
        }
        assert_eq!(dep.subscriber_count(), 0);
    }
}
