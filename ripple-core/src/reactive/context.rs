//! Evaluation Context
//!
//! Tracks which computation is currently evaluating. When a reactive field
//! is read, its dep asks the context for the current target and registers
//! it as a subscriber. This is the only way dependencies are discovered.
//!
//! # Implementation
//!
//! A thread-local stack. Evaluating a computation pushes it; the guard
//! returned by [`EvaluationContext::enter`] pops it on drop, so the stack
//! stays balanced even if the getter panics. A computed value read from
//! inside a render getter pushes on top of the render node and restores it
//! afterwards.
//!
//! An entry of `None` suspends tracking without losing the outer target;
//! see [`untracked`].

use std::cell::RefCell;

use crate::graph::{Computation, NodeId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Computation>>> = RefCell::new(Vec::new());
}

/// Guard that pops the evaluation target when dropped.
#[must_use = "the evaluation target is popped as soon as the guard is dropped"]
pub struct EvaluationContext {
    target: Option<NodeId>,
}

impl EvaluationContext {
    /// Make `target` the current evaluation target until the guard drops.
    ///
    /// `None` suspends dependency collection.
    pub fn enter(target: Option<Computation>) -> Self {
        let id = target.as_ref().map(Computation::id);
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { target: id }
    }

    /// True if reads should register dependencies right now.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The computation currently collecting dependencies, if any.
    pub fn current() -> Option<Computation> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Number of entries on the stack.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for EvaluationContext {
    fn drop(&mut self) {
        let popped = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(Computation::id),
                self.target,
                "EvaluationContext mismatch"
            );
        }
    }
}

/// Run `f` without registering any dependency, even inside an evaluation.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = EvaluationContext::enter(None);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GetterSource, NodeKind, NodeOptions};
    use crate::reactive::Value;

    fn idle_node() -> Computation {
        Computation::new(
            NodeKind::User,
            Value::Undefined,
            GetterSource::func(|_| Ok(Value::Undefined)),
            None,
            NodeOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn context_tracks_target() {
        let node = idle_node();

        assert!(!EvaluationContext::is_active());
        assert!(EvaluationContext::current().is_none());

        {
            let _ctx = EvaluationContext::enter(Some(node.clone()));
            assert!(EvaluationContext::is_active());
            assert_eq!(EvaluationContext::current().map(|n| n.id()), Some(node.id()));
        }

        assert!(!EvaluationContext::is_active());
        assert_eq!(EvaluationContext::depth(), 0);
    }

    #[test]
    fn nested_contexts_restore_outer_target() {
        let outer = idle_node();
        let inner = idle_node();

        let _ctx1 = EvaluationContext::enter(Some(outer.clone()));
        {
            let _ctx2 = EvaluationContext::enter(Some(inner.clone()));
            assert_eq!(EvaluationContext::current().map(|n| n.id()), Some(inner.id()));
        }
        assert_eq!(EvaluationContext::current().map(|n| n.id()), Some(outer.id()));
    }

    #[test]
    fn untracked_suspends_collection() {
        let node = idle_node();
        let _ctx = EvaluationContext::enter(Some(node));

        let inside = untracked(|| (EvaluationContext::is_active(), EvaluationContext::depth()));
        assert_eq!(inside, (false, 2));
        assert!(EvaluationContext::is_active());
    }
}
