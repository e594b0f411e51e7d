//! Render Effects
//!
//! A render effect ties a pure render function to an apply function:
//!
//! 1. On mount the render function runs against the owning context and its
//!    tree is applied with `previous = Undefined`.
//! 2. When anything the render read changes, the effect is queued. The
//!    flush re-renders and hands `(new_tree, previous_tree)` to apply.
//!
//! The tree is opaque to the runtime; wrap host trees with
//! [`Value::opaque`].

use std::rc::Rc;

use tracing::debug;

use super::value::Value;
use crate::error::{BoxError, ReactiveError};
use crate::graph::{Callback, Computation, GetterSource, Hook, NodeKind, NodeOptions, Scheduler};

#[derive(Clone, Default)]
pub struct RenderOptions {
    /// Runs right before each scheduled re-render.
    pub before: Option<Hook>,

    /// Runs after each flush in which the effect re-rendered.
    pub updated: Option<Hook>,

    /// Re-render inline on every change instead of once per flush.
    pub sync: bool,
}

/// A mounted render effect. Dropping it unmounts.
#[must_use = "dropping a RenderEffect unmounts it"]
pub struct RenderEffect {
    node: Computation,
}

impl RenderEffect {
    /// The most recently applied tree.
    pub fn tree(&self) -> Value {
        self.node.value()
    }

    pub fn node(&self) -> &Computation {
        &self.node
    }

    /// Queue a re-render even though nothing it read changed.
    pub fn force_update(&self) {
        Scheduler::enqueue(&self.node);
    }

    pub fn unmount(self) {}
}

impl Drop for RenderEffect {
    fn drop(&mut self) {
        self.node.teardown();
    }
}

/// Mount `render` against `context`, applying each tree with `apply`.
///
/// An error from the initial render or apply is returned; errors during
/// later re-renders abort that flush and are reported by the coalescer.
pub fn mount<R, A>(
    context: &Value,
    render: R,
    apply: A,
    options: RenderOptions,
) -> Result<RenderEffect, ReactiveError>
where
    R: Fn(&Value) -> Result<Value, BoxError> + 'static,
    A: Fn(&Value, &Value) -> Result<(), BoxError> + 'static,
{
    let apply: Callback = Rc::new(apply);
    let node = Computation::new(
        NodeKind::Render,
        context.clone(),
        GetterSource::func(render),
        Some(apply.clone()),
        NodeOptions {
            sync: options.sync,
            before: options.before,
            updated: options.updated,
            label: Some("render".into()),
            ..NodeOptions::default()
        },
    )?;

    let tree = node.value();
    node.invoke_callback(|new, old| apply(new, old), &tree, &Value::Undefined)?;
    debug!(id = %node.id(), "mounted render effect");
    Ok(RenderEffect { node })
}
