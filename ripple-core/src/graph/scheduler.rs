//! Update Scheduler
//!
//! Collects invalidated computations and runs them once per tick.
//!
//! # Algorithm
//!
//! 1. `enqueue` appends a node unless it is already pending. The first
//!    enqueue since the last flush schedules exactly one flush through the
//!    task coalescer.
//! 2. `flush` sorts the queue by node id. Ids grow in creation order, so a
//!    parent (created first) runs before its children, and a component's
//!    user watchers run before its render node.
//! 3. The queue is walked with a live cursor because running a node may
//!    enqueue more nodes. Those are spliced in after the cursor at the
//!    position their id dictates.
//! 4. A node that keeps re-enqueueing itself is abandoned for the rest of
//!    the flush once it exceeds [`MAX_UPDATE_COUNT`] re-runs.
//! 5. Bookkeeping is reset to idle **before** post-flush hooks run, so
//!    mutations made by those hooks start a fresh cycle.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::node::{Computation, NodeId, NodeKind};
use crate::error::{warn, ReactiveError, Warning};
use crate::tick;

/// Re-runs allowed per node within one flush.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Hook called after every flush with the computations that ran, in run
/// order.
pub type FlushHook = Rc<dyn Fn(&[Computation])>;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Computation>,
    has: HashSet<NodeId>,
    circular: HashMap<NodeId, usize>,
    abandoned: HashSet<NodeId>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static POST_FLUSH_HOOKS: RefCell<Vec<FlushHook>> = const { RefCell::new(Vec::new()) };
}

/// The per-thread update queue.
pub struct Scheduler;

impl Scheduler {
    /// Queue `node` for the next flush.
    pub fn enqueue(node: &Computation) {
        let id = node.id();
        let first = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.has.contains(&id) || state.abandoned.contains(&id) {
                return false;
            }
            state.has.insert(id);

            if state.flushing {
                let mut i = state.queue.len();
                while i > state.index + 1 && state.queue[i - 1].id() > id {
                    i -= 1;
                }
                state.queue.insert(i, node.clone());
            } else {
                state.queue.push(node.clone());
            }

            !mem::replace(&mut state.waiting, true)
        });

        trace!(id = %id, "enqueued");
        if first {
            tick::schedule(Scheduler::flush);
        }
    }

    /// Run every pending computation.
    ///
    /// Normally called by the task coalescer. A failing render or computed
    /// node aborts the flush; the queue is still reset and the error is
    /// returned.
    pub fn flush() -> Result<(), ReactiveError> {
        let pending = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.flushing {
                return None;
            }
            state.flushing = true;
            state.index = 0;
            state.queue.sort_by_key(Computation::id);
            Some(state.queue.len())
        });
        let Some(pending) = pending else {
            return Ok(());
        };
        debug!(pending, "flush start");

        let mut ran: IndexMap<NodeId, Computation> = IndexMap::new();
        {
            let _reset = ResetGuard;
            while let Some(node) = Self::next() {
                let id = node.id();
                if !Self::is_abandoned(id) {
                    node.run_before_hook();
                    node.run()?;
                    ran.entry(id).or_insert_with(|| node.clone());
                    Self::check_runaway(&node);
                }
                STATE.with(|state| state.borrow_mut().index += 1);
            }
        }

        let ran: Vec<Computation> = ran.into_values().collect();
        debug!(ran = ran.len(), "flush done");

        for node in ran.iter().rev() {
            if node.kind() == NodeKind::Render && node.is_active() {
                node.run_updated_hook();
            }
        }
        let hooks = POST_FLUSH_HOOKS.with(|hooks| hooks.borrow().clone());
        for hook in hooks {
            hook(&ran);
        }
        Ok(())
    }

    /// Node under the cursor, marked as no longer pending.
    fn next() -> Option<Computation> {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            let node = state.queue.get(state.index).cloned()?;
            state.has.remove(&node.id());
            Some(node)
        })
    }

    fn is_abandoned(id: NodeId) -> bool {
        STATE.with(|state| state.borrow().abandoned.contains(&id))
    }

    fn check_runaway(node: &Computation) {
        let id = node.id();
        let runaway = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&id) {
                return false;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            if *count > MAX_UPDATE_COUNT {
                state.abandoned.insert(id);
                true
            } else {
                false
            }
        });
        if runaway {
            warn(Warning::RunawayUpdate {
                id,
                kind: node.kind(),
                expression: node.expression().to_string(),
            });
        }
    }

    /// True while a flush is in progress.
    pub fn is_flushing() -> bool {
        STATE.with(|state| state.borrow().flushing)
    }

    /// True between the first enqueue and the end of the flush.
    pub fn is_waiting() -> bool {
        STATE.with(|state| state.borrow().waiting)
    }

    /// Number of nodes waiting to run.
    pub fn pending_len() -> usize {
        STATE.with(|state| state.borrow().has.len())
    }
}

/// Register a hook to run after every flush on this thread.
pub fn add_post_flush_hook<F>(hook: F)
where
    F: Fn(&[Computation]) + 'static,
{
    POST_FLUSH_HOOKS.with(|hooks| hooks.borrow_mut().push(Rc::new(hook)));
}

pub fn clear_post_flush_hooks() {
    POST_FLUSH_HOOKS.with(|hooks| hooks.borrow_mut().clear());
}

/// Resets the queue to idle when the flush ends, including by error.
struct ResetGuard;

impl Drop for ResetGuard {
    fn drop(&mut self) {
        let queue = STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.has.clear();
            state.circular.clear();
            state.abandoned.clear();
            state.waiting = false;
            state.flushing = false;
            state.index = 0;
            mem::take(&mut state.queue)
        });
        // Dropped outside the borrow; a node's drop may touch other state.
        drop(queue);
    }
}
