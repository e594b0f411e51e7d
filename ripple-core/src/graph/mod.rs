//! Computation Graph
//!
//! The derived side of the runtime: computation nodes and the scheduler
//! that re-runs them.
//!
//! # Overview
//!
//! Edges are discovered, never declared. A node evaluating its getter is
//! the current evaluation target; every reactive read during that
//! evaluation subscribes it to the read field's dep. When a dep notifies,
//! each subscriber either marks itself dirty (unread computed values), runs
//! inline (sync nodes) or is queued for the next flush.
//!
//! # Design Decisions
//!
//! 1. Edges live in the deps, not in a central graph. A node holds strong
//!    handles to its deps; a dep holds weak handles to its subscribers.
//!
//! 2. Node ids come from a process-wide counter, so sorting the queue by id
//!    runs parents before children without a topological sort.
//!
//! 3. One flush per tick. Writes never run reactions inline unless the node
//!    asked to be sync.

mod node;
mod scheduler;

pub use node::{
    default_change_policy, identity_change_policy, parse_path, Callback, ChangePolicy, Computation,
    Getter, GetterSource, Hook, NodeId, NodeKind, NodeOptions,
};
pub(crate) use node::NodeInner;
pub use scheduler::{
    add_post_flush_hook, clear_post_flush_hooks, FlushHook, Scheduler, MAX_UPDATE_COUNT,
};
