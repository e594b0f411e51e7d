//! Reactive State
//!
//! This module implements the state side of the runtime: values, the
//! per-field dependency ledgers, and the observer that instruments
//! containers so reads and writes drive dependency tracking.
//!
//! # Concepts
//!
//! ## Deps
//!
//! Every reactive field and every observed container owns a [`Dep`]. Reading
//! the field inside an evaluation subscribes the evaluating computation;
//! writing a different value notifies every subscriber.
//!
//! ## Observers
//!
//! [`observe`] walks a container and converts each field into a reactive
//! one. Arrays are observed element-wise and report their own mutations.
//! New keys and index writes go through [`set`] and [`delete`].
//!
//! ## Front-end
//!
//! [`Computed`], [`watch`] and [`mount`] wrap computation nodes from
//! [`crate::graph`] with handles that tear the node down on drop.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded. Handles are `Rc`-based and the
//! evaluation stack, observation switch and scheduler live in thread-locals.

mod array;
mod computed;
mod context;
mod dep;
mod object;
mod observer;
mod property;
mod render;
mod traverse;
mod value;
mod watch;

pub use array::Array;
pub use computed::{define_computed, define_writable_computed, Computed};
pub use context::{untracked, EvaluationContext};
pub use dep::{Dep, DepId};
pub use object::{Accessor, Object};
pub use observer::{
    delete, is_observing, observe, observe_root, set, toggle_observing, without_observing, Observer,
    MAX_ARRAY_INDEX,
};
pub use property::define_reactive;
pub use render::{mount, RenderEffect, RenderOptions};
pub use traverse::traverse;
pub use value::{Key, Value};
pub use watch::{watch, WatchOptions, Watcher};
