//! Ripple Core
//!
//! This crate provides the reactive runtime for the Ripple UI framework.
//! It implements:
//!
//! - Dependency tracking through instrumented object fields
//! - Computation nodes: render effects, lazy computed values, watchers
//! - A batched, ordered update scheduler
//! - A task coalescer that drains the scheduler once per tick
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: values, deps, the deep observer and front-end handles
//! - `graph`: computation nodes and the update scheduler
//! - `tick`: the task coalescer and its executors
//! - `config` and `error`: runtime configuration and diagnostics
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{observe, watch, Value, WatchOptions};
//! use ripple_core::tick;
//! use serde_json::json;
//!
//! let state = Value::from(json!({ "count": 0 }));
//! observe(&state);
//!
//! let watcher = watch(
//!     &state,
//!     "count",
//!     |new, old| {
//!         println!("count: {old:?} -> {new:?}");
//!         Ok(())
//!     },
//!     WatchOptions::default(),
//! )
//! .unwrap();
//!
//! if let Some(object) = state.as_object() {
//!     object.set("count", 1);
//!     object.set("count", 2);
//! }
//!
//! // Both writes are folded into one flush.
//! tick::run_until_idle();
//! assert_eq!(watcher.value(), Value::from(2));
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod tick;

pub use error::{BoxError, ReactiveError, Warning};
pub use reactive::{delete, observe, set, Value};
pub use tick::{next_tick, tick};
