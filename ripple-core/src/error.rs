//! Errors and Diagnostics
//!
//! Every failure the runtime can observe is funnelled through one of two
//! choke points:
//!
//! - [`handle_error`] for real errors raised by user code (getters,
//!   reaction callbacks, tick callbacks).
//! - [`warn`] for non-fatal diagnostics such as misuse of the imperative
//!   API or a runaway update loop.
//!
//! Both consult the thread-local [`Config`](crate::config::Config) and fall
//! back to `tracing` when no handler is installed.

use thiserror::Error;

use crate::config;
use crate::graph::{NodeId, NodeKind};

/// Error type returned by user-supplied getters and callbacks.
///
/// Anything that converts into a boxed error works, including `&str` and
/// `String`: `Err("boom".into())`.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors raised while evaluating or reacting.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The getter of a computation failed.
    #[error("error in getter for {kind} \"{expression}\": {source}")]
    Getter {
        kind: NodeKind,
        expression: String,
        #[source]
        source: BoxError,
    },

    /// The reaction callback of a computation failed.
    #[error("error in callback for {kind} \"{expression}\": {source}")]
    Callback {
        kind: NodeKind,
        expression: String,
        #[source]
        source: BoxError,
    },

    /// A callback scheduled with `next_tick` failed.
    #[error("error in nextTick: {source}")]
    Task {
        #[source]
        source: BoxError,
    },
}

impl ReactiveError {
    /// The expression of the computation that raised this error, if any.
    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Getter { expression, .. } | Self::Callback { expression, .. } => {
                Some(expression)
            }
            Self::Task { .. } => None,
        }
    }
}

/// Non-fatal diagnostics. Reported, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    /// A computation kept re-enqueueing itself within one flush.
    #[error("you may have an infinite update loop in {kind} \"{expression}\" ({id})")]
    RunawayUpdate {
        id: NodeId,
        kind: NodeKind,
        expression: String,
    },

    /// `set`/`delete` was called on something that cannot hold properties.
    #[error("cannot {action} reactive property on a non-container value: {target}")]
    NotReactive {
        action: &'static str,
        target: String,
    },

    /// An array index write would grow the array past what can be stored.
    #[error("cannot set array index {index}: the array cannot grow that far")]
    ArrayIndexOutOfRange { index: usize },

    /// `set`/`delete` targeted root data or an internal bookkeeping object.
    #[error("avoid {action} reactive properties on root data at runtime; declare them up front")]
    RootDataMutation { action: &'static str },

    /// A watch path contained characters outside `[A-Za-z0-9_.$]`.
    #[error("failed watching path \"{path}\": only simple dot-delimited paths are accepted")]
    InvalidWatchPath { path: String },

    /// A write hit a get-only accessor such as a computed property.
    #[error("computed property \"{key}\" was assigned to but it has no setter")]
    ComputedAssignment { key: String },

    /// A computed property would shadow an existing field.
    #[error("the computed property \"{key}\" is already defined on its owner")]
    ComputedConflict { key: String },
}

/// Report an error through the configured error handler.
///
/// `info` names where the error surfaced ("watcher getter", "nextTick", ...).
pub fn handle_error(error: ReactiveError, info: &str) {
    match config::error_handler() {
        Some(handler) => handler(&error, info),
        None => tracing::error!(info, error = %error, "unhandled reactive error"),
    }
}

/// Report a diagnostic through the configured warn handler.
pub fn warn(warning: Warning) {
    if config::is_silent() {
        return;
    }
    match config::warn_handler() {
        Some(handler) => handler(&warning),
        None => tracing::warn!("{warning}"),
    }
}
