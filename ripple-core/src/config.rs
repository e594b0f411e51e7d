//! Runtime Configuration
//!
//! Global knobs for the reactive runtime. The runtime is single-threaded, so
//! configuration lives in a thread-local and every thread starts from
//! [`Config::default`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{ReactiveError, Warning};

/// Handler invoked for every reported [`ReactiveError`].
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, &str)>;

/// Handler invoked for every reported [`Warning`].
pub type WarnHandler = Rc<dyn Fn(&Warning)>;

/// Runtime configuration.
#[derive(Clone, Default)]
pub struct Config {
    /// Suppress all warnings.
    pub silent: bool,

    /// Replaces the default `tracing::error!` reporting.
    pub error_handler: Option<ErrorHandler>,

    /// Replaces the default `tracing::warn!` reporting.
    pub warn_handler: Option<WarnHandler>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("silent", &self.silent)
            .field("error_handler", &self.error_handler.is_some())
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Run `f` with mutable access to this thread's configuration.
pub fn with_config<R>(f: impl FnOnce(&mut Config) -> R) -> R {
    CONFIG.with(|config| f(&mut config.borrow_mut()))
}

/// A copy of this thread's configuration.
pub fn current() -> Config {
    CONFIG.with(|config| config.borrow().clone())
}

/// Install an error handler for this thread.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&ReactiveError, &str) + 'static,
{
    with_config(|config| config.error_handler = Some(Rc::new(handler)));
}

/// Install a warning handler for this thread.
pub fn set_warn_handler<F>(handler: F)
where
    F: Fn(&Warning) + 'static,
{
    with_config(|config| config.warn_handler = Some(Rc::new(handler)));
}

/// Enable or disable warnings.
pub fn set_silent(silent: bool) {
    with_config(|config| config.silent = silent);
}

/// Restore the default configuration.
pub fn reset() {
    with_config(|config| *config = Config::default());
}

// Handlers are cloned out so they can re-enter the config without a
// double borrow.
pub(crate) fn error_handler() -> Option<ErrorHandler> {
    CONFIG.with(|config| config.borrow().error_handler.clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    CONFIG.with(|config| config.borrow().warn_handler.clone())
}

pub(crate) fn is_silent() -> bool {
    CONFIG.with(|config| config.borrow().silent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_loud_and_unhandled() {
        let config = current();
        assert!(!config.silent);
        assert!(config.error_handler.is_none());
        assert!(config.warn_handler.is_none());
    }

    #[test]
    fn reset_clears_handlers() {
        set_warn_handler(|_| {});
        set_silent(true);
        assert!(current().warn_handler.is_some());

        reset();
        let config = current();
        assert!(!config.silent);
        assert!(config.warn_handler.is_none());
    }
}
