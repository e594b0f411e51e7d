//! Task Coalescer
//!
//! Batches many "run this later" requests into a single drain on a future
//! turn. The scheduler uses it to flush once per tick no matter how many
//! writes happened; user code reaches it through [`next_tick`] and [`tick`].
//!
//! # Executors
//!
//! How "a future turn" is realised is up to the thread's [`Executor`]:
//!
//! - [`ManualExecutor`] (the default) parks turns in two queues that the
//!   host drains with [`run_until_idle`]. Micro turns always run before the
//!   next macro turn.
//! - [`TokioExecutor`] spawns each turn on the current `LocalSet`; macro
//!   turns yield once first so already-queued tasks interleave ahead of them.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use smallvec::SmallVec;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{handle_error, BoxError, ReactiveError};

/// Granularity of the asynchronous primitive used for a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSource {
    /// Runs before any pending macro turn.
    Micro,
    /// Runs after already-queued work, interleaving with external dispatch.
    Macro,
}

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce()>;

/// Arranges for a job to run on a future turn of the host event loop.
pub trait Executor {
    fn defer(&self, source: TaskSource, job: Job);
}

type Task = Box<dyn FnOnce() -> Result<(), ReactiveError>>;

#[derive(Default)]
struct Coalescer {
    callbacks: SmallVec<[Task; 4]>,
    pending: bool,
}

thread_local! {
    static COALESCER: RefCell<Coalescer> = RefCell::new(Coalescer::default());
    static USE_MACRO: Cell<bool> = const { Cell::new(false) };
    static DEFAULT_EXECUTOR: Rc<ManualExecutor> = Rc::new(ManualExecutor::new());
    static EXECUTOR: RefCell<Option<Rc<dyn Executor>>> = const { RefCell::new(None) };
}

/// Append `task` to the pending callbacks, scheduling a drain if none is
/// scheduled yet.
pub(crate) fn schedule<F>(task: F)
where
    F: FnOnce() -> Result<(), ReactiveError> + 'static,
{
    let first = COALESCER.with(|coalescer| {
        let mut coalescer = coalescer.borrow_mut();
        coalescer.callbacks.push(Box::new(task));
        !mem::replace(&mut coalescer.pending, true)
    });
    if !first {
        return;
    }

    let source = if USE_MACRO.with(Cell::get) {
        TaskSource::Macro
    } else {
        TaskSource::Micro
    };
    trace!(?source, "scheduling drain");
    current_executor().defer(source, Box::new(flush_callbacks));
}

fn flush_callbacks() {
    let callbacks = COALESCER.with(|coalescer| {
        let mut coalescer = coalescer.borrow_mut();
        coalescer.pending = false;
        mem::take(&mut coalescer.callbacks)
    });
    debug!(callbacks = callbacks.len(), "draining tick callbacks");

    for callback in callbacks {
        if let Err(err) = callback() {
            handle_error(err, "nextTick");
        }
    }
}

/// Run `callback` on the next drain.
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() + 'static,
{
    schedule(move || {
        callback();
        Ok(())
    });
}

/// Run a fallible `callback` on the next drain. An error is reported
/// through [`handle_error`] and does not stop the other callbacks.
pub fn try_next_tick<F, E>(callback: F)
where
    F: FnOnce() -> Result<(), E> + 'static,
    E: Into<BoxError>,
{
    schedule(move || callback().map_err(|err| ReactiveError::Task { source: err.into() }));
}

/// A future that resolves once the next drain has run every callback
/// scheduled before it.
pub fn tick() -> NextTick {
    let (tx, rx) = oneshot::channel();
    schedule(move || {
        let _ = tx.send(());
        Ok(())
    });
    NextTick {
        rx,
        resolved: false,
    }
}

/// Future returned by [`tick`].
#[must_use = "futures do nothing unless polled"]
pub struct NextTick {
    rx: oneshot::Receiver<()>,
    resolved: bool,
}

impl NextTick {
    /// True once the drain has run, without waiting.
    pub fn try_resolved(&mut self) -> bool {
        if !self.resolved {
            self.resolved = self.rx.try_recv().is_ok();
        }
        self.resolved
    }
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.resolved {
            return Poll::Ready(());
        }
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(_) => {
                self.resolved = true;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Run `f` with drains scheduled inside it using [`TaskSource::Macro`].
pub fn with_macro_task<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(bool);

    impl Drop for Restore {
        fn drop(&mut self) {
            USE_MACRO.with(|flag| flag.set(self.0));
        }
    }

    let _restore = Restore(USE_MACRO.with(|flag| flag.replace(true)));
    f()
}

// ---- Executors ----

/// Install `executor` for this thread.
pub fn set_executor(executor: impl Executor + 'static) {
    EXECUTOR.with(|slot| *slot.borrow_mut() = Some(Rc::new(executor)));
}

/// Go back to the thread's [`ManualExecutor`].
pub fn reset_executor() {
    EXECUTOR.with(|slot| *slot.borrow_mut() = None);
}

fn current_executor() -> Rc<dyn Executor> {
    EXECUTOR
        .with(|slot| slot.borrow().clone())
        .unwrap_or_else(|| default_executor() as Rc<dyn Executor>)
}

/// This thread's manual executor.
pub fn default_executor() -> Rc<ManualExecutor> {
    DEFAULT_EXECUTOR.with(Rc::clone)
}

/// Drain this thread's manual executor. Returns the number of turns run.
pub fn run_until_idle() -> usize {
    default_executor().run_until_idle()
}

/// Executor whose turns run only when the host asks.
#[derive(Default)]
pub struct ManualExecutor {
    micro: RefCell<VecDeque<Job>>,
    macro_turns: RefCell<VecDeque<Job>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run turns until both queues are empty, micro turns first. Turns
    /// deferred while draining run too.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let micro = self.micro.borrow_mut().pop_front();
            let job = match micro {
                Some(job) => job,
                None => match self.macro_turns.borrow_mut().pop_front() {
                    Some(job) => job,
                    None => break,
                },
            };
            job();
            ran += 1;
        }
        ran
    }

    /// Turns waiting in either queue.
    pub fn pending(&self) -> usize {
        self.micro.borrow().len() + self.macro_turns.borrow().len()
    }

    pub fn pending_macro(&self) -> usize {
        self.macro_turns.borrow().len()
    }
}

impl Executor for ManualExecutor {
    fn defer(&self, source: TaskSource, job: Job) {
        match source {
            TaskSource::Micro => self.micro.borrow_mut().push_back(job),
            TaskSource::Macro => self.macro_turns.borrow_mut().push_back(job),
        }
    }
}

/// Executor backed by `tokio::task::spawn_local`. Must be used from inside
/// a `LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn defer(&self, source: TaskSource, job: Job) {
        tokio::task::spawn_local(async move {
            if source == TaskSource::Macro {
                tokio::task::yield_now().await;
            }
            job();
        });
    }
}
