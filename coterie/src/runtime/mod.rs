//! The cooperative runtime: spawning tasks and driving the ready queue.
//!
//! The runtime is per-thread. Exactly one task executes at any instant, and
//! every suspension point hands control back through a single FIFO ready
//! queue; see [`Handle`] for the queue operations and [`block_on`] for the
//! usual entry point.

use crate::context;
use crate::runtime::waker::RootWoken;
use crate::task::Task;
use crate::utils::ScopeGuard;
use std::fmt;
use std::pin::pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

pub(crate) mod scheduler;
use scheduler::Scheduler;

mod waker;


/// A clonable handle to the current thread's scheduler.
///
/// Handles are cheap to clone and cannot leave the thread they were obtained
/// on. They exist so that code can hold on to "its" scheduler explicitly
/// (event-loop integrations in particular want to pair an [`enqueue` via
/// waker](crate::future::park) with a [`run`](Handle::run)), but every
/// operation is also reachable through the free functions in this module.
#[derive(Clone)]
pub struct Handle(Rc<Scheduler>);

impl Handle {
    /// Returns the handle to the current thread's scheduler, creating the
    /// scheduler on first use.
    pub fn current() -> Handle {
        context::with_scheduler(|s| Handle(s.clone()))
    }

    /// Spawns a task onto this scheduler: the task is created and enqueued
    /// for its first resumption. Equivalent to [`Task::new`] followed by
    /// [`Task::start`].
    pub fn spawn<F>(&self, future: F) -> Task
    where
        F: Future<Output = ()> + 'static,
    {
        let task = Task::new(future);
        self.0.enqueue(task.task_ref());
        task.mark_started();
        task
    }

    /// Drains the ready queue, resuming tasks in FIFO order until it is
    /// empty. Tasks enqueued during the drain (wake-ups and spawns made by
    /// the tasks being resumed) are dispatched in the same call.
    ///
    /// A task failure never unwinds out of `run`: panics are captured into
    /// the failing task's state and surfaced through
    /// [`Task::failure`]/[`Task::join`].
    ///
    /// # Panics
    ///
    /// Panics if called from inside a running task, which would resume a
    /// task within another task's poll.
    #[track_caller]
    pub fn run(&self) {
        self.0.run();
    }

    /// Discards every queued task reference without resuming anything.
    /// Queued tasks remain suspended; they run again only if re-enqueued.
    pub fn clear(&self) {
        self.0.clear();
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_tuple("Handle").field(&self.0).finish()
    }
}

/// Spawns a task onto the current thread's scheduler.
///
/// The task starts suspended and is enqueued immediately; it runs when the
/// scheduler is next driven by [`run`] or [`block_on`]. Use
/// [`Task::new`] + [`Task::start`] instead when the handle must be wired up
/// before any user code runs.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let hits = Rc::new(Cell::new(0));
/// let task = {
///     let hits = hits.clone();
///     coterie::spawn(async move { hits.set(hits.get() + 1) })
/// };
///
/// coterie::run();
/// assert!(task.is_done());
/// assert_eq!(hits.get(), 1);
/// ```
pub fn spawn<F>(future: F) -> Task
where
    F: Future<Output = ()> + 'static,
{
    Handle::current().spawn(future)
}

/// Drains the current thread's ready queue. See [`Handle::run`].
#[track_caller]
pub fn run() {
    Handle::current().run();
}

/// Runs a future to completion on the current thread's scheduler.
///
/// The root future is polled whenever it has been woken, interleaved with
/// dispatching ready tasks in FIFO order; `block_on` returns once the root
/// has completed and the ready queue has drained. The root is not itself a
/// task: a panic inside it propagates out of `block_on` (task panics are
/// still captured per task).
///
/// # Panics
///
/// - if called from inside a running task;
/// - if the ready queue drains while the root future is still pending. With
///   no threads and no timers there is nothing left that could wake it, so
///   the program has deadlocked.
///
/// # Examples
///
/// ```
/// let out = coterie::block_on(async {
///     let task = coterie::spawn(async {
///         coterie::future::yield_now().await;
///     });
///     task.join().await.expect("task panicked");
///     17
/// });
/// assert_eq!(out, 17);
/// ```
#[track_caller]
pub fn block_on<F: Future>(root: F) -> F::Output {
    let handle = Handle::current();
    handle.0.enter();
    let _running = ScopeGuard::new(|| handle.0.exit());

    let mut root = pin!(root);
    let woken = Arc::new(RootWoken::new());
    let waker = Waker::from(woken.clone());
    let mut cx = Context::from_waker(&waker);

    let mut output = None;

    loop {
        if woken.take() && output.is_none() {
            if let Poll::Ready(value) = root.as_mut().poll(&mut cx) {
                output = Some(value);
            }
        }

        if !handle.0.dispatch_one() {
            // Quiescent. Either the root was woken by the task we just ran
            // (poll it again), or we are done, or nothing can ever wake it.
            if woken.is_raised() && output.is_none() {
                continue;
            }
            break;
        }
    }

    match output {
        Some(value) => value,
        None => panic!(
            "deadlock: the ready queue is empty but the root future has not completed"
        ),
    }
}
