use crate::task::TaskRef;
use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use tracing::trace;

/// The per-thread ready queue.
///
/// This is the single point of dispatch for every wake-up in the runtime:
/// channels, wait groups, joins and yields all make a task runnable by
/// enqueuing a reference here, and nothing ever resumes a task directly.
/// That one rule is what gives the runtime its global ordering guarantee:
/// enqueue order is resume order, strict FIFO, across unrelated subsystems.
///
/// A task may legitimately appear in the queue more than once (woken twice
/// before being dispatched); dispatch resumes it once per pop and the
/// pending-check skips the stale entries.
pub(crate) struct Scheduler {
    queue: RefCell<VecDeque<TaskRef>>,

    /// Set while `run` (or `block_on`) is draining the queue on this thread.
    running: Cell<bool>,
}

impl Scheduler {
    pub(crate) fn new() -> Scheduler {
        Scheduler {
            queue: RefCell::new(VecDeque::new()),
            running: Cell::new(false),
        }
    }

    /// Appends a task to the back of the queue if it still refers to a live,
    /// non-completed task; otherwise does nothing. Never resumes.
    pub(crate) fn enqueue(&self, task: TaskRef) {
        if !task.is_pending() {
            return;
        }
        self.queue.borrow_mut().push_back(task);
    }

    /// Pops and resumes the head of the queue. Returns false when the queue
    /// was empty.
    pub(crate) fn dispatch_one(&self) -> bool {
        let task = self.queue.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task.run();
                true
            }
            None => false,
        }
    }

    /// Drains the queue, resuming tasks in FIFO order until it is empty.
    ///
    /// Tasks enqueued while draining (by wake-ups or spawns out of the tasks
    /// being resumed) are dispatched in the same invocation.
    #[track_caller]
    pub(crate) fn run(&self) {
        self.enter();
        let _running = ScopeGuard::new(|| self.running.set(false));

        trace!("scheduler run");
        while self.dispatch_one() {}
    }

    /// Discards every queued reference without resuming anything.
    pub(crate) fn clear(&self) {
        self.queue.borrow_mut().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Marks the scheduler as draining. Re-entrant draining would resume a
    /// task from inside another task's poll, which breaks the single-resume
    /// rule, so it is refused loudly.
    #[track_caller]
    pub(crate) fn enter(&self) {
        if self.running.replace(true) {
            panic!("a scheduler run is already active on this thread");
        }
    }

    pub(crate) fn exit(&self) {
        self.running.set(false);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Scheduler")
            .field("queued", &self.len())
            .field("running", &self.running.get())
            .finish()
    }
}
