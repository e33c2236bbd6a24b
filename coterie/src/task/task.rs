use crate::context;
use crate::task::id::TaskIdGuard;
use crate::task::{Id, Join, JoinError, waker};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};
use tracing::trace;

/// The state every reference to a task points at: the suspended frame, the
/// terminal flags, and the tasks waiting on completion.
///
/// The frame slot does double duty: `None` while `completed` is false means
/// the task is being polled right now, which is how a re-entrant dispatch
/// (the same task appearing twice in the ready queue) is detected and
/// skipped.
pub(crate) struct Core {
    id: Id,

    /// The task's owned frame. Dropped at terminal suspension so values
    /// captured across await points are released as soon as the task ends.
    frame: Option<Pin<Box<dyn Future<Output = ()>>>>,

    /// Set exactly once, at terminal suspension.
    completed: bool,

    /// Captured failure, if the frame panicked.
    failure: Option<JoinError>,

    /// Tasks blocked on [`Task::join`], woken in enrolment order when this
    /// task completes.
    join_waiters: VecDeque<Waker>,
}

/// An owned handle to a cooperative task.
///
/// A `Task` is created suspended at its entry point; nothing runs until the
/// task is enqueued with [`start`](Task::start) (or created through
/// [`spawn`](crate::spawn), which starts it immediately) and the scheduler is
/// driven by [`run`](crate::run) or [`block_on`](crate::block_on).
///
/// The handle exclusively owns the task's frame: dropping the handle of a
/// task that has not completed destroys the frame, and anything still
/// enrolled in a wait queue for it is skipped when woken.
///
/// # Examples
///
/// ```
/// let task = coterie::spawn(async {
///     // some work here
/// });
///
/// coterie::run();
/// assert!(task.is_done());
/// ```
pub struct Task {
    core: Rc<RefCell<Core>>,
    started: Cell<bool>,
}

impl Task {
    /// Creates a new task, suspended at its entry point.
    ///
    /// The initial suspension is what makes wiring-before-start possible: the
    /// handle can be stored, joined against, or passed around before any user
    /// code has run. Call [`start`](Task::start) to enqueue the task for its
    /// first resumption, or use [`spawn`](crate::spawn) to do both at once.
    pub fn new<F>(future: F) -> Task
    where
        F: Future<Output = ()> + 'static,
    {
        let id = Id::next();
        trace!(task.id = %id, "task created");

        Task {
            core: Rc::new(RefCell::new(Core {
                id,
                frame: Some(Box::pin(future)),
                completed: false,
                failure: None,
                join_waiters: VecDeque::new(),
            })),
            started: Cell::new(false),
        }
    }

    /// Enqueues the task for its first resumption.
    ///
    /// The task transitions from suspended to ready; it runs when the
    /// scheduler next dispatches it. Calling `start` again is a no-op.
    pub fn start(&self) {
        if self.started.replace(true) {
            return;
        }
        context::with_scheduler(|s| s.enqueue(self.task_ref()));
    }

    /// Returns the task's unique [`Id`].
    pub fn id(&self) -> Id {
        self.core.borrow().id
    }

    /// Whether the task has reached its terminal suspension.
    pub fn is_done(&self) -> bool {
        self.core.borrow().completed
    }

    /// The task's captured failure, if it panicked.
    ///
    /// Returns `None` while the task is still running and after a successful
    /// completion. This never raises; to have the failure propagate into the
    /// caller, await [`join`](Task::join) instead.
    pub fn failure(&self) -> Option<JoinError> {
        self.core.borrow().failure.clone()
    }

    /// Returns a future that resolves when the task completes.
    ///
    /// Resolves immediately if the task is already done. Any number of tasks
    /// may join the same target; they are all woken, in the order they began
    /// waiting, when it completes. The result carries the target's captured
    /// failure, so a panicking task fails its joiners rather than vanishing.
    ///
    /// # Examples
    ///
    /// ```
    /// coterie::block_on(async {
    ///     let task = coterie::spawn(async {
    ///         coterie::future::yield_now().await;
    ///     });
    ///
    ///     task.join().await.expect("task panicked");
    /// });
    /// ```
    pub fn join(&self) -> Join {
        Join::new(Rc::downgrade(&self.core))
    }

    pub(crate) fn task_ref(&self) -> TaskRef {
        TaskRef::new(Rc::downgrade(&self.core))
    }

    pub(crate) fn mark_started(&self) {
        self.started.set(true);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Task").field("id", &self.id()).finish()
    }
}

/// A non-owning reference to a task, as stored in the ready queue.
///
/// Dispatch is check-then-skip: a reference whose task was dropped, already
/// completed, or is currently being polled resolves to a no-op.
pub(crate) struct TaskRef {
    core: Weak<RefCell<Core>>,
}

impl TaskRef {
    pub(crate) fn new(core: Weak<RefCell<Core>>) -> TaskRef {
        TaskRef { core }
    }

    /// Whether this still refers to a live, non-completed task.
    pub(crate) fn is_pending(&self) -> bool {
        match self.core.upgrade() {
            Some(core) => !core.borrow().completed,
            None => false,
        }
    }

    /// Resumes the task once: polls the frame, re-suspends it on `Pending`,
    /// and completes it (capturing a panic, draining joiners) otherwise.
    pub(crate) fn run(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };

        let (id, mut frame) = {
            let mut inner = core.borrow_mut();
            if inner.completed {
                return;
            }
            let Some(frame) = inner.frame.take() else {
                return;
            };
            (inner.id, frame)
        };

        let waker = waker::waker(Rc::downgrade(&core));
        let mut cx = Context::from_waker(&waker);

        let _id = TaskIdGuard::enter(id);
        let polled = panic::catch_unwind(AssertUnwindSafe(|| frame.as_mut().poll(&mut cx)));

        match polled {
            Ok(Poll::Pending) => {
                core.borrow_mut().frame = Some(frame);
            }
            Ok(Poll::Ready(())) => complete(&core, None),
            Err(payload) => complete(&core, Some(JoinError::panic(id, payload))),
        }
    }
}

/// Terminal suspension: marks the task completed, captures the failure, and
/// wakes every join-waiter in enrolment order. The frame is gone by the time
/// this runs.
fn complete(core: &Rc<RefCell<Core>>, failure: Option<JoinError>) {
    let waiters: SmallVec<[Waker; 4]> = {
        let mut inner = core.borrow_mut();
        inner.completed = true;
        inner.failure = failure;
        trace!(task.id = %inner.id, failed = inner.failure.is_some(), "task completed");
        inner.join_waiters.drain(..).collect()
    };

    for waiter in waiters {
        waiter.wake();
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        // A handle dropped before completion strands its joiners in a queue
        // that is about to disappear. Wake them so they observe the task as
        // gone rather than hang forever.
        for waiter in self.join_waiters.drain(..) {
            waiter.wake();
        }
    }
}

impl Core {
    pub(crate) fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn failure(&self) -> Option<JoinError> {
        self.failure.clone()
    }

    pub(crate) fn join_waiters_mut(&mut self) -> &mut VecDeque<Waker> {
        &mut self.join_waiters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as coterie;
    use anyhow::Result;
    use static_assertions::assert_not_impl_any;
    use std::rc::Rc;

    // The runtime is per-thread; none of its handles may cross threads.
    assert_not_impl_any!(Task: Send, Sync);

    #[test]
    fn test_new_task_is_suspended_until_started() -> Result<()> {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();

        let task = Task::new(async move { flag.set(true) });
        coterie::run();
        assert!(!ran.get(), "unstarted task must not run");
        assert!(!task.is_done());

        task.start();
        coterie::run();
        assert!(ran.get());
        assert!(task.is_done());
        Ok(())
    }

    #[test]
    fn test_start_is_idempotent() -> Result<()> {
        let polls = Rc::new(Cell::new(0));
        let counter = polls.clone();

        let task = Task::new(async move { counter.set(counter.get() + 1) });
        task.start();
        task.start();
        coterie::run();

        assert_eq!(polls.get(), 1);
        assert!(task.is_done());
        Ok(())
    }

    #[test]
    fn test_failure_is_captured_not_propagated() -> Result<()> {
        let task = coterie::spawn(async { panic!("boom") });

        // The scheduler keeps running; the panic is captured in the task.
        coterie::run();

        assert!(task.is_done());
        let failure = task.failure().expect("failure must be captured");
        assert_eq!(failure.panic_message(), Some("boom"));
        assert_eq!(failure.id(), task.id());
        Ok(())
    }

    #[test]
    fn test_sibling_survives_task_failure() -> Result<()> {
        let finished = Rc::new(Cell::new(false));
        let flag = finished.clone();

        let failing = coterie::spawn(async { panic!("E") });
        let sibling = coterie::spawn(async move {
            coterie::future::yield_now().await;
            flag.set(true);
        });

        coterie::run();

        assert!(failing.failure().is_some());
        assert!(sibling.is_done());
        assert!(sibling.failure().is_none());
        assert!(finished.get());
        Ok(())
    }

    #[test]
    fn test_dropping_handle_destroys_frame() -> Result<()> {
        struct SetOnDrop(Rc<Cell<bool>>);
        impl Drop for SetOnDrop {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let witness = SetOnDrop(dropped.clone());

        let task = coterie::spawn(async move {
            let _witness = witness;
            // Park forever; nobody will wake us.
            std::future::pending::<()>().await;
        });

        coterie::run();
        assert!(!task.is_done());
        assert!(!dropped.get());

        drop(task);
        assert!(dropped.get(), "frame must be destroyed with the handle");
        Ok(())
    }
}
