use crate::runtime::scheduler::Scheduler;
use crate::task::Id;
use std::cell::{Cell, OnceCell};
use std::rc::Rc;
use std::thread_local;

/// Per-thread runtime state.
///
/// Every thread gets its own scheduler; two threads running coterie code are
/// completely independent and share nothing. The context is created lazily on
/// first use and lives for the rest of the thread.
struct Context {
    scheduler: Rc<Scheduler>,

    /// Id of the task currently being polled, if any.
    current_task_id: Cell<Option<Id>>,
}

thread_local! {
    static CONTEXT: OnceCell<Context> = const { OnceCell::new() };
}

#[inline(always)]
fn with_context<F, R>(f: F) -> R
where
    F: FnOnce(&Context) -> R,
{
    CONTEXT.with(|ctx| {
        f(ctx.get_or_init(|| Context {
            scheduler: Rc::new(Scheduler::new()),
            current_task_id: Cell::new(None),
        }))
    })
}

#[inline(always)]
pub(crate) fn with_scheduler<F, R>(f: F) -> R
where
    F: FnOnce(&Rc<Scheduler>) -> R,
{
    with_context(|ctx| f(&ctx.scheduler))
}

pub(crate) fn current_task_id() -> Option<Id> {
    with_context(|ctx| ctx.current_task_id.get())
}

pub(crate) fn set_current_task_id(id: Option<Id>) -> Option<Id> {
    with_context(|ctx| ctx.current_task_id.replace(id))
}
