use crate::context;
use crate::task::task::{Core, TaskRef};
use std::cell::RefCell;
use std::mem::ManuallyDrop;
use std::rc::Weak;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Builds the [`Waker`] handed to a task's frame on every poll.
///
/// The waker wraps a *weak* reference to the task's core: wait queues holding
/// clones of it never keep a dropped task alive, and waking a dead reference
/// is a no-op. `wake` only ever enqueues the task onto the per-thread
/// scheduler; nothing is resumed inline, which is what preserves the global
/// FIFO ordering across channels, wait groups and joins.
//
// Safety: the Waker contract is written for types that can travel between
// threads, but everything here is pinned to a single thread (the whole
// runtime is). We don't want to pay for thread-safe reference counting, so
// let's lie to the compiler instead :) A waker that escapes to another thread
// is already unsupported use of the runtime.
pub(crate) fn waker(core: Weak<RefCell<Core>>) -> Waker {
    unsafe { Waker::from_raw(raw_waker(core)) }
}

fn raw_waker(core: Weak<RefCell<Core>>) -> RawWaker {
    RawWaker::new(Weak::into_raw(core) as *const (), &VTABLE)
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_waker);

unsafe fn clone(data: *const ()) -> RawWaker {
    let core = ManuallyDrop::new(unsafe { Weak::from_raw(data as *const RefCell<Core>) });
    raw_waker((*core).clone())
}

unsafe fn wake(data: *const ()) {
    let core = unsafe { Weak::from_raw(data as *const RefCell<Core>) };
    context::with_scheduler(|s| s.enqueue(TaskRef::new(core)));
}

unsafe fn wake_by_ref(data: *const ()) {
    let core = ManuallyDrop::new(unsafe { Weak::from_raw(data as *const RefCell<Core>) });
    context::with_scheduler(|s| s.enqueue(TaskRef::new((*core).clone())));
}

unsafe fn drop_waker(data: *const ()) {
    drop(unsafe { Weak::from_raw(data as *const RefCell<Core>) });
}
