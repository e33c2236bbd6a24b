use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Wake;

/// Waker state for the root future driven by `block_on`.
///
/// There are two flavors of waker in the codebase: tasks get one that
/// enqueues them onto the ready queue (`task::waker`), while the root future
/// is not a task and is polled directly by the `block_on` loop. Waking it
/// just raises this flag, and the loop polls the root again on its next
/// pass. The flag starts raised so the root is always polled at least once.
pub(crate) struct RootWoken(AtomicBool);

impl RootWoken {
    pub(crate) fn new() -> RootWoken {
        RootWoken(AtomicBool::new(true))
    }

    /// Lowers the flag, returning whether it was raised.
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Wake for RootWoken {
    fn wake(self: Arc<Self>) {
        Self::wake_by_ref(&self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.store(true, Ordering::Relaxed);
    }
}
