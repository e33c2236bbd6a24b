use std::cell::RefCell;
use std::rc::Rc;

// Exports
pub(crate) mod future;
pub(crate) use future::poll_once;

/// Shared append-only event log for asserting cross-task ordering.
#[derive(Clone, Default)]
pub(crate) struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    pub(crate) fn new() -> EventLog {
        EventLog::default()
    }

    pub(crate) fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}
