use crate::task::Id;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A failure captured from a task that panicked.
///
/// When a task panics, the runtime catches the unwind at the task's terminal
/// suspension and stores the payload in the task's state instead of aborting
/// the scheduler. The same failure is observable from two places:
///
/// - [`Task::failure`] returns a clone of it without raising;
/// - awaiting [`Task::join`] resolves to `Err(JoinError)` in every joiner.
///
/// The payload is shared, so any number of joiners observe the one original
/// panic. `JoinError` is not `Send`: the runtime is per-thread and failures
/// never cross threads.
///
/// [`Task::failure`]: crate::task::Task::failure
/// [`Task::join`]: crate::task::Task::join
#[derive(Clone)]
pub struct JoinError {
    id: Id,
    payload: Rc<Box<dyn Any + Send + 'static>>,
}

impl JoinError {
    pub(crate) fn panic(id: Id, payload: Box<dyn Any + Send + 'static>) -> JoinError {
        JoinError {
            id,
            payload: Rc::new(payload),
        }
    }

    /// The [`Id`] of the task that failed.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The panic message, if the payload was a string.
    ///
    /// `panic!("boom")` and `panic!("{x}")` both produce string payloads;
    /// [`std::panic::panic_any`] with another type does not, in which case
    /// this returns `None` and the payload is only reachable through
    /// [`into_panic`](Self::into_panic).
    pub fn panic_message(&self) -> Option<&str> {
        payload_message(&**self.payload)
    }

    /// Consumes the error, returning the panic payload so the caller can
    /// re-raise it with [`std::panic::resume_unwind`].
    ///
    /// If other clones of this error are still alive (another joiner, or the
    /// task's own captured state), the original payload cannot be moved out;
    /// a boxed copy of the panic message is returned instead.
    pub fn into_panic(self) -> Box<dyn Any + Send + 'static> {
        match Rc::try_unwrap(self.payload) {
            Ok(payload) => payload,
            Err(shared) => match payload_message(&**shared) {
                Some(msg) => Box::new(msg.to_owned()),
                None => Box::new("task panicked"),
            },
        }
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Some(s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Some(s)
    } else {
        None
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.panic_message() {
            Some(msg) => write!(f, "task {} panicked with message {msg:?}", self.id),
            None => write!(f, "task {} panicked", self.id),
        }
    }
}

impl fmt::Debug for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JoinError::Panic({})", self.id)
    }
}

impl std::error::Error for JoinError {}
