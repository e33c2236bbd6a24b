use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// Suspends the current task *without* rescheduling it, handing its [`Waker`]
/// to `register`.
///
/// This is the bridge for plugging an external event source (a completion
/// ring, an event fd, a UI callback) into the runtime. The contract has
/// three steps:
///
/// 1. `register` stores the waker somewhere the event source can reach;
/// 2. when the event fires, the integrator calls [`Waker::wake`], which
///    enqueues the parked task onto the per-thread scheduler (it never
///    resumes anything inline);
/// 3. shortly after, the integrator drives the scheduler with
///    [`run`](crate::run), typically from an event loop that alternates
///    polling its source and dispatching.
///
/// A task parked this way that is never woken stays suspended until its
/// handle is dropped.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use std::task::Waker;
///
/// // Stand-in for an external event source's registration list.
/// let slot: Rc<RefCell<Option<Waker>>> = Rc::default();
///
/// let parked = {
///     let slot = slot.clone();
///     coterie::spawn(async move {
///         coterie::future::park(|waker| *slot.borrow_mut() = Some(waker)).await;
///     })
/// };
///
/// coterie::run();
/// assert!(!parked.is_done(), "parked until the event fires");
///
/// // The "event" fires: wake, then drive the scheduler.
/// slot.borrow_mut().take().unwrap().wake();
/// coterie::run();
/// assert!(parked.is_done());
/// ```
pub fn park<F>(register: F) -> Park<F>
where
    F: FnOnce(Waker),
{
    Park {
        register: Some(register),
    }
}

/// Future returned by [`park`].
#[derive(Debug)]
pub struct Park<F> {
    register: Option<F>,
}

impl<F> Unpin for Park<F> {}

impl<F> Future for Park<F>
where
    F: FnOnce(Waker),
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().register.take() {
            Some(register) => {
                register(cx.waker().clone());
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as coterie;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_parked_task_stays_suspended() -> Result<()> {
        let task = coterie::spawn(async {
            park(|_waker| { /* dropped: never woken */ }).await;
        });

        coterie::run();
        assert!(!task.is_done());
        Ok(())
    }

    #[test]
    fn test_external_wake_resumes_through_the_scheduler() -> Result<()> {
        let stored: Rc<RefCell<Option<std::task::Waker>>> = Rc::default();

        let task = {
            let stored = stored.clone();
            coterie::spawn(async move {
                park(|waker| *stored.borrow_mut() = Some(waker)).await;
            })
        };

        coterie::run();
        let waker = stored.borrow_mut().take().expect("waker must be registered");

        // Waking enqueues; nothing runs until the scheduler is driven.
        waker.wake();
        assert!(!task.is_done());

        coterie::run();
        assert!(task.is_done());
        Ok(())
    }

    #[test]
    fn test_wake_after_task_dropped_is_skipped() -> Result<()> {
        let stored: Rc<RefCell<Option<std::task::Waker>>> = Rc::default();

        let task = {
            let stored = stored.clone();
            coterie::spawn(async move {
                park(|waker| *stored.borrow_mut() = Some(waker)).await;
            })
        };

        coterie::run();
        drop(task);

        // The stored waker now dangles; waking it must be a harmless no-op.
        stored.borrow_mut().take().unwrap().wake();
        coterie::run();
        Ok(())
    }
}
