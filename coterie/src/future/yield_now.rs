use std::pin::Pin;
use std::task::{Context, Poll};

/// Suspends the current task and immediately reschedules it.
///
/// # Cooperative multitasking
///
/// coterie uses cooperative scheduling: a task that runs a long computation
/// without awaiting anything starves every other task on the thread.
/// `yield_now` lets a task voluntarily suspend itself, giving the scheduler a
/// chance to dispatch the tasks already in the ready queue before coming back
/// to this one. The task goes to the back of the queue, not the front.
///
/// # Examples
///
/// ```
/// use coterie::future::yield_now;
///
/// # coterie::block_on(async {
/// for i in 0..1_000 {
///     // Heavy computation...
///
///     if i % 100 == 0 {
///         // Let other tasks run every 100 iterations
///         yield_now().await;
///     }
/// }
/// # });
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow {
        awaiting_first_poll: true,
    }
}

/// Future returned by [`yield_now`].
#[derive(Debug, Clone, Copy)]
pub struct YieldNow {
    awaiting_first_poll: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Only yield on first poll. Next time the task is dispatched we will
        // return.
        if self.awaiting_first_poll {
            self.awaiting_first_poll = false;
            cx.waker().wake_by_ref();
            Poll::Pending
        } else {
            Poll::Ready(())
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
    fn test_yield_goes_to_the_back_of_the_queue() -> Result<()> {
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let order = order.clone();
            coterie::spawn(async move {
                order.borrow_mut().push("first:a");
                yield_now().await;
                order.borrow_mut().push("first:b");
            })
        };
        let second = {
            let order = order.clone();
            coterie::spawn(async move {
                order.borrow_mut().push("second");
            })
        };

        coterie::run();

        assert!(first.is_done() && second.is_done());
        assert_eq!(*order.borrow(), vec!["first:a", "second", "first:b"]);
        Ok(())
    }
}
