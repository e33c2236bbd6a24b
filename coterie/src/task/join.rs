use crate::task::JoinError;
use crate::task::task::Core;
use std::cell::RefCell;
use std::fmt;
use std::pin::Pin;
use std::rc::Weak;
use std::task::{Context, Poll, Waker};

/// Future returned by [`Task::join`], resolving when the target completes.
///
/// Resolves `Ok(())` on a successful completion and `Err(JoinError)` if the
/// target panicked, so a failure observed by a joiner is the same failure
/// stored in the target's state, never lost and never duplicated.
///
/// Several tasks may hold a `Join` for the same target; on completion they
/// are all woken, in the order they first awaited. A target whose owning
/// [`Task`] handle was dropped before completing counts as gone, and joining
/// it resolves `Ok(())` immediately; the waiter cannot be woken by a frame
/// that no longer exists.
///
/// [`Task`]: crate::task::Task
/// [`Task::join`]: crate::task::Task::join
pub struct Join {
    target: Weak<RefCell<Core>>,

    /// Our enrolment in the target's waiter queue, if currently suspended.
    waker: Option<Waker>,
}

impl Join {
    pub(crate) fn new(target: Weak<RefCell<Core>>) -> Join {
        Join { target, waker: None }
    }
}

impl Unpin for Join {}

impl Future for Join {
    type Output = Result<(), JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let Some(core) = this.target.upgrade() else {
            this.waker = None;
            return Poll::Ready(Ok(()));
        };

        let mut core = core.borrow_mut();
        if core.is_completed() {
            this.waker = None;
            return Poll::Ready(match core.failure() {
                Some(failure) => Err(failure),
                None => Ok(()),
            });
        }

        // Polled again without completing: replace our previous enrolment so
        // the queue holds us exactly once.
        if let Some(prev) = this.waker.take() {
            core.join_waiters_mut().retain(|w| !w.will_wake(&prev));
        }
        core.join_waiters_mut().push_back(cx.waker().clone());
        this.waker = Some(cx.waker().clone());

        Poll::Pending
    }
}

impl Drop for Join {
    fn drop(&mut self) {
        let (Some(waker), Some(core)) = (self.waker.take(), self.target.upgrade()) else {
            return;
        };
        core.borrow_mut()
            .join_waiters_mut()
            .retain(|w| !w.will_wake(&waker));
    }
}

impl fmt::Debug for Join {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Join").finish()
    }
}

#[cfg(test)]
mod tests {
    use crate as coterie;
    use crate::sync::Channel;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[coterie::test]
    async fn test_join_completed_task_resolves_immediately() -> Result<()> {
        let task = coterie::spawn(async {});
        coterie::future::yield_now().await;

        assert!(task.is_done());
        task.join().await.unwrap();
        Ok(())
    }

    #[coterie::test]
    async fn test_join_propagates_failure() -> Result<()> {
        let failing = coterie::spawn(async {
            coterie::future::yield_now().await;
            panic!("E");
        });

        let err = failing.join().await.unwrap_err();
        assert_eq!(err.panic_message(), Some("E"));

        // The non-raising inspection observes the same failure.
        let inspected = failing.failure().expect("failure must be captured");
        assert_eq!(inspected.panic_message(), Some("E"));
        assert_eq!(inspected.id(), err.id());
        Ok(())
    }

    #[coterie::test]
    async fn test_joiners_woken_in_enrolment_order() -> Result<()> {
        let order = Rc::new(RefCell::new(Vec::new()));
        let target = Rc::new(coterie::spawn(async {
            coterie::future::yield_now().await;
            coterie::future::yield_now().await;
        }));

        let joiners: Vec<_> = (0..3)
            .map(|i| {
                let order = order.clone();
                let target = target.clone();
                coterie::spawn(async move {
                    target.join().await.unwrap();
                    order.borrow_mut().push(i);
                })
            })
            .collect();

        for joiner in &joiners {
            joiner.join().await.unwrap();
        }

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        Ok(())
    }

    #[coterie::test]
    async fn test_parked_joiner_survives_target_drop() -> Result<()> {
        let chan = Channel::<u8>::new(0);
        let rx = chan.clone();
        let target = coterie::spawn(async move {
            rx.recv().await;
        });

        let joiner = {
            let join = target.join();
            coterie::spawn(async move {
                join.await.unwrap();
            })
        };

        coterie::future::yield_now().await;
        assert!(!joiner.is_done(), "joiner parked on a live target");

        // Dropping the target wakes its parked joiners, which then observe
        // the task as gone.
        drop(target);
        coterie::future::yield_now().await;
        assert!(joiner.is_done());
        Ok(())
    }

    #[coterie::test]
    async fn test_join_dropped_task_resolves_ok() -> Result<()> {
        let chan = Channel::<u8>::new(0);
        let rx = chan.clone();

        let task = coterie::spawn(async move {
            // Parks forever; nobody sends.
            rx.recv().await;
        });
        let join = task.join();

        coterie::future::yield_now().await;
        drop(task);

        join.await.unwrap();
        Ok(())
    }
}
