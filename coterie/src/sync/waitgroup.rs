use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A completion counter: tasks block on [`wait`](WaitGroup::wait) until the
/// counter, raised by [`add`](WaitGroup::add), is driven back to zero by
/// [`done`](WaitGroup::done).
///
/// The counter is raised once per batch (`add(k)`) before the workers start;
/// each worker calls `done` exactly once, or holds a
/// [`guard`](WaitGroup::guard), which calls it on every exit path. When the
/// counter reaches zero, *all* waiters are woken in the order they began
/// waiting.
///
/// `done` in excess of `add` saturates at zero instead of being an error, so
/// a guard can be taken conservatively on paths that might not have a
/// matching `add`.
///
/// `add` must happen before the waiters it accounts for have resolved:
/// raising the counter from zero while a previous wait already returned is a
/// logic error in the caller (that wait is gone and will not come back).
///
/// # Examples
///
/// ```
/// use coterie::sync::WaitGroup;
///
/// coterie::block_on(async {
///     let wg = WaitGroup::new();
///     wg.add(3);
///
///     for _ in 0..3 {
///         let guard = wg.guard();
///         coterie::spawn(async move {
///             let _guard = guard; // done() on every exit path
///             coterie::future::yield_now().await;
///         });
///     }
///
///     wg.wait().await;
///     assert_eq!(wg.count(), 0);
/// });
/// ```
pub struct WaitGroup {
    inner: Rc<State>,
}

struct State {
    count: Cell<u64>,
    waiters: RefCell<VecDeque<Waker>>,
}

impl WaitGroup {
    pub fn new() -> WaitGroup {
        WaitGroup {
            inner: Rc::new(State {
                count: Cell::new(0),
                waiters: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Raises the counter by `n`.
    pub fn add(&self, n: u64) {
        let count = self.inner.count.get();
        self.inner.count.set(count + n);
    }

    /// Lowers the counter by one, saturating at zero. If this lands the
    /// counter on zero, every waiter is woken in enrolment order.
    pub fn done(&self) {
        let count = self.inner.count.get();
        if count > 0 {
            self.inner.count.set(count - 1);
        }
        if self.inner.count.get() == 0 {
            let waiters: SmallVec<[Waker; 4]> =
                self.inner.waiters.borrow_mut().drain(..).collect();
            for waiter in waiters {
                waiter.wake();
            }
        }
    }

    /// The current counter value.
    pub fn count(&self) -> u64 {
        self.inner.count.get()
    }

    /// Returns a future that resolves when the counter is zero.
    ///
    /// Resolves immediately if it already is. Any number of tasks may wait;
    /// they all resolve on the same zero transition.
    pub fn wait(&self) -> Wait<'_> {
        Wait {
            wg: self,
            waker: None,
        }
    }

    /// Returns a guard that calls [`done`](WaitGroup::done) when dropped.
    ///
    /// The guard only decrements; it does not `add` on construction. The
    /// caller still raises the counter once for the whole batch.
    pub fn guard(&self) -> WaitGroupGuard {
        WaitGroupGuard { wg: self.clone() }
    }
}

impl Default for WaitGroup {
    fn default() -> WaitGroup {
        WaitGroup::new()
    }
}

impl Clone for WaitGroup {
    fn clone(&self) -> WaitGroup {
        WaitGroup {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for WaitGroup {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("WaitGroup")
            .field("count", &self.inner.count.get())
            .field("waiters", &self.inner.waiters.borrow().len())
            .finish()
    }
}

/// Future returned by [`WaitGroup::wait`].
pub struct Wait<'a> {
    wg: &'a WaitGroup,
    waker: Option<Waker>,
}

impl Unpin for Wait<'_> {}

impl Future for Wait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.wg.inner.count.get() == 0 {
            this.waker = None;
            return Poll::Ready(());
        }

        let mut waiters = this.wg.inner.waiters.borrow_mut();
        if let Some(prev) = this.waker.take() {
            waiters.retain(|w| !w.will_wake(&prev));
        }
        waiters.push_back(cx.waker().clone());
        this.waker = Some(cx.waker().clone());

        Poll::Pending
    }
}

impl Drop for Wait<'_> {
    fn drop(&mut self) {
        if let Some(prev) = self.waker.take() {
            self.wg
                .inner
                .waiters
                .borrow_mut()
                .retain(|w| !w.will_wake(&prev));
        }
    }
}

impl fmt::Debug for Wait<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Wait")
            .field("parked", &self.waker.is_some())
            .finish()
    }
}

/// Calls [`WaitGroup::done`] when dropped.
///
/// Bind one to the top of a worker's scope so the group is released on every
/// exit path, panics included.
pub struct WaitGroupGuard {
    wg: WaitGroup,
}

impl Drop for WaitGroupGuard {
    fn drop(&mut self) {
        self.wg.done();
    }
}

impl fmt::Debug for WaitGroupGuard {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("WaitGroupGuard").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as coterie;
    use crate::test_utils::{EventLog, poll_once};
    use anyhow::Result;
    use static_assertions::assert_not_impl_any;

    assert_not_impl_any!(WaitGroup: core::marker::Send, core::marker::Sync);

    #[test]
    fn test_wait_on_zero_resolves_immediately() -> Result<()> {
        let wg = WaitGroup::new();
        assert_eq!(poll_once(&mut wg.wait()), Poll::Ready(()));
        assert_eq!(crate::context::with_scheduler(|s| s.len()), 0);
        Ok(())
    }

    #[test]
    fn test_done_saturates_at_zero() -> Result<()> {
        let wg = WaitGroup::new();
        wg.done();
        wg.done();
        assert_eq!(wg.count(), 0);

        // Still balanced afterwards: the extra dones did not go negative.
        wg.add(1);
        assert_eq!(wg.count(), 1);
        wg.done();
        assert_eq!(wg.count(), 0);
        Ok(())
    }

    #[coterie::test]
    async fn test_fan_in_three_workers() -> Result<()> {
        let log = EventLog::new();
        let wg = WaitGroup::new();
        wg.add(3);

        for i in 1..=3 {
            let wg = wg.clone();
            let log = log.clone();
            coterie::spawn(async move {
                coterie::future::yield_now().await;
                log.push(format!("worker:{i}"));
                wg.done();
            });
        }

        wg.wait().await;
        log.push("main");

        assert_eq!(wg.count(), 0);
        assert_eq!(
            log.take(),
            vec!["worker:1", "worker:2", "worker:3", "main"],
            "main resumes exactly once, after every worker finished"
        );
        Ok(())
    }

    #[coterie::test]
    async fn test_zero_transition_broadcasts_to_all_waiters() -> Result<()> {
        let log = EventLog::new();
        let wg = WaitGroup::new();
        wg.add(1);

        let waiters: Vec<_> = (1..=3)
            .map(|i| {
                let wg = wg.clone();
                let log = log.clone();
                coterie::spawn(async move {
                    wg.wait().await;
                    log.push(format!("waiter:{i}"));
                })
            })
            .collect();

        let finisher = {
            let wg = wg.clone();
            let log = log.clone();
            coterie::spawn(async move {
                log.push("done");
                wg.done();
            })
        };

        finisher.join().await.unwrap();
        for waiter in waiters {
            waiter.join().await.unwrap();
        }

        assert_eq!(log.take(), vec!["done", "waiter:1", "waiter:2", "waiter:3"]);
        Ok(())
    }

    #[coterie::test]
    async fn test_guard_decrements_on_panic_path() -> Result<()> {
        let wg = WaitGroup::new();
        wg.add(1);

        let guard = wg.guard();
        let worker = coterie::spawn(async move {
            let _guard = guard;
            panic!("worker failed");
        });

        // The panic is captured; the guard still ran `done` while the frame
        // unwound, so the wait resolves.
        wg.wait().await;
        assert_eq!(wg.count(), 0);
        assert!(worker.failure().is_some());
        Ok(())
    }

    #[test]
    fn test_guard_is_decrement_only() -> Result<()> {
        let wg = WaitGroup::new();

        // Taking and dropping a guard with no matching add saturates.
        drop(wg.guard());
        assert_eq!(wg.count(), 0);

        // The caller raises the counter once for the batch, not the guards.
        wg.add(2);
        let first = wg.guard();
        let second = wg.guard();
        assert_eq!(wg.count(), 2);
        drop(first);
        drop(second);
        assert_eq!(wg.count(), 0);
        Ok(())
    }
}
