use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use tracing::trace;

/// A typed point-to-point channel with Go semantics.
///
/// A channel of capacity `0` is a rendezvous: a send completes only once a
/// receive is there to take the value, and vice versa. A channel of capacity
/// `C > 0` buffers up to `C` values; senders park once the buffer is full,
/// receivers park while it is empty.
///
/// Both sides use the same handle: clone it into every task that needs the
/// channel. Senders and receivers are each served strictly first-come,
/// first-served, and values arrive in the order their sends became eligible.
///
/// Closing is the only shutdown signal: after [`close`](Channel::close),
/// every parked task is woken, receivers drain whatever was already
/// deliverable and then see `None`, and senders see `false`. There is no
/// other way to interrupt a parked task from the outside.
///
/// # Examples
///
/// ```
/// use coterie::sync::Channel;
///
/// coterie::block_on(async {
///     let chan = Channel::new(1);
///
///     let producer = {
///         let chan = chan.clone();
///         coterie::spawn(async move {
///             for i in 0..3 {
///                 if !chan.send(i).await {
///                     break; // closed under us
///                 }
///             }
///             chan.close();
///         })
///     };
///
///     let mut received = Vec::new();
///     while let Some(value) = chan.recv().await {
///         received.push(value);
///     }
///
///     producer.join().await.unwrap();
///     assert_eq!(received, vec![0, 1, 2]);
/// });
/// ```
pub struct Channel<T> {
    inner: Rc<RefCell<State<T>>>,
}

/// A parked sender's value, shared between the channel and the `Send` future
/// that owns the send. An emptied slot is the adoption signal: the value has
/// been taken by a receiver (or promoted into the buffer), so the send
/// succeeded even if the channel closed in the meantime.
type Slot<T> = Rc<RefCell<Option<T>>>;

struct Parked<T> {
    slot: Slot<T>,

    /// `None` for rendezvous fast-path values, whose sender completed
    /// without suspending and will never need a wake-up.
    waker: Option<Waker>,
}

struct State<T> {
    cap: usize,

    /// Delivered-but-unreceived values; never grows past `cap`.
    buffer: VecDeque<T>,

    /// Values left by parked senders, in send order. Held outside the
    /// buffer so capacity is never exceeded while senders wait.
    handoff: VecDeque<Parked<T>>,

    /// Parked receivers in arrival order.
    readers: VecDeque<Waker>,

    closed: bool,
}

impl<T> State<T> {
    fn remove_parked(&mut self, slot: &Slot<T>) {
        self.handoff.retain(|parked| !Rc::ptr_eq(&parked.slot, slot));
    }

    fn refresh_parked_waker(&mut self, slot: &Slot<T>, waker: &Waker) {
        for parked in self.handoff.iter_mut() {
            if Rc::ptr_eq(&parked.slot, slot) {
                parked.waker = Some(waker.clone());
            }
        }
    }
}

impl<T> Channel<T> {
    /// Creates a channel. `cap == 0` makes it a rendezvous channel; any
    /// other capacity bounds the buffer.
    pub fn new(cap: usize) -> Channel<T> {
        Channel {
            inner: Rc::new(RefCell::new(State {
                cap,
                buffer: VecDeque::new(),
                handoff: VecDeque::new(),
                readers: VecDeque::new(),
                closed: false,
            })),
        }
    }

    /// Sends a value, resolving `true` on delivery and `false` if the
    /// channel closed before the value could be taken.
    ///
    /// Sending never raises: closure is an ordinary outcome to branch on. A
    /// send that parks hands its value over for adoption, so it still
    /// resolves `true` if a receiver took the value before the close.
    pub fn send(&self, value: T) -> Send<'_, T> {
        Send {
            chan: self,
            value: Some(value),
            slot: None,
        }
    }

    /// Receives the next value, resolving `None` once the channel is both
    /// drained and closed.
    pub fn recv(&self) -> Recv<'_, T> {
        Recv {
            chan: self,
            waker: None,
        }
    }

    /// Closes the channel, waking every parked receiver and sender.
    ///
    /// Closing is irreversible and idempotent. Values already in the buffer
    /// are still delivered; a parked sender whose value was not adopted by
    /// the time it resumes drops the value and resolves `false`.
    pub fn close(&self) {
        let wakers: SmallVec<[Waker; 8]> = {
            let mut state = self.inner.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            trace!(cap = state.cap, "channel closed");

            // Receivers first, then senders, each in enrolment order.
            let mut wakers: SmallVec<[Waker; 8]> = state.readers.drain(..).collect();
            for parked in state.handoff.iter_mut() {
                if let Some(waker) = parked.waker.take() {
                    wakers.push(waker);
                }
            }
            wakers
        };

        for waker in wakers {
            waker.wake();
        }
    }

    /// The number of buffered values. Values parked with suspended senders
    /// are not visible here until a receiver adopts them.
    pub fn len(&self) -> usize {
        self.inner.borrow().buffer.len()
    }

    /// The buffer capacity this channel was created with.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().cap
    }

    /// Whether a buffered value is immediately available.
    pub fn has_data(&self) -> bool {
        !self.inner.borrow().buffer.is_empty()
    }

    /// Whether [`close`](Channel::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Channel<T> {
        Channel {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        fmt.debug_struct("Channel")
            .field("cap", &state.cap)
            .field("len", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Future returned by [`Channel::send`].
pub struct Send<'a, T> {
    chan: &'a Channel<T>,
    value: Option<T>,

    /// Our parked value, if the first poll found no room.
    slot: Option<Slot<T>>,
}

impl<T> Unpin for Send<'_, T> {}

impl<T> Future for Send<'_, T> {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.chan.inner.borrow_mut();

        // Resumed after parking.
        if let Some(slot) = this.slot.clone() {
            if slot.borrow().is_none() {
                // Adopted: the value reached the buffer or a receiver, so
                // the send succeeded even if the channel has closed since.
                this.slot = None;
                return Poll::Ready(true);
            }
            if state.closed {
                state.remove_parked(&slot);
                this.slot = None;
                return Poll::Ready(false);
            }
            // Woken ahead of adoption; keep waiting with a fresh waker.
            state.refresh_parked_waker(&slot, cx.waker());
            return Poll::Pending;
        }

        let Some(value) = this.value.take() else {
            panic!("`Send` polled after completion");
        };

        if state.closed {
            return Poll::Ready(false);
        }

        if state.cap == 0 {
            // Rendezvous fast path: a receiver is already parked, so the
            // value goes into the handoff queue for it and we never suspend.
            if let Some(reader) = state.readers.pop_front() {
                state.handoff.push_back(Parked {
                    slot: Rc::new(RefCell::new(Some(value))),
                    waker: None,
                });
                drop(state);
                reader.wake();
                return Poll::Ready(true);
            }
        } else if state.buffer.len() < state.cap {
            state.buffer.push_back(value);
            let reader = state.readers.pop_front();
            drop(state);
            if let Some(reader) = reader {
                reader.wake();
            }
            return Poll::Ready(true);
        }

        // No receiver (rendezvous) or no slack (buffered): park, leaving the
        // value where a receiver can adopt it while we sleep.
        let slot = Rc::new(RefCell::new(Some(value)));
        state.handoff.push_back(Parked {
            slot: slot.clone(),
            waker: Some(cx.waker().clone()),
        });
        this.slot = Some(slot);
        Poll::Pending
    }
}

impl<T> Drop for Send<'_, T> {
    fn drop(&mut self) {
        // A send cancelled while parked takes its unadopted value with it.
        if let Some(slot) = self.slot.take() {
            if slot.borrow().is_some() {
                self.chan.inner.borrow_mut().remove_parked(&slot);
            }
        }
    }
}

impl<T> fmt::Debug for Send<'_, T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Send")
            .field("parked", &self.slot.is_some())
            .finish()
    }
}

/// Future returned by [`Channel::recv`].
pub struct Recv<'a, T> {
    chan: &'a Channel<T>,

    /// Our enrolment among the channel's parked receivers, if suspended.
    waker: Option<Waker>,
}

impl<T> Unpin for Recv<'_, T> {}

impl<T> Recv<'_, T> {
    fn deregister(&mut self, state: &mut State<T>) {
        if let Some(prev) = self.waker.take() {
            state.readers.retain(|w| !w.will_wake(&prev));
        }
    }
}

impl<T> Future for Recv<'_, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.chan.inner.borrow_mut();

        if state.cap == 0 {
            // Rendezvous: every transfer passes through the handoff queue.
            if let Some(parked) = state.handoff.pop_front() {
                if let Some(value) = parked.slot.borrow_mut().take() {
                    this.deregister(&mut state);
                    drop(state);
                    if let Some(sender) = parked.waker {
                        sender.wake();
                    }
                    return Poll::Ready(Some(value));
                }
            }
        } else if let Some(value) = state.buffer.pop_front() {
            // Direct handoff: promote the eldest parked value into the slack
            // we just created, so the buffer stays full while senders wait
            // and never goes over capacity.
            let sender = match state.handoff.pop_front() {
                Some(parked) => {
                    if let Some(promoted) = parked.slot.borrow_mut().take() {
                        state.buffer.push_back(promoted);
                    }
                    parked.waker
                }
                None => None,
            };
            this.deregister(&mut state);
            drop(state);
            if let Some(sender) = sender {
                sender.wake();
            }
            return Poll::Ready(Some(value));
        }

        if state.closed {
            this.deregister(&mut state);
            return Poll::Ready(None);
        }

        // Nothing deliverable: park until a sender or a close wakes us.
        this.deregister(&mut state);
        state.readers.push_back(cx.waker().clone());
        this.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for Recv<'_, T> {
    fn drop(&mut self) {
        if let Some(prev) = self.waker.take() {
            self.chan
                .inner
                .borrow_mut()
                .readers
                .retain(|w| !w.will_wake(&prev));
        }
    }
}

impl<T> fmt::Debug for Recv<'_, T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Recv")
            .field("parked", &self.waker.is_some())
            .finish()
    }
}
