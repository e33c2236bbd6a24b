use std::pin::Pin;
use std::task::{Context, Poll};

/// Polls a future exactly once with a no-op waker.
///
/// Channel and wait-group futures resolve on first poll whenever no
/// suspension is needed, so tests can drive them by hand and assert which
/// operations complete without touching the scheduler at all.
pub(crate) fn poll_once<F>(future: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    Pin::new(future).poll(&mut cx)
}
