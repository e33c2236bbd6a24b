//! Message passing and completion barriers between tasks.
//!
//! Everything here is wake-by-scheduler: parked tasks are enqueued onto the
//! per-thread ready queue and resume on the next scheduler run, never
//! inline. None of these types are locks; there is exactly one task running
//! at a time, so the runtime's own state needs no locking at all.

pub mod channel;
pub use channel::Channel;

pub mod waitgroup;
pub use waitgroup::{WaitGroup, WaitGroupGuard};
