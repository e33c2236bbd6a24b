//! Cooperative suspension points.
//!
//! Task code suspends only at an `.await`; these are the two primitive
//! yields. [`yield_now`] suspends and immediately reschedules the task (let
//! the rest of the ready queue run). [`park`] suspends without rescheduling,
//! leaving the wake-up to an external party.

mod park;
pub use park::{Park, park};

mod yield_now;
pub use yield_now::{YieldNow, yield_now};
