//! A single-threaded cooperative concurrency runtime: stackless tasks,
//! Go-style channels and wait groups, one FIFO ready queue.

#[doc(inline)]
pub use coterie_macros::main;

#[doc(inline)]
pub use coterie_macros::test;

pub(crate) mod context;

pub mod future;

pub mod runtime;
pub use runtime::{Handle, block_on, run, spawn};

pub mod sync;

pub mod task;
pub use task::{JoinError, Task};

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
