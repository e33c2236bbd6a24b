use crate::context;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque ID that uniquely identifies a task relative to all other tasks
/// created by the process.
///
/// # Notes
///
/// - Task IDs are assigned at creation and never re-used.
/// - The task ID of the currently running task can be obtained from inside the
///   task via the [`task::try_id()`](crate::task::try_id()) and
///   [`task::id()`](crate::task::id()) functions and from outside the task via
///   the [`Task::id()`](crate::task::Task::id()) function.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(NonZeroU64);

/// Returns the [`Id`] of the currently running task.
///
/// # Panics
///
/// This function panics if called from outside a task. Note that the future
/// passed to `block_on` is not a task, so the method will panic if called from
/// there. For a version of this function that doesn't panic, see
/// [`task::try_id()`](crate::task::try_id()).
#[track_caller]
pub fn id() -> Id {
    context::current_task_id().expect("can't get a task id when not inside a task")
}

/// Returns the [`Id`] of the currently running task, or `None` if called
/// outside of a task.
///
/// This function is similar to [`task::id()`](crate::task::id()), except that
/// it returns `None` rather than panicking if called outside of a task
/// context.
pub fn try_id() -> Option<Id> {
    context::current_task_id()
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Safety: this number is unimaginably large, even if the runtime was
        // creating 1 billion task/sec, it would take 584 years to wrap around.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }
}

/// Set and clear the task id in the context while the task's frame is being
/// polled, restoring the previous value on exit even if the poll panics.
pub(super) struct TaskIdGuard {
    parent_task_id: Option<Id>,
}

impl TaskIdGuard {
    pub(super) fn enter(id: Id) -> Self {
        TaskIdGuard {
            parent_task_id: context::set_current_task_id(Some(id)),
        }
    }
}

impl Drop for TaskIdGuard {
    fn drop(&mut self) {
        context::set_current_task_id(self.parent_task_id);
    }
}

#[cfg(test)]
mod tests {
    use crate as coterie;
    use crate::task::Task;
    use anyhow::Result;
    use std::collections::HashSet;

    #[test]
    fn test_new_task_id_unique() -> Result<()> {
        let n = 13;
        let mut all_ids = HashSet::with_capacity(n);

        for _ in 1..=n {
            let task = Task::new(async {});
            all_ids.insert(task.id());
        }

        assert_eq!(all_ids.len(), n);
        Ok(())
    }

    #[coterie::test]
    async fn test_current_task_id_inside_task() -> Result<()> {
        assert_eq!(crate::task::try_id(), None, "root future is not a task");

        let task = crate::spawn(async {
            let id = crate::task::id();
            assert_eq!(crate::task::try_id(), Some(id));
        });

        task.join().await.unwrap();
        Ok(())
    }
}
