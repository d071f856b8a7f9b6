//! External handle to a root coroutine.
//!
//! `Handle<T>` is returned by [`Scheduler::start`] and is the only way to
//! control a root from outside the scheduler: stop it, query its state, and
//! take its result. Handles are move-only and RAII: dropping a handle stops
//! the coroutine (unless [`Handle::forget`] was called) and releases its
//! entry so the manager can reclaim it.
//!
//! Every operation degrades to an empty answer when the scheduler no longer
//! exists; a handle can always outlive its manager safely.
//!
//! [`Scheduler::start`]: crate::Scheduler::start

use crate::types::{CoroState, PanicPayload, TaskId};
use std::any::Any;
use std::marker::PhantomData;
use std::panic::resume_unwind;
use std::rc::Weak;

/// Manager operations reachable from a handle, object-safe so handles stay
/// untyped over the scheduler's phase/clock parameters.
pub(crate) trait ManagerHook {
    fn stop(&self, id: TaskId);
    fn release(&self, id: TaskId);
    fn state(&self, id: TaskId) -> CoroState;
    fn take_result(&self, id: TaskId) -> TakenResult;
}

/// Result of a destructive read on a root entry.
pub(crate) enum TakenResult {
    /// The stored success value, moved out.
    Value(Box<dyn Any>),
    /// The captured panic, moved out.
    Failure(PanicPayload),
    /// Still running, stopped, or already taken.
    Empty,
}

/// Owning external reference to a root coroutine.
///
/// # Ownership
///
/// The handle does not own the coroutine frame; the scheduler does. It
/// owns the *entry*: while the handle lives, the entry survives even after
/// the coroutine reaches a terminal state, so its state and result stay
/// queryable. Dropping the handle stops a still-running coroutine and lets
/// the manager erase the entry.
///
/// # Example
///
/// ```
/// use cotick::{wait, DefaultClock, DefaultUpdate, Scheduler};
///
/// let sched = Scheduler::<DefaultUpdate, DefaultClock>::new();
/// let handle = sched.start(|| async {
///     loop {
///         wait(0.0).await;
///     }
/// });
///
/// assert!(!handle.is_down());
/// handle.stop();
/// assert!(handle.is_down());
/// ```
#[derive(Debug)]
pub struct Handle<T> {
    id: TaskId,
    /// False after `forget`: drop no longer stops the coroutine.
    bound: bool,
    hook: Weak<dyn ManagerHook>,
    _result: PhantomData<fn() -> T>,
}

impl<T: 'static> Handle<T> {
    pub(crate) fn new(id: TaskId, hook: Weak<dyn ManagerHook>) -> Self {
        Self {
            id,
            bound: true,
            hook,
            _result: PhantomData,
        }
    }

    /// The root id this handle refers to.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Requests immediate cancellation.
    ///
    /// Synchronous: the coroutine frame, every nested child, and every
    /// pending wait are destroyed before this returns. Does nothing if the
    /// coroutine already reached a terminal state or the scheduler is gone.
    pub fn stop(&self) {
        if let Some(hook) = self.hook.upgrade() {
            hook.stop(self.id);
        }
    }

    /// True once the coroutine has reached a terminal state, or when the
    /// scheduler no longer exists.
    #[must_use]
    pub fn is_down(&self) -> bool {
        self.hook
            .upgrade()
            .is_none_or(|hook| hook.state(self.id).is_terminal())
    }

    /// Current lifecycle state, or `None` when the scheduler is gone.
    #[must_use]
    pub fn state(&self) -> Option<CoroState> {
        self.hook.upgrade().map(|hook| hook.state(self.id))
    }

    /// Destructively reads the coroutine's result.
    ///
    /// Returns the stored value exactly once after success. For a failed
    /// coroutine the captured panic is re-raised, also exactly once. Every
    /// other case (still running, stopped, already taken, scheduler gone)
    /// returns `None`.
    #[must_use]
    pub fn take_result(&self) -> Option<T> {
        let hook = self.hook.upgrade()?;
        match hook.take_result(self.id) {
            TakenResult::Value(value) => {
                let value = value
                    .downcast::<T>()
                    .expect("stored result type is fixed by start");
                Some(*value)
            }
            TakenResult::Failure(payload) => resume_unwind(payload.into_unwind()),
            TakenResult::Empty => None,
        }
    }

    /// Unbinds the coroutine's lifetime from this handle.
    ///
    /// After `forget`, dropping the handle no longer stops the coroutine:
    /// it keeps running to completion and is reclaimed once finished. Every
    /// other operation keeps working.
    pub fn forget(&mut self) {
        self.bound = false;
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.upgrade() {
            if self.bound {
                hook.stop(self.id);
            }
            hook.release(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use crate::time::wait;
    use crate::Scheduler;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn take_result_is_one_shot() {
        init_test("take_result_is_one_shot");
        let sched = Scheduler::<crate::kind::DefaultUpdate, crate::kind::DefaultClock>::new();
        let handle = sched.start(|| async { "done" });

        let first = handle.take_result();
        crate::assert_with_log!(first == Some("done"), "first take", Some("done"), first);
        let second = handle.take_result();
        crate::assert_with_log!(second.is_none(), "second take empty", true, second.is_none());
        crate::test_complete!("take_result_is_one_shot");
    }

    #[test]
    fn stopped_coroutine_reports_down_and_empty() {
        init_test("stopped_coroutine_reports_down_and_empty");
        let sched = Scheduler::<crate::kind::DefaultUpdate, crate::kind::DefaultClock>::new();
        let handle = sched.start(|| async {
            wait(0.0).await;
            1
        });

        crate::assert_with_log!(!handle.is_down(), "running before stop", false, handle.is_down());
        handle.stop();
        crate::assert_with_log!(handle.is_down(), "down after stop", true, handle.is_down());
        let state = handle.state();
        crate::assert_with_log!(
            state == Some(CoroState::Stopped),
            "state is stopped",
            Some(CoroState::Stopped),
            state
        );
        let taken = handle.take_result();
        crate::assert_with_log!(taken.is_none(), "no result after stop", true, taken.is_none());
        crate::test_complete!("stopped_coroutine_reports_down_and_empty");
    }

    #[test]
    fn handle_outlives_scheduler() {
        init_test("handle_outlives_scheduler");
        let sched = Scheduler::<crate::kind::DefaultUpdate, crate::kind::DefaultClock>::new();
        let handle = sched.start(|| async {
            wait(0.0).await;
            5
        });
        drop(sched);

        crate::assert_with_log!(handle.is_down(), "down when manager gone", true, handle.is_down());
        let state = handle.state();
        crate::assert_with_log!(state.is_none(), "state absent", true, state.is_none());
        let taken = handle.take_result();
        crate::assert_with_log!(taken.is_none(), "result empty", true, taken.is_none());
        handle.stop();
        crate::test_complete!("handle_outlives_scheduler");
    }

    #[test]
    fn forgotten_handle_keeps_coroutine_running() {
        init_test("forgotten_handle_keeps_coroutine_running");
        let sched = Scheduler::<crate::kind::DefaultUpdate, crate::kind::DefaultClock>::new();
        let done = std::rc::Rc::new(std::cell::Cell::new(false));
        let done_flag = std::rc::Rc::clone(&done);
        let mut handle = sched.start(move || async move {
            wait(0.0).await;
            done_flag.set(true);
        });
        handle.forget();
        drop(handle);

        sched.update();
        crate::assert_with_log!(done.get(), "ran after handle drop", true, done.get());
        crate::test_complete!("forgotten_handle_keeps_coroutine_running");
    }
}
