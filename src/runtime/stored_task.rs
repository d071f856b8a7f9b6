//! Stored root coroutine for manager storage.
//!
//! `StoredTask` wraps a root coroutine future with its result type erased so
//! the manager can keep heterogeneous roots in one map. The concrete output
//! is boxed as `dyn Any` and recovered by the typed [`Handle`] at
//! `take_result` time.
//!
//! [`Handle`]: crate::Handle

use crate::types::TaskId;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::trace;

/// A type-erased root coroutine stored in the manager.
///
/// Single-threaded by design: the boxed future is `!Send` and is only ever
/// polled by the scheduler that owns it.
pub(crate) struct StoredTask {
    /// The pinned, boxed coroutine body.
    future: Pin<Box<dyn Future<Output = Box<dyn Any>>>>,
    /// Root id, for tracing.
    task_id: TaskId,
    /// Resumption counter, for tracing.
    poll_count: u64,
}

impl StoredTask {
    /// Wraps a coroutine body, erasing its output type.
    pub(crate) fn new<T, F>(future: F, task_id: TaskId) -> Self
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        Self {
            future: Box::pin(async move { Box::new(future.await) as Box<dyn Any> }),
            task_id,
            poll_count: 0,
        }
    }

    /// Advances the coroutine to its next suspension point.
    ///
    /// Returns `Poll::Ready` with the erased result when the body runs to
    /// completion. Panics from the body propagate; the caller catches them
    /// at the root boundary.
    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Box<dyn Any>> {
        self.poll_count += 1;
        trace!(task_id = %self.task_id, poll_number = self.poll_count, "resuming coroutine");

        let result = self.future.as_mut().poll(cx);

        trace!(
            task_id = %self.task_id,
            poll_number = self.poll_count,
            poll_result = match &result {
                Poll::Ready(_) => "Ready",
                Poll::Pending => "Pending",
            },
            "coroutine suspended or finished"
        );
        result
    }
}

impl std::fmt::Debug for StoredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTask")
            .field("task_id", &self.task_id)
            .field("poll_count", &self.poll_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::Arc;
    use std::task::{Wake, Waker};

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn synchronous_body_completes_on_first_poll() {
        init_test("synchronous_body_completes_on_first_poll");
        let mut task = StoredTask::new(async { 40 + 2 }, TaskId(1));
        let waker = Waker::from(Arc::new(NoopWaker));
        let mut cx = Context::from_waker(&waker);

        let Poll::Ready(value) = task.poll(&mut cx) else {
            panic!("expected synchronous completion");
        };
        let value = *value.downcast::<i32>().expect("result type");
        crate::assert_with_log!(value == 42, "erased result recovers", 42, value);
        crate::test_complete!("synchronous_body_completes_on_first_poll");
    }

    #[test]
    fn pending_body_reports_pending() {
        init_test("pending_body_reports_pending");
        let mut task = StoredTask::new(std::future::pending::<()>(), TaskId(2));
        let waker = Waker::from(Arc::new(NoopWaker));
        let mut cx = Context::from_waker(&waker);

        let pending = task.poll(&mut cx).is_pending();
        crate::assert_with_log!(pending, "pending body stays pending", true, pending);
        crate::test_complete!("pending_body_reports_pending");
    }
}
