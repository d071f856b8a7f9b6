//! Wait futures: the scheduler's only suspension primitive.
//!
//! A [`Wait`] parks the awaiting coroutine in the time queue of one
//! (phase, clock) pair and completes during the first
//! [`update`](crate::Scheduler::update_with) of that pair whose clock
//! snapshot has reached the deadline. A zero delay means "the next update":
//! it never completes within the update that created it.
//!
//! # Cancel safety
//!
//! Dropping a queued `Wait`, directly or through coroutine teardown,
//! removes its record from the queue with no other side effects.

use crate::kind::{ClockKind, DefaultClock, DefaultUpdate, UpdateKind};
use crate::runtime::scheduler::{current_frame, Inner};
use crate::runtime::timer::{Deadline, WaitKey, WaitRecord};
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};
use tracing::trace;

enum WaitState<P: UpdateKind, C: ClockKind> {
    /// Not yet polled; no queue record exists.
    Unregistered,
    /// Parked in the queue; the cursor is live exactly until fired.
    Queued {
        inner: Weak<RefCell<Inner<P, C>>>,
        key: WaitKey,
        record: Rc<WaitRecord>,
    },
    /// Popped by a drain and observed by a poll.
    Finished,
}

/// Suspends the awaiting coroutine until a (phase, clock) deadline.
///
/// Construct through [`wait`], [`wait_in`], or [`next_update`]. Must be
/// awaited from a coroutine driven by a scheduler whose phase and clock
/// types match; anything else is a precondition violation and panics.
pub struct Wait<P: UpdateKind = DefaultUpdate, C: ClockKind = DefaultClock> {
    delay: f64,
    phase: P,
    clock: C,
    state: WaitState<P, C>,
}

impl<P: UpdateKind, C: ClockKind> Wait<P, C> {
    /// A wait of `delay_sec` seconds on an explicit phase and clock.
    #[must_use]
    pub fn new_in(delay_sec: f64, phase: P, clock: C) -> Self {
        debug_assert!(delay_sec.is_finite(), "wait delay must be finite");
        Self {
            delay: delay_sec,
            phase,
            clock,
            state: WaitState::Unregistered,
        }
    }

    fn register(&mut self) {
        let (cell, task) = current_frame()
            .expect("wait futures must be polled from a coroutine resumption of a live scheduler");
        let Ok(inner) = cell.downcast::<RefCell<Inner<P, C>>>() else {
            panic!("wait phase/clock kinds do not match the driving scheduler")
        };

        let deadline = if self.delay == 0.0 {
            Deadline::Immediate
        } else {
            let source = inner.borrow().clocks.source(self.clock);
            let now = source.now();
            Deadline::At(now + self.delay)
        };

        let record = Rc::new(WaitRecord {
            task,
            fired: Cell::new(false),
        });
        let key = inner
            .borrow_mut()
            .queue_mut(self.phase, self.clock)
            .insert(deadline, Rc::clone(&record));
        trace!(task_id = %task, delay = self.delay, phase = ?self.phase, clock = ?self.clock, "coroutine suspended on wait");

        self.state = WaitState::Queued {
            inner: Rc::downgrade(&inner),
            key,
            record,
        };
    }
}

impl<P: UpdateKind + Unpin, C: ClockKind + Unpin> Future for Wait<P, C> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match &this.state {
            WaitState::Unregistered => {
                this.register();
                Poll::Pending
            }
            WaitState::Queued { record, .. } => {
                if record.fired.get() {
                    this.state = WaitState::Finished;
                    Poll::Ready(())
                } else {
                    Poll::Pending
                }
            }
            WaitState::Finished => Poll::Ready(()),
        }
    }
}

impl<P: UpdateKind, C: ClockKind> Drop for Wait<P, C> {
    fn drop(&mut self) {
        let WaitState::Queued { inner, key, record } = &self.state else {
            return;
        };
        if record.fired.get() {
            return;
        }
        // Cancellation path: unhook the record so the queue never resumes a
        // torn-down coroutine.
        if let Some(inner) = inner.upgrade() {
            inner.borrow_mut().queue_mut(self.phase, self.clock).remove(*key);
            trace!(task_id = %record.task, "queued wait cancelled");
        }
    }
}

/// Waits `delay_sec` seconds on the default phase and clock.
///
/// `wait(0.0)` suspends until the next default update.
#[must_use]
pub fn wait(delay_sec: f64) -> Wait {
    Wait::new_in(delay_sec, DefaultUpdate::first(), DefaultClock::first())
}

/// Waits `delay_sec` seconds on an explicit phase and clock.
#[must_use]
pub fn wait_in<P: UpdateKind, C: ClockKind>(delay_sec: f64, phase: P, clock: C) -> Wait<P, C> {
    Wait::new_in(delay_sec, phase, clock)
}

/// Suspends until the next default update. Equivalent to `wait(0.0)`.
#[must_use]
pub fn next_update() -> Wait {
    wait(0.0)
}

/// Completes once `pred` returns true, re-checking on every default update.
///
/// The predicate is checked before the first suspension: a predicate that is
/// already true completes without suspending.
pub async fn wait_until(mut pred: impl FnMut() -> bool) {
    while !pred() {
        wait(0.0).await;
    }
}

/// Completes once `pred` returns false, re-checking on every default update.
pub async fn wait_while(mut pred: impl FnMut() -> bool) {
    while pred() {
        wait(0.0).await;
    }
}
