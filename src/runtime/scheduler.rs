//! Coroutine manager and frame-drain scheduler.
//!
//! The scheduler owns every root coroutine by id and drives resumptions from
//! its time queues, one queue per (phase, clock) pair. The host calls
//! [`Scheduler::update`] once per frame (or [`Scheduler::update_with`] per
//! phase/clock); each call snapshots the clock once and resumes every waiter
//! whose deadline has passed, in deadline-then-FIFO order.
//!
//! # Root lifecycle
//!
//! [`Scheduler::start`] runs a coroutine to its first suspension point and
//! returns a [`Handle`]. The entry outlives the coroutine itself until both
//! of these happen: the coroutine reaches a terminal state, and the handle
//! releases the entry (on drop). A root that finishes *during* a resumption
//! is parked in a single-slot postbox and settled between queue pops rather
//! than torn down mid-resumption.

use crate::kind::{ClockKind, DefaultClock, DefaultUpdate, UpdateKind};
use crate::runtime::handle::{Handle, ManagerHook, TakenResult};
use crate::runtime::stored_task::StoredTask;
use crate::runtime::timer::{Deadline, TimeQueue};
use crate::time::clock::ClockRegistry;
use crate::types::{CoroState, PanicPayload, TaskId};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use tracing::{debug, trace};

/// One root coroutine entry in the manager's id map.
struct RootEntry {
    /// The coroutine body; `None` once finished, stopped, or while checked
    /// out for a resumption.
    task: Option<StoredTask>,
    state: CoroState,
    /// Set when the external handle has released the entry.
    released: bool,
    /// Erased success value, present from completion until taken.
    result: Option<Box<dyn Any>>,
    /// Captured panic, present from failure until taken.
    failure: Option<PanicPayload>,
}

impl RootEntry {
    fn new(task: StoredTask) -> Self {
        Self {
            task: Some(task),
            state: CoroState::Running,
            released: false,
            result: None,
            failure: None,
        }
    }
}

/// A just-finished root parked between queue pops.
struct FinishedRoot {
    id: TaskId,
    failure: Option<PanicPayload>,
}

/// Shared scheduler state behind the `Rc<RefCell<_>>` cell.
pub(crate) struct Inner<P: UpdateKind, C: ClockKind> {
    entries: HashMap<u64, RootEntry>,
    next_id: u64,
    queues: Vec<TimeQueue>,
    pub(crate) clocks: ClockRegistry<C>,
    /// Single-slot postbox for the deferred-destroy rule.
    finished: Option<FinishedRoot>,
    /// Set while the scheduler itself is tearing down; handle operations
    /// arriving from dropped coroutine state become no-ops.
    closing: bool,
    _phase: std::marker::PhantomData<P>,
}

impl<P: UpdateKind, C: ClockKind> Inner<P, C> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
            queues: (0..P::COUNT * C::COUNT).map(|_| TimeQueue::new()).collect(),
            clocks: ClockRegistry::new(),
            finished: None,
            closing: false,
            _phase: std::marker::PhantomData,
        }
    }

    fn queue_index(phase: P, clock: C) -> usize {
        debug_assert!(phase.index() < P::COUNT && clock.index() < C::COUNT);
        phase.index() * C::COUNT + clock.index()
    }

    pub(crate) fn queue_mut(&mut self, phase: P, clock: C) -> &mut TimeQueue {
        &mut self.queues[Self::queue_index(phase, clock)]
    }

    pub(crate) fn queue(&self, phase: P, clock: C) -> &TimeQueue {
        &self.queues[Self::queue_index(phase, clock)]
    }

    /// Parks a finished root id. At most one root may finish per resumption;
    /// the drain loop settles the slot before the next pop.
    fn record_finished(&mut self, id: TaskId, failure: Option<PanicPayload>) {
        assert!(
            self.finished.is_none(),
            "a second root coroutine finished before the previous one was settled"
        );
        self.finished = Some(FinishedRoot { id, failure });
    }
}

// --- current-resumption stack ------------------------------------------------
//
// Wait futures registering at a suspension point need two facts the poll
// `Context` does not carry: which scheduler is resuming, and which root is
// being resumed. Both are pushed here around every root poll. The stack
// nests because coroutines may call `start` on the same scheduler while
// being resumed.

struct CurrentFrame {
    inner: Weak<dyn Any>,
    task: TaskId,
}

thread_local! {
    static CURRENT: RefCell<Vec<CurrentFrame>> = const { RefCell::new(Vec::new()) };
}

/// Pops the current-resumption frame on drop, panic-unwind included.
struct ResumeGuard;

impl ResumeGuard {
    fn push(inner: Weak<dyn Any>, task: TaskId) -> Self {
        CURRENT.with(|stack| stack.borrow_mut().push(CurrentFrame { inner, task }));
        Self
    }
}

impl Drop for ResumeGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            stack.borrow_mut().pop().expect("resume stack underflow");
        });
    }
}

/// The scheduler cell and root id of the resumption currently on the stack.
pub(crate) fn current_frame() -> Option<(Rc<dyn Any>, TaskId)> {
    CURRENT.with(|stack| {
        let stack = stack.borrow();
        let frame = stack.last()?;
        Some((frame.inner.upgrade()?, frame.task))
    })
}

struct NoopWaker;

impl Wake for NoopWaker {
    fn wake(self: Arc<Self>) {}
}

// --- scheduler ---------------------------------------------------------------

/// Single-threaded cooperative coroutine scheduler.
///
/// Generic over the host's update-phase and clock-kind enumerations; the
/// defaults give one queue driven by one monotonic clock. The scheduler is
/// the sole owner of its roots: dropping it cancels every coroutine, which
/// in turn tears down all nested children and pending waits.
///
/// # Example
///
/// ```
/// use cotick::{wait, DefaultClock, DefaultUpdate, Scheduler};
///
/// let sched = Scheduler::<DefaultUpdate, DefaultClock>::new();
/// let handle = sched.start(|| async {
///     wait(0.0).await;
///     42
/// });
///
/// sched.update();
/// assert!(handle.is_down());
/// assert_eq!(handle.take_result(), Some(42));
/// ```
pub struct Scheduler<P: UpdateKind = DefaultUpdate, C: ClockKind = DefaultClock> {
    inner: Rc<RefCell<Inner<P, C>>>,
}

impl<P: UpdateKind, C: ClockKind> Scheduler<P, C> {
    /// Creates a scheduler with empty queues and default clocks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new())),
        }
    }

    /// Launches a root coroutine and runs it to its first suspension point.
    ///
    /// `f` is invoked once, immediately, to build the coroutine body; the
    /// body is stored in the root entry for as long as the entry lives, so
    /// everything the body captures stays alive with it.
    ///
    /// The returned [`Handle`] stops the coroutine when dropped; call
    /// [`Handle::forget`] for fire-and-forget use.
    pub fn start<F, Fut, T>(&self, f: F) -> Handle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + 'static,
        T: 'static,
    {
        let future = f();
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = TaskId(inner.next_id);
            inner.next_id += 1;
            inner
                .entries
                .insert(id.raw(), RootEntry::new(StoredTask::new(future, id)));
            id
        };
        debug!(task_id = %id, "root coroutine started");

        // Kick off to the first suspension point; the body may already
        // finish (or start further roots) during this resumption.
        resume_root(&self.inner, id);
        settle_finished(&self.inner);

        let hook: Rc<dyn ManagerHook> = Rc::clone(&self.inner) as Rc<dyn ManagerHook>;
        Handle::new(id, Rc::downgrade(&hook))
    }

    /// Drains the default (phase, clock) queue once.
    pub fn update(&self) {
        self.update_with(P::first(), C::first());
    }

    /// Drains one (phase, clock) queue.
    ///
    /// The clock is read once at the start of the drain; every waiter whose
    /// deadline is at or before that snapshot resumes during this call, in
    /// ascending deadline order with FIFO ties. Waits created during the
    /// drain (including zero-delay ones) park until the next call.
    pub fn update_with(&self, phase: P, clock: C) {
        let source = self.inner.borrow().clocks.source(clock);
        let now = source.now();
        self.inner.borrow_mut().queue_mut(phase, clock).setup_drain(now);

        let mut resumed = 0u32;
        loop {
            let record = self.inner.borrow_mut().queue_mut(phase, clock).pop_ready();
            let Some(record) = record else { break };
            record.fired.set(true);
            resume_root(&self.inner, record.task);
            settle_finished(&self.inner);
            resumed += 1;
        }
        debug_assert!(
            !self.inner.borrow().queue(phase, clock).has_ready(),
            "drain left ready waiters behind"
        );
        trace!(phase = ?phase, clock = ?clock, now, resumed, "update drained");
    }

    /// Installs a custom timer for `clock`, replacing the default monotonic
    /// source. The function must return monotonic seconds.
    pub fn set_timer(&self, clock: C, f: impl Fn() -> f64 + 'static) {
        self.inner.borrow_mut().clocks.set(clock, Rc::new(f));
    }

    /// Number of wait records currently queued for one (phase, clock) pair.
    ///
    /// Host-facing introspection: useful for debug overlays and for
    /// observing that cancellation removed in-flight waits.
    #[must_use]
    pub fn pending_waits(&self, phase: P, clock: C) -> usize {
        self.inner.borrow().queue(phase, clock).len()
    }

    /// Earliest pending deadline in one queue, in that clock's seconds.
    ///
    /// Zero-delay waits report `0.0`; `None` means the queue is empty. Handy
    /// for hosts that pace their frame loop around the next timer.
    #[must_use]
    pub fn next_deadline(&self, phase: P, clock: C) -> Option<f64> {
        self.inner
            .borrow()
            .queue(phase, clock)
            .peek_deadline()
            .map(|deadline| match deadline {
                Deadline::Immediate => 0.0,
                Deadline::At(at) => at,
            })
    }
}

impl<P: UpdateKind, C: ClockKind> Default for Scheduler<P, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: UpdateKind, C: ClockKind> Drop for Scheduler<P, C> {
    fn drop(&mut self) {
        // Destroy roots first: their drop-glue cancels every nested child
        // and wait record, draining the queues. Dropped coroutine state may
        // own handles into this scheduler, so flag the teardown and drop
        // outside the borrow.
        let entries: Vec<RootEntry> = {
            let mut inner = self.inner.borrow_mut();
            inner.closing = true;
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };
        drop(entries);

        let mut inner = self.inner.borrow_mut();
        for queue in &mut inner.queues {
            debug_assert!(queue.is_empty(), "wait record survived its coroutine");
            queue.clear();
        }
    }
}

/// Polls one root to its next suspension point.
///
/// The stored body is checked out of the entry for the duration of the poll
/// so the entry map stays borrowable from inside the coroutine (`start`,
/// handle operations). Completion and failure are parked in the finished
/// slot; teardown of the body always happens outside the state borrow.
fn resume_root<P: UpdateKind, C: ClockKind>(rc: &Rc<RefCell<Inner<P, C>>>, id: TaskId) {
    let mut stored = {
        let mut inner = rc.borrow_mut();
        let Some(entry) = inner.entries.get_mut(&id.raw()) else {
            return;
        };
        if entry.state != CoroState::Running {
            return;
        }
        let Some(task) = entry.task.take() else {
            return;
        };
        task
    };

    let cell: Rc<dyn Any> = Rc::clone(rc) as Rc<dyn Any>;
    let weak_cell = Rc::downgrade(&cell);
    drop(cell);
    let guard = ResumeGuard::push(weak_cell, id);

    let waker = Waker::from(Arc::new(NoopWaker));
    let mut cx = Context::from_waker(&waker);
    let polled = catch_unwind(AssertUnwindSafe(|| stored.poll(&mut cx)));
    drop(guard);

    let leftover: Option<StoredTask> = {
        let mut inner = rc.borrow_mut();
        match inner.entries.get_mut(&id.raw()) {
            // Stopped and released from within its own resumption.
            None => Some(stored),
            Some(entry) => {
                let mut finish: Option<Option<PanicPayload>> = None;
                let leftover = match polled {
                    Ok(Poll::Pending) => {
                        if entry.state == CoroState::Running {
                            entry.task = Some(stored);
                            None
                        } else {
                            // Stopped mid-resumption; tear down after the
                            // borrow ends.
                            Some(stored)
                        }
                    }
                    Ok(Poll::Ready(value)) => {
                        if entry.state == CoroState::Running {
                            entry.result = Some(value);
                            finish = Some(None);
                        }
                        Some(stored)
                    }
                    Err(payload) => {
                        if entry.state == CoroState::Running {
                            finish = Some(Some(PanicPayload::from_unwind(payload)));
                        }
                        Some(stored)
                    }
                };
                if let Some(failure) = finish {
                    inner.record_finished(id, failure);
                }
                leftover
            }
        }
    };
    drop(leftover);
}

/// Settles the parked just-finished root, if any.
///
/// Runs between queue pops and after the `start` kick: flips the entry to
/// its terminal state and erases it when the handle already released it.
fn settle_finished<P: UpdateKind, C: ClockKind>(rc: &Rc<RefCell<Inner<P, C>>>) {
    let erased: Option<RootEntry> = {
        let mut inner = rc.borrow_mut();
        let Some(FinishedRoot { id, failure }) = inner.finished.take() else {
            return;
        };
        let entry = inner
            .entries
            .get_mut(&id.raw())
            .expect("finished root coroutine has no entry");
        debug_assert_eq!(entry.state, CoroState::Running);
        entry.state = if failure.is_none() {
            CoroState::Succeeded
        } else {
            CoroState::Failed
        };
        debug!(task_id = %id, state = ?entry.state, "root coroutine finished");
        entry.failure = failure;
        let released = entry.released;
        if released {
            inner.entries.remove(&id.raw())
        } else {
            None
        }
    };
    drop(erased);
}

impl<P: UpdateKind, C: ClockKind> ManagerHook for RefCell<Inner<P, C>> {
    fn stop(&self, id: TaskId) {
        let dropped: Option<StoredTask> = {
            let mut inner = self.borrow_mut();
            if inner.closing {
                return;
            }
            let entry = inner
                .entries
                .get_mut(&id.raw())
                .expect("stop called with an unknown coroutine id");
            assert!(!entry.released, "stop called on a released coroutine entry");
            if entry.state != CoroState::Running {
                return;
            }
            debug!(task_id = %id, "root coroutine stopped");
            entry.state = CoroState::Stopped;
            entry.task.take()
        };
        // Cancellation cascade: dropping the body tears down nested children
        // and removes their wait records from the queues.
        drop(dropped);
    }

    fn release(&self, id: TaskId) {
        let erased: Option<RootEntry> = {
            let mut inner = self.borrow_mut();
            if inner.closing {
                return;
            }
            let entry = inner
                .entries
                .get_mut(&id.raw())
                .expect("release called with an unknown coroutine id");
            assert!(!entry.released, "double release of a coroutine entry");
            entry.released = true;
            let running = entry.state == CoroState::Running;
            if running {
                None
            } else {
                inner.entries.remove(&id.raw())
            }
        };
        drop(erased);
    }

    fn state(&self, id: TaskId) -> CoroState {
        let inner = self.borrow();
        if inner.closing {
            return CoroState::Stopped;
        }
        inner
            .entries
            .get(&id.raw())
            .expect("state queried with an unknown coroutine id")
            .state
    }

    fn take_result(&self, id: TaskId) -> TakenResult {
        let mut inner = self.borrow_mut();
        if inner.closing {
            return TakenResult::Empty;
        }
        let entry = inner
            .entries
            .get_mut(&id.raw())
            .expect("take_result queried with an unknown coroutine id");
        match entry.state {
            CoroState::Succeeded => entry
                .result
                .take()
                .map_or(TakenResult::Empty, TakenResult::Value),
            CoroState::Failed => entry
                .failure
                .take()
                .map_or(TakenResult::Empty, TakenResult::Failure),
            CoroState::Running | CoroState::Stopped => TakenResult::Empty,
        }
    }
}

thread_local! {
    static GLOBAL: Scheduler = Scheduler::new();
}

/// Runs `f` against the process-wide (per-thread) scheduler, creating it on
/// first use.
///
/// The instance uses the default phase and clock kinds and is torn down by
/// the thread-local destructor at thread exit. Re-entering from inside that
/// destructor is not supported and panics.
pub fn with_global<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    GLOBAL.with(f)
}
