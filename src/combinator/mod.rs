//! Structured combinators: join ([`all`]) and race ([`any`]).
//!
//! Both operate on a compile-time tuple of child coroutines and own their
//! children for the duration of the await: when the combinator goes away
//! (completion, cancellation of the parent, or a panic unwinding through
//! it), every remaining child is destroyed in place, which removes its
//! pending waits from the scheduler's queues. No orphan children, no leaked
//! wait records.
//!
//! Arities 1 through 8 are monomorphized per tuple size (`all` also accepts
//! the empty tuple). Children are polled in argument order; teardown runs in
//! reverse argument order.

mod all;
mod any;

pub use all::{All0, All1, All2, All3, All4, All5, All6, All7, All8};
pub use any::{Any1, Any2, Any3, Any4, Any5, Any6, Any7, Any8};

use crate::types::PanicPayload;
use std::future::Future;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Tuples of child coroutines accepted by [`all`].
pub trait IntoAll {
    /// The join future for this tuple arity.
    type Future: Future;

    /// Builds the join future.
    fn into_all(self) -> Self::Future;
}

/// Tuples of child coroutines accepted by [`any`].
pub trait IntoAny {
    /// The race future for this tuple arity.
    type Future: Future;

    /// Builds the race future.
    fn into_any(self) -> Self::Future;
}

/// Awaits every child and yields their results as a tuple in argument
/// order, regardless of finishing order.
///
/// All children are driven to a terminal state even if one fails early;
/// once they have settled, the first failure in argument order is re-raised.
/// The empty tuple completes synchronously with `()`.
///
/// # Example
///
/// ```
/// use cotick::{all, wait, DefaultClock, DefaultUpdate, Scheduler};
///
/// let sched = Scheduler::<DefaultUpdate, DefaultClock>::new();
/// let handle = sched.start(|| async {
///     all((
///         async {
///             wait(0.0).await;
///             1
///         },
///         async { "two" },
///     ))
///     .await
/// });
///
/// sched.update();
/// assert_eq!(handle.take_result(), Some((1, "two")));
/// ```
pub fn all<T: IntoAll>(children: T) -> T::Future {
    children.into_all()
}

/// Awaits the first child to finish and yields a tuple of options with only
/// the winner's entry populated.
///
/// The moment one child completes, every other child is destroyed in place
/// (reverse argument order); their pending waits vanish from the queues
/// before the parent observes the result. A winning child that failed
/// re-raises its panic here. Children are started in argument order; if one
/// completes without ever suspending, later children are never started.
///
/// # Example
///
/// ```
/// use cotick::{any, wait, DefaultClock, DefaultUpdate, Scheduler};
///
/// let sched = Scheduler::<DefaultUpdate, DefaultClock>::new();
/// let handle = sched.start(|| async {
///     any((
///         async {
///             wait(10.0).await;
///             1
///         },
///         async {
///             wait(0.0).await;
///             2
///         },
///     ))
///     .await
/// });
///
/// sched.update();
/// assert_eq!(handle.take_result(), Some((None, Some(2))));
/// ```
pub fn any<T: IntoAny>(children: T) -> T::Future {
    children.into_any()
}

/// One child coroutine owned by a combinator.
///
/// `Running` holds the boxed child; the other states are the child's
/// terminal protocol. `Taken` doubles as the cancelled state: replacing a
/// slot drops the boxed child in place, cascading into its wait records.
pub(crate) enum ChildSlot<F: Future> {
    Running(Pin<Box<F>>),
    Done(F::Output),
    Failed(PanicPayload),
    Taken,
}

impl<F: Future> ChildSlot<F> {
    pub(crate) fn new(future: F) -> Self {
        Self::Running(Box::pin(future))
    }

    /// Polls a running child, capturing panics as its terminal state.
    pub(crate) fn poll_advance(&mut self, cx: &mut Context<'_>) {
        let Self::Running(future) = self else { return };
        let next = match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(cx))) {
            Ok(Poll::Pending) => return,
            Ok(Poll::Ready(value)) => Self::Done(value),
            Err(payload) => Self::Failed(PanicPayload::from_unwind(payload)),
        };
        *self = next;
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    pub(crate) fn is_settled(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }

    /// Destroys the child in place.
    pub(crate) fn cancel(&mut self) {
        *self = Self::Taken;
    }

    pub(crate) fn take_value(&mut self) -> F::Output {
        match mem::replace(self, Self::Taken) {
            Self::Done(value) => value,
            _ => unreachable!("combinator child value taken in a non-done state"),
        }
    }

    pub(crate) fn take_failure(&mut self) -> Option<PanicPayload> {
        if matches!(self, Self::Failed(_)) {
            match mem::replace(self, Self::Taken) {
                Self::Failed(payload) => Some(payload),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    pub(crate) fn take_settled(&mut self) -> Result<F::Output, PanicPayload> {
        match mem::replace(self, Self::Taken) {
            Self::Done(value) => Ok(value),
            Self::Failed(payload) => Err(payload),
            _ => unreachable!("combinator winner taken in a non-settled state"),
        }
    }
}
