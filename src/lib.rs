//! Cotick: a single-threaded cooperative coroutine scheduler for
//! update-driven hosts.
//!
//! # Overview
//!
//! Cotick is built for hosts that tick on frames: game engines, UI
//! runtimes, simulators. The host drives the scheduler by calling
//! [`Scheduler::update`] on each frame; the scheduler resumes every
//! coroutine whose suspension has elapsed, in deterministic deadline-then-
//! FIFO order, on the host's thread.
//!
//! # Core Guarantees
//!
//! - **Deterministic ordering**: one clock snapshot per update; waiters
//!   resume in ascending deadline order, FIFO among ties
//! - **Synchronous cancellation**: stopping a coroutine destroys its whole
//!   suspension tree and removes every pending wait before the call returns
//! - **Structured concurrency**: [`all`] joins and [`any`] races own their
//!   children; no orphan coroutines, no leaked wait records
//! - **One-shot results**: a root's value or captured panic is taken exactly
//!   once through its [`Handle`]
//! - **Manager-safe handles**: every handle operation degrades to an empty
//!   answer once the scheduler is gone
//!
//! # Module Structure
//!
//! - [`kind`]: update-phase and clock-kind keys indexing the wait queues
//! - [`types`]: task ids, coroutine states, captured panics
//! - [`runtime`]: scheduler, root storage, handles, time queues
//! - [`time`]: clocks and the wait primitives
//! - [`combinator`]: the `all` / `any` structured combinators
//! - [`test_utils`]: logging setup and assertion macros for tests
//!
//! # Example
//!
//! ```
//! use cotick::{wait, DefaultClock, DefaultUpdate, Scheduler};
//!
//! let sched = Scheduler::<DefaultUpdate, DefaultClock>::new();
//! let handle = sched.start(|| async {
//!     wait(0.0).await; // resumes on the next update
//!     2 + 2
//! });
//!
//! sched.update();
//! assert_eq!(handle.take_result(), Some(4));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod combinator;
pub mod kind;
pub mod runtime;
pub mod test_utils;
pub mod time;
pub mod types;

pub use combinator::{all, any, IntoAll, IntoAny};
pub use kind::{ClockKind, DefaultClock, DefaultUpdate, UpdateKind};
pub use runtime::{with_global, Handle, Scheduler};
pub use time::{next_update, wait, wait_in, wait_until, wait_while, Wait};
pub use types::{CoroState, PanicPayload, TaskId};
