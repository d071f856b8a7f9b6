//! Time primitives: clocks and wait futures.
//!
//! Every clock reports monotonic seconds as `f64`; custom sources are
//! installed per [`ClockKind`](crate::kind::ClockKind) variant with
//! [`Scheduler::set_timer`](crate::Scheduler::set_timer). The [`Wait`]
//! future is the scheduler's sole suspension primitive; [`wait_until`] and
//! [`wait_while`] are poll-based adapters over it.

pub(crate) mod clock;
mod wait;

pub use wait::{next_update, wait, wait_in, wait_until, wait_while, Wait};
