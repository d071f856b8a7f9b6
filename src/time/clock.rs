//! Clock registry: one time source per [`ClockKind`] variant.
//!
//! Every clock reports monotonic seconds as `f64`. Unless the host installs
//! a custom timer, a clock falls back to the scheduler's default source:
//! seconds elapsed since the scheduler was created.

use crate::kind::ClockKind;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Instant;

/// A resolved time source, cloned out of the registry so the actual call
/// happens without holding any scheduler borrow (custom timers are user
/// code).
#[derive(Clone)]
pub(crate) enum ClockSource {
    Custom(Rc<dyn Fn() -> f64>),
    Epoch(Instant),
}

impl ClockSource {
    pub(crate) fn now(&self) -> f64 {
        match self {
            Self::Custom(f) => f(),
            Self::Epoch(epoch) => epoch.elapsed().as_secs_f64(),
        }
    }
}

pub(crate) struct ClockRegistry<C: ClockKind> {
    custom: Vec<Option<Rc<dyn Fn() -> f64>>>,
    epoch: Instant,
    _kind: PhantomData<C>,
}

impl<C: ClockKind> ClockRegistry<C> {
    pub(crate) fn new() -> Self {
        Self {
            custom: (0..C::COUNT).map(|_| None).collect(),
            epoch: Instant::now(),
            _kind: PhantomData,
        }
    }

    /// Installs a custom timer for `clock`, replacing the default source.
    pub(crate) fn set(&mut self, clock: C, f: Rc<dyn Fn() -> f64>) {
        self.custom[clock.index()] = Some(f);
    }

    pub(crate) fn source(&self, clock: C) -> ClockSource {
        self.custom[clock.index()]
            .clone()
            .map_or(ClockSource::Epoch(self.epoch), ClockSource::Custom)
    }
}
