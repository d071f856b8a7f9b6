//! Core types: task identifiers, coroutine states, captured panics.

use core::fmt;
use std::any::Any;

/// A unique identifier for a root coroutine.
///
/// Ids are handed out by the scheduler starting at 1 and are never reused
/// for the scheduler's lifetime. `TaskId(0)` is reserved as the invalid id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// The reserved invalid id.
    pub const INVALID: Self = Self(0);

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true unless this is the reserved invalid id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a root coroutine.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CoroState {
    /// Still has suspension points ahead of it.
    Running,
    /// Ran to completion; its result may be waiting in the entry.
    Succeeded,
    /// Panicked; the payload may be waiting in the entry.
    Failed,
    /// Cancelled through a [`Handle`](crate::Handle) before completing.
    Stopped,
}

impl CoroState {
    /// Returns true for any terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Payload captured from a panicking coroutine.
///
/// Carries both a display summary (extracted from `&str`/`String` panic
/// messages) and the original unwind payload, so
/// [`Handle::take_result`](crate::Handle::take_result) can re-raise the
/// panic exactly as thrown.
#[derive(thiserror::Error)]
#[error("coroutine panicked: {summary}")]
pub struct PanicPayload {
    summary: String,
    payload: Option<Box<dyn Any + Send>>,
}

impl PanicPayload {
    /// Wraps a payload caught by `std::panic::catch_unwind`.
    #[must_use]
    pub fn from_unwind(payload: Box<dyn Any + Send>) -> Self {
        let summary = payload.downcast_ref::<&str>().map_or_else(
            || {
                payload
                    .downcast_ref::<String>()
                    .cloned()
                    .unwrap_or_else(|| "non-string panic payload".to_owned())
            },
            |s| (*s).to_owned(),
        );
        Self {
            summary,
            payload: Some(payload),
        }
    }

    /// Builds a payload from a plain message (used by tests and adapters).
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            summary: message.into(),
            payload: None,
        }
    }

    /// Returns the display summary of the panic.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Consumes the capture and returns a payload suitable for
    /// `std::panic::resume_unwind`.
    #[must_use]
    pub fn into_unwind(self) -> Box<dyn Any + Send> {
        self.payload
            .unwrap_or_else(|| Box::new(self.summary) as Box<dyn Any + Send>)
    }
}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicPayload")
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_validity() {
        assert!(!TaskId::INVALID.is_valid());
        assert!(TaskId(1).is_valid());
        assert_eq!(TaskId(7).raw(), 7);
    }

    #[test]
    fn terminal_states() {
        assert!(!CoroState::Running.is_terminal());
        assert!(CoroState::Succeeded.is_terminal());
        assert!(CoroState::Failed.is_terminal());
        assert!(CoroState::Stopped.is_terminal());
    }

    #[test]
    fn panic_payload_summary_from_str() {
        let caught: Result<(), _> = std::panic::catch_unwind(|| panic!("boom"));
        let payload = PanicPayload::from_unwind(caught.unwrap_err());
        assert_eq!(payload.summary(), "boom");
        assert!(payload.to_string().contains("boom"));
    }

    #[test]
    fn panic_payload_roundtrips_unwind_value() {
        let caught: Result<(), _> = std::panic::catch_unwind(|| panic!("{}", 40 + 2));
        let payload = PanicPayload::from_unwind(caught.unwrap_err());
        assert_eq!(payload.summary(), "42");
        let raw = payload.into_unwind();
        assert_eq!(raw.downcast_ref::<String>().map(String::as_str), Some("42"));
    }
}
