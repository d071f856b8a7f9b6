//! Time-ordered wait queue for deadline-driven resumption.
//!
//! Each (phase, clock) pair owns one [`TimeQueue`]: an ordered multiset of
//! `(deadline, waiter)` records. Inserting returns a stable [`WaitKey`] the
//! owning wait uses to cancel itself. Draining is two-phase: `setup_drain`
//! snapshots the comparison instant once, then `pop_ready` hands out expired
//! waiters in (deadline, insertion) order.
//!
//! Records inserted *during* a drain are stamped with that drain's pass
//! number and skipped until the next drain, so a coroutine that re-suspends
//! with zero delay parks until the next host update instead of starving the
//! current one.

use crate::types::TaskId;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::rc::Rc;

/// When a queued wait becomes eligible.
///
/// `Immediate` is the zero-delay deadline: it sorts before every `At`
/// instant, making "next update" waits drain ahead of timed ones.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Deadline {
    /// Eligible at the start of the next drain of this queue.
    Immediate,
    /// Eligible once the queue's clock reaches this many seconds.
    At(f64),
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Self::Immediate, Self::Immediate) => Ordering::Equal,
            (Self::Immediate, Self::At(_)) => Ordering::Less,
            (Self::At(_), Self::Immediate) => Ordering::Greater,
            (Self::At(a), Self::At(b)) => a.total_cmp(b),
        }
    }
}

/// Stable cursor for a queued wait record.
///
/// Keys order by `(deadline, seq)`; `seq` increments per insert and is never
/// reset, so ties between equal deadlines resolve in FIFO order and keys
/// stay unique for the queue's lifetime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub(crate) struct WaitKey {
    deadline: Deadline,
    seq: u64,
}

/// Shared state between a queued wait future and the drain loop.
///
/// The queue holds one strong reference while the record is enqueued; the
/// wait future holds the other. `fired` flips when the drain pops the
/// record, telling the wait's next poll to complete.
#[derive(Debug)]
pub(crate) struct WaitRecord {
    /// Root coroutine to resume when this record fires.
    pub(crate) task: TaskId,
    /// Set by the drain loop just before resuming the owner.
    pub(crate) fired: Cell<bool>,
}

struct QueueSlot {
    /// Drain pass during which this record was inserted.
    pass: u64,
    record: Rc<WaitRecord>,
}

/// Ordered multiset of pending waits for one (phase, clock) queue.
pub(crate) struct TimeQueue {
    slots: BTreeMap<WaitKey, QueueSlot>,
    next_seq: u64,
    /// Monotonic drain counter; doubles as the insert stamp.
    pass: u64,
    /// Snapshot instant for the current drain.
    now: Option<Deadline>,
    /// Last key visited by `pop_ready` in the current drain.
    cursor: Option<WaitKey>,
}

impl TimeQueue {
    pub(crate) fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            next_seq: 0,
            pass: 0,
            now: None,
            cursor: None,
        }
    }

    /// Inserts a record and returns its removal cursor.
    pub(crate) fn insert(&mut self, deadline: Deadline, record: Rc<WaitRecord>) -> WaitKey {
        let key = WaitKey {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.slots.insert(
            key,
            QueueSlot {
                pass: self.pass,
                record,
            },
        );
        key
    }

    /// Removes a record by cursor. Harmless if the record already fired.
    pub(crate) fn remove(&mut self, key: WaitKey) {
        self.slots.remove(&key);
    }

    /// Starts a drain: snapshots `now` and advances the insert stamp so
    /// records added from here on defer to the next drain.
    pub(crate) fn setup_drain(&mut self, now: f64) {
        self.pass += 1;
        self.now = Some(Deadline::At(now));
        self.cursor = None;
    }

    /// True if `pop_ready` would currently yield a record.
    pub(crate) fn has_ready(&self) -> bool {
        let Some(now) = self.now else { return false };
        let range = match self.cursor {
            Some(cursor) => self.slots.range((Excluded(cursor), Unbounded)),
            None => self.slots.range(..),
        };
        for (key, slot) in range {
            if key.deadline > now {
                return false;
            }
            if slot.pass != self.pass {
                return true;
            }
        }
        false
    }

    /// Pops the earliest record whose deadline is at or before the drain
    /// snapshot, skipping records inserted during this drain.
    pub(crate) fn pop_ready(&mut self) -> Option<Rc<WaitRecord>> {
        loop {
            let (key, eligible) = self.peek_ready()?;
            self.cursor = Some(key);
            if eligible {
                let slot = self.slots.remove(&key).expect("peeked key vanished");
                return Some(slot.record);
            }
        }
    }

    /// Earliest deadline still queued, ignoring drain state.
    pub(crate) fn peek_deadline(&self) -> Option<Deadline> {
        self.slots.keys().next().map(|k| k.deadline)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.cursor = None;
    }

    /// Next key at or past the cursor within the snapshot, and whether it is
    /// eligible (false means "stamped by this drain, skip over it").
    fn peek_ready(&self) -> Option<(WaitKey, bool)> {
        let now = self.now?;
        let mut range = match self.cursor {
            Some(cursor) => self.slots.range((Excluded(cursor), Unbounded)),
            None => self.slots.range(..),
        };
        let (key, slot) = range.next()?;
        if key.deadline > now {
            return None;
        }
        Some((*key, slot.pass != self.pass))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn record(task: u64) -> Rc<WaitRecord> {
        Rc::new(WaitRecord {
            task: TaskId(task),
            fired: Cell::new(false),
        })
    }

    fn drain_tasks(queue: &mut TimeQueue) -> Vec<u64> {
        let mut order = Vec::new();
        while let Some(rec) = queue.pop_ready() {
            order.push(rec.task.raw());
        }
        order
    }

    #[test]
    fn empty_queue_has_nothing_ready() {
        init_test("empty_queue_has_nothing_ready");
        let mut queue = TimeQueue::new();
        queue.setup_drain(10.0);
        crate::assert_with_log!(!queue.has_ready(), "no ready waiters", false, queue.has_ready());
        let popped = queue.pop_ready().is_none();
        crate::assert_with_log!(popped, "pop yields none", true, popped);
        crate::test_complete!("empty_queue_has_nothing_ready");
    }

    #[test]
    fn drains_in_deadline_order() {
        init_test("drains_in_deadline_order");
        let mut queue = TimeQueue::new();
        queue.insert(Deadline::At(3.0), record(3));
        queue.insert(Deadline::At(1.0), record(1));
        queue.insert(Deadline::At(2.0), record(2));

        queue.setup_drain(5.0);
        let order = drain_tasks(&mut queue);
        crate::assert_with_log!(order == [1, 2, 3], "ascending deadlines", [1, 2, 3], order);
        crate::test_complete!("drains_in_deadline_order");
    }

    #[test]
    fn equal_deadlines_drain_fifo() {
        init_test("equal_deadlines_drain_fifo");
        let mut queue = TimeQueue::new();
        for task in 1..=4 {
            queue.insert(Deadline::At(1.0), record(task));
        }

        queue.setup_drain(1.0);
        let order = drain_tasks(&mut queue);
        crate::assert_with_log!(order == [1, 2, 3, 4], "insertion order kept", [1, 2, 3, 4], order);
        crate::test_complete!("equal_deadlines_drain_fifo");
    }

    #[test]
    fn immediate_sorts_before_timed() {
        init_test("immediate_sorts_before_timed");
        let mut queue = TimeQueue::new();
        queue.insert(Deadline::At(0.5), record(2));
        queue.insert(Deadline::Immediate, record(1));

        queue.setup_drain(1.0);
        let order = drain_tasks(&mut queue);
        crate::assert_with_log!(order == [1, 2], "immediate first", [1, 2], order);
        crate::test_complete!("immediate_sorts_before_timed");
    }

    #[test]
    fn future_deadlines_stay_queued() {
        init_test("future_deadlines_stay_queued");
        let mut queue = TimeQueue::new();
        queue.insert(Deadline::At(1.0), record(1));
        queue.insert(Deadline::At(9.0), record(9));

        queue.setup_drain(2.0);
        let order = drain_tasks(&mut queue);
        crate::assert_with_log!(order == [1], "only expired popped", [1], order);
        crate::assert_with_log!(queue.len() == 1, "one waiter left", 1usize, queue.len());
        crate::test_complete!("future_deadlines_stay_queued");
    }

    #[test]
    fn inserts_during_drain_defer_to_next_pass() {
        init_test("inserts_during_drain_defer_to_next_pass");
        let mut queue = TimeQueue::new();
        queue.insert(Deadline::Immediate, record(1));

        queue.setup_drain(0.0);
        let first = queue.pop_ready().expect("first waiter ready");
        crate::assert_with_log!(first.task.raw() == 1, "first waiter", 1u64, first.task.raw());

        // Re-suspension with zero delay while the drain runs.
        queue.insert(Deadline::Immediate, record(2));
        crate::assert_with_log!(!queue.has_ready(), "new insert deferred", false, queue.has_ready());

        queue.setup_drain(0.0);
        let order = drain_tasks(&mut queue);
        crate::assert_with_log!(order == [2], "drained next pass", [2], order);
        crate::test_complete!("inserts_during_drain_defer_to_next_pass");
    }

    #[test]
    fn remove_by_cursor_cancels_waiter() {
        init_test("remove_by_cursor_cancels_waiter");
        let mut queue = TimeQueue::new();
        let keep = queue.insert(Deadline::At(1.0), record(1));
        let cancel = queue.insert(Deadline::At(2.0), record(2));
        let _ = keep;
        queue.remove(cancel);

        queue.setup_drain(5.0);
        let order = drain_tasks(&mut queue);
        crate::assert_with_log!(order == [1], "cancelled waiter gone", [1], order);
        crate::test_complete!("remove_by_cursor_cancels_waiter");
    }

    #[test]
    fn peek_deadline_reports_minimum() {
        init_test("peek_deadline_reports_minimum");
        let mut queue = TimeQueue::new();
        assert!(queue.peek_deadline().is_none());
        queue.insert(Deadline::At(4.0), record(4));
        queue.insert(Deadline::At(2.0), record(2));
        let peeked = queue.peek_deadline();
        crate::assert_with_log!(
            peeked == Some(Deadline::At(2.0)),
            "minimum deadline",
            Some(Deadline::At(2.0)),
            peeked
        );
        crate::test_complete!("peek_deadline_reports_minimum");
    }
}
