// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::task::Waker;
use std::time::{Duration, Instant};

/// Identifies a scheduled timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TimerId {
    deadline: Instant,

    /// Distinguishes timers scheduled for the same instant.
    seq: u64,
}

impl TimerId {
    /// The instant at which this timer fires.
    pub(crate) const fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// The minimum granularity for periodic timers.
///
/// Periods shorter than this are rounded up; anything finer would only add
/// scheduling overhead without observable precision.
pub(crate) const TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// One-shot timers ordered by deadline.
///
/// Each entry pairs a deadline with the [`Waker`] of the task awaiting it. Timers fire
/// at most once: [`TimerQueue::fire_due`] wakes and removes every entry whose deadline
/// has been reached.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    wakers: BTreeMap<TimerId, Waker>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }

    /// Schedules a timer that fires at `deadline`, returning its id.
    pub(crate) fn schedule(&mut self, deadline: Instant, waker: Waker) -> TimerId {
        // Wrapping is harmless; the sequence only disambiguates equal deadlines.
        self.next_seq = self.next_seq.wrapping_add(1);
        let id = TimerId {
            deadline,
            seq: self.next_seq,
        };
        self.wakers.insert(id, waker);
        id
    }

    /// Cancels a scheduled timer. A no-op if the timer already fired.
    pub(crate) fn cancel(&mut self, id: TimerId) {
        self.wakers.remove(&id);
    }

    /// The deadline of the next timer to fire, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.wakers.keys().next().map(TimerId::deadline)
    }

    /// Wakes and removes every timer whose deadline is at or before `now`.
    ///
    /// Returns the deadline of the next pending timer, or `None` when the queue
    /// is drained.
    pub(crate) fn fire_due(&mut self, now: Instant) -> Option<Instant> {
        while let Some(entry) = self.wakers.first_entry() {
            if entry.key().deadline() > now {
                return Some(entry.key().deadline());
            }
            entry.remove().wake();
        }

        None
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: TimerId) -> bool {
        self.wakers.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_same_deadline_distinct_ids() {
        let mut queue = TimerQueue::default();
        let at = Instant::now() + Duration::from_secs(2);

        let a = queue.schedule(at, Waker::noop().clone());
        let b = queue.schedule(at, Waker::noop().clone());

        assert_ne!(a, b);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn fire_due_respects_order() {
        let mut queue = TimerQueue::default();
        let anchor = Instant::now();
        let first = anchor + Duration::from_secs(1);
        let second = anchor + Duration::from_secs(2);

        let a = queue.schedule(first, Waker::noop().clone());
        let _b = queue.schedule(second, Waker::noop().clone());

        assert_eq!(queue.fire_due(first), Some(second));
        assert!(!queue.contains(a));
        assert_eq!(queue.fire_due(second), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn fire_due_exact_deadline_fires() {
        let mut queue = TimerQueue::default();
        let at = Instant::now();

        let _ = queue.schedule(at, Waker::noop().clone());

        assert_eq!(queue.fire_due(at), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn cancel_removes_timer() {
        let mut queue = TimerQueue::default();
        let id = queue.schedule(Instant::now(), Waker::noop().clone());

        assert!(queue.contains(id));
        queue.cancel(id);
        assert!(!queue.contains(id));
    }

    #[test]
    fn next_deadline_is_earliest() {
        let mut queue = TimerQueue::default();
        let now = Instant::now();

        let _ = queue.schedule(now + Duration::from_secs(1), Waker::noop().clone());
        let _ = queue.schedule(now, Waker::noop().clone());

        assert_eq!(queue.next_deadline(), Some(now));
    }
}
